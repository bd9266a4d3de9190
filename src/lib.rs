//! # TokenRoute
//!
//! TokenRoute is a request router that tries an ordered list of path
//! patterns and hands a request to the first handler willing to answer it,
//! together with a small protocol for carrying a user's identity across a
//! browser redirect.
//!
//! ## Features
//!
//! **First registered, first tried:** Path entries are tried strictly in the
//! order they were registered. A handler can answer the request, or decline
//! and let the next matching entry have a go. Handlers run one after another,
//! never concurrently, so a handler can rely on what the handlers before it
//! did to the request context.
//!
//! **Expressive patterns:** Named, optional and repeated parameters, custom
//! parameter patterns and wildcards, with case-sensitive, strict and prefix
//! matching available per path. The same compiled pattern builds paths back
//! from parameters.
//!
//! **Named routes:** Handlers can be registered under dotted names such as
//! `reports.salesPDF` and called through a single catch-all path,
//! `/r/:name/:args*`, with JSON-encoded arguments.
//!
//! **Authenticated redirects:** A client that knows its user asks the server
//! for a short-lived, single-use token and appends it to the URL it opens.
//! The router consumes the token before any other path runs and marks the
//! request as authenticated, without depending on cookies surviving the
//! redirect. A handler that needs a user it does not have returns
//! [`Outcome::AuthRequired`]; the client is then told, once, to retry with a
//! token.
//!
//! ## Usage
//!
//! Here is a simple example:
//!
//! ```rust,no_run
//! use tokenroute::{Outcome, RouteNode, Router};
//!
//! #[tokio::main]
//! async fn main() {
//!     let router = Router::default().path(
//!         "/hello/:user",
//!         |params, _| Ok(params.get_str("user").unwrap_or_default().to_owned()),
//!         |_, user: String| Box::pin(async move { Ok(Outcome::body(format!("Hello, {}", user))) }),
//!     );
//!
//!     router.add_routes(RouteNode::namespace().with(
//!         "reports",
//!         RouteNode::namespace().with(
//!             "salesPDF",
//!             RouteNode::route(|cx, args| {
//!                 Box::pin(async move {
//!                     let user = match cx.user_id() {
//!                         Some(user) => user.to_owned(),
//!                         None => return Ok(Outcome::AuthRequired),
//!                     };
//!                     Ok(Outcome::body(format!("sales for {} with {:?}", user, args)))
//!                 })
//!             }),
//!         ),
//!     ));
//!
//!     hyper::Server::bind(&([127, 0, 0, 1], 3000).into())
//!         .serve(router.into_service())
//!         .await;
//! }
//! ```
//!
//! ### Client
//!
//! The [`client`] module holds the other half of the handoff: a
//! [`Client`](client::Client) builds `/r/...` URLs with the same template and
//! codec, requests a token through a [`TokenSource`](client::TokenSource)
//! when the session has a user, and navigates.

#![forbid(unsafe_code)]

pub mod auth;
pub mod client;
pub mod codec;
pub mod context;
pub mod error;
pub mod params;
pub mod pattern;
pub mod routes;
pub mod signal;

#[doc(hidden)]
pub mod router;

#[doc(inline)]
pub use router::{Dispatch, Handler, HandlerResult, Outcome, Router, DEFAULT_ROUTE_PATH};

pub use auth::{MemoryStore, TokenService, TokenStore};
pub use context::{AuthenticatedUser, RequestContext, ResponseHead};
pub use error::{BoxError, Error, PatternError};
pub use params::{ParamValue, Params, Query};
pub use pattern::{PathOptions, Pattern};
pub use routes::{Route, RouteNode, RouteTable};
