//! [`Router`](crate::Router) dispatches requests through an ordered list of
//! path entries.
//!
//! Entries are tried strictly in registration order. For every entry whose
//! pattern matches the request path, its argument mapper turns the captured
//! parameters and the query string into the handler's arguments, and the
//! handler decides what happens next:
//! ```ignore
//!  Outcome            Effect
//!  Pass               try the next matching entry
//!  End                end the response with an empty body
//!  Body(bytes)        end the response with `bytes`
//!  AuthRequired       stop, arm the auth refresh signal, pass the request on
//! ```
//! A handler is only started once the previous one has settled, so handlers
//! see everything earlier handlers did to the shared [`RequestContext`].
//!
//! Every router begins with two built-in entries:
//!
//!  1) a prefix entry at `/` that consumes the `_u` and `_t` query
//!     parameters of a token handoff and marks the request as authenticated,
//!  2) the named route entry, `/r/:name/:args*` by default, which decodes
//!     each `args` segment and calls the route registered under `name`.
//!
//! ```rust,no_run
//! use tokenroute::{Outcome, RouteNode, Router};
//!
//! #[tokio::main]
//! async fn main() {
//!     let router = Router::default().path(
//!         "/binary-representation/:n",
//!         |params, _| Ok(params.get_str("n").unwrap_or_default().parse::<u64>()?),
//!         |_, n: u64| Box::pin(async move { Ok(Outcome::body(format!("{:b}", n))) }),
//!     );
//!
//!     router.add_routes(RouteNode::namespace().with(
//!         "hello",
//!         RouteNode::route(|cx, _| {
//!             Box::pin(async move {
//!                 Ok(match cx.user_id() {
//!                     Some(user) => Outcome::body(format!("Hello, {}", user)),
//!                     None => Outcome::AuthRequired,
//!                 })
//!             })
//!         }),
//!     ));
//!
//!     hyper::Server::bind(&([127, 0, 0, 1], 3000).into())
//!         .serve(router.into_service())
//!         .await;
//! }
//! ```
use crate::auth::{TokenService, TOKEN_PARAM, USER_PARAM};
use crate::codec::{Codec, JsonCodec};
use crate::context::RequestContext;
use crate::error::{BoxError, Error};
use crate::params::{Params, Query};
use crate::pattern::{PathOptions, Pattern};
use crate::routes::{Route, RouteNode, RouteTable};
use crate::signal::{HeaderSignal, SignalSink, AUTH_REFRESH};

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::{self, BoxFuture};
use hyper::body::Bytes;
use hyper::service::Service;
use hyper::{Body, Request, Response, StatusCode};
use parking_lot::RwLock;
use serde_json::Value;

/// The template of the named route entry unless configured otherwise.
pub const DEFAULT_ROUTE_PATH: &str = "/r/:name/:args*";

/// What a handler asks the dispatcher to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Decline; the next matching entry is tried.
    Pass,
    /// End the response without a body.
    End,
    /// End the response with this body.
    Body(Bytes),
    /// The request needs an authenticated user. The client is told to
    /// retry with a token, and the request passes through.
    AuthRequired,
}

impl Outcome {
    pub fn body(body: impl Into<Bytes>) -> Self {
        Outcome::Body(body.into())
    }
}

/// The result of a path or route handler. Errors are fatal for the request.
pub type HandlerResult = Result<Outcome, BoxError>;

/// How a dispatched request ended.
#[derive(Debug)]
pub enum Dispatch {
    /// A handler ended the response.
    Responded(Response<Body>),
    /// No handler ended the response. The context holds the request and any
    /// response headers armed while dispatching, for the next service.
    Passthrough(RequestContext),
}

trait Endpoint: Send + Sync {
    fn call<'a>(
        &'a self,
        cx: &'a mut RequestContext,
        params: &'a Params,
        query: &'a Query,
    ) -> BoxFuture<'a, Result<Outcome, Error>>;
}

struct Mapped<A, M, H> {
    mapper: M,
    handler: H,
    args: PhantomData<fn() -> A>,
}

impl<A, M, H> Endpoint for Mapped<A, M, H>
where
    A: Send + 'static,
    M: Fn(&Params, &Query) -> Result<A, BoxError> + Send + Sync,
    H: for<'a> Fn(&'a mut RequestContext, A) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    fn call<'a>(
        &'a self,
        cx: &'a mut RequestContext,
        params: &'a Params,
        query: &'a Query,
    ) -> BoxFuture<'a, Result<Outcome, Error>> {
        Box::pin(async move {
            let args = (self.mapper)(params, query).map_err(Error::Arguments)?;
            (self.handler)(cx, args).await.map_err(Error::Handler)
        })
    }
}

enum EntryKind {
    ConsumeToken,
    NamedRoute,
    Mapped(Box<dyn Endpoint>),
}

struct PathEntry {
    pattern: Pattern,
    kind: EntryKind,
}

fn compile(template: &str, options: PathOptions) -> Pattern {
    if !template.starts_with('/') {
        panic!("expect path beginning with '/', found: '{}'", template);
    }

    match Pattern::compile(template, options) {
        Ok(pattern) => pattern,
        Err(err) => panic!("{}", err),
    }
}

/// Router dispatches requests to path entries and named routes.
pub struct Router {
    entries: Vec<PathEntry>,
    routes: RwLock<RouteTable>,
    tokens: Arc<TokenService>,
    codec: Arc<dyn Codec>,
    signals: Arc<dyn SignalSink>,
    fallback: Option<Box<dyn Handler>>,
}

impl Router {
    /// A router validating token handoffs with `tokens`.
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self {
            entries: vec![
                PathEntry {
                    pattern: compile("/", PathOptions::default()),
                    kind: EntryKind::ConsumeToken,
                },
                PathEntry {
                    pattern: compile(DEFAULT_ROUTE_PATH, PathOptions::exact()),
                    kind: EntryKind::NamedRoute,
                },
            ],
            routes: RwLock::new(RouteTable::new()),
            tokens,
            codec: Arc::new(JsonCodec),
            signals: Arc::new(HeaderSignal),
            fallback: None,
        }
    }

    /// Register a path entry with default [`PathOptions`], which match any
    /// path the template is a prefix of.
    /// ```rust
    /// use tokenroute::{Outcome, Router};
    ///
    /// let router = Router::default().path(
    ///     "/sum/:n+",
    ///     |params, _| {
    ///         let numbers = params
    ///             .get_all("n")
    ///             .iter()
    ///             .map(|n| n.parse::<i64>())
    ///             .collect::<Result<Vec<_>, _>>()?;
    ///         Ok(numbers)
    ///     },
    ///     |_, numbers: Vec<i64>| {
    ///         Box::pin(async move { Ok(Outcome::body(numbers.iter().sum::<i64>().to_string())) })
    ///     },
    /// );
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `template` does not begin with `/` or does not compile.
    pub fn path<A, M, H>(self, template: &str, mapper: M, handler: H) -> Self
    where
        A: Send + 'static,
        M: Fn(&Params, &Query) -> Result<A, BoxError> + Send + Sync + 'static,
        H: for<'a> Fn(&'a mut RequestContext, A) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        self.path_with(template, PathOptions::default(), mapper, handler)
    }

    /// Register a path entry with explicit matching options.
    ///
    /// # Panics
    ///
    /// Panics if `template` does not begin with `/` or does not compile.
    pub fn path_with<A, M, H>(
        mut self,
        template: &str,
        options: PathOptions,
        mapper: M,
        handler: H,
    ) -> Self
    where
        A: Send + 'static,
        M: Fn(&Params, &Query) -> Result<A, BoxError> + Send + Sync + 'static,
        H: for<'a> Fn(&'a mut RequestContext, A) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        self.entries.push(PathEntry {
            pattern: compile(template, options),
            kind: EntryKind::Mapped(Box::new(Mapped {
                mapper,
                handler,
                args: PhantomData,
            })),
        });
        self
    }

    /// Replace the template of the named route entry. The template must
    /// declare a `:name` parameter and may declare a repeated `:args`
    /// parameter. The entry keeps its position.
    ///
    /// # Panics
    ///
    /// Panics if `template` does not compile or has no `name` parameter.
    pub fn route_path(mut self, template: &str) -> Self {
        let pattern = compile(template, PathOptions::exact());
        if !pattern.keys().iter().any(|key| key.name == "name") {
            panic!("route path '{}' must declare a ':name' parameter", template);
        }

        for entry in &mut self.entries {
            if let EntryKind::NamedRoute = entry.kind {
                entry.pattern = pattern;
                break;
            }
        }
        self
    }

    /// The codec used to decode named route arguments.
    pub fn codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// The channel used to tell the client to retry with a token.
    pub fn signals(mut self, signals: impl SignalSink + 'static) -> Self {
        self.signals = Arc::new(signals);
        self
    }

    /// A handler for requests no entry responded to. Without one, such
    /// requests get an empty `404 Not Found` from [`Router::serve`].
    pub fn fallback(mut self, handler: impl Handler + 'static) -> Self {
        self.fallback = Some(Box::new(handler));
        self
    }

    /// Merges a tree of named routes into the router. Routes can be added
    /// while the router is serving.
    pub fn add_routes(&self, routes: RouteNode<Arc<dyn Route>>) {
        self.routes.write().add_routes(routes);
    }

    /// The token service, which also answers the client's token requests.
    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    /// The templates of every path entry, in the order they are tried.
    pub fn paths(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|entry| entry.pattern.template())
            .collect()
    }

    /// Runs a request through the path entries.
    ///
    /// `Ok(Dispatch::Passthrough(_))` means the request should continue to
    /// the next service, including when a handler required authentication.
    /// Errors are fatal for the request; no further entries are tried.
    pub async fn dispatch(&self, req: Request<Body>) -> Result<Dispatch, Error> {
        let path = req.uri().path().to_owned();
        let query = Query::parse(req.uri().query())?;
        let mut cx = RequestContext::new(req);

        for (index, entry) in self.entries.iter().enumerate() {
            let params = match entry.pattern.matches(&path)? {
                Some(params) => params,
                None => continue,
            };
            tracing::trace!(index, pattern = %entry.pattern, "path entry matched");

            let outcome = match &entry.kind {
                EntryKind::ConsumeToken => self.consume_token(&mut cx, &query).await?,
                EntryKind::NamedRoute => self.call_route(&mut cx, &params).await?,
                EntryKind::Mapped(endpoint) => endpoint.call(&mut cx, &params, &query).await?,
            };

            match outcome {
                Outcome::Pass => continue,
                Outcome::End => return Ok(respond(cx, Body::empty())),
                Outcome::Body(body) => return Ok(respond(cx, Body::from(body))),
                Outcome::AuthRequired => {
                    tracing::debug!(path = %path, pattern = %entry.pattern, "authentication required");
                    self.signals
                        .push(cx.response_mut(), AUTH_REFRESH, &Value::Bool(true));
                    return Ok(Dispatch::Passthrough(cx));
                }
            }
        }

        Ok(Dispatch::Passthrough(cx))
    }

    async fn consume_token(&self, cx: &mut RequestContext, query: &Query) -> Result<Outcome, Error> {
        let present = |name: &str| query.get(name).filter(|value| !value.is_empty());
        let (user_id, token) = match (present(USER_PARAM), present(TOKEN_PARAM)) {
            (Some(user_id), Some(token)) => (user_id, token),
            _ => return Ok(Outcome::Pass),
        };

        if self.tokens.validate(user_id, token).await? {
            cx.set_user_id(user_id);
            Ok(Outcome::Pass)
        } else {
            Ok(Outcome::AuthRequired)
        }
    }

    async fn call_route(&self, cx: &mut RequestContext, params: &Params) -> Result<Outcome, Error> {
        let args = params
            .get_all("args")
            .iter()
            .map(|segment| {
                self.codec
                    .decode(segment)
                    .map_err(|source| Error::InvalidArgument {
                        segment: segment.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let name = params.get_str("name").unwrap_or_default();
        let route = self.routes.read().lookup(name);
        match route {
            Some(route) => route.call(cx, args).await.map_err(Error::Handler),
            None => {
                tracing::debug!(name, "no route registered under this name");
                Ok(Outcome::Pass)
            }
        }
    }
}

fn respond(cx: RequestContext, body: Body) -> Dispatch {
    let (_, head) = cx.into_parts();
    Dispatch::Responded(head.finish(body))
}

/// The default router: tokens kept in memory, JSON route arguments, and
/// signals delivered as response headers.
impl Default for Router {
    fn default() -> Self {
        Self::new(Arc::new(TokenService::default()))
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("paths", &self.paths())
            .field("routes", &*self.routes.read())
            .field("tokens", &self.tokens)
            .finish()
    }
}

/// Represents the handler of requests that pass through the router.
/// This trait is implemented for asynchronous functions that take a `Request`
/// and return a `Result<Response<Body>, BoxError>`.
/// ```rust
/// # use tokenroute::{BoxError, Handler};
/// # use hyper::{Request, Response, Body};
/// async fn not_found(_: Request<Body>) -> Result<Response<Body>, BoxError> {
///     Ok(Response::new(Body::from("nothing here")))
/// }
///
/// let handler: Box<dyn Handler> = Box::new(not_found);
/// ```
pub trait Handler: Send + Sync {
    fn handle(&self, req: Request<Body>) -> BoxFuture<'static, Result<Response<Body>, BoxError>>;
}

impl<F, R> Handler for F
where
    F: Fn(Request<Body>) -> R + Send + Sync,
    R: Future<Output = Result<Response<Body>, BoxError>> + Send + 'static,
{
    fn handle(&self, req: Request<Body>) -> BoxFuture<'static, Result<Response<Body>, BoxError>> {
        Box::pin(self(req))
    }
}

#[doc(hidden)]
pub struct MakeRouterService(RouterService);

impl<T> Service<T> for MakeRouterService {
    type Response = RouterService;
    type Error = Error;
    type Future = future::Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _: T) -> Self::Future {
        let service = self.0.clone();
        future::ok(service)
    }
}

#[doc(hidden)]
#[derive(Clone)]
pub struct RouterService(Arc<Router>);

impl RouterService {
    fn new(router: Router) -> Self {
        RouterService(Arc::new(router))
    }
}

impl Service<Request<Body>> for RouterService {
    type Response = Response<Body>;
    type Error = Error;
    type Future = ResponseFut;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let router = self.0.clone();
        ResponseFut(Box::pin(async move { router.serve(req).await }))
    }
}

impl Router {
    /// Converts the `Router` into a `Service` which you can serve directly with `Hyper`.
    /// If you have an existing `Service` that you want to incorporate a `Router` into, see
    /// [`Router::serve`](crate::Router::serve).
    /// ```rust,no_run
    /// # use tokenroute::Router;
    /// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
    /// let service = Router::default().into_service();
    ///
    /// hyper::Server::bind(&([127, 0, 0, 1], 3030).into())
    ///     .serve(service)
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn into_service(self) -> MakeRouterService {
        MakeRouterService(RouterService::new(self))
    }

    /// An asynchronous function from a `Request` to a `Response`. Requests
    /// that pass through the router are answered by the fallback handler,
    /// and any headers armed during dispatch are added to its response.
    pub async fn serve(&self, req: Request<Body>) -> Result<Response<Body>, Error> {
        let cx = match self.dispatch(req).await? {
            Dispatch::Responded(response) => return Ok(response),
            Dispatch::Passthrough(cx) => cx,
        };

        let (req, head) = cx.into_parts();
        let mut response = match &self.fallback {
            Some(handler) => handler.handle(req).await.map_err(Error::Fallback)?,
            None => {
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::NOT_FOUND;
                response
            }
        };
        head.apply(&mut response);
        Ok(response)
    }
}

pub struct ResponseFut(BoxFuture<'static, Result<Response<Body>, Error>>);

impl Future for ResponseFut {
    type Output = Result<Response<Body>, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.0.as_mut().poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn builtin_entries_come_first() {
        let router = Router::default().path(
            "/a",
            |_, _| Ok(()),
            |_, _: ()| Box::pin(async { Ok(Outcome::Pass) }),
        );
        assert_eq!(router.paths(), vec!["/", DEFAULT_ROUTE_PATH, "/a"]);
    }

    #[test]
    fn route_path_keeps_position() {
        let router = Router::default().route_path("/call/:name/:args*");
        assert_eq!(router.paths(), vec!["/", "/call/:name/:args*"]);
    }

    #[test]
    #[should_panic(expected = "expect path beginning with '/'")]
    fn relative_template_panics() {
        let _ = Router::default().path(
            "a",
            |_, _| Ok(()),
            |_, _: ()| Box::pin(async { Ok(Outcome::Pass) }),
        );
    }

    #[test]
    #[should_panic(expected = "must declare a ':name' parameter")]
    fn route_path_requires_name() {
        let _ = Router::default().route_path("/call/:args*");
    }

    #[tokio::test]
    async fn route_arguments_are_decoded() {
        let router = Router::default();
        router.add_routes(RouteNode::namespace().with(
            "echo",
            RouteNode::route(|_, args| {
                Box::pin(async move { Ok(Outcome::body(Value::Array(args).to_string())) })
            }),
        ));

        let dispatch = router
            .dispatch(get("/r/echo/1/%7B%22a%22%3A%22b%22%7D"))
            .await
            .unwrap();
        let response = match dispatch {
            Dispatch::Responded(response) => response,
            Dispatch::Passthrough(_) => panic!("expected a response"),
        };
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(body, json!([1, { "a": "b" }]).to_string());
    }

    #[tokio::test]
    async fn bad_route_argument_is_fatal() {
        let router = Router::default();
        match router.dispatch(get("/r/echo/%7Bnope")).await {
            Err(Error::InvalidArgument { segment, .. }) => assert_eq!(segment, "{nope"),
            other => panic!("expected an argument error, got {:?}", other),
        }
    }
}
