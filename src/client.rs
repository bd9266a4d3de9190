//! Client side of the token handoff.
//!
//! [`Client`] builds named route URLs with the same template and codec as
//! the server, and navigates to them. When the local session knows who the
//! user is, a fresh token is requested first and appended to the target URL
//! as `_u` and `_t`, so the server can authenticate the request without
//! relying on cookies surviving the redirect.
//!
//! If the server had to answer a request without knowing the user, it arms
//! the `auth-refresh` signal. [`Client::on_load`] consumes that signal and
//! repeats the navigation to the current URL, this time with a token.

use crate::auth::{TOKEN_PARAM, USER_PARAM};
use crate::codec::{Codec, JsonCodec};
use crate::error::{BoxError, Error};
use crate::params::ParamValue;
use crate::pattern::{PathOptions, Pattern};
use crate::router::DEFAULT_ROUTE_PATH;
use crate::routes::RouteNode;
use crate::signal::{InjectedSignals, SignalSource, AUTH_REFRESH};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use url::{Position, Url};

/// The identity known to the local session.
pub trait Session: Send + Sync {
    fn user_id(&self) -> Option<String>;
}

/// Requests a token for the session's user from the server.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn user_token(&self) -> Result<Option<String>, BoxError>;
}

/// Performs the actual navigation.
pub trait Navigator: Send + Sync {
    fn navigate(&self, url: &str);
}

/// Builds route URLs and navigates to them, authenticating when possible.
pub struct Client {
    pattern: Pattern,
    codec: Arc<dyn Codec>,
    session: Arc<dyn Session>,
    tokens: Arc<dyn TokenSource>,
    navigator: Arc<dyn Navigator>,
    signals: Arc<dyn SignalSource>,
}

impl Client {
    pub fn new(
        session: impl Session + 'static,
        tokens: impl TokenSource + 'static,
        navigator: impl Navigator + 'static,
    ) -> Self {
        Self {
            pattern: Pattern::compile(DEFAULT_ROUTE_PATH, PathOptions::exact())
                .expect("default route path compiles"),
            codec: Arc::new(JsonCodec),
            session: Arc::new(session),
            tokens: Arc::new(tokens),
            navigator: Arc::new(navigator),
            signals: Arc::new(InjectedSignals::new()),
        }
    }

    /// Use the named route template configured on the server.
    ///
    /// # Panics
    ///
    /// Panics if `template` does not compile.
    pub fn route_path(mut self, template: &str) -> Self {
        self.pattern = match Pattern::compile(template, PathOptions::exact()) {
            Ok(pattern) => pattern,
            Err(err) => panic!("{}", err),
        };
        self
    }

    pub fn codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Where one-shot signals from the server are read from.
    pub fn signals(mut self, signals: impl SignalSource + 'static) -> Self {
        self.signals = Arc::new(signals);
        self
    }

    /// The relative URL calling the route `name` with `args`.
    /// ```rust
    /// # use tokenroute::client::{Client, Navigator, Session, TokenSource};
    /// # use tokenroute::BoxError;
    /// # struct Anonymous;
    /// # impl Session for Anonymous { fn user_id(&self) -> Option<String> { None } }
    /// # #[async_trait::async_trait]
    /// # impl TokenSource for Anonymous { async fn user_token(&self) -> Result<Option<String>, BoxError> { Ok(None) } }
    /// # impl Navigator for Anonymous { fn navigate(&self, _: &str) {} }
    /// use serde_json::json;
    ///
    /// let client = Client::new(Anonymous, Anonymous, Anonymous);
    /// let url = client.build_url("reports.salesPDF", &[json!(2026)]).unwrap();
    /// assert_eq!(url, "/r/reports.salesPDF/2026");
    /// ```
    pub fn build_url(&self, name: &str, args: &[Value]) -> Result<String, Error> {
        let segments = args
            .iter()
            .map(|arg| {
                self.codec
                    .encode(arg)
                    .map_err(|source| Error::EncodeArgument {
                        value: arg.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut values = BTreeMap::new();
        values.insert("name".to_owned(), ParamValue::from(name));
        values.insert("args".to_owned(), ParamValue::Repeated(segments));
        Ok(self.pattern.build(&values)?)
    }

    /// Navigates to `url`, adding credentials when the session has a user.
    ///
    /// Fails if the token request fails or `url` cannot be parsed; nothing
    /// is navigated in that case.
    pub async fn navigate(&self, url: &str) -> Result<(), Error> {
        let user_id = match self.session.user_id() {
            Some(user_id) => user_id,
            None => {
                self.navigator.navigate(url);
                return Ok(());
            }
        };

        let target = match self.tokens.user_token().await.map_err(Error::TokenRpc)? {
            Some(token) => with_credentials(url, &user_id, &token)?,
            None => {
                tracing::warn!(user_id = %user_id, "server issued no token, navigating without one");
                url.to_owned()
            }
        };
        self.navigator.navigate(&target);
        Ok(())
    }

    /// Navigates to the route `name` with `args`.
    pub async fn redirect(&self, name: &str, args: &[Value]) -> Result<(), Error> {
        let url = self.build_url(name, args)?;
        self.navigate(&url).await
    }

    /// Handles the `auth-refresh` signal on page load. Returns whether the
    /// current URL was navigated to again with credentials.
    pub async fn on_load(&self, current_url: &str) -> Result<bool, Error> {
        let armed = match self.signals.take(AUTH_REFRESH) {
            Some(Value::Null) | Some(Value::Bool(false)) | None => false,
            Some(_) => true,
        };
        if !armed || self.session.user_id().is_none() {
            return Ok(false);
        }

        tracing::debug!(url = current_url, "retrying navigation with a token");
        self.navigate(current_url).await?;
        Ok(true)
    }

    /// Mirrors a route tree into a tree of [`RouteLink`]s of the same shape.
    /// Only the shape of `mirror` is used; its leaves can hold anything.
    pub fn links<T>(self: &Arc<Self>, mirror: &RouteNode<T>) -> RouteNode<RouteLink> {
        mirror.map(|name, _| RouteLink {
            name: name.to_owned(),
            client: Arc::clone(self),
        })
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("route_path", &self.pattern.template())
            .finish()
    }
}

/// A URL builder and redirect for one named route.
#[derive(Clone)]
pub struct RouteLink {
    name: String,
    client: Arc<Client>,
}

impl RouteLink {
    /// The dotted route name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self, args: &[Value]) -> Result<String, Error> {
        self.client.build_url(&self.name, args)
    }

    pub async fn redirect(&self, args: &[Value]) -> Result<(), Error> {
        self.client.redirect(&self.name, args).await
    }
}

impl fmt::Debug for RouteLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RouteLink").field(&self.name).finish()
    }
}

// Resolves relative navigation targets; only the path onwards is kept.
const RELATIVE_BASE: &str = "http://localhost/";

/// Appends `_u` and `_t` to the query of `url`, replacing any earlier ones
/// and keeping every other parameter and the fragment. Relative URLs stay
/// relative.
fn with_credentials(url: &str, user_id: &str, token: &str) -> Result<String, url::ParseError> {
    let (mut target, relative) = match Url::parse(url) {
        Ok(target) => (target, false),
        Err(url::ParseError::RelativeUrlWithoutBase) => (Url::parse(RELATIVE_BASE)?.join(url)?, true),
        Err(err) => return Err(err),
    };

    let pairs: Vec<(String, String)> = target
        .query_pairs()
        .filter(|(key, _)| *key != USER_PARAM && *key != TOKEN_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    target
        .query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair(USER_PARAM, user_id)
        .append_pair(TOKEN_PARAM, token);

    if relative {
        Ok(target[Position::BeforePath..].to_owned())
    } else {
        Ok(target.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::io;

    struct User(Option<&'static str>);

    impl Session for User {
        fn user_id(&self) -> Option<String> {
            self.0.map(str::to_owned)
        }
    }

    enum Tokens {
        Fixed(&'static str),
        Missing,
        Failing,
    }

    #[async_trait]
    impl TokenSource for Tokens {
        async fn user_token(&self) -> Result<Option<String>, BoxError> {
            match self {
                Tokens::Fixed(token) => Ok(Some((*token).to_owned())),
                Tokens::Missing => Ok(None),
                Tokens::Failing => Err(io::Error::new(io::ErrorKind::Other, "offline").into()),
            }
        }
    }

    #[derive(Clone, Default)]
    struct History(Arc<Mutex<Vec<String>>>);

    impl History {
        fn urls(&self) -> Vec<String> {
            self.0.lock().clone()
        }
    }

    impl Navigator for History {
        fn navigate(&self, url: &str) {
            self.0.lock().push(url.to_owned());
        }
    }

    fn client(user: Option<&'static str>, tokens: Tokens) -> (Client, History) {
        let history = History::default();
        (Client::new(User(user), tokens, history.clone()), history)
    }

    #[test]
    fn credentials_are_appended() {
        assert_eq!(with_credentials("/a", "u1", "t1").unwrap(), "/a?_u=u1&_t=t1");
        assert_eq!(
            with_credentials("/a?x=1&y=%20", "u1", "t1").unwrap(),
            "/a?x=1&y=+&_u=u1&_t=t1"
        );
        assert_eq!(
            with_credentials("/a?x=1#top", "u 1", "t/1").unwrap(),
            "/a?x=1&_u=u+1&_t=t%2F1#top"
        );
        assert_eq!(
            with_credentials("/r/reports.salesPDF/%7B%22year%22%3A2026%7D", "u1", "t1").unwrap(),
            "/r/reports.salesPDF/%7B%22year%22%3A2026%7D?_u=u1&_t=t1"
        );
    }

    #[test]
    fn absolute_urls_keep_their_origin() {
        assert_eq!(
            with_credentials("https://example.com/a?x=1", "u1", "t1").unwrap(),
            "https://example.com/a?x=1&_u=u1&_t=t1"
        );
    }

    #[test]
    fn stale_credentials_are_replaced() {
        assert_eq!(
            with_credentials("/a?_u=old&x=1&_t=stale", "u1", "t1").unwrap(),
            "/a?x=1&_u=u1&_t=t1"
        );
    }

    #[test]
    fn unencodable_argument_is_reported() {
        struct Refusing;

        impl Codec for Refusing {
            fn encode(&self, _: &Value) -> Result<String, BoxError> {
                Err("refused".into())
            }

            fn decode(&self, segment: &str) -> Result<Value, BoxError> {
                Ok(Value::String(segment.to_owned()))
            }
        }

        let (client, _) = client(None, Tokens::Missing);
        let client = client.codec(Refusing);
        match client.build_url("home", &[json!(1)]) {
            Err(err @ Error::EncodeArgument { .. }) => {
                assert!(err.to_string().starts_with("failed to serialize route argument `1`"));
            }
            other => panic!("expected an encoding error, got {:?}", other),
        }
    }

    #[test]
    fn build_url_encodes_arguments() {
        let (client, _) = client(None, Tokens::Missing);

        assert_eq!(client.build_url("home", &[]).unwrap(), "/r/home");
        assert_eq!(
            client.build_url("reports.salesPDF", &[json!({"year": 2026}), json!("q1")]).unwrap(),
            "/r/reports.salesPDF/%7B%22year%22%3A2026%7D/%22q1%22"
        );
    }

    #[test]
    fn custom_route_path() {
        let (client, _) = client(None, Tokens::Missing);
        let client = client.route_path("/call/:name/:args*");
        assert_eq!(client.build_url("a.b", &[json!(1)]).unwrap(), "/call/a.b/1");
    }

    #[tokio::test]
    async fn anonymous_navigation_is_direct() {
        let (client, history) = client(None, Tokens::Failing);
        client.navigate("/somewhere?x=1").await.unwrap();
        assert_eq!(history.urls(), vec!["/somewhere?x=1".to_owned()]);
    }

    #[tokio::test]
    async fn authenticated_navigation_carries_a_token() {
        let (client, history) = client(Some("alice"), Tokens::Fixed("secret"));
        client.redirect("reports.salesPDF", &[json!(1)]).await.unwrap();
        assert_eq!(
            history.urls(),
            vec!["/r/reports.salesPDF/1?_u=alice&_t=secret".to_owned()]
        );
    }

    #[tokio::test]
    async fn missing_token_navigates_without_credentials() {
        let (client, history) = client(Some("alice"), Tokens::Missing);
        client.navigate("/a").await.unwrap();
        assert_eq!(history.urls(), vec!["/a".to_owned()]);
    }

    #[tokio::test]
    async fn token_failure_is_reported() {
        let (client, history) = client(Some("alice"), Tokens::Failing);
        assert!(matches!(client.navigate("/a").await, Err(Error::TokenRpc(_))));
        assert!(history.urls().is_empty());
    }

    #[tokio::test]
    async fn on_load_retries_once_per_signal() {
        let signals = InjectedSignals::new();
        signals.insert(AUTH_REFRESH, json!(true));
        let (client, history) = client(Some("alice"), Tokens::Fixed("secret"));
        let client = client.signals(signals);

        assert!(client.on_load("/r/home?_u=alice&_t=used").await.unwrap());
        assert!(!client.on_load("/r/home?_u=alice&_t=used").await.unwrap());
        assert_eq!(history.urls(), vec!["/r/home?_u=alice&_t=secret".to_owned()]);
    }

    #[tokio::test]
    async fn on_load_needs_a_user() {
        let signals = InjectedSignals::new();
        signals.insert(AUTH_REFRESH, json!(true));
        let (client, history) = client(None, Tokens::Fixed("secret"));
        let client = client.signals(signals);

        assert!(!client.on_load("/r/home").await.unwrap());
        assert!(history.urls().is_empty());
    }

    #[tokio::test]
    async fn links_mirror_the_route_tree() {
        let mut mirror = RouteNode::namespace();
        mirror.insert("reports.salesPDF", ());
        mirror.insert("home", ());

        let (client, history) = client(Some("alice"), Tokens::Fixed("secret"));
        let links = Arc::new(client).links(&mirror);

        let sales = links.get("reports.salesPDF").unwrap();
        assert_eq!(sales.name(), "reports.salesPDF");
        assert_eq!(sales.url(&[json!(1)]).unwrap(), "/r/reports.salesPDF/1");
        assert!(links.get("reports").is_none());

        links.get("home").unwrap().redirect(&[]).await.unwrap();
        assert_eq!(history.urls(), vec!["/r/home?_u=alice&_t=secret".to_owned()]);
    }
}
