//! Short-lived, single-use tokens that carry a user's identity across a
//! redirect.
//!
//! An authenticated client asks for a token, appends it to the URL it is
//! about to open, and the router's built-in token path consumes it on the
//! next request. A token is accepted at most once and only before it
//! expires; every validation attempt also clears the user's expired tokens.

use crate::error::{BoxError, Error};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use subtle::ConstantTimeEq;

/// Query parameter carrying the user id of a token handoff.
pub const USER_PARAM: &str = "_u";
/// Query parameter carrying the token of a token handoff.
pub const TOKEN_PARAM: &str = "_t";

const DEFAULT_TTL_SECS: i64 = 60;
const DEFAULT_TOKEN_LEN: usize = 43;

/// A token attached to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of token values.
pub trait TokenGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Generates alphanumeric tokens from the thread-local CSPRNG.
#[derive(Debug, Clone, Copy)]
pub struct RandomToken {
    len: usize,
}

impl RandomToken {
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl Default for RandomToken {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_LEN)
    }
}

impl TokenGenerator for RandomToken {
    fn generate(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.len)
            .map(char::from)
            .collect()
    }
}

/// The user store holding each user's outstanding tokens.
///
/// Each method must apply atomically with respect to the other methods
/// called for the same user.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Whether `user_id` holds `token` with an expiry at or after `now`.
    async fn find_valid(&self, user_id: &str, token: &str, now: DateTime<Utc>) -> Result<bool, BoxError>;

    /// Attaches a token to `user_id`.
    async fn push_token(&self, user_id: &str, token: AuthToken) -> Result<(), BoxError>;

    /// Removes every token of `user_id` whose value equals `token` or whose
    /// expiry is before `now`. Returns whether an unexpired token equal to
    /// `token` was among the removed ones.
    async fn pull_tokens(&self, user_id: &str, token: &str, now: DateTime<Utc>) -> Result<bool, BoxError>;
}

#[async_trait]
impl<S: TokenStore + ?Sized> TokenStore for Arc<S> {
    async fn find_valid(&self, user_id: &str, token: &str, now: DateTime<Utc>) -> Result<bool, BoxError> {
        (**self).find_valid(user_id, token, now).await
    }

    async fn push_token(&self, user_id: &str, token: AuthToken) -> Result<(), BoxError> {
        (**self).push_token(user_id, token).await
    }

    async fn pull_tokens(&self, user_id: &str, token: &str, now: DateTime<Utc>) -> Result<bool, BoxError> {
        (**self).pull_tokens(user_id, token, now).await
    }
}

/// An in-process token store. Updates for a user run under that user's
/// map entry lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<String, Vec<AuthToken>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The tokens currently attached to `user_id`.
    pub fn tokens(&self, user_id: &str) -> Vec<AuthToken> {
        self.users
            .get(user_id)
            .map(|tokens| tokens.value().clone())
            .unwrap_or_default()
    }
}

fn token_matches(stored: &str, provided: &str) -> bool {
    stored.as_bytes().ct_eq(provided.as_bytes()).into()
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn find_valid(&self, user_id: &str, token: &str, now: DateTime<Utc>) -> Result<bool, BoxError> {
        Ok(self
            .users
            .get(user_id)
            .map(|tokens| {
                tokens
                    .iter()
                    .any(|t| token_matches(&t.value, token) && t.expires_at >= now)
            })
            .unwrap_or(false))
    }

    async fn push_token(&self, user_id: &str, token: AuthToken) -> Result<(), BoxError> {
        self.users.entry(user_id.to_owned()).or_default().push(token);
        Ok(())
    }

    async fn pull_tokens(&self, user_id: &str, token: &str, now: DateTime<Utc>) -> Result<bool, BoxError> {
        let mut consumed = false;
        if let Some(mut tokens) = self.users.get_mut(user_id) {
            tokens.retain(|t| {
                let matched = token_matches(&t.value, token);
                let expired = t.expires_at < now;
                consumed |= matched && !expired;
                !(matched || expired)
            });
        }
        self.users.remove_if(user_id, |_, tokens| tokens.is_empty());
        Ok(consumed)
    }
}

/// Issues and validates single-use tokens.
pub struct TokenService {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    generator: Arc<dyn TokenGenerator>,
    ttl: Duration,
}

impl TokenService {
    /// A service over `store`, using the system clock, random tokens, and a
    /// sixty second lifetime.
    pub fn new(store: impl TokenStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
            clock: Arc::new(SystemClock),
            generator: Arc::new(RandomToken::default()),
            ttl: Duration::seconds(DEFAULT_TTL_SECS),
        }
    }

    /// How long an issued token stays valid.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn generator(mut self, generator: impl TokenGenerator + 'static) -> Self {
        self.generator = Arc::new(generator);
        self
    }

    /// Issues a new token for `user_id`. The caller must already have
    /// established that the request comes from `user_id`.
    pub async fn issue(&self, user_id: &str) -> Result<String, Error> {
        let token = AuthToken {
            value: self.generator.generate(),
            expires_at: self.clock.now() + self.ttl,
        };
        let value = token.value.clone();

        self.store
            .push_token(user_id, token)
            .await
            .map_err(Error::Store)?;

        tracing::debug!(user_id, "issued auth token");
        Ok(value)
    }

    /// Checks `token` for `user_id` and consumes it.
    ///
    /// Whatever the result, the user's expired tokens are removed, along
    /// with `token` itself.
    pub async fn validate(&self, user_id: &str, token: &str) -> Result<bool, Error> {
        let now = self.clock.now();
        let found = self
            .store
            .find_valid(user_id, token, now)
            .await
            .map_err(Error::Store)?;
        let consumed = self
            .store
            .pull_tokens(user_id, token, now)
            .await
            .map_err(Error::Store)?;

        let valid = found && consumed;
        if valid {
            tracing::debug!(user_id, "accepted auth token");
        } else {
            tracing::warn!(user_id, "rejected auth token");
        }
        Ok(valid)
    }

    /// Issues a token for the caller identified by the surrounding session,
    /// or returns `None` for an anonymous caller.
    pub async fn user_token(&self, caller: Option<&str>) -> Result<Option<String>, Error> {
        match caller {
            Some(user_id) => self.issue(user_id).await.map(Some),
            None => Ok(None),
        }
    }
}

impl Default for TokenService {
    fn default() -> Self {
        Self::new(MemoryStore::new())
    }
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("ttl", &self.ttl)
            .finish()
    }
}
