//! One-shot flags delivered from the server to client code after a redirect.
//!
//! The server arms a flag on the response it is preparing; the client reads
//! it once on its next load, after which the flag is gone.

use crate::context::ResponseHead;

use std::collections::HashMap;

use hyper::header::{HeaderName, HeaderValue};
use hyper::HeaderMap;
use parking_lot::Mutex;
use serde_json::Value;

/// The flag armed when a handler requires authentication.
pub const AUTH_REFRESH: &str = "auth-refresh";

const HEADER_PREFIX: &str = "x-inject-";

/// Server side of the channel.
pub trait SignalSink: Send + Sync {
    fn push(&self, response: &mut ResponseHead, key: &str, value: &Value);
}

/// Client side of the channel. A value is returned at most once.
pub trait SignalSource: Send + Sync {
    fn take(&self, key: &str) -> Option<Value>;
}

/// Delivers flags as `x-inject-<key>` response headers holding JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderSignal;

impl SignalSink for HeaderSignal {
    fn push(&self, response: &mut ResponseHead, key: &str, value: &Value) {
        let name = HeaderName::from_bytes(format!("{}{}", HEADER_PREFIX, key).as_bytes());
        let value = HeaderValue::from_str(&value.to_string());
        match (name, value) {
            (Ok(name), Ok(value)) => response.insert_header(name, value),
            _ => tracing::warn!(key, "signal cannot be carried in a header, dropped"),
        }
    }
}

/// Flags received by the client, each readable once.
#[derive(Debug, Default)]
pub struct InjectedSignals {
    values: Mutex<HashMap<String, Value>>,
}

impl InjectedSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects the flags written by [`HeaderSignal`].
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let signals = Self::new();
        for (name, value) in headers {
            let key = match name.as_str().strip_prefix(HEADER_PREFIX) {
                Some(key) => key,
                None => continue,
            };
            match value.to_str().map(serde_json::from_str::<Value>) {
                Ok(Ok(value)) => signals.insert(key, value),
                _ => tracing::warn!(key, "ignoring malformed injected signal"),
            }
        }
        signals
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.values.lock().insert(key.into(), value);
    }
}

impl SignalSource for InjectedSignals {
    fn take(&self, key: &str) -> Option<Value> {
        self.values.lock().remove(key)
    }
}
