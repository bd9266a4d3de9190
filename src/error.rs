//! Errors produced while compiling paths, dispatching requests and
//! performing the token handoff.

use thiserror::Error;

/// A type-erased error returned by handlers, argument mappers and external
/// collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the pattern compiler, either while parsing a template or
/// while building a path from parameters.
#[derive(Debug, Error)]
pub enum PatternError {
    /// The template, or a custom parameter pattern, is not a valid expression.
    #[error("invalid path template `{template}`: {source}")]
    Template {
        template: String,
        #[source]
        source: regex::Error,
    },

    /// A required parameter was not supplied to the builder.
    #[error("expected \"{0}\" to be defined")]
    Missing(String),

    /// A list of values was supplied for a parameter that does not repeat.
    #[error("expected \"{0}\" to not repeat, but received a list")]
    Repeated(String),

    /// An empty list was supplied for a required repeated parameter.
    #[error("expected \"{0}\" to not be empty")]
    Empty(String),

    /// An encoded value does not satisfy the parameter's pattern.
    #[error("expected \"{name}\" to match \"{pattern}\", but received `{segment}`")]
    Mismatch {
        name: String,
        pattern: String,
        segment: String,
    },
}

/// The error type of this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// A captured path segment is not valid percent-encoded UTF-8.
    #[error("invalid request path segment `{0}`")]
    InvalidPath(String),

    /// The query string could not be parsed.
    #[error("invalid query string: {0}")]
    InvalidQuery(#[from] serde_urlencoded::de::Error),

    /// A named route argument could not be deserialized.
    #[error("failed to deserialize route argument `{segment}`: {source}")]
    InvalidArgument {
        segment: String,
        #[source]
        source: BoxError,
    },

    /// A route argument could not be serialized into a URL segment.
    #[error("failed to serialize route argument `{value}`: {source}")]
    EncodeArgument {
        value: String,
        #[source]
        source: BoxError,
    },

    /// A URL to navigate to could not be parsed.
    #[error("invalid navigation URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A path entry's argument mapper failed.
    #[error("failed to map path arguments: {0}")]
    Arguments(#[source] BoxError),

    /// A handler failed with something other than an authentication request.
    #[error("handler failed: {0}")]
    Handler(#[source] BoxError),

    /// The token store failed.
    #[error("token store error: {0}")]
    Store(#[source] BoxError),

    /// The fallback handler failed on a passed-through request.
    #[error("fallback handler failed: {0}")]
    Fallback(#[source] BoxError),

    /// The client could not obtain a token for an authenticated redirect.
    #[error("failed to obtain an auth token: {0}")]
    TokenRpc(#[source] BoxError),
}
