//! Error types for the token flow
//!
//! One variant per way the flow can fail, so callers match on the failure
//! kind instead of inspecting status codes.

/// Errors from token acquisition.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport failure: connect, timeout, or unreadable body
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("invalid endpoint URL: {0}")]
    Endpoint(String),

    /// Session auth rejected the username/password
    #[error("invalid credentials: {0}")]
    Credential(String),

    #[error("client id lookup failed: {0}")]
    ConfigFetch(String),

    /// Authorization endpoint did not redirect, or the redirect had no usable Location
    #[error("authorization redirect malformed: {0}")]
    RedirectProtocol(String),

    #[error("authorization redirect carried no code: {0}")]
    MissingAuthCode(String),

    /// Token endpoint rejected the code/verifier
    #[error("token exchange failed: {0}")]
    TokenExchange(String),
}

impl Error {
    /// Short, stable label for metrics and JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Http(_) => "http",
            Error::Endpoint(_) => "endpoint",
            Error::Credential(_) => "credential",
            Error::ConfigFetch(_) => "config_fetch",
            Error::RedirectProtocol(_) => "redirect_protocol",
            Error::MissingAuthCode(_) => "missing_auth_code",
            Error::TokenExchange(_) => "token_exchange",
        }
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
