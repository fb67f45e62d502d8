//! Instant On SSO endpoint configuration
//!
//! The vendor hosts are public and fixed in production, but every URL is
//! carried in `AuthEndpoints` so tests and staging setups can point the
//! flow at other servers.

/// Identity provider host (session auth, authorization, token endpoints)
pub const DEFAULT_SSO_URL: &str = "https://sso.arubainstanton.com";

/// Portal host serving `settings.json`; also the registered redirect URI
pub const DEFAULT_PORTAL_URL: &str = "https://portal.arubainstanton.com";

/// Scope requested for the portal client
pub const DEFAULT_SCOPE: &str = "profile openid";

pub const SESSION_PATH: &str = "/aio/api/v1/mfa/validate/full";
pub const SETTINGS_PATH: &str = "/settings.json";
pub const AUTHORIZE_PATH: &str = "/as/authorization.oauth2";
pub const TOKEN_PATH: &str = "/as/token.oauth2";

/// Base URLs and fixed OAuth parameters for one identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEndpoints {
    pub sso_url: String,
    pub portal_url: String,
    pub redirect_uri: String,
    pub scope: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            sso_url: DEFAULT_SSO_URL.into(),
            portal_url: DEFAULT_PORTAL_URL.into(),
            redirect_uri: DEFAULT_PORTAL_URL.into(),
            scope: DEFAULT_SCOPE.into(),
        }
    }
}

impl AuthEndpoints {
    pub fn session_url(&self) -> String {
        join(&self.sso_url, SESSION_PATH)
    }

    pub fn settings_url(&self) -> String {
        join(&self.portal_url, SETTINGS_PATH)
    }

    pub fn authorize_url(&self) -> String {
        join(&self.sso_url, AUTHORIZE_PATH)
    }

    pub fn token_url(&self) -> String {
        join(&self.sso_url, TOKEN_PATH)
    }
}

fn join(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}
