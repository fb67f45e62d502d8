//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The account password is read from ARUBA_PASSWORD or `password_file`,
//! never stored in the TOML directly to avoid leaking secrets.

use common::Secret;
use instant_on_auth::endpoints::{DEFAULT_PORTAL_URL, DEFAULT_SCOPE, DEFAULT_SSO_URL};
use instant_on_auth::{AuthEndpoints, Credentials};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const USERNAME_ENV: &str = "ARUBA_USERNAME";
pub const PASSWORD_ENV: &str = "ARUBA_PASSWORD";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

/// Identity provider settings and account credentials
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub sso_url: String,
    pub portal_url: String,
    /// Defaults to `portal_url`
    pub redirect_uri: Option<String>,
    pub scope: String,
    pub username: Option<String>,
    /// File holding the account password (alternative to ARUBA_PASSWORD)
    pub password_file: Option<PathBuf>,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
    pub timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            sso_url: DEFAULT_SSO_URL.into(),
            portal_url: DEFAULT_PORTAL_URL.into(),
            redirect_uri: None,
            scope: DEFAULT_SCOPE.into(),
            username: None,
            password_file: None,
            password: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl AuthConfig {
    pub fn endpoints(&self) -> AuthEndpoints {
        AuthEndpoints {
            sso_url: self.sso_url.clone(),
            portal_url: self.portal_url.clone(),
            redirect_uri: self
                .redirect_uri
                .clone()
                .unwrap_or_else(|| self.portal_url.clone()),
            scope: self.scope.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Username and password, or the name of whichever is missing.
    pub fn credentials(&self) -> common::Result<Credentials> {
        let username = self
            .username
            .clone()
            .ok_or(common::Error::MissingCredential(USERNAME_ENV))?;
        let password = self
            .password
            .clone()
            .ok_or(common::Error::MissingCredential(PASSWORD_ENV))?;
        Ok(Credentials { username, password })
    }
}

/// HTTP relay settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub listen_addr: SocketAddr,
    /// Base of the sites/alerts API
    pub api_url: String,
    pub timeout_secs: u64,
    pub max_connections: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            api_url: "https://portal.instant-on.hpe.com/api".into(),
            timeout_secs: default_timeout(),
            max_connections: 100,
        }
    }
}

/// Periodic alert snapshot settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub snapshot_path: PathBuf,
    pub error_log_path: PathBuf,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 300,
            snapshot_path: PathBuf::from("problem-alerts.json"),
            error_log_path: PathBuf::from("problem-alerts-errors.log"),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn require_http_url(field: &str, value: &str) -> common::Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {value}"
        )))
    }
}

fn require_nonzero(field: &str, value: u64) -> common::Result<()> {
    if value == 0 {
        return Err(common::Error::Config(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

/// Where the config file is expected, and whether the operator named it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocation {
    pub path: PathBuf,
    /// Set by `--config` or CONFIG_PATH; an explicit file must exist.
    pub explicit: bool,
}

pub const DEFAULT_CONFIG_PATH: &str = "instant-on-relay.toml";

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Credential resolution order:
    /// 1. ARUBA_USERNAME / ARUBA_PASSWORD env vars
    /// 2. `username` / `password_file` from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.finish()
    }

    /// Like `load`, but a missing default file means built-in defaults plus
    /// environment variables.
    pub fn load_from(location: &ConfigLocation) -> common::Result<Self> {
        if !location.explicit && !location.path.exists() {
            return Config::default().finish();
        }
        Self::load(&location.path)
    }

    fn finish(mut self) -> common::Result<Self> {
        self.validate()?;

        if let Ok(username) = std::env::var(USERNAME_ENV) {
            self.auth.username = Some(username);
        }

        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            self.auth.password = Some(Secret::new(password));
        } else if let Some(ref password_file) = self.auth.password_file {
            let password = std::fs::read_to_string(password_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read password_file {}: {e}",
                    password_file.display()
                ))
            })?;
            let password = password.trim_end_matches(['\r', '\n']).to_owned();
            if !password.is_empty() {
                self.auth.password = Some(Secret::new(password));
            }
        }

        Ok(self)
    }

    fn validate(&self) -> common::Result<()> {
        require_http_url("sso_url", &self.auth.sso_url)?;
        require_http_url("portal_url", &self.auth.portal_url)?;
        if let Some(ref redirect_uri) = self.auth.redirect_uri {
            require_http_url("redirect_uri", redirect_uri)?;
        }
        require_http_url("api_url", &self.relay.api_url)?;
        require_nonzero("auth.timeout_secs", self.auth.timeout_secs)?;
        require_nonzero("relay.timeout_secs", self.relay.timeout_secs)?;
        require_nonzero("max_connections", self.relay.max_connections as u64)?;
        if self.snapshot.enabled {
            require_nonzero("snapshot.interval_secs", self.snapshot.interval_secs)?;
        }
        Ok(())
    }

    /// Resolve config file location from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> ConfigLocation {
        if let Some(p) = cli_path {
            return ConfigLocation {
                path: PathBuf::from(p),
                explicit: true,
            };
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return ConfigLocation {
                path: PathBuf::from(p),
                explicit: true,
            };
        }
        ConfigLocation {
            path: PathBuf::from(DEFAULT_CONFIG_PATH),
            explicit: false,
        }
    }
}
