//! Process configuration.
//!
//! Client settings have safe defaults. Server settings do not: the cookie
//! sealing secret must be supplied and long enough, or startup fails.

use std::time::Duration;

use url::Url;

use crate::{Error, Result};

/// Fallback API base URL for local development.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Path of the sign-in page.
pub const DEFAULT_SIGN_IN_PATH: &str = "/signin";

/// Login submissions allowed before the throttle blocks locally.
pub const DEFAULT_MAX_LOGIN_ATTEMPTS: u32 = 5;

/// How long a blocked login form stays blocked after the last rejection.
pub const DEFAULT_LOGIN_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Settings every host needs. Never contains the sealing secret.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL without a trailing slash.
    pub api_url: String,
    /// Sign-in page; exempt from the route guard.
    pub sign_in_path: String,
    /// Post-login destination when none was requested.
    pub home_path: String,
    /// Rejections allowed before login is blocked.
    pub max_login_attempts: u32,
    /// Block duration once the ceiling is hit.
    pub login_cooldown: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            sign_in_path: DEFAULT_SIGN_IN_PATH.to_string(),
            home_path: "/".to_string(),
            max_login_attempts: DEFAULT_MAX_LOGIN_ATTEMPTS,
            login_cooldown: DEFAULT_LOGIN_COOLDOWN,
        }
    }
}

impl ClientConfig {
    /// Read `LEDGER_API_URL`, `LEDGER_SIGN_IN_PATH` and `LEDGER_MAX_LOGIN_ATTEMPTS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`ClientConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        if let Some(url) = get("LEDGER_API_URL") {
            cfg.api_url = url;
        }
        cfg.api_url = normalize_api_url(&cfg.api_url)?;

        if let Some(path) = get("LEDGER_SIGN_IN_PATH") {
            if !path.starts_with('/') {
                return Err(Error::Config(format!(
                    "LEDGER_SIGN_IN_PATH must start with '/': {path}"
                )));
            }
            cfg.sign_in_path = path;
        }

        if let Some(max) = get("LEDGER_MAX_LOGIN_ATTEMPTS") {
            cfg.max_login_attempts = max
                .trim()
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    Error::Config(format!("LEDGER_MAX_LOGIN_ATTEMPTS must be a positive integer: {max}"))
                })?;
        }

        Ok(cfg)
    }

    /// Scheme, host and port of the API, e.g. `http://localhost:8000`.
    pub fn origin(&self) -> String {
        Url::parse(&self.api_url)
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_else(|_| self.api_url.clone())
    }

    /// Absolute URL for an API path such as `/auth/login/`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }
}

fn normalize_api_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed)
        .map_err(|e| Error::Config(format!("invalid LEDGER_API_URL {trimmed:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "LEDGER_API_URL must be http or https: {trimmed}"
        )));
    }
    Ok(trimmed.to_string())
}

/// Settings for the server-side sealed cookie session.
#[cfg(feature = "cookie-session")]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Key derived from `SESSION_SECRET`.
    pub key: crate::SessionKey,
    /// Cookie attributes.
    pub cookie: crate::CookieOptions,
}

#[cfg(feature = "cookie-session")]
impl ServerConfig {
    /// Read `SESSION_SECRET` (required) and `LEDGER_ENV`.
    ///
    /// Call once at startup; an error here means the process must not serve
    /// authenticated routes.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`ServerConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let secret = lookup("SESSION_SECRET")
            .ok_or_else(|| Error::Config("SESSION_SECRET must be set".to_string()))?;
        let key = crate::SessionKey::from_secret(&secret)?;

        let production = lookup("LEDGER_ENV").is_some_and(|v| v.eq_ignore_ascii_case("production"));
        let cookie = crate::CookieOptions {
            secure: production,
            ..Default::default()
        };

        Ok(Self { key, cookie })
    }
}
