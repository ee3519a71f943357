//! ledger-auth
//!
//! Session lifecycle for the ledger web client and its hosts:
//!
//! - **Session Store**: where token, user snapshot and expiry live
//!   ([`SessionStore`]: memory, file, detached, or a sealed server cookie)
//! - **Session Policy**: whether a stored session is still usable ([`policy`])
//! - **Auth Gateway**: login, logout, profile, and 401-aware API calls ([`AuthGateway`])
//! - **Route Guard**: sign-in redirects on navigation ([`RouteGuard`])
//!
//! Navigation is returned as a [`Redirect`] value for the host to act on.
//!
//! ## Quick start
//! ```no_run
//! use std::sync::Arc;
//! use ledger_auth::{AuthGateway, ClientConfig, Location, MemoryStore, RouteGuard, GuardDecision};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_env()?;
//! let store = Arc::new(MemoryStore::new());
//! let gateway = AuthGateway::new(config.clone(), store.clone())?;
//! let guard = RouteGuard::new(store, config.sign_in_path.clone());
//!
//! let next = gateway.login("me@example.com", "correct horse").await?;
//! println!("navigate to {}", next.href());
//!
//! if let GuardDecision::Redirect(r) = guard.check(&Location::parse("/accounts")) {
//!     println!("navigate to {}", r.href());
//! }
//! # Ok(()) }
//! ```

#![forbid(unsafe_code)]

pub mod config;
#[cfg(feature = "cookie-session")]
mod cookie;
mod error;
mod gateway;
mod guard;
pub mod policy;
mod session;
mod store;
mod throttle;

pub use config::ClientConfig;
#[cfg(feature = "cookie-session")]
pub use config::ServerConfig;
#[cfg(feature = "cookie-session")]
pub use cookie::{
    CookieOptions, CookieStore, SameSite, SessionKey, build_clear_cookie, build_set_cookie,
    find_cookie, open as open_cookie, seal as seal_cookie,
};
pub use error::{Error, Result};
pub use gateway::{
    ApiRequest, AuthGateway, LOGIN_ENDPOINT, LOGOUT_ENDPOINT, PROFILE_ENDPOINT,
    login_error_message, validate_credentials,
};
pub use guard::{GuardDecision, Guarded, Location, Redirect, RouteGuard, safe_destination};
pub use reqwest::{Method, Response, StatusCode};
pub use session::{Session, UserSnapshot};
pub use store::{DetachedStore, FileStore, MemoryStore, SessionStore};
pub use throttle::LoginThrottle;
