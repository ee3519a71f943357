//! Network-facing half of the session lifecycle.
//!
//! [`AuthGateway`] performs every auth-related request and is the only place
//! the session is created. It owns the login throttle and turns a 401 from any
//! API call into a forced logout.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::ClientConfig;
use crate::guard::{Redirect, safe_destination};
use crate::policy;
use crate::store::SessionStore;
use crate::throttle::LoginThrottle;
use crate::{Error, Result, Session, UserSnapshot};

/// Backend login endpoint.
pub const LOGIN_ENDPOINT: &str = "/auth/login/";
/// Backend logout endpoint.
pub const LOGOUT_ENDPOINT: &str = "/auth/logout/";
/// Backend profile ("get session") endpoint.
pub const PROFILE_ENDPOINT: &str = "/auth/profile/";

/// An API call routed through [`AuthGateway::api_call`].
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// JSON body.
    pub body: Option<Value>,
    /// Extra headers.
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    /// `GET` without a body.
    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    /// `POST` with a JSON body.
    pub fn post(body: Value) -> Self {
        Self::new(Method::POST).body(body)
    }

    /// Request with `method` and nothing else.
    pub fn new(method: Method) -> Self {
        Self {
            method,
            body: None,
            headers: Vec::new(),
        }
    }

    /// Set the JSON body.
    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: Option<String>,
    user: Option<UserSnapshot>,
    expiry: Option<String>,
}

/// Performs login, logout, profile and authenticated API calls.
pub struct AuthGateway<S: SessionStore + ?Sized> {
    config: ClientConfig,
    http: Client,
    store: Arc<S>,
    throttle: LoginThrottle,
}

impl<S: SessionStore + ?Sized> AuthGateway<S> {
    /// Gateway with a default HTTP client.
    pub fn new(config: ClientConfig, store: Arc<S>) -> Result<Self> {
        let http = Client::builder().build()?;
        Ok(Self::with_client(config, store, http))
    }

    /// Gateway using a caller-supplied HTTP client.
    pub fn with_client(config: ClientConfig, store: Arc<S>, http: Client) -> Self {
        let throttle = LoginThrottle::new(config.max_login_attempts, config.login_cooldown);
        Self {
            config,
            http,
            store,
            throttle,
        }
    }

    /// The injected store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Rejected logins counted so far.
    pub fn attempts(&self) -> u32 {
        self.throttle.attempts()
    }

    /// Rejections allowed before login is blocked.
    pub fn max_attempts(&self) -> u32 {
        self.throttle.max_attempts()
    }

    /// Log in and redirect to the home path.
    pub async fn login(&self, email: &str, password: &str) -> Result<Redirect> {
        self.login_with_redirect(email, password, None).await
    }

    /// Log in and redirect to `redirect` when it is a local path.
    ///
    /// Validation and throttle errors are returned before any request is sent.
    /// Only 4xx answers count as rejected credentials; a 5xx surfaces as
    /// [`Error::Backend`] and leaves the attempt counter alone. On success the
    /// session is written in one step; a success response without token, user
    /// and expiry leaves the store untouched.
    pub async fn login_with_redirect(
        &self,
        email: &str,
        password: &str,
        redirect: Option<&str>,
    ) -> Result<Redirect> {
        validate_credentials(email, password)?;
        self.throttle.check(Utc::now())?;

        let email = email.trim();
        tracing::debug!(endpoint = LOGIN_ENDPOINT, "submitting login");
        let resp = self
            .http
            .post(self.config.endpoint(LOGIN_ENDPOINT))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = resp.status();
        if status.is_client_error() {
            let body: Value = resp.json().await.unwrap_or(Value::Null);
            self.throttle.record_failure(Utc::now());
            tracing::info!(
                status = status.as_u16(),
                attempts = self.throttle.attempts(),
                "login rejected"
            );
            return Err(Error::Credentials(login_error_message(status, &body)));
        }
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "login failed on the server side");
            return Err(Error::Backend(status.as_u16()));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| Error::MalformedResponse(format!("body is not JSON: {e}")))?;
        let session = parse_login_response(body)?;

        self.store.write(&session)?;
        self.throttle.reset();
        tracing::info!(expiry = ?session.expiry, "login succeeded");

        Ok(Redirect::to(safe_destination(redirect, &self.config.home_path)))
    }

    /// Tell the backend, clear the store, and redirect to sign-in.
    ///
    /// The backend call is best effort; its failures are only logged.
    pub async fn logout(&self) -> Result<Redirect> {
        if let Some(session) = self.store.read().filter(|s| !s.token.is_empty()) {
            let sent = self
                .http
                .post(self.config.endpoint(LOGOUT_ENDPOINT))
                .header(AUTHORIZATION, session.bearer())
                .send()
                .await;
            match sent {
                Ok(resp) if !resp.status().is_success() => {
                    tracing::warn!(status = resp.status().as_u16(), "backend logout failed");
                }
                Err(e) => tracing::warn!(error = %e, "backend logout failed"),
                Ok(_) => {}
            }
        }

        self.store.clear()?;
        tracing::info!("logged out");
        Ok(Redirect::to(self.config.sign_in_path.clone()))
    }

    /// Call an API endpoint with the stored bearer token.
    ///
    /// A 401 logs the user out and surfaces as [`Error::SessionExpired`];
    /// the raw response is never returned in that case. The login endpoint is
    /// sent without a token, so its 401 is returned as-is and the session kept.
    pub async fn api_call(&self, endpoint: &str, request: ApiRequest) -> Result<Response> {
        let login = is_login_endpoint(endpoint);
        let mut req = self
            .http
            .request(request.method, self.config.endpoint(endpoint))
            .header(CONTENT_TYPE, "application/json");

        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        if !login {
            if let Some(session) = self.store.read().filter(|s| !s.token.is_empty()) {
                req = req.header(AUTHORIZATION, session.bearer());
            }
        }

        if let Some(body) = &request.body {
            req = req.json(body);
        }

        tracing::debug!(endpoint, "api call");
        let resp = req.send().await?;

        if resp.status() == StatusCode::UNAUTHORIZED && !login {
            tracing::warn!(endpoint, "unauthorized response, ending session");
            if let Err(e) = self.logout().await {
                tracing::warn!(error = %e, "clearing session after 401 failed");
            }
            return Err(Error::SessionExpired);
        }

        Ok(resp)
    }

    /// Fetch the signed-in user from the backend.
    ///
    /// Any failure clears the store and yields `None`.
    pub async fn fetch_profile(&self) -> Option<UserSnapshot> {
        let session = self.store.read().filter(|s| !s.token.is_empty())?;

        match self.request_profile(&session).await {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!(error = %e, "profile fetch failed, treating as signed out");
                if let Err(e) = self.store.clear() {
                    tracing::warn!(error = %e, "clearing session failed");
                }
                None
            }
        }
    }

    async fn request_profile(&self, session: &Session) -> Result<UserSnapshot> {
        let resp = self
            .http
            .get(self.config.endpoint(PROFILE_ENDPOINT))
            .header(AUTHORIZATION, session.bearer())
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::Credentials(format!(
                "profile request returned {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    /// Stored session if still valid. An invalid one is cleared.
    pub fn current_session(&self) -> Option<Session> {
        let session = self.store.read();
        if policy::is_valid_now(session.as_ref()) {
            return session;
        }
        if session.is_some() {
            tracing::info!("stored session expired, clearing");
            if let Err(e) = self.store.clear() {
                tracing::warn!(error = %e, "clearing expired session failed");
            }
        }
        None
    }
}

/// Local checks run before any login request.
pub fn validate_credentials(email: &str, password: &str) -> Result<()> {
    if email.trim().is_empty() || password.trim().is_empty() {
        return Err(Error::Validation(
            "Email and password are required.".to_string(),
        ));
    }
    if !is_email_shaped(email.trim()) {
        return Err(Error::Validation(
            "Please enter a valid email address.".to_string(),
        ));
    }
    Ok(())
}

fn is_email_shaped(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

/// Turn a rejected login body into one display string.
///
/// Precedence: `non_field_errors`, `email`, `password`, `detail`, then a
/// generic message with the status code.
pub fn login_error_message(status: StatusCode, body: &Value) -> String {
    ["non_field_errors", "email", "password", "detail"]
        .iter()
        .find_map(|key| first_message(body.get(key)?))
        .unwrap_or_else(|| format!("Login failed ({})", status.as_u16()))
}

fn first_message(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(first_message),
        _ => None,
    }
}

fn parse_login_response(body: Value) -> Result<Session> {
    let resp: LoginResponse = serde_json::from_value(body)
        .map_err(|e| Error::MalformedResponse(format!("unexpected shape: {e}")))?;

    let token = resp
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::MalformedResponse("missing token".to_string()))?;
    let user = resp
        .user
        .ok_or_else(|| Error::MalformedResponse("missing user".to_string()))?;
    let expiry = resp
        .expiry
        .ok_or_else(|| Error::MalformedResponse("missing expiry".to_string()))?;
    let expiry = DateTime::parse_from_rfc3339(&expiry)
        .map_err(|e| Error::MalformedResponse(format!("bad expiry {expiry:?}: {e}")))?
        .with_timezone(&Utc);

    Ok(Session {
        token,
        user,
        expiry: Some(expiry),
    })
}

fn is_login_endpoint(endpoint: &str) -> bool {
    let path = endpoint.split(['?', '#']).next().unwrap_or_default();
    path.trim_matches('/') == LOGIN_ENDPOINT.trim_matches('/')
}
