//! Sealed session cookies.
//!
//! The server keeps the whole session in one cookie: the JSON session is
//! encrypted and authenticated with AES-256-GCM, then base64url encoded as
//! `nonce || ciphertext`. The sealed payload carries its own deadline so a
//! replayed cookie stops opening once `Max-Age` has passed.

use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use httpdate::fmt_http_date;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::ServerConfig;
use crate::store::SessionStore;
use crate::{Error, Result, Session};

/// Shortest accepted `SESSION_SECRET`.
pub const MIN_SECRET_LEN: usize = 32;

/// Backend token lifetime; the cookie never outlives it.
pub const SESSION_MAX_AGE: Duration = Duration::from_secs(10 * 60 * 60);

const NONCE_LEN: usize = 12;

/// SameSite attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    /// SameSite=Strict
    Strict,
    /// SameSite=Lax
    Lax,
    /// SameSite=None
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Options used to build the session cookie.
#[derive(Debug, Clone)]
pub struct CookieOptions {
    /// Cookie name (without any prefix).
    pub name: String,

    /// Cookie path.
    pub path: String,

    /// Send on HTTPS only.
    pub secure: bool,

    /// Not accessible to scripts.
    pub http_only: bool,

    /// SameSite attribute.
    pub same_site: SameSite,

    /// Max-Age in seconds.
    pub max_age_seconds: u64,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            name: "app-session".to_string(),
            path: "/".to_string(),
            secure: false,
            http_only: true,
            same_site: SameSite::Lax,
            max_age_seconds: SESSION_MAX_AGE.as_secs(),
        }
    }
}

/// Key material derived from `SESSION_SECRET`.
#[derive(Clone)]
pub struct SessionKey([u8; 32]);

impl SessionKey {
    /// Derive a key, refusing secrets shorter than [`MIN_SECRET_LEN`].
    pub fn from_secret(secret: &str) -> Result<Self> {
        if secret.chars().count() < MIN_SECRET_LEN {
            return Err(Error::Config(format!(
                "SESSION_SECRET must be at least {MIN_SECRET_LEN} characters"
            )));
        }
        Ok(Self(Sha256::digest(secret.as_bytes()).into()))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

#[derive(Serialize, Deserialize)]
struct SealedSession {
    session: Session,
    sealed_until: i64,
}

/// Encrypt `session` into a cookie value valid for `max_age`.
pub fn seal(session: &Session, key: &SessionKey, max_age: Duration) -> Result<String> {
    let max_age = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
    let payload = SealedSession {
        session: session.clone(),
        sealed_until: Utc::now().timestamp().saturating_add(max_age),
    };
    let plaintext = serde_json::to_vec(&payload)?;

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = key
        .cipher()
        .encrypt(&nonce, plaintext.as_slice())
        .map_err(|e| Error::Storage(format!("sealing session failed: {e}")))?;

    let mut out = nonce.to_vec();
    out.extend_from_slice(&ciphertext);
    Ok(URL_SAFE_NO_PAD.encode(out))
}

/// Decrypt a cookie value. Tampered, foreign or stale values open to `None`.
pub fn open(value: &str, key: &SessionKey) -> Option<Session> {
    let raw = URL_SAFE_NO_PAD.decode(value.trim()).ok()?;
    if raw.len() <= NONCE_LEN {
        return None;
    }
    let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
    let plaintext = key
        .cipher()
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .ok()?;
    let payload: SealedSession = serde_json::from_slice(&plaintext).ok()?;
    (Utc::now().timestamp() < payload.sealed_until).then_some(payload.session)
}

/// Build a `Set-Cookie` header value.
pub fn build_set_cookie(value: &str, opts: &CookieOptions) -> String {
    let mut parts = attributes(&format!("{}={value}", opts.name), opts);
    parts.push(format!("Max-Age={}", opts.max_age_seconds));
    // Expires for older clients.
    let expires = SystemTime::now() + Duration::from_secs(opts.max_age_seconds);
    parts.push(format!("Expires={}", fmt_http_date(expires)));
    parts.join("; ")
}

/// Build a `Set-Cookie` header value that clears the cookie.
pub fn build_clear_cookie(opts: &CookieOptions) -> String {
    let mut parts = attributes(&format!("{}=", opts.name), opts);
    parts.push("Max-Age=0".to_string());
    parts.push(format!("Expires={}", fmt_http_date(UNIX_EPOCH)));
    parts.join("; ")
}

fn attributes(pair: &str, opts: &CookieOptions) -> Vec<String> {
    let mut parts = vec![pair.to_string(), format!("Path={}", opts.path)];
    if opts.secure {
        parts.push("Secure".to_string());
    }
    if opts.http_only {
        parts.push("HttpOnly".to_string());
    }
    parts.push(format!("SameSite={}", opts.same_site.as_str()));
    parts
}

/// Find a cookie by name in a `Cookie` request header.
pub fn find_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name).then_some(v)
    })
}

#[derive(Debug)]
enum Pending {
    Unchanged,
    Written { session: Session, header: String },
    Cleared { header: String },
}

/// Server-side store bound to one request.
///
/// It only exists while a request is being handled: build it from the
/// request's `Cookie` header, then attach [`CookieStore::set_cookie_header`]
/// to the response if it returns a value.
#[derive(Debug)]
pub struct CookieStore {
    key: SessionKey,
    options: CookieOptions,
    incoming: Option<String>,
    pending: Mutex<Pending>,
}

impl CookieStore {
    /// Store for a request carrying `cookie_header`.
    pub fn from_request(config: &ServerConfig, cookie_header: Option<&str>) -> Self {
        let incoming = cookie_header
            .and_then(|h| find_cookie(h, &config.cookie.name))
            .map(str::to_string);
        Self {
            key: config.key.clone(),
            options: config.cookie.clone(),
            incoming,
            pending: Mutex::new(Pending::Unchanged),
        }
    }

    /// `Set-Cookie` value the response must carry, if the session changed.
    pub fn set_cookie_header(&self) -> Option<String> {
        match &*self.pending.lock().ok()? {
            Pending::Unchanged => None,
            Pending::Written { header, .. } | Pending::Cleared { header } => Some(header.clone()),
        }
    }

    fn stage(&self, next: Pending) -> Result<()> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| Error::Storage("cookie store poisoned".to_string()))?;
        *pending = next;
        Ok(())
    }
}

impl SessionStore for CookieStore {
    fn write(&self, session: &Session) -> Result<()> {
        let sealed = seal(session, &self.key, Duration::from_secs(self.options.max_age_seconds))?;
        self.stage(Pending::Written {
            session: session.clone(),
            header: build_set_cookie(&sealed, &self.options),
        })
    }

    fn read(&self) -> Option<Session> {
        match &*self.pending.lock().ok()? {
            Pending::Written { session, .. } => Some(session.clone()),
            Pending::Cleared { .. } => None,
            Pending::Unchanged => open(self.incoming.as_deref()?, &self.key),
        }
    }

    fn clear(&self) -> Result<()> {
        self.stage(Pending::Cleared {
            header: build_clear_cookie(&self.options),
        })
    }
}
