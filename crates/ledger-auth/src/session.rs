//! The session record and the user snapshot it carries.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Display-only copy of the signed-in user. Never an authorization source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    /// Backend user id. Numeric ids are kept as their decimal string.
    #[serde(default, deserialize_with = "id_as_string")]
    pub id: Option<String>,
    /// Email address.
    pub email: String,
    /// First name.
    #[serde(default)]
    pub first_name: String,
    /// Last name.
    #[serde(default)]
    pub last_name: String,
}

impl UserSnapshot {
    /// "First Last", falling back to the email when both names are blank.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.email.clone()
        } else {
            full.to_string()
        }
    }
}

/// Token, user and expiry, always stored and cleared together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque bearer credential.
    pub token: String,
    /// User snapshot taken at login.
    pub user: UserSnapshot,
    /// Absolute expiry instant. `None` is treated as expired.
    pub expiry: Option<DateTime<Utc>>,
}

impl Session {
    /// Time left before expiry, or `None` once expired or without an expiry.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<TimeDelta> {
        let expiry = self.expiry?;
        (expiry > now).then(|| expiry - now)
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

fn id_as_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
