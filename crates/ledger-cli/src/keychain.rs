use ledger_auth::{Error, Session, SessionStore};

const KEYRING_SERVICE: &str = "ledger-cli";

/// Session kept in the OS keychain, one entry per API origin.
pub struct KeyringStore {
    user: String,
}

impl KeyringStore {
    pub fn for_origin(origin: &str) -> Self {
        Self {
            user: format!("session:{origin}"),
        }
    }

    fn entry(&self) -> ledger_auth::Result<keyring::Entry> {
        keyring::Entry::new(KEYRING_SERVICE, &self.user)
            .map_err(|e| Error::Storage(format!("Keychain error: {e}")))
    }
}

impl SessionStore for KeyringStore {
    fn write(&self, session: &Session) -> ledger_auth::Result<()> {
        let json = serde_json::to_string(session)?;
        self.entry()?
            .set_password(&json)
            .map_err(|e| Error::Storage(format!("Failed to store session in keychain: {e}")))
    }

    fn read(&self) -> Option<Session> {
        let json = self.entry().ok()?.get_password().ok()?;
        match serde_json::from_str(&json) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable keychain session");
                None
            }
        }
    }

    fn clear(&self) -> ledger_auth::Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(Error::Storage(format!("Failed to clear session: {e}"))),
        }
    }
}
