pub mod auth;
pub mod nav;

use ledger_auth::{AuthGateway, SessionStore};

pub type Gateway = AuthGateway<dyn SessionStore>;
