use anyhow::bail;
use ledger_auth::{ApiRequest, Error, GuardDecision, Location, RouteGuard, SessionStore};
use std::sync::Arc;

use super::Gateway;

/// Run the route guard for `href` the way the app does on navigation.
pub fn cmd_guard(
    store: Arc<dyn SessionStore>,
    sign_in_path: &str,
    href: &str,
    json: bool,
) -> anyhow::Result<()> {
    let guard = RouteGuard::new(store, sign_in_path);
    let location = Location::parse(href);
    match guard.check(&location) {
        GuardDecision::Allow => crate::pout(
            json,
            serde_json::json!({"allow": true, "path": location.path}),
            "allow",
        ),
        GuardDecision::Redirect(r) => crate::pout(
            json,
            serde_json::json!({"allow": false, "navigate": r.href(), "redirect": r.redirect}),
            &r.href(),
        ),
    }
}

/// Authenticated `GET` against the API; prints the response body.
pub async fn cmd_get(gateway: &Gateway, endpoint: &str, json: bool) -> anyhow::Result<()> {
    let resp = match gateway.api_call(endpoint, ApiRequest::get()).await {
        Ok(resp) => resp,
        Err(e @ Error::SessionExpired) => {
            let sign_in = &gateway.config().sign_in_path;
            bail!("{}\nRun `ledger login` (sign-in page: {sign_in}).", e.display_message())
        }
        Err(e) => return Err(e.into()),
    };

    let status = resp.status();
    let text = resp.text().await?;
    if json {
        let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text.clone()));
        crate::pout(true, serde_json::json!({"status": status.as_u16(), "body": body}), "")
    } else {
        if !status.is_success() {
            eprintln!("HTTP {status}");
        }
        crate::pout(false, serde_json::Value::Null, &text)
    }
}
