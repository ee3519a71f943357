use std::io::{BufRead, Write};

use anyhow::bail;
use chrono::Utc;
use ledger_auth::{Error, GuardDecision, Location, Redirect, RouteGuard};

use super::Gateway;

fn prompt_email() -> anyhow::Result<String> {
    eprint!("Email: ");
    std::io::stderr().flush()?;
    let mut buf = String::new();
    std::io::stdin().lock().read_line(&mut buf)?;
    Ok(buf.trim().to_string())
}

/// Prompt until the backend accepts the password or the throttle blocks us.
///
/// A valid stored session skips the prompt, as the sign-in page does.
pub async fn cmd_login(
    gateway: &Gateway,
    email: Option<String>,
    redirect: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let config = gateway.config();
    let guard = RouteGuard::new(gateway.store().clone(), config.sign_in_path.clone())
        .with_home_path(config.home_path.clone());
    let sign_in = Redirect {
        to: config.sign_in_path.clone(),
        redirect: redirect.clone(),
    };
    if let GuardDecision::Redirect(next) = guard.check_sign_in(&Location::parse(&sign_in.href())) {
        let user = gateway
            .current_session()
            .map(|s| s.user.display_name())
            .unwrap_or_default();
        return crate::pout(
            json,
            serde_json::json!({"ok": true, "already": true, "user": user, "navigate": next.href()}),
            &format!("Already signed in as {user}. Continue at {}", next.href()),
        );
    }

    let email = match email {
        Some(e) => e,
        None => prompt_email()?,
    };

    let next = loop {
        let password = rpassword::prompt_password("Password (hidden): ")?;
        match gateway
            .login_with_redirect(&email, &password, redirect.as_deref())
            .await
        {
            Ok(next) => break next,
            Err(e @ Error::Credentials(_)) => {
                eprintln!("{}", e.display_message());
                let attempts = gateway.attempts();
                if attempts < gateway.max_attempts() {
                    eprintln!("Failed attempts: {attempts}/{}", gateway.max_attempts());
                }
            }
            Err(e) => bail!(e.display_message()),
        }
    };

    let user = gateway
        .current_session()
        .map(|s| s.user.display_name())
        .unwrap_or_default();
    crate::pout(
        json,
        serde_json::json!({"ok": true, "user": user, "navigate": next.href()}),
        &format!("Signed in as {user}. Continue at {}", next.href()),
    )
}

pub async fn cmd_logout(gateway: &Gateway, json: bool) -> anyhow::Result<()> {
    let next = gateway.logout().await.map_err(|e| anyhow::anyhow!(e.display_message()))?;
    crate::pout(
        json,
        serde_json::json!({"ok": true, "navigate": next.href()}),
        &format!("Signed out. Continue at {}", next.href()),
    )
}

pub fn cmd_status(gateway: &Gateway, json: bool) -> anyhow::Result<()> {
    match gateway.current_session() {
        Some(s) => {
            let remaining = s.remaining(Utc::now()).unwrap_or_default();
            let secs = remaining.num_seconds().max(0);
            crate::pout(
                json,
                serde_json::json!({
                    "signed_in": true,
                    "email": s.user.email,
                    "expiry": s.expiry,
                    "remaining_seconds": secs,
                }),
                &format!(
                    "Signed in as {}, {}h {}m remaining.",
                    s.user.email,
                    secs / 3600,
                    (secs % 3600) / 60
                ),
            )
        }
        None => crate::pout(
            json,
            serde_json::json!({"signed_in": false}),
            "Not signed in. Run `ledger login` first.",
        ),
    }
}

pub async fn cmd_whoami(gateway: &Gateway, json: bool) -> anyhow::Result<()> {
    let user = gateway
        .fetch_profile()
        .await
        .ok_or_else(|| anyhow::anyhow!("Not signed in. Run `ledger login` first."))?;
    crate::pout(
        json,
        serde_json::to_value(&user)?,
        &format!("{} <{}>", user.display_name(), user.email),
    )
}
