//! Navigation guard and redirect instructions.
//!
//! Redirects are returned as values. Hosts match on [`GuardDecision`] or on
//! the [`Redirect`] a gateway operation hands back and perform the navigation
//! themselves.

use std::sync::Arc;

use url::form_urlencoded;

use crate::policy;
use crate::store::SessionStore;

/// Navigate to `to`, optionally telling the target where to return afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// Destination path.
    pub to: String,
    /// Page to return to after sign-in.
    pub redirect: Option<String>,
}

impl Redirect {
    /// Plain redirect to `to`.
    pub fn to(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            redirect: None,
        }
    }

    /// Destination with the `redirect` query parameter encoded.
    pub fn href(&self) -> String {
        match &self.redirect {
            Some(back) => {
                let query = form_urlencoded::Serializer::new(String::new())
                    .append_pair("redirect", back)
                    .finish();
                format!("{}?{query}", self.to)
            }
            None => self.to.clone(),
        }
    }
}

/// The page being navigated to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Path without query or fragment.
    pub path: String,
    /// Path plus query, as the user requested it.
    pub href: String,
}

impl Location {
    /// Split an app-relative href like `/accounts?page=2`.
    pub fn parse(href: &str) -> Self {
        let path = href.split(['?', '#']).next().unwrap_or_default();
        let path = if path.is_empty() { "/" } else { path };
        Self {
            path: path.to_string(),
            href: href.to_string(),
        }
    }

    /// The `redirect` query parameter, if present.
    pub fn redirect_param(&self) -> Option<String> {
        let query = self.href.split_once('?')?.1;
        let query = query.split('#').next().unwrap_or_default();
        form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == "redirect")
            .map(|(_, v)| v.into_owned())
    }
}

/// Outcome of a guard check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Stay on the page.
    Allow,
    /// Leave for sign-in.
    Redirect(Redirect),
}

/// Children plus the navigation to perform once they are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guarded<T> {
    /// Rendered unconditionally.
    pub content: T,
    /// Follow-up navigation, if the session is not valid.
    pub follow_up: Option<Redirect>,
}

/// Sends visitors without a valid session to the sign-in page.
///
/// The sign-in path itself is never guarded; [`RouteGuard::check_sign_in`]
/// sends visitors who are already signed in on to their destination instead.
pub struct RouteGuard<S: SessionStore + ?Sized> {
    store: Arc<S>,
    sign_in_path: String,
    home_path: String,
}

impl<S: SessionStore + ?Sized> RouteGuard<S> {
    /// Guard reading `store`, redirecting to `sign_in_path`.
    pub fn new(store: Arc<S>, sign_in_path: impl Into<String>) -> Self {
        Self {
            store,
            sign_in_path: sign_in_path.into(),
            home_path: "/".to_string(),
        }
    }

    /// Destination for signed-in visitors of the sign-in page with no `redirect`.
    #[must_use]
    pub fn with_home_path(mut self, home_path: impl Into<String>) -> Self {
        self.home_path = home_path.into();
        self
    }

    /// Sign-in page check: a valid session skips the form.
    ///
    /// Redirects to the `redirect` parameter (when it is a local path) or the
    /// home path. Without a valid session the page is allowed.
    pub fn check_sign_in(&self, location: &Location) -> GuardDecision {
        if policy::is_valid_now(self.store.read().as_ref()) {
            let to = safe_destination(location.redirect_param().as_deref(), &self.home_path);
            GuardDecision::Redirect(Redirect::to(to))
        } else {
            GuardDecision::Allow
        }
    }

    /// Decide whether `location` may stay.
    pub fn check(&self, location: &Location) -> GuardDecision {
        if location.path == self.sign_in_path {
            return GuardDecision::Allow;
        }
        if policy::is_valid_now(self.store.read().as_ref()) {
            GuardDecision::Allow
        } else {
            tracing::debug!(path = %location.path, "no valid session, redirecting to sign-in");
            GuardDecision::Redirect(Redirect {
                to: self.sign_in_path.clone(),
                redirect: Some(location.href.clone()),
            })
        }
    }

    /// Hand `children` back untouched, with the check's redirect as a follow-up.
    pub fn wrap<T>(&self, location: &Location, children: T) -> Guarded<T> {
        let follow_up = match self.check(location) {
            GuardDecision::Allow => None,
            GuardDecision::Redirect(r) => Some(r),
        };
        Guarded {
            content: children,
            follow_up,
        }
    }
}

/// Post-login destination: `requested` if it is a local path, else `home`.
pub fn safe_destination(requested: Option<&str>, home: &str) -> String {
    match requested.map(str::trim) {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path
                    .chars()
                    .any(|c| c == '\\' || c.is_ascii_control() || c.is_whitespace()) =>
        {
            path.to_string()
        }
        _ => home.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::{Session, UserSnapshot};
    use chrono::{TimeDelta, Utc};

    fn valid_session() -> Session {
        Session {
            token: "tok".to_string(),
            user: UserSnapshot {
                id: None,
                email: "a@b.com".to_string(),
                first_name: String::new(),
                last_name: String::new(),
            },
            expiry: Some(Utc::now() + TimeDelta::hours(1)),
        }
    }

    #[test]
    fn sign_in_page_is_exempt() {
        let guard = RouteGuard::new(Arc::new(MemoryStore::new()), "/signin");
        let loc = Location::parse("/signin?redirect=%2Faccounts");
        assert_eq!(guard.check(&loc), GuardDecision::Allow);
        assert_eq!(loc.redirect_param().as_deref(), Some("/accounts"));
    }

    #[test]
    fn missing_session_redirects_with_origin() {
        let guard = RouteGuard::new(Arc::new(MemoryStore::new()), "/signin");
        let decision = guard.check(&Location::parse("/accounts?page=2"));
        let GuardDecision::Redirect(redirect) = decision else {
            panic!("expected redirect");
        };
        assert_eq!(redirect.to, "/signin");
        assert_eq!(redirect.redirect.as_deref(), Some("/accounts?page=2"));
        assert_eq!(redirect.href(), "/signin?redirect=%2Faccounts%3Fpage%3D2");
    }

    #[test]
    fn valid_session_is_allowed() {
        let store = Arc::new(MemoryStore::new());
        store.write(&valid_session()).unwrap();
        let guard = RouteGuard::new(store, "/signin");
        assert_eq!(guard.check(&Location::parse("/")), GuardDecision::Allow);
    }

    #[test]
    fn wrap_always_returns_children() {
        let guard = RouteGuard::new(Arc::new(MemoryStore::new()), "/signin");
        let guarded = guard.wrap(&Location::parse("/reports"), "page body");
        assert_eq!(guarded.content, "page body");
        assert_eq!(
            guarded.follow_up.map(|r| r.href()).as_deref(),
            Some("/signin?redirect=%2Freports")
        );
    }

    #[test]
    fn destinations_stay_on_site() {
        assert_eq!(safe_destination(Some("/accounts?x=1"), "/"), "/accounts?x=1");
        assert_eq!(safe_destination(Some("//evil.example"), "/"), "/");
        assert_eq!(safe_destination(Some("https://evil.example"), "/"), "/");
        assert_eq!(safe_destination(Some("/\\evil.example"), "/"), "/");
        assert_eq!(safe_destination(None, "/home"), "/home");
        for sneaky in ["/\t/evil.example", "/\n/evil.example", "/\r/evil.example", "/ /evil.example"] {
            assert_eq!(safe_destination(Some(sneaky), "/"), "/", "{sneaky:?}");
        }
    }

    #[test]
    fn sign_in_page_forwards_signed_in_visitors() {
        let store = Arc::new(MemoryStore::new());
        let guard = RouteGuard::new(store.clone(), "/signin").with_home_path("/home");
        let with_back = Location::parse("/signin?redirect=%2Faccounts%3Fpage%3D2");
        let plain = Location::parse("/signin");
        let offsite = Location::parse("/signin?redirect=%2F%2Fevil.example");

        assert_eq!(guard.check_sign_in(&with_back), GuardDecision::Allow);
        assert_eq!(guard.check(&plain), GuardDecision::Allow);

        store.write(&valid_session()).unwrap();
        assert_eq!(
            guard.check_sign_in(&with_back),
            GuardDecision::Redirect(Redirect::to("/accounts?page=2"))
        );
        assert_eq!(
            guard.check_sign_in(&plain),
            GuardDecision::Redirect(Redirect::to("/home"))
        );
        assert_eq!(
            guard.check_sign_in(&offsite),
            GuardDecision::Redirect(Redirect::to("/home"))
        );
    }
}
