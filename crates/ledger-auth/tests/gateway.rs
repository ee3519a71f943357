//! Gateway and guard behaviour against a mock token-auth backend.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use ledger_auth::{
    ApiRequest, AuthGateway, ClientConfig, Error, GuardDecision, Location, MemoryStore,
    RouteGuard, Session, SessionStore, UserSnapshot,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway(api_url: &str) -> (AuthGateway<MemoryStore>, Arc<MemoryStore>) {
    let config = ClientConfig {
        api_url: api_url.to_string(),
        ..Default::default()
    };
    let store = Arc::new(MemoryStore::new());
    let gateway = AuthGateway::new(config, store.clone()).unwrap();
    (gateway, store)
}

fn user() -> UserSnapshot {
    UserSnapshot {
        id: Some("3".to_string()),
        email: "a@b.com".to_string(),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
    }
}

fn signed_in(store: &MemoryStore, token: &str) {
    store
        .write(&Session {
            token: token.to_string(),
            user: user(),
            expiry: Some(Utc::now() + TimeDelta::hours(10)),
        })
        .unwrap();
}

#[tokio::test]
async fn login_writes_session_and_redirects() {
    let server = MockServer::start().await;
    let expiry = (Utc::now() + TimeDelta::hours(10)).to_rfc3339();
    Mock::given(method("POST"))
        .and(path("/auth/login/"))
        .and(body_json(json!({"email": "a@b.com", "password": "hunter2hunter2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "knox-123",
            "user": {"id": 3, "email": "a@b.com", "first_name": "Ada", "last_name": "Lovelace"},
            "expiry": expiry,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (gateway, store) = gateway(&server.uri());
    let next = gateway
        .login_with_redirect("a@b.com", "hunter2hunter2", Some("/accounts?page=2"))
        .await
        .unwrap();

    assert_eq!(next.href(), "/accounts?page=2");
    let session = store.read().unwrap();
    assert_eq!(session.token, "knox-123");
    assert_eq!(session.user, user());
    assert!(gateway.current_session().is_some());
}

#[tokio::test]
async fn login_ignores_offsite_redirect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "t",
            "user": {"email": "a@b.com"},
            "expiry": "2099-01-01T00:00:00Z",
        })))
        .mount(&server)
        .await;

    let (gateway, _store) = gateway(&server.uri());
    let next = gateway
        .login_with_redirect("a@b.com", "pw", Some("https://evil.example/"))
        .await
        .unwrap();
    assert_eq!(next.href(), "/");
}

#[tokio::test]
async fn field_error_is_displayed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"password": ["too short"]})))
        .mount(&server)
        .await;

    let (gateway, store) = gateway(&server.uri());
    let err = gateway.login("a@b.com", "short").await.unwrap_err();

    assert!(matches!(err, Error::Credentials(ref m) if m == "too short"));
    assert_eq!(err.display_message(), "too short");
    assert_eq!(gateway.attempts(), 1);
    assert!(store.read().is_none());
}

#[tokio::test]
async fn success_without_expiry_writes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "knox-123",
            "user": {"email": "a@b.com"},
        })))
        .mount(&server)
        .await;

    let (gateway, store) = gateway(&server.uri());
    let err = gateway.login("a@b.com", "pw").await.unwrap_err();

    assert!(matches!(err, Error::MalformedResponse(_)));
    assert!(store.read().is_none());
}

#[tokio::test]
async fn sixth_attempt_is_blocked_locally() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "non_field_errors": ["Unable to log in with provided credentials."]
        })))
        .expect(5)
        .mount(&server)
        .await;

    let (gateway, _store) = gateway(&server.uri());
    for n in 1..=5 {
        let err = gateway.login("a@b.com", "wrong-password").await.unwrap_err();
        assert!(matches!(err, Error::Credentials(_)));
        assert_eq!(gateway.attempts(), n);
    }

    let err = gateway.login("a@b.com", "wrong-password").await.unwrap_err();
    assert!(matches!(err, Error::RateLimited));
    assert_eq!(
        err.display_message(),
        "Too many failed attempts. Please wait a few minutes before trying again."
    );
}

#[tokio::test]
async fn invalid_input_never_reaches_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (gateway, _store) = gateway(&server.uri());
    for (email, password) in [("", "pw"), ("a@b.com", ""), ("not-an-email", "pw")] {
        let err = gateway.login(email, password).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
    assert_eq!(gateway.attempts(), 0);
}

#[tokio::test]
async fn server_errors_do_not_count_as_rejections() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login/"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"detail": "maintenance"})))
        .expect(6)
        .mount(&server)
        .await;

    let (gateway, store) = gateway(&server.uri());
    for _ in 0..6 {
        let err = gateway.login("a@b.com", "hunter2hunter2").await.unwrap_err();
        assert!(matches!(err, Error::Backend(503)), "{err:?}");
        assert_eq!(err.display_message(), "Login failed (503). Please try again.");
    }
    assert_eq!(gateway.attempts(), 0);
    assert!(store.read().is_none());
}

#[tokio::test]
async fn login_endpoint_unauthorized_keeps_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "nope"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/logout/"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let (gateway, store) = gateway(&server.uri());
    signed_in(&store, "keep-me");

    let resp = gateway
        .api_call("/auth/login/", ApiRequest::post(json!({"email": "a@b.com"})))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
    assert_eq!(store.read().map(|s| s.token).as_deref(), Some("keep-me"));
}

#[tokio::test]
async fn sign_in_page_forwards_after_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "fresh",
            "user": {"id": 3, "email": "a@b.com"},
            "expiry": (Utc::now() + TimeDelta::hours(10)).to_rfc3339(),
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (gateway, store) = gateway(&server.uri());
    let guard = RouteGuard::new(store.clone(), "/signin").with_home_path("/");
    let sign_in = Location::parse("/signin?redirect=%2Freports");
    assert_eq!(guard.check_sign_in(&sign_in), GuardDecision::Allow);

    gateway.login("a@b.com", "hunter2hunter2").await.unwrap();

    let GuardDecision::Redirect(next) = guard.check_sign_in(&sign_in) else {
        panic!("signed-in visitor should skip the form");
    };
    assert_eq!(next.href(), "/reports");
}

#[tokio::test]
async fn unauthorized_call_ends_session_and_guard_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/reports/"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid token."})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/logout/"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let (gateway, store) = gateway(&server.uri());
    signed_in(&store, "stale");
    let guard = RouteGuard::new(store.clone(), "/signin");
    assert_eq!(guard.check(&Location::parse("/reports")), GuardDecision::Allow);

    let err = gateway
        .api_call("/api/reports/", ApiRequest::get())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SessionExpired));
    assert!(store.read().is_none());

    let GuardDecision::Redirect(redirect) = guard.check(&Location::parse("/reports")) else {
        panic!("expected redirect to sign-in");
    };
    assert_eq!(redirect.to, "/signin");
    assert_eq!(redirect.redirect.as_deref(), Some("/reports"));
}

#[tokio::test]
async fn api_call_sends_bearer_except_to_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/accounts/"))
        .and(header("authorization", "Bearer tok"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/login/"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let (gateway, store) = gateway(&server.uri());
    signed_in(&store, "tok");

    let resp = gateway
        .api_call("/api/accounts/", ApiRequest::post(json!({"name": "Checking"})))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);

    let resp = gateway
        .api_call("/auth/login/", ApiRequest::post(json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let requests = server.received_requests().await.unwrap();
    let login = requests
        .iter()
        .find(|r| r.url.path() == "/auth/login/")
        .unwrap();
    assert!(login.headers.get("authorization").is_none());
}

#[tokio::test]
async fn logout_is_idempotent_and_survives_backend_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/logout/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let (gateway, store) = gateway(&server.uri());
    signed_in(&store, "tok");

    let first = gateway.logout().await.unwrap();
    assert_eq!(first.href(), "/signin");
    assert!(store.read().is_none());

    // Nothing stored, so the backend is not called again.
    let second = gateway.logout().await.unwrap();
    assert_eq!(second, first);
    assert!(store.read().is_none());
}

#[tokio::test]
async fn logout_survives_unreachable_backend() {
    let (gateway, store) = gateway("http://127.0.0.1:9");
    signed_in(&store, "tok");
    assert!(gateway.logout().await.is_ok());
    assert!(store.read().is_none());
}

#[tokio::test]
async fn profile_fetch_success_and_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/profile/"))
        .and(header("authorization", "Bearer good"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 3, "email": "a@b.com", "first_name": "Ada", "last_name": "Lovelace"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/profile/"))
        .and(header("authorization", "Bearer revoked"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (gateway, store) = gateway(&server.uri());
    assert!(gateway.fetch_profile().await.is_none());

    signed_in(&store, "good");
    assert_eq!(gateway.fetch_profile().await, Some(user()));
    assert!(store.read().is_some());

    signed_in(&store, "revoked");
    assert!(gateway.fetch_profile().await.is_none());
    assert!(store.read().is_none());
}

#[tokio::test]
async fn expired_session_is_cleared_on_read() {
    let (gateway, store) = gateway("http://127.0.0.1:9");
    store
        .write(&Session {
            token: "old".to_string(),
            user: user(),
            expiry: Some(Utc::now() - TimeDelta::minutes(1)),
        })
        .unwrap();

    assert!(gateway.current_session().is_none());
    assert!(store.read().is_none());
}
