//! OAuth2 login flow against mocked token and user-info endpoints.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use idpproxy_auth::config::SocialProviderConfig;
use idpproxy_auth::consumer::{
    ConsumerCredential, ConsumerInfo, CredentialMap, CredentialSource, StaticSource,
};
use idpproxy_auth::social::{
    AUTHENTICATION_FAILED, AuthenticationState, CallbackParams, LoginPhase, OAuth2Provider,
    SessionCache, SocialError, SocialOutcome,
};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SP: &str = "https://sp.example.org/";

struct Harness {
    server: MockServer,
    provider: OAuth2Provider,
    sessions: Arc<SessionCache>,
}

async fn harness(request_timeout: Duration) -> Harness {
    let server = MockServer::start().await;

    let mut credentials = CredentialMap::new();
    credentials.entry(SP.to_string()).or_default().insert(
        "facebook".to_string(),
        ConsumerCredential::new("fb-app", "fb-secret"),
    );
    let source: Arc<dyn CredentialSource> = Arc::new(StaticSource::new("test", credentials));
    let consumers = Arc::new(ConsumerInfo::new(vec![source]));
    let sessions = Arc::new(SessionCache::new());

    let config = SocialProviderConfig::new(
        "facebook",
        Url::parse("https://www.facebook.example/dialog/oauth").unwrap(),
        Url::parse(&format!("{}/token", server.uri())).unwrap(),
        Url::parse(&format!("{}/me", server.uri())).unwrap(),
    )
    .with_scopes(vec!["email", "public_profile"])
    .with_authenticating_authority("https://www.facebook.example");

    let provider = OAuth2Provider::new(
        config,
        &Url::parse("https://proxy.example/").unwrap(),
        request_timeout,
        consumers,
        Arc::clone(&sessions),
    )
    .unwrap();

    Harness {
        server,
        provider,
        sessions,
    }
}

/// Starts a login and returns `(sid, state)`.
fn begin(h: &Harness) -> (String, String) {
    let session = h.sessions.create(SP);
    let url = h.provider.begin(&session.sid).unwrap();
    let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
    (session.sid, query["state"].clone())
}

fn callback(state: &str, code: &str) -> CallbackParams {
    CallbackParams {
        code: Some(code.to_string()),
        state: Some(state.to_string()),
        ..CallbackParams::default()
    }
}

async fn mount_userinfo(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "10001",
            "name": "Ada Lovelace",
            "email": "ada@example.org"
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn begin_builds_authorization_url() {
    let h = harness(Duration::from_secs(5)).await;
    let session = h.sessions.create(SP);

    let url = h.provider.begin(&session.sid).unwrap();
    let query: HashMap<_, _> = url.query_pairs().into_owned().collect();

    assert!(url.as_str().starts_with("https://www.facebook.example/dialog/oauth?"));
    assert_eq!(query["response_type"], "code");
    assert_eq!(query["client_id"], "fb-app");
    assert_eq!(
        query["redirect_uri"],
        "https://proxy.example/social/facebook/callback"
    );
    assert_eq!(query["scope"], "email,public_profile");
    assert_eq!(query["state"].len(), 32);
    assert!(!query.contains_key("client_secret"));

    let session = h.sessions.get(&session.sid).unwrap();
    assert_eq!(session.phase, LoginPhase::AwaitingCallback);
}

#[tokio::test]
async fn successful_login_records_identity() {
    let h = harness(Duration::from_secs(5)).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=code-1"))
        .and(body_string_contains("client_id=fb-app"))
        .and(body_string_contains("client_secret=fb-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "token_type": "bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&h.server)
        .await;
    mount_userinfo(&h.server).await;

    let (sid, state) = begin(&h);
    let outcome = h.provider.phase_n(&callback(&state, "code-1")).await.unwrap();

    let SocialOutcome::Succeeded { profile, session } = outcome else {
        panic!("expected a successful login");
    };
    assert_eq!(profile.permanent_id, "10001");
    assert_eq!(profile.attributes["email"], vec!["ada@example.org"]);

    assert_eq!(session.sid, sid);
    assert_eq!(session.authentication, AuthenticationState::Ok);
    assert_eq!(session.status.as_deref(), Some("SUCCESS"));
    assert_eq!(session.service.as_deref(), Some("facebook"));
    assert_eq!(session.authn_auth.as_deref(), Some("https://www.facebook.example"));
    assert_eq!(session.permanent_id.as_deref(), Some("10001"));

    let stored = h.sessions.get(&sid).unwrap();
    assert_eq!(stored.authentication, AuthenticationState::Ok);
    assert_eq!(stored.phase, LoginPhase::Succeeded);
}

#[tokio::test]
async fn urlencoded_token_response_is_accepted() {
    let h = harness(Duration::from_secs(5)).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain")
                .set_body_string("access_token=access-1&expires=5183999"),
        )
        .mount(&h.server)
        .await;
    mount_userinfo(&h.server).await;

    let (_, state) = begin(&h);
    let outcome = h.provider.phase_n(&callback(&state, "code-1")).await.unwrap();
    assert!(outcome.is_success());
}

#[tokio::test]
async fn error_callback_fails_without_token_call() {
    let h = harness(Duration::from_secs(5)).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let (sid, state) = begin(&h);
    let params = CallbackParams {
        state: Some(state),
        error: Some("access_denied".to_string()),
        error_description: Some("Permissions error".to_string()),
        ..CallbackParams::default()
    };
    let outcome = h.provider.phase_n(&params).await.unwrap();

    let SocialOutcome::Failed { reason, session } = outcome else {
        panic!("expected a failed login");
    };
    assert_eq!(reason, AUTHENTICATION_FAILED);
    assert_eq!(session.authentication, AuthenticationState::Failed);
    assert_eq!(
        h.sessions.get(&sid).unwrap().authentication,
        AuthenticationState::Failed
    );
}

#[tokio::test]
async fn token_endpoint_error_fails() {
    let h = harness(Duration::from_secs(5)).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "code expired"
        })))
        .mount(&h.server)
        .await;

    let (_, state) = begin(&h);
    let outcome = h.provider.phase_n(&callback(&state, "stale")).await.unwrap();

    assert!(!outcome.is_success());
    assert_eq!(
        outcome.session().authentication,
        AuthenticationState::Failed
    );
}

#[tokio::test]
async fn userinfo_without_id_fails() {
    let h = harness(Duration::from_secs(5)).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "access-1"})))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "nobody"})))
        .mount(&h.server)
        .await;

    let (_, state) = begin(&h);
    let outcome = h.provider.phase_n(&callback(&state, "code-1")).await.unwrap();
    assert!(!outcome.is_success());
}

#[tokio::test]
async fn slow_token_endpoint_times_out() {
    let h = harness(Duration::from_millis(200)).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "access-1"}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&h.server)
        .await;

    let (_, state) = begin(&h);
    let outcome = h.provider.phase_n(&callback(&state, "code-1")).await.unwrap();

    assert!(matches!(outcome, SocialOutcome::Failed { .. }));
}

#[tokio::test]
async fn state_is_single_use() {
    let h = harness(Duration::from_secs(5)).await;
    let (_, state) = begin(&h);

    let params = CallbackParams {
        state: Some(state),
        error: Some("access_denied".to_string()),
        ..CallbackParams::default()
    };
    assert!(h.provider.phase_n(&params).await.is_ok());
    assert!(matches!(
        h.provider.phase_n(&params).await,
        Err(SocialError::UnknownState)
    ));
}

#[tokio::test]
async fn unknown_state_is_rejected() {
    let h = harness(Duration::from_secs(5)).await;
    let result = h.provider.phase_n(&callback("forged", "code")).await;
    assert!(matches!(result, Err(SocialError::UnknownState)));

    let result = h.provider.phase_n(&CallbackParams::default()).await;
    assert!(matches!(result, Err(SocialError::UnknownState)));
}

#[tokio::test]
async fn begin_without_credentials_fails() {
    let h = harness(Duration::from_secs(5)).await;
    let session = h.sessions.create("https://unknown-sp.example/");

    assert!(matches!(
        h.provider.begin(&session.sid),
        Err(SocialError::Credentials(_))
    ));
    assert!(matches!(
        h.provider.begin("no-such-session"),
        Err(SocialError::SessionNotFound(_))
    ));
}
