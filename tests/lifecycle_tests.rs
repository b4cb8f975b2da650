use chrono::{Duration as ChronoDuration, Utc};
use measurement_connector::device_flow::DeviceFlowClient;
use measurement_connector::error::ConnectorError;
use measurement_connector::lifecycle::{
    CredentialState, LifecycleManager, LoginProgress, classify,
};
use measurement_connector::repositories::{ConnectorStore, SeaOrmStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, method, path},
};
mod test_utils;
use test_utils::{
    FailingNotifier, RecordingNotifier, insert_configuration, new_configuration, setup_test_db,
};

const DEVICE_PATH: &str = "/auth/realms/main/protocol/openid-connect/auth/device";
const TOKEN_PATH: &str = "/auth/realms/main/protocol/openid-connect/token";

struct Harness {
    server: MockServer,
    store: Arc<SeaOrmStore>,
    notifier: Arc<RecordingNotifier>,
    manager: LifecycleManager,
}

async fn harness() -> Harness {
    let server = MockServer::start().await;
    let db = setup_test_db().await.unwrap();
    let store = Arc::new(SeaOrmStore::new(db));
    let notifier = Arc::new(RecordingNotifier::default());
    let manager = LifecycleManager::new(
        store.clone(),
        notifier.clone(),
        DeviceFlowClient::new(),
        Duration::from_secs(5),
    );
    Harness {
        server,
        store,
        notifier,
        manager,
    }
}

async fn mount_verification(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(DEVICE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": "device-123",
            "user_code": "ABCD-EFGH",
            "verification_uri": "https://idp.example.com/device",
            "verification_uri_complete": "https://idp.example.com/device?user_code=ABCD-EFGH",
            "expires_in": 600,
            "interval": 7
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn empty_refresh_token_issues_verification_and_notifies_once() {
    let h = harness().await;
    mount_verification(&h.server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let mut new = new_configuration(&h.server.uri());
    new.refresh_token = Some(String::new());
    let config = insert_configuration(&h.store.configurations().db, new)
        .await
        .unwrap();
    let now = Utc::now();

    let progress = h.manager.advance_login(&config, now).await.unwrap();

    assert_eq!(
        progress,
        LoginProgress::VerificationIssued {
            poll_interval: Some(Duration::from_secs(7))
        }
    );

    let stored = h.store.get_configuration(config.id).await.unwrap();
    assert_eq!(stored.device_code.as_deref(), Some("device-123"));
    assert_eq!(
        stored.verification_uri.as_deref(),
        Some("https://idp.example.com/device?user_code=ABCD-EFGH")
    );
    assert_eq!(stored.verification_interval, Some(7));
    let expiry = stored.verification_uri_expire.unwrap();
    assert!(expiry > now + ChronoDuration::seconds(590));
    assert!(stored.access_token.is_none());
    assert_eq!(classify(&stored, Utc::now()), CredentialState::AwaitingUserAction);

    let messages = h.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "user-1");
    assert_eq!(messages[0].1, "project-1");
    assert!(
        messages[0]
            .2
            .en
            .contains("https://idp.example.com/device?user_code=ABCD-EFGH")
    );
}

#[tokio::test]
async fn pending_authorization_leaves_state_untouched() {
    let h = harness().await;
    mount_verification(&h.server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": "authorization_pending"
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let config = insert_configuration(
        &h.store.configurations().db,
        new_configuration(&h.server.uri()),
    )
    .await
    .unwrap();
    h.manager.advance_login(&config, Utc::now()).await.unwrap();
    let pending = h.store.get_configuration(config.id).await.unwrap();
    let notifications_before = h.notifier.messages().len();

    let err = h
        .manager
        .advance_login(&pending, Utc::now())
        .await
        .unwrap_err();

    assert!(err.is_authorization_pending());
    let after = h.store.get_configuration(config.id).await.unwrap();
    assert_eq!(after, pending);
    assert_eq!(classify(&after, Utc::now()), CredentialState::AwaitingUserAction);
    assert_eq!(h.notifier.messages().len(), notifications_before);
}

#[tokio::test]
async fn approved_device_stores_tokens_and_confirms() {
    let h = harness().await;
    mount_verification(&h.server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("device_code=device-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "refresh_token": "refresh-1",
            "expires_in": 300,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let config = insert_configuration(
        &h.store.configurations().db,
        new_configuration(&h.server.uri()),
    )
    .await
    .unwrap();
    h.manager.advance_login(&config, Utc::now()).await.unwrap();
    let pending = h.store.get_configuration(config.id).await.unwrap();

    let progress = h.manager.advance_login(&pending, Utc::now()).await.unwrap();

    assert_eq!(progress, LoginProgress::Completed);
    let stored = h.store.get_configuration(config.id).await.unwrap();
    assert_eq!(stored.access_token.as_deref(), Some("access-1"));
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(classify(&stored, Utc::now()), CredentialState::TokenValid);

    let messages = h.notifier.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].2.en, "Verification of the app was successful.");

    let progress = h.manager.advance_login(&stored, Utc::now()).await.unwrap();
    assert_eq!(progress, LoginProgress::AlreadyAuthenticated);
}

#[tokio::test]
async fn expired_access_token_is_refreshed() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-2",
            "refresh_token": "refresh-2",
            "expires_in": 300
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let mut new = new_configuration(&h.server.uri());
    new.refresh_token = Some("refresh-0".to_string());
    let config = insert_configuration(&h.store.configurations().db, new)
        .await
        .unwrap();
    assert_eq!(classify(&config, Utc::now()), CredentialState::TokenExpired);

    let refreshed = h
        .manager
        .ensure_access_token(config, Utc::now())
        .await
        .unwrap();

    assert_eq!(refreshed.access_token.as_deref(), Some("access-2"));
    assert_eq!(refreshed.refresh_token.as_deref(), Some("refresh-2"));
    assert_eq!(classify(&refreshed, Utc::now()), CredentialState::TokenValid);
}

#[tokio::test]
async fn failed_refresh_keeps_previous_tokens() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Token is not active"
        })))
        .mount(&h.server)
        .await;

    let mut new = new_configuration(&h.server.uri());
    new.refresh_token = Some("refresh-0".to_string());
    let config = insert_configuration(&h.store.configurations().db, new)
        .await
        .unwrap();

    let err = h
        .manager
        .ensure_access_token(config.clone(), Utc::now())
        .await
        .unwrap_err();

    assert!(matches!(err, ConnectorError::OAuth { ref code, .. } if code == "invalid_grant"));
    let stored = h.store.get_configuration(config.id).await.unwrap();
    assert_eq!(stored, config);
    assert_eq!(classify(&stored, Utc::now()), CredentialState::TokenExpired);
}

#[tokio::test]
async fn sync_without_login_is_rejected() {
    let h = harness().await;
    let config = insert_configuration(
        &h.store.configurations().db,
        new_configuration(&h.server.uri()),
    )
    .await
    .unwrap();

    let err = h
        .manager
        .ensure_access_token(config.clone(), Utc::now())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ConnectorError::LoginRequired { configuration_id } if configuration_id == config.id
    ));
}

#[tokio::test]
async fn failed_notifications_do_not_undo_login_progress() {
    let server = MockServer::start().await;
    let db = setup_test_db().await.unwrap();
    let store = Arc::new(SeaOrmStore::new(db));
    let notifier = Arc::new(FailingNotifier::default());
    let manager = LifecycleManager::new(
        store.clone(),
        notifier.clone(),
        DeviceFlowClient::new(),
        Duration::from_secs(5),
    );
    mount_verification(&server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "refresh_token": "refresh-1",
            "expires_in": 300
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = insert_configuration(
        &store.configurations().db,
        new_configuration(&server.uri()),
    )
    .await
    .unwrap();

    let progress = manager.advance_login(&config, Utc::now()).await.unwrap();
    assert!(matches!(progress, LoginProgress::VerificationIssued { .. }));
    let pending = store.get_configuration(config.id).await.unwrap();
    assert_eq!(pending.device_code.as_deref(), Some("device-123"));

    let progress = manager.advance_login(&pending, Utc::now()).await.unwrap();
    assert_eq!(progress, LoginProgress::Completed);
    let stored = store.get_configuration(config.id).await.unwrap();
    assert_eq!(stored.device_code.as_deref(), Some("device-123"));
    assert_eq!(stored.access_token.as_deref(), Some("access-1"));
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(notifier.attempt_count(), 2);
}
