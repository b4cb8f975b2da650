use chrono::{DateTime, Utc};
use measurement_connector::error::ConnectorError;
use measurement_connector::measurements::{
    AttributeSynchronizer, DeliveryClient, DeliveryOutcome, TrendSample,
};
use measurement_connector::models::{asset_attribute, configuration};
use measurement_connector::repositories::{AttributeFilter, ConnectorStore, SeaOrmStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, method, path},
};
mod test_utils;
use test_utils::{
    StaticTrendSource, authenticate, insert_configuration, new_attribute, new_configuration,
    sample, setup_test_db, ts,
};

const BULK_PATH: &str = "/api/deviceRef/meter_1/registerRef/power/measurements/_bulk_create";

struct Fixture {
    server: MockServer,
    store: Arc<SeaOrmStore>,
    config: configuration::Model,
    attribute: asset_attribute::Model,
}

async fn fixture(cursor: &str) -> Fixture {
    let server = MockServer::start().await;
    let db = setup_test_db().await.unwrap();
    let store = Arc::new(SeaOrmStore::new(db.clone()));
    let created = insert_configuration(&db, new_configuration(&server.uri()))
        .await
        .unwrap();
    let config = authenticate(&store, created.id, 300).await.unwrap();
    let attribute = store
        .attributes()
        .upsert(new_attribute(config.id, 1, "power", ts(cursor)))
        .await
        .unwrap();
    Fixture {
        server,
        store,
        config,
        attribute,
    }
}

fn synchronizer(store: &Arc<SeaOrmStore>, samples: Vec<TrendSample>) -> AttributeSynchronizer {
    AttributeSynchronizer::new(
        store.clone(),
        Arc::new(StaticTrendSource::with_samples(samples)),
        DeliveryClient::new(Duration::from_secs(5)),
    )
}

async fn stored_cursor(store: &SeaOrmStore, configuration_id: i64) -> DateTime<Utc> {
    store
        .attributes()
        .find(&AttributeFilter::for_configuration(configuration_id))
        .await
        .unwrap()[0]
        .latest_ts
}

#[tokio::test]
async fn new_sample_is_delivered_and_cursor_advanced() {
    let f = fixture("2024-01-01T00:00:00Z").await;
    Mock::given(method("POST"))
        .and(path(BULK_PATH))
        .and(header("authorization", "Bearer access-token"))
        .and(body_json(json!([
            {"readAt": "2024-01-02T00:00:00.000Z", "value": 42}
        ])))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&f.server)
        .await;

    let sync = synchronizer(
        &f.store,
        vec![
            sample("2024-01-01T00:00:00Z", json!({"power": 41})),
            sample("2024-01-02T00:00:00Z", json!({"power": 42})),
        ],
    );
    let outcome = sync.sync_attribute(&f.config, &f.attribute).await.unwrap();

    assert_eq!(outcome.delivered, 1);
    assert_eq!(outcome.delivery, Some(DeliveryOutcome::Created));
    assert_eq!(outcome.new_cursor, Some(ts("2024-01-02T00:00:00Z")));
    assert_eq!(
        stored_cursor(&f.store, f.config.id).await,
        ts("2024-01-02T00:00:00Z")
    );
}

#[tokio::test]
async fn samples_at_or_before_cursor_are_not_resent() {
    let f = fixture("2024-01-02T00:00:00Z").await;
    Mock::given(method("POST"))
        .and(path(BULK_PATH))
        .and(body_json(json!([
            {"readAt": "2024-01-03T12:30:00.250Z", "value": 7}
        ])))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&f.server)
        .await;

    let sync = synchronizer(
        &f.store,
        vec![
            sample("2024-01-01T00:00:00Z", json!({"power": 1})),
            sample("2024-01-02T00:00:00Z", json!({"power": 2})),
            sample("2024-01-03T12:30:00.250Z", json!({"power": 7.9})),
        ],
    );
    let outcome = sync.sync_attribute(&f.config, &f.attribute).await.unwrap();

    assert_eq!(outcome.delivered, 1);
    assert_eq!(
        stored_cursor(&f.store, f.config.id).await,
        ts("2024-01-03T12:30:00.250Z")
    );
}

#[tokio::test]
async fn conflict_counts_as_delivered() {
    let f = fixture("2024-01-01T00:00:00Z").await;
    Mock::given(method("POST"))
        .and(path(BULK_PATH))
        .respond_with(ResponseTemplate::new(409))
        .expect(1)
        .mount(&f.server)
        .await;

    let sync = synchronizer(
        &f.store,
        vec![sample("2024-01-02T00:00:00Z", json!({"power": 42}))],
    );
    let outcome = sync.sync_attribute(&f.config, &f.attribute).await.unwrap();

    assert_eq!(outcome.delivery, Some(DeliveryOutcome::Conflict));
    assert_eq!(
        stored_cursor(&f.store, f.config.id).await,
        ts("2024-01-02T00:00:00Z")
    );
}

#[tokio::test]
async fn server_error_keeps_cursor() {
    let f = fixture("2024-01-01T00:00:00Z").await;
    Mock::given(method("POST"))
        .and(path(BULK_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&f.server)
        .await;

    let sync = synchronizer(
        &f.store,
        vec![sample("2024-01-02T00:00:00Z", json!({"power": 42}))],
    );
    let err = sync
        .sync_attribute(&f.config, &f.attribute)
        .await
        .unwrap_err();

    assert!(matches!(err, ConnectorError::Delivery { status: 500, .. }));
    assert_eq!(
        stored_cursor(&f.store, f.config.id).await,
        ts("2024-01-01T00:00:00Z")
    );
}

#[tokio::test]
async fn non_numeric_samples_advance_cursor_without_request() {
    let f = fixture("2024-01-01T00:00:00Z").await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&f.server)
        .await;

    let sync = synchronizer(
        &f.store,
        vec![
            sample("2024-01-02T00:00:00Z", json!({"power": "n/a"})),
            sample("2024-01-03T00:00:00Z", json!({"voltage": 230})),
        ],
    );
    let outcome = sync.sync_attribute(&f.config, &f.attribute).await.unwrap();

    assert_eq!(outcome.delivered, 0);
    assert_eq!(outcome.delivery, None);
    assert_eq!(outcome.new_cursor, Some(ts("2024-01-03T00:00:00Z")));
    assert_eq!(
        stored_cursor(&f.store, f.config.id).await,
        ts("2024-01-03T00:00:00Z")
    );
}

#[tokio::test]
async fn nothing_new_leaves_store_untouched() {
    let f = fixture("2024-01-05T00:00:00Z").await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&f.server)
        .await;

    let sync = synchronizer(
        &f.store,
        vec![sample("2024-01-05T00:00:00Z", json!({"power": 42}))],
    );
    let outcome = sync.sync_attribute(&f.config, &f.attribute).await.unwrap();

    assert_eq!(outcome.delivered, 0);
    assert_eq!(outcome.new_cursor, None);
    assert_eq!(
        stored_cursor(&f.store, f.config.id).await,
        ts("2024-01-05T00:00:00Z")
    );
}

#[tokio::test]
async fn repeated_syncs_never_move_cursor_backwards() {
    let f = fixture("2024-01-01T00:00:00Z").await;
    Mock::given(method("POST"))
        .and(path(BULK_PATH))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&f.server)
        .await;

    let first = synchronizer(
        &f.store,
        vec![sample("2024-01-04T00:00:00Z", json!({"power": 4}))],
    );
    first.sync_attribute(&f.config, &f.attribute).await.unwrap();

    let attribute = f
        .store
        .list_attributes(f.config.id)
        .await
        .unwrap()
        .remove(0);
    let second = synchronizer(
        &f.store,
        vec![sample("2024-01-03T00:00:00Z", json!({"power": 3}))],
    );
    let outcome = second.sync_attribute(&f.config, &attribute).await.unwrap();

    assert_eq!(outcome.new_cursor, None);
    assert_eq!(
        stored_cursor(&f.store, f.config.id).await,
        ts("2024-01-04T00:00:00Z")
    );
}
