//! Test utilities for database and collaborator setup.
//!
//! Provides an in-memory SQLite database with migrations applied, fixture
//! helpers for configurations and tracked attributes, and recording fakes for
//! the notifier, trend source and store seams.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use measurement_connector::device_flow::{Token, Verification};
use measurement_connector::error::{ConnectorError, Result as ConnectorResult};
use measurement_connector::measurements::{TrendSample, TrendSource};
use measurement_connector::models::{asset_attribute, configuration};
use measurement_connector::notify::{Notifier, Translation};
use measurement_connector::repositories::{
    ConfigurationRepository, ConnectorStore, NewAssetAttribute, NewConfiguration, SeaOrmStore,
};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<Arc<DatabaseConnection>> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(Arc::new(db))
}

/// A configuration pointing both auth and ingestion at `server_uri`.
pub fn new_configuration(server_uri: &str) -> NewConfiguration {
    NewConfiguration {
        root_url: server_uri.to_string(),
        auth_url_path: "/auth/realms/main".to_string(),
        api_root_url: format!("{server_uri}/api"),
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        enable: Some(true),
        refresh_interval: Some(1),
        request_timeout: Some(5),
        user_id: Some("user-1".to_string()),
        project_id: Some("project-1".to_string()),
        ..NewConfiguration::default()
    }
}

pub async fn insert_configuration(
    db: &Arc<DatabaseConnection>,
    new: NewConfiguration,
) -> Result<configuration::Model> {
    Ok(ConfigurationRepository::new(db.clone()).create(new).await?)
}

/// Stores a valid token pair directly, bypassing the device flow.
pub async fn authenticate(
    store: &SeaOrmStore,
    configuration_id: i64,
    expires_in: i64,
) -> Result<configuration::Model> {
    let token = Token {
        access_token: "access-token".to_string(),
        refresh_token: "refresh-token".to_string(),
        expires_in,
        token_type: "Bearer".to_string(),
        ..Token::default()
    };
    store
        .save_token(configuration_id, &token, Utc::now())
        .await?;
    Ok(store.get_configuration(configuration_id).await?)
}

pub fn new_attribute(
    configuration_id: i64,
    asset_id: i32,
    attribute_name: &str,
    latest_ts: DateTime<Utc>,
) -> NewAssetAttribute {
    NewAssetAttribute {
        configuration_id,
        asset_id,
        subtype: "input".to_string(),
        attribute_name: attribute_name.to_string(),
        global_asset_identifier: format!("meter/{asset_id}"),
        device_reference: None,
        register_reference: None,
        latest_ts: Some(latest_ts),
    }
}

pub fn ts(raw: &str) -> DateTime<Utc> {
    raw.parse().expect("valid RFC 3339 timestamp")
}

/// Notifier that remembers every message.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String, Translation)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(String, String, Translation)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        user_id: &str,
        project_id: &str,
        message: &Translation,
    ) -> ConnectorResult<()> {
        self.sent.lock().unwrap().push((
            user_id.to_string(),
            project_id.to_string(),
            message.clone(),
        ));
        Ok(())
    }
}

/// Notifier whose every delivery fails, counting attempts.
#[derive(Default)]
pub struct FailingNotifier {
    pub attempts: AtomicUsize,
}

impl FailingNotifier {
    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(
        &self,
        _user_id: &str,
        _project_id: &str,
        _message: &Translation,
    ) -> ConnectorResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ConnectorError::UnexpectedStatus {
            url: "http://platform.invalid/notifications".to_string(),
            status: 503,
        })
    }
}

/// Trend source serving a fixed series and counting queries.
#[derive(Default)]
pub struct StaticTrendSource {
    pub samples: Mutex<Vec<TrendSample>>,
    pub queries: AtomicUsize,
}

impl StaticTrendSource {
    pub fn with_samples(samples: Vec<TrendSample>) -> Self {
        Self {
            samples: Mutex::new(samples),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrendSource for StaticTrendSource {
    async fn fetch_trends(
        &self,
        _asset_id: i32,
        _subtype: &str,
    ) -> ConnectorResult<Vec<TrendSample>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.samples.lock().unwrap().clone())
    }
}

pub fn sample(raw_ts: &str, data: serde_json::Value) -> TrendSample {
    TrendSample {
        asset_id: Some(1),
        subtype: Some("input".to_string()),
        timestamp: Some(ts(raw_ts)),
        data: data.as_object().cloned().unwrap_or_default(),
    }
}

/// Store wrapper counting every write.
pub struct RecordingStore {
    pub inner: SeaOrmStore,
    pub writes: AtomicUsize,
}

impl RecordingStore {
    pub fn new(inner: SeaOrmStore) -> Self {
        Self {
            inner,
            writes: AtomicUsize::new(0),
        }
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectorStore for RecordingStore {
    async fn list_configurations(&self) -> ConnectorResult<Vec<configuration::Model>> {
        self.inner.list_configurations().await
    }

    async fn get_configuration(&self, id: i64) -> ConnectorResult<configuration::Model> {
        self.inner.get_configuration(id).await
    }

    async fn set_active(&self, id: i64, active: bool) -> ConnectorResult<()> {
        self.record();
        self.inner.set_active(id, active).await
    }

    async fn save_verification(
        &self,
        id: i64,
        verification: &Verification,
        now: DateTime<Utc>,
    ) -> ConnectorResult<()> {
        self.record();
        self.inner.save_verification(id, verification, now).await
    }

    async fn save_token(&self, id: i64, token: &Token, now: DateTime<Utc>) -> ConnectorResult<()> {
        self.record();
        self.inner.save_token(id, token, now).await
    }

    async fn list_attributes(
        &self,
        configuration_id: i64,
    ) -> ConnectorResult<Vec<asset_attribute::Model>> {
        self.inner.list_attributes(configuration_id).await
    }

    async fn save_attribute_cursor(
        &self,
        attribute: &asset_attribute::Model,
        latest_ts: DateTime<Utc>,
    ) -> ConnectorResult<()> {
        self.record();
        self.inner.save_attribute_cursor(attribute, latest_ts).await
    }
}
