//! Configuration repository for database operations
//!
//! Encapsulates SeaORM operations on the configurations table. Every write is a
//! point update scoped to a single row.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, QueryOrder, Set};
use std::sync::Arc;

use crate::device_flow::{Token, Verification};
use crate::error::{ConnectorError, Result};
use crate::models::configuration::{self, Entity as Configuration};

const ENTITY: &str = "configuration";

/// Fields accepted when creating a configuration.
#[derive(Debug, Clone, Default)]
pub struct NewConfiguration {
    pub root_url: String,
    pub auth_url_path: String,
    pub api_root_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Pre-provisioned refresh token; skips the device flow when present
    pub refresh_token: Option<String>,
    pub enable: Option<bool>,
    pub refresh_interval: Option<i32>,
    pub request_timeout: Option<i32>,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
}

/// Repository for configuration database operations
#[derive(Debug, Clone)]
pub struct ConfigurationRepository {
    pub db: Arc<DatabaseConnection>,
}

impl ConfigurationRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Inserts a configuration. Client id and secret are mandatory.
    pub async fn create(&self, new: NewConfiguration) -> Result<configuration::Model> {
        if new.client_id.trim().is_empty() || new.client_secret.trim().is_empty() {
            return Err(ConnectorError::Validation(
                "clientId and clientSecret are required".to_string(),
            ));
        }

        let model = configuration::ActiveModel {
            root_url: Set(new.root_url),
            auth_url_path: Set(new.auth_url_path),
            api_root_url: Set(new.api_root_url),
            client_id: Set(new.client_id),
            client_secret: Set(new.client_secret),
            refresh_token: Set(new.refresh_token),
            enable: Set(new.enable),
            refresh_interval: Set(new.refresh_interval.unwrap_or(60)),
            request_timeout: Set(new.request_timeout.unwrap_or(120)),
            user_id: Set(new.user_id),
            project_id: Set(new.project_id),
            ..Default::default()
        };

        Ok(model.insert(self.db.as_ref()).await?)
    }

    /// All configurations ordered by id.
    pub async fn list(&self) -> Result<Vec<configuration::Model>> {
        Ok(Configuration::find()
            .order_by_asc(configuration::Column::Id)
            .all(self.db.as_ref())
            .await?)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<configuration::Model>> {
        Ok(Configuration::find_by_id(id).one(self.db.as_ref()).await?)
    }

    /// Like [`get_by_id`](Self::get_by_id) but a miss is a [`ConnectorError::NotFound`].
    pub async fn require(&self, id: i64) -> Result<configuration::Model> {
        self.get_by_id(id).await?.ok_or_else(|| not_found(id))
    }

    /// Deletes a configuration; its attributes go with it through the foreign key.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = Configuration::delete_by_id(id).exec(self.db.as_ref()).await?;
        if result.rows_affected == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    pub async fn set_active(&self, id: i64, active: bool) -> Result<()> {
        let model = configuration::ActiveModel {
            id: Set(id),
            active: Set(Some(active)),
            ..Default::default()
        };
        self.update(id, model).await
    }

    /// Stores a freshly issued device authorization.
    pub async fn save_verification(
        &self,
        id: i64,
        verification: &Verification,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let model = configuration::ActiveModel {
            id: Set(id),
            device_code: Set(Some(verification.device_code.clone())),
            verification_uri: Set(Some(verification.user_facing_uri().to_string())),
            verification_uri_expire: Set(Some(expires_after(now, verification.expires_in))),
            verification_interval: Set(Some(verification.interval)),
            ..Default::default()
        };
        self.update(id, model).await
    }

    /// Stores a token pair obtained from a successful exchange.
    pub async fn save_token(&self, id: i64, token: &Token, now: DateTime<Utc>) -> Result<()> {
        let mut model = configuration::ActiveModel {
            id: Set(id),
            access_token: Set(Some(token.access_token.clone())),
            access_token_expire: Set(Some(expires_after(now, token.expires_in))),
            ..Default::default()
        };
        // Some refresh responses do not rotate the refresh token.
        if !token.refresh_token.is_empty() {
            model.refresh_token = Set(Some(token.refresh_token.clone()));
        }
        self.update(id, model).await
    }

    async fn update(&self, id: i64, model: configuration::ActiveModel) -> Result<()> {
        match model.update(self.db.as_ref()).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) | Err(DbErr::RecordNotFound(_)) => Err(not_found(id)),
            Err(err) => Err(err.into()),
        }
    }
}

/// `now + seconds`, saturating to `now` when the offset is out of range.
fn expires_after(now: DateTime<Utc>, seconds: i64) -> DateTime<Utc> {
    Duration::try_seconds(seconds)
        .and_then(|offset| now.checked_add_signed(offset))
        .unwrap_or(now)
}

fn not_found(id: i64) -> ConnectorError {
    ConnectorError::NotFound {
        entity: ENTITY,
        id: id.to_string(),
    }
}
