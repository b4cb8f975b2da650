//! Configuration entity model
//!
//! This module contains the SeaORM entity model for the configurations table.
//! A configuration is one tenant's connector instance: provider endpoints, OAuth
//! client credentials, device-flow state and polling cadence.

use std::time::Duration;

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

/// Configuration entity representing one provider connection
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "configurations")]
pub struct Model {
    /// Unique identifier (primary key, auto-increment)
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Root URL of the provider, e.g. `https://auth.example.com`
    pub root_url: String,

    /// Path of the auth service below the root URL, e.g. `/auth/realms/main`
    pub auth_url_path: String,

    /// Base URL of the provider ingestion API
    pub api_root_url: String,

    /// OAuth client identifier (required)
    pub client_id: String,

    /// OAuth client secret (required, masked on read-back)
    pub client_secret: String,

    /// Device code of the pending device authorization
    pub device_code: Option<String>,

    /// Complete verification URI the user has to open
    pub verification_uri: Option<String>,

    /// Expiry of the verification URI
    pub verification_uri_expire: Option<DateTimeUtc>,

    /// Poll interval in seconds advertised by the provider
    pub verification_interval: Option<i32>,

    pub access_token: Option<String>,

    pub access_token_expire: Option<DateTimeUtc>,

    pub refresh_token: Option<String>,

    /// Whether the worker should process this configuration. `None` means disabled.
    pub enable: Option<bool>,

    /// Seconds to wait after a sync cycle
    pub refresh_interval: i32,

    /// Per-request HTTP timeout in seconds
    pub request_timeout: i32,

    /// Whether a worker currently owns this configuration. `None` counts as active.
    pub active: Option<bool>,

    /// User that receives verification notifications
    pub user_id: Option<String>,

    pub project_id: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::asset_attribute::Entity")]
    AssetAttribute,
}

impl Related<super::asset_attribute::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AssetAttribute.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether the worker should pick this configuration up.
    pub fn is_enabled(&self) -> bool {
        self.enable == Some(true)
    }

    /// Whether the configuration is currently marked as owned by a worker.
    pub fn is_active(&self) -> bool {
        self.active.unwrap_or(true)
    }

    /// Whether the device flow has to be (re)started, i.e. no refresh token is stored.
    pub fn is_login_needed(&self) -> bool {
        self.refresh_token.as_deref().is_none_or(str::is_empty)
    }

    /// HTTP deadline for calls made on behalf of this configuration.
    ///
    /// A stored timeout of zero or less falls back to `fallback` instead of disabling the deadline.
    pub fn request_timeout_or(&self, fallback: Duration) -> Duration {
        match u64::try_from(self.request_timeout) {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => fallback,
        }
    }

    /// Seconds to wait after a sync cycle, never negative.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(u64::try_from(self.refresh_interval).unwrap_or(0))
    }
}
