//! Error types shared by the device-flow client, the lifecycle manager and the sync loop.

use thiserror::Error;

/// OAuth error codes that only mean "the user has not finished yet".
const PENDING_OAUTH_CODES: &[&str] = &["authorization_pending", "slow_down"];

/// Errors raised while authenticating against or synchronizing with the provider.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Non-200 response (or no response at all) from a device-flow endpoint
    #[error("auth request to {url} failed with status {}", display_status(.status))]
    RemoteAuth { url: String, status: Option<u16> },

    /// Error code embedded in a token response body
    #[error("OAuth error `{code}`: {}", .description.as_deref().unwrap_or("no description"))]
    OAuth {
        code: String,
        description: Option<String>,
    },

    /// Ingestion endpoint answered with something other than 201/409
    #[error("measurement delivery to {url} failed with status {status}")]
    Delivery { url: String, status: u16 },

    #[error("request to {url} returned unexpected status {status}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("configuration {configuration_id} has no usable refresh token")]
    LoginRequired { configuration_id: i64 },

    #[error("invalid input: {0}")]
    Validation(String),
}

impl ConnectorError {
    /// True when the provider reported that the user has not approved the device yet.
    pub fn is_authorization_pending(&self) -> bool {
        matches!(self, Self::OAuth { code, .. } if PENDING_OAUTH_CODES.contains(&code.as_str()))
    }

    /// HTTP status carried by the error, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteAuth { status, .. } => *status,
            Self::Delivery { status, .. } | Self::UnexpectedStatus { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Error for a base URL that cannot take path segments (e.g. `mailto:`).
pub(crate) fn cannot_be_a_base() -> ConnectorError {
    ConnectorError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase)
}

fn display_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

pub type Result<T, E = ConnectorError> = std::result::Result<T, E>;
