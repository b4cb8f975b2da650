//! Value objects exchanged with the device-flow endpoints.

use serde::{Deserialize, Serialize};

/// Device authorization challenge returned by the `auth/device` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub device_code: String,
    #[serde(default)]
    pub user_code: String,
    #[serde(default)]
    pub verification_uri: String,
    /// Verification URI with the user code already embedded
    #[serde(default)]
    pub verification_uri_complete: String,
    /// Seconds until the device code expires
    #[serde(default)]
    pub expires_in: i64,
    /// Seconds the client should wait between token polls
    #[serde(default)]
    pub interval: i32,
}

impl Verification {
    /// The URI shown to the user, preferring the complete form.
    pub fn user_facing_uri(&self) -> &str {
        if self.verification_uri_complete.is_empty() {
            &self.verification_uri
        } else {
            &self.verification_uri_complete
        }
    }
}

/// Token endpoint response.
///
/// A non-empty `error` marks a failed exchange even when the HTTP status was 200.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Token {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    /// Seconds until the access token expires
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl Token {
    /// Error code carried by the body, ignoring blank values.
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_deref().filter(|code| !code.trim().is_empty())
    }
}
