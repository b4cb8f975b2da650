//! OAuth2 device authorization grant against the provider's identity service.

pub mod client;
pub mod types;

pub use client::{AuthTarget, DeviceFlowClient};
pub use types::{Token, Verification};
