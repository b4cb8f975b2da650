//! # Measurement Connector Library
//!
//! Authenticates configurations against a provider with the OAuth2 device
//! authorization grant and incrementally forwards platform trend data to the
//! provider's ingestion API.

pub mod config;
pub mod db;
pub mod device_flow;
pub mod error;
pub mod lifecycle;
pub mod measurements;
pub mod models;
pub mod notify;
pub mod platform;
pub mod presentation;
pub mod repositories;
pub mod single_flight;
pub mod telemetry;
pub mod worker;
pub use migration;
