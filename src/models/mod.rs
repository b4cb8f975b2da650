//! # Data Models
//!
//! SeaORM entities persisted by the connector.

pub mod asset_attribute;
pub mod configuration;

pub use asset_attribute::Entity as AssetAttribute;
pub use configuration::Entity as Configuration;
