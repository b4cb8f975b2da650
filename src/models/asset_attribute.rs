//! Asset attribute entity model
//!
//! One tracked (configuration, asset, subtype, attribute) series and its sync cursor.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "asset_attributes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub configuration_id: i64,

    /// Asset identifier on the local platform
    #[sea_orm(primary_key, auto_increment = false)]
    pub asset_id: i32,

    /// Data subtype of the attribute, e.g. `input`
    #[sea_orm(primary_key, auto_increment = false)]
    pub subtype: String,

    #[sea_orm(primary_key, auto_increment = false)]
    pub attribute_name: String,

    /// Device key on the provider side, slash-escaped
    pub device_reference: String,

    /// Register key on the provider side, slash-escaped
    pub register_reference: String,

    /// Timestamp of the newest sample already delivered
    pub latest_ts: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::configuration::Entity",
        from = "Column::ConfigurationId",
        to = "super::configuration::Column::Id",
        on_delete = "Cascade"
    )]
    Configuration,
}

impl Related<super::configuration::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Configuration.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
