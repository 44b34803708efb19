//! `SeaORM` entity for the `objects` table: the authoritative record of one
//! announced blob, keyed by the producer-chosen `pointer_id`.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "objects")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub pointer_id: Uuid,
    pub bucket: Option<String>,
    pub object_key: Option<String>,
    pub recipients_total: Option<i32>,
    pub created_at: DateTimeUtc,
    /// NULL marks a placeholder row created by an early ACK.
    pub pointer_received_at: Option<DateTimeUtc>,
    /// Monotonic one-way transition: NULL -> timestamp, never reverts.
    pub deleted_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::acks::Entity")]
    Acks,
}

impl Related<super::acks::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Acks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
