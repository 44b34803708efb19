//! `SeaORM` entity for the `acks` table: one row per confirmed
//! `(pointer_id, recipient_id)` pair. At most one row per pair, ever.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "acks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub pointer_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub recipient_id: String,
    pub processed_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::objects::Entity",
        from = "Column::PointerId",
        to = "super::objects::Column::PointerId"
    )]
    Objects,
}

impl Related<super::objects::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Objects.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
