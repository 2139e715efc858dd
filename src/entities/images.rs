use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "images")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub filename: String,
    #[sea_orm(unique)]
    pub file_path: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub sha256: String,
    pub status: String,
    pub uploaded_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::pose_data::Entity")]
    PoseData,
    #[sea_orm(has_many = "super::jobs::Entity")]
    Jobs,
}

impl Related<super::pose_data::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PoseData.def()
    }
}

impl Related<super::jobs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Jobs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
