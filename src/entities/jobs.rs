use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub image_id: String,
    pub pose_data_id: String,
    /// Stored as text; values outside `JobStatus` are a consistency fault.
    pub status: String,
    pub error: Option<String>,
    pub model_path: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub started_at: Option<DateTimeUtc>,
    pub completed_at: Option<DateTimeUtc>,
    /// Lease held by the worker currently processing the job
    pub claim_token: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::images::Entity",
        from = "Column::ImageId",
        to = "super::images::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Images,
    #[sea_orm(
        belongs_to = "super::pose_data::Entity",
        from = "Column::PoseDataId",
        to = "super::pose_data::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    PoseData,
}

impl Related<super::images::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Images.def()
    }
}

impl Related<super::pose_data::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PoseData.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
