pub use super::images::Entity as Images;
pub use super::jobs::Entity as Jobs;
pub use super::pose_data::Entity as PoseData;
