pub mod prelude;

pub mod images;
pub mod jobs;
pub mod pose_data;
