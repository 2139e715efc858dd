pub mod collaborator;
pub mod image_service;
pub mod job_service;
pub mod pose;
pub mod pose_service;
pub mod reconstruction;
pub mod storage;
pub mod worker;
