pub mod health;
pub mod images;
pub mod jobs;
pub mod pose;
pub mod types;
