pub mod collaborators;
pub mod database;
pub mod storage;
