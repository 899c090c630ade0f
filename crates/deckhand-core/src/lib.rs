pub mod collection;
pub mod config;
pub mod models;
pub mod orchestration;
pub mod tasks;
