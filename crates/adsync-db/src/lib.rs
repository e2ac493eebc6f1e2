pub mod config;
pub mod database;
pub mod task_repository;

pub use config::DatabaseConfig;
pub use database::Database;
pub use task_repository::RefreshTaskRepository;
