pub mod change_repository;
pub mod config;
pub mod database;
pub mod snapshot_repository;
pub mod source_repository;

pub use change_repository::ChangeRepository;
pub use config::DatabaseConfig;
pub use database::Database;
pub use snapshot_repository::SnapshotRepository;
pub use source_repository::SourceRepository;
