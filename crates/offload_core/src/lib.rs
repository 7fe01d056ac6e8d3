//! Core data logic for Offload.
//! This crate is the single source of truth for tag, metadata and
//! attachment invariants.

pub mod app;
pub mod db;
pub mod logging;
pub mod migration;
pub mod model;
pub mod repo;
pub mod service;
pub mod storage;

pub use app::{CoreConfig, CoreError, LogConfig, OffloadCore};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use migration::{run_tag_migration, TagMigrationError, TagMigrationStats};
pub use model::collection::{Collection, CollectionId};
pub use model::item::{Item, ItemId};
pub use model::metadata::{ItemMetadata, MetadataValue, ATTACHMENT_FILE_PATH_KEY};
pub use model::tag::{normalized_name, Tag, TagId};
pub use model::validation::ValidationError;
pub use repo::collection_repo::{CollectionRepository, SqliteCollectionRepository};
pub use repo::item_repo::{ItemRepository, SqliteItemRepository};
pub use repo::tag_repo::{SqliteTagRepository, TagRepository};
pub use repo::{RepoError, RepoResult};
pub use service::capture_service::{CaptureError, CaptureService, CapturedItem};
pub use storage::attachment_store::{
    AttachmentError, AttachmentResult, AttachmentStorage, AttachmentStore,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
