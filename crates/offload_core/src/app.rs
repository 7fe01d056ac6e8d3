//! Startup configuration and the core handle.
//!
//! # Responsibility
//! - Turn a `CoreConfig` into a ready store: logging, schema migrations,
//!   one tag migration run and the attachment store.
//! - Hand out repositories and services built from that one connection.
//!
//! # Invariants
//! - A failed tag migration never aborts startup; it is logged and kept on
//!   the handle, and the next launch retries it.
//! - Nothing is looked up from global state: every repository or service
//!   is built from this handle explicitly.

use crate::db::{open_db, open_db_in_memory, DbError};
use crate::logging::{default_log_level, init_logging, LoggingError};
use crate::migration::{run_tag_migration, TagMigrationError, TagMigrationStats};
use crate::repo::collection_repo::SqliteCollectionRepository;
use crate::repo::item_repo::SqliteItemRepository;
use crate::repo::tag_repo::SqliteTagRepository;
use crate::service::capture_service::CaptureService;
use crate::storage::attachment_store::AttachmentStore;
use log::{info, warn};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Database file name used by `CoreConfig::for_base_dir`.
pub const DB_FILE_NAME: &str = "offload.sqlite3";
const LOG_DIR_NAME: &str = "logs";

/// File logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// One of trace|debug|info|warn|error.
    pub level: String,
    /// Absolute directory for rolling log files.
    pub dir: PathBuf,
}

/// Everything `OffloadCore::open` needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Database file; `None` opens an in-memory store.
    pub db_path: Option<PathBuf>,
    /// Managed attachment directory.
    pub attachments_dir: PathBuf,
    /// `None` leaves logging to the host process.
    pub log: Option<LogConfig>,
}

impl CoreConfig {
    /// Default layout below one app data directory.
    pub fn for_base_dir(base_dir: impl AsRef<Path>) -> Self {
        let base_dir = base_dir.as_ref();
        Self {
            db_path: Some(base_dir.join(DB_FILE_NAME)),
            attachments_dir: AttachmentStore::default_root(base_dir),
            log: Some(LogConfig {
                level: default_log_level().to_string(),
                dir: base_dir.join(LOG_DIR_NAME),
            }),
        }
    }

    /// In-memory store without file logging; used by tests and probes.
    pub fn in_memory(attachments_dir: impl Into<PathBuf>) -> Self {
        Self {
            db_path: None,
            attachments_dir: attachments_dir.into(),
            log: None,
        }
    }
}

/// Startup failures that leave no usable handle.
#[derive(Debug)]
pub enum CoreError {
    Logging(LoggingError),
    Db(DbError),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Logging(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Logging(err) => Some(err),
            Self::Db(err) => Some(err),
        }
    }
}

impl From<LoggingError> for CoreError {
    fn from(value: LoggingError) -> Self {
        Self::Logging(value)
    }
}

impl From<DbError> for CoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

/// Open store plus the services built on it.
pub struct OffloadCore {
    conn: Connection,
    attachments: AttachmentStore,
    tag_migration: Result<TagMigrationStats, TagMigrationError>,
}

impl OffloadCore {
    /// Opens the store described by `config` and runs the tag migration.
    ///
    /// # Errors
    /// - `Logging` when file logging cannot start.
    /// - `Db` when the database cannot be opened or its schema migrated.
    pub fn open(config: &CoreConfig) -> Result<Self, CoreError> {
        if let Some(log) = config.log.as_ref() {
            init_logging(&log.level, &log.dir)?;
        }

        let mut conn = match config.db_path.as_ref() {
            Some(path) => open_db(path)?,
            None => open_db_in_memory()?,
        };

        let tag_migration = run_tag_migration(&mut conn);
        match &tag_migration {
            Ok(stats) => info!(
                "event=core_open module=app status=ok tag_migration_saved={}",
                stats.did_save
            ),
            Err(err) => warn!(
                "event=core_open module=app status=degraded reason=tag_migration_failed error={err}"
            ),
        }

        Ok(Self {
            conn,
            attachments: AttachmentStore::new(config.attachments_dir.clone()),
            tag_migration,
        })
    }

    /// Result of the tag migration run during `open`.
    pub fn tag_migration_outcome(&self) -> Result<&TagMigrationStats, &TagMigrationError> {
        self.tag_migration.as_ref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn attachments(&self) -> &AttachmentStore {
        &self.attachments
    }

    pub fn tag_repo(&self) -> SqliteTagRepository<'_> {
        SqliteTagRepository::new(&self.conn)
    }

    pub fn item_repo(&self) -> SqliteItemRepository<'_> {
        SqliteItemRepository::new(&self.conn)
    }

    pub fn collection_repo(&self) -> SqliteCollectionRepository<'_> {
        SqliteCollectionRepository::new(&self.conn)
    }

    pub fn capture_service(
        &self,
    ) -> CaptureService<SqliteItemRepository<'_>, SqliteTagRepository<'_>, &AttachmentStore> {
        CaptureService::new(self.item_repo(), self.tag_repo(), &self.attachments)
    }
}
