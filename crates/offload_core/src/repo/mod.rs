//! Repository layer contracts and SQLite implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQL details from services and the tag migration.
//!
//! # Invariants
//! - Write paths validate records before touching storage.
//! - Read paths reject invalid persisted state instead of masking it, except
//!   item metadata, which decodes best-effort by contract.

use crate::db::DbError;
use crate::model::validation::ValidationError;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod collection_repo;
pub mod item_repo;
pub mod tag_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by tag, item and collection persistence.
#[derive(Debug)]
pub enum RepoError {
    /// Record failed a required-field check before persistence.
    Validation(ValidationError),
    /// Underlying storage failure; writes in flight were not committed.
    Db(DbError),
    /// Target record does not exist.
    NotFound(Uuid),
    /// Persisted row cannot be converted into a valid record.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

/// Decodes the JSON array stored in `items.legacy_tags`.
pub(crate) fn parse_legacy_tags(value: &str) -> RepoResult<Vec<String>> {
    serde_json::from_str(value).map_err(|err| {
        RepoError::InvalidData(format!("invalid legacy tag array in items.legacy_tags: {err}"))
    })
}

pub(crate) fn encode_legacy_tags(tags: &[String]) -> RepoResult<String> {
    serde_json::to_string(tags)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode legacy tags: {err}")))
}

pub(crate) fn row_exists(conn: &Connection, sql: &str, id: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(&format!("SELECT EXISTS({sql});"), [id], |row| row.get(0))?;
    Ok(exists == 1)
}
