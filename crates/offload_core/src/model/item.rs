//! Captured item domain model.
//!
//! # Responsibility
//! - Define the captured thought record and its typed metadata.
//! - Carry deprecated raw tag names until tag migration backfills them.
//!
//! # Invariants
//! - `uuid` is stable for the item lifetime.
//! - `legacy_tags` is empty for every item that has been migrated.

use super::metadata::ItemMetadata;
use super::now_epoch_ms;
use super::validation::ValidationError;
use uuid::Uuid;

/// Stable identifier of a captured item.
pub type ItemId = Uuid;

/// Captured thought. Tag links live in the repository, not on the record.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub uuid: ItemId,
    /// Raw captured text.
    pub content: String,
    /// Typed metadata; unknown keys are preserved across saves.
    pub metadata: ItemMetadata,
    /// Raw tag names from before relational tags existed.
    pub legacy_tags: Vec<String>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
}

impl Item {
    /// Creates an item with a generated id and the current timestamp.
    pub fn new(content: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), content, now_epoch_ms())
    }

    /// Creates an item with caller-provided identity and creation time.
    pub fn with_id(uuid: ItemId, content: impl Into<String>, created_at: i64) -> Self {
        Self {
            uuid,
            content: content.into(),
            metadata: ItemMetadata::default(),
            legacy_tags: Vec::new(),
            created_at,
            updated_at: created_at,
        }
    }

    /// Rejects items without content.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.content.trim().is_empty() {
            return Err(ValidationError::EmptyItemContent);
        }
        Ok(())
    }

    /// Returns whether legacy tag names are still waiting for migration.
    pub fn has_legacy_tags(&self) -> bool {
        !self.legacy_tags.is_empty()
    }
}
