//! Tag domain model.
//!
//! # Responsibility
//! - Define the relational tag record linked to items and collections.
//! - Own the single normalization rule used for tag identity.
//!
//! # Invariants
//! - `id` is stable and never reused for another tag.
//! - Two tags are the same logical tag when `normalized_name` matches.
//! - After tag migration, at most one live tag exists per normalized name.

use super::now_epoch_ms;
use super::validation::ValidationError;
use uuid::Uuid;

/// Stable identifier of a tag record.
pub type TagId = Uuid;

/// User-visible label shared by items and collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: TagId,
    /// Display name as entered, trimmed by find-or-create and migration.
    pub name: String,
    /// Optional display color token.
    pub color: Option<String>,
    /// Unix epoch milliseconds. Oldest tag wins when duplicates are merged.
    pub created_at: i64,
}

impl Tag {
    /// Creates a tag with a generated id and the current timestamp.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), name, now_epoch_ms())
    }

    /// Creates a tag with caller-provided identity and creation time.
    ///
    /// Used by migration and tests where ordering must be explicit.
    pub fn with_id(id: TagId, name: impl Into<String>, created_at: i64) -> Self {
        Self {
            id,
            name: name.into(),
            color: None,
            created_at,
        }
    }

    /// Sets the display color.
    pub fn with_color(mut self, color: Option<String>) -> Self {
        self.color = color;
        self
    }

    /// Returns the identity key of this tag.
    pub fn normalized_name(&self) -> String {
        normalized_name(&self.name)
    }

    /// Rejects tags whose name is blank.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyTagName);
        }
        Ok(())
    }
}

/// Normalizes a tag name into its identity key: trimmed and lowercased.
///
/// Returns an empty string for blank input; callers treat that as "no tag".
pub fn normalized_name(name: &str) -> String {
    name.trim().to_lowercase()
}
