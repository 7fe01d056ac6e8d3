//! Collection (list/plan container) domain model.

use super::now_epoch_ms;
use super::validation::ValidationError;
use uuid::Uuid;

/// Stable identifier of a collection.
pub type CollectionId = Uuid;

/// Named grouping of items. Carries its own tag links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub uuid: CollectionId,
    pub name: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            created_at: now_epoch_ms(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyCollectionName);
        }
        Ok(())
    }
}
