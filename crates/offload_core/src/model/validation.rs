//! Validation errors shared by domain records.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Required-field violations raised before a record is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// Tag name is empty after trimming whitespace.
    EmptyTagName,
    /// Another live tag already owns the normalized name.
    DuplicateTagName,
    /// Item content is empty after trimming whitespace.
    EmptyItemContent,
    /// Collection name is empty after trimming whitespace.
    EmptyCollectionName,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTagName => write!(f, "tag name must not be empty"),
            Self::DuplicateTagName => write!(f, "a tag with this name already exists"),
            Self::EmptyItemContent => write!(f, "item content must not be empty"),
            Self::EmptyCollectionName => write!(f, "collection name must not be empty"),
        }
    }
}

impl Error for ValidationError {}
