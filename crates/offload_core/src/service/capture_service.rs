//! Capture use-case service.
//!
//! # Responsibility
//! - Create items with tags resolved through find-or-create.
//! - Keep item metadata and attachment files in step.
//!
//! # Invariants
//! - Tag names are deduplicated by normalized name before linking.
//! - A capture whose tags cannot all be linked leaves no item behind.
//! - A newly stored file is removed again when the metadata update that
//!   references it fails.
//! - Replaced or detached files are removed only after the item update
//!   succeeded; a failed cleanup is logged, not surfaced.

use crate::model::item::{Item, ItemId};
use crate::model::tag::{normalized_name, Tag};
use crate::repo::item_repo::ItemRepository;
use crate::repo::tag_repo::TagRepository;
use crate::repo::RepoError;
use crate::storage::attachment_store::{AttachmentError, AttachmentStorage};
use log::warn;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for capture use-cases.
#[derive(Debug)]
pub enum CaptureError {
    /// Target item does not exist.
    ItemNotFound(ItemId),
    /// Item has no attachment to load.
    NoAttachment(ItemId),
    /// Persistence-layer failure.
    Repo(RepoError),
    /// Attachment storage failure.
    Attachment(AttachmentError),
}

impl Display for CaptureError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ItemNotFound(id) => write!(f, "item not found: {id}"),
            Self::NoAttachment(id) => write!(f, "item has no attachment: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Attachment(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CaptureError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Attachment(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for CaptureError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<AttachmentError> for CaptureError {
    fn from(value: AttachmentError) -> Self {
        Self::Attachment(value)
    }
}

/// Item as returned by capture, with its resolved tags.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedItem {
    pub item: Item,
    /// Linked tags sorted by name.
    pub tags: Vec<Tag>,
}

/// Capture facade over injected repositories and attachment storage.
pub struct CaptureService<I: ItemRepository, T: TagRepository, S: AttachmentStorage> {
    items: I,
    tags: T,
    storage: S,
}

impl<I: ItemRepository, T: TagRepository, S: AttachmentStorage> CaptureService<I, T, S> {
    pub fn new(items: I, tags: T, storage: S) -> Self {
        Self {
            items,
            tags,
            storage,
        }
    }

    /// Creates one item and links every non-blank tag name to it.
    ///
    /// When a tag cannot be resolved or linked, the new item is deleted
    /// again so no partially tagged capture remains. Tags created before
    /// the failure stay as unused tags.
    pub fn capture(
        &self,
        content: impl Into<String>,
        tag_names: &[String],
    ) -> Result<CapturedItem, CaptureError> {
        let item = Item::new(content);
        self.items.create_item(&item)?;

        if let Err(err) = self.link_tag_names(item.uuid, tag_names) {
            if let Err(cleanup) = self.items.delete_item(item.uuid) {
                warn!("event=capture_rollback module=service status=error error={cleanup}");
            }
            return Err(err);
        }

        let tags = self.items.tags_for_item(item.uuid)?;
        Ok(CapturedItem {
            item: self.reload(item.uuid)?,
            tags,
        })
    }

    /// Stores `data` as the item's attachment, replacing any previous one.
    pub fn attach(&self, item_id: ItemId, data: &[u8]) -> Result<Item, CaptureError> {
        let mut item = self.reload(item_id)?;
        let previous = item.metadata.attachment_file_path.take();

        let stored = self.storage.store(data, item_id)?;
        item.metadata.attachment_file_path = Some(stored.clone());
        if let Err(err) = self.items.update_item(&item) {
            self.discard_file(&stored);
            return Err(err.into());
        }

        if let Some(previous) = previous.filter(|path| *path != stored) {
            self.discard_file(&previous);
        }
        self.reload(item_id)
    }

    /// Reads the bytes of the item's attachment.
    pub fn load_attachment(&self, item_id: ItemId) -> Result<Vec<u8>, CaptureError> {
        let item = self.reload(item_id)?;
        let path = item
            .metadata
            .attachment_file_path
            .ok_or(CaptureError::NoAttachment(item_id))?;
        Ok(self.storage.load(&path)?)
    }

    /// Clears the attachment reference and removes the file.
    pub fn detach(&self, item_id: ItemId) -> Result<Item, CaptureError> {
        let mut item = self.reload(item_id)?;
        let Some(previous) = item.metadata.attachment_file_path.take() else {
            return Ok(item);
        };

        self.items.update_item(&item)?;
        self.discard_file(&previous);
        self.reload(item_id)
    }

    /// Deletes the item, its tag links and its attachment file.
    pub fn delete_item(&self, item_id: ItemId) -> Result<(), CaptureError> {
        let item = self.reload(item_id)?;
        self.items.delete_item(item_id)?;
        if let Some(path) = item.metadata.attachment_file_path.as_deref() {
            self.discard_file(path);
        }
        Ok(())
    }

    fn link_tag_names(&self, item_id: ItemId, tag_names: &[String]) -> Result<(), CaptureError> {
        let mut seen = HashSet::new();
        for name in tag_names {
            let key = normalized_name(name);
            if key.is_empty() || !seen.insert(key) {
                continue;
            }
            let tag = self.tags.find_or_create(name, None)?;
            self.items.link_tag(item_id, tag.id)?;
        }
        Ok(())
    }

    fn reload(&self, item_id: ItemId) -> Result<Item, CaptureError> {
        self.items
            .get_item(item_id)?
            .ok_or(CaptureError::ItemNotFound(item_id))
    }

    fn discard_file(&self, path: &str) {
        if let Err(err) = self.storage.remove(path) {
            warn!("event=attachment_cleanup module=service status=error error={err}");
        }
    }
}
