//! Item repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist captured items with encoded metadata and legacy tag arrays.
//! - Own item-tag link maintenance.
//!
//! # Invariants
//! - Metadata is stored as `ItemMetadata::encode()` output and decoded
//!   best-effort on read.
//! - `legacy_tags` is stored as a JSON string array; a malformed array is
//!   reported as `InvalidData`, never silently dropped.
//! - An item links to a given tag at most once.

use super::tag_repo::parse_tag_row;
use super::{
    encode_legacy_tags, parse_legacy_tags, parse_uuid, row_exists, RepoError, RepoResult,
};
use crate::model::item::{Item, ItemId};
use crate::model::metadata::ItemMetadata;
use crate::model::tag::{Tag, TagId};
use rusqlite::{params, Connection, Row};

const ITEM_SELECT_SQL: &str =
    "SELECT uuid, content, metadata, legacy_tags, created_at, updated_at FROM items";

/// Repository interface for captured items.
pub trait ItemRepository {
    fn create_item(&self, item: &Item) -> RepoResult<ItemId>;
    fn get_item(&self, id: ItemId) -> RepoResult<Option<Item>>;
    /// Lists items oldest first.
    fn list_items(&self) -> RepoResult<Vec<Item>>;
    /// Replaces content, metadata and legacy tags, bumping `updated_at`.
    fn update_item(&self, item: &Item) -> RepoResult<()>;
    /// Deletes the item row and its tag links.
    fn delete_item(&self, id: ItemId) -> RepoResult<()>;
    /// Links a tag; returns `false` when the link already existed.
    fn link_tag(&self, item_id: ItemId, tag_id: TagId) -> RepoResult<bool>;
    /// Removes a link; returns `false` when there was none.
    fn unlink_tag(&self, item_id: ItemId, tag_id: TagId) -> RepoResult<bool>;
    /// Lists linked tags sorted by name.
    fn tags_for_item(&self, item_id: ItemId) -> RepoResult<Vec<Tag>>;
}

/// SQLite-backed item repository.
pub struct SqliteItemRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteItemRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn ensure_item(&self, id: ItemId) -> RepoResult<()> {
        if !row_exists(self.conn, "SELECT 1 FROM items WHERE uuid = ?1", &id.to_string())? {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }
}

impl ItemRepository for SqliteItemRepository<'_> {
    fn create_item(&self, item: &Item) -> RepoResult<ItemId> {
        item.validate()?;

        self.conn.execute(
            "INSERT INTO items (uuid, content, metadata, legacy_tags, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                item.uuid.to_string(),
                item.content.as_str(),
                item.metadata.encode(),
                encode_legacy_tags(&item.legacy_tags)?,
                item.created_at,
                item.updated_at,
            ],
        )?;

        Ok(item.uuid)
    }

    fn get_item(&self, id: ItemId) -> RepoResult<Option<Item>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ITEM_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_item_row(row)?));
        }
        Ok(None)
    }

    fn list_items(&self) -> RepoResult<Vec<Item>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ITEM_SELECT_SQL} ORDER BY created_at ASC, rowid ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_item_row(row)?);
        }
        Ok(items)
    }

    fn update_item(&self, item: &Item) -> RepoResult<()> {
        item.validate()?;

        let changed = self.conn.execute(
            "UPDATE items
             SET
                content = ?2,
                metadata = ?3,
                legacy_tags = ?4,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            params![
                item.uuid.to_string(),
                item.content.as_str(),
                item.metadata.encode(),
                encode_legacy_tags(&item.legacy_tags)?,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(item.uuid));
        }

        Ok(())
    }

    fn delete_item(&self, id: ItemId) -> RepoResult<()> {
        let id_text = id.to_string();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM item_tags WHERE item_uuid = ?1;", [id_text.as_str()])?;
        let changed = tx.execute("DELETE FROM items WHERE uuid = ?1;", [id_text.as_str()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        tx.commit()?;
        Ok(())
    }

    fn link_tag(&self, item_id: ItemId, tag_id: TagId) -> RepoResult<bool> {
        self.ensure_item(item_id)?;
        if !row_exists(self.conn, "SELECT 1 FROM tags WHERE id = ?1", &tag_id.to_string())? {
            return Err(RepoError::NotFound(tag_id));
        }

        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO item_tags (item_uuid, tag_id) VALUES (?1, ?2);",
            params![item_id.to_string(), tag_id.to_string()],
        )?;
        Ok(changed == 1)
    }

    fn unlink_tag(&self, item_id: ItemId, tag_id: TagId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM item_tags WHERE item_uuid = ?1 AND tag_id = ?2;",
            params![item_id.to_string(), tag_id.to_string()],
        )?;
        Ok(changed == 1)
    }

    fn tags_for_item(&self, item_id: ItemId) -> RepoResult<Vec<Tag>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.name, t.color, t.created_at
             FROM item_tags it
             INNER JOIN tags t ON t.id = it.tag_id
             WHERE it.item_uuid = ?1
             ORDER BY t.name ASC, t.rowid ASC;",
        )?;
        let mut rows = stmt.query([item_id.to_string()])?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            tags.push(parse_tag_row(row)?);
        }
        Ok(tags)
    }
}

fn parse_item_row(row: &Row<'_>) -> RepoResult<Item> {
    let uuid_text: String = row.get("uuid")?;
    let metadata_text: String = row.get("metadata")?;
    let legacy_text: String = row.get("legacy_tags")?;

    let item = Item {
        uuid: parse_uuid(&uuid_text, "items.uuid")?,
        content: row.get("content")?,
        metadata: ItemMetadata::decode(&metadata_text),
        legacy_tags: parse_legacy_tags(&legacy_text)?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    Ok(item)
}
