//! Tag repository contract and SQLite implementation.
//!
//! # Responsibility
//! - CRUD over tag records.
//! - Find-or-create by normalized name, the only runtime tag creation path.
//!
//! # Invariants
//! - Lookups by name compare `normalized_name` (trim + lowercase).
//! - When duplicates exist (pre-migration data), the oldest tag wins.
//! - `create_tag` and `update_tag` refuse a name whose normalized form is
//!   held by a different tag; only the tag migration writes names directly.
//! - Deleting a tag removes every item and collection link to it.

use super::{parse_uuid, row_exists, RepoError, RepoResult};
use crate::model::tag::{normalized_name, Tag, TagId};
use crate::model::validation::ValidationError;
use rusqlite::{params, Connection, Row};

const TAG_SELECT_SQL: &str = "SELECT id, name, color, created_at FROM tags";

/// Repository interface for tag operations.
pub trait TagRepository {
    /// Inserts a tag as-is after validation and the uniqueness check.
    fn create_tag(&self, tag: &Tag) -> RepoResult<TagId>;
    /// Lists all tags sorted by name.
    fn list_tags(&self) -> RepoResult<Vec<Tag>>;
    fn get_tag(&self, id: TagId) -> RepoResult<Option<Tag>>;
    /// Finds the oldest tag whose normalized name matches. Blank input
    /// matches nothing.
    fn find_by_name(&self, name: &str) -> RepoResult<Option<Tag>>;
    /// Lists tags whose stored name contains `query`, sorted by name.
    fn search_tags(&self, query: &str) -> RepoResult<Vec<Tag>>;
    /// Returns the tag for `name`, creating it with the trimmed name if absent.
    fn find_or_create(&self, name: &str, color: Option<&str>) -> RepoResult<Tag>;
    /// Persists name and color changes; a rename must stay unique.
    fn update_tag(&self, tag: &Tag) -> RepoResult<()>;
    /// Deletes a tag and all links to it.
    fn delete_tag(&self, id: TagId) -> RepoResult<()>;
    /// Lists tags not linked to any item.
    fn list_unused(&self) -> RepoResult<Vec<Tag>>;
    /// Counts items linked to the tag.
    fn usage_count(&self, id: TagId) -> RepoResult<u32>;
}

/// SQLite-backed tag repository.
pub struct SqliteTagRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTagRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn query_tags(&self, sql: &str, params: impl rusqlite::Params) -> RepoResult<Vec<Tag>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            tags.push(parse_tag_row(row)?);
        }
        Ok(tags)
    }

    fn ensure_unique_name(&self, tag: &Tag) -> RepoResult<()> {
        let wanted = tag.normalized_name();
        let tags = self.query_tags(&format!("{TAG_SELECT_SQL};"), [])?;
        if tags
            .iter()
            .any(|other| other.id != tag.id && other.normalized_name() == wanted)
        {
            return Err(ValidationError::DuplicateTagName.into());
        }
        Ok(())
    }
}

impl TagRepository for SqliteTagRepository<'_> {
    fn create_tag(&self, tag: &Tag) -> RepoResult<TagId> {
        tag.validate()?;
        self.ensure_unique_name(tag)?;

        self.conn.execute(
            "INSERT INTO tags (id, name, color, created_at) VALUES (?1, ?2, ?3, ?4);",
            params![
                tag.id.to_string(),
                tag.name.as_str(),
                tag.color.as_deref(),
                tag.created_at,
            ],
        )?;

        Ok(tag.id)
    }

    fn list_tags(&self) -> RepoResult<Vec<Tag>> {
        self.query_tags(
            &format!("{TAG_SELECT_SQL} ORDER BY name ASC, created_at ASC, rowid ASC;"),
            [],
        )
    }

    fn get_tag(&self, id: TagId) -> RepoResult<Option<Tag>> {
        let mut tags = self.query_tags(
            &format!("{TAG_SELECT_SQL} WHERE id = ?1;"),
            [id.to_string()],
        )?;
        Ok(tags.pop())
    }

    fn find_by_name(&self, name: &str) -> RepoResult<Option<Tag>> {
        let wanted = normalized_name(name);
        if wanted.is_empty() {
            return Ok(None);
        }

        // SQLite `lower()`/`trim()` are ASCII-only, so normalize in Rust.
        let tags = self.query_tags(
            &format!("{TAG_SELECT_SQL} ORDER BY created_at ASC, rowid ASC;"),
            [],
        )?;
        Ok(tags.into_iter().find(|tag| tag.normalized_name() == wanted))
    }

    fn search_tags(&self, query: &str) -> RepoResult<Vec<Tag>> {
        self.query_tags(
            &format!("{TAG_SELECT_SQL} WHERE instr(name, ?1) > 0 ORDER BY name ASC, rowid ASC;"),
            [query],
        )
    }

    fn find_or_create(&self, name: &str, color: Option<&str>) -> RepoResult<Tag> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyTagName.into());
        }
        if let Some(existing) = self.find_by_name(trimmed)? {
            return Ok(existing);
        }

        let tag = Tag::new(trimmed).with_color(color.map(str::to_string));
        self.create_tag(&tag)?;
        Ok(tag)
    }

    fn update_tag(&self, tag: &Tag) -> RepoResult<()> {
        tag.validate()?;
        self.ensure_unique_name(tag)?;

        let changed = self.conn.execute(
            "UPDATE tags SET name = ?2, color = ?3 WHERE id = ?1;",
            params![tag.id.to_string(), tag.name.as_str(), tag.color.as_deref()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(tag.id));
        }

        Ok(())
    }

    fn delete_tag(&self, id: TagId) -> RepoResult<()> {
        let id_text = id.to_string();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM item_tags WHERE tag_id = ?1;", [id_text.as_str()])?;
        tx.execute(
            "DELETE FROM collection_tags WHERE tag_id = ?1;",
            [id_text.as_str()],
        )?;
        let changed = tx.execute("DELETE FROM tags WHERE id = ?1;", [id_text.as_str()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        tx.commit()?;

        Ok(())
    }

    fn list_unused(&self) -> RepoResult<Vec<Tag>> {
        self.query_tags(
            &format!(
                "{TAG_SELECT_SQL}
                 WHERE NOT EXISTS (SELECT 1 FROM item_tags WHERE item_tags.tag_id = tags.id)
                 ORDER BY name ASC, rowid ASC;"
            ),
            [],
        )
    }

    fn usage_count(&self, id: TagId) -> RepoResult<u32> {
        let id_text = id.to_string();
        if !row_exists(self.conn, "SELECT 1 FROM tags WHERE id = ?1", &id_text)? {
            return Err(RepoError::NotFound(id));
        }
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM item_tags WHERE tag_id = ?1;",
            [id_text.as_str()],
            |row| row.get::<_, u32>(0),
        )?;
        Ok(count)
    }
}

pub(crate) fn parse_tag_row(row: &Row<'_>) -> RepoResult<Tag> {
    let id_text: String = row.get("id")?;
    Ok(Tag {
        id: parse_uuid(&id_text, "tags.id")?,
        name: row.get("name")?,
        color: row.get("color")?,
        created_at: row.get("created_at")?,
    })
}
