//! Collection repository: just enough to own collection-tag links.

use super::tag_repo::parse_tag_row;
use super::{parse_uuid, row_exists, RepoError, RepoResult};
use crate::model::collection::{Collection, CollectionId};
use crate::model::tag::{Tag, TagId};
use rusqlite::{params, Connection, OptionalExtension};

pub trait CollectionRepository {
    fn create_collection(&self, collection: &Collection) -> RepoResult<CollectionId>;
    fn get_collection(&self, id: CollectionId) -> RepoResult<Option<Collection>>;
    /// Links a tag; returns `false` when the link already existed.
    fn link_tag(&self, collection_id: CollectionId, tag_id: TagId) -> RepoResult<bool>;
    fn tags_for_collection(&self, collection_id: CollectionId) -> RepoResult<Vec<Tag>>;
}

pub struct SqliteCollectionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCollectionRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl CollectionRepository for SqliteCollectionRepository<'_> {
    fn create_collection(&self, collection: &Collection) -> RepoResult<CollectionId> {
        collection.validate()?;
        self.conn.execute(
            "INSERT INTO collections (uuid, name, created_at) VALUES (?1, ?2, ?3);",
            params![
                collection.uuid.to_string(),
                collection.name.as_str(),
                collection.created_at,
            ],
        )?;
        Ok(collection.uuid)
    }

    fn get_collection(&self, id: CollectionId) -> RepoResult<Option<Collection>> {
        let row = self
            .conn
            .query_row(
                "SELECT uuid, name, created_at FROM collections WHERE uuid = ?1;",
                [id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(uuid_text, name, created_at)| -> RepoResult<Collection> {
            Ok(Collection {
                uuid: parse_uuid(&uuid_text, "collections.uuid")?,
                name,
                created_at,
            })
        })
        .transpose()
    }

    fn link_tag(&self, collection_id: CollectionId, tag_id: TagId) -> RepoResult<bool> {
        let collection_text = collection_id.to_string();
        if !row_exists(
            self.conn,
            "SELECT 1 FROM collections WHERE uuid = ?1",
            &collection_text,
        )? {
            return Err(RepoError::NotFound(collection_id));
        }
        if !row_exists(self.conn, "SELECT 1 FROM tags WHERE id = ?1", &tag_id.to_string())? {
            return Err(RepoError::NotFound(tag_id));
        }

        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO collection_tags (collection_uuid, tag_id) VALUES (?1, ?2);",
            params![collection_text, tag_id.to_string()],
        )?;
        Ok(changed == 1)
    }

    fn tags_for_collection(&self, collection_id: CollectionId) -> RepoResult<Vec<Tag>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.name, t.color, t.created_at
             FROM collection_tags ct
             INNER JOIN tags t ON t.id = ct.tag_id
             WHERE ct.collection_uuid = ?1
             ORDER BY t.name ASC, t.rowid ASC;",
        )?;
        let mut rows = stmt.query([collection_id.to_string()])?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            tags.push(parse_tag_row(row)?);
        }
        Ok(tags)
    }
}
