//! Tag canonicalization and legacy tag backfill.
//!
//! # Responsibility
//! - Trim stored tag names and merge tags whose normalized names collide.
//! - Relink items and collections from merged duplicates to the survivor.
//! - Turn `items.legacy_tags` string arrays into relational tag links.
//!
//! # Invariants
//! - Oldest tag (by `created_at`, then insertion order) wins as canonical.
//! - Runs are idempotent: a second run plans nothing and does not write.
//! - All writes of one run commit in a single transaction or not at all.
//! - A tag whose name normalizes to empty is never canonical.
//!
//! # Shape
//! The run loads a snapshot, plans every mutation in memory against a
//! normalized-name index, then applies the plan. Planning has no I/O.

use crate::model::collection::CollectionId;
use crate::model::item::ItemId;
use crate::model::now_epoch_ms;
use crate::model::tag::{normalized_name, Tag, TagId};
use crate::repo::tag_repo::parse_tag_row;
use crate::repo::{parse_legacy_tags, parse_uuid, RepoError, RepoResult};
use log::{error, info};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

/// Aggregate counters of one migration run. Counts only, no names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagMigrationStats {
    pub tags_scanned: u32,
    pub tags_renamed: u32,
    pub duplicate_tags_merged: u32,
    pub duplicate_tags_deleted: u32,
    /// Links moved from a duplicate tag onto its canonical tag.
    pub item_links_relinked: u32,
    pub collection_links_relinked: u32,
    pub items_scanned: u32,
    pub items_with_legacy_tags: u32,
    pub tags_created_from_legacy: u32,
    /// Links created from legacy tag names.
    pub item_tag_links_added: u32,
    pub legacy_tag_arrays_cleared: u32,
    /// Whether the run committed any write.
    pub did_save: bool,
}

/// Migration failure. Nothing from the failed run is persisted.
#[derive(Debug)]
pub enum TagMigrationError {
    /// Reading the snapshot failed or persisted data is malformed.
    Load(RepoError),
    /// Writing or committing the planned changes failed.
    Persist(RepoError),
}

impl TagMigrationError {
    fn code(&self) -> &'static str {
        match self {
            Self::Load(_) => "tag_migration_load_failed",
            Self::Persist(_) => "tag_migration_persist_failed",
        }
    }
}

impl Display for TagMigrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Load(err) => write!(f, "tag migration could not load data: {err}"),
            Self::Persist(err) => write!(f, "tag migration could not persist changes: {err}"),
        }
    }
}

impl Error for TagMigrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Load(err) | Self::Persist(err) => Some(err),
        }
    }
}

/// Runs the tag migration against a migrated connection.
///
/// Safe to call on every launch; when nothing needs fixing it performs no
/// writes and returns `did_save = false`.
///
/// # Errors
/// - `Load` when reading fails or a legacy tag array is not valid JSON.
/// - `Persist` when any write or the final commit fails.
///
/// # Side effects
/// - Emits one `event=tag_migration` summary line.
pub fn run_tag_migration(conn: &mut Connection) -> Result<TagMigrationStats, TagMigrationError> {
    let started_at = Instant::now();
    info!("event=tag_migration module=migration status=start");

    match migrate(conn) {
        Ok(stats) => {
            info!(
                "event=tag_migration module=migration status=ok duration_ms={} tags_scanned={} tags_renamed={} duplicate_tags_merged={} duplicate_tags_deleted={} item_links_relinked={} collection_links_relinked={} items_scanned={} items_with_legacy_tags={} tags_created_from_legacy={} item_tag_links_added={} legacy_tag_arrays_cleared={} did_save={}",
                started_at.elapsed().as_millis(),
                stats.tags_scanned,
                stats.tags_renamed,
                stats.duplicate_tags_merged,
                stats.duplicate_tags_deleted,
                stats.item_links_relinked,
                stats.collection_links_relinked,
                stats.items_scanned,
                stats.items_with_legacy_tags,
                stats.tags_created_from_legacy,
                stats.item_tag_links_added,
                stats.legacy_tag_arrays_cleared,
                stats.did_save,
            );
            Ok(stats)
        }
        Err(err) => {
            error!(
                "event=tag_migration module=migration status=error duration_ms={} error_code={} error={}",
                started_at.elapsed().as_millis(),
                err.code(),
                err
            );
            Err(err)
        }
    }
}

fn migrate(conn: &mut Connection) -> Result<TagMigrationStats, TagMigrationError> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|err| TagMigrationError::Load(err.into()))?;

    let snapshot = load_snapshot(&tx).map_err(TagMigrationError::Load)?;
    let (plan, mut stats) = plan_migration(snapshot, now_epoch_ms());

    if plan.is_empty() {
        return Ok(stats);
    }

    apply_plan(&tx, &plan).map_err(TagMigrationError::Persist)?;
    tx.commit()
        .map_err(|err| TagMigrationError::Persist(err.into()))?;
    stats.did_save = true;
    Ok(stats)
}

#[derive(Debug, Default)]
struct MigrationSnapshot {
    /// Sorted oldest first.
    tags: Vec<Tag>,
    item_links: Vec<(ItemId, TagId)>,
    collection_links: Vec<(CollectionId, TagId)>,
    /// Every item with its legacy names, oldest first.
    items: Vec<(ItemId, Vec<String>)>,
}

#[derive(Debug, Default, PartialEq)]
struct MigrationPlan {
    renamed_tags: Vec<(TagId, String)>,
    created_tags: Vec<Tag>,
    item_links: Vec<(ItemId, TagId)>,
    collection_links: Vec<(CollectionId, TagId)>,
    deleted_tags: Vec<TagId>,
    cleared_items: Vec<ItemId>,
}

impl MigrationPlan {
    fn is_empty(&self) -> bool {
        self.renamed_tags.is_empty()
            && self.created_tags.is_empty()
            && self.item_links.is_empty()
            && self.collection_links.is_empty()
            && self.deleted_tags.is_empty()
            && self.cleared_items.is_empty()
    }
}

/// Link sets keyed both ways so merges can find referrers and skip
/// already-present links.
#[derive(Default)]
struct LinkIndex {
    tags_by_owner: HashMap<Uuid, HashSet<TagId>>,
    owners_by_tag: HashMap<TagId, Vec<Uuid>>,
}

impl LinkIndex {
    fn from_links(links: &[(Uuid, TagId)]) -> Self {
        let mut index = Self::default();
        for &(owner, tag) in links {
            if index.tags_by_owner.entry(owner).or_default().insert(tag) {
                index.owners_by_tag.entry(tag).or_default().push(owner);
            }
        }
        index
    }

    fn owners_of(&self, tag: TagId) -> Vec<Uuid> {
        self.owners_by_tag.get(&tag).cloned().unwrap_or_default()
    }

    /// Returns `true` when the link is new.
    fn link(&mut self, owner: Uuid, tag: TagId) -> bool {
        self.tags_by_owner.entry(owner).or_default().insert(tag)
    }
}

fn plan_migration(
    snapshot: MigrationSnapshot,
    now_ms: i64,
) -> (MigrationPlan, TagMigrationStats) {
    let mut plan = MigrationPlan::default();
    let mut stats = TagMigrationStats::default();
    let mut item_index = LinkIndex::from_links(&snapshot.item_links);
    let mut collection_index = LinkIndex::from_links(&snapshot.collection_links);
    let mut canonical_by_name: HashMap<String, TagId> = HashMap::new();

    for tag in &snapshot.tags {
        stats.tags_scanned += 1;
        let trimmed = tag.name.trim();
        let key = normalized_name(trimmed);

        if !key.is_empty() {
            if let Some(&canonical) = canonical_by_name.get(&key) {
                for item in item_index.owners_of(tag.id) {
                    if item_index.link(item, canonical) {
                        plan.item_links.push((item, canonical));
                        stats.item_links_relinked += 1;
                    }
                }
                for collection in collection_index.owners_of(tag.id) {
                    if collection_index.link(collection, canonical) {
                        plan.collection_links.push((collection, canonical));
                        stats.collection_links_relinked += 1;
                    }
                }
                plan.deleted_tags.push(tag.id);
                stats.duplicate_tags_merged += 1;
                continue;
            }
            canonical_by_name.insert(key, tag.id);
        }

        if trimmed != tag.name {
            plan.renamed_tags.push((tag.id, trimmed.to_string()));
            stats.tags_renamed += 1;
        }
    }
    stats.duplicate_tags_deleted = plan.deleted_tags.len() as u32;

    for (item, legacy_tags) in &snapshot.items {
        stats.items_scanned += 1;
        if legacy_tags.is_empty() {
            continue;
        }
        stats.items_with_legacy_tags += 1;

        for legacy_name in legacy_tags {
            let trimmed = legacy_name.trim();
            let key = normalized_name(trimmed);
            if key.is_empty() {
                continue;
            }

            let tag_id = match canonical_by_name.get(&key) {
                Some(&existing) => existing,
                None => {
                    let created = Tag::with_id(Uuid::new_v4(), trimmed, now_ms);
                    let created_id = created.id;
                    canonical_by_name.insert(key, created_id);
                    plan.created_tags.push(created);
                    stats.tags_created_from_legacy += 1;
                    created_id
                }
            };

            if item_index.link(*item, tag_id) {
                plan.item_links.push((*item, tag_id));
                stats.item_tag_links_added += 1;
            }
        }

        plan.cleared_items.push(*item);
        stats.legacy_tag_arrays_cleared += 1;
    }

    (plan, stats)
}

fn load_snapshot(tx: &Transaction<'_>) -> RepoResult<MigrationSnapshot> {
    let mut snapshot = MigrationSnapshot::default();

    let mut stmt = tx.prepare(
        "SELECT id, name, color, created_at FROM tags ORDER BY created_at ASC, rowid ASC;",
    )?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        snapshot.tags.push(parse_tag_row(row)?);
    }

    snapshot.item_links = load_links(
        tx,
        "SELECT item_uuid, tag_id FROM item_tags ORDER BY rowid ASC;",
        "item_tags",
    )?;
    snapshot.collection_links = load_links(
        tx,
        "SELECT collection_uuid, tag_id FROM collection_tags ORDER BY rowid ASC;",
        "collection_tags",
    )?;

    let mut stmt =
        tx.prepare("SELECT uuid, legacy_tags FROM items ORDER BY created_at ASC, rowid ASC;")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let uuid_text: String = row.get(0)?;
        let legacy_text: String = row.get(1)?;
        snapshot.items.push((
            parse_uuid(&uuid_text, "items.uuid")?,
            parse_legacy_tags(&legacy_text)?,
        ));
    }

    Ok(snapshot)
}

fn load_links(tx: &Transaction<'_>, sql: &str, table: &str) -> RepoResult<Vec<(Uuid, TagId)>> {
    let mut stmt = tx.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let mut links = Vec::new();
    while let Some(row) = rows.next()? {
        let owner_text: String = row.get(0)?;
        let tag_text: String = row.get(1)?;
        links.push((
            parse_uuid(&owner_text, table)?,
            parse_uuid(&tag_text, table)?,
        ));
    }
    Ok(links)
}

fn apply_plan(tx: &Transaction<'_>, plan: &MigrationPlan) -> RepoResult<()> {
    for (tag_id, name) in &plan.renamed_tags {
        tx.execute(
            "UPDATE tags SET name = ?2 WHERE id = ?1;",
            params![tag_id.to_string(), name.as_str()],
        )?;
    }

    for tag in &plan.created_tags {
        tx.execute(
            "INSERT INTO tags (id, name, color, created_at) VALUES (?1, ?2, ?3, ?4);",
            params![
                tag.id.to_string(),
                tag.name.as_str(),
                tag.color.as_deref(),
                tag.created_at,
            ],
        )?;
    }

    // Links go in before duplicates are deleted so no referrer is orphaned.
    for (item, tag) in &plan.item_links {
        tx.execute(
            "INSERT OR IGNORE INTO item_tags (item_uuid, tag_id) VALUES (?1, ?2);",
            params![item.to_string(), tag.to_string()],
        )?;
    }
    for (collection, tag) in &plan.collection_links {
        tx.execute(
            "INSERT OR IGNORE INTO collection_tags (collection_uuid, tag_id) VALUES (?1, ?2);",
            params![collection.to_string(), tag.to_string()],
        )?;
    }

    for tag_id in &plan.deleted_tags {
        let id_text = tag_id.to_string();
        tx.execute("DELETE FROM item_tags WHERE tag_id = ?1;", [id_text.as_str()])?;
        tx.execute(
            "DELETE FROM collection_tags WHERE tag_id = ?1;",
            [id_text.as_str()],
        )?;
        let changed = tx.execute("DELETE FROM tags WHERE id = ?1;", [id_text.as_str()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(*tag_id));
        }
    }

    for item in &plan.cleared_items {
        tx.execute(
            "UPDATE items SET legacy_tags = '[]' WHERE uuid = ?1;",
            [item.to_string()],
        )?;
    }

    Ok(())
}
