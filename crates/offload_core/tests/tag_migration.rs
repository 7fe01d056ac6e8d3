use offload_core::db::open_db_in_memory;
use offload_core::{
    run_tag_migration, Collection, CollectionRepository, Item, ItemRepository, Tag,
    TagMigrationError, TagRepository, SqliteCollectionRepository, SqliteItemRepository,
    SqliteTagRepository,
};
use rusqlite::{params, Connection};
use uuid::Uuid;

/// Writes a tag row directly, the way pre-migration data may hold it.
fn insert_tag(conn: &Connection, name: &str, created_at: i64) -> Tag {
    let tag = Tag::with_id(Uuid::new_v4(), name, created_at);
    conn.execute(
        "INSERT INTO tags (id, name, color, created_at) VALUES (?1, ?2, NULL, ?3);",
        params![tag.id.to_string(), tag.name.as_str(), tag.created_at],
    )
    .unwrap();
    tag
}

fn insert_item(conn: &Connection, content: &str, legacy_tags: &[&str]) -> Item {
    let mut item = Item::new(content);
    item.legacy_tags = legacy_tags.iter().map(|name| name.to_string()).collect();
    SqliteItemRepository::new(conn).create_item(&item).unwrap();
    item
}

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

#[test]
fn case_and_whitespace_duplicates_collapse_into_oldest_tag() {
    let mut conn = open_db_in_memory().unwrap();
    let work = insert_tag(&conn, "Work", 1_000);
    let work_space = insert_tag(&conn, "work ", 2_000);
    let work_caps = insert_tag(&conn, "WORK", 3_000);

    let (all, spaced, caps, collection) = {
        let items = SqliteItemRepository::new(&conn);
        let all = insert_item(&conn, "linked to every variant", &[]);
        let spaced = insert_item(&conn, "linked to padded variant", &[]);
        let caps = insert_item(&conn, "linked to caps variant", &[]);
        for tag in [&work, &work_space, &work_caps] {
            items.link_tag(all.uuid, tag.id).unwrap();
        }
        items.link_tag(spaced.uuid, work_space.id).unwrap();
        items.link_tag(caps.uuid, work_caps.id).unwrap();

        let collections = SqliteCollectionRepository::new(&conn);
        let collection = Collection::new("Projects");
        collections.create_collection(&collection).unwrap();
        collections.link_tag(collection.uuid, work_caps.id).unwrap();
        (all, spaced, caps, collection)
    };

    let stats = run_tag_migration(&mut conn).unwrap();

    assert!(stats.did_save);
    assert_eq!(stats.tags_scanned, 3);
    assert_eq!(stats.duplicate_tags_merged, 2);
    assert_eq!(stats.duplicate_tags_deleted, 2);
    assert_eq!(stats.item_links_relinked, 2);
    assert_eq!(stats.collection_links_relinked, 1);

    let tags = SqliteTagRepository::new(&conn).list_tags().unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].id, work.id);
    assert_eq!(tags[0].name, "Work");

    let items = SqliteItemRepository::new(&conn);
    for item in [&all, &spaced, &caps] {
        let linked = items.tags_for_item(item.uuid).unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].id, work.id);
    }
    let collection_tags = SqliteCollectionRepository::new(&conn)
        .tags_for_collection(collection.uuid)
        .unwrap();
    assert_eq!(collection_tags.len(), 1);
    assert_eq!(collection_tags[0].id, work.id);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM item_tags;"), 3);
}

#[test]
fn second_run_changes_nothing() {
    let mut conn = open_db_in_memory().unwrap();
    let errands = insert_tag(&conn, " Errands", 1);
    insert_tag(&conn, "errands", 2);
    let item = insert_item(&conn, "pick up parcel", &["Errands", "Post"]);
    SqliteItemRepository::new(&conn)
        .link_tag(item.uuid, errands.id)
        .unwrap();

    let first = run_tag_migration(&mut conn).unwrap();
    assert!(first.did_save);
    let tags_after_first = count(&conn, "SELECT COUNT(*) FROM tags;");
    let links_after_first = count(&conn, "SELECT COUNT(*) FROM item_tags;");

    let second = run_tag_migration(&mut conn).unwrap();
    assert!(!second.did_save);
    assert_eq!(second.tags_scanned, 2);
    assert_eq!(second.items_scanned, 1);
    assert_eq!(second.tags_renamed, 0);
    assert_eq!(second.duplicate_tags_merged, 0);
    assert_eq!(second.items_with_legacy_tags, 0);
    assert_eq!(second.tags_created_from_legacy, 0);
    assert_eq!(second.item_tag_links_added, 0);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM tags;"), tags_after_first);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM item_tags;"), links_after_first);
}

#[test]
fn legacy_names_backfill_links_and_clear_arrays() {
    let mut conn = open_db_in_memory().unwrap();
    let existing = insert_tag(&conn, "work", 1);
    let first = insert_item(&conn, "first", &["Home", " home ", "", "   "]);
    let second = insert_item(&conn, "second", &["HOME", "Work"]);
    let untouched = insert_item(&conn, "no legacy tags", &[]);

    let stats = run_tag_migration(&mut conn).unwrap();

    assert_eq!(stats.items_scanned, 3);
    assert_eq!(stats.items_with_legacy_tags, 2);
    assert_eq!(stats.tags_created_from_legacy, 1);
    assert_eq!(stats.item_tag_links_added, 3);
    assert_eq!(stats.legacy_tag_arrays_cleared, 2);

    let tags = SqliteTagRepository::new(&conn);
    let home = tags.find_by_name("home").unwrap().unwrap();
    assert_eq!(home.name, "Home");
    assert_eq!(tags.list_tags().unwrap().len(), 2);

    let items = SqliteItemRepository::new(&conn);
    let first_tags: Vec<_> = items
        .tags_for_item(first.uuid)
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(first_tags, vec![home.id]);
    let second_tags: Vec<_> = items
        .tags_for_item(second.uuid)
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(second_tags, vec![home.id, existing.id]);
    assert!(items.tags_for_item(untouched.uuid).unwrap().is_empty());

    for item in items.list_items().unwrap() {
        assert!(item.legacy_tags.is_empty());
    }
}

#[test]
fn blank_tags_are_trimmed_but_never_canonical() {
    let mut conn = open_db_in_memory().unwrap();
    let padded = insert_tag(&conn, "  Reading  ", 1);
    for (id, created_at) in [(Uuid::new_v4(), 2_i64), (Uuid::new_v4(), 3_i64)] {
        conn.execute(
            "INSERT INTO tags (id, name, color, created_at) VALUES (?1, '   ', NULL, ?2);",
            params![id.to_string(), created_at],
        )
        .unwrap();
    }
    let item = insert_item(&conn, "only blank legacy names", &["", " \n "]);

    let stats = run_tag_migration(&mut conn).unwrap();

    assert_eq!(stats.tags_renamed, 3);
    assert_eq!(stats.duplicate_tags_merged, 0);
    assert_eq!(stats.item_tag_links_added, 0);
    assert_eq!(stats.legacy_tag_arrays_cleared, 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM tags;"), 3);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM tags WHERE name = '';"), 2);

    let tags = SqliteTagRepository::new(&conn);
    assert_eq!(tags.get_tag(padded.id).unwrap().unwrap().name, "Reading");
    let items = SqliteItemRepository::new(&conn);
    assert!(items.tags_for_item(item.uuid).unwrap().is_empty());
    assert!(items.get_item(item.uuid).unwrap().unwrap().legacy_tags.is_empty());
}

#[test]
fn malformed_legacy_array_fails_without_partial_writes() {
    let mut conn = open_db_in_memory().unwrap();
    insert_tag(&conn, "Work", 1);
    insert_tag(&conn, "work", 2);
    let item = insert_item(&conn, "corrupted", &[]);
    conn.execute(
        "UPDATE items SET legacy_tags = 'not-json' WHERE uuid = ?1;",
        [item.uuid.to_string()],
    )
    .unwrap();

    let err = run_tag_migration(&mut conn).unwrap_err();

    assert!(matches!(err, TagMigrationError::Load(_)));
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM tags;"), 2);
}

#[test]
fn clean_store_is_left_untouched() {
    let mut conn = open_db_in_memory().unwrap();

    let stats = run_tag_migration(&mut conn).unwrap();

    assert!(!stats.did_save);
    assert_eq!(stats.tags_scanned, 0);
    assert_eq!(stats.items_scanned, 0);
}
