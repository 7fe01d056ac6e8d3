use offload_core::{AttachmentError, AttachmentStorage, AttachmentStore};
use std::fs;
use uuid::Uuid;

fn store_in(dir: &tempfile::TempDir) -> AttachmentStore {
    AttachmentStore::new(AttachmentStore::default_root(dir.path()))
}

#[test]
fn store_then_load_returns_same_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let owner = Uuid::new_v4();

    let path = store.store(b"voice memo bytes", owner).unwrap();

    assert!(path.contains(&owner.to_string()));
    assert!(path.ends_with(".attachment"));
    assert!(store.exists(&path));
    assert_eq!(store.load(&path).unwrap(), b"voice memo bytes");
}

#[test]
fn root_directory_is_created_lazily() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    assert!(!store.root().exists());

    store.store(b"", Uuid::new_v4()).unwrap();

    assert!(store.root().is_dir());
}

#[test]
fn store_leaves_no_pending_files_behind() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    store.store(b"one", Uuid::new_v4()).unwrap();
    store.store(b"two", Uuid::new_v4()).unwrap();

    let names: Vec<String> = fs::read_dir(store.root())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.iter().all(|name| name.ends_with(".attachment")));
}

#[test]
fn traversal_outside_root_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    store.store(b"seed", Uuid::new_v4()).unwrap();

    let escaping = format!("{}/../../etc/passwd", store.root().display());
    assert!(matches!(
        store.load(&escaping).unwrap_err(),
        AttachmentError::Validation(_)
    ));
    assert!(matches!(
        store.remove(&escaping).unwrap_err(),
        AttachmentError::Validation(_)
    ));
    assert!(!store.exists(&escaping));
}

#[test]
fn sibling_directory_sharing_a_prefix_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let sibling = dir.path().join("Offload").join("AttachmentsEvil");
    fs::create_dir_all(&sibling).unwrap();
    let secret = sibling.join("secret.attachment");
    fs::write(&secret, b"secret").unwrap();

    let err = store.load(secret.to_str().unwrap()).unwrap_err();
    assert!(matches!(err, AttachmentError::Validation(_)));
}

#[test]
fn root_itself_and_relative_paths_are_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    store.store(b"seed", Uuid::new_v4()).unwrap();

    let root = store.root().to_str().unwrap().to_string();
    assert!(matches!(
        store.load(&root).unwrap_err(),
        AttachmentError::Validation(_)
    ));
    assert!(matches!(
        store.remove(&root).unwrap_err(),
        AttachmentError::Validation(_)
    ));
    assert!(!store.exists(&root));

    for relative in ["", "   ", "file.attachment", "Offload/Attachments/file.attachment"] {
        assert!(matches!(
            store.load(relative).unwrap_err(),
            AttachmentError::Validation(_)
        ));
        assert!(!store.exists(relative));
    }
}

#[test]
fn remove_deletes_file_and_ignores_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let path = store.store(b"temporary", Uuid::new_v4()).unwrap();

    store.remove(&path).unwrap();
    assert!(!store.exists(&path));
    store.remove(&path).unwrap();

    let never_written = store.root().join("never-written.attachment");
    store.remove(never_written.to_str().unwrap()).unwrap();
}

#[test]
fn load_of_missing_managed_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let missing = store.root().join("missing.attachment");

    let err = store.load(missing.to_str().unwrap()).unwrap_err();
    assert!(matches!(err, AttachmentError::Io(_)));
    assert!(!store.exists(missing.to_str().unwrap()));
}

#[cfg(unix)]
#[test]
fn symlink_escaping_root_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    store.store(b"seed", Uuid::new_v4()).unwrap();

    let outside = tempfile::tempdir().unwrap();
    fs::write(outside.path().join("secret.attachment"), b"secret").unwrap();
    let link = store.root().join("escape");
    std::os::unix::fs::symlink(outside.path(), &link).unwrap();

    let through_link = link.join("secret.attachment");
    let err = store.load(through_link.to_str().unwrap()).unwrap_err();
    assert!(matches!(err, AttachmentError::Validation(_)));
    assert!(!store.exists(through_link.to_str().unwrap()));
}
