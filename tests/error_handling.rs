//! Error handling and edge case tests.

use forum_store::{PostId, RecordError, Store, StoreConfig, StoreError, TopicId};
use std::fs;
use tempfile::TempDir;

fn test_config(dir: &TempDir) -> StoreConfig {
    StoreConfig {
        data_dir: dir.path().join("data"),
        forum_name: "forum".into(),
        blob_cache_size: 100,
        create_if_missing: true,
        sync_interval: 1,
    }
}

fn test_store(dir: &TempDir) -> Store {
    Store::open(test_config(dir)).unwrap()
}

fn open_with_log(dir: &TempDir, log: &str) -> forum_store::Result<Store> {
    let config = test_config(dir);
    fs::create_dir_all(config.forum_dir()).unwrap();
    fs::write(config.log_path(), log).unwrap();
    Store::open(config)
}

// --- Not found / already in state ---

#[test]
fn test_delete_twice() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let topic = store.create_topic("s", "b", "alice", "1.2.3.4").unwrap();
    let log_len = fs::metadata(store.log_path()).unwrap().len();

    store.delete_post(topic, PostId(1)).unwrap();
    let after_first = fs::metadata(store.log_path()).unwrap().len();
    assert!(after_first > log_len);

    let result = store.delete_post(topic, PostId(1));
    assert!(matches!(
        result,
        Err(StoreError::AlreadyInState { deleted: true, .. })
    ));

    // the failed call wrote nothing and changed nothing
    assert_eq!(fs::metadata(store.log_path()).unwrap().len(), after_first);
    assert_eq!(store.posts_count(), 1);
    assert!(store.post(topic, PostId(1)).unwrap().deleted);
}

#[test]
fn test_undelete_live_post() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let topic = store.create_topic("s", "b", "alice", "1.2.3.4").unwrap();

    let err = store.undelete_post(topic, PostId(1)).unwrap_err();
    assert!(err.is_already_in_state());
    assert!(!err.is_not_found());
    assert!(!store.post(topic, PostId(1)).unwrap().deleted);
}

#[test]
fn test_not_found_errors() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let topic = store.create_topic("s", "b", "alice", "1.2.3.4").unwrap();

    assert!(matches!(
        store.add_post(TopicId(2), "b", "alice", "1.2.3.4"),
        Err(StoreError::TopicNotFound(TopicId(2)))
    ));
    assert!(matches!(
        store.delete_post(topic, PostId(2)),
        Err(StoreError::PostNotFound(_, PostId(2)))
    ));
    assert!(store.undelete_post(topic, PostId(0)).unwrap_err().is_not_found());
    assert!(store.topic_by_id(TopicId(2)).is_none());
    assert_eq!(store.topics_count(), 1);
}

#[test]
fn test_get_nonexistent_blob() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);

    let hash = forum_store::Hash::from_bytes(b"never stored");
    assert!(store.message_body(&hash).unwrap().is_none());
}

// --- I/O failures ---

#[test]
fn test_failed_blob_write_leaves_state_unchanged() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let store = Store::open(config.clone()).unwrap();

    // a plain file where the blob directory should be
    fs::remove_dir_all(config.blobs_path()).unwrap();
    fs::write(config.blobs_path(), b"not a directory").unwrap();

    let result = store.create_topic("s", "body", "alice", "1.2.3.4");
    assert!(matches!(result, Err(StoreError::Io(_))));

    assert_eq!(store.topics_count(), 0);
    assert_eq!(store.posts_count(), 0);
    assert_eq!(fs::metadata(config.log_path()).unwrap().len(), 0);
}

// --- Corrupt logs ---

#[test]
fn test_unknown_record_kind_fails_open() {
    let dir = TempDir::new().unwrap();
    let result = open_with_log(&dir, "T1|Hello\nZ1|2\n");
    assert!(matches!(
        result,
        Err(StoreError::MalformedRecord {
            line: 2,
            source: RecordError::UnknownKind('Z')
        })
    ));
}

#[test]
fn test_bad_hash_fails_open() {
    let dir = TempDir::new().unwrap();
    let result = open_with_log(&dir, "T1|Hello\nP1|1|1148874103|AAAA|1020304|alice\n");
    assert!(matches!(
        result,
        Err(StoreError::MalformedRecord {
            line: 2,
            source: RecordError::InvalidHash(_)
        })
    ));
}

#[test]
fn test_wrong_field_count_fails_open() {
    let dir = TempDir::new().unwrap();
    let result = open_with_log(&dir, "T1|Hello|extra\n");
    match result {
        Err(err) => assert!(err.is_corruption(), "unexpected error {err:?}"),
        Ok(_) => panic!("corrupt log opened"),
    }
}

#[test]
fn test_delete_of_missing_post_fails_open() {
    let dir = TempDir::new().unwrap();
    let result = open_with_log(&dir, "T1|Hello\nD1|1\n");
    assert!(matches!(result, Err(StoreError::Corruption { line: 2, .. })));
}

#[test]
fn test_corrupt_log_is_left_untouched() {
    let dir = TempDir::new().unwrap();
    let log = "T1|Hello\nnot a record\n";
    assert!(open_with_log(&dir, log).is_err());

    let config = test_config(&dir);
    assert_eq!(fs::read_to_string(config.log_path()).unwrap(), log);
}

// --- Initialization ---

#[test]
fn test_open_without_create() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig {
        create_if_missing: false,
        ..test_config(&dir)
    };

    assert!(matches!(
        Store::open(config.clone()),
        Err(StoreError::NotInitialized(_))
    ));
    assert!(!config.forum_dir().exists());

    fs::create_dir_all(config.forum_dir()).unwrap();
    fs::write(config.log_path(), "").unwrap();
    let store = Store::open(config).unwrap();
    assert_eq!(store.topics_count(), 0);
}

#[test]
fn test_second_open_is_locked() {
    let dir = TempDir::new().unwrap();
    let _store = test_store(&dir);

    assert!(matches!(
        Store::open(test_config(&dir)),
        Err(StoreError::Locked)
    ));
}

#[test]
fn test_error_messages() {
    let err = StoreError::AlreadyInState {
        topic: TopicId(1),
        post: PostId(1),
        deleted: true,
    };
    assert_eq!(err.to_string(), "Post 1 in topic 1 is already deleted");

    let err = StoreError::MalformedRecord {
        line: 4,
        source: RecordError::UnknownKind('Q'),
    };
    assert_eq!(
        err.to_string(),
        "Malformed record at line 4: unknown record kind 'Q'"
    );
}
