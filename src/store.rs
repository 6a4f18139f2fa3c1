//! Main Store struct tying all components together.

use crate::blobs::BlobStorage;
use crate::error::{Result, StoreError};
use crate::index::ForumIndex;
use crate::records::{Record, RecordLog};
use crate::replay::replay;
use crate::types::{
    ip_to_internal, strip_separator, Hash, MatchedPosts, Post, PostId, StoreStats, Timestamp,
    Topic, TopicId, TopicPage,
};
use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

/// Store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root data directory; holds `forum/` and `blobs/`.
    pub data_dir: PathBuf,

    /// Forum name; the log is `<data_dir>/forum/<forum_name>.txt`.
    pub forum_name: String,

    /// Message body cache size (number of bodies).
    pub blob_cache_size: usize,

    /// Whether to create the log if it doesn't exist.
    pub create_if_missing: bool,

    /// Sync the log every N appends (0 and 1 both mean every append).
    pub sync_interval: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            forum_name: "forum".to_string(),
            blob_cache_size: 1000,
            create_if_missing: true,
            sync_interval: RecordLog::DEFAULT_SYNC_INTERVAL,
        }
    }
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>, forum_name: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            forum_name: forum_name.into(),
            ..Default::default()
        }
    }

    pub fn forum_dir(&self) -> PathBuf {
        self.data_dir.join("forum")
    }

    pub fn log_path(&self) -> PathBuf {
        self.forum_dir().join(format!("{}.txt", self.forum_name))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.forum_dir().join(format!("{}.lock", self.forum_name))
    }

    pub fn blobs_path(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }
}

/// State guarded by the store lock.
struct Inner {
    log: RecordLog,
    index: ForumIndex,
    blobs: BlobStorage,
}

impl Inner {
    /// Append records, then apply them to the index. Nothing is applied
    /// unless the append succeeded.
    fn commit(&mut self, records: Vec<Record>) -> Result<()> {
        self.log.append(&records)?;
        for record in records {
            self.index.apply(record)?;
        }
        Ok(())
    }

    fn new_post_record(
        &self,
        topic_id: TopicId,
        post_id: PostId,
        message_hash: Hash,
        user_name_internal: &str,
        ip: &str,
    ) -> Record {
        Record::Post {
            topic_id,
            post_id,
            created_on: Timestamp::now(),
            message_hash,
            ip_internal: internal_ip(ip),
            user_name_internal: strip_separator(user_name_internal),
        }
    }
}

fn internal_ip(ip: &str) -> String {
    strip_separator(&ip_to_internal(ip))
}

/// The forum store.
///
/// Every operation, read or write, runs under one exclusive lock, so the
/// order operations complete in is the order of records in the log. A write
/// stores the body blob, appends its records, and only then updates the
/// index.
pub struct Store {
    /// Store configuration.
    config: StoreConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    inner: Mutex<Inner>,
}

impl Store {
    /// Open a forum: replay its log if present, otherwise create an empty
    /// one (unless `create_if_missing` is off).
    pub fn open(config: StoreConfig) -> Result<Self> {
        let log_path = config.log_path();
        if !log_path.exists() {
            if !config.create_if_missing {
                return Err(StoreError::NotInitialized(log_path.display().to_string()));
            }
            fs::create_dir_all(config.forum_dir())?;
        }

        let lock_file = Self::acquire_lock(&config.lock_path())?;

        let index = match RecordLog::read_contents(&log_path)? {
            Some(data) => replay(&data)?,
            None => ForumIndex::new(),
        };
        let log = RecordLog::open_with_sync_interval(&log_path, config.sync_interval)?;
        let blobs = BlobStorage::new(config.blobs_path(), config.blob_cache_size)?;

        info!(
            forum = %config.forum_name,
            topics = index.topics_count(),
            posts = index.posts_count(),
            blocked_ips = index.blocked_ip_count(),
            "forum store opened"
        );

        Ok(Self {
            config,
            _lock_file: lock_file,
            inner: Mutex::new(Inner { log, index, blobs }),
        })
    }

    // --- Writes ---

    /// Start a topic with its first post. Returns the new topic id.
    pub fn create_topic(
        &self,
        subject: &str,
        body: &str,
        user_name_internal: &str,
        ip: &str,
    ) -> Result<TopicId> {
        let mut inner = self.inner.lock();

        let topic_id = inner.index.next_topic_id()?;
        let message_hash = BlobStorage::hash_of(body.as_bytes());
        let records = vec![
            Record::Topic {
                id: topic_id,
                subject: strip_separator(subject),
            },
            inner.new_post_record(topic_id, PostId(1), message_hash, user_name_internal, ip),
        ];

        inner.blobs.store(body.as_bytes())?;
        inner.commit(records)?;
        Ok(topic_id)
    }

    /// Append a post to an existing topic. Returns the new post id.
    pub fn add_post(
        &self,
        topic_id: TopicId,
        body: &str,
        user_name_internal: &str,
        ip: &str,
    ) -> Result<PostId> {
        let mut inner = self.inner.lock();

        let post_id = inner
            .index
            .topic(topic_id)
            .ok_or(StoreError::TopicNotFound(topic_id))?
            .next_post_id();
        let message_hash = BlobStorage::hash_of(body.as_bytes());
        let record =
            inner.new_post_record(topic_id, post_id, message_hash, user_name_internal, ip);

        inner.blobs.store(body.as_bytes())?;
        inner.commit(vec![record])?;
        Ok(post_id)
    }

    /// Soft-delete a post.
    pub fn delete_post(&self, topic_id: TopicId, post_id: PostId) -> Result<()> {
        self.set_deleted(topic_id, post_id, true)
    }

    /// Reverse a soft delete.
    pub fn undelete_post(&self, topic_id: TopicId, post_id: PostId) -> Result<()> {
        self.set_deleted(topic_id, post_id, false)
    }

    fn set_deleted(&self, topic_id: TopicId, post_id: PostId, deleted: bool) -> Result<()> {
        let mut inner = self.inner.lock();

        if inner.index.post(topic_id, post_id)?.deleted == deleted {
            return Err(StoreError::AlreadyInState {
                topic: topic_id,
                post: post_id,
                deleted,
            });
        }

        let record = if deleted {
            Record::Delete { topic_id, post_id }
        } else {
            Record::Undelete { topic_id, post_id }
        };
        inner.commit(vec![record])
    }

    /// Block an IP (textual form).
    pub fn block_ip(&self, ip: &str) -> Result<()> {
        self.set_blocked(ip, true)
    }

    /// Unblock an IP (textual form).
    pub fn unblock_ip(&self, ip: &str) -> Result<()> {
        self.set_blocked(ip, false)
    }

    fn set_blocked(&self, ip: &str, blocked: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.commit(vec![Record::Block {
            ip_internal: internal_ip(ip),
            blocked,
        }])
    }

    // --- Reads ---

    pub fn is_ip_blocked(&self, ip: &str) -> bool {
        self.inner.lock().index.is_ip_blocked(&internal_ip(ip))
    }

    pub fn blocked_ip_count(&self) -> usize {
        self.inner.lock().index.blocked_ip_count()
    }

    pub fn posts_count(&self) -> usize {
        self.inner.lock().index.posts_count()
    }

    pub fn topics_count(&self) -> usize {
        self.inner.lock().index.topics_count()
    }

    /// Topics newest first, paged by `offset`. `include_deleted` does not
    /// filter anything.
    pub fn list_topics(&self, max_count: usize, offset: usize, include_deleted: bool) -> TopicPage {
        self.inner
            .lock()
            .index
            .list_topics(max_count, offset, include_deleted)
    }

    pub fn topic_by_id(&self, id: TopicId) -> Option<Topic> {
        self.inner.lock().index.topic(id).cloned()
    }

    pub fn post(&self, topic_id: TopicId, post_id: PostId) -> Result<Post> {
        self.inner.lock().index.post(topic_id, post_id).cloned()
    }

    /// Most recent posts across all topics, newest first.
    pub fn recent_posts(&self, max_count: usize) -> Vec<Post> {
        self.inner.lock().index.recent_posts(max_count)
    }

    pub fn posts_by_author(&self, user_name_internal: &str, max_count: usize) -> MatchedPosts {
        self.inner
            .lock()
            .index
            .posts_by_author(user_name_internal, max_count)
    }

    pub fn posts_by_ip(&self, ip_internal: &str, max_count: usize) -> MatchedPosts {
        self.inner.lock().index.posts_by_ip(ip_internal, max_count)
    }

    // --- Blob Operations ---

    /// Path of the file holding the body with this hash.
    pub fn message_file_path(&self, hash: &Hash) -> PathBuf {
        self.inner.lock().blobs.blob_path(hash)
    }

    /// Body of a message, `None` if no blob has that hash.
    pub fn message_body(&self, hash: &Hash) -> Result<Option<Vec<u8>>> {
        self.inner.lock().blobs.get(hash)
    }

    // --- Store Operations ---

    /// Get store statistics.
    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.lock();
        StoreStats {
            topic_count: inner.index.topics_count() as u64,
            post_count: inner.index.posts_count() as u64,
            blocked_ip_count: inner.index.blocked_ip_count() as u64,
            log_size_bytes: inner.log.size(),
        }
    }

    /// Sync the log to disk.
    pub fn sync(&self) -> Result<()> {
        self.inner.lock().log.sync()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Path of the forum log.
    pub fn log_path(&self) -> PathBuf {
        self.config.log_path()
    }

    // --- Private Helpers ---

    fn acquire_lock(lock_path: &Path) -> Result<File> {
        let lock_file = File::create(lock_path)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(lock_file)
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}
