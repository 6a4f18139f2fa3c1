//! # Forum Store
//!
//! A file-backed storage engine for a discussion forum: topics, their posts,
//! soft delete, and an IP blocklist.
//!
//! ## Core Concepts
//!
//! - **Log**: one append-only text file per forum; every change is a line
//! - **Replay**: on open the whole log is read back to rebuild the index
//! - **Index**: topics, a chronological post list, and blocked IPs, in memory
//! - **Blobs**: message bodies stored once, under a path derived from their hash
//!
//! ## Example
//!
//! ```no_run
//! use forum_store::{Store, StoreConfig, PostId};
//!
//! # fn main() -> forum_store::Result<()> {
//! let store = Store::open(StoreConfig::new("./data", "sumatrapdf"))?;
//!
//! let topic = store.create_topic("Hello", "World", "alice", "1.2.3.4")?;
//! store.add_post(topic, "Hi alice", "bob", "5.6.7.8")?;
//! store.delete_post(topic, PostId(2))?;
//!
//! let page = store.list_topics(20, 0, false);
//! # Ok(())
//! # }
//! ```

pub mod blobs;
pub mod error;
pub mod index;
pub mod records;
pub mod replay;
pub mod store;
pub mod types;

// Re-exports
pub use blobs::BlobStorage;
pub use error::{RecordError, Result, StoreError};
pub use index::ForumIndex;
pub use records::{Record, RecordLog};
pub use replay::replay;
pub use store::{Store, StoreConfig};
pub use types::*;
