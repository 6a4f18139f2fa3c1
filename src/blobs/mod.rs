//! Content-addressed blob storage.
//!
//! Message bodies are stored by their SHA-1 hash, sharded into two levels of
//! directories by the first two bytes of the hash.

mod storage;

pub use storage::BlobStorage;
