//! Error types for the forum store.

use crate::types::{PostId, TopicId};
use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Topic not found: {0}")]
    TopicNotFound(TopicId),

    #[error("Post not found: topic {0}, post {1}")]
    PostNotFound(TopicId, PostId),

    #[error("Post {post} in topic {topic} is already {}", state_label(.deleted))]
    AlreadyInState {
        topic: TopicId,
        post: PostId,
        deleted: bool,
    },

    #[error("Malformed record at line {line}: {source}")]
    MalformedRecord {
        line: usize,
        #[source]
        source: RecordError,
    },

    #[error("Corruption detected at line {line}: {reason}")]
    Corruption { line: usize, reason: String },

    #[error("Forum is locked by another process")]
    Locked,

    #[error("Forum log not found: {0}")]
    NotInitialized(String),

    #[error("No topic id left after {0}")]
    TopicIdsExhausted(TopicId),
}

impl StoreError {
    /// Unknown topic or post.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::TopicNotFound(_) | StoreError::PostNotFound(..)
        )
    }

    /// Delete of a deleted post, or undelete of a live one.
    pub fn is_already_in_state(&self) -> bool {
        matches!(self, StoreError::AlreadyInState { .. })
    }

    /// Structural damage found while replaying the log.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StoreError::MalformedRecord { .. } | StoreError::Corruption { .. }
        )
    }
}

fn state_label(deleted: &bool) -> &'static str {
    if *deleted {
        "deleted"
    } else {
        "not deleted"
    }
}

/// A single log line that cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("empty record")]
    Empty,

    #[error("unknown record kind {0:?}")]
    UnknownKind(char),

    #[error("record {kind} expects {expected} fields, got {got}")]
    FieldCount {
        kind: char,
        expected: usize,
        got: usize,
    },

    #[error("field {field} is not a number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("invalid content hash: {0}")]
    InvalidHash(String),

    #[error("block flag must be 0 or 1, got {0:?}")]
    InvalidBlockFlag(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
