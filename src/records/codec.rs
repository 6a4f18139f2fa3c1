//! Text encoding of log records.
//!
//! One record per line, fields separated by `|`, kind given by the first
//! character:
//!
//! ```text
//! T<topicId>|<subject>
//! P<topicId>|<postId>|<unixSeconds>|<hashB64NoPad>|<ipInternal>|<author>
//! D<topicId>|<postId>
//! U<topicId>|<postId>
//! B<ipInternal>|<0|1>
//! ```

use crate::error::RecordError;
use crate::types::{strip_separator, Hash, PostId, Timestamp, TopicId, FIELD_SEPARATOR};
use std::fmt;
use std::str::FromStr;

/// One state transition in the log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Record {
    Topic {
        id: TopicId,
        subject: String,
    },
    Post {
        topic_id: TopicId,
        post_id: PostId,
        created_on: Timestamp,
        message_hash: Hash,
        ip_internal: String,
        user_name_internal: String,
    },
    Delete {
        topic_id: TopicId,
        post_id: PostId,
    },
    Undelete {
        topic_id: TopicId,
        post_id: PostId,
    },
    Block {
        ip_internal: String,
        blocked: bool,
    },
}

impl Record {
    /// Leading character identifying the record kind.
    pub fn kind(&self) -> char {
        match self {
            Record::Topic { .. } => 'T',
            Record::Post { .. } => 'P',
            Record::Delete { .. } => 'D',
            Record::Undelete { .. } => 'U',
            Record::Block { .. } => 'B',
        }
    }

    /// Encode as a newline-terminated log line. Free-text fields lose any
    /// separator characters.
    pub fn encode(&self) -> String {
        format!("{self}\n")
    }

    /// Decode one log line (without its trailing newline).
    pub fn decode(line: &str) -> Result<Self, RecordError> {
        let mut chars = line.chars();
        let kind = chars.next().ok_or(RecordError::Empty)?;
        let body = chars.as_str();

        match kind {
            'T' => {
                let [id, subject] = split_fields::<2>(kind, body)?;
                Ok(Record::Topic {
                    id: TopicId(parse_number("topic id", id)?),
                    subject: subject.to_string(),
                })
            }
            'P' => {
                let [topic_id, post_id, created_on, hash, ip, user] = split_fields::<6>(kind, body)?;
                let message_hash = Hash::from_log_base64(hash)
                    .ok_or_else(|| RecordError::InvalidHash(hash.to_string()))?;
                Ok(Record::Post {
                    topic_id: TopicId(parse_number("topic id", topic_id)?),
                    post_id: PostId(parse_number("post id", post_id)?),
                    created_on: Timestamp(parse_number("created on", created_on)?),
                    message_hash,
                    ip_internal: ip.to_string(),
                    user_name_internal: user.to_string(),
                })
            }
            'D' | 'U' => {
                let [topic_id, post_id] = split_fields::<2>(kind, body)?;
                let topic_id = TopicId(parse_number("topic id", topic_id)?);
                let post_id = PostId(parse_number("post id", post_id)?);
                if kind == 'D' {
                    Ok(Record::Delete { topic_id, post_id })
                } else {
                    Ok(Record::Undelete { topic_id, post_id })
                }
            }
            'B' => {
                let [ip, flag] = split_fields::<2>(kind, body)?;
                let blocked = match flag {
                    "0" => false,
                    "1" => true,
                    other => return Err(RecordError::InvalidBlockFlag(other.to_string())),
                };
                Ok(Record::Block {
                    ip_internal: ip.to_string(),
                    blocked,
                })
            }
            other => Err(RecordError::UnknownKind(other)),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Topic { id, subject } => {
                write!(f, "T{}|{}", id, strip_separator(subject))
            }
            Record::Post {
                topic_id,
                post_id,
                created_on,
                message_hash,
                ip_internal,
                user_name_internal,
            } => write!(
                f,
                "P{}|{}|{}|{}|{}|{}",
                topic_id,
                post_id,
                created_on.0,
                message_hash.to_log_base64(),
                strip_separator(ip_internal),
                strip_separator(user_name_internal)
            ),
            Record::Delete { topic_id, post_id } => write!(f, "D{}|{}", topic_id, post_id),
            Record::Undelete { topic_id, post_id } => write!(f, "U{}|{}", topic_id, post_id),
            Record::Block {
                ip_internal,
                blocked,
            } => write!(
                f,
                "B{}|{}",
                strip_separator(ip_internal),
                if *blocked { 1 } else { 0 }
            ),
        }
    }
}

/// Split a record body into exactly `N` fields.
fn split_fields<const N: usize>(kind: char, body: &str) -> Result<[&str; N], RecordError> {
    let parts: Vec<&str> = body.split(FIELD_SEPARATOR).collect();
    let got = parts.len();
    parts.try_into().map_err(|_| RecordError::FieldCount {
        kind,
        expected: N,
        got,
    })
}

fn parse_number<T: FromStr>(field: &'static str, value: &str) -> Result<T, RecordError> {
    value.parse().map_err(|_| RecordError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}
