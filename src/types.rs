//! Core types for the forum store.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Field delimiter inside a log record.
pub const FIELD_SEPARATOR: char = '|';

/// Record terminator in the log.
pub const RECORD_SEPARATOR: char = '\n';

/// Author prefix for users signed in through twitter.
pub const TWITTER_PREFIX: &str = "t:";

/// Globally unique topic id, assigned as `last id + 1`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TopicId(pub u64);

impl fmt::Debug for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TopicId({})", self.0)
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TopicId {
    /// Following id, `None` once the id space is used up.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(TopicId)
    }
}

/// 1-based position of a post inside its topic.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PostId(pub u64);

impl fmt::Debug for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PostId({})", self.0)
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PostId {
    /// Index into the owning topic's post list, `None` for id 0.
    pub fn index(self) -> Option<usize> {
        (self.0 as usize).checked_sub(1)
    }
}

/// Seconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time, truncated to whole seconds.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_secs() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Content hash for message bodies (SHA-1).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 20]);

impl Hash {
    /// Compute hash from bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        Hash(hasher.finalize().into())
    }

    /// Lowercase hex, 40 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Hash(arr))
    }

    /// Standard base64 with the single trailing `=` dropped, as written in the log.
    pub fn to_log_base64(&self) -> String {
        STANDARD_NO_PAD.encode(self.0)
    }

    /// Inverse of [`Hash::to_log_base64`]. The padding is put back before
    /// decoding, so an already padded value is rejected.
    pub fn from_log_base64(s: &str) -> Option<Self> {
        let padded = format!("{s}=");
        let bytes = STANDARD.decode(padded).ok()?;
        let arr: [u8; 20] = bytes.try_into().ok()?;
        Some(Hash(arr))
    }

    /// The two directory levels a blob is sharded into.
    pub fn shard_dirs(&self) -> (String, String) {
        (hex::encode(&self.0[0..1]), hex::encode(&self.0[1..2]))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A single forum message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,

    /// Owning topic. Only an id, the topic owns the post.
    pub topic_id: TopicId,

    pub created_on: Timestamp,

    /// Hash of the body in the blob store.
    pub message_hash: Hash,

    /// Author name in internal form, see [`make_internal_user_name`].
    pub user_name_internal: String,

    /// Origin IP in internal form, see [`ip_to_internal`].
    pub ip_internal: String,

    pub deleted: bool,
}

impl Post {
    /// Origin IP in its textual form.
    pub fn ip_address(&self) -> String {
        ip_internal_to_original(&self.ip_internal)
    }

    pub fn is_twitter_user(&self) -> bool {
        self.user_name_internal.starts_with(TWITTER_PREFIX)
    }

    /// Author name for display, without the provider prefix.
    pub fn user_name(&self) -> &str {
        if self.is_twitter_user() {
            &self.user_name_internal[TWITTER_PREFIX.len()..]
        } else {
            &self.user_name_internal
        }
    }
}

/// A thread: subject plus its posts in creation order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    pub subject: String,
    pub posts: Vec<Post>,
}

impl Topic {
    pub fn new(id: TopicId, subject: impl Into<String>) -> Self {
        Self {
            id,
            subject: subject.into(),
            posts: Vec::new(),
        }
    }

    /// A topic is deleted when every one of its posts is.
    pub fn is_deleted(&self) -> bool {
        self.posts.iter().all(|p| p.deleted)
    }

    pub fn post(&self, id: PostId) -> Option<&Post> {
        self.posts.get(id.index()?)
    }

    /// Id the next appended post will get.
    pub fn next_post_id(&self) -> PostId {
        PostId(self.posts.len() as u64 + 1)
    }
}

/// One page of topics, newest first.
#[derive(Clone, Debug, Default)]
pub struct TopicPage {
    pub topics: Vec<Topic>,

    /// Offset for the following page, `None` once all topics were returned.
    pub next_offset: Option<usize>,
}

/// Posts matching a filter, newest first, plus the untruncated match count.
#[derive(Clone, Debug, Default)]
pub struct MatchedPosts {
    pub posts: Vec<Post>,
    pub total: usize,
}

/// Store statistics.
#[derive(Clone, Debug, Default)]
pub struct StoreStats {
    pub topic_count: u64,
    pub post_count: u64,
    pub blocked_ip_count: u64,
    pub log_size_bytes: u64,
}

/// Drop field and line separators from free text. Lossy: the log has no
/// escaping, so a field can never contain `|`, `\n` or `\r`.
pub fn strip_separator(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(*c, FIELD_SEPARATOR | RECORD_SEPARATOR | '\r'))
        .collect()
}

/// Build the internal author name.
///
/// Twitter users get the `t:` prefix. Anyone else who types a name with `:`
/// as the second character loses that two-character prefix so they cannot
/// pose as a signed-in user.
pub fn make_internal_user_name(user_name: &str, twitter: bool) -> String {
    if twitter {
        return format!("{TWITTER_PREFIX}{user_name}");
    }
    let mut chars = user_name.char_indices();
    if let (Some(_), Some((colon_at, ':'))) = (chars.next(), chars.next()) {
        let rest = &user_name[colon_at + 1..];
        if rest.is_empty() {
            return user_name[..colon_at].to_string();
        }
        return rest.to_string();
    }
    user_name.to_string()
}

/// Compact form of an IP address used in the log.
///
/// A dotted quad becomes hex of its four bytes with one leading `0` digit
/// trimmed, which is how older logs wrote it. Octets may carry leading zeros
/// (`01.2.3.4`). Anything else passes through.
pub fn ip_to_internal(ip: &str) -> String {
    match parse_dotted_quad(ip) {
        Some(octets) => {
            let s = hex::encode(octets);
            match s.strip_prefix('0') {
                Some(trimmed) => trimmed.to_string(),
                None => s,
            }
        }
        None => ip.to_string(),
    }
}

fn parse_dotted_quad(ip: &str) -> Option<[u8; 4]> {
    let mut parts = ip.split('.');
    let mut octets = [0u8; 4];
    for octet in octets.iter_mut() {
        *octet = parts.next()?.parse().ok()?;
    }
    match parts.next() {
        Some(_) => None,
        None => Some(octets),
    }
}

/// Inverse of [`ip_to_internal`]; accepts both 7 and 8 hex digit forms.
pub fn ip_internal_to_original(s: &str) -> String {
    let padded = match s.len() {
        7 => format!("0{s}"),
        8 => s.to_string(),
        _ => return s.to_string(),
    };
    match hex::decode(&padded) {
        Ok(d) => Ipv4Addr::new(d[0], d[1], d[2], d[3]).to_string(),
        Err(_) => s.to_string(),
    }
}
