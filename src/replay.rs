//! Rebuilds the in-memory index from the full log.
//!
//! Any line that does not decode, or that decodes but cannot be applied
//! (unknown topic, post out of range, undelete of a live post), aborts the
//! replay. Nothing is skipped.

use crate::error::{Result, StoreError};
use crate::index::ForumIndex;
use crate::records::{lines, Record};
use tracing::warn;

/// Replay log content from offset 0.
pub fn replay(data: &[u8]) -> Result<ForumIndex> {
    let mut index = ForumIndex::new();

    for (line_no, line) in lines(data) {
        let text = std::str::from_utf8(line).map_err(|e| StoreError::Corruption {
            line: line_no,
            reason: format!("record is not valid UTF-8: {e}"),
        })?;
        let record = Record::decode(text).map_err(|source| StoreError::MalformedRecord {
            line: line_no,
            source,
        })?;
        index.apply(record).map_err(|e| StoreError::Corruption {
            line: line_no,
            reason: e.to_string(),
        })?;
    }

    verify_topics(&index);
    Ok(index)
}

/// Flag topics that ended up without posts. Only a prior corruption can
/// cause this, so it is reported and not fatal.
fn verify_topics(index: &ForumIndex) {
    for topic in index.empty_topics() {
        warn!(topic = %topic.id, subject = %topic.subject, "topic has no posts");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Hash, PostId, TopicId};
    use parking_lot::Mutex;
    use std::io;
    use std::sync::Arc;
    use tracing_subscriber::fmt::MakeWriter;

    /// Collects formatted log output in memory.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn replay_logged(data: &[u8]) -> (Result<ForumIndex>, String) {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let result = tracing::subscriber::with_default(subscriber, || replay(data));
        (result, logs.text())
    }

    fn hash_b64(body: &str) -> String {
        Hash::from_bytes(body.as_bytes()).to_log_base64()
    }

    fn post_line(topic: u64, post: u64, author: &str) -> String {
        format!(
            "P{topic}|{post}|1148874103|{}|4b0af66e|{author}\n",
            hash_b64(&format!("{topic}-{post}"))
        )
    }

    #[test]
    fn test_replay_builds_index() {
        let log = format!(
            "T1|Hello\n{}T2|Second\n{}{}D1|2\nB1020304|1\n",
            post_line(1, 1, "alice"),
            post_line(2, 1, "bob"),
            post_line(1, 2, "carol"),
        );
        let index = replay(log.as_bytes()).unwrap();

        assert_eq!(index.topics_count(), 2);
        assert_eq!(index.posts_count(), 3);
        assert!(index.post(TopicId(1), PostId(2)).unwrap().deleted);
        assert!(!index.post(TopicId(1), PostId(1)).unwrap().deleted);
        assert!(index.is_ip_blocked("1020304"));
        assert_eq!(index.next_topic_id().unwrap(), TopicId(3));
    }

    #[test]
    fn test_empty_log() {
        let index = replay(b"").unwrap();
        assert_eq!(index.topics_count(), 0);
        assert_eq!(index.next_topic_id().unwrap(), TopicId(1));
    }

    #[test]
    fn test_last_line_without_newline() {
        let log = format!("T1|Hello\n{}", post_line(1, 1, "alice").trim_end());
        let index = replay(log.as_bytes()).unwrap();
        assert_eq!(index.posts_count(), 1);
    }

    #[test]
    fn test_post_id_mismatch_is_tolerated() {
        let log = format!("T1|Hello\n{}{}", post_line(1, 1, "a"), post_line(1, 9, "b"));
        let index = replay(log.as_bytes()).unwrap();

        let topic = index.topic(TopicId(1)).unwrap();
        assert_eq!(topic.posts[1].id, PostId(2));
        assert_eq!(topic.posts[1].user_name_internal, "b");
    }

    #[test]
    fn test_post_id_mismatch_is_logged() {
        let log = format!("T1|Hello\n{}{}", post_line(1, 1, "a"), post_line(1, 9, "b"));
        let (result, logs) = replay_logged(log.as_bytes());

        assert_eq!(result.unwrap().posts_count(), 2);
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("unexpected post id"), "{logs}");
        assert!(logs.contains("recorded=9"), "{logs}");
        assert!(logs.contains("expected=2"), "{logs}");
    }

    #[test]
    fn test_clean_log_has_no_warnings() {
        let log = format!("T1|Hello\n{}{}", post_line(1, 1, "a"), post_line(1, 2, "b"));
        let (result, logs) = replay_logged(log.as_bytes());

        assert!(result.is_ok());
        assert!(!logs.contains("WARN"), "{logs}");
    }

    #[test]
    fn test_redelete_is_tolerated() {
        let log = format!("T1|Hello\n{}D1|1\nD1|1\n", post_line(1, 1, "a"));
        let index = replay(log.as_bytes()).unwrap();
        assert!(index.post(TopicId(1), PostId(1)).unwrap().deleted);
    }

    #[test]
    fn test_reundelete_is_fatal() {
        let log = format!("T1|Hello\n{}D1|1\nU1|1\nU1|1\n", post_line(1, 1, "a"));
        let err = replay(log.as_bytes()).unwrap_err();
        assert!(matches!(err, StoreError::Corruption { line: 5, .. }));
    }

    #[test]
    fn test_post_in_unknown_topic_is_fatal() {
        let log = format!("T1|Hello\n{}", post_line(2, 1, "a"));
        let err = replay(log.as_bytes()).unwrap_err();
        assert!(matches!(err, StoreError::Corruption { line: 2, .. }));
    }

    #[test]
    fn test_delete_out_of_range_is_fatal() {
        let log = format!("T1|Hello\n{}D1|2\n", post_line(1, 1, "a"));
        let err = replay(log.as_bytes()).unwrap_err();
        assert!(matches!(err, StoreError::Corruption { line: 3, .. }));
        assert!(err.is_corruption());
    }

    #[test]
    fn test_malformed_lines_are_fatal() {
        for bad in [
            "X1|what\n",
            "T1\n",
            "Tone|Hello\n",
            "T1|Hello\n\n",
            "T1|Hello\nP1|1|123|c2hvcnQ|1020304|a\n",
            "B1020304|yes\n",
        ] {
            let err = replay(bad.as_bytes()).unwrap_err();
            assert!(
                matches!(err, StoreError::MalformedRecord { .. }),
                "{bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_topic_without_posts_is_not_fatal() {
        let (result, logs) = replay_logged(b"T1|Lonely\n");
        let index = result.unwrap();
        assert_eq!(index.topics_count(), 1);
        assert_eq!(index.posts_count(), 0);
        assert!(logs.contains("topic has no posts"), "{logs}");
        assert!(logs.contains("subject=Lonely"), "{logs}");
    }
}
