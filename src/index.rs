//! In-memory index rebuilt from the log.
//!
//! Topics own their posts. The chronological post list holds slot handles
//! into the topic list rather than references, so growing a topic never
//! invalidates it.

use crate::error::{Result, StoreError};
use crate::records::Record;
use crate::types::{MatchedPosts, Post, PostId, Topic, TopicId, TopicPage};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Position of a post: topic slot, then post slot inside that topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PostRef {
    topic: usize,
    post: usize,
}

/// Topics, posts in creation order, and blocked IPs.
#[derive(Debug, Default)]
pub struct ForumIndex {
    /// Topics in creation order.
    topics: Vec<Topic>,

    /// Topic id to slot in `topics`.
    topic_slots: HashMap<TopicId, usize>,

    /// Every post across all topics, oldest first.
    posts: Vec<PostRef>,

    /// Blocked IPs, internal form.
    blocked_ips: HashSet<String>,
}

impl ForumIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topics_count(&self) -> usize {
        self.topics.len()
    }

    pub fn posts_count(&self) -> usize {
        self.posts.len()
    }

    pub fn blocked_ip_count(&self) -> usize {
        self.blocked_ips.len()
    }

    pub fn is_ip_blocked(&self, ip_internal: &str) -> bool {
        self.blocked_ips.contains(ip_internal)
    }

    /// Id for the next topic: last topic's id plus one.
    pub fn next_topic_id(&self) -> Result<TopicId> {
        match self.topics.last() {
            Some(last) => last.id.next().ok_or(StoreError::TopicIdsExhausted(last.id)),
            None => Ok(TopicId(1)),
        }
    }

    pub fn topic(&self, id: TopicId) -> Option<&Topic> {
        self.topic_slots.get(&id).map(|&slot| &self.topics[slot])
    }

    /// Look up a post, failing with the matching not-found error.
    pub fn post(&self, topic_id: TopicId, post_id: PostId) -> Result<&Post> {
        let topic = self
            .topic(topic_id)
            .ok_or(StoreError::TopicNotFound(topic_id))?;
        topic
            .post(post_id)
            .ok_or(StoreError::PostNotFound(topic_id, post_id))
    }

    /// Topics without posts. Never produced by the store itself.
    pub fn empty_topics(&self) -> impl Iterator<Item = &Topic> {
        self.topics.iter().filter(|t| t.posts.is_empty())
    }

    /// Apply one record.
    ///
    /// A post gets the next sequential id whatever the record says; a
    /// mismatch is only logged. Deleting a deleted post is accepted,
    /// undeleting a live one is not.
    pub fn apply(&mut self, record: Record) -> Result<()> {
        match record {
            Record::Topic { id, subject } => {
                self.topics.push(Topic::new(id, subject));
                self.topic_slots.insert(id, self.topics.len() - 1);
            }
            Record::Post {
                topic_id,
                post_id,
                created_on,
                message_hash,
                ip_internal,
                user_name_internal,
            } => {
                let slot = *self
                    .topic_slots
                    .get(&topic_id)
                    .ok_or(StoreError::TopicNotFound(topic_id))?;
                let topic = &mut self.topics[slot];
                let expected = topic.next_post_id();
                if post_id != expected {
                    warn!(
                        topic = %topic_id,
                        recorded = %post_id,
                        expected = %expected,
                        subject = %topic.subject,
                        "unexpected post id, using expected id"
                    );
                }
                topic.posts.push(Post {
                    id: expected,
                    topic_id,
                    created_on,
                    message_hash,
                    user_name_internal,
                    ip_internal,
                    deleted: false,
                });
                self.posts.push(PostRef {
                    topic: slot,
                    post: topic.posts.len() - 1,
                });
            }
            Record::Delete { topic_id, post_id } => {
                let post = self.post_mut(topic_id, post_id)?;
                if post.deleted {
                    debug!(topic = %topic_id, post = %post_id, "post deleted twice");
                }
                post.deleted = true;
            }
            Record::Undelete { topic_id, post_id } => {
                let post = self.post_mut(topic_id, post_id)?;
                if !post.deleted {
                    return Err(StoreError::AlreadyInState {
                        topic: topic_id,
                        post: post_id,
                        deleted: false,
                    });
                }
                post.deleted = false;
            }
            Record::Block {
                ip_internal,
                blocked,
            } => {
                if blocked {
                    self.blocked_ips.insert(ip_internal);
                } else {
                    self.blocked_ips.remove(&ip_internal);
                }
            }
        }
        Ok(())
    }

    fn post_mut(&mut self, topic_id: TopicId, post_id: PostId) -> Result<&mut Post> {
        let slot = *self
            .topic_slots
            .get(&topic_id)
            .ok_or(StoreError::TopicNotFound(topic_id))?;
        let posts = &mut self.topics[slot].posts;
        match post_id.index() {
            Some(i) if i < posts.len() => Ok(&mut posts[i]),
            _ => Err(StoreError::PostNotFound(topic_id, post_id)),
        }
    }

    // --- Queries ---

    /// Up to `max_count` topics, newest first, skipping the `offset` newest.
    ///
    /// `include_deleted` is accepted but does not filter anything.
    pub fn list_topics(&self, max_count: usize, offset: usize, _include_deleted: bool) -> TopicPage {
        let topics: Vec<Topic> = self
            .topics
            .iter()
            .rev()
            .skip(offset)
            .take(max_count)
            .cloned()
            .collect();

        let consumed = offset.saturating_add(topics.len());
        let next_offset = if !topics.is_empty() && consumed < self.topics.len() {
            Some(consumed)
        } else {
            None
        };

        TopicPage {
            topics,
            next_offset,
        }
    }

    /// Most recent posts across all topics, newest first.
    pub fn recent_posts(&self, max_count: usize) -> Vec<Post> {
        self.posts_newest_first()
            .take(max_count)
            .cloned()
            .collect()
    }

    pub fn posts_by_author(&self, user_name_internal: &str, max_count: usize) -> MatchedPosts {
        self.matching_posts(max_count, |p| p.user_name_internal == user_name_internal)
    }

    pub fn posts_by_ip(&self, ip_internal: &str, max_count: usize) -> MatchedPosts {
        self.matching_posts(max_count, |p| p.ip_internal == ip_internal)
    }

    fn matching_posts(&self, max_count: usize, pred: impl Fn(&Post) -> bool) -> MatchedPosts {
        let mut matched = MatchedPosts::default();
        for post in self.posts_newest_first().filter(|p| pred(*p)) {
            if matched.total < max_count {
                matched.posts.push(post.clone());
            }
            matched.total += 1;
        }
        matched
    }

    fn posts_newest_first(&self) -> impl Iterator<Item = &Post> {
        self.posts
            .iter()
            .rev()
            .map(|r| &self.topics[r.topic].posts[r.post])
    }
}
