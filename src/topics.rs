//! Topic subscription index and publish-time fan-out.
//!
//! Maps topic name → set of subscriber pipe ids. The index holds pipes by id
//! only; every delivery resolves the id against the [`PipeRegistry`] at
//! publish time, so a closed pipe is observed (and lazily pruned) rather
//! than written to.
//!
//! ```text
//! publish(topic, msg)
//!     │ snapshot subscriber ids        (index read lock, released)
//!     ▼
//!   for each id: registry lookup ──► pipe.write   (one pipe lock at a time)
//!     │ unknown / closed
//!     ▼
//!   prune(topic, stale ids)            (index write lock)
//! ```
//!
//! Lock order is index → pipe, and no pipe lock is held while another is
//! acquired, matching the rest of the broker.

// Rust guideline compliant 2026-02

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use serde_json::Value;

use crate::registry::PipeRegistry;

/// Topic name → subscriber pipe ids. Delivery is by exact topic name;
/// prefix matching applies only to the permission tags consulted by the
/// dispatcher.
#[derive(Debug, Default)]
pub struct TopicIndex {
    topics: RwLock<HashMap<String, HashSet<String>>>,
}

impl TopicIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a pipe to a topic. Idempotent: returns `false` when the
    /// pair was already present.
    pub fn subscribe(&self, topic: &str, pipe_id: &str) -> bool {
        self.topics
            .write()
            .expect("topic index poisoned")
            .entry(topic.to_owned())
            .or_default()
            .insert(pipe_id.to_owned())
    }

    /// Removes a subscription. Idempotent: unsubscribing a pair that was
    /// never subscribed is a no-op success (`false`).
    pub fn unsubscribe(&self, topic: &str, pipe_id: &str) -> bool {
        let mut topics = self.topics.write().expect("topic index poisoned");
        let Some(subs) = topics.get_mut(topic) else {
            return false;
        };
        let removed = subs.remove(pipe_id);
        if subs.is_empty() {
            topics.remove(topic);
        }
        removed
    }

    /// Removes every subscription targeting `pipe_id`, across all topics.
    /// Called on pipe close and session teardown.
    pub fn remove_pipe(&self, pipe_id: &str) {
        let mut topics = self.topics.write().expect("topic index poisoned");
        topics.retain(|_, subs| {
            subs.remove(pipe_id);
            !subs.is_empty()
        });
    }

    /// Snapshot of the current subscriber set for a topic.
    #[must_use]
    pub fn subscribers(&self, topic: &str) -> Vec<String> {
        self.topics
            .read()
            .expect("topic index poisoned")
            .get(topic)
            .map(|subs| subs.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// True if the exact (topic, pipe) pair is subscribed.
    #[must_use]
    pub fn is_subscribed(&self, topic: &str, pipe_id: &str) -> bool {
        self.topics
            .read()
            .expect("topic index poisoned")
            .get(topic)
            .is_some_and(|subs| subs.contains(pipe_id))
    }

    /// Fan a message out to every pipe subscribed to `topic`.
    ///
    /// Returns the number of pipes the write was attempted against.
    /// Subscribers that no longer resolve, or whose pipe closed concurrently,
    /// are skipped, excluded from the count, and pruned from the index.
    pub fn publish(&self, registry: &PipeRegistry, topic: &str, msg: &Value) -> usize {
        let subs = self.subscribers(topic);
        if subs.is_empty() {
            return 0;
        }

        let mut sent = 0;
        let mut stale = Vec::new();
        for pipe_id in &subs {
            match registry.get(pipe_id) {
                Some(pipe) => match pipe.write(vec![msg.clone()], Some(topic)) {
                    Ok(_) => sent += 1,
                    Err(_) => stale.push(pipe_id.clone()),
                },
                None => stale.push(pipe_id.clone()),
            }
        }

        if !stale.is_empty() {
            log::debug!(
                "[topics] pruning {} stale subscriber(s) from '{topic}'",
                stale.len()
            );
            let mut topics = self.topics.write().expect("topic index poisoned");
            if let Some(set) = topics.get_mut(topic) {
                for id in &stale {
                    set.remove(id);
                }
                if set.is_empty() {
                    topics.remove(topic);
                }
            }
        }

        sent
    }

    /// Number of topics with at least one subscriber.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topics.read().expect("topic index poisoned").len()
    }

    /// Whether any topic still references the pipe.
    #[must_use]
    pub fn references(&self, pipe_id: &str) -> bool {
        self.topics
            .read()
            .expect("topic index poisoned")
            .values()
            .any(|subs| subs.contains(pipe_id))
    }
}
