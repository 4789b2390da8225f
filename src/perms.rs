//! Permission oracle: tag lookup → allow/deny.
//!
//! Every dispatched method resolves a target string (the caller's own
//! username for `pipe.*`, the topic name for `topic.*`, the acted-on user or
//! prefix for `user.*`) and asks the oracle whether the caller carries
//! `@<method>` or `@admin` for that target. Only a literal `true` counts;
//! any other value, or absence, denies.

// Rust guideline compliant 2026-02

use std::sync::Arc;

use serde_json::Value;

use crate::error::{ErrKind, RpcError, RpcResult};
use crate::users::{TagMap, TagSource};

/// Allow/deny decisions backed by a [`TagSource`].
#[derive(Clone)]
pub struct PermissionOracle {
    source: Arc<dyn TagSource>,
}

impl PermissionOracle {
    /// Wrap a tag source.
    #[must_use]
    pub fn new(source: Arc<dyn TagSource>) -> Self {
        Self { source }
    }

    /// Whether `user` may perform `method` on `target`.
    ///
    /// # Errors
    ///
    /// Propagates tag-source failures (surfaced as `Internal` upstream).
    pub async fn allowed(&self, user: &str, method: &str, target: &str) -> RpcResult<bool> {
        let tags = self.source.tags(user, target).await?;
        Ok(tag_true(&tags, &format!("@{method}")) || tag_true(&tags, "@admin"))
    }

    /// Like [`PermissionOracle::allowed`] but fails with `PermissionDenied`.
    pub async fn check(&self, user: &str, method: &str, target: &str) -> RpcResult<()> {
        if self.allowed(user, method, target).await? {
            Ok(())
        } else {
            Err(RpcError::new(ErrKind::PermissionDenied))
        }
    }
}

impl std::fmt::Debug for PermissionOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionOracle").finish_non_exhaustive()
    }
}

fn tag_true(tags: &TagMap, name: &str) -> bool {
    matches!(tags.get(name), Some(Value::Bool(true)))
}
