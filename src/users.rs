//! In-memory user registry: credentials and permission tags.
//!
//! Each user carries a salted password hash and a tag map keyed by prefix:
//!
//! ```text
//! alice:
//!   ""            → {"@pipe.create": true, "@pipe.write": true}
//!   "alerts."     → {"@topic.publish": true}
//!   "alerts.ops." → {"@topic.publish": false}
//! ```
//!
//! The tags effective for a target string are the merge of every stored
//! prefix the target starts with, applied shortest-first so the longest
//! matching prefix wins per tag. The permission oracle consumes this via
//! the [`TagSource`] seam; a durable registry backend would implement the
//! same trait.

// Rust guideline compliant 2026-02

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use data_encoding::HEXLOWER;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{ErrKind, RpcError, RpcResult};
use crate::idgen::IdGen;

/// A resolved tag set: tag name → value (checks treat only `true` as set).
pub type TagMap = Map<String, Value>;

/// Username constraints: lowercase, 1–64 chars of `[a-z0-9._-]`.
fn valid_username(user: &str) -> bool {
    !user.is_empty()
        && user.len() <= 64
        && user
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
}

/// Password length bounds.
const PASS_MIN: usize = 4;
const PASS_MAX: usize = 512;

/// Salted SHA-256, hex encoded.
fn hash_pass(pass: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(pass.as_bytes());
    HEXLOWER.encode(&hasher.finalize())
}

/// Read-only view of a user's tags, as the oracle needs them.
#[async_trait]
pub trait TagSource: Send + Sync {
    /// Tags effective for `user` on `target`, per the prefix-merge rule.
    /// Unknown users resolve to an empty map, not an error.
    async fn tags(&self, user: &str, target: &str) -> RpcResult<TagMap>;
}

#[derive(Debug, Clone)]
struct UserRecord {
    pass: String,
    salt: String,
    /// prefix → (tag → value)
    tags: HashMap<String, TagMap>,
}

/// The in-memory registry behind `sys.login` and the `user.*` surface.
#[derive(Debug, Default)]
pub struct UserRegistry {
    users: RwLock<HashMap<String, UserRecord>>,
    idgen: IdGen,
}

impl UserRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a user with a fresh salt.
    ///
    /// # Errors
    ///
    /// `InvalidParams` for a malformed name or out-of-bounds password,
    /// `UserExists` on duplicate.
    pub fn create(&self, user: &str, pass: &str) -> RpcResult<()> {
        if !valid_username(user) {
            return Err(RpcError::bad_param("user"));
        }
        if pass.len() < PASS_MIN || pass.len() > PASS_MAX {
            return Err(RpcError::bad_param("pass"));
        }
        let salt = self.idgen.salt();
        let record = UserRecord {
            pass: hash_pass(pass, &salt),
            salt,
            tags: HashMap::new(),
        };
        let mut users = self.users.write().expect("user registry poisoned");
        if users.contains_key(user) {
            return Err(RpcError::new(ErrKind::UserExists));
        }
        users.insert(user.to_owned(), record);
        Ok(())
    }

    /// Delete a user.
    ///
    /// # Errors
    ///
    /// `InvalidUser` when absent.
    pub fn delete(&self, user: &str) -> RpcResult<()> {
        let mut users = self.users.write().expect("user registry poisoned");
        if users.remove(user).is_none() {
            return Err(RpcError::new(ErrKind::InvalidUser));
        }
        Ok(())
    }

    /// Merge `tags` into the user's map for `prefix`.
    ///
    /// # Errors
    ///
    /// `InvalidUser` when absent.
    pub fn set_tags(&self, user: &str, prefix: &str, tags: &TagMap) -> RpcResult<()> {
        let mut users = self.users.write().expect("user registry poisoned");
        let record = users
            .get_mut(user)
            .ok_or_else(|| RpcError::new(ErrKind::InvalidUser))?;
        let slot = record.tags.entry(prefix.to_owned()).or_default();
        for (k, v) in tags {
            slot.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    /// Remove named tags from the user's map for `prefix`, dropping the
    /// prefix entry once empty.
    ///
    /// # Errors
    ///
    /// `InvalidUser` when absent.
    pub fn del_tags(&self, user: &str, prefix: &str, names: &[String]) -> RpcResult<()> {
        let mut users = self.users.write().expect("user registry poisoned");
        let record = users
            .get_mut(user)
            .ok_or_else(|| RpcError::new(ErrKind::InvalidUser))?;
        if let Some(slot) = record.tags.get_mut(prefix) {
            for name in names {
                slot.remove(name);
            }
            if slot.is_empty() {
                record.tags.remove(prefix);
            }
        }
        Ok(())
    }

    /// Re-salt and re-hash the user's password.
    ///
    /// # Errors
    ///
    /// `InvalidParams` for an out-of-bounds password, `InvalidUser` when
    /// absent.
    pub fn set_pass(&self, user: &str, pass: &str) -> RpcResult<()> {
        if pass.len() < PASS_MIN || pass.len() > PASS_MAX {
            return Err(RpcError::bad_param("pass"));
        }
        let salt = self.idgen.salt();
        let hashed = hash_pass(pass, &salt);
        let mut users = self.users.write().expect("user registry poisoned");
        let record = users
            .get_mut(user)
            .ok_or_else(|| RpcError::new(ErrKind::InvalidUser))?;
        record.salt = salt;
        record.pass = hashed;
        Ok(())
    }

    /// List users whose name starts with `prefix`, sorted by name, with
    /// `skip`/`limit` paging. Tags are included; credentials never are.
    #[must_use]
    pub fn list(&self, prefix: &str, skip: usize, limit: usize) -> Vec<Value> {
        let users = self.users.read().expect("user registry poisoned");
        let mut names: Vec<&String> = users
            .keys()
            .filter(|name| name.starts_with(prefix))
            .collect();
        names.sort();
        names
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|name| {
                let record = &users[name];
                json!({
                    "user": name,
                    "tags": record
                        .tags
                        .iter()
                        .map(|(p, t)| (p.clone(), Value::Object(t.clone())))
                        .collect::<Map<String, Value>>(),
                })
            })
            .collect()
    }

    /// Verify login credentials.
    ///
    /// # Errors
    ///
    /// `InvalidLogin` for unknown user or wrong password (indistinguishable
    /// to the caller).
    pub fn verify(&self, user: &str, pass: &str) -> RpcResult<()> {
        let users = self.users.read().expect("user registry poisoned");
        let Some(record) = users.get(user) else {
            return Err(RpcError::new(ErrKind::InvalidLogin));
        };
        if hash_pass(pass, &record.salt) != record.pass {
            return Err(RpcError::new(ErrKind::InvalidLogin));
        }
        Ok(())
    }

    /// Idempotent seeding helper used at startup: create the user if absent
    /// and merge the given tags for `prefix`.
    pub fn ensure(&self, user: &str, pass: &str, prefix: &str, tags: &TagMap) -> RpcResult<()> {
        match self.create(user, pass) {
            Ok(()) => {}
            Err(e) if e.kind == ErrKind::UserExists => {}
            Err(e) => return Err(e),
        }
        self.set_tags(user, prefix, tags)
    }

    /// Whether a user exists.
    #[must_use]
    pub fn exists(&self, user: &str) -> bool {
        self.users
            .read()
            .expect("user registry poisoned")
            .contains_key(user)
    }

    fn resolve_tags(&self, user: &str, target: &str) -> TagMap {
        let users = self.users.read().expect("user registry poisoned");
        let Some(record) = users.get(user) else {
            return TagMap::new();
        };
        let mut prefixes: Vec<&String> = record
            .tags
            .keys()
            .filter(|prefix| target.starts_with(prefix.as_str()))
            .collect();
        // Shortest first: a longer (more specific) prefix overrides.
        prefixes.sort_by_key(|p| p.len());
        let mut merged = TagMap::new();
        for prefix in prefixes {
            for (k, v) in &record.tags[prefix] {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    }
}

#[async_trait]
impl TagSource for UserRegistry {
    async fn tags(&self, user: &str, target: &str) -> RpcResult<TagMap> {
        Ok(self.resolve_tags(user, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, bool)]) -> TagMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), Value::Bool(*v)))
            .collect()
    }

    // ── CRUD ──────────────────────────────────────────────────────────────

    #[test]
    fn test_create_and_verify() {
        let reg = UserRegistry::new();
        reg.create("alice", "secret").unwrap();
        reg.verify("alice", "secret").unwrap();
        assert_eq!(
            reg.verify("alice", "wrong").unwrap_err().kind,
            ErrKind::InvalidLogin
        );
        assert_eq!(
            reg.verify("nobody", "secret").unwrap_err().kind,
            ErrKind::InvalidLogin
        );
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let reg = UserRegistry::new();
        reg.create("alice", "secret").unwrap();
        assert_eq!(
            reg.create("alice", "other").unwrap_err().kind,
            ErrKind::UserExists
        );
    }

    #[test]
    fn test_username_validation() {
        let reg = UserRegistry::new();
        assert!(reg.create("Alice", "secret").is_err());
        assert!(reg.create("", "secret").is_err());
        assert!(reg.create("ok.user_1-x", "secret").is_ok());
    }

    #[test]
    fn test_short_password_rejected() {
        let reg = UserRegistry::new();
        let err = reg.create("alice", "abc").unwrap_err();
        assert_eq!(err.data.as_deref(), Some("pass"));
    }

    #[test]
    fn test_delete_absent_is_invalid_user() {
        let reg = UserRegistry::new();
        assert_eq!(reg.delete("ghost").unwrap_err().kind, ErrKind::InvalidUser);
    }

    #[test]
    fn test_set_pass_rehashes() {
        let reg = UserRegistry::new();
        reg.create("alice", "first-pass").unwrap();
        reg.set_pass("alice", "second-pass").unwrap();
        assert!(reg.verify("alice", "first-pass").is_err());
        reg.verify("alice", "second-pass").unwrap();
    }

    #[test]
    fn test_list_prefix_and_paging() {
        let reg = UserRegistry::new();
        for name in ["svc.a", "svc.b", "svc.c", "other"] {
            reg.create(name, "secret").unwrap();
        }
        let all = reg.list("svc.", 0, 100);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0]["user"], "svc.a");

        let page = reg.list("svc.", 1, 1);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0]["user"], "svc.b");
        assert!(page[0].get("pass").is_none());
    }

    // ── Tag resolution ────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_tag_merge_longest_prefix_wins() {
        let reg = UserRegistry::new();
        reg.create("alice", "secret").unwrap();
        reg.set_tags("alice", "", &tags(&[("@topic.publish", true)]))
            .unwrap();
        reg.set_tags("alice", "alerts.ops.", &tags(&[("@topic.publish", false)]))
            .unwrap();

        let broad = reg.tags("alice", "alerts.disk").await.unwrap();
        assert_eq!(broad.get("@topic.publish"), Some(&Value::Bool(true)));

        let narrow = reg.tags("alice", "alerts.ops.cpu").await.unwrap();
        assert_eq!(narrow.get("@topic.publish"), Some(&Value::Bool(false)));
    }

    #[tokio::test]
    async fn test_tags_for_unknown_user_empty() {
        let reg = UserRegistry::new();
        assert!(reg.tags("ghost", "anything").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_del_tags_drops_empty_prefix() {
        let reg = UserRegistry::new();
        reg.create("alice", "secret").unwrap();
        reg.set_tags("alice", "x.", &tags(&[("@pipe.read", true)]))
            .unwrap();
        reg.del_tags("alice", "x.", &["@pipe.read".to_owned()])
            .unwrap();
        assert!(reg.tags("alice", "x.y").await.unwrap().is_empty());
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let reg = UserRegistry::new();
        let t = tags(&[("@admin", true)]);
        reg.ensure("root", "root-pass", "", &t).unwrap();
        reg.ensure("root", "root-pass", "", &t).unwrap();
        assert!(reg.exists("root"));
    }
}
