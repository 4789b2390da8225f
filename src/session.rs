//! Authenticated session state.
//!
//! A session is created by a successful `sys.login` and lives until its
//! connection drops. It records the caller identity, the set of pipes it
//! owns, and a cancellation token fired exactly once on disconnect. Teardown
//! of owned pipes is driven by the broker (see `Broker::teardown_session`);
//! the owned set here drains atomically so teardown stays idempotent.

use std::collections::HashSet;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

/// One authenticated connection's identity and owned resources.
#[derive(Debug)]
pub struct Session {
    id: String,
    user: String,
    owned: Mutex<HashSet<String>>,
    cancel: CancellationToken,
}

impl Session {
    /// Create a session for `user` with the given opaque id.
    #[must_use]
    pub fn new(id: String, user: String) -> Self {
        Self {
            id,
            user,
            owned: Mutex::new(HashSet::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Opaque session id; pipes record this as their owner.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Authenticated username.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Record ownership of a newly created pipe.
    pub fn own(&self, pipe_id: String) {
        self.owned
            .lock()
            .expect("session owned set poisoned")
            .insert(pipe_id);
    }

    /// Forget a pipe after an explicit `pipe.close`. Returns whether the
    /// session actually owned it.
    pub fn forget(&self, pipe_id: &str) -> bool {
        self.owned
            .lock()
            .expect("session owned set poisoned")
            .remove(pipe_id)
    }

    /// Take the whole owned set, leaving it empty. A second call returns
    /// nothing, which is what makes teardown idempotent.
    #[must_use]
    pub fn drain_owned(&self) -> Vec<String> {
        self.owned
            .lock()
            .expect("session owned set poisoned")
            .drain()
            .collect()
    }

    /// Number of pipes currently owned.
    #[must_use]
    pub fn owned_count(&self) -> usize {
        self.owned.lock().expect("session owned set poisoned").len()
    }

    /// The disconnect signal. Fired once by teardown; connection workers
    /// select on it to stop serving in-flight work.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// True once the session has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
