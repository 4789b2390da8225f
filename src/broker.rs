//! Broker context: the shared state every handler works against.
//!
//! There are no ambient singletons; the pipe registry, topic index, user
//! registry, permission oracle, and id generator all live here and are
//! passed explicitly (as one `Arc<Broker>`) to connection workers and the
//! dispatcher.
//!
//! Lock order everywhere is (registry/index) → (pipe); no broker path holds
//! a pipe lock while touching a registry, and no path holds two pipe locks.

// Rust guideline compliant 2026-02

use std::sync::Arc;

use crate::error::RpcResult;
use crate::idgen::IdGen;
use crate::perms::PermissionOracle;
use crate::pipe::{Pipe, DEFAULT_PIPE_CAPACITY};
use crate::registry::PipeRegistry;
use crate::session::Session;
use crate::topics::TopicIndex;
use crate::users::UserRegistry;

/// Shared broker state.
#[derive(Debug)]
pub struct Broker {
    idgen: IdGen,
    /// Live pipes by id.
    pub registry: PipeRegistry,
    /// Topic → subscriber pipe ids.
    pub topics: TopicIndex,
    /// Users, credentials and permission tags.
    pub users: Arc<UserRegistry>,
    oracle: PermissionOracle,
    default_capacity: usize,
}

impl Broker {
    /// Build a broker around a user registry, with the default pipe capacity.
    #[must_use]
    pub fn new(users: Arc<UserRegistry>) -> Self {
        Self::with_default_capacity(users, DEFAULT_PIPE_CAPACITY)
    }

    /// Build a broker with a custom default pipe capacity (≥ 1).
    #[must_use]
    pub fn with_default_capacity(users: Arc<UserRegistry>, default_capacity: usize) -> Self {
        let oracle =
            PermissionOracle::new(Arc::clone(&users) as Arc<dyn crate::users::TagSource>);
        Self {
            idgen: IdGen::new(),
            registry: PipeRegistry::new(),
            topics: TopicIndex::new(),
            users,
            oracle,
            default_capacity,
        }
    }

    /// The permission oracle consulted by the dispatcher.
    #[must_use]
    pub fn oracle(&self) -> &PermissionOracle {
        &self.oracle
    }

    /// Verify credentials and open a session.
    ///
    /// # Errors
    ///
    /// `InvalidLogin` when the credentials do not verify.
    pub fn login(&self, user: &str, pass: &str) -> RpcResult<Arc<Session>> {
        self.users.verify(user, pass)?;
        let session = self.open_session(user);
        log::info!("[session] {} logged in as '{user}'", session.id());
        Ok(session)
    }

    /// Open a session for an already-authenticated user. Exposed for test
    /// harnesses and embedded use; the server path goes through `login`.
    #[must_use]
    pub fn open_session(&self, user: &str) -> Arc<Session> {
        Arc::new(Session::new(self.idgen.session_id(), user.to_owned()))
    }

    /// Allocate, register and record ownership of a new pipe.
    #[must_use]
    pub fn create_pipe(&self, owner: &Session, capacity: Option<usize>) -> Arc<Pipe> {
        let capacity = capacity.unwrap_or(self.default_capacity);
        let pipe = Arc::new(Pipe::new(
            self.idgen.pipe_id(),
            owner.id().to_owned(),
            capacity,
        ));
        self.registry.insert(Arc::clone(&pipe));
        owner.own(pipe.id().to_owned());
        pipe
    }

    /// Close a pipe: deregister, drop its subscriptions, then mark closed.
    ///
    /// Deregistration comes first so new callers stop resolving the pipe
    /// before the closed state is observable; subscription removal completes
    /// before this returns, so no publish enumerating afterwards can see the
    /// pipe. Idempotent.
    pub fn close_pipe(&self, pipe: &Pipe) {
        self.registry.remove(pipe.id());
        self.topics.remove_pipe(pipe.id());
        pipe.mark_closed();
    }

    /// Tear down a disconnected session: fire its cancellation signal, then
    /// close every owned pipe (which wakes blocked readers with
    /// `InvalidPipe`). Safe to call more than once.
    pub fn teardown_session(&self, session: &Session) {
        session.cancel_token().cancel();
        let owned = session.drain_owned();
        if owned.is_empty() {
            return;
        }
        log::debug!(
            "[session] {} teardown, closing {} pipe(s)",
            session.id(),
            owned.len()
        );
        for pipe_id in owned {
            if let Some(pipe) = self.registry.remove(&pipe_id) {
                self.topics.remove_pipe(&pipe_id);
                pipe.mark_closed();
            } else {
                // Already closed explicitly; subscriptions went with it.
                self.topics.remove_pipe(&pipe_id);
            }
        }
    }
}
