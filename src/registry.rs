//! Process-wide pipe registry.
//!
//! Maps pipe id → live [`Pipe`]. Insertions happen on `pipe.create`,
//! removals on `pipe.close` and session teardown; both are atomic with
//! respect to lookups. Deregistration strictly precedes marking a pipe
//! closed, so new callers stop resolving the pipe before they could ever
//! observe its closed state.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::pipe::Pipe;

/// Registry of all live pipes, shared by every connection worker.
#[derive(Debug, Default)]
pub struct PipeRegistry {
    pipes: RwLock<HashMap<String, Arc<Pipe>>>,
}

impl PipeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pipe under its id.
    pub fn insert(&self, pipe: Arc<Pipe>) {
        self.pipes
            .write()
            .expect("pipe registry poisoned")
            .insert(pipe.id().to_owned(), pipe);
    }

    /// Looks up a live pipe.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Pipe>> {
        self.pipes
            .read()
            .expect("pipe registry poisoned")
            .get(id)
            .cloned()
    }

    /// Deregisters a pipe, returning it if it was present.
    pub fn remove(&self, id: &str) -> Option<Arc<Pipe>> {
        self.pipes
            .write()
            .expect("pipe registry poisoned")
            .remove(id)
    }

    /// Number of registered pipes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pipes.read().expect("pipe registry poisoned").len()
    }

    /// True if no pipes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
