//! Opaque identifier generation.
//!
//! Pipe ids are 18 random bytes in url-safe base64 (24 chars, no padding);
//! session ids are uuid-v4 in simple form. Both are collision-resistant
//! enough that an id is never reused within a process lifetime.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use uuid::Uuid;

/// Number of random bytes behind a pipe id.
const PIPE_ID_BYTES: usize = 18;

/// Generator for the broker's opaque identifiers.
///
/// Stateless; held by the broker context so the id scheme stays a swappable
/// collaborator rather than an ambient global.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdGen;

impl IdGen {
    /// Create a generator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// A fresh pipe id.
    #[must_use]
    pub fn pipe_id(&self) -> String {
        let mut buf = [0u8; PIPE_ID_BYTES];
        rand::rng().fill_bytes(&mut buf);
        URL_SAFE_NO_PAD.encode(buf)
    }

    /// A fresh session id.
    #[must_use]
    pub fn session_id(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// A fresh password salt (16 random bytes, url-safe base64).
    #[must_use]
    pub fn salt(&self) -> String {
        let mut buf = [0u8; 16];
        rand::rng().fill_bytes(&mut buf);
        URL_SAFE_NO_PAD.encode(buf)
    }
}
