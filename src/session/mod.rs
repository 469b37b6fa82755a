//! Tone sessions
//!
//! A session is one Stopped -> Playing -> ... -> Stopped run of the playback
//! controller. Every session gets a fresh id; captures and verification
//! reports carry it so results from an older session can be recognised and
//! dropped.

pub mod controller;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use controller::PlaybackController;

/// Unique identifier of one playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First block of the uuid is plenty for logs
        let s = self.0.to_string();
        write!(f, "{}", &s[..8])
    }
}
