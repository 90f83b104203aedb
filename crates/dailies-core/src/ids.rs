//! Identifiers shared across the scheduler and its collaborators.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of a playhead (a logical cursor over a timeline that supplies
/// frames for display). Compare modes spawn several child playheads; each
/// gets its own identity and its own frame queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayheadId(Uuid);

impl PlayheadId {
    /// Generate a fresh identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PlayheadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a pluggable collaborator (overlay, annotation or colour
/// pipeline plugin) that contributes per-frame blind data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollaboratorId(Uuid);

impl CollaboratorId {
    /// Generate a fresh identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CollaboratorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
