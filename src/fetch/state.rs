//! Per-extension fetch state machine
//!
//! ```text
//! Unknown ──> Fresh                          (cache hit)
//! Unknown ──> Stale ──> Evaluating ──> Fresh (re-evaluated)
//!                  \            \
//!                   └──> Failed  └──> Failed
//! ```
//!
//! A cancelled evaluation falls back from `Evaluating` to `Stale`.

use crate::error::{ModexError, ModexResult};
use crate::extension::ExtensionId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::trace;

/// Fetch state of one extension identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionState {
    Unknown,
    Stale,
    Evaluating,
    Fresh,
    Failed,
}

impl ExtensionState {
    fn can_move_to(self, next: Self) -> bool {
        use ExtensionState::*;
        matches!(
            (self, next),
            (Unknown, Fresh)
                | (Unknown, Stale)
                | (Unknown, Failed)
                | (Stale, Evaluating)
                | (Stale, Failed)
                | (Evaluating, Fresh)
                | (Evaluating, Failed)
                | (Evaluating, Stale)
        )
    }
}

impl fmt::Display for ExtensionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Stale => "stale",
            Self::Evaluating => "evaluating",
            Self::Fresh => "fresh",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// States of all extensions in one fetch
#[derive(Debug, Default)]
pub struct StateTracker {
    states: BTreeMap<ExtensionId, ExtensionState>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ExtensionId) -> ExtensionState {
        self.states
            .get(id)
            .copied()
            .unwrap_or(ExtensionState::Unknown)
    }

    /// Move `id` to `next`, rejecting transitions the state machine lacks
    pub fn transition(&mut self, id: &ExtensionId, next: ExtensionState) -> ModexResult<()> {
        let current = self.get(id);
        if !current.can_move_to(next) {
            return Err(ModexError::Internal(format!(
                "invalid state transition for {}: {} -> {}",
                id, current, next
            )));
        }
        trace!(extension = %id, "{} -> {}", current, next);
        self.states.insert(id.clone(), next);
        Ok(())
    }

    pub fn into_states(self) -> BTreeMap<ExtensionId, ExtensionState> {
        self.states
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> ExtensionId {
        ExtensionId::parse("ext.toml%ext", "").unwrap()
    }

    #[test]
    fn cache_hit_path() {
        let mut tracker = StateTracker::new();
        assert_eq!(tracker.get(&id()), ExtensionState::Unknown);
        tracker.transition(&id(), ExtensionState::Fresh).unwrap();
        assert_eq!(tracker.get(&id()), ExtensionState::Fresh);
    }

    #[test]
    fn evaluation_path() {
        let mut tracker = StateTracker::new();
        tracker.transition(&id(), ExtensionState::Stale).unwrap();
        tracker.transition(&id(), ExtensionState::Evaluating).unwrap();
        tracker.transition(&id(), ExtensionState::Fresh).unwrap();
        assert_eq!(tracker.into_states()[&id()], ExtensionState::Fresh);
    }

    #[test]
    fn rejects_skipping_evaluation() {
        let mut tracker = StateTracker::new();
        tracker.transition(&id(), ExtensionState::Stale).unwrap();
        assert!(tracker.transition(&id(), ExtensionState::Fresh).is_err());
        assert!(tracker.transition(&id(), ExtensionState::Unknown).is_err());
    }
}
