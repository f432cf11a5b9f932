use std::sync::{Mutex, PoisonError};

/// A stamped in-flight request, handed out by [`LoadGuard::begin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    target: String,
}

impl LoadTicket {
    pub fn target(&self) -> &str {
        &self.target
    }
}

#[derive(Debug, Default)]
struct GuardState {
    generation: u64,
    target: Option<String>,
}

/// Tracks what a surface is currently loading so late responses can be
/// dropped.
///
/// In-flight requests are never cancelled. Each surface (detail view,
/// onboarding step, ...) owns one guard; every new request bumps the
/// generation and records its target id. A response is applied only if its
/// ticket is still the latest one *and* names the current target.
#[derive(Debug, Default)]
pub struct LoadGuard {
    state: Mutex<GuardState>,
}

impl LoadGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a request for `target`, superseding any earlier ticket.
    pub fn begin(&self, target: &str) -> LoadTicket {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.generation = state.generation.wrapping_add(1);
        state.target = Some(target.to_owned());
        LoadTicket {
            generation: state.generation,
            target: target.to_owned(),
        }
    }

    /// Whether a response for `ticket` may still be applied.
    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.generation == ticket.generation && state.target.as_deref() == Some(&ticket.target)
    }

    /// The surface closed or moved away; every outstanding ticket goes stale.
    pub fn release(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.generation = state.generation.wrapping_add(1);
        state.target = None;
    }

    pub fn current_target(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .target
            .clone()
    }
}
