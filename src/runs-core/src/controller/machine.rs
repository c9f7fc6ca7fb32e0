// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Run lifecycle state machine.
//!
//! Every state change the registry makes goes through [`RunState::next`],
//! so invalid transitions (e.g. loading a run that was never requested)
//! leave the state untouched instead of corrupting it.

use std::fmt;

/// Events that can move a run between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEvent {
    /// First seen by a directory scan
    Observed,
    /// Enable requested; accumulator construction is about to start
    EnableRequested,
    /// Accumulator installed in the registry
    Loaded,
    /// Accumulator construction failed
    LoadFailed,
    /// Disable requested; accumulator dropped
    DisableRequested,
    /// Backing directory is gone
    Vanished,
}

/// Lifecycle state of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Unknown,
    Disabled,
    Enabling,
    Enabled,
    Removed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Disabled => write!(f, "Disabled"),
            Self::Enabling => write!(f, "Enabling"),
            Self::Enabled => write!(f, "Enabled"),
            Self::Removed => write!(f, "Removed"),
        }
    }
}

impl RunState {
    /// Whether a run in this state may hold an accumulator.
    pub fn holds_accumulator(&self) -> bool {
        matches!(self, Self::Enabling | Self::Enabled)
    }

    /// Determine the next state for `event`, or `None` if the transition
    /// is not allowed from the current state.
    pub fn next(&self, event: RunEvent) -> Option<RunState> {
        match (self, event) {
            (Self::Unknown | Self::Removed, RunEvent::Observed) => Some(Self::Disabled),

            // A run can be requested by name before any scan has seen it.
            (Self::Unknown | Self::Disabled | Self::Removed, RunEvent::EnableRequested) => {
                Some(Self::Enabling)
            }
            // Replacing the accumulator of a loaded run (path conflict).
            (Self::Enabled, RunEvent::EnableRequested) => Some(Self::Enabling),

            (Self::Enabling, RunEvent::Loaded) => Some(Self::Enabled),
            (Self::Enabling, RunEvent::LoadFailed) => Some(Self::Disabled),

            (Self::Enabling | Self::Enabled, RunEvent::DisableRequested) => Some(Self::Disabled),

            (Self::Disabled | Self::Enabling | Self::Enabled, RunEvent::Vanished) => {
                Some(Self::Removed)
            }

            _ => None,
        }
    }

    /// Apply `event` in place. Returns true if a transition occurred.
    pub fn apply(&mut self, event: RunEvent) -> bool {
        match self.next(event) {
            Some(state) => {
                *self = state;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_lifecycle() {
        let mut state = RunState::default();
        assert!(state.apply(RunEvent::Observed));
        assert_eq!(state, RunState::Disabled);

        assert!(state.apply(RunEvent::EnableRequested));
        assert_eq!(state, RunState::Enabling);
        assert!(state.holds_accumulator());

        assert!(state.apply(RunEvent::Loaded));
        assert_eq!(state, RunState::Enabled);

        assert!(state.apply(RunEvent::DisableRequested));
        assert_eq!(state, RunState::Disabled);

        assert!(state.apply(RunEvent::Vanished));
        assert_eq!(state, RunState::Removed);
        assert!(!state.holds_accumulator());
    }

    #[test]
    fn test_failed_load_returns_to_disabled() {
        let mut state = RunState::Disabled;
        state.apply(RunEvent::EnableRequested);
        assert!(state.apply(RunEvent::LoadFailed));
        assert_eq!(state, RunState::Disabled);
    }

    #[test]
    fn test_removed_run_can_reappear() {
        let mut state = RunState::Removed;
        assert!(state.apply(RunEvent::Observed));
        assert_eq!(state, RunState::Disabled);
    }

    #[test]
    fn test_invalid_transitions_keep_state() {
        let mut state = RunState::Disabled;
        assert!(!state.apply(RunEvent::Loaded));
        assert!(!state.apply(RunEvent::DisableRequested));
        assert!(!state.apply(RunEvent::Observed));
        assert_eq!(state, RunState::Disabled);

        let mut removed = RunState::Removed;
        assert!(!removed.apply(RunEvent::Vanished));
        assert_eq!(removed, RunState::Removed);
    }
}
