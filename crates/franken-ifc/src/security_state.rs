//! Per-context security globals.
//!
//! Holds the labels the interpreter and DOM layer read outside the
//! control-flow stack: the mirrored program-counter label, the label of the
//! last function return, the event-node and event-context labels, labels of
//! call arguments, the abort latch and the NSU enforcement mode.

use serde::{Deserialize, Serialize};

use crate::label::{EnforcementMode, Label};

/// Number of per-argument label slots.
pub const MAX_ARGUMENT_LABELS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum StateError {
    #[error("argument index {index} exceeds the {capacity} label slots")]
    ArgumentOutOfRange { index: usize, capacity: usize },
}

impl StateError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ArgumentOutOfRange { .. } => "argument_out_of_range",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityState {
    pc: Label,
    return_label: Label,
    event_node_label: Label,
    event_context_label: Label,
    argument_labels: [Label; MAX_ARGUMENT_LABELS],
    abort: bool,
    mode: EnforcementMode,
}

impl Default for SecurityState {
    fn default() -> Self {
        Self::new(EnforcementMode::Enforce)
    }
}

impl SecurityState {
    pub fn new(mode: EnforcementMode) -> Self {
        Self {
            pc: Label::PUBLIC,
            return_label: Label::PUBLIC,
            event_node_label: Label::PUBLIC,
            event_context_label: Label::PUBLIC,
            argument_labels: [Label::PUBLIC; MAX_ARGUMENT_LABELS],
            abort: false,
            mode,
        }
    }

    pub fn pc(&self) -> Label {
        self.pc
    }

    /// Mirror the control-flow stack head.
    pub(crate) fn sync_pc(&mut self, pc: Label) {
        self.pc = pc;
    }

    pub fn mode(&self) -> EnforcementMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: EnforcementMode) {
        self.mode = mode;
    }

    pub fn return_label(&self) -> Label {
        self.return_label
    }

    pub fn set_return_label(&mut self, label: Label) {
        self.return_label = label;
    }

    pub fn event_node_label(&self) -> Label {
        self.event_node_label
    }

    pub fn set_event_node_label(&mut self, label: Label) {
        self.event_node_label = label;
    }

    pub fn event_context_label(&self) -> Label {
        self.event_context_label
    }

    pub fn set_event_context_label(&mut self, label: Label) {
        self.event_context_label = label;
    }

    pub fn argument_label(&self, index: usize) -> Result<Label, StateError> {
        self.argument_labels
            .get(index)
            .copied()
            .ok_or(StateError::ArgumentOutOfRange {
                index,
                capacity: MAX_ARGUMENT_LABELS,
            })
    }

    pub fn set_argument_label(&mut self, index: usize, label: Label) -> Result<(), StateError> {
        let slot = self
            .argument_labels
            .get_mut(index)
            .ok_or(StateError::ArgumentOutOfRange {
                index,
                capacity: MAX_ARGUMENT_LABELS,
            })?;
        *slot = label;
        Ok(())
    }

    pub fn argument_labels(&self) -> &[Label] {
        &self.argument_labels
    }

    /// Reset every argument slot to public, before a new call.
    pub fn clear_argument_labels(&mut self) {
        self.argument_labels = [Label::PUBLIC; MAX_ARGUMENT_LABELS];
    }

    pub fn abort_requested(&self) -> bool {
        self.abort
    }

    pub(crate) fn request_abort(&mut self) {
        self.abort = true;
    }

    /// Acknowledge a blocked upgrade once the host has acted on it.
    pub fn clear_abort(&mut self) -> bool {
        std::mem::take(&mut self.abort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_public_and_enforcing() {
        let state = SecurityState::default();
        assert_eq!(state.pc(), Label::PUBLIC);
        assert!(state.mode().is_enforcing());
        assert!(!state.abort_requested());
        assert!(state.argument_labels().iter().all(|label| label.is_public()));
    }

    #[test]
    fn argument_slots_are_bounded() {
        let mut state = SecurityState::default();
        state
            .set_argument_label(MAX_ARGUMENT_LABELS - 1, Label::SECRET)
            .expect("last slot");
        assert_eq!(
            state.argument_label(MAX_ARGUMENT_LABELS - 1),
            Ok(Label::SECRET)
        );
        let err = state
            .set_argument_label(MAX_ARGUMENT_LABELS, Label::SECRET)
            .expect_err("out of range");
        assert_eq!(err.error_code(), "argument_out_of_range");
        state.clear_argument_labels();
        assert_eq!(
            state.argument_label(MAX_ARGUMENT_LABELS - 1),
            Ok(Label::PUBLIC)
        );
    }

    #[test]
    fn abort_latch_clears_once() {
        let mut state = SecurityState::default();
        state.request_abort();
        assert!(state.abort_requested());
        assert!(state.clear_abort());
        assert!(!state.clear_abort());
    }
}
