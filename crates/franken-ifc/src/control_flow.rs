//! Control-flow label stack.
//!
//! Tracks the program-counter label: the join of every label that could
//! have influenced reaching the current instruction. The interpreter pushes
//! a frame when it enters a region with several successors (conditional
//! branch, call, loop, exception-protected region) and pops it when control
//! reaches that region's immediate post-dominator, so implicit-flow taint is
//! bounded to the branch's dynamic extent.
//!
//! Frames live in a `Vec` arena. Index 0 is a sentinel whose post-dominator
//! is `-1`; no instruction has that address, so it is never a pop target and
//! [`ControlFlowLabelStack::pop`] refuses to remove it.
//!
//! Push/pop pairing is the caller's contract and is not checked here.

use serde::{Deserialize, Serialize};

use crate::label::Label;

/// Post-dominator location of the sentinel frame.
pub const SENTINEL_LOCATION: i64 = -1;

/// Post-dominator of a script's top-level frame: past the last instruction.
/// Exceptional unwinding never crosses a frame at this location.
pub const SCRIPT_EXIT_LOCATION: i64 = i64::MAX;

/// Interpreter register holding a branch's guard value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegisterId(pub u32);

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// One live control-flow region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFlowFrame {
    pub label: Label,
    /// Bytecode offset of the region's immediate post-dominator.
    pub post_dominator: i64,
    pub guard_register: Option<RegisterId>,
    /// The enclosing function installs an exception handler.
    pub has_exception_handler: bool,
    pub is_exception_edge: bool,
    pub is_branch_edge: bool,
    pub is_loop_edge: bool,
}

impl ControlFlowFrame {
    fn sentinel() -> Self {
        Self {
            label: Label::PUBLIC,
            post_dominator: SENTINEL_LOCATION,
            guard_register: None,
            has_exception_handler: false,
            is_exception_edge: false,
            is_branch_edge: false,
            is_loop_edge: false,
        }
    }
}

/// Description of a frame to push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameEntry {
    pub label: Label,
    pub post_dominator: i64,
    pub guard_register: Option<RegisterId>,
    pub has_exception_handler: bool,
    pub is_exception_edge: bool,
    pub is_branch_edge: bool,
    /// `None` inherits the loop flag of the frame being pushed onto.
    pub is_loop_edge: Option<bool>,
}

impl FrameEntry {
    pub fn new(label: Label, post_dominator: i64) -> Self {
        Self {
            label,
            post_dominator,
            guard_register: None,
            has_exception_handler: false,
            is_exception_edge: false,
            is_branch_edge: false,
            is_loop_edge: None,
        }
    }

    /// Conditional-branch region guarded by `register`.
    pub fn branch(label: Label, post_dominator: i64, register: Option<RegisterId>) -> Self {
        Self {
            guard_register: register,
            is_branch_edge: true,
            ..Self::new(label, post_dominator)
        }
    }

    pub fn with_register(mut self, register: RegisterId) -> Self {
        self.guard_register = Some(register);
        self
    }

    pub fn with_exception_handler(mut self, has_handler: bool) -> Self {
        self.has_exception_handler = has_handler;
        self
    }

    pub fn with_exception_edge(mut self, is_exception_edge: bool) -> Self {
        self.is_exception_edge = is_exception_edge;
        self
    }

    pub fn with_branch(mut self, is_branch: bool) -> Self {
        self.is_branch_edge = is_branch;
        self
    }

    pub fn with_loop(mut self, is_loop: bool) -> Self {
        self.is_loop_edge = Some(is_loop);
        self
    }
}

// ---------------------------------------------------------------------------
// Stack
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFlowLabelStack {
    frames: Vec<ControlFlowFrame>,
}

impl Default for ControlFlowLabelStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlFlowLabelStack {
    pub fn new() -> Self {
        Self {
            frames: vec![ControlFlowFrame::sentinel()],
        }
    }

    /// Number of frames above the sentinel.
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    /// All frames, sentinel first.
    pub fn frames(&self) -> &[ControlFlowFrame] {
        &self.frames
    }

    fn top(&self) -> &ControlFlowFrame {
        // The sentinel is never removed, so the arena is never empty.
        &self.frames[self.frames.len() - 1]
    }

    fn top_mut(&mut self) -> &mut ControlFlowFrame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Enter a region. The new frame's label is the join of the current
    /// head and `entry.label`.
    pub fn push(&mut self, entry: FrameEntry) {
        let current = *self.top();
        self.frames.push(ControlFlowFrame {
            label: current.label.join(entry.label),
            post_dominator: entry.post_dominator,
            guard_register: entry.guard_register,
            has_exception_handler: entry.has_exception_handler,
            is_exception_edge: entry.is_exception_edge,
            is_branch_edge: entry.is_branch_edge,
            is_loop_edge: entry.is_loop_edge.unwrap_or(current.is_loop_edge),
        });
    }

    /// Like [`Self::push`], but the sources in `revoked` are not inherited
    /// from the current head. `entry.label` itself is kept whole.
    pub fn push_without(&mut self, entry: FrameEntry, revoked: Label) {
        let current = *self.top();
        self.push(entry);
        self.top_mut().label = current.label.without(revoked).join(entry.label);
    }

    /// Leave the innermost region. No-op at depth 0.
    pub fn pop(&mut self) -> Option<ControlFlowFrame> {
        if self.depth() == 0 {
            return None;
        }
        self.frames.pop()
    }

    /// Pop every frame, innermost first, whose post-dominator is `location`.
    /// Returns the number of frames removed.
    pub fn pop_at(&mut self, location: i64) -> usize {
        let mut popped = 0;
        while self.depth() > 0 && self.top().post_dominator == location {
            self.frames.pop();
            popped += 1;
        }
        popped
    }

    /// Pop the frames above the nearest exception-edge frame, leaving that
    /// frame as the head. The innermost script frame bounds the unwind: an
    /// exception with no handler inside the running script stops there.
    /// Without either, everything down to the sentinel is removed. Returns
    /// the number of frames removed.
    pub fn unwind_to_exception_edge(&mut self) -> usize {
        let target = self
            .frames
            .iter()
            .rposition(|frame| {
                frame.is_exception_edge || frame.post_dominator == SCRIPT_EXIT_LOCATION
            })
            .unwrap_or(0);
        let popped = self.frames.len() - 1 - target;
        self.frames.truncate(target + 1);
        popped
    }

    /// Join `label` into the head frame without pushing.
    pub fn join(&mut self, label: Label) {
        let top = self.top_mut();
        top.label = top.label.join(label);
    }

    /// Join and overwrite the head's handler flags.
    pub fn join_handlers(
        &mut self,
        label: Label,
        is_function_handler: bool,
        is_exception_handler: bool,
    ) {
        let top = self.top_mut();
        top.label = top.label.join(label);
        top.has_exception_handler = is_function_handler;
        top.is_exception_edge = is_exception_handler;
    }

    /// Join and overwrite the head's branch flag.
    pub fn join_branch(&mut self, label: Label, is_branch: bool) {
        let top = self.top_mut();
        top.label = top.label.join(label);
        top.is_branch_edge = is_branch;
    }

    /// Effective program-counter label.
    pub fn head(&self) -> Label {
        self.top().label
    }

    /// Post-dominator location of the head frame.
    pub fn loc(&self) -> i64 {
        self.top().post_dominator
    }

    pub fn reg(&self) -> Option<RegisterId> {
        self.top().guard_register
    }

    pub fn fun_handler(&self) -> bool {
        self.top().has_exception_handler
    }

    pub fn exc_handler(&self) -> bool {
        self.top().is_exception_edge
    }

    pub fn branch_flag(&self) -> bool {
        self.top().is_branch_edge
    }

    pub fn is_loop(&self) -> bool {
        self.top().is_loop_edge
    }

    pub fn set_loop(&mut self, is_loop: bool) {
        self.top_mut().is_loop_edge = is_loop;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stack_is_sentinel_only() {
        let stack = ControlFlowLabelStack::new();
        assert_eq!(stack.depth(), 0);
        assert_eq!(stack.head(), Label::PUBLIC);
        assert_eq!(stack.loc(), SENTINEL_LOCATION);
        assert_eq!(stack.reg(), None);
    }

    #[test]
    fn push_joins_with_enclosing_label() {
        let mut stack = ControlFlowLabelStack::new();
        stack.push(FrameEntry::new(Label::from_bits(0b100), 10));
        stack.push(FrameEntry::new(Label::from_bits(0b1000), 8));
        assert_eq!(stack.head().value(), 0b1100);
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.loc(), 8);
    }

    #[test]
    fn push_n_pop_n_restores_head() {
        let mut stack = ControlFlowLabelStack::new();
        stack.join(Label::from_bits(0b10));
        let before = stack.head();
        for offset in 0..5 {
            stack.push(FrameEntry::new(Label::for_slot(offset + 3), offset as i64));
        }
        for _ in 0..5 {
            assert!(stack.pop().is_some());
        }
        assert_eq!(stack.head(), before);
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn pop_never_removes_sentinel() {
        let mut stack = ControlFlowLabelStack::new();
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.frames().len(), 1);
    }

    #[test]
    fn join_keeps_depth() {
        let mut stack = ControlFlowLabelStack::new();
        stack.push(FrameEntry::new(Label::PUBLIC, 4));
        stack.join(Label::SECRET);
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.head(), Label::SECRET);
        stack.join_handlers(Label::PUBLIC, true, true);
        assert!(stack.fun_handler());
        assert!(stack.exc_handler());
        stack.join_branch(Label::PUBLIC, true);
        assert!(stack.branch_flag());
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn loop_flag_is_inherited_unless_overridden() {
        let mut stack = ControlFlowLabelStack::new();
        stack.push(FrameEntry::new(Label::PUBLIC, 20).with_loop(true));
        stack.push(FrameEntry::new(Label::PUBLIC, 12));
        assert!(stack.is_loop());
        stack.push(FrameEntry::new(Label::PUBLIC, 11).with_loop(false));
        assert!(!stack.is_loop());
        stack.set_loop(true);
        assert!(stack.is_loop());
    }

    #[test]
    fn pop_at_closes_all_regions_sharing_a_post_dominator() {
        let mut stack = ControlFlowLabelStack::new();
        stack.push(FrameEntry::new(Label::SECRET, 30));
        stack.push(FrameEntry::new(Label::SECRET, 30));
        stack.push(FrameEntry::new(Label::SECRET, 25));
        assert_eq!(stack.pop_at(30), 0);
        assert_eq!(stack.pop_at(25), 1);
        assert_eq!(stack.pop_at(30), 2);
        assert_eq!(stack.pop_at(SENTINEL_LOCATION), 0);
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn unwind_stops_at_exception_edge() {
        let mut stack = ControlFlowLabelStack::new();
        stack.push(FrameEntry::new(Label::PUBLIC, 50).with_exception_edge(true));
        stack.push(FrameEntry::branch(Label::SECRET, 40, Some(RegisterId(3))));
        stack.push(FrameEntry::new(Label::for_slot(4), 35));
        assert_eq!(stack.unwind_to_exception_edge(), 2);
        assert!(stack.exc_handler());
        assert_eq!(stack.depth(), 1);

        let mut bare = ControlFlowLabelStack::new();
        bare.push(FrameEntry::new(Label::SECRET, 3));
        assert_eq!(bare.unwind_to_exception_edge(), 1);
        assert_eq!(bare.depth(), 0);
    }

    #[test]
    fn unwind_never_crosses_a_script_frame() {
        let mut stack = ControlFlowLabelStack::new();
        stack.push(FrameEntry::new(Label::PUBLIC, 90).with_exception_edge(true));
        stack.push(FrameEntry::new(Label::SECRET, SCRIPT_EXIT_LOCATION));
        stack.push(FrameEntry::new(Label::for_slot(4), 12));
        assert_eq!(stack.unwind_to_exception_edge(), 1);
        assert_eq!(stack.loc(), SCRIPT_EXIT_LOCATION);
        assert_eq!(stack.unwind_to_exception_edge(), 0);
        assert_eq!(stack.depth(), 2);
    }

    #[test]
    fn push_without_drops_revoked_sources_from_inherited_label() {
        let mut stack = ControlFlowLabelStack::new();
        stack.push(FrameEntry::new(Label::POLICY.join(Label::SECRET), 40));
        stack.push_without(FrameEntry::new(Label::for_slot(3), 30), Label::POLICY);
        assert_eq!(stack.head().value(), 0b110);
        stack.push_without(FrameEntry::new(Label::POLICY, 20), Label::POLICY);
        assert_eq!(stack.head().value(), 0b111);
        stack.pop();
        stack.pop();
        assert_eq!(stack.head().value(), 0b011);
    }

    #[test]
    fn branch_entry_records_register() {
        let mut stack = ControlFlowLabelStack::new();
        stack.push(FrameEntry::branch(Label::SECRET, 9, Some(RegisterId(7))));
        assert_eq!(stack.reg(), Some(RegisterId(7)));
        assert!(stack.branch_flag());
    }
}
