//! Interpreter-facing hooks that keep the label stack in step with the
//! control-flow graph.
//!
//! The interpreter calls these at every multi-successor region entry and at
//! every arrival on a post-dominator. Post-dominator offsets are computed by
//! the bytecode compiler and passed in unchanged.
//!
//! [`ControlFlowEvent`] is the serializable form of the same hooks, used for
//! trace replay.

use serde::{Deserialize, Serialize};

use crate::context::IfcContext;
use crate::control_flow::{FrameEntry, RegisterId};
use crate::events::{IfcComponent, IfcEventOutcome, IfcEventType};
use crate::label::Label;
use crate::policy::PolicyError;

pub use crate::control_flow::SCRIPT_EXIT_LOCATION;

/// One instrumentation hook invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlFlowEvent {
    EnterScript {
        url: String,
    },
    ExitScript,
    Branch {
        condition: Label,
        post_dominator: i64,
        #[serde(default)]
        register: Option<RegisterId>,
    },
    Call {
        callee: Label,
        return_location: i64,
        #[serde(default)]
        has_exception_handler: bool,
    },
    LoopHeader {
        condition: Label,
        exit_location: i64,
    },
    ExceptionRegion {
        post_dominator: i64,
    },
    Reach {
        location: i64,
    },
    Throw {
        #[serde(default)]
        exception: Label,
    },
    Return {
        value: Label,
    },
    Join {
        label: Label,
    },
    /// Write into a location currently labeled `existing`.
    Write {
        existing: Label,
        value: Label,
    },
}

impl IfcContext {
    /// Start executing the script loaded from `url`.
    ///
    /// Scripts from a policy origin run with the policy label joined into
    /// the pc. Other scripts get their origin registered and never inherit
    /// the policy source from a policy script that started them; any other
    /// taint on the pc carries over.
    pub fn enter_script(&mut self, url: &str) -> Label {
        let frame = FrameEntry::new(Label::PUBLIC, SCRIPT_EXIT_LOCATION);
        if self.registry.is_policy_origin(url) {
            self.stack.push(FrameEntry {
                label: Label::POLICY,
                ..frame
            });
        } else {
            self.origin_label(url);
            self.stack.push_without(frame, Label::POLICY);
        }
        self.running_scripts.push(url.to_string());
        let pc = self.sync_pc();

        let event = self
            .events
            .event(
                IfcComponent::Loader,
                IfcEventType::ScriptEntered,
                IfcEventOutcome::Pass,
            )
            .with_subject(url)
            .with_pc(pc);
        self.record(event);
        pc
    }

    /// Finish the innermost script, discarding any frames it left open.
    pub fn exit_script(&mut self) -> Label {
        let Some(url) = self.running_scripts.pop() else {
            return self.program_counter();
        };
        while self.stack.depth() > 0 && self.stack.loc() != SCRIPT_EXIT_LOCATION {
            self.stack.pop();
        }
        self.stack.pop();
        let pc = self.sync_pc();

        let event = self
            .events
            .event(
                IfcComponent::Loader,
                IfcEventType::ScriptExited,
                IfcEventOutcome::Pass,
            )
            .with_subject(url)
            .with_pc(pc);
        self.record(event);
        pc
    }

    /// Conditional branch whose guard carries `condition`.
    pub fn on_branch(
        &mut self,
        condition: Label,
        post_dominator: i64,
        register: Option<RegisterId>,
    ) -> Label {
        let has_handler = self.stack.fun_handler();
        self.push(
            FrameEntry::branch(condition, post_dominator, register)
                .with_exception_handler(has_handler),
        )
    }

    /// Call into a function whose reference carries `callee`.
    pub fn on_call(
        &mut self,
        callee: Label,
        return_location: i64,
        has_exception_handler: bool,
    ) -> Label {
        self.push(
            FrameEntry::new(callee, return_location)
                .with_exception_handler(has_exception_handler)
                .with_loop(false),
        )
    }

    /// Loop header test. The first arrival pushes a loop frame; later
    /// iterations only join the new condition into it. Returns whether a
    /// frame was pushed.
    pub fn on_loop_header(&mut self, condition: Label, exit_location: i64) -> bool {
        if self.stack.is_loop() && self.stack.loc() == exit_location {
            self.join(condition);
            return false;
        }
        self.push(FrameEntry::branch(condition, exit_location, None).with_loop(true));
        true
    }

    /// Enter a `try` region whose handler ends at `post_dominator`.
    pub fn on_exception_region(&mut self, post_dominator: i64) -> Label {
        self.push(
            FrameEntry::new(Label::PUBLIC, post_dominator)
                .with_exception_edge(true)
                .with_exception_handler(true),
        )
    }

    /// Control reached `location`; close every region it post-dominates.
    pub fn on_reach(&mut self, location: i64) -> usize {
        let popped = self.stack.pop_at(location);
        self.sync_pc();
        popped
    }

    /// An exception was thrown. Frames up to the nearest handler inside
    /// the running script are discarded; the handler then runs under the
    /// label that governed the throw. Entering the handler consumes its
    /// exception edge, so a rethrow from the catch block unwinds past it.
    /// An uncaught exception stops at the script frame for `exit_script`.
    /// Returns the number of frames discarded.
    pub fn on_throw(&mut self, exception: Label) -> usize {
        let influence = self.stack.head().join(exception);
        let popped = self.stack.unwind_to_exception_edge();
        let caught = self.stack.exc_handler();
        if caught {
            let has_handler = self.stack.fun_handler();
            self.stack.join_handlers(influence, has_handler, false);
        }
        let pc = self.sync_pc();

        let outcome = if caught {
            IfcEventOutcome::Pass
        } else {
            IfcEventOutcome::Dropped
        };
        let mut event = self
            .events
            .event(
                IfcComponent::ControlFlowStack,
                IfcEventType::ExceptionUnwound,
                outcome,
            )
            .with_label(influence)
            .with_pc(pc);
        if let Some(script) = self.current_script() {
            event = event.with_subject(script);
        }
        self.record(event);
        popped
    }

    /// Record the label of a returned value; it carries the callee's pc.
    pub fn on_return(&mut self, value: Label) -> Label {
        let label = value.join(self.program_counter());
        self.state.set_return_label(label);
        label
    }

    /// Label an explicit write of `value` carries under the current pc.
    pub fn label_write(&self, value: Label) -> Label {
        value.join(self.program_counter())
    }

    /// NSU-checked explicit write: returns the label the location takes.
    pub fn checked_write(&mut self, existing: Label, value: Label) -> Result<Label, PolicyError> {
        self.guard_upgrade(existing)?;
        Ok(self.label_write(value))
    }

    /// Replay one hook. Returns the pc afterwards.
    pub fn apply(&mut self, event: &ControlFlowEvent) -> Result<Label, PolicyError> {
        match event {
            ControlFlowEvent::EnterScript { url } => {
                self.enter_script(url);
            }
            ControlFlowEvent::ExitScript => {
                self.exit_script();
            }
            ControlFlowEvent::Branch {
                condition,
                post_dominator,
                register,
            } => {
                self.on_branch(*condition, *post_dominator, *register);
            }
            ControlFlowEvent::Call {
                callee,
                return_location,
                has_exception_handler,
            } => {
                self.on_call(*callee, *return_location, *has_exception_handler);
            }
            ControlFlowEvent::LoopHeader {
                condition,
                exit_location,
            } => {
                self.on_loop_header(*condition, *exit_location);
            }
            ControlFlowEvent::ExceptionRegion { post_dominator } => {
                self.on_exception_region(*post_dominator);
            }
            ControlFlowEvent::Reach { location } => {
                self.on_reach(*location);
            }
            ControlFlowEvent::Throw { exception } => {
                self.on_throw(*exception);
            }
            ControlFlowEvent::Return { value } => {
                self.on_return(*value);
            }
            ControlFlowEvent::Join { label } => {
                self.join(*label);
            }
            ControlFlowEvent::Write { existing, value } => {
                self.checked_write(*existing, *value)?;
            }
        }
        Ok(self.program_counter())
    }
}
