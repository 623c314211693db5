#![forbid(unsafe_code)]
//! Dynamic information-flow control for the FrankenEngine JavaScript
//! runtime.
//!
//! The interpreter owns one [`IfcContext`] per global object and drives it
//! from its control-flow graph: a frame is pushed on every multi-successor
//! region and popped at the region's immediate post-dominator, so the
//! program-counter label always covers exactly the branches that could have
//! influenced the current instruction. Script and DOM code reach the
//! context through the policy primitives (label assignment, NSU-checked
//! upgrade, event-context scoping).

pub mod config;
pub mod context;
pub mod control_flow;
pub mod declassification;
pub mod dom_labels;
pub mod events;
pub mod instrumentation;
pub mod label;
pub mod labeled;
pub mod loader;
pub mod origin_registry;
pub mod policy;
pub mod security_state;

pub use config::IfcConfig;
pub use context::IfcContext;
pub use control_flow::{ControlFlowLabelStack, FrameEntry, RegisterId};
pub use instrumentation::ControlFlowEvent;
pub use label::{EnforcementMode, Label, nsu_permits};
pub use labeled::{LabelTarget, LabeledValue};
pub use policy::{OriginHint, PolicyError};
