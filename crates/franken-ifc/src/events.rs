//! Structured IFC events with stable observability keys.
//!
//! Every diagnostic the layer emits (capacity exhaustion, blocked upgrades,
//! refused policy operations) is recorded as an [`IfcEvent`] in the owning
//! context's [`EventLog`]. The log digest is deterministic so two replays of
//! the same script can be compared byte for byte.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::label::Label;

pub const FE_IFC_REGISTRY_FULL: &str = "FE-IFC-0001";
pub const FE_IFC_BIT_TABLE_FULL: &str = "FE-IFC-0002";
pub const FE_IFC_NSU_VIOLATION: &str = "FE-IFC-0003";
pub const FE_IFC_NOT_POLICY_CONTEXT: &str = "FE-IFC-0004";
pub const FE_IFC_NO_RUNNING_SCRIPT: &str = "FE-IFC-0005";
pub const FE_IFC_INVALID_NAME: &str = "FE-IFC-0006";

/// Which subsystem emitted the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IfcComponent {
    OriginRegistry,
    DeclassificationTable,
    ControlFlowStack,
    Policy,
    Loader,
}

impl IfcComponent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OriginRegistry => "origin_registry",
            Self::DeclassificationTable => "declassification_table",
            Self::ControlFlowStack => "control_flow_stack",
            Self::Policy => "policy",
            Self::Loader => "loader",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IfcEventType {
    OriginRegistered,
    PolicyOriginRegistered,
    CapabilityRecorded,
    LabelAssigned,
    LabelUpgraded,
    EventContextUpdated,
    ScriptEntered,
    ScriptExited,
    ExceptionUnwound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IfcEventOutcome {
    Pass,
    Dropped,
    Fallback,
    Denied,
    Blocked,
}

/// One structured event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IfcEvent {
    pub trace_id: String,
    pub component: IfcComponent,
    pub event: IfcEventType,
    pub outcome: IfcEventOutcome,
    pub error_code: Option<String>,
    /// Origin or capability name the event is about, if any.
    pub subject: Option<String>,
    pub label: Option<Label>,
    pub pc: Option<Label>,
}

impl IfcEvent {
    pub fn new(
        trace_id: &str,
        component: IfcComponent,
        event: IfcEventType,
        outcome: IfcEventOutcome,
    ) -> Self {
        Self {
            trace_id: trace_id.to_string(),
            component,
            event,
            outcome,
            error_code: None,
            subject: None,
            label: None,
            pc: None,
        }
    }

    pub fn with_error_code(mut self, code: &str) -> Self {
        self.error_code = Some(code.to_string());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_pc(mut self, pc: Label) -> Self {
        self.pc = Some(pc);
        self
    }

    pub fn is_diagnostic(&self) -> bool {
        self.error_code.is_some()
    }
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// Append-only event sink owned by one execution context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    trace_id: String,
    events: Vec<IfcEvent>,
}

impl EventLog {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            events: Vec::new(),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Start an event stamped with this log's trace id.
    pub fn event(
        &self,
        component: IfcComponent,
        event: IfcEventType,
        outcome: IfcEventOutcome,
    ) -> IfcEvent {
        IfcEvent::new(&self.trace_id, component, event, outcome)
    }

    pub fn push(&mut self, event: IfcEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[IfcEvent] {
        &self.events
    }

    pub fn last(&self) -> Option<&IfcEvent> {
        self.events.last()
    }

    pub fn diagnostics(&self) -> impl Iterator<Item = &IfcEvent> {
        self.events.iter().filter(|event| event.is_diagnostic())
    }

    pub fn drain_events(&mut self) -> Vec<IfcEvent> {
        std::mem::take(&mut self.events)
    }

    /// Hex SHA-256 over the JSON encoding of every recorded event.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for event in &self.events {
            // Serializing plain structs and enums cannot fail.
            let bytes = serde_json::to_vec(event).unwrap_or_default();
            hasher.update((bytes.len() as u64).to_be_bytes());
            hasher.update(&bytes);
        }
        hex::encode(hasher.finalize())
    }
}
