//! Policy integration primitives exposed to scripts and DOM code.
//!
//! - [`IfcContext::assign_label`]: trusted policy code binds an origin label
//!   to a value.
//! - [`IfcContext::upgrade_label`]: raise a value's label to the running
//!   script's origin, guarded by the no-sensitive-upgrade check.
//! - [`IfcContext::set_event_context`]: policy code sets the label that
//!   event handlers run under.
//!
//! Violations never panic. They return a [`PolicyError`], emit a diagnostic
//! event, and for blocked upgrades also latch the abort flag so hosts that
//! poll instead of propagating still see them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::IfcContext;
use crate::events::{
    FE_IFC_NO_RUNNING_SCRIPT, FE_IFC_NOT_POLICY_CONTEXT, FE_IFC_NSU_VIOLATION, IfcComponent,
    IfcEventOutcome, IfcEventType,
};
use crate::label::{Label, nsu_permits};
use crate::labeled::LabelTarget;

/// Keyword naming the running script's own origin.
pub const CURRENT_SCRIPT_KEYWORD: &str = "self";

/// Where an assigned label comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginHint {
    CurrentScript,
    Origin(String),
}

impl OriginHint {
    pub fn parse(hint: &str) -> Self {
        if hint.trim() == CURRENT_SCRIPT_KEYWORD {
            Self::CurrentScript
        } else {
            Self::Origin(hint.to_string())
        }
    }
}

impl fmt::Display for OriginHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CurrentScript => f.write_str(CURRENT_SCRIPT_KEYWORD),
            Self::Origin(origin) => f.write_str(origin),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum PolicyError {
    #[error("operation requires the policy context, pc is {pc}")]
    NotPolicyContext { pc: Label },
    #[error("no-sensitive-upgrade violation: pc {pc} cannot upgrade a value labeled {label}")]
    NsuViolation { pc: Label, label: Label },
    #[error("no script is executing")]
    NoRunningScript,
}

impl PolicyError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotPolicyContext { .. } => FE_IFC_NOT_POLICY_CONTEXT,
            Self::NsuViolation { .. } => FE_IFC_NSU_VIOLATION,
            Self::NoRunningScript => FE_IFC_NO_RUNNING_SCRIPT,
        }
    }

    /// Whether the host should stop the running script.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::NsuViolation { .. })
    }
}

impl IfcContext {
    /// Bind `target` to the label of `hint`. Only policy code may do this.
    pub fn assign_label<T>(&mut self, target: &mut T, hint: &OriginHint) -> Result<Label, PolicyError>
    where
        T: LabelTarget + ?Sized,
    {
        self.require_policy_context(IfcEventType::LabelAssigned)?;
        let label = self.resolve_hint(hint, IfcEventType::LabelAssigned)?;
        target.set_label(label);
        if let Some(object_label) = target.object_label_mut() {
            *object_label = label;
        }

        let event = self
            .events
            .event(
                IfcComponent::Policy,
                IfcEventType::LabelAssigned,
                IfcEventOutcome::Pass,
            )
            .with_subject(hint.to_string())
            .with_label(label)
            .with_pc(self.program_counter());
        self.record(event);
        Ok(label)
    }

    /// Raise `target`'s label by the running script's origin label.
    ///
    /// The NSU check runs against the target's current label. On failure
    /// the target is left untouched and the abort flag is latched.
    pub fn upgrade_label<T>(&mut self, target: &mut T) -> Result<Label, PolicyError>
    where
        T: LabelTarget + ?Sized,
    {
        let origin_label = self.resolve_hint(&OriginHint::CurrentScript, IfcEventType::LabelUpgraded)?;
        let current = target.label();
        self.guard_upgrade(current)?;

        let upgraded = current.join(origin_label);
        target.set_label(upgraded);
        if let Some(object_label) = target.object_label_mut() {
            *object_label = object_label.join(origin_label);
        }

        let event = self
            .events
            .event(
                IfcComponent::Policy,
                IfcEventType::LabelUpgraded,
                IfcEventOutcome::Pass,
            )
            .with_label(upgraded)
            .with_pc(self.program_counter());
        self.record(event);
        Ok(upgraded)
    }

    /// NSU check of a write into a location currently labeled `existing`.
    pub fn guard_upgrade(&mut self, existing: Label) -> Result<(), PolicyError> {
        let pc = self.program_counter();
        if nsu_permits(pc, existing, self.state.mode()) {
            return Ok(());
        }
        self.state.request_abort();
        let event = self
            .events
            .event(
                IfcComponent::Policy,
                IfcEventType::LabelUpgraded,
                IfcEventOutcome::Blocked,
            )
            .with_error_code(FE_IFC_NSU_VIOLATION)
            .with_label(existing)
            .with_pc(pc);
        self.record(event);
        Err(PolicyError::NsuViolation {
            pc,
            label: existing,
        })
    }

    /// Join the labels of `origins` into the event-context label.
    ///
    /// Any origin resolving to the public label resets the context to
    /// public and stops accumulation.
    pub fn set_event_context<S>(&mut self, origins: &[S]) -> Result<Label, PolicyError>
    where
        S: AsRef<str>,
    {
        self.require_policy_context(IfcEventType::EventContextUpdated)?;
        let mut context_label = self.state.event_context_label();
        for origin in origins {
            let label = self.origin_label(origin.as_ref());
            if label.is_public() {
                context_label = Label::PUBLIC;
                break;
            }
            context_label = context_label.join(label);
        }
        self.state.set_event_context_label(context_label);

        let event = self
            .events
            .event(
                IfcComponent::Policy,
                IfcEventType::EventContextUpdated,
                IfcEventOutcome::Pass,
            )
            .with_label(context_label);
        self.record(event);
        Ok(context_label)
    }

    fn require_policy_context(&mut self, event_type: IfcEventType) -> Result<(), PolicyError> {
        let pc = self.program_counter();
        if pc == Label::POLICY {
            return Ok(());
        }
        let event = self
            .events
            .event(IfcComponent::Policy, event_type, IfcEventOutcome::Denied)
            .with_error_code(FE_IFC_NOT_POLICY_CONTEXT)
            .with_pc(pc);
        self.record(event);
        Err(PolicyError::NotPolicyContext { pc })
    }

    fn resolve_hint(
        &mut self,
        hint: &OriginHint,
        event_type: IfcEventType,
    ) -> Result<Label, PolicyError> {
        let origin = match hint {
            OriginHint::Origin(origin) => origin.clone(),
            OriginHint::CurrentScript => match self.current_script() {
                Some(script) => script.to_string(),
                None => {
                    let event = self
                        .events
                        .event(IfcComponent::Policy, event_type, IfcEventOutcome::Denied)
                        .with_error_code(FE_IFC_NO_RUNNING_SCRIPT);
                    self.record(event);
                    return Err(PolicyError::NoRunningScript);
                }
            },
        };
        Ok(self.origin_label(&origin))
    }
}
