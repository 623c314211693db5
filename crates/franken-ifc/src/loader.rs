//! Document and script loader hooks.
//!
//! The HTML loader reports every parsed script source (flagging policy
//! manifests) and every event-handler attribute that names a trust context.

use crate::context::IfcContext;
use crate::events::{IfcComponent, IfcEventOutcome, IfcEventType};
use crate::label::Label;
use crate::origin_registry::PutOutcome;
use crate::policy::PolicyError;

/// Split a trust-context attribute value into origins. Commas and ASCII
/// whitespace both separate entries.
pub fn parse_trust_context(value: &str) -> Vec<&str> {
    value
        .split(|c: char| c == ',' || c.is_ascii_whitespace())
        .filter(|origin| !origin.is_empty())
        .collect()
}

impl IfcContext {
    /// A `<script src>` was parsed.
    pub fn on_script_source(&mut self, url: &str, is_policy_manifest: bool) -> PutOutcome {
        let outcome = self.register_origin(url, is_policy_manifest);
        if let Some(label) = outcome.label() {
            let event = self
                .events
                .event(
                    IfcComponent::Loader,
                    IfcEventType::OriginRegistered,
                    IfcEventOutcome::Pass,
                )
                .with_subject(url)
                .with_label(label);
            self.record(event);
        }
        outcome
    }

    /// An event-handler attribute naming a trust context was parsed.
    pub fn on_trust_context_attribute(&mut self, value: &str) -> Result<Label, PolicyError> {
        let origins = parse_trust_context(value);
        self.set_event_context(&origins)
    }
}
