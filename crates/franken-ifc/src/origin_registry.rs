//! Origin-to-label registry.
//!
//! Maps stable origin strings (script or document URLs reduced to a bare
//! domain) to single-bit [`Label`]s. The registry has 64 slots:
//!
//! | slot | key      | label   |
//! |------|----------|---------|
//! | 0    | `NULL`   | `0x0`   |
//! | 1    | `policy` | `0x1`   |
//! | 2    | `secret` | `0x2`   |
//! | 3..  | origins  | `1 << (slot - 1)` |
//!
//! Registration order determines bit assignment. Once all slots are taken,
//! new registrations are dropped and unknown origins resolve to the policy
//! label, so a saturated registry treats new origins as maximally sensitive.
//!
//! Policy origins live on a side list and consume no bit.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::events::{
    EventLog, FE_IFC_REGISTRY_FULL, IfcComponent, IfcEvent, IfcEventOutcome, IfcEventType,
};
use crate::label::Label;

/// Total slots, including the three reserved ones.
pub const REGISTRY_CAPACITY: usize = 64;
pub const NULL_SLOT: usize = 0;
pub const POLICY_SLOT: usize = 1;
pub const SECRET_SLOT: usize = 2;
/// First slot handed out to a registered origin.
pub const FIRST_ORIGIN_SLOT: usize = 3;

/// Keys of the reserved slots.
pub const NULL_ORIGIN_KEY: &str = "NULL";
pub const POLICY_ORIGIN_KEY: &str = "policy";
pub const SECRET_ORIGIN_KEY: &str = "secret";

// ---------------------------------------------------------------------------
// URL classification
// ---------------------------------------------------------------------------

/// Coarse classification of a raw URL string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginScheme {
    File,
    Http,
    About,
    Empty,
    Null,
    Unknown,
}

impl OriginScheme {
    /// Canonical string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Http => "http",
            Self::About => "about",
            Self::Empty => "",
            Self::Null => "NULL",
            Self::Unknown => "!",
        }
    }

    /// Schemes that stand for "no origin at all".
    pub fn is_null_like(self) -> bool {
        matches!(self, Self::Empty | Self::Null)
    }
}

impl fmt::Display for OriginScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Best-effort scheme classification of `url`.
pub fn filter(url: &str) -> OriginScheme {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return OriginScheme::Empty;
    }
    if trimmed.eq_ignore_ascii_case("null") {
        return OriginScheme::Null;
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("file:") {
        OriginScheme::File
    } else if lower.starts_with("http:") || lower.starts_with("https:") {
        OriginScheme::Http
    } else if lower.starts_with("about:") {
        OriginScheme::About
    } else {
        OriginScheme::Unknown
    }
}

/// Reduce `http://`, `https://` and scheme-relative `//` URLs to their bare
/// domain. Anything else is returned trimmed. Domains are case-insensitive,
/// so the result is lowercased.
pub fn extract_domain(url: &str) -> String {
    let trimmed = url.trim();
    let rest = ["http://", "https://", "//"]
        .iter()
        .find_map(|prefix| strip_prefix_ignore_case(trimmed, prefix));
    let domain = match rest {
        Some(rest) => {
            let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
            &rest[..end]
        }
        None => trimmed,
    };
    domain.to_ascii_lowercase()
}

/// Whether `url` names no origin at all: an empty or `NULL` scheme, or a
/// URL whose host is empty (`http://`, `https:///x`). Such URLs share the
/// null slot and never take a bit.
pub fn is_null_origin(url: &str) -> bool {
    filter(url).is_null_like() || extract_domain(url).is_empty()
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// One registry slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginEntry {
    pub origin_key: String,
    pub label: Label,
}

/// Result of [`OriginLabelRegistry::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PutOutcome {
    PolicyRegistered,
    PolicyAlreadyPresent,
    Registered { slot: usize, label: Label },
    AlreadyRegistered { slot: usize, label: Label },
    /// Registry full; nothing was recorded.
    Dropped,
}

impl PutOutcome {
    /// Label bound to the origin by this call, if any.
    pub fn label(self) -> Option<Label> {
        match self {
            Self::PolicyRegistered | Self::PolicyAlreadyPresent => Some(Label::POLICY),
            Self::Registered { label, .. } | Self::AlreadyRegistered { label, .. } => Some(label),
            Self::Dropped => None,
        }
    }
}

/// Per-context registry of origin labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginLabelRegistry {
    entries: Vec<OriginEntry>,
    policy_origins: Vec<String>,
    events: EventLog,
}

impl Default for OriginLabelRegistry {
    fn default() -> Self {
        Self::new("origin-registry")
    }
}

impl OriginLabelRegistry {
    pub fn new(trace_id: impl Into<String>) -> Self {
        let reserved = [
            (NULL_ORIGIN_KEY, NULL_SLOT),
            (POLICY_ORIGIN_KEY, POLICY_SLOT),
            (SECRET_ORIGIN_KEY, SECRET_SLOT),
        ];
        let mut entries = Vec::with_capacity(REGISTRY_CAPACITY);
        for (key, slot) in reserved {
            entries.push(OriginEntry {
                origin_key: key.to_string(),
                label: Label::for_slot(slot),
            });
        }
        Self {
            entries,
            policy_origins: Vec::new(),
            events: EventLog::new(trace_id),
        }
    }

    /// Number of occupied slots, reserved ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Never true: the reserved slots are always present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= REGISTRY_CAPACITY
    }

    /// Slots still available for new origins.
    pub fn remaining(&self) -> usize {
        REGISTRY_CAPACITY.saturating_sub(self.entries.len())
    }

    pub fn entries(&self) -> &[OriginEntry] {
        &self.entries
    }

    pub fn policy_origins(&self) -> &[String] {
        &self.policy_origins
    }

    pub fn events(&self) -> &[IfcEvent] {
        self.events.events()
    }

    pub fn drain_events(&mut self) -> Vec<IfcEvent> {
        self.events.drain_events()
    }

    /// Whether `url` names a registered policy origin, compared either
    /// verbatim or by bare domain.
    pub fn is_policy_origin(&self, url: &str) -> bool {
        let domain = extract_domain(url);
        self.policy_origins
            .iter()
            .any(|origin| {
                origin == url || (!domain.is_empty() && extract_domain(origin) == domain)
            })
    }

    /// Slot holding `url`'s bare domain, searching newest first.
    pub fn slot_of(&self, url: &str) -> Option<usize> {
        let key = extract_domain(url);
        self.entries
            .iter()
            .rposition(|entry| entry.origin_key == key)
    }

    /// Label of an already registered origin. Never registers.
    pub fn lookup(&self, url: &str) -> Option<Label> {
        if self.is_policy_origin(url) {
            return Some(Label::POLICY);
        }
        if is_null_origin(url) {
            return Some(Label::PUBLIC);
        }
        self.slot_of(url).map(|slot| self.entries[slot].label)
    }

    /// Record `url`. Policy origins go to the side list; everything else
    /// takes the next free bit unless already present.
    pub fn put(&mut self, url: &str, is_policy: bool) -> PutOutcome {
        if is_policy {
            if self.policy_origins.iter().any(|origin| origin == url) {
                return PutOutcome::PolicyAlreadyPresent;
            }
            self.policy_origins.push(url.to_string());
            let event = self
                .events
                .event(
                    IfcComponent::OriginRegistry,
                    IfcEventType::PolicyOriginRegistered,
                    IfcEventOutcome::Pass,
                )
                .with_subject(url)
                .with_label(Label::POLICY);
            self.events.push(event);
            return PutOutcome::PolicyRegistered;
        }

        if is_null_origin(url) {
            return PutOutcome::AlreadyRegistered {
                slot: NULL_SLOT,
                label: Label::PUBLIC,
            };
        }
        if let Some(slot) = self.slot_of(url) {
            return PutOutcome::AlreadyRegistered {
                slot,
                label: self.entries[slot].label,
            };
        }
        match self.append(extract_domain(url)) {
            Some((slot, label)) => PutOutcome::Registered { slot, label },
            None => PutOutcome::Dropped,
        }
    }

    /// Label for `url`, registering it on first sight.
    pub fn get_label(&mut self, url: &str) -> Label {
        if self.is_policy_origin(url) {
            return Label::POLICY;
        }
        if is_null_origin(url) {
            return Label::PUBLIC;
        }
        if let Some(slot) = self.slot_of(url) {
            return self.entries[slot].label;
        }
        match self.append(extract_domain(url)) {
            Some((_, label)) => label,
            None => {
                let event = self
                    .events
                    .event(
                        IfcComponent::OriginRegistry,
                        IfcEventType::OriginRegistered,
                        IfcEventOutcome::Fallback,
                    )
                    .with_error_code(FE_IFC_REGISTRY_FULL)
                    .with_subject(url)
                    .with_label(Label::POLICY);
                self.events.push(event);
                Label::POLICY
            }
        }
    }

    fn append(&mut self, key: String) -> Option<(usize, Label)> {
        if self.is_full() {
            let event = self
                .events
                .event(
                    IfcComponent::OriginRegistry,
                    IfcEventType::OriginRegistered,
                    IfcEventOutcome::Dropped,
                )
                .with_error_code(FE_IFC_REGISTRY_FULL)
                .with_subject(key);
            self.events.push(event);
            return None;
        }
        let slot = self.entries.len();
        let label = Label::for_slot(slot);
        let event = self
            .events
            .event(
                IfcComponent::OriginRegistry,
                IfcEventType::OriginRegistered,
                IfcEventOutcome::Pass,
            )
            .with_subject(key.clone())
            .with_label(label);
        self.events.push(event);
        self.entries.push(OriginEntry {
            origin_key: key,
            label,
        });
        Some((slot, label))
    }
}
