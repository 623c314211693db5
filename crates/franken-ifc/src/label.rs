//! Security-label lattice for dynamic information-flow control.
//!
//! A [`Label`] is a 64-bit source set plus a deferred-upgrade marker:
//! - each set bit names one information source (an origin or a secret);
//! - bit 0 (value `1`) is reserved for code governed by policy;
//! - the deferred ("star") marker flags labels produced under a branch
//!   whose upgrade-safety is not yet decided.
//!
//! Join is bitwise union; the order is bit-subset. The [`nsu_permits`]
//! function is the single enforcement point for write upgrades.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Label
// ---------------------------------------------------------------------------

/// Lattice element describing which sources influenced a value or a point
/// in execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Label {
    value: u64,
    deferred: bool,
}

impl Label {
    /// No information: the bottom of the lattice.
    pub const PUBLIC: Self = Self::from_bits(0);
    /// Code executing inside a trusted policy script.
    pub const POLICY: Self = Self::from_bits(1);
    /// Reserved secret source.
    pub const SECRET: Self = Self::from_bits(2);

    /// Build a non-deferred label from a raw bit-vector.
    pub const fn from_bits(value: u64) -> Self {
        Self {
            value,
            deferred: false,
        }
    }

    /// Build a label with an explicit deferred marker.
    pub const fn new(value: u64, deferred: bool) -> Self {
        Self { value, deferred }
    }

    /// Single-source label for registry slot `slot` (`1 << (slot - 1)`).
    ///
    /// Slot 0 is the null slot and maps to [`Label::PUBLIC`]. Slots above 64
    /// have no bit and also map to public.
    pub const fn for_slot(slot: usize) -> Self {
        if slot == 0 || slot > 64 {
            return Self::PUBLIC;
        }
        Self::from_bits(1u64 << (slot - 1))
    }

    pub const fn value(self) -> u64 {
        self.value
    }

    pub const fn is_deferred(self) -> bool {
        self.deferred
    }

    pub const fn is_public(self) -> bool {
        self.value == 0
    }

    /// Whether the label carries exactly the policy bit and nothing else.
    pub const fn is_policy(self) -> bool {
        self.value == Self::POLICY.value
    }

    /// Copy of this label with the deferred marker set.
    pub const fn deferred(self) -> Self {
        Self {
            value: self.value,
            deferred: true,
        }
    }

    /// Copy of this label with the deferred marker cleared.
    pub const fn settled(self) -> Self {
        Self {
            value: self.value,
            deferred: false,
        }
    }

    /// Least upper bound: union of sources, deferred if either side is.
    pub const fn join(self, other: Self) -> Self {
        Self {
            value: self.value | other.value,
            deferred: self.deferred || other.deferred,
        }
    }

    /// `self` with every source of `other` removed. The deferred marker is
    /// kept.
    pub const fn without(self, other: Self) -> Self {
        Self {
            value: self.value & !other.value,
            deferred: self.deferred,
        }
    }

    /// Lattice order `self ⊑ other`: every source of `self` is in `other`.
    pub const fn flows_to(self, other: Self) -> bool {
        (self.value | other.value) == other.value
    }

    /// `self ⊑ other` and `self != other`.
    pub fn is_strictly_below(self, other: Self) -> bool {
        self.flows_to(other) && self != other
    }

    /// `other ⊑ self` and `self != other`.
    pub fn is_strictly_above(self, other: Self) -> bool {
        other.flows_to(self) && self != other
    }

    /// Indices of the set bits, lowest first.
    pub fn sources(self) -> impl Iterator<Item = u32> {
        let value = self.value;
        (0..u64::BITS).filter(move |bit| value & (1u64 << bit) != 0)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.value)?;
        if self.deferred {
            f.write_str("*")?;
        }
        Ok(())
    }
}

/// Fold any number of labels into their join, starting at public.
pub fn join_all<I>(labels: I) -> Label
where
    I: IntoIterator<Item = Label>,
{
    labels.into_iter().fold(Label::PUBLIC, Label::join)
}

// ---------------------------------------------------------------------------
// No-sensitive-upgrade check
// ---------------------------------------------------------------------------

/// Global branch-mode toggle for NSU enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Upgrades are checked against the program-counter label.
    #[default]
    Enforce,
    /// Every upgrade is permitted.
    Permissive,
}

impl EnforcementMode {
    pub fn from_flag(enforce: bool) -> Self {
        if enforce {
            Self::Enforce
        } else {
            Self::Permissive
        }
    }

    pub fn is_enforcing(self) -> bool {
        self == Self::Enforce
    }
}

/// No-sensitive-upgrade rule: may a write labeled `new_label` happen while
/// the program counter is `pc`?
///
/// A policy-labeled pc may always upgrade. A non-policy pc may never write
/// a policy-level label. Otherwise the pc must be a bit-subset of
/// `new_label`.
pub fn nsu_permits(pc: Label, new_label: Label, mode: EnforcementMode) -> bool {
    if !mode.is_enforcing() {
        return true;
    }
    if pc.value == Label::POLICY.value {
        return true;
    }
    if new_label.value == Label::POLICY.value {
        return false;
    }
    (new_label.value | pc.value) == new_label.value
}
