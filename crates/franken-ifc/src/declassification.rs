//! Declassification bit table.
//!
//! A capability registry: each named entity owns at most one record holding
//! a capability bitmask plus the label of the context that created it and
//! the label it may be downgraded to. The table only records; deciding when
//! to apply a downgrade belongs to the consumer.

use serde::{Deserialize, Serialize};

use crate::events::{
    EventLog, FE_IFC_BIT_TABLE_FULL, FE_IFC_INVALID_NAME, IfcComponent, IfcEvent,
    IfcEventOutcome, IfcEventType,
};

/// Total slots, including the reserved null entry at index 0.
pub const BIT_TABLE_CAPACITY: usize = 64;
pub const NULL_ENTRY_INDEX: usize = 0;

/// One named capability record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclassificationEntry {
    pub name: String,
    pub bits: u64,
    /// Label value of the context that created the record.
    pub assigned_at_label: u64,
    /// Label value the entity may be declassified to.
    pub declassified_to_label: u64,
}

impl DeclassificationEntry {
    fn null() -> Self {
        Self {
            name: String::new(),
            bits: 0,
            assigned_at_label: 0,
            declassified_to_label: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclassificationBitTable {
    entries: Vec<DeclassificationEntry>,
    events: EventLog,
}

impl Default for DeclassificationBitTable {
    fn default() -> Self {
        Self::new("declassification-table")
    }
}

impl DeclassificationBitTable {
    pub fn new(trace_id: impl Into<String>) -> Self {
        let mut entries = Vec::with_capacity(BIT_TABLE_CAPACITY);
        entries.push(DeclassificationEntry::null());
        Self {
            entries,
            events: EventLog::new(trace_id),
        }
    }

    /// Occupied slots, null entry included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no named record exists yet.
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= BIT_TABLE_CAPACITY
    }

    pub fn entries(&self) -> &[DeclassificationEntry] {
        &self.entries
    }

    pub fn events(&self) -> &[IfcEvent] {
        self.events.events()
    }

    pub fn drain_events(&mut self) -> Vec<IfcEvent> {
        self.events.drain_events()
    }

    /// Index of the record named `name`. The null entry is never matched.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        if name.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .skip(1)
            .position(|entry| entry.name == name)
            .map(|position| position + 1)
    }

    /// Record `name`, or return the index it already has.
    ///
    /// Returns `None` when the table is full or the name is empty; both emit
    /// a diagnostic event.
    pub fn put(
        &mut self,
        name: &str,
        bits: u64,
        assign_label: u64,
        declass_label: u64,
    ) -> Option<usize> {
        if name.is_empty() {
            self.diagnostic(name, FE_IFC_INVALID_NAME, IfcEventOutcome::Denied);
            return None;
        }
        if let Some(index) = self.index_of(name) {
            return Some(index);
        }
        if self.is_full() {
            self.diagnostic(name, FE_IFC_BIT_TABLE_FULL, IfcEventOutcome::Dropped);
            return None;
        }
        let index = self.entries.len();
        self.entries.push(DeclassificationEntry {
            name: name.to_string(),
            bits,
            assigned_at_label: assign_label,
            declassified_to_label: declass_label,
        });
        let event = self
            .events
            .event(
                IfcComponent::DeclassificationTable,
                IfcEventType::CapabilityRecorded,
                IfcEventOutcome::Pass,
            )
            .with_subject(name);
        self.events.push(event);
        Some(index)
    }

    pub fn get_bits(&self, name: &str) -> Option<u64> {
        self.index_of(name).map(|index| self.entries[index].bits)
    }

    pub fn get_bits_at(&self, index: usize) -> Option<u64> {
        self.named_entry(index).map(|entry| entry.bits)
    }

    /// Overwrite the bitmask of `name`. Returns false for unknown names.
    pub fn set_bits(&mut self, name: &str, bits: u64) -> bool {
        match self.index_of(name) {
            Some(index) => self.set_bits_at(index, bits),
            None => false,
        }
    }

    /// Overwrite the bitmask at `index`. The null entry is read-only.
    pub fn set_bits_at(&mut self, index: usize, bits: u64) -> bool {
        if index == NULL_ENTRY_INDEX {
            return false;
        }
        match self.entries.get_mut(index) {
            Some(entry) => {
                entry.bits = bits;
                true
            }
            None => false,
        }
    }

    /// Label value of the context that created record `index`.
    pub fn var_label(&self, index: usize) -> Option<u64> {
        self.named_entry(index).map(|entry| entry.assigned_at_label)
    }

    /// Label value record `index` may be declassified to.
    pub fn rel_label(&self, index: usize) -> Option<u64> {
        self.named_entry(index)
            .map(|entry| entry.declassified_to_label)
    }

    fn named_entry(&self, index: usize) -> Option<&DeclassificationEntry> {
        if index == NULL_ENTRY_INDEX {
            return None;
        }
        self.entries.get(index)
    }

    fn diagnostic(&mut self, name: &str, code: &str, outcome: IfcEventOutcome) {
        let event = self
            .events
            .event(
                IfcComponent::DeclassificationTable,
                IfcEventType::CapabilityRecorded,
                outcome,
            )
            .with_error_code(code)
            .with_subject(name);
        self.events.push(event);
    }
}
