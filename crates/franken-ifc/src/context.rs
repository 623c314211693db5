//! Owned IFC state for one execution context.
//!
//! [`IfcContext`] bundles the control-flow label stack, origin registry,
//! declassification table, security globals and event log that belong to a
//! single global object. The interpreter threads it through execution; two
//! contexts never share state.
//!
//! Stack mutations go through the context so the mirrored pc label in
//! [`SecurityState`] stays equal to the stack head. Sub-component events are
//! merged into the context log after each operation.

use serde::{Deserialize, Serialize};

use crate::config::IfcConfig;
use crate::control_flow::{ControlFlowLabelStack, FrameEntry};
use crate::declassification::DeclassificationBitTable;
use crate::events::{EventLog, IfcEvent};
use crate::label::{EnforcementMode, Label};
use crate::origin_registry::{OriginLabelRegistry, PutOutcome};
use crate::security_state::SecurityState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IfcContext {
    pub(crate) stack: ControlFlowLabelStack,
    pub(crate) registry: OriginLabelRegistry,
    pub(crate) bit_table: DeclassificationBitTable,
    pub(crate) state: SecurityState,
    pub(crate) events: EventLog,
    /// Source URLs of the scripts currently executing, innermost last.
    pub(crate) running_scripts: Vec<String>,
}

impl Default for IfcContext {
    fn default() -> Self {
        Self::new(&IfcConfig::default())
    }
}

impl IfcContext {
    /// Build a context and seed it from `config`: policy origins first,
    /// then ordinary origins in listed order, then capability records.
    pub fn new(config: &IfcConfig) -> Self {
        let mut context = Self {
            stack: ControlFlowLabelStack::new(),
            registry: OriginLabelRegistry::new(config.trace_id.clone()),
            bit_table: DeclassificationBitTable::new(config.trace_id.clone()),
            state: SecurityState::new(config.enforcement_mode()),
            events: EventLog::new(config.trace_id.clone()),
            running_scripts: Vec::new(),
        };
        for origin in &config.policy_origins {
            context.registry.put(origin, true);
        }
        for origin in &config.origins {
            context.registry.put(origin, false);
        }
        for seed in &config.declassification {
            context.bit_table.put(
                &seed.name,
                seed.bits,
                seed.assigned_at_label,
                seed.declassified_to_label,
            );
        }
        context.collect_events();
        context
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    pub fn stack(&self) -> &ControlFlowLabelStack {
        &self.stack
    }

    pub fn registry(&self) -> &OriginLabelRegistry {
        &self.registry
    }

    pub fn bit_table(&self) -> &DeclassificationBitTable {
        &self.bit_table
    }

    pub fn state(&self) -> &SecurityState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SecurityState {
        &mut self.state
    }

    /// Effective program-counter label.
    pub fn program_counter(&self) -> Label {
        self.stack.head()
    }

    pub fn current_script(&self) -> Option<&str> {
        self.running_scripts.last().map(String::as_str)
    }

    pub fn trace_id(&self) -> &str {
        self.events.trace_id()
    }

    pub fn events(&self) -> &[IfcEvent] {
        self.events.events()
    }

    pub fn event_log(&self) -> &EventLog {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<IfcEvent> {
        self.collect_events();
        self.events.drain_events()
    }

    pub fn set_enforcement(&mut self, mode: EnforcementMode) {
        self.state.set_mode(mode);
    }

    pub fn abort_requested(&self) -> bool {
        self.state.abort_requested()
    }

    // -----------------------------------------------------------------------
    // Control-flow stack
    // -----------------------------------------------------------------------

    pub fn push(&mut self, entry: FrameEntry) -> Label {
        self.stack.push(entry);
        self.sync_pc()
    }

    pub fn pop(&mut self) -> Label {
        self.stack.pop();
        self.sync_pc()
    }

    pub fn join(&mut self, label: Label) -> Label {
        self.stack.join(label);
        self.sync_pc()
    }

    pub fn join_handlers(
        &mut self,
        label: Label,
        is_function_handler: bool,
        is_exception_handler: bool,
    ) -> Label {
        self.stack
            .join_handlers(label, is_function_handler, is_exception_handler);
        self.sync_pc()
    }

    pub fn join_branch(&mut self, label: Label, is_branch: bool) -> Label {
        self.stack.join_branch(label, is_branch);
        self.sync_pc()
    }

    pub fn set_loop(&mut self, is_loop: bool) {
        self.stack.set_loop(is_loop);
    }

    pub(crate) fn sync_pc(&mut self) -> Label {
        let head = self.stack.head();
        self.state.sync_pc(head);
        head
    }

    // -----------------------------------------------------------------------
    // Registries
    // -----------------------------------------------------------------------

    pub fn register_origin(&mut self, url: &str, is_policy: bool) -> PutOutcome {
        let outcome = self.registry.put(url, is_policy);
        self.collect_events();
        outcome
    }

    /// Label of `url`, registering it on first sight.
    pub fn origin_label(&mut self, url: &str) -> Label {
        let label = self.registry.get_label(url);
        self.collect_events();
        label
    }

    pub fn lookup_origin(&self, url: &str) -> Option<Label> {
        self.registry.lookup(url)
    }

    pub fn record_capability(
        &mut self,
        name: &str,
        bits: u64,
        assign_label: u64,
        declass_label: u64,
    ) -> Option<usize> {
        let index = self.bit_table.put(name, bits, assign_label, declass_label);
        self.collect_events();
        index
    }

    pub fn set_capability_bits(&mut self, name: &str, bits: u64) -> bool {
        self.bit_table.set_bits(name, bits)
    }

    pub fn set_capability_bits_at(&mut self, index: usize, bits: u64) -> bool {
        self.bit_table.set_bits_at(index, bits)
    }

    pub(crate) fn record(&mut self, event: IfcEvent) {
        self.collect_events();
        self.events.push(event);
    }

    fn collect_events(&mut self) {
        for event in self.registry.drain_events() {
            self.events.push(event);
        }
        for event in self.bit_table.drain_events() {
            self.events.push(event);
        }
    }
}
