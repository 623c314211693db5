//! Labels on DOM nodes and labeled reads of live node collections.
//!
//! Reading a collection leaks information about every node the read
//! traverses: `length` depends on all of them, `item(i)` on the first
//! `i + 1`. [`LabeledNodeList`] joins those node labels into the result and
//! caches prefix joins until either the list or the label store changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::context::IfcContext;
use crate::label::Label;
use crate::labeled::{LabelTarget, LabeledValue};
use crate::policy::{OriginHint, PolicyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Per-node labels. Unknown nodes are public.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLabelStore {
    labels: BTreeMap<NodeId, Label>,
    revision: u64,
}

struct NodeCell<'a> {
    store: &'a mut NodeLabelStore,
    node: NodeId,
}

impl LabelTarget for NodeCell<'_> {
    fn label(&self) -> Label {
        self.store.label_of(self.node)
    }

    fn set_label(&mut self, label: Label) {
        self.store.tag(self.node, label);
    }
}

impl NodeLabelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label_of(&self, node: NodeId) -> Label {
        self.labels.get(&node).copied().unwrap_or(Label::PUBLIC)
    }

    /// Unchecked tag, for nodes created by the parser.
    pub fn tag(&mut self, node: NodeId, label: Label) {
        self.labels.insert(node, label);
        self.revision += 1;
    }

    pub fn remove(&mut self, node: NodeId) {
        if self.labels.remove(&node).is_some() {
            self.revision += 1;
        }
    }

    /// Bumped on every label change; collection caches compare against it.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Policy-only assignment of a node label.
    pub fn assign(
        &mut self,
        context: &mut IfcContext,
        node: NodeId,
        hint: &OriginHint,
    ) -> Result<Label, PolicyError> {
        let mut cell = NodeCell { store: self, node };
        context.assign_label(&mut cell, hint)
    }

    /// NSU-checked upgrade of a node label on mutation.
    pub fn upgrade(&mut self, context: &mut IfcContext, node: NodeId) -> Result<Label, PolicyError> {
        let mut cell = NodeCell { store: self, node };
        context.upgrade_label(&mut cell)
    }
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PrefixCache {
    revision: u64,
    /// `prefix[i]` is the join of the labels of nodes `0..=i`.
    prefix: Vec<Label>,
}

/// A live node list (`getElementsByTagName`, `childNodes`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledNodeList {
    nodes: Vec<NodeId>,
    cache: Option<PrefixCache>,
}

impl LabeledNodeList {
    pub fn new(nodes: Vec<NodeId>) -> Self {
        Self { nodes, cache: None }
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn push(&mut self, node: NodeId) {
        self.nodes.push(node);
        self.invalidate();
    }

    pub fn remove(&mut self, node: NodeId) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|candidate| *candidate != node);
        let removed = self.nodes.len() != before;
        if removed {
            self.invalidate();
        }
        removed
    }

    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    pub fn is_cached(&self, store: &NodeLabelStore) -> bool {
        self.cache
            .as_ref()
            .is_some_and(|cache| cache.revision == store.revision())
    }

    fn prefix(&mut self, store: &NodeLabelStore) -> &[Label] {
        if !self.is_cached(store) {
            let mut running = Label::PUBLIC;
            let prefix = self
                .nodes
                .iter()
                .map(|node| {
                    running = running.join(store.label_of(*node));
                    running
                })
                .collect();
            self.cache = Some(PrefixCache {
                revision: store.revision(),
                prefix,
            });
        }
        match &self.cache {
            Some(cache) => &cache.prefix,
            None => &[],
        }
    }

    /// `length`, labeled with every node in the list.
    pub fn length(&mut self, store: &NodeLabelStore) -> LabeledValue<usize> {
        let len = self.nodes.len();
        let label = self.prefix(store).last().copied().unwrap_or(Label::PUBLIC);
        LabeledValue::primitive(len, label)
    }

    /// `item(index)`, labeled with the nodes traversed to reach it. An
    /// out-of-range read traverses the whole list.
    pub fn item(&mut self, index: usize, store: &NodeLabelStore) -> LabeledValue<Option<NodeId>> {
        let node = self.nodes.get(index).copied();
        let prefix = self.prefix(store);
        let label = prefix
            .get(index)
            .or_else(|| prefix.last())
            .copied()
            .unwrap_or(Label::PUBLIC);
        LabeledValue::primitive(node, label)
    }
}
