//! Values that carry a security label.

use serde::{Deserialize, Serialize};

use crate::label::Label;

/// Anything the policy layer can attach a label to: interpreter values,
/// object cells, DOM nodes.
pub trait LabelTarget {
    fn label(&self) -> Label;

    fn set_label(&mut self, label: Label);

    /// Composite values also carry the object's own label.
    fn object_label_mut(&mut self) -> Option<&mut Label> {
        None
    }
}

/// A value paired with its label; objects additionally carry an object label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledValue<T> {
    pub value: T,
    pub label: Label,
    pub object_label: Option<Label>,
}

impl<T> LabeledValue<T> {
    pub fn primitive(value: T, label: Label) -> Self {
        Self {
            value,
            label,
            object_label: None,
        }
    }

    pub fn object(value: T, label: Label, object_label: Label) -> Self {
        Self {
            value,
            label,
            object_label: Some(object_label),
        }
    }

    pub fn public(value: T) -> Self {
        Self::primitive(value, Label::PUBLIC)
    }

    pub fn is_object(&self) -> bool {
        self.object_label.is_some()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> LabeledValue<U> {
        LabeledValue {
            value: f(self.value),
            label: self.label,
            object_label: self.object_label,
        }
    }
}

impl<T> LabelTarget for LabeledValue<T> {
    fn label(&self) -> Label {
        self.label
    }

    fn set_label(&mut self, label: Label) {
        self.label = label;
    }

    fn object_label_mut(&mut self) -> Option<&mut Label> {
        self.object_label.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_have_no_object_label() {
        let mut value = LabeledValue::public(5);
        assert!(!value.is_object());
        assert!(value.object_label_mut().is_none());
        value.set_label(Label::SECRET);
        assert_eq!(value.label(), Label::SECRET);
    }

    #[test]
    fn map_keeps_labels() {
        let value = LabeledValue::object("node", Label::SECRET, Label::POLICY);
        let mapped = value.map(str::len);
        assert_eq!(mapped.value, 4);
        assert_eq!(mapped.label, Label::SECRET);
        assert_eq!(mapped.object_label, Some(Label::POLICY));
    }
}
