#![forbid(unsafe_code)]
//! Integration tests for the `declassification` module.

use frankenengine_ifc::declassification::{
    BIT_TABLE_CAPACITY, DeclassificationBitTable, NULL_ENTRY_INDEX,
};
use frankenengine_ifc::events::{FE_IFC_BIT_TABLE_FULL, FE_IFC_INVALID_NAME};

fn table() -> DeclassificationBitTable {
    DeclassificationBitTable::new("trace-declassification")
}

// =========================================================================
// Section 1: Naming
// =========================================================================

#[test]
fn same_name_twice_returns_same_index() {
    let mut table = table();
    let first = table.put("cookie", 0b1, 4, 0).expect("first");
    let second = table.put("cookie", 0b10, 8, 0).expect("second");
    assert_eq!(first, second);
    assert_eq!(table.get_bits("cookie"), Some(0b1));
    assert_eq!(table.len(), 2);
}

#[test]
fn indices_follow_insertion_order_after_null_entry() {
    let mut table = table();
    assert!(table.is_empty());
    let a = table.put("a", 1, 0, 0).expect("a");
    let b = table.put("b", 2, 0, 0).expect("b");
    assert_eq!(a, NULL_ENTRY_INDEX + 1);
    assert_eq!(b, a + 1);
    assert_eq!(table.index_of("b"), Some(b));
    assert!(!table.is_empty());
}

#[test]
fn empty_name_is_refused_with_diagnostic() {
    let mut table = table();
    assert_eq!(table.put("", 1, 0, 0), None);
    assert_eq!(table.index_of(""), None);
    let events = table.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].error_code.as_deref(), Some(FE_IFC_INVALID_NAME));
}

// =========================================================================
// Section 2: Bits and labels
// =========================================================================

#[test]
fn bits_can_be_overwritten_by_name_or_index() {
    let mut table = table();
    let index = table.put("geo", 0b1, 4, 2).expect("put");
    assert!(table.set_bits("geo", 0b110));
    assert_eq!(table.get_bits_at(index), Some(0b110));
    assert!(table.set_bits_at(index, 0b1000));
    assert_eq!(table.get_bits("geo"), Some(0b1000));
    assert!(!table.set_bits("missing", 1));
    assert!(!table.set_bits_at(99, 1));
}

#[test]
fn null_entry_is_read_only_and_invisible() {
    let mut table = table();
    assert!(!table.set_bits_at(NULL_ENTRY_INDEX, 1));
    assert_eq!(table.get_bits_at(NULL_ENTRY_INDEX), None);
    assert_eq!(table.var_label(NULL_ENTRY_INDEX), None);
    assert_eq!(table.rel_label(NULL_ENTRY_INDEX), None);
}

#[test]
fn label_values_are_kept_per_record() {
    let mut table = table();
    let index = table.put("history", 0, 16, 4).expect("put");
    assert_eq!(table.var_label(index), Some(16));
    assert_eq!(table.rel_label(index), Some(4));
}

// =========================================================================
// Section 3: Capacity
// =========================================================================

#[test]
fn full_table_drops_new_names_but_keeps_old_ones() {
    let mut table = table();
    for index in 1..BIT_TABLE_CAPACITY {
        table.put(&format!("cap{index}"), index as u64, 0, 0).expect("room");
    }
    assert!(table.is_full());
    table.drain_events();

    assert_eq!(table.put("overflow", 1, 0, 0), None);
    assert_eq!(table.put("cap1", 7, 0, 0), Some(1));
    let events = table.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].error_code.as_deref(), Some(FE_IFC_BIT_TABLE_FULL));
}
