#![forbid(unsafe_code)]
//! Integration tests for the `label` module.
//!
//! Lattice laws over a spread of labels, the bit-subset order, and the
//! no-sensitive-upgrade rule including its policy-bit special cases.

use frankenengine_ifc::label::{EnforcementMode, Label, join_all, nsu_permits};

// =========================================================================
// Helpers
// =========================================================================

fn spread() -> Vec<Label> {
    let mut labels = vec![Label::PUBLIC, Label::POLICY, Label::SECRET];
    for slot in [3usize, 7, 31, 64] {
        labels.push(Label::for_slot(slot));
        labels.push(Label::for_slot(slot).join(Label::SECRET).deferred());
    }
    labels.push(Label::from_bits(u64::MAX));
    labels
}

// =========================================================================
// Section 1: Join laws
// =========================================================================

#[test]
fn join_is_commutative() {
    for a in spread() {
        for b in spread() {
            assert_eq!(a.join(b), b.join(a), "{a} vs {b}");
        }
    }
}

#[test]
fn join_is_associative() {
    let labels = spread();
    for &a in &labels {
        for &b in &labels {
            for &c in &labels {
                assert_eq!(a.join(b.join(c)), a.join(b).join(c));
            }
        }
    }
}

#[test]
fn join_is_idempotent_and_monotonic() {
    for a in spread() {
        assert_eq!(a.join(a), a);
        for b in spread() {
            assert!(a.flows_to(a.join(b)));
            assert!(b.flows_to(a.join(b)));
        }
    }
}

#[test]
fn public_is_the_join_identity() {
    for a in spread() {
        assert_eq!(a.join(Label::PUBLIC), a);
        assert!(Label::PUBLIC.flows_to(a));
    }
}

#[test]
fn join_all_folds_from_public() {
    assert_eq!(join_all(Vec::new()), Label::PUBLIC);
    let joined = join_all([Label::for_slot(3), Label::for_slot(4).deferred()]);
    assert_eq!(joined.value(), 4 | 8);
    assert!(joined.is_deferred());
}

// =========================================================================
// Section 2: Order
// =========================================================================

#[test]
fn order_is_reflexive_and_antisymmetric_on_values() {
    for a in spread() {
        assert!(a.flows_to(a));
        for b in spread() {
            if a.flows_to(b) && b.flows_to(a) {
                assert_eq!(a.value(), b.value());
            }
        }
    }
}

#[test]
fn distinct_single_bits_are_incomparable() {
    let a = Label::for_slot(3);
    let b = Label::for_slot(4);
    assert!(!a.flows_to(b));
    assert!(!b.flows_to(a));
    assert!(!a.is_strictly_below(b));
    assert!(!a.is_strictly_above(b));
}

#[test]
fn strict_order_excludes_equality() {
    for a in spread() {
        assert!(!a.is_strictly_below(a));
        assert!(!a.is_strictly_above(a));
    }
    assert!(Label::PUBLIC.is_strictly_below(Label::SECRET));
}

// =========================================================================
// Section 3: NSU
// =========================================================================

#[test]
fn policy_pc_may_upgrade_anything() {
    for label in spread() {
        assert!(nsu_permits(Label::POLICY, label, EnforcementMode::Enforce));
    }
}

#[test]
fn non_policy_pc_may_not_write_policy_label() {
    for pc in spread() {
        if pc.value() == Label::POLICY.value() {
            continue;
        }
        assert!(
            !nsu_permits(pc, Label::POLICY, EnforcementMode::Enforce),
            "pc {pc}"
        );
    }
}

#[test]
fn nsu_allows_whenever_pc_is_subset_of_new_label() {
    for pc in spread() {
        for new_label in spread() {
            if pc.value() | new_label.value() == new_label.value()
                && new_label.value() != Label::POLICY.value()
            {
                assert!(nsu_permits(pc, new_label, EnforcementMode::Enforce));
            }
        }
    }
}

#[test]
fn nsu_rejects_pc_outside_new_label() {
    let pc = Label::for_slot(5);
    assert!(!nsu_permits(pc, Label::for_slot(6), EnforcementMode::Enforce));
    assert!(!nsu_permits(pc, Label::PUBLIC, EnforcementMode::Enforce));
}

#[test]
fn deferred_marker_does_not_change_nsu_outcome() {
    let pc = Label::for_slot(5).deferred();
    let target = Label::for_slot(5).join(Label::for_slot(6));
    assert!(nsu_permits(pc, target, EnforcementMode::Enforce));
}

#[test]
fn permissive_mode_disables_checks() {
    for pc in spread() {
        for label in spread() {
            assert!(nsu_permits(pc, label, EnforcementMode::Permissive));
        }
    }
}

// =========================================================================
// Section 4: Serde
// =========================================================================

#[test]
fn label_serde_round_trip_keeps_deferred() {
    let label = Label::for_slot(9).deferred();
    let json = serde_json::to_string(&label).expect("serialize");
    let restored: Label = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(restored, label);
}

#[test]
fn enforcement_mode_serde_is_snake_case() {
    let json = serde_json::to_string(&EnforcementMode::Permissive).expect("serialize");
    assert_eq!(json, "\"permissive\"");
}
