#![forbid(unsafe_code)]
//! Integration tests for the policy primitives on `IfcContext`.
//!
//! Covers the policy-context gate on label assignment, NSU-guarded upgrades
//! from ordinary scripts, and event-context scoping driven by loader hooks.

use frankenengine_ifc::control_flow::FrameEntry;
use frankenengine_ifc::events::{FE_IFC_NOT_POLICY_CONTEXT, FE_IFC_NSU_VIOLATION, IfcEventOutcome};
use frankenengine_ifc::{IfcConfig, IfcContext, Label, LabeledValue, OriginHint, PolicyError};

const POLICY_URL: &str = "https://policy.example/manifest.js";
const PAGE_URL: &str = "https://page.example/app.js";

// =========================================================================
// Helpers
// =========================================================================

fn context() -> IfcContext {
    IfcContext::new(
        &IfcConfig::default()
            .with_trace_id("trace-policy")
            .with_policy_origin(POLICY_URL),
    )
}

// =========================================================================
// Section 1: Assignment
// =========================================================================

#[test]
fn policy_script_assigns_and_page_script_reads() {
    let mut context = context();
    let mut balance = LabeledValue::primitive(1200, Label::PUBLIC);

    context.enter_script(POLICY_URL);
    let bank = context
        .assign_label(&mut balance, &OriginHint::parse("https://bank.example/"))
        .expect("assign");
    context.exit_script();

    assert_eq!(balance.label, bank);
    assert_eq!(context.lookup_origin("bank.example"), Some(bank));
    assert_eq!(context.program_counter(), Label::PUBLIC);
}

#[test]
fn assignment_from_page_script_is_denied_and_logged() {
    let mut context = context();
    context.enter_script(PAGE_URL);
    let mut value = LabeledValue::public(());
    let err = context
        .assign_label(&mut value, &OriginHint::CurrentScript)
        .expect_err("denied");
    assert!(matches!(err, PolicyError::NotPolicyContext { .. }));
    let last = context.events().last().expect("event");
    assert_eq!(last.outcome, IfcEventOutcome::Denied);
    assert_eq!(last.error_code.as_deref(), Some(FE_IFC_NOT_POLICY_CONTEXT));
}

#[test]
fn policy_pc_joined_with_branch_is_no_longer_policy() {
    let mut context = context();
    context.enter_script(POLICY_URL);
    context.on_branch(Label::SECRET, 20, None);
    let mut value = LabeledValue::public(());
    assert!(
        context
            .assign_label(&mut value, &OriginHint::parse("bank.example"))
            .is_err()
    );
    context.on_reach(20);
    assert!(
        context
            .assign_label(&mut value, &OriginHint::parse("bank.example"))
            .is_ok()
    );
}

// =========================================================================
// Section 2: Upgrade
// =========================================================================

#[test]
fn upgrade_under_public_pc_joins_origin() {
    let mut context = context();
    context.enter_script(PAGE_URL);
    let mut value = LabeledValue::object("doc", Label::SECRET, Label::PUBLIC);
    let page = context.origin_label(PAGE_URL);
    let upgraded = context.upgrade_label(&mut value).expect("upgrade");
    assert_eq!(upgraded, Label::SECRET.join(page));
    assert_eq!(value.object_label, Some(page));
}

#[test]
fn upgrade_blocked_when_pc_exceeds_target() {
    let mut context = context();
    context.enter_script(PAGE_URL);
    context.push(FrameEntry::new(Label::SECRET, 50));
    let mut value = LabeledValue::public(0);
    let err = context.upgrade_label(&mut value).expect_err("nsu");
    assert_eq!(err.error_code(), FE_IFC_NSU_VIOLATION);
    assert!(context.abort_requested());
    assert!(context.state_mut().clear_abort());
    assert!(!context.abort_requested());
}

#[test]
fn upgrade_allowed_when_target_already_covers_pc() {
    let mut context = context();
    context.enter_script(PAGE_URL);
    context.push(FrameEntry::new(Label::SECRET, 50));
    let mut value = LabeledValue::primitive(0, Label::SECRET);
    assert!(context.upgrade_label(&mut value).is_ok());
    assert!(!context.abort_requested());
}

// =========================================================================
// Section 3: Event context
// =========================================================================

#[test]
fn trust_context_attribute_sets_event_context() {
    let mut context = context();
    context.enter_script(POLICY_URL);
    let label = context
        .on_trust_context_attribute("a.example,b.example")
        .expect("policy");
    assert_eq!(label.value(), 4 | 8);
    assert_eq!(context.state().event_context_label(), label);
}

#[test]
fn public_origin_in_list_resets_event_context() {
    let mut context = context();
    context.enter_script(POLICY_URL);
    context.set_event_context(&["a.example"]).expect("first");
    let label = context.set_event_context(&["NULL"]).expect("reset");
    assert_eq!(label, Label::PUBLIC);
}
