#![no_main]

use frankenengine_ifc::control_flow::{ControlFlowLabelStack, FrameEntry, RegisterId};
use frankenengine_ifc::label::Label;
use libfuzzer_sys::fuzz_target;

const MAX_OPS: usize = 256;

fuzz_target!(|data: &[u8]| {
    let mut stack = ControlFlowLabelStack::new();
    // Heads observed right before each live push, innermost last.
    let mut saved = Vec::new();

    for chunk in data.chunks(2).take(MAX_OPS) {
        let op = chunk[0];
        let arg = chunk.get(1).copied().unwrap_or(0);
        let label = Label::for_slot(usize::from(arg % 65));

        match op % 6 {
            0 | 1 => {
                let before = stack.head();
                saved.push(before);
                stack.push(
                    FrameEntry::branch(label, i64::from(arg), Some(RegisterId(u32::from(op))))
                        .with_loop(op & 0x80 != 0)
                        .with_exception_edge(op & 0x40 != 0),
                );
                assert_eq!(stack.head(), before.join(label));
            }
            2 => {
                let expected = saved.pop();
                let popped = stack.pop();
                assert_eq!(popped.is_some(), expected.is_some());
                if let Some(expected) = expected {
                    assert_eq!(stack.head().value() & expected.value(), expected.value());
                }
            }
            3 => {
                let depth = stack.depth();
                stack.join(label);
                assert_eq!(stack.depth(), depth);
                assert!(label.flows_to(stack.head()));
            }
            4 => {
                let before = stack.head();
                let popped = stack.unwind_to_exception_edge();
                assert!(popped <= saved.len());
                for _ in 0..popped {
                    saved.pop();
                }
                assert!(stack.head().flows_to(before));
                assert!(stack.depth() == 0 || stack.exc_handler());
            }
            _ => {
                let popped = stack.pop_at(i64::from(arg));
                for _ in 0..popped {
                    saved.pop();
                }
            }
        }
        assert_eq!(stack.depth(), saved.len());
    }

    while stack.pop().is_some() {}
    assert_eq!(stack.depth(), 0);
    assert_eq!(stack.loc(), -1);
});
