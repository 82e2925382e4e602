#![no_main]

use arbitrary::Arbitrary;
use inputq_core::QueueConfig;
use inputq_harness::{Harness, Op, apply, check_invariants};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    immediate: bool,
    touch_action: bool,
    long_tap: bool,
    ops: Vec<(u8, u8)>,
}

fuzz_target!(|input: Input| {
    let mut config = if input.immediate {
        QueueConfig::immediate_fallback()
    } else {
        QueueConfig::default()
    };
    config.touch_action_enabled = input.touch_action;
    config.long_tap_enabled = input.long_tap;

    let mut h = Harness::new(config);
    let handlers = vec![h.handler(), h.handler(), h.handler()];

    // Cap sequence length so slow inputs stay fast.
    for &(selector, param) in input.ops.iter().take(2048) {
        let op = Op::decode(selector, param, h.queue().stats().blocks_created);
        apply(&mut h, &handlers, &op);
        if let Err(violation) = check_invariants(&h) {
            panic!("after {op:?}: {violation}");
        }
        if input.immediate {
            assert_eq!(h.queue().queued_len(), 0, "immediate mode held input after {op:?}");
        }
    }

    h.settle();
    assert_eq!(h.pending_timeouts(), 0);
    if let Err(violation) = check_invariants(&h) {
        panic!("after settle: {violation}");
    }
});
