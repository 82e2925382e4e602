#![no_main]

use inputq_core::QueueConfig;
use inputq_harness::{Harness, Op, apply, check_invariants};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Feed arbitrary text to both config loaders; they must never panic.
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let parsed = [QueueConfig::from_toml_str(text), QueueConfig::from_json_str(text)];

    for config in parsed.into_iter().flatten() {
        assert!(config.validate().is_empty(), "loader returned an invalid config");

        // Any accepted config must drive a queue safely.
        let mut h = Harness::new(config);
        let handlers = vec![h.handler(), h.handler()];
        for (i, &byte) in data.iter().take(256).enumerate() {
            let op = Op::decode(byte, i as u8, h.queue().stats().blocks_created);
            apply(&mut h, &handlers, &op);
        }
        h.settle();
        if let Err(violation) = check_invariants(&h) {
            panic!("{violation}");
        }
    }
});
