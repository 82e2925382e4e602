#![forbid(unsafe_code)]

//! Seeded input storms.
//!
//! Each storm drives one queue through thousands of mixed intake and
//! resolution ops and checks the structural invariants after every op.
//! Storm logs are JSONL and printed on failure.
//!
//! # Running
//!
//! ```sh
//! cargo test -p inputq-harness --test storm_soak
//! INPUTQ_TEST_SEED=42 cargo test -p inputq-harness --test storm_soak
//! ```

use std::sync::{Arc, Mutex};

use inputq_core::QueueConfig;
use inputq_core::logging::TARGET;
use inputq_harness::{Harness, Op, apply, check_invariants, fixture_seed, generate_storm};
use tracing::Subscriber;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

const SEEDS: [u64; 6] = [1, 7, 42, 1_000_003, 0xDEAD_BEEF, 0x5EED_CAFE];

/// Replays the storm of `seed` op by op, checking invariants as it goes.
/// Returns the first violation with the ops that led to it.
fn soak(config: QueueConfig, seed: u64, count: usize) -> Result<Harness, String> {
    // Generate the op list on a scratch harness, then replay it so every
    // intermediate state is observable.
    let mut scratch = Harness::new(config.clone());
    let scratch_handlers = vec![scratch.handler(), scratch.handler()];
    let storm = generate_storm(&mut scratch, &scratch_handlers, seed, count);

    let mut h = Harness::new(config);
    let handlers = vec![h.handler(), h.handler()];
    for (idx, op) in storm.ops.iter().enumerate() {
        apply(&mut h, &handlers, op);
        if let Err(violation) = check_invariants(&h) {
            let tail: Vec<&Op> = storm.ops[idx.saturating_sub(8)..=idx].iter().collect();
            return Err(format!(
                "seed {seed} op {idx}: {violation}\nlast ops: {tail:#?}\nlog head: {}",
                storm.log.iter().take(4).cloned().collect::<Vec<_>>().join("\n")
            ));
        }
    }
    Ok(h)
}

#[test]
fn storms_keep_invariants() {
    for seed in SEEDS.into_iter().chain([fixture_seed(9)]) {
        if let Err(report) = soak(QueueConfig::default(), seed, 3_000) {
            panic!("{report}");
        }
    }
}

#[test]
fn storms_keep_invariants_without_touch_action() {
    for seed in SEEDS {
        if let Err(report) = soak(QueueConfig::default().with_touch_action(false), seed, 2_000) {
            panic!("{report}");
        }
    }
}

#[test]
fn immediate_storms_never_hold_input() {
    for seed in SEEDS {
        let h = soak(QueueConfig::immediate_fallback(), seed, 2_000).unwrap_or_else(|r| panic!("{r}"));
        assert_eq!(h.queue().queued_len(), 0, "seed {seed}");
    }
}

#[test]
fn replay_is_deterministic() {
    let seed = fixture_seed(77);
    let run = || {
        let mut h = Harness::new(QueueConfig::default());
        let handlers = vec![h.handler(), h.handler()];
        let storm = generate_storm(&mut h, &handlers, seed, 1_500);
        (storm.log, h.queue().stats().clone(), h.journal().len())
    };
    let (log_a, stats_a, delivered_a) = run();
    let (log_b, stats_b, delivered_b) = run();
    assert_eq!(log_a, log_b);
    assert_eq!(stats_a, stats_b);
    assert_eq!(delivered_a, delivered_b);
}

#[test]
fn settling_after_a_storm_fires_every_timeout() {
    let mut h = soak(QueueConfig::default(), 42, 1_000).unwrap_or_else(|r| panic!("{r}"));
    h.settle();
    assert_eq!(h.pending_timeouts(), 0);
    check_invariants(&h).unwrap_or_else(|v| panic!("{v}"));
    let stats = h.queue().stats();
    assert!(stats.events_received > 0);
    assert!(stats.blocks_created >= stats.blocks_discarded);
}

// ===========================================================================
// Diagnostics
// ===========================================================================

#[derive(Default)]
struct LevelCounts {
    debug: usize,
    errors: Vec<String>,
}

struct LevelCapture {
    state: Arc<Mutex<LevelCounts>>,
}

impl<S> Layer<S> for LevelCapture
where
    S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() != TARGET {
            return;
        }
        let mut state = self.state.lock().expect("capture lock");
        match *event.metadata().level() {
            tracing::Level::DEBUG => state.debug += 1,
            tracing::Level::ERROR => state.errors.push(event.metadata().name().to_string()),
            _ => {}
        }
    }
}

#[test]
fn storm_diagnostics_stay_below_error() {
    let state = Arc::new(Mutex::new(LevelCounts::default()));
    let subscriber = tracing_subscriber::registry().with(LevelCapture {
        state: Arc::clone(&state),
    });
    let _guard = tracing::subscriber::set_default(subscriber);
    tracing::callsite::rebuild_interest_cache();

    let mut h = Harness::new(QueueConfig::default());
    let handlers = vec![h.handler(), h.handler()];
    generate_storm(&mut h, &handlers, 5, 500);

    tracing::callsite::rebuild_interest_cache();
    let snapshot = state.lock().expect("capture lock");
    assert!(snapshot.debug > 0, "queue decisions are logged at debug");
    assert!(snapshot.errors.is_empty(), "{:?}", snapshot.errors);
}
