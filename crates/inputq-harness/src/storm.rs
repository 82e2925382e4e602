#![forbid(unsafe_code)]

//! Input storms: deterministic sequences of intake and resolution operations.
//!
//! An [`Op`] is one thing that can happen to a queue: an event arriving, a
//! resolution message (possibly for a stale or wrong-kind block), a long-tap
//! injection, or time passing. Ops decode from two bytes
//! ([`Op::decode`]), so property tests, fuzzers and the seeded
//! [`generate_storm`] all drive the queue through the same vocabulary.
//!
//! # JSONL Schema
//!
//! ```json
//! {"event":"storm_start","seed":7,"op_count":500}
//! {"event":"storm_op","idx":0,"op":"TouchStart { handler: 0, confirmed: true, x: 3.0 }","queued":0}
//! {"event":"storm_complete","seed":7,"dispatched":412,"dropped":9,"rejected":3,"queued":1}
//! ```

use std::sync::Arc;

use inputq_core::{
    BlockId, BrowserGestureResponse, ConfirmationFlags, DispatchResult, DragDirection,
    DragMetrics, InputKind, MouseKind, PanPhase, PinchPhase, TouchBehavior, TouchPhase,
};

use crate::harness::Harness;
use crate::recording::RecordingHandler;

/// Number of distinct ops [`Op::decode`] produces.
pub const OP_KINDS: u8 = 24;

/// One operation on a queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    TouchStart { handler: usize, confirmed: bool, x: f32 },
    TouchMove { handler: usize, x: f32 },
    TouchEnd { handler: usize },
    Wheel { handler: usize, confirmed: bool },
    MouseDown { handler: usize, confirmed: bool },
    MouseMove { handler: usize },
    MouseUp { handler: usize },
    Pan { handler: usize, phase: PanPhase },
    Pinch { handler: usize, phase: PinchPhase },
    Key { handler: usize },
    /// Resolution ops address blocks by id; `block` may be stale or unknown.
    ConfirmTarget { block: BlockId, handler: usize },
    ConfirmNoTarget { block: BlockId },
    ConfirmDrag { block: BlockId, handler: usize },
    ContentResponse { block: BlockId, prevent_default: bool },
    TouchBehaviors { block: BlockId },
    BrowserGesture { block: BlockId, consumed: bool },
    InjectLongTap { handler: usize },
    Advance { ms: u64 },
}

impl Op {
    /// Decode an op from a selector byte and a parameter byte. Block ids are
    /// picked relative to `blocks_created`, reaching one past the newest.
    pub fn decode(selector: u8, param: u8, blocks_created: u64) -> Self {
        let handler = usize::from(param & 1);
        let confirmed = param & 2 != 0;
        let block = u64::from(param >> 2) % (blocks_created + 1) + 1;
        let x = f32::from(param) * 2.0;
        match selector % OP_KINDS {
            0 => Op::TouchStart { handler, confirmed, x },
            1 | 2 => Op::TouchMove { handler, x },
            3 => Op::TouchEnd { handler },
            4 => Op::Wheel { handler, confirmed },
            5 => Op::MouseDown { handler, confirmed },
            6 => Op::MouseMove { handler },
            7 => Op::MouseUp { handler },
            8 => Op::Pan {
                handler,
                phase: pan_phase(param >> 1),
            },
            9 => Op::Pinch {
                handler,
                phase: match (param >> 1) % 3 {
                    0 => PinchPhase::Start,
                    1 => PinchPhase::Scale,
                    _ => PinchPhase::End,
                },
            },
            10 => Op::Key { handler },
            11 | 12 => Op::ConfirmTarget { block, handler },
            13 => Op::ConfirmNoTarget { block },
            14 => Op::ConfirmDrag { block, handler },
            15..=17 => Op::ContentResponse {
                block,
                prevent_default: param & 1 != 0 && param & 2 != 0,
            },
            18 => Op::TouchBehaviors { block },
            19 => Op::BrowserGesture {
                block,
                consumed: param & 1 != 0,
            },
            20 => Op::InjectLongTap { handler },
            _ => Op::Advance {
                ms: u64::from(param) * 5,
            },
        }
    }

    /// Whether this op is an event arriving at intake.
    pub fn is_intake(&self) -> bool {
        matches!(
            self,
            Op::TouchStart { .. }
                | Op::TouchMove { .. }
                | Op::TouchEnd { .. }
                | Op::Wheel { .. }
                | Op::MouseDown { .. }
                | Op::MouseMove { .. }
                | Op::MouseUp { .. }
                | Op::Pan { .. }
                | Op::Pinch { .. }
                | Op::Key { .. }
        )
    }
}

fn pan_phase(code: u8) -> PanPhase {
    match code % 9 {
        0 => PanPhase::MayStart,
        1 => PanPhase::Cancelled,
        2 => PanPhase::Start,
        3 | 4 => PanPhase::Pan,
        5 => PanPhase::End,
        6 => PanPhase::MomentumStart,
        7 => PanPhase::MomentumPan,
        _ => PanPhase::Interrupted,
    }
}

fn flags(confirmed: bool) -> ConfirmationFlags {
    if confirmed {
        ConfirmationFlags::CONFIRMED
    } else {
        ConfirmationFlags::UNCONFIRMED
    }
}

/// What applying an op produced.
#[derive(Debug, Clone, PartialEq)]
pub enum OpOutcome {
    Dispatched(DispatchResult),
    Resolved(bool),
    Injected(Option<BlockId>),
    Fired(usize),
}

/// Apply `op` to `harness`. `handlers` must not be empty; handler indices
/// wrap around.
pub fn apply(harness: &mut Harness, handlers: &[Arc<RecordingHandler>], op: &Op) -> OpOutcome {
    let pick = |i: usize| Arc::clone(&handlers[i % handlers.len()]);
    match *op {
        Op::TouchStart { handler, confirmed, x } => {
            let event = harness.touch(TouchPhase::Start, x, 0.0);
            OpOutcome::Dispatched(harness.send(&pick(handler), flags(confirmed), event))
        }
        Op::TouchMove { handler, x } => {
            let event = harness.touch(TouchPhase::Move, x, 0.0);
            OpOutcome::Dispatched(harness.send(&pick(handler), ConfirmationFlags::UNCONFIRMED, event))
        }
        Op::TouchEnd { handler } => {
            let event = harness.touch(TouchPhase::End, 0.0, 0.0);
            OpOutcome::Dispatched(harness.send(&pick(handler), ConfirmationFlags::UNCONFIRMED, event))
        }
        Op::Wheel { handler, confirmed } => {
            let event = harness.wheel(1.0);
            OpOutcome::Dispatched(harness.send(&pick(handler), flags(confirmed), event))
        }
        Op::MouseDown { handler, confirmed } => {
            let event = harness.mouse(MouseKind::Down);
            OpOutcome::Dispatched(harness.send(&pick(handler), flags(confirmed), event))
        }
        Op::MouseMove { handler } => {
            let event = harness.mouse(MouseKind::Move);
            OpOutcome::Dispatched(harness.send(&pick(handler), ConfirmationFlags::UNCONFIRMED, event))
        }
        Op::MouseUp { handler } => {
            let event = harness.mouse(MouseKind::Up);
            OpOutcome::Dispatched(harness.send(&pick(handler), ConfirmationFlags::UNCONFIRMED, event))
        }
        Op::Pan { handler, phase } => {
            let event = harness.pan(phase, 0.0, 3.0);
            OpOutcome::Dispatched(harness.send(&pick(handler), ConfirmationFlags::CONFIRMED, event))
        }
        Op::Pinch { handler, phase } => {
            let event = harness.pinch(phase, 100.0);
            OpOutcome::Dispatched(harness.send(&pick(handler), ConfirmationFlags::UNCONFIRMED, event))
        }
        Op::Key { handler } => {
            let event = harness.key(40);
            OpOutcome::Dispatched(harness.send(&pick(handler), ConfirmationFlags::CONFIRMED, event))
        }
        Op::ConfirmTarget { block, handler } => {
            let target = pick(handler).shared();
            OpOutcome::Resolved(harness.queue_mut().set_confirmed_target(block, Some(target)).is_ok())
        }
        Op::ConfirmNoTarget { block } => {
            OpOutcome::Resolved(harness.queue_mut().set_confirmed_target(block, None).is_ok())
        }
        Op::ConfirmDrag { block, handler } => {
            let target = pick(handler).shared();
            let metrics = DragMetrics {
                view_id: block,
                direction: DragDirection::Vertical,
            };
            OpOutcome::Resolved(harness.queue_mut().confirm_drag_block(block, target, metrics).is_ok())
        }
        Op::ContentResponse {
            block,
            prevent_default,
        } => OpOutcome::Resolved(
            harness
                .queue_mut()
                .content_received_input_block(block, prevent_default)
                .is_ok(),
        ),
        Op::TouchBehaviors { block } => OpOutcome::Resolved(
            harness
                .queue_mut()
                .set_allowed_touch_behavior(block, vec![TouchBehavior::AUTO])
                .is_ok(),
        ),
        Op::BrowserGesture { block, consumed } => {
            let response = if consumed {
                BrowserGestureResponse::Consumed
            } else {
                BrowserGestureResponse::NotConsumed
            };
            OpOutcome::Resolved(
                harness
                    .queue_mut()
                    .set_browser_gesture_response(block, response)
                    .is_ok(),
            )
        }
        Op::InjectLongTap { handler } => {
            let target = pick(handler).shared();
            OpOutcome::Injected(harness.queue_mut().inject_new_touch_block(&target))
        }
        Op::Advance { ms } => OpOutcome::Fired(harness.advance(ms)),
    }
}

// ============================================================================
// Seeded storms
// ============================================================================

/// Simple deterministic PRNG (xorshift64) for reproducible storms.
struct Rng {
    state: u64,
}

impl Rng {
    fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    fn next(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    fn next_byte(&mut self) -> u8 {
        self.next().to_le_bytes()[0]
    }
}

/// Choose a storm seed from the environment or use `default_seed`.
pub fn fixture_seed(default_seed: u64) -> u64 {
    env_u64("INPUTQ_TEST_SEED")
        .or_else(|| env_u64("INPUTQ_SEED"))
        .unwrap_or(default_seed)
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// A generated storm and its bookkeeping.
#[derive(Debug, Clone)]
pub struct StormRun {
    pub seed: u64,
    pub ops: Vec<Op>,
    pub outcomes: Vec<OpOutcome>,
    /// One JSON object per line, see the module docs.
    pub log: Vec<String>,
}

/// Drive `harness` through `count` seeded ops, decoding each against the
/// queue's current block count.
pub fn generate_storm(
    harness: &mut Harness,
    handlers: &[Arc<RecordingHandler>],
    seed: u64,
    count: usize,
) -> StormRun {
    let mut rng = Rng::new(seed);
    let mut run = StormRun {
        seed,
        ops: Vec::with_capacity(count),
        outcomes: Vec::with_capacity(count),
        log: Vec::with_capacity(count + 2),
    };
    run.log.push(
        serde_json::json!({"event": "storm_start", "seed": seed, "op_count": count}).to_string(),
    );

    for idx in 0..count {
        let op = Op::decode(
            rng.next_byte(),
            rng.next_byte(),
            harness.queue().stats().blocks_created,
        );
        let outcome = apply(harness, handlers, &op);
        run.log.push(
            serde_json::json!({
                "event": "storm_op",
                "idx": idx,
                "op": format!("{op:?}"),
                "queued": harness.queue().queued_len(),
            })
            .to_string(),
        );
        run.ops.push(op);
        run.outcomes.push(outcome);
    }

    let stats = harness.queue().stats();
    run.log.push(
        serde_json::json!({
            "event": "storm_complete",
            "seed": seed,
            "dispatched": stats.events_dispatched,
            "dropped": stats.events_dropped,
            "rejected": stats.events_rejected,
            "queued": harness.queue().queued_len(),
        })
        .to_string(),
    );
    run
}

/// Structural checks that must hold after every public queue call.
/// Returns a description of the first violation.
pub fn check_invariants(harness: &Harness) -> Result<(), String> {
    let queue = harness.queue();

    for kind in [
        InputKind::Touch,
        InputKind::Wheel,
        InputKind::Drag,
        InputKind::PanGesture,
        InputKind::PinchGesture,
        InputKind::Keyboard,
    ] {
        if let Some(block) = queue.active_block(kind)
            && block.kind() != kind
        {
            return Err(format!("active {kind} slot holds a {} block", block.kind()));
        }
    }

    for entry in queue.queued_entries() {
        let Some(block) = queue.get_block_for_id(entry.block_id) else {
            return Err(format!("queued entry references missing block {}", entry.block_id));
        };
        if block.kind() != entry.event.kind() {
            return Err(format!(
                "{} event queued into {} block {}",
                entry.event.kind(),
                block.kind(),
                entry.block_id
            ));
        }
    }

    if let Some(front) = queue.current_block()
        && front.is_ready_for_handling()
    {
        return Err(format!("front block {} is ready but was not drained", front.id()));
    }

    let journal = harness.journal();
    if let Some(pair) = journal
        .windows(2)
        .find(|pair| pair[0].2.timestamp() >= pair[1].2.timestamp())
    {
        return Err(format!(
            "delivery out of order: block {} after block {}",
            pair[1].1, pair[0].1
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use inputq_core::QueueConfig;

    #[test]
    fn decode_covers_every_selector() {
        for selector in 0..OP_KINDS {
            for param in [0_u8, 1, 2, 3, 255] {
                let op = Op::decode(selector, param, 4);
                if let Op::ConfirmTarget { block, .. } | Op::ContentResponse { block, .. } = op {
                    assert!((1..=5).contains(&block));
                }
            }
        }
    }

    #[test]
    fn same_seed_same_storm() {
        let run = |seed| {
            let mut h = Harness::new(QueueConfig::default());
            let handlers = vec![h.handler(), h.handler()];
            generate_storm(&mut h, &handlers, seed, 64).ops
        };
        assert_eq!(run(11), run(11));
    }

    #[test]
    fn unset_seed_uses_default() {
        assert_eq!(env_u64("__INPUTQ_NEVER_SET_7c1e"), None);
    }

    #[test]
    fn log_is_jsonl() {
        let mut h = Harness::new(QueueConfig::default());
        let handlers = vec![h.handler()];
        let storm = generate_storm(&mut h, &handlers, 3, 8);
        assert_eq!(storm.log.len(), 10);
        for line in &storm.log {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("event").is_some());
        }
    }
}
