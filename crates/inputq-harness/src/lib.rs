#![forbid(unsafe_code)]

//! Test harness and reference fixtures for inputq.
//!
//! - [`RecordingHandler`] - handler that records every call the queue makes
//! - [`Harness`] - queue + mailbox + virtual clock, with event builders
//! - [`storm`] - deterministic op sequences and structural invariant checks
//!
//! # Example
//!
//! ```
//! use inputq_core::{ConfirmationFlags, QueueConfig, TouchPhase};
//! use inputq_harness::Harness;
//!
//! let mut h = Harness::new(QueueConfig::default().with_touch_action(false));
//! let target = h.handler();
//! let start = h.touch(TouchPhase::Start, 0.0, 0.0);
//! let id = h.send(&target, ConfirmationFlags::UNCONFIRMED, start).block_id.unwrap();
//!
//! // Nothing is delivered until the content timeout fires.
//! assert!(target.handled().is_empty());
//! h.advance(400);
//! assert_eq!(target.handled_blocks(), vec![id]);
//! ```

pub mod harness;
pub mod recording;
pub mod storm;

pub use harness::{FiredTimeout, Harness};
pub use recording::{HandlerCall, HandlerSettings, Journal, RecordingHandler, VirtualClock};
pub use storm::{
    Op, OpOutcome, StormRun, apply, check_invariants, fixture_seed, generate_storm,
};
