#![forbid(unsafe_code)]

//! What the queue reports back to the caller of an intake method.

use crate::block::BlockId;
use crate::handler::EventStatus;

/// Where an event ended up, as far as content is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandledPlace {
    /// Nobody consumed the event.
    Unhandled,
    /// Content consumed it (prevented the default action).
    HandledByContent,
    /// The handler consumed it (scroll, zoom, swipe).
    HandledByHandler,
}

/// Outcome of a block for one of its events, passed to block callbacks and
/// reported from intake when already known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandledResult {
    pub place: HandledPlace,
    /// The handler's target state was confirmed explicitly rather than by
    /// timeout.
    pub target_confirmed: bool,
}

impl HandledResult {
    #[must_use]
    pub const fn new(place: HandledPlace, target_confirmed: bool) -> Self {
        Self {
            place,
            target_confirmed,
        }
    }
}

/// Result of [`InputQueue::receive_input_event`](crate::queue::InputQueue::receive_input_event).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchResult {
    /// Block the event was queued into; `None` when the event was dropped at
    /// intake.
    pub block_id: Option<BlockId>,
    /// Local classification of the event.
    pub status: EventStatus,
    /// Already-decided outcome, when the block was ready at intake.
    pub handled: Option<HandledResult>,
    /// A click following this mouse event must be suppressed.
    pub prevent_click: bool,
}

impl DispatchResult {
    /// The event did not enter any block.
    #[must_use]
    pub const fn not_queued(status: EventStatus) -> Self {
        Self {
            block_id: None,
            status,
            handled: None,
            prevent_click: false,
        }
    }

    #[must_use]
    pub const fn queued(block_id: BlockId, status: EventStatus) -> Self {
        Self {
            block_id: Some(block_id),
            status,
            handled: None,
            prevent_click: false,
        }
    }

    #[must_use]
    pub fn was_queued(&self) -> bool {
        self.block_id.is_some()
    }
}
