#![forbid(unsafe_code)]

//! The handler collaborator: the object that performs the effect of an event.
//!
//! A [`Handler`] is the candidate (and later confirmed) recipient of the
//! events of a block. The queue never inspects handler internals: it asks a
//! handful of questions (can these pointer events be consumed, is a fast
//! fling running, can the content scroll horizontally) and tells it what to
//! do (handle this event, reset gesture state, cancel animations, run this
//! task later).
//!
//! Handlers are shared through [`SharedHandler`] (`Arc<dyn Handler>`); one
//! handler may serve many blocks over time.

use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;

use crate::block::Block;
use crate::event::{InputEvent, PanGestureInput, TouchInput};
use crate::scheduler::TimeoutTask;

/// Identifier a handler reports for logging.
pub type HandlerId = u64;

/// Reference-counted handler handle.
pub type SharedHandler = Arc<dyn Handler>;

/// Local classification of an event by the queue or a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventStatus {
    /// Not used by the handler; content should handle it normally.
    Ignore,
    /// Used by the handler; content must not see it.
    ConsumeNoDefault,
    /// Possibly used by the handler; content still sees it.
    ConsumeDoDefault,
}

/// Why pointer events may or may not be consumed by a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumableFlags {
    /// The handler has room to scroll or zoom in the gesture's direction.
    pub has_room: bool,
    /// The touch behaviours of the block allow the gesture.
    pub allowed_by_touch_action: bool,
}

impl ConsumableFlags {
    /// Both conditions hold.
    pub const CONSUMABLE: Self = Self {
        has_room: true,
        allowed_by_touch_action: true,
    };

    /// Neither condition holds.
    pub const NOT_CONSUMABLE: Self = Self {
        has_room: false,
        allowed_by_touch_action: false,
    };

    #[must_use]
    pub const fn is_consumable(self) -> bool {
        self.has_room && self.allowed_by_touch_action
    }
}

impl Default for ConsumableFlags {
    fn default() -> Self {
        Self::NOT_CONSUMABLE
    }
}

bitflags! {
    /// Which animations a new block cancels on its handoff chain.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CancelAnimationFlags: u8 {
        /// Leave wheel-driven smooth scrolls running.
        const EXCLUDE_WHEEL      = 0b0000_0001;
        /// Leave overscroll animations running.
        const EXCLUDE_OVERSCROLL = 0b0000_0010;
        /// Snap to a scroll-snap point after cancelling.
        const SCROLL_SNAP        = 0b0000_0100;
    }
}

/// The confirmed recipient of a block's events.
///
/// All methods are called on the controller context. Implementations use
/// interior mutability for their own state.
pub trait Handler: Send + Sync {
    /// Identifier used in logs.
    fn id(&self) -> HandlerId;

    /// Apply an event whose block is ready for handling.
    fn handle_input_event(&self, event: &InputEvent, block: &Block) -> EventStatus;

    /// Whether touch events of `block` could be consumed, evaluated before
    /// the block is confirmed.
    fn are_pointer_events_consumable(&self, _block: &Block, _event: &TouchInput) -> ConsumableFlags {
        ConsumableFlags::CONSUMABLE
    }

    /// Forget in-progress touch gesture state. Called when a touch block is
    /// dropped or another handler takes over mid-gesture.
    fn reset_touch_input_state(&self) {}

    /// Forget in-progress pan gesture state. Called when a pan block is
    /// dropped.
    fn reset_pan_gesture_input_state(&self) {}

    /// Whether a fast fling is running anywhere on this handler's handoff
    /// chain.
    fn has_fast_fling(&self) -> bool {
        false
    }

    /// Whether an autoscroll is running anywhere on the handoff chain.
    fn has_autoscroll(&self) -> bool {
        false
    }

    /// Cancel animations on the handoff chain.
    fn cancel_animations(&self, _flags: CancelAnimationFlags) {}

    /// Whether the horizontal component of `event` would scroll this handler.
    fn can_scroll_horizontally(&self, _event: &PanGestureInput) -> bool {
        true
    }

    /// Distance a first touch may move before leaving slop, when the handler
    /// can consume the touch.
    fn touch_start_tolerance(&self) -> f32 {
        0.0
    }

    /// Distance a first touch may move before leaving slop, when the handler
    /// cannot consume the touch.
    fn touch_move_tolerance(&self) -> f32 {
        0.0
    }

    /// The handler has been torn down and must not start new transactions.
    fn is_destroyed(&self) -> bool {
        false
    }

    /// Run `task` on the controller context after `delay`.
    ///
    /// The queue never waits for the task; the embedder delivers it back via
    /// [`InputQueue::handle_timeout`](crate::queue::InputQueue::handle_timeout).
    fn post_delayed_task(&self, task: TimeoutTask, delay: Duration);
}

/// Whether two handles point at the same handler.
#[must_use]
pub fn same_handler(a: &SharedHandler, b: &SharedHandler) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// [`same_handler`] lifted over optional handles.
#[must_use]
pub fn same_target(a: Option<&SharedHandler>, b: Option<&SharedHandler>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => same_handler(a, b),
        (None, None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Null(HandlerId);

    impl Handler for Null {
        fn id(&self) -> HandlerId {
            self.0
        }
        fn handle_input_event(&self, _event: &InputEvent, _block: &Block) -> EventStatus {
            EventStatus::Ignore
        }
        fn post_delayed_task(&self, _task: TimeoutTask, _delay: Duration) {}
    }

    #[test]
    fn consumable_requires_both_flags() {
        assert!(ConsumableFlags::CONSUMABLE.is_consumable());
        assert!(!ConsumableFlags::NOT_CONSUMABLE.is_consumable());
        let partial = ConsumableFlags {
            has_room: true,
            allowed_by_touch_action: false,
        };
        assert!(!partial.is_consumable());
    }

    #[test]
    fn same_handler_compares_identity() {
        let a: SharedHandler = Arc::new(Null(1));
        let b: SharedHandler = Arc::new(Null(1));
        assert!(same_handler(&a, &a.clone()));
        assert!(!same_handler(&a, &b));
        assert!(same_target(None, None));
        assert!(!same_target(Some(&a), None));
    }
}
