#![forbid(unsafe_code)]

//! Input blocks: groups of events that share one confirmation outcome.
//!
//! A [`Block`] is a closed sum over six kinds that share a common state
//! struct. Two races are tracked per block:
//!
//! - **Target**: which handler receives the events. Starts
//!   [`TargetState::Unconfirmed`] unless the caller already knew the target,
//!   and is resolved once, either by an explicit confirmation or by timeout.
//! - **Content**: whether script prevented the default action. Starts
//!   [`ContentState::Pending`] and is resolved once, by an explicit response
//!   or by timeout.
//!
//! A block is ready for handling when both races are resolved and the
//! kind-specific extra conditions hold (touch-behaviour hints, long-tap
//! results, browser gesture responses).
//!
//! # Invariants
//!
//! 1. `id` never changes and is unique within one queue.
//! 2. `target_state` leaves `Unconfirmed` at most once; the target handler
//!    does not change afterwards.
//! 3. `content_state` leaves `Pending` at most once through the public
//!    setters. The only ways back are [`Block::rearm_content_timeout`] (a
//!    touch block leaving slop after a long tap, which only reopens a
//!    timed-out response) and [`Block::force_prevent_default`] (long-tap
//!    outcome transfer).
//! 4. Setters return `false` when they had no effect.

use web_time::{Duration, Instant};

use crate::event::{InputKind, Point, TouchBehavior, TouchInput, TouchPhase, WheelInput};
use crate::handler::SharedHandler;

/// Unique, strictly increasing block identifier.
pub type BlockId = u64;

/// Resolution of the target race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetState {
    Unconfirmed,
    Confirmed,
    TimedOut,
}

/// Resolution of the content race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentState {
    Pending,
    Accepted { prevent_default: bool },
    TimedOut,
}

/// What the caller already knows about the target of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfirmationFlags {
    /// The candidate handler is known to be correct.
    pub target_confirmed: bool,
    /// Events must be dropped unless the target is explicitly confirmed
    /// (timeouts are not enough).
    pub requires_target_confirmation: bool,
    /// The event hit a scrollbar.
    pub hit_scrollbar: bool,
    /// The event hit a scrollbar thumb.
    pub hit_scroll_thumb: bool,
}

impl ConfirmationFlags {
    /// Flags for a pre-confirmed target.
    pub const CONFIRMED: Self = Self {
        target_confirmed: true,
        requires_target_confirmation: false,
        hit_scrollbar: false,
        hit_scroll_thumb: false,
    };

    /// Flags for a target that still needs hit-test confirmation.
    pub const UNCONFIRMED: Self = Self {
        target_confirmed: false,
        requires_target_confirmation: false,
        hit_scrollbar: false,
        hit_scroll_thumb: false,
    };

    #[must_use]
    pub const fn on_scrollbar(mut self, thumb: bool) -> Self {
        self.hit_scrollbar = true;
        self.hit_scroll_thumb = thumb;
        self
    }
}

/// Answer of the browser to "is this pan a swipe navigation?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrowserGestureResponse {
    NotConsumed,
    Consumed,
}

/// Axis of a scrollbar drag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DragDirection {
    Horizontal,
    Vertical,
}

/// Scrollbar drag metrics supplied with a drag confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DragMetrics {
    /// Scroll container whose scrollbar is dragged.
    pub view_id: u64,
    pub direction: DragDirection,
}

// ---------------------------------------------------------------------------
// Kind-specific data
// ---------------------------------------------------------------------------

/// Touch block state.
#[derive(Debug, Clone, Default)]
pub struct TouchBlock {
    allowed_behaviors: Option<Vec<TouchBehavior>>,
    /// Behaviour hints gate readiness.
    touch_action_required: bool,
    during_fast_fling: bool,
    in_slop: bool,
    slop_origin: Point,
    for_long_tap: bool,
    waiting_long_tap_result: bool,
    long_tap_processed: bool,
    needs_to_wait_touch_move: bool,
}

impl TouchBlock {
    pub(crate) fn new(touch_action_required: bool) -> Self {
        Self {
            touch_action_required,
            ..Self::default()
        }
    }

    /// Behaviours per touch point, once known.
    #[must_use]
    pub fn allowed_behaviors(&self) -> Option<&[TouchBehavior]> {
        self.allowed_behaviors.as_deref()
    }

    #[must_use]
    pub fn has_allowed_touch_behaviors(&self) -> bool {
        self.allowed_behaviors.is_some()
    }

    /// Store behaviour hints. Returns `false` if they were already set.
    pub(crate) fn set_allowed_touch_behaviors(&mut self, behaviors: Vec<TouchBehavior>) -> bool {
        if self.allowed_behaviors.is_some() {
            return false;
        }
        self.allowed_behaviors = Some(behaviors);
        true
    }

    /// Intersection of the behaviours of all touch points.
    #[must_use]
    pub fn combined_behavior(&self) -> Option<TouchBehavior> {
        self.allowed_behaviors.as_ref().map(|all| {
            all.iter()
                .fold(TouchBehavior::AUTO, |acc, behavior| acc & *behavior)
        })
    }

    #[must_use]
    pub fn is_during_fast_fling(&self) -> bool {
        self.during_fast_fling
    }

    pub(crate) fn set_during_fast_fling(&mut self) {
        self.during_fast_fling = true;
    }

    #[must_use]
    pub fn is_in_slop(&self) -> bool {
        self.in_slop
    }

    #[must_use]
    pub fn for_long_tap(&self) -> bool {
        self.for_long_tap
    }

    #[must_use]
    pub fn is_waiting_long_tap_result(&self) -> bool {
        self.waiting_long_tap_result
    }

    pub(crate) fn set_waiting_long_tap_result(&mut self, waiting: bool) {
        self.waiting_long_tap_result = waiting;
    }

    #[must_use]
    pub fn was_long_tap_processed(&self) -> bool {
        self.long_tap_processed
    }

    pub(crate) fn set_long_tap_processed(&mut self) {
        self.waiting_long_tap_result = false;
        self.long_tap_processed = true;
    }

    #[must_use]
    pub fn needs_to_wait_touch_move(&self) -> bool {
        self.needs_to_wait_touch_move
    }

    pub(crate) fn set_needs_to_wait_touch_move(&mut self, wait: bool) {
        self.needs_to_wait_touch_move = wait;
    }

    /// Behaviour hints are known, or the block does not wait for them.
    #[must_use]
    pub fn behaviors_known(&self) -> bool {
        !self.touch_action_required || self.allowed_behaviors.is_some()
    }

    /// Track the slop region of a single-finger touch.
    ///
    /// A touch-start with exactly one point enters slop. Later events stay
    /// in slop while they are single-point moves within `tolerance` of the
    /// start. Returns whether the block is in slop after `event`; the
    /// touch-start itself always returns `false`.
    pub(crate) fn update_slop_state(&mut self, event: &TouchInput, tolerance: f32) -> bool {
        if event.phase == TouchPhase::Start {
            self.in_slop = event.touches.len() == 1;
            if let Some(first) = event.touches.first()
                && self.in_slop
            {
                self.slop_origin = first.position;
            }
            return false;
        }
        if self.in_slop {
            let stay = event.phase == TouchPhase::Move
                && event.touches.len() == 1
                && event.touches[0].position.distance(self.slop_origin) < tolerance;
            if !stay {
                self.in_slop = false;
            }
        }
        self.in_slop
    }
}

/// Wheel transaction state.
#[derive(Debug, Clone)]
pub struct WheelBlock {
    transaction_ended: bool,
    last_event_time: Instant,
    scroll_series: u32,
}

impl WheelBlock {
    pub(crate) fn new(first_event: &WheelInput) -> Self {
        Self {
            transaction_ended: false,
            last_event_time: first_event.timestamp,
            scroll_series: 0,
        }
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        !self.transaction_ended
    }

    pub(crate) fn end_transaction(&mut self) {
        self.transaction_ended = true;
    }

    /// End the transaction if `event` arrives more than `timeout` after the
    /// previous one. Returns whether it ended.
    pub(crate) fn maybe_timeout(&mut self, event: &WheelInput, timeout: Duration) -> bool {
        if self.transaction_ended {
            return true;
        }
        let gap = event
            .timestamp
            .saturating_duration_since(self.last_event_time);
        if gap > timeout {
            self.transaction_ended = true;
            return true;
        }
        false
    }

    /// Record a queued event and stamp its series number.
    pub(crate) fn update(&mut self, event: &mut WheelInput) {
        self.scroll_series = self.scroll_series.saturating_add(1);
        event.scroll_series = self.scroll_series;
        self.last_event_time = event.timestamp;
    }

    /// Number of events in the transaction so far.
    #[must_use]
    pub fn scroll_series(&self) -> u32 {
        self.scroll_series
    }
}

/// Mouse drag state.
#[derive(Debug, Clone, Default)]
pub struct DragBlock {
    received_mouse_up: bool,
    metrics: Option<DragMetrics>,
}

impl DragBlock {
    #[must_use]
    pub fn has_received_mouse_up(&self) -> bool {
        self.received_mouse_up
    }

    pub(crate) fn mark_mouse_up_received(&mut self) {
        self.received_mouse_up = true;
    }

    #[must_use]
    pub fn drag_metrics(&self) -> Option<DragMetrics> {
        self.metrics
    }
}

/// Trackpad pan state.
#[derive(Debug, Clone, Default)]
pub struct PanGestureBlock {
    interrupted: bool,
    waiting_for_content_response: bool,
    waiting_for_browser_gesture_response: bool,
    started_browser_gesture: bool,
}

impl PanGestureBlock {
    #[must_use]
    pub fn was_interrupted(&self) -> bool {
        self.interrupted
    }

    pub(crate) fn set_interrupted(&mut self) {
        self.interrupted = true;
    }

    /// The block needs an explicit content decision even with a confirmed
    /// target.
    #[must_use]
    pub fn is_waiting_for_content_response(&self) -> bool {
        self.waiting_for_content_response
    }

    pub(crate) fn set_needs_to_wait_for_content_response(&mut self, wait: bool) {
        self.waiting_for_content_response = wait;
    }

    #[must_use]
    pub fn is_waiting_for_browser_gesture_response(&self) -> bool {
        self.waiting_for_browser_gesture_response
    }

    pub(crate) fn set_needs_to_wait_for_browser_gesture_response(&mut self, wait: bool) {
        self.waiting_for_browser_gesture_response = wait;
    }

    /// The browser took the gesture for a swipe; events are dropped.
    #[must_use]
    pub fn started_browser_gesture(&self) -> bool {
        self.started_browser_gesture
    }
}

/// Trackpad pinch state.
#[derive(Debug, Clone, Default)]
pub struct PinchGestureBlock {
    interrupted: bool,
    ended: bool,
}

impl PinchGestureBlock {
    #[must_use]
    pub fn was_interrupted(&self) -> bool {
        self.interrupted
    }

    #[must_use]
    pub fn has_ended(&self) -> bool {
        self.ended
    }

    pub(crate) fn mark_ended(&mut self) {
        self.ended = true;
    }
}

/// Kind-specific part of a block.
#[derive(Debug, Clone)]
pub enum BlockData {
    Touch(TouchBlock),
    Wheel(WheelBlock),
    Drag(DragBlock),
    PanGesture(PanGestureBlock),
    PinchGesture(PinchGestureBlock),
    Keyboard,
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// A group of input events sharing one confirmation outcome.
#[derive(Clone)]
pub struct Block {
    id: BlockId,
    target: Option<SharedHandler>,
    target_state: TargetState,
    target_originally_confirmed: bool,
    requires_target_confirmation: bool,
    content_state: ContentState,
    content_timer_expired: bool,
    scroll_handoff_allowed: bool,
    data: BlockData,
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("target", &self.target.as_ref().map(|t| t.id()))
            .field("target_state", &self.target_state)
            .field("content_state", &self.content_state)
            .field("content_timer_expired", &self.content_timer_expired)
            .field("scroll_handoff_allowed", &self.scroll_handoff_allowed)
            .field("data", &self.data)
            .finish()
    }
}

impl Block {
    pub(crate) fn new(
        id: BlockId,
        target: Option<SharedHandler>,
        flags: ConfirmationFlags,
        data: BlockData,
    ) -> Self {
        Self {
            id,
            target,
            target_state: if flags.target_confirmed {
                TargetState::Confirmed
            } else {
                TargetState::Unconfirmed
            },
            target_originally_confirmed: flags.target_confirmed,
            requires_target_confirmation: flags.requires_target_confirmation,
            content_state: ContentState::Pending,
            content_timer_expired: false,
            scroll_handoff_allowed: true,
            data,
        }
    }

    #[must_use]
    pub fn id(&self) -> BlockId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> InputKind {
        match self.data {
            BlockData::Touch(_) => InputKind::Touch,
            BlockData::Wheel(_) => InputKind::Wheel,
            BlockData::Drag(_) => InputKind::Drag,
            BlockData::PanGesture(_) => InputKind::PanGesture,
            BlockData::PinchGesture(_) => InputKind::PinchGesture,
            BlockData::Keyboard => InputKind::Keyboard,
        }
    }

    /// Current (candidate or confirmed) target.
    #[must_use]
    pub fn target(&self) -> Option<&SharedHandler> {
        self.target.as_ref()
    }

    #[must_use]
    pub fn target_state(&self) -> TargetState {
        self.target_state
    }

    #[must_use]
    pub fn content_state(&self) -> ContentState {
        self.content_state
    }

    #[must_use]
    pub fn data(&self) -> &BlockData {
        &self.data
    }

    /// Scroll from this block may be handed off to enclosing scrollers.
    #[must_use]
    pub fn allow_scroll_handoff(&self) -> bool {
        self.scroll_handoff_allowed
    }

    /// Latch scroll to the current scroller for the rest of the block.
    /// Only wheel, pan and keyboard blocks carry the restriction.
    pub(crate) fn disallow_scroll_handoff(&mut self) -> bool {
        let gated = matches!(
            self.data,
            BlockData::Wheel(_) | BlockData::PanGesture(_) | BlockData::Keyboard
        );
        if !gated || !self.scroll_handoff_allowed {
            return false;
        }
        self.scroll_handoff_allowed = false;
        true
    }

    #[must_use]
    pub fn is_target_confirmed(&self) -> bool {
        self.target_state != TargetState::Unconfirmed
    }

    /// The caller knew the target when the block was created.
    #[must_use]
    pub fn is_target_originally_confirmed(&self) -> bool {
        self.target_originally_confirmed
    }

    #[must_use]
    pub fn has_content_responded(&self) -> bool {
        matches!(self.content_state, ContentState::Accepted { .. })
    }

    /// The deferred fallback fired for this block at least once (and was not
    /// re-armed since).
    #[must_use]
    pub fn is_content_response_timer_expired(&self) -> bool {
        self.content_timer_expired
    }

    #[must_use]
    pub fn is_default_prevented(&self) -> bool {
        self.content_state
            == ContentState::Accepted {
                prevent_default: true,
            }
    }

    // -- capability queries -------------------------------------------------

    #[must_use]
    pub fn as_touch(&self) -> Option<&TouchBlock> {
        match &self.data {
            BlockData::Touch(t) => Some(t),
            _ => None,
        }
    }

    pub(crate) fn as_touch_mut(&mut self) -> Option<&mut TouchBlock> {
        match &mut self.data {
            BlockData::Touch(t) => Some(t),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_wheel(&self) -> Option<&WheelBlock> {
        match &self.data {
            BlockData::Wheel(w) => Some(w),
            _ => None,
        }
    }

    pub(crate) fn as_wheel_mut(&mut self) -> Option<&mut WheelBlock> {
        match &mut self.data {
            BlockData::Wheel(w) => Some(w),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_drag(&self) -> Option<&DragBlock> {
        match &self.data {
            BlockData::Drag(d) => Some(d),
            _ => None,
        }
    }

    pub(crate) fn as_drag_mut(&mut self) -> Option<&mut DragBlock> {
        match &mut self.data {
            BlockData::Drag(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_pan_gesture(&self) -> Option<&PanGestureBlock> {
        match &self.data {
            BlockData::PanGesture(p) => Some(p),
            _ => None,
        }
    }

    pub(crate) fn as_pan_gesture_mut(&mut self) -> Option<&mut PanGestureBlock> {
        match &mut self.data {
            BlockData::PanGesture(p) => Some(p),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_pinch_gesture(&self) -> Option<&PinchGestureBlock> {
        match &self.data {
            BlockData::PinchGesture(p) => Some(p),
            _ => None,
        }
    }

    pub(crate) fn as_pinch_gesture_mut(&mut self) -> Option<&mut PinchGestureBlock> {
        match &mut self.data {
            BlockData::PinchGesture(p) => Some(p),
            _ => None,
        }
    }

    // -- state transitions --------------------------------------------------

    /// Resolve the target race. `state` must be `Confirmed` or `TimedOut`.
    pub(crate) fn set_confirmed_target(
        &mut self,
        target: Option<SharedHandler>,
        state: TargetState,
    ) -> bool {
        debug_assert_ne!(state, TargetState::Unconfirmed);
        if self.target_state != TargetState::Unconfirmed {
            return false;
        }
        self.target_state = state;
        self.target = target;
        true
    }

    /// Resolve the content race with an explicit response.
    pub(crate) fn set_content_response(&mut self, prevent_default: bool) -> bool {
        let mut changed = false;
        if self.content_state == ContentState::Pending {
            self.content_state = ContentState::Accepted { prevent_default };
            changed = true;
        }
        if let BlockData::PanGesture(pan) = &mut self.data
            && pan.waiting_for_content_response
        {
            pan.waiting_for_content_response = false;
            changed = true;
        }
        if let BlockData::PinchGesture(pinch) = &mut self.data
            && changed
            && prevent_default
        {
            pinch.interrupted = true;
        }
        changed
    }

    /// Fire the deferred fallback on the content race. Also releases a pan
    /// block still waiting for a browser gesture response.
    pub(crate) fn timeout_content_response(&mut self) -> bool {
        let mut changed = false;
        if !self.content_timer_expired {
            self.content_timer_expired = true;
            changed = true;
        }
        if self.content_state == ContentState::Pending {
            self.content_state = ContentState::TimedOut;
            changed = true;
        }
        if let BlockData::PanGesture(pan) = &mut self.data {
            if pan.waiting_for_browser_gesture_response {
                pan.waiting_for_browser_gesture_response = false;
                changed = true;
            }
            pan.waiting_for_content_response = false;
        }
        changed
    }

    /// Reopen a timed-out content race so a new fallback can be scheduled.
    /// Explicit responses are kept. Returns whether the race was reopened.
    pub(crate) fn rearm_content_timeout(&mut self) -> bool {
        self.content_timer_expired = false;
        if self.content_state == ContentState::TimedOut {
            self.content_state = ContentState::Pending;
            return true;
        }
        false
    }

    /// Overwrite the content outcome with "prevented". Used to carry a
    /// prevented long-tap onto the touch block it substituted.
    pub(crate) fn force_prevent_default(&mut self) {
        self.content_timer_expired = false;
        self.content_state = ContentState::Accepted {
            prevent_default: true,
        };
    }

    pub(crate) fn set_allowed_touch_behaviors(&mut self, behaviors: Vec<TouchBehavior>) -> bool {
        match &mut self.data {
            BlockData::Touch(t) => t.set_allowed_touch_behaviors(behaviors),
            _ => false,
        }
    }

    pub(crate) fn set_browser_gesture_response(&mut self, response: BrowserGestureResponse) -> bool {
        match &mut self.data {
            BlockData::PanGesture(pan) => {
                let changed = pan.waiting_for_browser_gesture_response;
                pan.waiting_for_browser_gesture_response = false;
                pan.started_browser_gesture = response == BrowserGestureResponse::Consumed;
                changed
            }
            _ => false,
        }
    }

    pub(crate) fn set_drag_metrics(&mut self, metrics: DragMetrics) {
        if let BlockData::Drag(drag) = &mut self.data {
            drag.metrics = Some(metrics);
        }
    }

    /// Start a long-tap substitute from `other`: same target and target
    /// state, same behaviour hints.
    pub(crate) fn copy_properties_from(&mut self, other: &Block) {
        self.target = other.target.clone();
        self.target_state = match other.target_state {
            TargetState::Unconfirmed => self.target_state,
            resolved => resolved,
        };
        if let (BlockData::Touch(mine), BlockData::Touch(theirs)) = (&mut self.data, &other.data) {
            mine.allowed_behaviors = theirs.allowed_behaviors.clone();
            mine.touch_action_required = theirs.touch_action_required;
        }
    }

    pub(crate) fn set_for_long_tap(&mut self) {
        if let BlockData::Touch(t) = &mut self.data {
            t.for_long_tap = true;
        }
    }

    // -- derived decisions --------------------------------------------------

    /// Both races are resolved and no kind-specific wait remains.
    #[must_use]
    pub fn is_ready_for_handling(&self) -> bool {
        if self.target_state == TargetState::Unconfirmed {
            return false;
        }
        if self.content_state == ContentState::Pending {
            return false;
        }
        match &self.data {
            BlockData::Touch(t) => {
                (t.behaviors_known() || self.content_timer_expired) && !t.waiting_long_tap_result
            }
            BlockData::PanGesture(p) => {
                !p.waiting_for_browser_gesture_response && !p.waiting_for_content_response
            }
            _ => true,
        }
    }

    /// A registered block callback may run. Touch blocks that timed out in
    /// slop hold their callback until the next touch-move.
    #[must_use]
    pub fn is_ready_for_callback(&self) -> bool {
        match &self.data {
            BlockData::Touch(t) => !t.needs_to_wait_touch_move,
            _ => true,
        }
    }

    /// The block must not be discarded even when drained.
    #[must_use]
    pub fn must_stay_active(&self) -> bool {
        match &self.data {
            BlockData::Touch(t) => !t.for_long_tap,
            BlockData::Wheel(w) => w.in_transaction(),
            BlockData::Drag(d) => !d.received_mouse_up,
            BlockData::PanGesture(p) => !p.interrupted,
            BlockData::PinchGesture(p) => !(p.interrupted || p.ended),
            BlockData::Keyboard => true,
        }
    }

    /// Events of this block are not delivered; the handler's gesture state
    /// is reset instead.
    #[must_use]
    pub fn should_drop_events(&self) -> bool {
        if self.requires_target_confirmation && self.target_state != TargetState::Confirmed {
            return true;
        }
        if self.is_default_prevented() {
            return true;
        }
        matches!(&self.data, BlockData::PanGesture(p) if p.started_browser_gesture)
    }

    /// The block must wait for an explicit content decision even when its
    /// target is already known.
    #[must_use]
    pub fn requires_content_decision(&self) -> bool {
        match &self.data {
            BlockData::PinchGesture(_) => true,
            BlockData::PanGesture(p) => p.waiting_for_content_response,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch_block(flags: ConfirmationFlags, touch_action: bool) -> Block {
        Block::new(1, None, flags, BlockData::Touch(TouchBlock::new(touch_action)))
    }

    #[test]
    fn target_confirmation_is_one_shot() {
        let mut b = touch_block(ConfirmationFlags::UNCONFIRMED, false);
        assert!(!b.is_target_confirmed());
        assert!(b.set_confirmed_target(None, TargetState::Confirmed));
        assert!(!b.set_confirmed_target(None, TargetState::TimedOut));
        assert_eq!(b.target_state(), TargetState::Confirmed);
    }

    #[test]
    fn content_response_is_one_shot() {
        let mut b = touch_block(ConfirmationFlags::CONFIRMED, false);
        assert!(b.set_content_response(true));
        assert!(!b.set_content_response(false));
        assert!(b.is_default_prevented());
    }

    #[test]
    fn timeout_after_response_keeps_response() {
        let mut b = touch_block(ConfirmationFlags::CONFIRMED, false);
        assert!(b.set_content_response(false));
        assert!(b.timeout_content_response());
        assert_eq!(
            b.content_state(),
            ContentState::Accepted {
                prevent_default: false
            }
        );
        assert!(b.is_content_response_timer_expired());
        assert!(!b.timeout_content_response());
    }

    #[test]
    fn response_after_timeout_has_no_effect() {
        let mut b = touch_block(ConfirmationFlags::CONFIRMED, false);
        assert!(b.timeout_content_response());
        assert!(!b.set_content_response(true));
        assert_eq!(b.content_state(), ContentState::TimedOut);
        assert!(!b.is_default_prevented());
    }

    #[test]
    fn readiness_requires_both_races() {
        let mut b = touch_block(ConfirmationFlags::UNCONFIRMED, false);
        assert!(!b.is_ready_for_handling());
        b.set_content_response(false);
        assert!(!b.is_ready_for_handling());
        b.set_confirmed_target(None, TargetState::Confirmed);
        assert!(b.is_ready_for_handling());
    }

    #[test]
    fn touch_waits_for_behaviors_unless_timer_expired() {
        let mut b = touch_block(ConfirmationFlags::CONFIRMED, true);
        b.set_content_response(false);
        assert!(!b.is_ready_for_handling());
        assert!(!b.as_touch().unwrap().has_allowed_touch_behaviors());
        assert!(b.set_allowed_touch_behaviors(vec![TouchBehavior::VERTICAL_PAN]));
        assert!(b.as_touch().unwrap().has_allowed_touch_behaviors());
        assert!(b.is_ready_for_handling());
        assert!(!b.set_allowed_touch_behaviors(vec![TouchBehavior::AUTO]));

        let mut c = touch_block(ConfirmationFlags::CONFIRMED, true);
        c.set_content_response(false);
        c.timeout_content_response();
        assert!(c.is_ready_for_handling());
    }

    #[test]
    fn waiting_long_tap_result_blocks_readiness() {
        let mut b = touch_block(ConfirmationFlags::CONFIRMED, false);
        b.set_content_response(false);
        b.as_touch_mut().unwrap().set_waiting_long_tap_result(true);
        assert!(!b.is_ready_for_handling());
        b.as_touch_mut().unwrap().set_long_tap_processed();
        assert!(b.is_ready_for_handling());
        assert!(b.as_touch().unwrap().was_long_tap_processed());
    }

    #[test]
    fn slop_tracking() {
        let now = Instant::now();
        let mut t = TouchBlock::new(false);
        let start = TouchInput::new(TouchPhase::Start, now).with_touch(0, 10.0, 10.0);
        assert!(!t.update_slop_state(&start, 5.0));
        assert!(t.is_in_slop());
        let near = TouchInput::new(TouchPhase::Move, now).with_touch(0, 12.0, 10.0);
        assert!(t.update_slop_state(&near, 5.0));
        let far = TouchInput::new(TouchPhase::Move, now).with_touch(0, 30.0, 10.0);
        assert!(!t.update_slop_state(&far, 5.0));
        assert!(!t.is_in_slop());
        // never re-enters
        assert!(!t.update_slop_state(&near, 5.0));
    }

    #[test]
    fn two_finger_start_skips_slop() {
        let now = Instant::now();
        let mut t = TouchBlock::new(false);
        let start = TouchInput::new(TouchPhase::Start, now)
            .with_touch(0, 10.0, 10.0)
            .with_touch(1, 50.0, 50.0);
        t.update_slop_state(&start, 5.0);
        assert!(!t.is_in_slop());
    }

    #[test]
    fn wheel_transaction_times_out() {
        let now = Instant::now();
        let first = WheelInput::new(0.0, 1.0, now);
        let mut w = WheelBlock::new(&first);
        let mut queued = first.clone();
        w.update(&mut queued);
        assert_eq!(queued.scroll_series, 1);
        let soon = WheelInput::new(0.0, 1.0, now + Duration::from_millis(100));
        assert!(!w.maybe_timeout(&soon, Duration::from_millis(1500)));
        let late = WheelInput::new(0.0, 1.0, now + Duration::from_millis(5000));
        assert!(w.maybe_timeout(&late, Duration::from_millis(1500)));
        assert!(!w.in_transaction());
    }

    #[test]
    fn pan_waits_for_browser_gesture() {
        let mut b = Block::new(
            3,
            None,
            ConfirmationFlags::CONFIRMED,
            BlockData::PanGesture(PanGestureBlock::default()),
        );
        b.as_pan_gesture_mut()
            .unwrap()
            .set_needs_to_wait_for_browser_gesture_response(true);
        assert!(!b.as_pan_gesture().unwrap().is_waiting_for_content_response());
        assert!(!b.requires_content_decision());
        b.as_pan_gesture_mut()
            .unwrap()
            .set_needs_to_wait_for_content_response(true);
        assert!(b.as_pan_gesture().unwrap().is_waiting_for_content_response());
        assert!(b.requires_content_decision());
        b.set_content_response(false);
        assert!(!b.is_ready_for_handling());
        assert!(b.set_browser_gesture_response(BrowserGestureResponse::Consumed));
        assert!(b.is_ready_for_handling());
        assert!(b.should_drop_events());
    }

    #[test]
    fn pan_timeout_releases_browser_gesture_wait() {
        let mut b = Block::new(
            3,
            None,
            ConfirmationFlags::CONFIRMED,
            BlockData::PanGesture(PanGestureBlock::default()),
        );
        b.as_pan_gesture_mut()
            .unwrap()
            .set_needs_to_wait_for_browser_gesture_response(true);
        b.set_content_response(false);
        assert!(b.timeout_content_response());
        assert!(b.is_ready_for_handling());
        assert!(!b.should_drop_events());
    }

    #[test]
    fn pinch_prevented_is_interrupted() {
        let mut b = Block::new(
            4,
            None,
            ConfirmationFlags::CONFIRMED,
            BlockData::PinchGesture(PinchGestureBlock::default()),
        );
        assert!(b.requires_content_decision());
        assert!(b.must_stay_active());
        b.set_content_response(true);
        assert!(b.as_pinch_gesture().unwrap().was_interrupted());
        assert!(!b.must_stay_active());
    }

    #[test]
    fn required_target_confirmation_drops_on_timeout() {
        let flags = ConfirmationFlags {
            requires_target_confirmation: true,
            ..ConfirmationFlags::UNCONFIRMED
        };
        let mut b = Block::new(5, None, flags, BlockData::Drag(DragBlock::default()));
        b.set_confirmed_target(None, TargetState::TimedOut);
        b.timeout_content_response();
        assert!(b.is_ready_for_handling());
        assert!(b.should_drop_events());
    }

    #[test]
    fn rearm_only_reopens_timeouts() {
        let mut b = touch_block(ConfirmationFlags::CONFIRMED, false);
        b.timeout_content_response();
        assert!(b.rearm_content_timeout());
        assert_eq!(b.content_state(), ContentState::Pending);
        b.set_content_response(false);
        assert!(!b.rearm_content_timeout());
        assert!(b.has_content_responded());
    }

    #[test]
    fn combined_behavior_intersects_points() {
        let mut t = TouchBlock::new(true);
        t.set_allowed_touch_behaviors(vec![
            TouchBehavior::VERTICAL_PAN | TouchBehavior::PINCH_ZOOM,
            TouchBehavior::VERTICAL_PAN,
        ]);
        assert_eq!(t.combined_behavior(), Some(TouchBehavior::VERTICAL_PAN));
    }

    #[test]
    fn discard_rules_per_kind() {
        let keyboard = Block::new(6, None, ConfirmationFlags::CONFIRMED, BlockData::Keyboard);
        assert!(keyboard.must_stay_active());
        let mut long_tap = touch_block(ConfirmationFlags::CONFIRMED, false);
        assert!(long_tap.must_stay_active());
        long_tap.set_for_long_tap();
        assert!(!long_tap.must_stay_active());
        let mut drag = Block::new(7, None, ConfirmationFlags::CONFIRMED, BlockData::Drag(DragBlock::default()));
        assert!(drag.must_stay_active());
        drag.as_drag_mut().unwrap().mark_mouse_up_received();
        assert!(!drag.must_stay_active());
    }

    #[test]
    fn scroll_handoff_latch_applies_to_scrolling_kinds() {
        let mut wheel = Block::new(
            8,
            None,
            ConfirmationFlags::CONFIRMED,
            BlockData::Wheel(WheelBlock::new(&WheelInput::new(0.0, 1.0, Instant::now()))),
        );
        assert!(matches!(wheel.data(), BlockData::Wheel(_)));
        assert!(wheel.allow_scroll_handoff());
        assert!(wheel.disallow_scroll_handoff());
        assert!(!wheel.allow_scroll_handoff());
        assert!(!wheel.disallow_scroll_handoff());

        let mut keyboard = Block::new(9, None, ConfirmationFlags::CONFIRMED, BlockData::Keyboard);
        assert!(keyboard.disallow_scroll_handoff());

        let mut touch = touch_block(ConfirmationFlags::CONFIRMED, false);
        assert!(matches!(touch.data(), BlockData::Touch(_)));
        assert!(!touch.disallow_scroll_handoff());
        assert!(touch.allow_scroll_handoff());
    }
}
