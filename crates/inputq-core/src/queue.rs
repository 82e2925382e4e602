#![forbid(unsafe_code)]

//! The input queue: ordered, confirmation-gated delivery of input blocks.
//!
//! [`InputQueue`] receives raw events on the controller context, groups them
//! into [`Block`]s and delivers them to the block's handler once the block is
//! ready. Readiness depends on two races per block (target and content, see
//! [`crate::block`]) plus kind-specific waits. Nothing ever blocks: a block
//! that is not ready simply holds back the queue until a resolution message
//! or its fallback timeout arrives.
//!
//! # Invariants
//!
//! 1. Entries are delivered in arrival order; only a ready prefix of the
//!    queue is ever drained.
//! 2. At most one block per kind is active. Touch additionally keeps the
//!    original block while a long-tap substitute is active.
//! 3. An active block is released only when it is ready, no queued entry
//!    references it, and it does not need to stay active.
//! 4. Block ids are strictly increasing and never reused.
//! 5. Resolution messages for unknown ids are reported, never panicked on.
//!
//! # Failure Modes
//!
//! - Non-start events for a gesture with no block are dropped with a
//!   `warn!` and counted in [`QueueStats::events_rejected`].
//! - Timeouts and responses for discarded blocks return
//!   [`ResolveError::UnknownBlock`] and are counted in
//!   [`QueueStats::stale_messages`].
//! - A block whose confirmed target is `None` drains without delivery.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::thread::ThreadId;

use crate::block::{
    Block, BlockData, BlockId, BrowserGestureResponse, ConfirmationFlags, DragBlock, DragMetrics,
    PanGestureBlock, PinchGestureBlock, TargetState, TouchBlock, WheelBlock,
};
use crate::config::QueueConfig;
use crate::error::ResolveError;
use crate::event::{
    InputEvent, InputKind, KeyboardInput, MouseInput, MouseKind, PanGestureInput, PanPhase,
    PinchGestureInput, PinchPhase, TouchBehavior, TouchInput, TouchPhase, WheelInput,
};
use crate::handler::{
    CancelAnimationFlags, ConsumableFlags, EventStatus, SharedHandler, same_handler, same_target,
};
use crate::logging::TARGET;
use crate::result::{DispatchResult, HandledPlace, HandledResult};
use crate::scheduler::{ConfirmationScheduler, TimeoutKind, TimeoutTask};
use crate::tracker::{DragTracker, TouchCounter};

/// One-shot notification that a block reached the front of the queue ready
/// for handling.
pub type BlockCallback = Box<dyn FnOnce(BlockId, HandledResult) + Send>;

/// One queued event and the block it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEntry {
    pub event: InputEvent,
    pub block_id: BlockId,
}

/// Counters describing queue activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Events passed to [`InputQueue::receive_input_event`].
    pub events_received: u64,
    /// Events delivered to a handler.
    pub events_dispatched: u64,
    /// Queued events drained without delivery (prevented, unconfirmed, or no
    /// target).
    pub events_dropped: u64,
    /// Events refused at intake (no block to join).
    pub events_rejected: u64,
    /// Blocks created.
    pub blocks_created: u64,
    /// Active blocks released after draining.
    pub blocks_discarded: u64,
    /// Timeouts that changed a block.
    pub timeouts_fired: u64,
    /// Resolution messages for blocks that no longer exist.
    pub stale_messages: u64,
}

/// Active block id per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ActiveBlocks {
    touch: Option<BlockId>,
    /// Original touch block while a long-tap substitute is active.
    prev_touch: Option<BlockId>,
    wheel: Option<BlockId>,
    drag: Option<BlockId>,
    pan: Option<BlockId>,
    pinch: Option<BlockId>,
    keyboard: Option<BlockId>,
}

impl ActiveBlocks {
    fn slot_mut(&mut self, kind: InputKind) -> &mut Option<BlockId> {
        match kind {
            InputKind::Touch => &mut self.touch,
            InputKind::Wheel => &mut self.wheel,
            InputKind::Drag => &mut self.drag,
            InputKind::PanGesture => &mut self.pan,
            InputKind::PinchGesture => &mut self.pinch,
            InputKind::Keyboard => &mut self.keyboard,
        }
    }

    fn get(&self, kind: InputKind) -> Option<BlockId> {
        match kind {
            InputKind::Touch => self.touch,
            InputKind::Wheel => self.wheel,
            InputKind::Drag => self.drag,
            InputKind::PanGesture => self.pan,
            InputKind::PinchGesture => self.pinch,
            InputKind::Keyboard => self.keyboard,
        }
    }

    fn contains(&self, id: BlockId) -> bool {
        [
            self.touch,
            self.prev_touch,
            self.wheel,
            self.drag,
            self.pan,
            self.pinch,
            self.keyboard,
        ]
        .contains(&Some(id))
    }
}

/// Outcome of `block` for `event`, as reported to callbacks and intake
/// callers. Drops count as handled by content.
#[must_use]
pub fn handled_result_for(block: &Block, event: &InputEvent) -> HandledResult {
    let confirmed = block.target_state() == TargetState::Confirmed;
    if block.should_drop_events() {
        return HandledResult::new(HandledPlace::HandledByContent, confirmed);
    }
    let Some(target) = block.target() else {
        return HandledResult::new(HandledPlace::HandledByContent, confirmed);
    };
    let place = match event {
        InputEvent::Touch(touch)
            if !target
                .are_pointer_events_consumable(block, touch)
                .is_consumable() =>
        {
            HandledPlace::Unhandled
        }
        _ => HandledPlace::HandledByHandler,
    };
    HandledResult::new(place, confirmed)
}

// ---------------------------------------------------------------------------
// InputQueue
// ---------------------------------------------------------------------------

/// Sequences input blocks and gates their delivery on confirmation.
///
/// Must be used from a single controller context (the thread that created
/// it); debug builds assert this on every public call.
pub struct InputQueue {
    config: QueueConfig,
    scheduler: ConfirmationScheduler,
    queued: VecDeque<QueuedEntry>,
    blocks: BTreeMap<BlockId, Block>,
    active: ActiveBlocks,
    callbacks: HashMap<BlockId, BlockCallback>,
    touch_counter: TouchCounter,
    drag_tracker: DragTracker,
    last_active: Option<SharedHandler>,
    next_block_id: BlockId,
    stats: QueueStats,
    controller_thread: ThreadId,
}

impl std::fmt::Debug for InputQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputQueue")
            .field("queued", &self.queued.len())
            .field("blocks", &self.blocks.len())
            .field("active", &self.active)
            .field("callbacks", &self.callbacks.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Default for InputQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

impl InputQueue {
    /// Create a queue bound to the calling thread.
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        Self {
            scheduler: ConfirmationScheduler::new(&config),
            config,
            queued: VecDeque::new(),
            blocks: BTreeMap::new(),
            active: ActiveBlocks::default(),
            callbacks: HashMap::new(),
            touch_counter: TouchCounter::new(),
            drag_tracker: DragTracker::new(),
            last_active: None,
            next_block_id: 1,
            stats: QueueStats::default(),
            controller_thread: std::thread::current().id(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        self.assert_on_controller_thread();
        &self.config
    }

    #[must_use]
    pub fn stats(&self) -> &QueueStats {
        self.assert_on_controller_thread();
        &self.stats
    }

    fn assert_on_controller_thread(&self) {
        debug_assert_eq!(
            std::thread::current().id(),
            self.controller_thread,
            "InputQueue used off its controller thread"
        );
    }

    // -- intake -------------------------------------------------------------

    /// Queue `event` for `target` and deliver whatever became ready.
    ///
    /// `touch_behaviors` is only meaningful with a touch-start; one entry
    /// per touch point.
    pub fn receive_input_event(
        &mut self,
        target: &SharedHandler,
        flags: ConfirmationFlags,
        event: InputEvent,
        touch_behaviors: Option<Vec<TouchBehavior>>,
    ) -> DispatchResult {
        self.assert_on_controller_thread();
        self.stats.events_received += 1;

        let probe = event.clone();
        let mut result = match event {
            InputEvent::Touch(touch) => self.receive_touch_input(target, flags, touch, touch_behaviors),
            other => {
                if touch_behaviors.is_some() {
                    tracing::debug!(
                        target: TARGET,
                        kind = %other.kind(),
                        "ignoring touch behaviours supplied with a non-touch event"
                    );
                }
                match other {
                    InputEvent::Wheel(wheel) => self.receive_wheel_input(target, flags, wheel),
                    InputEvent::Mouse(mouse) => self.receive_mouse_input(target, flags, mouse),
                    InputEvent::PanGesture(pan) => self.receive_pan_gesture_input(target, flags, pan),
                    InputEvent::PinchGesture(pinch) => {
                        self.receive_pinch_gesture_input(target, flags, pinch)
                    }
                    InputEvent::Keyboard(key) => self.receive_keyboard_input(target, flags, key),
                    InputEvent::Touch(_) => DispatchResult::not_queued(EventStatus::Ignore),
                }
            }
        };

        result.handled = result
            .block_id
            .and_then(|id| self.blocks.get(&id))
            .filter(|block| block.is_ready_for_handling())
            .map(|block| handled_result_for(block, &probe));

        self.run_immediate_timeouts();
        self.collect_garbage();
        result
    }

    fn receive_touch_input(
        &mut self,
        target: &SharedHandler,
        flags: ConfirmationFlags,
        event: TouchInput,
        touch_behaviors: Option<Vec<TouchBehavior>>,
    ) -> DispatchResult {
        let mut waiting_for_content = false;
        let block_id = if event.phase == TouchPhase::Start {
            let mut have_behaviors = false;
            let mut current_behaviors = Vec::new();
            if let Some(active) = self.active.touch.and_then(|id| self.blocks.get(&id))
                && let Some(touch) = active.as_touch()
            {
                if let Some(behaviors) = touch.allowed_behaviors() {
                    have_behaviors = true;
                    current_behaviors = behaviors.to_vec();
                }
                // An expired timer falls back to default behaviours, which
                // still lets a fast fling be interrupted.
                have_behaviors |= active.is_content_response_timer_expired();
            }

            let id = self.start_new_touch_block(target, flags);
            let fast_fling = self.queued.is_empty()
                && event.touches.len() == 1
                && target.has_fast_fling()
                && have_behaviors;

            if let Some(block) = self.blocks.get_mut(&id) {
                if fast_fling {
                    if let Some(touch) = block.as_touch_mut() {
                        touch.set_during_fast_fling();
                    }
                    block.set_confirmed_target(Some(Arc::clone(target)), TargetState::Confirmed);
                    block.set_allowed_touch_behaviors(current_behaviors);
                    tracing::debug!(target: TARGET, block_id = id, "touch block tagged as fast fling");
                } else if let Some(behaviors) = touch_behaviors {
                    block.set_allowed_touch_behaviors(behaviors);
                }
            }

            self.cancel_animations_for_new_block(id, CancelAnimationFlags::empty());
            waiting_for_content = self.maybe_request_content_response(target, id);
            id
        } else {
            if touch_behaviors.is_some() {
                tracing::debug!(
                    target: TARGET,
                    "ignoring touch behaviours supplied with a non-start touch event"
                );
            }
            // While a long-tap substitute is active, further touches belong to
            // the original block so they are only handled if it is not
            // prevented.
            let for_long_tap = self
                .active
                .touch
                .and_then(|id| self.blocks.get(&id))
                .and_then(Block::as_touch)
                .is_some_and(TouchBlock::for_long_tap);
            let current = if for_long_tap {
                self.active.prev_touch
            } else {
                self.active.touch
            };
            let Some(id) = current else {
                tracing::warn!(
                    target: TARGET,
                    phase = ?event.phase,
                    "received a non-start touch event while no touch block is active"
                );
                self.stats.events_rejected += 1;
                return DispatchResult::not_queued(EventStatus::Ignore);
            };
            tracing::trace!(target: TARGET, block_id = id, phase = ?event.phase, "touch event joins block");
            id
        };

        let status = self.touch_status(target, block_id, &event);
        self.enqueue(block_id, InputEvent::Touch(event));
        self.run_queue();

        // A single-finger touch waiting for content inside slop may never
        // deliver a touch-move, so the content timeout would also delay the
        // long press. Force it through earlier.
        if waiting_for_content
            && self.config.long_tap_enabled
            && self.config.long_tap_timeout < self.config.content_response_timeout
            && self
                .blocks
                .get(&block_id)
                .and_then(Block::as_touch)
                .is_some_and(TouchBlock::is_in_slop)
        {
            self.scheduler.schedule_long_tap_timeout(target, block_id);
        }

        DispatchResult::queued(block_id, status)
    }

    /// Classify a touch event, updating the slop state of its block.
    fn touch_status(
        &mut self,
        target: &SharedHandler,
        block_id: BlockId,
        event: &TouchInput,
    ) -> EventStatus {
        let Some(block) = self.blocks.get(&block_id) else {
            return EventStatus::Ignore;
        };
        // The block's own target wins over the caller's candidate.
        let block_target = block.target().cloned();
        let consumable = block_target
            .as_ref()
            .map_or(ConsumableFlags::NOT_CONSUMABLE, |t| {
                t.are_pointer_events_consumable(block, event)
            });
        if block.as_touch().is_some_and(TouchBlock::is_during_fast_fling) {
            tracing::trace!(target: TARGET, block_id, "event consumed by fast-fling block");
            return EventStatus::ConsumeNoDefault;
        }
        let tolerance = block_target.as_ref().map_or(0.0, |t| {
            if consumable.is_consumable() {
                t.touch_start_tolerance()
            } else {
                t.touch_move_tolerance()
            }
        });

        let Some(block) = self.blocks.get_mut(&block_id) else {
            return EventStatus::Ignore;
        };
        let originally_confirmed = block.is_target_originally_confirmed();
        let dropping = block.should_drop_events();
        let Some(touch) = block.as_touch_mut() else {
            return EventStatus::Ignore;
        };
        let was_in_slop = touch.is_in_slop();
        if touch.update_slop_state(event, tolerance) {
            tracing::trace!(target: TARGET, block_id, "event inside touch slop");
            return EventStatus::ConsumeNoDefault;
        }

        // Leaving slop after a long tap: content listeners get a second
        // chance to prevent the touch-move, so wait for them again.
        let rewait = was_in_slop
            && event.phase == TouchPhase::Move
            && (touch.was_long_tap_processed() || touch.is_waiting_long_tap_result())
            && !originally_confirmed
            && !dropping;
        touch.set_needs_to_wait_touch_move(false);
        if rewait {
            tracing::debug!(
                target: TARGET,
                block_id,
                "leaving slop after a long tap, waiting for content again"
            );
            block.rearm_content_timeout();
            self.scheduler.schedule_content_timeout(target, block_id);
        }
        EventStatus::ConsumeDoDefault
    }

    fn receive_wheel_input(
        &mut self,
        target: &SharedHandler,
        flags: ConfirmationFlags,
        mut event: WheelInput,
    ) -> DispatchResult {
        let timeout = self.config.wheel_transaction_timeout;
        let reuse = self.active.wheel.filter(|&id| {
            let Some(block) = self.blocks.get_mut(&id) else {
                return false;
            };
            let destroyed = block.target().is_some_and(|t| t.is_destroyed());
            let Some(wheel) = block.as_wheel_mut() else {
                return false;
            };
            if destroyed {
                wheel.end_transaction();
                return false;
            }
            wheel.in_transaction() && !wheel.maybe_timeout(&event, timeout)
        });

        let block_id = match reuse {
            Some(id) => {
                tracing::trace!(target: TARGET, block_id = id, "wheel event joins transaction");
                id
            }
            None => {
                let id = self.new_block(target, flags, BlockData::Wheel(WheelBlock::new(&event)));
                self.active.wheel = Some(id);
                self.cancel_animations_for_new_block(id, CancelAnimationFlags::EXCLUDE_WHEEL);
                self.maybe_request_content_response(target, id);
                id
            }
        };

        if let Some(wheel) = self.blocks.get_mut(&block_id).and_then(Block::as_wheel_mut) {
            wheel.update(&mut event);
        }
        self.enqueue(block_id, InputEvent::Wheel(event));
        self.run_queue();
        DispatchResult::queued(block_id, EventStatus::ConsumeDoDefault)
    }

    fn receive_mouse_input(
        &mut self,
        target: &SharedHandler,
        flags: ConfirmationFlags,
        mut event: MouseInput,
    ) -> DispatchResult {
        // A new mouse down may have a new target, so it always starts over.
        let mut starts_block = DragTracker::starts_drag(&event);
        let mut current = if starts_block { None } else { self.active.drag };
        if let Some(id) = current
            && self
                .blocks
                .get(&id)
                .and_then(Block::as_drag)
                .is_none_or(DragBlock::has_received_mouse_up)
        {
            current = None;
        }
        if current.is_none() && self.drag_tracker.in_drag() {
            tracing::debug!(target: TARGET, "drag event outside a drag block, starting one");
            starts_block = true;
        }
        self.drag_tracker.update(&event);

        if !starts_block && current.is_none() {
            return DispatchResult::not_queued(EventStatus::Ignore);
        }

        let block_id = match current {
            Some(id) => id,
            None => {
                let id = self.new_block(target, flags, BlockData::Drag(DragBlock::default()));
                self.active.drag = Some(id);
                tracing::debug!(
                    target: TARGET,
                    block_id = id,
                    hit_scrollbar = flags.hit_scrollbar,
                    hit_scroll_thumb = flags.hit_scroll_thumb,
                    "started drag block"
                );
                if flags.hit_scroll_thumb || !flags.hit_scrollbar {
                    // The autoscroll is about to be cancelled; the click that
                    // would follow must not reach content.
                    if matches!(event.kind, MouseKind::Down | MouseKind::Up)
                        && target.has_autoscroll()
                    {
                        event.prevent_click = true;
                    }
                    self.cancel_animations_for_new_block(id, CancelAnimationFlags::empty());
                }
                self.maybe_request_content_response(target, id);
                id
            }
        };

        let prevent_click = event.prevent_click;
        let ends_drag = DragTracker::ends_drag(&event);
        self.enqueue(block_id, InputEvent::Mouse(event));
        self.run_queue();

        if ends_drag
            && let Some(drag) = self.blocks.get_mut(&block_id).and_then(Block::as_drag_mut)
        {
            drag.mark_mouse_up_received();
        }

        let mut result = DispatchResult::queued(block_id, EventStatus::ConsumeDoDefault);
        result.prevent_click = prevent_click;
        result
    }

    fn receive_pan_gesture_input(
        &mut self,
        target: &SharedHandler,
        flags: ConfirmationFlags,
        mut event: PanGestureInput,
    ) -> DispatchResult {
        match event.phase {
            PanPhase::MayStart | PanPhase::Cancelled => {
                return DispatchResult::not_queued(EventStatus::ConsumeDoDefault);
            }
            PanPhase::Interrupted => {
                let Some(id) = self.active.pan else {
                    return DispatchResult::not_queued(EventStatus::Ignore);
                };
                if let Some(pan) = self.blocks.get_mut(&id).and_then(Block::as_pan_gesture_mut) {
                    pan.set_interrupted();
                }
                tracing::debug!(target: TARGET, block_id = id, "pan block interrupted");
                self.enqueue(id, InputEvent::PanGesture(event));
                self.run_queue();
                return DispatchResult::queued(id, EventStatus::Ignore);
            }
            _ => {}
        }

        let mut status = EventStatus::ConsumeDoDefault;
        let current = if event.phase == PanPhase::Start {
            None
        } else {
            self.active.pan.filter(|id| {
                self.blocks
                    .get(id)
                    .and_then(Block::as_pan_gesture)
                    .is_some_and(|pan| !pan.was_interrupted())
            })
        };

        let block_id = match current {
            Some(id) => id,
            None => {
                // Momentum after an interruption is stale. Anything else means
                // the user kept scrolling, so it opens a new block.
                if event.phase.is_momentum() {
                    tracing::debug!(
                        target: TARGET,
                        phase = ?event.phase,
                        "dropping momentum pan event without an active block"
                    );
                    self.stats.events_rejected += 1;
                    return DispatchResult::not_queued(status);
                }
                if event.phase != PanPhase::Start {
                    tracing::debug!(
                        target: TARGET,
                        phase = ?event.phase,
                        "rewriting pan event to start a new block"
                    );
                    event.phase = PanPhase::Start;
                }

                let id = self.new_block(
                    target,
                    flags,
                    BlockData::PanGesture(PanGestureBlock::default()),
                );
                self.active.pan = Some(id);
                self.cancel_animations_for_new_block(id, CancelAnimationFlags::empty());

                if event.allows_swipe && !target.can_scroll_horizontally(&event) {
                    if let Some(pan) = self.blocks.get_mut(&id).and_then(Block::as_pan_gesture_mut) {
                        pan.set_needs_to_wait_for_browser_gesture_response(true);
                        if flags.target_confirmed {
                            // The caller decides whether this becomes a swipe;
                            // hold the block until it tells us.
                            pan.set_needs_to_wait_for_content_response(true);
                            status = EventStatus::Ignore;
                        }
                    }
                }
                self.maybe_request_content_response(target, id);
                id
            }
        };

        self.enqueue(block_id, InputEvent::PanGesture(event));
        self.run_queue();
        DispatchResult::queued(block_id, status)
    }

    fn receive_pinch_gesture_input(
        &mut self,
        target: &SharedHandler,
        flags: ConfirmationFlags,
        event: PinchGestureInput,
    ) -> DispatchResult {
        let status = EventStatus::ConsumeDoDefault;
        let current = if event.phase == PinchPhase::Start {
            None
        } else {
            self.active.pinch.filter(|id| {
                self.blocks
                    .get(id)
                    .and_then(Block::as_pinch_gesture)
                    .is_some_and(|pinch| !pinch.was_interrupted() && !pinch.has_ended())
            })
        };

        let block_id = match current {
            Some(id) => id,
            None => {
                if event.phase != PinchPhase::Start {
                    tracing::debug!(
                        target: TARGET,
                        phase = ?event.phase,
                        "dropping pinch event without a live block"
                    );
                    self.stats.events_rejected += 1;
                    return DispatchResult::not_queued(status);
                }
                let id = self.new_block(
                    target,
                    flags,
                    BlockData::PinchGesture(PinchGestureBlock::default()),
                );
                self.active.pinch = Some(id);
                self.cancel_animations_for_new_block(id, CancelAnimationFlags::empty());
                self.maybe_request_content_response(target, id);
                id
            }
        };

        if event.phase == PinchPhase::End
            && let Some(pinch) = self.blocks.get_mut(&block_id).and_then(Block::as_pinch_gesture_mut)
        {
            pinch.mark_ended();
        }
        self.enqueue(block_id, InputEvent::PinchGesture(event));
        self.run_queue();
        DispatchResult::queued(block_id, status)
    }

    fn receive_keyboard_input(
        &mut self,
        target: &SharedHandler,
        flags: ConfirmationFlags,
        event: KeyboardInput,
    ) -> DispatchResult {
        let reuse = self.active.keyboard.filter(|id| {
            self.blocks
                .get(id)
                .is_some_and(|block| same_target(block.target(), Some(target)))
        });

        let block_id = match reuse {
            Some(id) => id,
            None => {
                if !flags.target_confirmed {
                    tracing::debug!(
                        target: TARGET,
                        "keyboard input without a confirmed target, treating it as confirmed"
                    );
                }
                let id = self.new_block(target, ConfirmationFlags::CONFIRMED, BlockData::Keyboard);
                // Content cannot cancel keyboard scrolling.
                if let Some(block) = self.blocks.get_mut(&id) {
                    block.set_content_response(false);
                }
                self.active.keyboard = Some(id);
                id
            }
        };

        self.enqueue(block_id, InputEvent::Keyboard(event));
        self.run_queue();

        let status = if self.config.keyboard_passive_listeners {
            EventStatus::ConsumeDoDefault
        } else {
            EventStatus::ConsumeNoDefault
        };
        DispatchResult::queued(block_id, status)
    }

    // -- block creation -----------------------------------------------------

    fn new_block(
        &mut self,
        target: &SharedHandler,
        flags: ConfirmationFlags,
        data: BlockData,
    ) -> BlockId {
        let id = self.next_block_id;
        self.next_block_id += 1;
        let block = Block::new(id, Some(Arc::clone(target)), flags, data);
        tracing::debug!(
            target: TARGET,
            block_id = id,
            kind = %block.kind(),
            handler = target.id(),
            target_confirmed = flags.target_confirmed,
            "started new block"
        );
        self.blocks.insert(id, block);
        self.stats.blocks_created += 1;
        id
    }

    fn start_new_touch_block(&mut self, target: &SharedHandler, flags: ConfirmationFlags) -> BlockId {
        // A new touch supersedes a pending long tap on the previous one.
        let substitute_active = self
            .active
            .touch
            .and_then(|id| self.blocks.get(&id))
            .and_then(Block::as_touch)
            .is_some_and(TouchBlock::for_long_tap);
        if substitute_active && let Some(prev) = self.active.prev_touch.take() {
            if let Some(touch) = self.blocks.get_mut(&prev).and_then(Block::as_touch_mut) {
                touch.set_waiting_long_tap_result(false);
            }
        }

        let data = BlockData::Touch(TouchBlock::new(self.config.touch_action_enabled));
        let id = self.new_block(target, flags, data);
        self.active.touch = Some(id);
        id
    }

    /// Cancel handler animations for a new block, unless older input is still
    /// queued (it may belong to the animation being cancelled).
    fn cancel_animations_for_new_block(&self, block_id: BlockId, extra: CancelAnimationFlags) {
        if !self.queued.is_empty() {
            return;
        }
        if let Some(target) = self.blocks.get(&block_id).and_then(Block::target) {
            target.cancel_animations(
                extra | CancelAnimationFlags::EXCLUDE_OVERSCROLL | CancelAnimationFlags::SCROLL_SNAP,
            );
        }
    }

    /// Auto-accept the content race of a block whose target is known, and
    /// schedule the fallback for anything still open. Returns whether the
    /// block waits on the content side.
    fn maybe_request_content_response(&mut self, target: &SharedHandler, block_id: BlockId) -> bool {
        let Some(block) = self.blocks.get_mut(&block_id) else {
            return false;
        };
        let mut wait = false;
        if block.is_target_confirmed() && !block.requires_content_decision() {
            block.set_content_response(false);
        } else {
            wait = true;
        }
        if block.as_touch().is_some_and(|t| !t.behaviors_known()) {
            tracing::debug!(target: TARGET, block_id, "waiting for touch-behaviour hints");
            wait = true;
        }
        let waiting_for_browser = block
            .as_pan_gesture()
            .is_some_and(PanGestureBlock::is_waiting_for_browser_gesture_response);
        if wait || waiting_for_browser {
            self.scheduler.schedule_content_timeout(target, block_id);
        }
        wait
    }

    fn enqueue(&mut self, block_id: BlockId, event: InputEvent) {
        self.queued.push_back(QueuedEntry { event, block_id });
    }

    fn is_queued(&self, block_id: BlockId) -> bool {
        self.queued.iter().any(|entry| entry.block_id == block_id)
    }

    // -- drain --------------------------------------------------------------

    /// Drain to a fixed point, then drop unreachable blocks.
    fn drain(&mut self) {
        self.run_queue();
        self.collect_garbage();
    }

    fn run_queue(&mut self) {
        while self.process_queue() {}
    }

    /// Deliver the ready prefix of the queue and release finished blocks.
    /// Returns `true` if a long-tap substitute was released and the original
    /// block restored, in which case the queue must be processed again.
    fn process_queue(&mut self) -> bool {
        while let Some(front) = self.queued.front() {
            let block_id = front.block_id;
            let Some(block) = self.blocks.get(&block_id) else {
                debug_assert!(false, "queued entry for unknown block {block_id}");
                self.queued.pop_front();
                continue;
            };
            if !block.is_ready_for_handling() {
                tracing::trace!(
                    target: TARGET,
                    block_id,
                    kind = %block.kind(),
                    target_state = ?block.target_state(),
                    content_state = ?block.content_state(),
                    timer_expired = block.is_content_response_timer_expired(),
                    "front block not ready"
                );
                break;
            }

            if block.is_ready_for_callback()
                && let Some(callback) = self.callbacks.remove(&block_id)
            {
                tracing::debug!(target: TARGET, block_id, "invoking block callback");
                callback(block_id, handled_result_for(block, &front.event));
            }

            if let Some(target) = block.target() {
                if let Some(last) = &self.last_active
                    && !same_handler(last, target)
                    && self.touch_counter.active_touch_count() > 0
                {
                    last.reset_touch_input_state();
                }
                if block.should_drop_events() {
                    match block.kind() {
                        InputKind::Touch => target.reset_touch_input_state(),
                        InputKind::PanGesture => target.reset_pan_gesture_input_state(),
                        _ => {}
                    }
                    tracing::trace!(target: TARGET, block_id, "dropping event of cancelled block");
                    self.stats.events_dropped += 1;
                } else {
                    self.last_active = Some(Arc::clone(target));
                    let status = target.handle_input_event(&front.event, block);
                    tracing::trace!(
                        target: TARGET,
                        block_id,
                        handler = target.id(),
                        ?status,
                        "delivered event"
                    );
                    self.stats.events_dispatched += 1;
                }
            } else {
                tracing::trace!(target: TARGET, block_id, "dropping event of block without target");
                self.stats.events_dropped += 1;
            }

            if let InputEvent::Touch(touch) = &front.event {
                self.touch_counter.update(touch);
            }
            self.queued.pop_front();
        }

        let mut again = false;
        if let Some(id) = self.active.touch
            && self.can_discard_block(id)
        {
            let (for_long_tap, was_prevented) = self.blocks.get(&id).map_or((false, false), |b| {
                (
                    b.as_touch().is_some_and(TouchBlock::for_long_tap),
                    b.is_default_prevented(),
                )
            });
            self.release_active(InputKind::Touch, id);
            if for_long_tap && let Some(prev) = self.active.prev_touch.take() {
                tracing::debug!(
                    target: TARGET,
                    block_id = prev,
                    substitute = id,
                    was_prevented,
                    "switching back to the original touch block"
                );
                if let Some(block) = self.blocks.get_mut(&prev) {
                    if let Some(touch) = block.as_touch_mut() {
                        touch.set_long_tap_processed();
                    }
                    if was_prevented && !block.is_default_prevented() {
                        block.force_prevent_default();
                    }
                }
                self.active.touch = Some(prev);
                again = true;
            }
        }
        for kind in [
            InputKind::Wheel,
            InputKind::Drag,
            InputKind::PanGesture,
            InputKind::PinchGesture,
            InputKind::Keyboard,
        ] {
            if let Some(id) = self.active.get(kind)
                && self.can_discard_block(id)
            {
                self.release_active(kind, id);
            }
        }
        again
    }

    fn can_discard_block(&self, block_id: BlockId) -> bool {
        let Some(block) = self.blocks.get(&block_id) else {
            return true;
        };
        block.is_ready_for_handling() && !block.must_stay_active() && !self.is_queued(block_id)
    }

    fn release_active(&mut self, kind: InputKind, block_id: BlockId) {
        debug_assert!(
            !self.is_queued(block_id),
            "releasing block {block_id} with queued input"
        );
        tracing::debug!(target: TARGET, block_id, %kind, "discarding block");
        *self.active.slot_mut(kind) = None;
        self.stats.blocks_discarded += 1;
    }

    /// Drop blocks that are neither active nor referenced by a queued entry,
    /// together with callbacks that can no longer fire.
    fn collect_garbage(&mut self) {
        let referenced: BTreeSet<BlockId> = self.queued.iter().map(|e| e.block_id).collect();
        let active = self.active;
        self.blocks
            .retain(|id, _| active.contains(*id) || referenced.contains(id));
        let blocks = &self.blocks;
        self.callbacks.retain(|id, _| {
            let live = blocks.contains_key(id);
            if !live {
                tracing::debug!(target: TARGET, block_id = *id, "dropping callback of discarded block");
            }
            live
        });
    }

    fn run_immediate_timeouts(&mut self) {
        while self.scheduler.has_immediate() {
            for task in self.scheduler.take_immediate() {
                // Outcome is only interesting to embedders posting timeouts.
                let _ = self.resolve_timeout(task);
            }
        }
    }

    // -- resolution ---------------------------------------------------------

    fn lookup(&mut self, block_id: BlockId) -> Result<&mut Block, ResolveError> {
        if !self.blocks.contains_key(&block_id) {
            tracing::debug!(target: TARGET, block_id, "no block for resolution message");
            self.stats.stale_messages += 1;
            return Err(ResolveError::UnknownBlock(block_id));
        }
        self.blocks
            .get_mut(&block_id)
            .ok_or(ResolveError::UnknownBlock(block_id))
    }

    fn lookup_kind(&mut self, block_id: BlockId, expected: InputKind) -> Result<&mut Block, ResolveError> {
        let block = self.lookup(block_id)?;
        let found = block.kind();
        if found != expected {
            tracing::warn!(
                target: TARGET,
                block_id,
                %expected,
                %found,
                "resolution message for the wrong kind of block"
            );
            return Err(ResolveError::KindMismatch {
                block_id,
                expected,
                found,
            });
        }
        Ok(block)
    }

    fn finish_resolution(&mut self, block_id: BlockId, changed: bool) -> Result<(), ResolveError> {
        if changed {
            self.drain();
            Ok(())
        } else {
            Err(ResolveError::NoEffect(block_id))
        }
    }

    /// Content's answer for a block: whether it prevented the default action.
    pub fn content_received_input_block(
        &mut self,
        block_id: BlockId,
        prevent_default: bool,
    ) -> Result<(), ResolveError> {
        self.assert_on_controller_thread();
        tracing::debug!(target: TARGET, block_id, prevent_default, "content response");
        let changed = self.lookup(block_id)?.set_content_response(prevent_default);
        self.finish_resolution(block_id, changed)
    }

    /// Hit-test result for a block. `None` means no handler wants the
    /// events; they will be dropped.
    pub fn set_confirmed_target(
        &mut self,
        block_id: BlockId,
        target: Option<SharedHandler>,
    ) -> Result<(), ResolveError> {
        self.assert_on_controller_thread();
        tracing::debug!(
            target: TARGET,
            block_id,
            handler = target.as_ref().map(|t| t.id()),
            "target confirmed"
        );
        let changed = self
            .lookup(block_id)?
            .set_confirmed_target(target, TargetState::Confirmed);
        self.finish_resolution(block_id, changed)
    }

    /// Hit-test result for a drag block, with scrollbar drag metrics.
    pub fn confirm_drag_block(
        &mut self,
        block_id: BlockId,
        target: SharedHandler,
        metrics: DragMetrics,
    ) -> Result<(), ResolveError> {
        self.assert_on_controller_thread();
        tracing::debug!(
            target: TARGET,
            block_id,
            handler = target.id(),
            view_id = metrics.view_id,
            "drag target confirmed"
        );
        let block = self.lookup_kind(block_id, InputKind::Drag)?;
        block.set_drag_metrics(metrics);
        let changed = block.set_confirmed_target(Some(target), TargetState::Confirmed);
        self.finish_resolution(block_id, changed)
    }

    /// Touch-behaviour hints for a touch block, one per touch point.
    pub fn set_allowed_touch_behavior(
        &mut self,
        block_id: BlockId,
        behaviors: Vec<TouchBehavior>,
    ) -> Result<(), ResolveError> {
        self.assert_on_controller_thread();
        tracing::debug!(target: TARGET, block_id, points = behaviors.len(), "touch behaviours");
        let changed = self
            .lookup_kind(block_id, InputKind::Touch)?
            .set_allowed_touch_behaviors(behaviors);
        self.finish_resolution(block_id, changed)
    }

    /// Browser's answer on whether a pan block starts a swipe.
    pub fn set_browser_gesture_response(
        &mut self,
        block_id: BlockId,
        response: BrowserGestureResponse,
    ) -> Result<(), ResolveError> {
        self.assert_on_controller_thread();
        tracing::debug!(target: TARGET, block_id, ?response, "browser gesture response");
        let changed = self
            .lookup_kind(block_id, InputKind::PanGesture)?
            .set_browser_gesture_response(response);
        self.finish_resolution(block_id, changed)
    }

    /// Latch scroll from `block_id` to its current scroller: no handoff to
    /// enclosing scrollers for the rest of the block. Only wheel, pan and
    /// keyboard blocks carry the restriction.
    pub fn disallow_scroll_handoff(&mut self, block_id: BlockId) -> Result<(), ResolveError> {
        self.assert_on_controller_thread();
        tracing::debug!(target: TARGET, block_id, "scroll handoff disallowed");
        if self.lookup(block_id)?.disallow_scroll_handoff() {
            Ok(())
        } else {
            Err(ResolveError::NoEffect(block_id))
        }
    }

    /// Run `callback` once, when the block's next event reaches the front
    /// of the queue ready for handling. A block keeps its first callback.
    pub fn add_input_block_callback(
        &mut self,
        block_id: BlockId,
        callback: BlockCallback,
    ) -> Result<(), ResolveError> {
        self.assert_on_controller_thread();
        self.lookup(block_id)?;
        if self.callbacks.contains_key(&block_id) {
            return Err(ResolveError::NoEffect(block_id));
        }
        self.callbacks.insert(block_id, callback);
        Ok(())
    }

    /// Deliver a fallback timeout posted through
    /// [`Handler::post_delayed_task`](crate::handler::Handler::post_delayed_task).
    pub fn handle_timeout(&mut self, task: TimeoutTask) -> Result<(), ResolveError> {
        self.assert_on_controller_thread();
        let result = self.resolve_timeout(task);
        self.collect_garbage();
        result
    }

    fn resolve_timeout(&mut self, task: TimeoutTask) -> Result<(), ResolveError> {
        let block_id = task.block_id;
        match task.kind {
            TimeoutKind::ContentResponse => {
                tracing::debug!(target: TARGET, block_id, "content-response timeout");
                let block = self.lookup(block_id)?;
                let mut changed = block.timeout_content_response();
                let candidate = block.target().cloned();
                changed |= block.set_confirmed_target(candidate, TargetState::TimedOut);
                if !changed {
                    return Err(ResolveError::NoEffect(block_id));
                }
                // Timed out inside slop: hold callbacks until the finger moves.
                if let Some(touch) = block.as_touch_mut()
                    && touch.is_in_slop()
                {
                    touch.set_needs_to_wait_touch_move(true);
                }
                self.stats.timeouts_fired += 1;
                self.run_queue();
                Ok(())
            }
            TimeoutKind::LongTap => {
                tracing::debug!(target: TARGET, block_id, "maybe-long-tap timeout");
                let block = self.lookup_kind(block_id, InputKind::Touch)?;
                if block.as_touch().is_some_and(TouchBlock::is_in_slop) {
                    self.resolve_timeout(TimeoutTask::content_response(block_id))
                } else {
                    Err(ResolveError::NoEffect(block_id))
                }
            }
        }
    }

    /// Substitute a new touch block for the current one while a long-press
    /// is handled. Touch events keep joining the original block, which waits
    /// until the substitute is resolved. Returns the substitute's id, or
    /// `None` without a current touch block.
    pub fn inject_new_touch_block(&mut self, target: &SharedHandler) -> Option<BlockId> {
        self.assert_on_controller_thread();
        let Some(current) = self.current_touch_block().map(Block::id) else {
            tracing::warn!(target: TARGET, "long-tap injection without a current touch block");
            return None;
        };

        let data = BlockData::Touch(TouchBlock::new(self.config.touch_action_enabled));
        let id = self.new_block(target, ConfirmationFlags::CONFIRMED, data);
        if let Some(original) = self.blocks.get(&current).cloned()
            && let Some(block) = self.blocks.get_mut(&id)
        {
            block.copy_properties_from(&original);
            block.set_for_long_tap();
        }
        if let Some(touch) = self.blocks.get_mut(&current).and_then(Block::as_touch_mut) {
            touch.set_waiting_long_tap_result(true);
        }
        self.active.prev_touch = Some(current);
        self.active.touch = Some(id);
        tracing::debug!(
            target: TARGET,
            block_id = id,
            original = current,
            "injected long-tap touch block"
        );

        self.scheduler.schedule_content_timeout(target, id);
        self.run_immediate_timeouts();
        self.collect_garbage();
        Some(id)
    }

    /// Drop all queued input, active blocks and callbacks. Block ids keep
    /// increasing afterwards.
    pub fn clear(&mut self) {
        self.assert_on_controller_thread();
        tracing::debug!(target: TARGET, queued = self.queued.len(), "clearing input queue");
        self.queued.clear();
        self.blocks.clear();
        self.active = ActiveBlocks::default();
        self.callbacks.clear();
        self.scheduler.clear();
        self.last_active = None;
    }

    // -- queries ------------------------------------------------------------

    /// Any live block (active, or still referenced by queued input).
    #[must_use]
    pub fn get_block_for_id(&self, block_id: BlockId) -> Option<&Block> {
        self.assert_on_controller_thread();
        self.blocks.get(&block_id)
    }

    /// Block of the event at the front of the queue.
    #[must_use]
    pub fn current_block(&self) -> Option<&Block> {
        self.assert_on_controller_thread();
        self.queued
            .front()
            .and_then(|entry| self.blocks.get(&entry.block_id))
    }

    /// The block at the front of the queue if it is of `kind`. With an
    /// empty queue, the active block of `kind`.
    #[must_use]
    pub fn current_block_of(&self, kind: InputKind) -> Option<&Block> {
        self.assert_on_controller_thread();
        match self.current_block() {
            Some(block) => (block.kind() == kind).then_some(block),
            None => self.active_block(kind),
        }
    }

    #[must_use]
    pub fn current_touch_block(&self) -> Option<&Block> {
        self.current_block_of(InputKind::Touch)
    }

    /// Scroll may be handed off to enclosing scrollers. The current wheel
    /// block decides, then pan, then keyboard.
    #[must_use]
    pub fn allow_scroll_handoff(&self) -> bool {
        [InputKind::Wheel, InputKind::PanGesture, InputKind::Keyboard]
            .into_iter()
            .find_map(|kind| self.current_block_of(kind))
            .is_none_or(Block::allow_scroll_handoff)
    }

    /// The active wheel block, if its transaction is still running.
    #[must_use]
    pub fn active_wheel_transaction(&self) -> Option<&Block> {
        self.assert_on_controller_thread();
        self.active
            .wheel
            .and_then(|id| self.blocks.get(&id))
            .filter(|block| block.as_wheel().is_some_and(WheelBlock::in_transaction))
    }

    /// The front of the queue is a touch block ready for handling.
    #[must_use]
    pub fn has_ready_touch_block(&self) -> bool {
        self.current_block()
            .is_some_and(|block| block.as_touch().is_some() && block.is_ready_for_handling())
    }

    /// Whether the ongoing drag (if any) is a scrollbar drag. The first call
    /// during a drag decides using `hit_scrollbar`.
    pub fn is_drag_on_scrollbar(&mut self, hit_scrollbar: bool) -> bool {
        self.assert_on_controller_thread();
        self.drag_tracker.in_drag() && self.drag_tracker.is_on_scrollbar(hit_scrollbar)
    }

    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.assert_on_controller_thread();
        self.queued.len()
    }

    /// Queued entries, front first.
    pub fn queued_entries(&self) -> impl Iterator<Item = &QueuedEntry> {
        self.assert_on_controller_thread();
        self.queued.iter()
    }

    /// Active block of `kind` (the substitute, for touch during a long tap).
    #[must_use]
    pub fn active_block(&self, kind: InputKind) -> Option<&Block> {
        self.assert_on_controller_thread();
        self.active.get(kind).and_then(|id| self.blocks.get(&id))
    }

    /// Number of live blocks.
    #[must_use]
    pub fn live_blocks(&self) -> usize {
        self.assert_on_controller_thread();
        self.blocks.len()
    }

    /// Fingers currently down, as seen by drained touch events.
    #[must_use]
    pub fn active_touch_count(&self) -> u32 {
        self.assert_on_controller_thread();
        self.touch_counter.active_touch_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{ContentState, DragDirection};
    use crate::event::{MouseButton, Point};
    use crate::handler::{Handler, HandlerId};
    use std::sync::Mutex;
    use std::time::Duration;
    use web_time::Instant;

    #[derive(Default)]
    struct Mock {
        id: HandlerId,
        delivered: Mutex<Vec<(BlockId, InputEvent)>>,
        posted: Mutex<Vec<(TimeoutTask, Duration)>>,
        touch_resets: Mutex<u32>,
        cancels: Mutex<Vec<CancelAnimationFlags>>,
        fast_fling: bool,
        autoscroll: bool,
    }

    impl Mock {
        fn shared(id: HandlerId) -> (Arc<Mock>, SharedHandler) {
            let mock = Arc::new(Mock {
                id,
                ..Mock::default()
            });
            let shared: SharedHandler = mock.clone();
            (mock, shared)
        }

        fn delivered_blocks(&self) -> Vec<BlockId> {
            self.delivered.lock().unwrap().iter().map(|(id, _)| *id).collect()
        }

        fn posted(&self) -> Vec<TimeoutTask> {
            self.posted.lock().unwrap().iter().map(|(t, _)| *t).collect()
        }
    }

    impl Handler for Mock {
        fn id(&self) -> HandlerId {
            self.id
        }
        fn handle_input_event(&self, event: &InputEvent, block: &Block) -> EventStatus {
            self.delivered.lock().unwrap().push((block.id(), event.clone()));
            EventStatus::ConsumeDoDefault
        }
        fn reset_touch_input_state(&self) {
            *self.touch_resets.lock().unwrap() += 1;
        }
        fn has_fast_fling(&self) -> bool {
            self.fast_fling
        }
        fn has_autoscroll(&self) -> bool {
            self.autoscroll
        }
        fn cancel_animations(&self, flags: CancelAnimationFlags) {
            self.cancels.lock().unwrap().push(flags);
        }
        fn post_delayed_task(&self, task: TimeoutTask, delay: Duration) {
            self.posted.lock().unwrap().push((task, delay));
        }
    }

    fn touch(phase: TouchPhase, x: f32) -> InputEvent {
        InputEvent::Touch(TouchInput::new(phase, Instant::now()).with_touch(0, x, 0.0))
    }

    fn no_touch_action() -> QueueConfig {
        QueueConfig::default().with_touch_action(false)
    }

    #[test]
    fn confirmed_touch_is_delivered_immediately() {
        let (mock, target) = Mock::shared(1);
        let mut q = InputQueue::new(no_touch_action());
        let r = q.receive_input_event(&target, ConfirmationFlags::CONFIRMED, touch(TouchPhase::Start, 0.0), None);
        assert_eq!(r.block_id, Some(1));
        assert_eq!(r.status, EventStatus::ConsumeDoDefault);
        assert_eq!(
            r.handled,
            Some(HandledResult::new(HandledPlace::HandledByHandler, true))
        );
        assert_eq!(mock.delivered_blocks(), vec![1]);
        assert!(mock.posted().is_empty());
        assert_eq!(q.queued_len(), 0);
    }

    #[test]
    fn unconfirmed_touch_waits_for_both_races() {
        let (mock, target) = Mock::shared(1);
        let mut q = InputQueue::new(QueueConfig::default());
        let r = q.receive_input_event(&target, ConfirmationFlags::UNCONFIRMED, touch(TouchPhase::Start, 0.0), None);
        let id = r.block_id.unwrap();
        assert_eq!(r.handled, None);
        assert_eq!(mock.posted(), vec![TimeoutTask::content_response(id)]);
        q.receive_input_event(&target, ConfirmationFlags::UNCONFIRMED, touch(TouchPhase::Move, 40.0), None);
        assert_eq!(q.queued_len(), 2);

        q.set_confirmed_target(id, Some(target.clone())).unwrap();
        q.content_received_input_block(id, false).unwrap();
        assert!(mock.delivered_blocks().is_empty(), "behaviours still unknown");
        q.set_allowed_touch_behavior(id, vec![TouchBehavior::AUTO]).unwrap();
        assert_eq!(mock.delivered_blocks(), vec![id, id]);
        assert_eq!(q.queued_len(), 0);
    }

    #[test]
    fn prevented_block_is_dropped_and_handler_reset() {
        let (mock, target) = Mock::shared(1);
        let mut q = InputQueue::new(no_touch_action());
        let id = q
            .receive_input_event(&target, ConfirmationFlags::UNCONFIRMED, touch(TouchPhase::Start, 0.0), None)
            .block_id
            .unwrap();
        q.set_confirmed_target(id, Some(target.clone())).unwrap();
        q.content_received_input_block(id, true).unwrap();
        assert!(mock.delivered_blocks().is_empty());
        assert_eq!(*mock.touch_resets.lock().unwrap(), 1);
        assert_eq!(q.stats().events_dropped, 1);
    }

    #[test]
    fn resolution_is_idempotent() {
        let (_mock, target) = Mock::shared(1);
        let mut q = InputQueue::new(no_touch_action());
        let id = q
            .receive_input_event(&target, ConfirmationFlags::UNCONFIRMED, touch(TouchPhase::Start, 0.0), None)
            .block_id
            .unwrap();
        assert_eq!(q.content_received_input_block(id, false), Ok(()));
        assert_eq!(
            q.content_received_input_block(id, true),
            Err(ResolveError::NoEffect(id))
        );
        assert!(!q.get_block_for_id(id).unwrap().is_default_prevented());
    }

    #[test]
    fn unknown_and_mismatched_ids_are_reported() {
        let (_mock, target) = Mock::shared(1);
        let mut q = InputQueue::default();
        assert_eq!(
            q.content_received_input_block(42, false),
            Err(ResolveError::UnknownBlock(42))
        );
        assert_eq!(q.stats().stale_messages, 1);

        let id = q
            .receive_input_event(
                &target,
                ConfirmationFlags::UNCONFIRMED,
                InputEvent::Wheel(WheelInput::new(0.0, 3.0, Instant::now())),
                None,
            )
            .block_id
            .unwrap();
        assert_eq!(
            q.set_allowed_touch_behavior(id, vec![TouchBehavior::AUTO]),
            Err(ResolveError::KindMismatch {
                block_id: id,
                expected: InputKind::Touch,
                found: InputKind::Wheel,
            })
        );
    }

    #[test]
    fn immediate_mode_resolves_before_return() {
        let (mock, target) = Mock::shared(1);
        let mut q = InputQueue::new(QueueConfig::immediate_fallback());
        let r = q.receive_input_event(&target, ConfirmationFlags::UNCONFIRMED, touch(TouchPhase::Start, 0.0), None);
        let id = r.block_id.unwrap();
        assert_eq!(mock.delivered_blocks(), vec![id]);
        assert!(mock.posted().is_empty());
        let block = q.get_block_for_id(id).unwrap();
        assert_eq!(block.target_state(), TargetState::TimedOut);
        assert_eq!(block.content_state(), ContentState::TimedOut);
        assert!(block.as_touch().unwrap().needs_to_wait_touch_move());
        assert_eq!(q.stats().timeouts_fired, 1);
    }

    #[test]
    fn stale_timeout_is_ignored() {
        let (_mock, target) = Mock::shared(1);
        let mut q = InputQueue::default();
        let r = q.receive_input_event(
            &target,
            ConfirmationFlags::UNCONFIRMED,
            InputEvent::Wheel(WheelInput::new(0.0, 1.0, Instant::now())),
            None,
        );
        let id = r.block_id.unwrap();
        q.clear();
        assert_eq!(
            q.handle_timeout(TimeoutTask::content_response(id)),
            Err(ResolveError::UnknownBlock(id))
        );
        assert_eq!(q.stats().stale_messages, 1);
    }

    #[test]
    fn wheel_gap_starts_new_transaction() {
        let (mock, target) = Mock::shared(1);
        let mut q = InputQueue::default();
        let t0 = Instant::now();
        let a = q.receive_input_event(&target, ConfirmationFlags::CONFIRMED, InputEvent::Wheel(WheelInput::new(0.0, 1.0, t0)), None);
        let b = q.receive_input_event(
            &target,
            ConfirmationFlags::CONFIRMED,
            InputEvent::Wheel(WheelInput::new(0.0, 1.0, t0 + Duration::from_millis(100))),
            None,
        );
        let c = q.receive_input_event(
            &target,
            ConfirmationFlags::CONFIRMED,
            InputEvent::Wheel(WheelInput::new(0.0, 1.0, t0 + Duration::from_millis(2000))),
            None,
        );
        assert_eq!(a.block_id, b.block_id);
        assert_ne!(b.block_id, c.block_id);
        let series: Vec<u32> = mock
            .delivered
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, e)| e.as_wheel().map(|w| w.scroll_series))
            .collect();
        assert_eq!(series, vec![1, 2, 1]);
        assert_eq!(
            mock.cancels.lock().unwrap()[0],
            CancelAnimationFlags::EXCLUDE_WHEEL
                | CancelAnimationFlags::EXCLUDE_OVERSCROLL
                | CancelAnimationFlags::SCROLL_SNAP
        );
        assert_eq!(q.active_wheel_transaction().map(Block::id), c.block_id);
    }

    #[test]
    fn keyboard_reuses_block_per_handler() {
        let (_a, first) = Mock::shared(1);
        let (_b, second) = Mock::shared(2);
        let mut q = InputQueue::default();
        let key = || InputEvent::Keyboard(KeyboardInput::new(crate::event::KeyPhase::Down, 40, Instant::now()));
        let r1 = q.receive_input_event(&first, ConfirmationFlags::CONFIRMED, key(), None);
        let r2 = q.receive_input_event(&first, ConfirmationFlags::CONFIRMED, key(), None);
        let r3 = q.receive_input_event(&second, ConfirmationFlags::CONFIRMED, key(), None);
        assert_eq!(r1.block_id, r2.block_id);
        assert_ne!(r2.block_id, r3.block_id);
        assert_eq!(r1.status, EventStatus::ConsumeNoDefault);
        assert_eq!(q.live_blocks(), 1);
    }

    #[test]
    fn drag_prevents_click_during_autoscroll() {
        let mock = Arc::new(Mock {
            id: 1,
            autoscroll: true,
            ..Mock::default()
        });
        let target: SharedHandler = mock.clone();
        let mut q = InputQueue::default();
        let down = InputEvent::Mouse(MouseInput::new(MouseKind::Down, MouseButton::Primary, 0.0, 0.0, Instant::now()));
        let r = q.receive_input_event(&target, ConfirmationFlags::UNCONFIRMED, down, None);
        assert!(r.prevent_click);
        let id = r.block_id.unwrap();
        q.confirm_drag_block(
            id,
            target.clone(),
            DragMetrics {
                view_id: 9,
                direction: DragDirection::Vertical,
            },
        )
        .unwrap();
        let block = q.get_block_for_id(id).unwrap();
        assert_eq!(block.as_drag().unwrap().drag_metrics().map(|m| m.view_id), Some(9));
        assert!(q.is_drag_on_scrollbar(true));
    }

    #[cfg(debug_assertions)]
    #[test]
    fn queries_off_the_controller_thread_are_caught() {
        let mut q = InputQueue::default();
        let drag = std::thread::spawn(move || q.is_drag_on_scrollbar(false)).join();
        assert!(drag.is_err());

        let q = InputQueue::default();
        let current = std::thread::spawn(move || q.current_block_of(InputKind::Wheel).is_none()).join();
        assert!(current.is_err());
    }

    #[test]
    fn fast_fling_touch_is_consumed() {
        let mock = Arc::new(Mock {
            id: 1,
            fast_fling: true,
            ..Mock::default()
        });
        let target: SharedHandler = mock.clone();
        let mut q = InputQueue::new(no_touch_action());
        // First touch: no previous block, so no fast-fling tagging.
        q.receive_input_event(&target, ConfirmationFlags::CONFIRMED, touch(TouchPhase::Start, 0.0), None);
        q.receive_input_event(&target, ConfirmationFlags::CONFIRMED, touch(TouchPhase::End, 0.0), None);
        q.set_allowed_touch_behavior(1, vec![TouchBehavior::VERTICAL_PAN]).unwrap();

        let r = q.receive_input_event(&target, ConfirmationFlags::UNCONFIRMED, touch(TouchPhase::Start, 5.0), None);
        assert_eq!(r.status, EventStatus::ConsumeNoDefault);
        let block = q.get_block_for_id(r.block_id.unwrap()).unwrap();
        assert!(block.as_touch().unwrap().is_during_fast_fling());
        assert_eq!(
            block.as_touch().unwrap().combined_behavior(),
            Some(TouchBehavior::VERTICAL_PAN)
        );
        assert_eq!(mock.delivered_blocks().len(), 3);
    }

    #[test]
    fn non_start_touch_without_block_is_rejected() {
        let (_mock, target) = Mock::shared(1);
        let mut q = InputQueue::default();
        let r = q.receive_input_event(&target, ConfirmationFlags::CONFIRMED, touch(TouchPhase::Move, 3.0), None);
        assert_eq!(r.block_id, None);
        assert_eq!(q.stats().events_rejected, 1);
        assert_eq!(q.stats().events_received, 1);
    }

    #[test]
    fn callback_fires_once_with_outcome() {
        let (_mock, target) = Mock::shared(1);
        let mut q = InputQueue::new(no_touch_action());
        let id = q
            .receive_input_event(&target, ConfirmationFlags::UNCONFIRMED, touch(TouchPhase::Start, 0.0), None)
            .block_id
            .unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        q.add_input_block_callback(id, Box::new(move |id, result| sink.lock().unwrap().push((id, result))))
            .unwrap();
        assert_eq!(
            q.add_input_block_callback(id, Box::new(|_, _| {})),
            Err(ResolveError::NoEffect(id))
        );
        q.set_confirmed_target(id, Some(target.clone())).unwrap();
        q.content_received_input_block(id, true).unwrap();
        q.receive_input_event(&target, ConfirmationFlags::UNCONFIRMED, touch(TouchPhase::Move, 50.0), None);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(id, HandledResult::new(HandledPlace::HandledByContent, true))]
        );
    }

    #[test]
    fn long_tap_prevention_transfers_to_original() {
        let (mock, target) = Mock::shared(1);
        let mut q = InputQueue::new(no_touch_action());
        let original = q
            .receive_input_event(&target, ConfirmationFlags::UNCONFIRMED, touch(TouchPhase::Start, 0.0), None)
            .block_id
            .unwrap();
        q.set_confirmed_target(original, Some(target.clone())).unwrap();
        q.content_received_input_block(original, false).unwrap();
        assert_eq!(mock.delivered_blocks(), vec![original]);

        let substitute = q.inject_new_touch_block(&target).unwrap();
        assert_eq!(q.active_block(InputKind::Touch).map(Block::id), Some(substitute));
        let mv = q.receive_input_event(&target, ConfirmationFlags::UNCONFIRMED, touch(TouchPhase::Move, 30.0), None);
        assert_eq!(mv.block_id, Some(original));
        assert_eq!(mock.delivered_blocks(), vec![original], "waiting for the long-tap result");

        q.content_received_input_block(substitute, true).unwrap();
        assert_eq!(q.active_block(InputKind::Touch).map(Block::id), Some(original));
        let block = q.get_block_for_id(original).unwrap();
        assert!(block.is_default_prevented());
        assert!(block.as_touch().unwrap().was_long_tap_processed());
        assert_eq!(mock.delivered_blocks(), vec![original]);
        assert!(q.get_block_for_id(substitute).is_none());
    }

    #[test]
    fn pan_momentum_without_block_is_dropped_and_pan_rewritten() {
        let (mock, target) = Mock::shared(1);
        let mut q = InputQueue::default();
        let now = Instant::now();
        let momentum = InputEvent::PanGesture(PanGestureInput::new(PanPhase::MomentumPan, 0.0, 4.0, now));
        assert_eq!(
            q.receive_input_event(&target, ConfirmationFlags::CONFIRMED, momentum, None).block_id,
            None
        );
        let pan = InputEvent::PanGesture(PanGestureInput::new(PanPhase::Pan, 0.0, 4.0, now));
        let r = q.receive_input_event(&target, ConfirmationFlags::CONFIRMED, pan, None);
        assert!(r.was_queued());
        let delivered = mock.delivered.lock().unwrap();
        assert_eq!(
            delivered[0].1.as_pan_gesture().map(|p| p.phase),
            Some(PanPhase::Start)
        );
        assert_eq!(delivered[0].1.as_pan_gesture().map(|p| p.displacement), Some(Point::new(0.0, 4.0)));
    }

    #[test]
    fn pinch_waits_for_content_and_only_start_creates() {
        let (mock, target) = Mock::shared(1);
        let mut q = InputQueue::default();
        let now = Instant::now();
        let scale = || InputEvent::PinchGesture(PinchGestureInput::new(PinchPhase::Scale, 10.0, 12.0, now));
        assert_eq!(
            q.receive_input_event(&target, ConfirmationFlags::CONFIRMED, scale(), None).block_id,
            None
        );
        let start = InputEvent::PinchGesture(PinchGestureInput::new(PinchPhase::Start, 10.0, 10.0, now));
        let id = q
            .receive_input_event(&target, ConfirmationFlags::CONFIRMED, start, None)
            .block_id
            .unwrap();
        assert!(mock.delivered_blocks().is_empty());
        q.receive_input_event(&target, ConfirmationFlags::CONFIRMED, scale(), None);
        q.content_received_input_block(id, false).unwrap();
        assert_eq!(mock.delivered_blocks(), vec![id, id]);
    }
}
