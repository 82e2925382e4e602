#![forbid(unsafe_code)]

//! A [`Handler`] that records every call and posts timeouts to a mailbox.
//!
//! Behaviour switches live in [`HandlerSettings`] and can be changed while a
//! test runs. Delivered events are appended both to the handler's own call
//! log and to a shared [`Journal`], so tests can check delivery order across
//! handlers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use inputq_core::{
    Block, BlockId, CancelAnimationFlags, ConsumableFlags, EventStatus, Handler, HandlerId,
    InputEvent, PanGestureInput, SharedHandler, TimeoutSender, TimeoutTask, TouchInput,
};
use web_time::Instant;

// ============================================================================
// Virtual clock
// ============================================================================

/// Shared millisecond clock. Only moves when a test advances it.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    origin: Instant,
    elapsed_ms: Arc<AtomicU64>,
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> Instant {
        self.origin + Duration::from_millis(self.elapsed_ms())
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms.load(Ordering::SeqCst)
    }

    pub fn advance(&self, ms: u64) {
        self.elapsed_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

// ============================================================================
// Calls
// ============================================================================

/// One call made by the queue on a [`RecordingHandler`].
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerCall {
    Handled { block_id: BlockId, event: InputEvent },
    ResetTouch,
    ResetPan,
    CancelAnimations(CancelAnimationFlags),
    PostedTimeout { task: TimeoutTask, delay: Duration },
}

/// Delivery log shared by all handlers of one harness.
pub type Journal = Arc<Mutex<Vec<(HandlerId, BlockId, InputEvent)>>>;

/// Switches controlling how a [`RecordingHandler`] answers the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerSettings {
    pub consumable: ConsumableFlags,
    pub fast_fling: bool,
    pub autoscroll: bool,
    pub can_scroll_horizontally: bool,
    pub touch_start_tolerance: f32,
    pub touch_move_tolerance: f32,
    pub destroyed: bool,
    /// Returned from `handle_input_event`.
    pub status: EventStatus,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            consumable: ConsumableFlags::CONSUMABLE,
            fast_fling: false,
            autoscroll: false,
            can_scroll_horizontally: true,
            touch_start_tolerance: 10.0,
            touch_move_tolerance: 10.0,
            destroyed: false,
            status: EventStatus::ConsumeNoDefault,
        }
    }
}

// ============================================================================
// RecordingHandler
// ============================================================================

/// Handler that records calls; see the module docs.
#[derive(Debug)]
pub struct RecordingHandler {
    id: HandlerId,
    settings: Mutex<HandlerSettings>,
    calls: Mutex<Vec<HandlerCall>>,
    journal: Journal,
    sender: TimeoutSender,
    clock: VirtualClock,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl RecordingHandler {
    pub fn new(id: HandlerId, sender: TimeoutSender, clock: VirtualClock, journal: Journal) -> Self {
        Self {
            id,
            settings: Mutex::new(HandlerSettings::default()),
            calls: Mutex::new(Vec::new()),
            journal,
            sender,
            clock,
        }
    }

    /// This handler as the queue sees it.
    pub fn shared(self: &Arc<Self>) -> SharedHandler {
        Arc::clone(self) as SharedHandler
    }

    pub fn settings(&self) -> HandlerSettings {
        lock(&self.settings).clone()
    }

    /// Change settings in place.
    pub fn configure(&self, f: impl FnOnce(&mut HandlerSettings)) {
        f(&mut lock(&self.settings));
    }

    pub fn calls(&self) -> Vec<HandlerCall> {
        lock(&self.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Events delivered through `handle_input_event`, in order.
    pub fn handled(&self) -> Vec<(BlockId, InputEvent)> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                HandlerCall::Handled { block_id, event } => Some((*block_id, event.clone())),
                _ => None,
            })
            .collect()
    }

    /// Block id of each delivered event.
    pub fn handled_blocks(&self) -> Vec<BlockId> {
        self.handled().into_iter().map(|(id, _)| id).collect()
    }

    pub fn touch_resets(&self) -> usize {
        self.count(|call| matches!(call, HandlerCall::ResetTouch))
    }

    pub fn pan_resets(&self) -> usize {
        self.count(|call| matches!(call, HandlerCall::ResetPan))
    }

    pub fn cancels(&self) -> Vec<CancelAnimationFlags> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                HandlerCall::CancelAnimations(flags) => Some(*flags),
                _ => None,
            })
            .collect()
    }

    pub fn posted(&self) -> Vec<TimeoutTask> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                HandlerCall::PostedTimeout { task, .. } => Some(*task),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&HandlerCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|call| pred(call)).count()
    }

    fn record(&self, call: HandlerCall) {
        lock(&self.calls).push(call);
    }
}

impl Handler for RecordingHandler {
    fn id(&self) -> HandlerId {
        self.id
    }

    fn handle_input_event(&self, event: &InputEvent, block: &Block) -> EventStatus {
        lock(&self.journal).push((self.id, block.id(), event.clone()));
        self.record(HandlerCall::Handled {
            block_id: block.id(),
            event: event.clone(),
        });
        lock(&self.settings).status
    }

    fn are_pointer_events_consumable(&self, _block: &Block, _event: &TouchInput) -> ConsumableFlags {
        lock(&self.settings).consumable
    }

    fn reset_touch_input_state(&self) {
        self.record(HandlerCall::ResetTouch);
    }

    fn reset_pan_gesture_input_state(&self) {
        self.record(HandlerCall::ResetPan);
    }

    fn has_fast_fling(&self) -> bool {
        lock(&self.settings).fast_fling
    }

    fn has_autoscroll(&self) -> bool {
        lock(&self.settings).autoscroll
    }

    fn cancel_animations(&self, flags: CancelAnimationFlags) {
        self.record(HandlerCall::CancelAnimations(flags));
    }

    fn can_scroll_horizontally(&self, _event: &PanGestureInput) -> bool {
        lock(&self.settings).can_scroll_horizontally
    }

    fn touch_start_tolerance(&self) -> f32 {
        lock(&self.settings).touch_start_tolerance
    }

    fn touch_move_tolerance(&self) -> f32 {
        lock(&self.settings).touch_move_tolerance
    }

    fn is_destroyed(&self) -> bool {
        lock(&self.settings).destroyed
    }

    fn post_delayed_task(&self, task: TimeoutTask, delay: Duration) {
        self.record(HandlerCall::PostedTimeout { task, delay });
        self.sender.post_at(task, self.clock.now() + delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inputq_core::TimeoutMailbox;

    #[test]
    fn posted_timeouts_use_virtual_time() {
        let mut mailbox = TimeoutMailbox::new();
        let clock = VirtualClock::new();
        let handler = RecordingHandler::new(1, mailbox.sender(), clock.clone(), Journal::default());
        handler.post_delayed_task(TimeoutTask::content_response(4), Duration::from_millis(400));

        assert!(mailbox.drain_due(clock.now()).is_empty());
        clock.advance(400);
        assert_eq!(
            mailbox.drain_due(clock.now()),
            vec![TimeoutTask::content_response(4)]
        );
        assert_eq!(handler.posted(), vec![TimeoutTask::content_response(4)]);
    }

    #[test]
    fn settings_can_change_mid_test() {
        let mailbox = TimeoutMailbox::new();
        let handler = RecordingHandler::new(2, mailbox.sender(), VirtualClock::new(), Journal::default());
        assert!(!handler.has_fast_fling());
        handler.configure(|s| s.fast_fling = true);
        assert!(handler.has_fast_fling());
    }
}
