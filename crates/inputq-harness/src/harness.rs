#![forbid(unsafe_code)]

//! Scenario driver: an [`InputQueue`] wired to recording handlers, a
//! timeout mailbox and a virtual clock.
//!
//! Events built through the harness are stamped with the virtual time plus a
//! per-event nanosecond sequence, so every event carries a distinct,
//! increasing timestamp and delivery order can be checked from the journal.
//! Timeouts only fire when the test calls [`Harness::advance`].

use std::sync::Arc;
use std::time::Duration;

use inputq_core::{
    ConfirmationFlags, DispatchResult, InputEvent, InputQueue, KeyPhase, KeyboardInput,
    MouseButton, MouseInput, MouseKind, PanGestureInput, PanPhase, PinchGestureInput, PinchPhase,
    QueueConfig, ResolveError, TimeoutMailbox, TimeoutTask, TouchBehavior, TouchInput, TouchPhase,
    WheelInput,
};
use web_time::Instant;

use crate::recording::{Journal, RecordingHandler, VirtualClock};

/// Outcome of one fired timeout.
pub type FiredTimeout = (TimeoutTask, Result<(), ResolveError>);

pub struct Harness {
    queue: InputQueue,
    mailbox: TimeoutMailbox,
    clock: VirtualClock,
    journal: Journal,
    next_handler_id: u64,
    event_seq: u64,
    fired: Vec<FiredTimeout>,
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("queue", &self.queue)
            .field("elapsed_ms", &self.clock.elapsed_ms())
            .field("fired", &self.fired.len())
            .finish()
    }
}

impl Harness {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            queue: InputQueue::new(config),
            mailbox: TimeoutMailbox::new(),
            clock: VirtualClock::new(),
            journal: Journal::default(),
            next_handler_id: 1,
            event_seq: 0,
            fired: Vec::new(),
        }
    }

    /// Harness whose confirmation waits all fall back immediately.
    pub fn immediate() -> Self {
        Self::new(QueueConfig::immediate_fallback())
    }

    /// Create a new handler posting into this harness's mailbox.
    pub fn handler(&mut self) -> Arc<RecordingHandler> {
        let id = self.next_handler_id;
        self.next_handler_id += 1;
        Arc::new(RecordingHandler::new(
            id,
            self.mailbox.sender(),
            self.clock.clone(),
            Arc::clone(&self.journal),
        ))
    }

    pub fn queue(&self) -> &InputQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut InputQueue {
        &mut self.queue
    }

    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    /// Every delivery so far, across handlers: `(handler, block, event)`.
    pub fn journal(&self) -> Vec<(u64, u64, InputEvent)> {
        self.journal
            .lock()
            .map(|j| j.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Timeouts fired so far and what the queue made of them.
    pub fn fired(&self) -> &[FiredTimeout] {
        &self.fired
    }

    pub fn pending_timeouts(&mut self) -> usize {
        self.mailbox.pending_len()
    }

    // ------------------------------------------------------------------------
    // Driving
    // ------------------------------------------------------------------------

    pub fn send(
        &mut self,
        handler: &Arc<RecordingHandler>,
        flags: ConfirmationFlags,
        event: InputEvent,
    ) -> DispatchResult {
        self.queue
            .receive_input_event(&handler.shared(), flags, event, None)
    }

    /// Send a touch-start together with its behaviour hints.
    pub fn send_with_behaviors(
        &mut self,
        handler: &Arc<RecordingHandler>,
        flags: ConfirmationFlags,
        event: InputEvent,
        behaviors: Vec<TouchBehavior>,
    ) -> DispatchResult {
        self.queue
            .receive_input_event(&handler.shared(), flags, event, Some(behaviors))
    }

    /// Advance virtual time by `ms` and deliver every timeout that became
    /// due, in due order. Returns how many changed a block.
    pub fn advance(&mut self, ms: u64) -> usize {
        self.clock.advance(ms);
        let due = self.mailbox.drain_due(self.clock.now());
        let mut effective = 0;
        for task in due {
            let outcome = self.queue.handle_timeout(task);
            tracing::trace!(?task, ?outcome, "harness fired timeout");
            if outcome.is_ok() {
                effective += 1;
            }
            self.fired.push((task, outcome));
        }
        effective
    }

    /// Advance until no timeout is pending.
    pub fn settle(&mut self) -> usize {
        let mut effective = 0;
        while let Some(due) = self.mailbox.next_due() {
            let wait = due.saturating_duration_since(self.clock.now());
            let ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX).max(1);
            effective += self.advance(ms);
        }
        effective
    }

    // ------------------------------------------------------------------------
    // Event builders
    // ------------------------------------------------------------------------

    /// Distinct, increasing timestamp at the current virtual time.
    pub fn stamp(&mut self) -> Instant {
        self.event_seq += 1;
        self.clock.now() + Duration::from_nanos(self.event_seq)
    }

    /// Single-finger touch event at `(x, y)`.
    pub fn touch(&mut self, phase: TouchPhase, x: f32, y: f32) -> InputEvent {
        InputEvent::Touch(TouchInput::new(phase, self.stamp()).with_touch(0, x, y))
    }

    /// Multi-finger touch event, one point per position.
    pub fn touches(&mut self, phase: TouchPhase, points: &[(f32, f32)]) -> InputEvent {
        let mut event = TouchInput::new(phase, self.stamp());
        for (id, &(x, y)) in (0..).zip(points) {
            event = event.with_touch(id, x, y);
        }
        InputEvent::Touch(event)
    }

    pub fn wheel(&mut self, delta_y: f32) -> InputEvent {
        InputEvent::Wheel(WheelInput::new(0.0, delta_y, self.stamp()))
    }

    pub fn mouse(&mut self, kind: MouseKind) -> InputEvent {
        InputEvent::Mouse(MouseInput::new(kind, MouseButton::Primary, 0.0, 0.0, self.stamp()))
    }

    pub fn pan(&mut self, phase: PanPhase, dx: f32, dy: f32) -> InputEvent {
        InputEvent::PanGesture(PanGestureInput::new(phase, dx, dy, self.stamp()))
    }

    /// Pan event whose platform allows a swipe navigation.
    pub fn swipe_pan(&mut self, phase: PanPhase, dx: f32) -> InputEvent {
        InputEvent::PanGesture(PanGestureInput::new(phase, dx, 0.0, self.stamp()).with_swipe())
    }

    pub fn pinch(&mut self, phase: PinchPhase, span: f32) -> InputEvent {
        InputEvent::PinchGesture(PinchGestureInput::new(phase, span, span, self.stamp()))
    }

    pub fn key(&mut self, key_code: u32) -> InputEvent {
        InputEvent::Keyboard(KeyboardInput::new(KeyPhase::Down, key_code, self.stamp()))
    }
}
