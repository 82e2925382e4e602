#![forbid(unsafe_code)]

//! Deferred fallback resolution for blocks waiting on confirmation.
//!
//! Every block created with an unconfirmed target or a pending content
//! decision gets a *content-response timeout*: after a configurable delay it
//! force-resolves whatever is still open. Timeouts are plain messages
//! ([`TimeoutTask`]) carrying the block id and what to resolve; the
//! [`ConfirmationScheduler`] hands them to the target handler's delayed-task
//! primitive, and the embedder delivers them back to
//! [`InputQueue::handle_timeout`](crate::queue::InputQueue::handle_timeout) on
//! the controller context.
//!
//! # Immediate mode
//!
//! A zero delay means "ignore confirmations and always use the fallback".
//! The task cannot run inside the call that scheduled it, because the event
//! that triggered it is not queued yet, so it is stashed and the queue runs
//! it when the public call returns.
//!
//! # Mailbox
//!
//! [`TimeoutMailbox`] is a ready-made delayed-task primitive: handlers keep a
//! cloneable [`TimeoutSender`], the controller loop calls
//! [`TimeoutMailbox::drain_due`] and forwards the tasks. Tasks for blocks
//! that no longer exist are harmless; the queue ignores them.

use std::sync::mpsc;

use web_time::{Duration, Instant};

use crate::block::BlockId;
use crate::config::QueueConfig;
use crate::handler::SharedHandler;

/// Which fallback a timeout carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutKind {
    /// Resolve the content race (and the target race) to `TimedOut`.
    ContentResponse,
    /// Force a touch block that is still in slop through the content
    /// fallback so a long-press is not delayed.
    LongTap,
}

/// A deferred fallback for one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeoutTask {
    pub block_id: BlockId,
    pub kind: TimeoutKind,
}

impl TimeoutTask {
    #[must_use]
    pub const fn content_response(block_id: BlockId) -> Self {
        Self {
            block_id,
            kind: TimeoutKind::ContentResponse,
        }
    }

    #[must_use]
    pub const fn long_tap(block_id: BlockId) -> Self {
        Self {
            block_id,
            kind: TimeoutKind::LongTap,
        }
    }
}

/// Whole milliseconds in `delay`, saturating at `u64::MAX`.
fn delay_ms(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// ConfirmationScheduler
// ---------------------------------------------------------------------------

/// Schedules fallback timeouts through the target handler.
#[derive(Debug, Clone)]
pub struct ConfirmationScheduler {
    content_response_timeout: Duration,
    long_tap_timeout: Duration,
    immediate: Vec<TimeoutTask>,
}

impl ConfirmationScheduler {
    #[must_use]
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            content_response_timeout: config.content_response_timeout,
            long_tap_timeout: config.long_tap_timeout,
            immediate: Vec::new(),
        }
    }

    /// Timeouts resolve right after the scheduling call returns.
    #[must_use]
    pub fn is_immediate(&self) -> bool {
        self.content_response_timeout.is_zero()
    }

    #[must_use]
    pub fn content_response_timeout(&self) -> Duration {
        self.content_response_timeout
    }

    #[must_use]
    pub fn long_tap_timeout(&self) -> Duration {
        self.long_tap_timeout
    }

    /// Schedule the content-response fallback for `block_id`.
    pub fn schedule_content_timeout(&mut self, target: &SharedHandler, block_id: BlockId) {
        let task = TimeoutTask::content_response(block_id);
        if self.is_immediate() {
            tracing::debug!(
                target: crate::logging::TARGET,
                block_id,
                "stashing immediate content-response timeout"
            );
            self.immediate.push(task);
        } else {
            tracing::debug!(
                target: crate::logging::TARGET,
                block_id,
                handler = target.id(),
                delay_ms = delay_ms(self.content_response_timeout),
                "scheduling content-response timeout"
            );
            target.post_delayed_task(task, self.content_response_timeout);
        }
    }

    /// Schedule the long-tap fallback for `block_id`.
    pub fn schedule_long_tap_timeout(&self, target: &SharedHandler, block_id: BlockId) {
        tracing::debug!(
            target: crate::logging::TARGET,
            block_id,
            handler = target.id(),
            delay_ms = delay_ms(self.long_tap_timeout),
            "scheduling maybe-long-tap timeout"
        );
        target.post_delayed_task(TimeoutTask::long_tap(block_id), self.long_tap_timeout);
    }

    /// Take the stashed immediate tasks, oldest first.
    pub(crate) fn take_immediate(&mut self) -> Vec<TimeoutTask> {
        std::mem::take(&mut self.immediate)
    }

    #[must_use]
    pub fn has_immediate(&self) -> bool {
        !self.immediate.is_empty()
    }

    pub fn clear(&mut self) {
        self.immediate.clear();
    }
}

// ---------------------------------------------------------------------------
// TimeoutMailbox
// ---------------------------------------------------------------------------

/// A timeout waiting for its due time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTimeout {
    pub task: TimeoutTask,
    pub due: Instant,
}

/// Sending half of a [`TimeoutMailbox`]. Cheap to clone, `Send`.
#[derive(Debug, Clone)]
pub struct TimeoutSender {
    tx: mpsc::Sender<ScheduledTimeout>,
}

impl TimeoutSender {
    /// Post `task` to fire `delay` from now.
    pub fn post(&self, task: TimeoutTask, delay: Duration) {
        self.post_at(task, Instant::now() + delay);
    }

    /// Post `task` to fire at `due`.
    pub fn post_at(&self, task: TimeoutTask, due: Instant) {
        // A dropped mailbox means the controller is gone; nothing to resolve.
        if self.tx.send(ScheduledTimeout { task, due }).is_err() {
            tracing::trace!(
                target: crate::logging::TARGET,
                block_id = task.block_id,
                "timeout mailbox closed, dropping task"
            );
        }
    }
}

/// Controller-side collection of posted timeouts.
#[derive(Debug)]
pub struct TimeoutMailbox {
    tx: mpsc::Sender<ScheduledTimeout>,
    rx: mpsc::Receiver<ScheduledTimeout>,
    /// Received but not yet due, ordered by due time (FIFO among equals).
    pending: Vec<ScheduledTimeout>,
}

impl Default for TimeoutMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeoutMailbox {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx,
            pending: Vec::new(),
        }
    }

    #[must_use]
    pub fn sender(&self) -> TimeoutSender {
        TimeoutSender {
            tx: self.tx.clone(),
        }
    }

    fn receive(&mut self) {
        while let Ok(scheduled) = self.rx.try_recv() {
            let at = self.pending.partition_point(|p| p.due <= scheduled.due);
            self.pending.insert(at, scheduled);
        }
    }

    /// Remove and return every task due at or before `now`, in due order.
    pub fn drain_due(&mut self, now: Instant) -> Vec<TimeoutTask> {
        self.receive();
        let split = self.pending.partition_point(|p| p.due <= now);
        self.pending.drain(..split).map(|p| p.task).collect()
    }

    /// Earliest due time among pending tasks.
    pub fn next_due(&mut self) -> Option<Instant> {
        self.receive();
        self.pending.first().map(|p| p.due)
    }

    /// Number of tasks not yet drained.
    pub fn pending_len(&mut self) -> usize {
        self.receive();
        self.pending.len()
    }

    /// Drop everything pending.
    pub fn clear(&mut self) {
        self.receive();
        self.pending.clear();
    }
}
