#![forbid(unsafe_code)]

//! inputq Core
//!
//! Ordered, confirmation-gated delivery of input events to pan/zoom
//! handlers.
//!
//! Raw input arrives on a single controller context before it is known which
//! handler should receive it, and before content has had a chance to prevent
//! the default action. The queue groups events into blocks, holds each block
//! until both answers arrive (or a fallback timeout fires), and then delivers
//! the block's events in arrival order.
//!
//! # Key Components
//!
//! - [`InputQueue`] - The coordinator: intake, resolution, drain
//! - [`Block`] - One group of events sharing a confirmation outcome
//! - [`Handler`] - Collaborator that performs the effect of an event
//! - [`QueueConfig`] - Timeouts and behaviour switches
//! - [`TimeoutMailbox`] - Ready-made delayed-task primitive for handlers
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use inputq_core::{
//!     Block, ConfirmationFlags, EventStatus, Handler, HandlerId, InputEvent, InputQueue,
//!     QueueConfig, TimeoutTask, WheelInput,
//! };
//!
//! struct Scroller;
//!
//! impl Handler for Scroller {
//!     fn id(&self) -> HandlerId { 1 }
//!     fn handle_input_event(&self, _event: &InputEvent, _block: &Block) -> EventStatus {
//!         EventStatus::ConsumeNoDefault
//!     }
//!     fn post_delayed_task(&self, _task: TimeoutTask, _delay: Duration) {}
//! }
//!
//! let target: inputq_core::SharedHandler = Arc::new(Scroller);
//! let mut queue = InputQueue::new(QueueConfig::default());
//! let wheel = InputEvent::Wheel(WheelInput::new(0.0, 3.0, web_time::Instant::now()));
//! let result = queue.receive_input_event(&target, ConfirmationFlags::CONFIRMED, wheel, None);
//! assert!(result.handled.is_some());
//! assert_eq!(queue.stats().events_dispatched, 1);
//! ```

pub mod block;
pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod logging;
pub mod queue;
pub mod result;
pub mod scheduler;
pub mod tracker;

pub use block::{
    Block, BlockData, BlockId, BrowserGestureResponse, ConfirmationFlags, ContentState,
    DragBlock, DragDirection, DragMetrics, PanGestureBlock, PinchGestureBlock, TargetState,
    TouchBlock, WheelBlock,
};
pub use config::{ConfigError, QueueConfig};
pub use error::ResolveError;
pub use event::{
    InputEvent, InputKind, KeyPhase, KeyboardInput, MouseButton, MouseInput, MouseKind,
    PanGestureInput, PanPhase, PinchGestureInput, PinchPhase, Point, TouchBehavior, TouchInput,
    TouchPhase, TouchPoint, WheelInput,
};
pub use handler::{
    CancelAnimationFlags, ConsumableFlags, EventStatus, Handler, HandlerId, SharedHandler,
    same_handler, same_target,
};
pub use queue::{BlockCallback, InputQueue, QueueStats, QueuedEntry, handled_result_for};
pub use result::{DispatchResult, HandledPlace, HandledResult};
pub use scheduler::{
    ConfirmationScheduler, ScheduledTimeout, TimeoutKind, TimeoutMailbox, TimeoutSender,
    TimeoutTask,
};
pub use tracker::{DragTracker, TouchCounter};
