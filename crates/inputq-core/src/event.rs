#![forbid(unsafe_code)]

//! Canonical input events accepted by the queue.
//!
//! Events arrive already classified by kind: the queue never recognizes
//! gestures itself, it only sequences them. Every event carries the timestamp
//! at which the platform produced it, so wheel transactions and tests stay
//! deterministic without reading a clock.
//!
//! # Design Notes
//!
//! - Positions are screen-space `f32` coordinates.
//! - Touch events carry the full set of changed touch points.
//! - [`TouchBehavior`] uses bitflags, one value per touch point of a
//!   touch-start.

use bitflags::bitflags;
use web_time::Instant;

/// A raw input event of exactly one kind.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// Multi-touch input.
    Touch(TouchInput),
    /// Scroll wheel input.
    Wheel(WheelInput),
    /// Mouse input (drag blocks).
    Mouse(MouseInput),
    /// Trackpad pan gesture input.
    PanGesture(PanGestureInput),
    /// Trackpad pinch gesture input.
    PinchGesture(PinchGestureInput),
    /// Keyboard input.
    Keyboard(KeyboardInput),
}

/// Discriminant of [`InputEvent`], also used to name block kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InputKind {
    Touch,
    Wheel,
    Drag,
    PanGesture,
    PinchGesture,
    Keyboard,
}

impl InputKind {
    /// Stable lowercase name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Touch => "touch",
            Self::Wheel => "wheel",
            Self::Drag => "drag",
            Self::PanGesture => "pan",
            Self::PinchGesture => "pinch",
            Self::Keyboard => "keyboard",
        }
    }
}

impl std::fmt::Display for InputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl InputEvent {
    /// The block kind this event belongs to.
    #[must_use]
    pub const fn kind(&self) -> InputKind {
        match self {
            Self::Touch(_) => InputKind::Touch,
            Self::Wheel(_) => InputKind::Wheel,
            Self::Mouse(_) => InputKind::Drag,
            Self::PanGesture(_) => InputKind::PanGesture,
            Self::PinchGesture(_) => InputKind::PinchGesture,
            Self::Keyboard(_) => InputKind::Keyboard,
        }
    }

    /// Platform timestamp of the event.
    #[must_use]
    pub fn timestamp(&self) -> Instant {
        match self {
            Self::Touch(e) => e.timestamp,
            Self::Wheel(e) => e.timestamp,
            Self::Mouse(e) => e.timestamp,
            Self::PanGesture(e) => e.timestamp,
            Self::PinchGesture(e) => e.timestamp,
            Self::Keyboard(e) => e.timestamp,
        }
    }

    #[must_use]
    pub fn as_touch(&self) -> Option<&TouchInput> {
        match self {
            Self::Touch(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_wheel(&self) -> Option<&WheelInput> {
        match self {
            Self::Wheel(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_pan_gesture(&self) -> Option<&PanGestureInput> {
        match self {
            Self::PanGesture(e) => Some(e),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A screen-space point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance(self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

// ---------------------------------------------------------------------------
// Touch
// ---------------------------------------------------------------------------

/// Phase of a multi-touch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TouchPhase {
    Start,
    Move,
    End,
    Cancel,
}

/// One touch point of a multi-touch event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    /// Platform identifier, stable for the lifetime of the touch.
    pub id: i32,
    pub position: Point,
}

/// A multi-touch event.
#[derive(Debug, Clone, PartialEq)]
pub struct TouchInput {
    pub phase: TouchPhase,
    /// Touch points that changed in this event.
    pub touches: Vec<TouchPoint>,
    pub timestamp: Instant,
}

impl TouchInput {
    /// Create a touch event with no touch points.
    #[must_use]
    pub fn new(phase: TouchPhase, timestamp: Instant) -> Self {
        Self {
            phase,
            touches: Vec::with_capacity(1),
            timestamp,
        }
    }

    /// Add a touch point.
    #[must_use]
    pub fn with_touch(mut self, id: i32, x: f32, y: f32) -> Self {
        self.touches.push(TouchPoint {
            id,
            position: Point::new(x, y),
        });
        self
    }
}

bitflags! {
    /// Touch behaviours allowed by the content under a touch point.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TouchBehavior: u8 {
        const VERTICAL_PAN   = 0b0000_0001;
        const HORIZONTAL_PAN = 0b0000_0010;
        const PINCH_ZOOM     = 0b0000_0100;
        const ANIMATING_ZOOM = 0b0000_1000;
    }
}

impl TouchBehavior {
    /// Everything allowed (`touch-action: auto`).
    pub const AUTO: Self = Self::all();
}

// ---------------------------------------------------------------------------
// Wheel
// ---------------------------------------------------------------------------

/// A scroll wheel event.
#[derive(Debug, Clone, PartialEq)]
pub struct WheelInput {
    pub position: Point,
    pub delta_x: f32,
    pub delta_y: f32,
    pub timestamp: Instant,
    /// Position of this event in its wheel transaction, 1-based. Assigned by
    /// the queue to the queued copy; zero on events from the platform.
    pub scroll_series: u32,
}

impl WheelInput {
    #[must_use]
    pub fn new(delta_x: f32, delta_y: f32, timestamp: Instant) -> Self {
        Self {
            position: Point::default(),
            delta_x,
            delta_y,
            timestamp,
            scroll_series: 0,
        }
    }

    #[must_use]
    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.position = Point::new(x, y);
        self
    }
}

// ---------------------------------------------------------------------------
// Mouse
// ---------------------------------------------------------------------------

/// Mouse buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Primary,
    Secondary,
    Middle,
    None,
}

/// Mouse event types relevant to drag blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseKind {
    Down,
    Up,
    Move,
    DragStart,
    DragEnd,
    WidgetEnter,
    WidgetExit,
}

/// A mouse event.
#[derive(Debug, Clone, PartialEq)]
pub struct MouseInput {
    pub kind: MouseKind,
    pub button: MouseButton,
    pub position: Point,
    pub timestamp: Instant,
    /// Set by the queue when a down/up must not produce a click, because it
    /// interrupted an autoscroll.
    pub prevent_click: bool,
}

impl MouseInput {
    #[must_use]
    pub fn new(kind: MouseKind, button: MouseButton, x: f32, y: f32, timestamp: Instant) -> Self {
        Self {
            kind,
            button,
            position: Point::new(x, y),
            timestamp,
            prevent_click: false,
        }
    }

    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.button == MouseButton::Primary
    }
}

// ---------------------------------------------------------------------------
// Pan gesture
// ---------------------------------------------------------------------------

/// Phase of a trackpad pan gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanPhase {
    MayStart,
    Cancelled,
    Start,
    Pan,
    End,
    MomentumStart,
    MomentumPan,
    MomentumEnd,
    Interrupted,
}

impl PanPhase {
    #[must_use]
    pub const fn is_momentum(self) -> bool {
        matches!(
            self,
            Self::MomentumStart | Self::MomentumPan | Self::MomentumEnd
        )
    }
}

/// A trackpad pan gesture event.
#[derive(Debug, Clone, PartialEq)]
pub struct PanGestureInput {
    pub phase: PanPhase,
    pub position: Point,
    pub displacement: Point,
    /// The platform allows this gesture to become a swipe navigation.
    pub allows_swipe: bool,
    pub timestamp: Instant,
}

impl PanGestureInput {
    #[must_use]
    pub fn new(phase: PanPhase, dx: f32, dy: f32, timestamp: Instant) -> Self {
        Self {
            phase,
            position: Point::default(),
            displacement: Point::new(dx, dy),
            allows_swipe: false,
            timestamp,
        }
    }

    #[must_use]
    pub fn with_swipe(mut self) -> Self {
        self.allows_swipe = true;
        self
    }
}

// ---------------------------------------------------------------------------
// Pinch gesture
// ---------------------------------------------------------------------------

/// Phase of a trackpad pinch gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinchPhase {
    Start,
    Scale,
    End,
}

/// A trackpad pinch gesture event.
#[derive(Debug, Clone, PartialEq)]
pub struct PinchGestureInput {
    pub phase: PinchPhase,
    pub focus: Point,
    pub current_span: f32,
    pub previous_span: f32,
    pub timestamp: Instant,
}

impl PinchGestureInput {
    #[must_use]
    pub fn new(phase: PinchPhase, previous_span: f32, current_span: f32, timestamp: Instant) -> Self {
        Self {
            phase,
            focus: Point::default(),
            current_span,
            previous_span,
            timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Keyboard
// ---------------------------------------------------------------------------

/// Keyboard event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyPhase {
    Down,
    Up,
    Press,
}

/// A keyboard event already matched to a scroll action by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyboardInput {
    pub phase: KeyPhase,
    pub key_code: u32,
    pub timestamp: Instant,
}

impl KeyboardInput {
    #[must_use]
    pub fn new(phase: KeyPhase, key_code: u32, timestamp: Instant) -> Self {
        Self {
            phase,
            key_code,
            timestamp,
        }
    }
}
