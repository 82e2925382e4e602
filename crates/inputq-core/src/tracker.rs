#![forbid(unsafe_code)]

//! Small trackers that outlive individual blocks.
//!
//! - [`TouchCounter`] counts fingers currently down, across touch blocks.
//! - [`DragTracker`] remembers whether a primary-button drag is in progress
//!   and whether it started on a scrollbar. A drag block can be interrupted
//!   by other input and replaced; the tracker persists across that.

use crate::event::{MouseInput, MouseKind, TouchInput, TouchPhase};

/// Number of touch points currently down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TouchCounter {
    active: u32,
}

impl TouchCounter {
    #[must_use]
    pub const fn new() -> Self {
        Self { active: 0 }
    }

    /// Update the count from a dispatched touch event.
    pub fn update(&mut self, event: &TouchInput) {
        let changed = u32::try_from(event.touches.len()).unwrap_or(u32::MAX);
        match event.phase {
            TouchPhase::Start => self.active = self.active.saturating_add(changed),
            TouchPhase::Move => {}
            TouchPhase::End => self.active = self.active.saturating_sub(changed),
            TouchPhase::Cancel => self.active = 0,
        }
    }

    #[must_use]
    pub const fn active_touch_count(&self) -> u32 {
        self.active
    }
}

/// Tracks an ongoing primary-button drag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DragTracker {
    in_drag: bool,
    on_scrollbar: Option<bool>,
}

impl DragTracker {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            in_drag: false,
            on_scrollbar: None,
        }
    }

    /// A primary-button down starts a drag.
    #[must_use]
    pub fn starts_drag(event: &MouseInput) -> bool {
        event.is_primary() && event.kind == MouseKind::Down
    }

    /// A primary-button up ends a drag.
    #[must_use]
    pub fn ends_drag(event: &MouseInput) -> bool {
        event.is_primary() && event.kind == MouseKind::Up
    }

    pub fn update(&mut self, event: &MouseInput) {
        if Self::starts_drag(event) {
            self.in_drag = true;
            self.on_scrollbar = None;
        } else if Self::ends_drag(event) {
            self.in_drag = false;
            self.on_scrollbar = None;
        }
    }

    #[must_use]
    pub const fn in_drag(&self) -> bool {
        self.in_drag
    }

    /// Whether the current drag is a scrollbar drag. The first caller during
    /// a drag decides, later hit results are ignored.
    pub fn is_on_scrollbar(&mut self, hit_scrollbar: bool) -> bool {
        *self.on_scrollbar.get_or_insert(hit_scrollbar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MouseButton;
    use web_time::Instant;

    fn mouse(kind: MouseKind, button: MouseButton) -> MouseInput {
        MouseInput::new(kind, button, 0.0, 0.0, Instant::now())
    }

    #[test]
    fn touch_counter_tracks_fingers() {
        let now = Instant::now();
        let mut c = TouchCounter::new();
        c.update(
            &TouchInput::new(TouchPhase::Start, now)
                .with_touch(0, 0.0, 0.0)
                .with_touch(1, 1.0, 1.0),
        );
        assert_eq!(c.active_touch_count(), 2);
        c.update(&TouchInput::new(TouchPhase::End, now).with_touch(0, 0.0, 0.0));
        assert_eq!(c.active_touch_count(), 1);
        c.update(&TouchInput::new(TouchPhase::Cancel, now));
        assert_eq!(c.active_touch_count(), 0);
        c.update(&TouchInput::new(TouchPhase::End, now).with_touch(0, 0.0, 0.0));
        assert_eq!(c.active_touch_count(), 0);
    }

    #[test]
    fn drag_tracker_follows_primary_button() {
        let mut t = DragTracker::new();
        t.update(&mouse(MouseKind::Down, MouseButton::Secondary));
        assert!(!t.in_drag());
        t.update(&mouse(MouseKind::Down, MouseButton::Primary));
        assert!(t.in_drag());
        t.update(&mouse(MouseKind::Move, MouseButton::Primary));
        assert!(t.in_drag());
        t.update(&mouse(MouseKind::Up, MouseButton::Primary));
        assert!(!t.in_drag());
    }

    #[test]
    fn scrollbar_decision_sticks_for_the_drag() {
        let mut t = DragTracker::new();
        t.update(&mouse(MouseKind::Down, MouseButton::Primary));
        assert!(t.is_on_scrollbar(true));
        assert!(t.is_on_scrollbar(false));
        t.update(&mouse(MouseKind::Down, MouseButton::Primary));
        assert!(!t.is_on_scrollbar(false));
    }
}
