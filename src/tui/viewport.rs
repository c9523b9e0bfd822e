//! Pan/zoom viewport for the full-screen diagram inspector
//!
//! The transform is a single owned value updated through pure
//! reducer-style transitions, so zoom and pan behavior is testable
//! without synthesizing real pointer events. Screen coordinates are
//! terminal cells; model coordinates are SVG user units.

use std::time::{Duration, Instant};

/// Zoom ratio per discrete wheel tick
pub const ZOOM_STEP: f64 = 1.1;
pub const MIN_SCALE: f64 = 0.2;
pub const MAX_SCALE: f64 = 10.0;

/// Duration of the animated reset; the transition is cleared afterwards
/// so the next gesture is instantaneous
pub const RESET_ANIMATION: Duration = Duration::from_millis(200);

/// Minimum interval between visible transform writes
const INPUT_THROTTLE: Duration = Duration::from_millis(16);

/// Two primary-button presses this close together are a double click
const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportTransform {
    pub scale: f64,
    pub translate_x: f64,
    pub translate_y: f64,
}

impl ViewportTransform {
    pub const IDENTITY: Self = Self {
        scale: 1.0,
        translate_x: 0.0,
        translate_y: 0.0,
    };

    /// Convert a screen-space point to model coordinates
    pub fn screen_to_model(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.translate_x) / self.scale,
            (y - self.translate_y) / self.scale,
        )
    }

    /// Convert a model-space point to screen coordinates
    pub fn model_to_screen(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x * self.scale + self.translate_x,
            y * self.scale + self.translate_y,
        )
    }
}

impl Default for ViewportTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

/// Cursor-anchored zoom step: the model point under the cursor stays
/// under the cursor. A step clamped back to the current scale is a
/// no-op.
pub fn apply_zoom(
    transform: ViewportTransform,
    cursor_x: f64,
    cursor_y: f64,
    direction: ZoomDirection,
) -> ViewportTransform {
    let old_scale = transform.scale;
    let target = match direction {
        ZoomDirection::In => old_scale * ZOOM_STEP,
        ZoomDirection::Out => old_scale / ZOOM_STEP,
    };
    let new_scale = target.clamp(MIN_SCALE, MAX_SCALE);
    if new_scale == old_scale {
        return transform;
    }

    let ratio = new_scale / old_scale;
    let dx = (cursor_x - transform.translate_x) * (1.0 - ratio);
    let dy = (cursor_y - transform.translate_y) * (1.0 - ratio);

    ViewportTransform {
        scale: new_scale,
        translate_x: transform.translate_x + dx,
        translate_y: transform.translate_y + dy,
    }
}

/// Translate recorded at drag start plus cursor displacement since
pub fn apply_pan(
    start: ViewportTransform,
    drag_start: (f64, f64),
    cursor: (f64, f64),
) -> ViewportTransform {
    ViewportTransform {
        scale: start.scale,
        translate_x: start.translate_x + (cursor.0 - drag_start.0),
        translate_y: start.translate_y + (cursor.1 - drag_start.1),
    }
}

#[derive(Debug, Clone, Copy)]
struct DragState {
    start_cursor: (f64, f64),
    start_transform: ViewportTransform,
}

/// Rate limiter for visible transform writes. Events are always
/// applied; this only gates how often the result is redrawn, and the
/// event loop always draws the final state on its next tick.
#[derive(Debug, Default)]
pub struct Throttle {
    last: Option<Instant>,
}

impl Throttle {
    pub fn should_draw(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < INPUT_THROTTLE => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Modal pan/zoom controller for one open diagram.
///
/// Input handling lives and dies with this value: the event loop only
/// routes pointer/key events here while the inspector is open, so
/// dropping the controller tears every handler down, whatever path
/// closed it.
pub struct Viewport {
    /// Diagram instance being inspected
    pub key: u64,
    transform: ViewportTransform,
    drag: Option<DragState>,
    /// Reset animation: where the transform was when reset was hit
    anim_from: Option<ViewportTransform>,
    animating_until: Option<Instant>,
    last_click: Option<(Instant, (u16, u16))>,
    pub throttle: Throttle,
}

impl Viewport {
    /// Open the inspector; the transform always (re)starts at identity
    pub fn open(key: u64) -> Self {
        Self {
            key,
            transform: ViewportTransform::IDENTITY,
            drag: None,
            anim_from: None,
            animating_until: None,
            last_click: None,
            throttle: Throttle::default(),
        }
    }

    pub fn transform(&self) -> ViewportTransform {
        self.transform
    }

    /// Whether the reset animation is still running at `now`
    pub fn is_animating(&mut self, now: Instant) -> bool {
        match self.animating_until {
            Some(until) if now < until => true,
            Some(_) => {
                // Clear the transition so later gestures are instant
                self.animating_until = None;
                self.anim_from = None;
                false
            }
            None => false,
        }
    }

    /// Transform to draw at `now`: interpolates toward identity while
    /// the reset animation runs, the committed transform otherwise.
    pub fn display_transform(&mut self, now: Instant) -> ViewportTransform {
        let (Some(from), Some(until)) = (self.anim_from, self.animating_until) else {
            return self.transform;
        };
        if now >= until {
            self.animating_until = None;
            self.anim_from = None;
            return self.transform;
        }
        let remaining = (until - now).as_secs_f64() / RESET_ANIMATION.as_secs_f64();
        let target = self.transform;
        ViewportTransform {
            scale: target.scale + (from.scale - target.scale) * remaining,
            translate_x: target.translate_x + (from.translate_x - target.translate_x) * remaining,
            translate_y: target.translate_y + (from.translate_y - target.translate_y) * remaining,
        }
    }

    pub fn on_wheel(&mut self, column: u16, row: u16, direction: ZoomDirection) {
        self.animating_until = None;
        self.anim_from = None;
        self.transform = apply_zoom(self.transform, f64::from(column), f64::from(row), direction);
    }

    /// Primary-button press: starts a pan, or resets on double click.
    /// Other buttons are ignored by the caller.
    pub fn on_primary_down(&mut self, column: u16, row: u16, now: Instant) {
        if let Some((at, pos)) = self.last_click {
            if pos == (column, row) && now.duration_since(at) < DOUBLE_CLICK_WINDOW {
                self.last_click = None;
                self.reset_animated(now);
                return;
            }
        }
        self.last_click = Some((now, (column, row)));
        self.drag = Some(DragState {
            start_cursor: (f64::from(column), f64::from(row)),
            start_transform: self.transform,
        });
    }

    pub fn on_drag(&mut self, column: u16, row: u16) {
        if let Some(drag) = self.drag {
            self.animating_until = None;
            self.anim_from = None;
            self.transform = apply_pan(
                drag.start_transform,
                drag.start_cursor,
                (f64::from(column), f64::from(row)),
            );
        }
    }

    /// Button release or pointer leaving the area ends the pan
    pub fn end_drag(&mut self) {
        self.drag = None;
    }

    /// Restore identity, animated over a fixed short duration
    pub fn reset_animated(&mut self, now: Instant) {
        self.drag = None;
        self.anim_from = Some(self.transform);
        self.transform = ViewportTransform::IDENTITY;
        self.animating_until = Some(now + RESET_ANIMATION);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_zoom_inverse_restores_scale() {
        let t = ViewportTransform {
            scale: 2.0,
            translate_x: 13.0,
            translate_y: -4.0,
        };
        let zoomed = apply_zoom(t, 40.0, 12.0, ZoomDirection::In);
        let back = apply_zoom(zoomed, 40.0, 12.0, ZoomDirection::Out);
        assert!((back.scale - t.scale).abs() < EPS);
        assert!((back.translate_x - t.translate_x).abs() < EPS);
        assert!((back.translate_y - t.translate_y).abs() < EPS);
    }

    #[test]
    fn test_zoom_never_leaves_bounds() {
        let mut t = ViewportTransform::IDENTITY;
        for _ in 0..200 {
            t = apply_zoom(t, 10.0, 10.0, ZoomDirection::In);
            assert!(t.scale <= MAX_SCALE);
        }
        for _ in 0..400 {
            t = apply_zoom(t, 10.0, 10.0, ZoomDirection::Out);
            assert!(t.scale >= MIN_SCALE);
        }
    }

    #[test]
    fn test_zoom_at_bound_is_noop() {
        let t = ViewportTransform {
            scale: MAX_SCALE,
            translate_x: 7.0,
            translate_y: 9.0,
        };
        assert_eq!(apply_zoom(t, 33.0, 21.0, ZoomDirection::In), t);
    }

    #[test]
    fn test_cursor_anchored_zoom_invariant() {
        let t = ViewportTransform {
            scale: 1.7,
            translate_x: -20.0,
            translate_y: 8.0,
        };
        let (cursor_x, cursor_y) = (55.0, 17.0);
        let before = t.screen_to_model(cursor_x, cursor_y);
        let zoomed = apply_zoom(t, cursor_x, cursor_y, ZoomDirection::In);
        let after = zoomed.screen_to_model(cursor_x, cursor_y);
        assert!((before.0 - after.0).abs() < EPS);
        assert!((before.1 - after.1).abs() < EPS);
    }

    #[test]
    fn test_pan_tracks_cursor_displacement() {
        let start = ViewportTransform {
            scale: 3.0,
            translate_x: 5.0,
            translate_y: 5.0,
        };
        let panned = apply_pan(start, (10.0, 10.0), (14.0, 7.0));
        assert_eq!(panned.translate_x, 9.0);
        assert_eq!(panned.translate_y, 2.0);
        assert_eq!(panned.scale, 3.0);
    }

    #[test]
    fn test_reset_restores_identity_after_history() {
        let now = Instant::now();
        let mut vp = Viewport::open(1);
        vp.on_wheel(12, 4, ZoomDirection::In);
        vp.on_primary_down(12, 4, now);
        vp.on_drag(30, 9);
        vp.on_wheel(3, 3, ZoomDirection::Out);
        vp.reset_animated(now);
        assert_eq!(vp.transform(), ViewportTransform::IDENTITY);
        assert!(vp.is_animating(now));
        assert!(!vp.is_animating(now + RESET_ANIMATION));
        // Transition cleared: the flag stays off
        assert!(!vp.is_animating(now + RESET_ANIMATION));
    }

    #[test]
    fn test_display_transform_eases_to_identity() {
        let now = Instant::now();
        let mut vp = Viewport::open(1);
        for _ in 0..5 {
            vp.on_wheel(10, 10, ZoomDirection::In);
        }
        let zoomed_scale = vp.transform().scale;
        vp.reset_animated(now);

        // Committed transform is identity immediately
        assert_eq!(vp.transform(), ViewportTransform::IDENTITY);
        // Display starts at the old transform and lands on identity
        let start = vp.display_transform(now);
        assert!((start.scale - zoomed_scale).abs() < 1e-9);
        let mid = vp.display_transform(now + RESET_ANIMATION / 2);
        assert!(mid.scale > 1.0 && mid.scale < zoomed_scale);
        let done = vp.display_transform(now + RESET_ANIMATION);
        assert_eq!(done, ViewportTransform::IDENTITY);
        // Transition cleared afterwards
        assert!(!vp.is_animating(now + RESET_ANIMATION));
    }

    #[test]
    fn test_double_click_resets() {
        let now = Instant::now();
        let mut vp = Viewport::open(1);
        vp.on_wheel(10, 10, ZoomDirection::In);
        vp.on_primary_down(6, 6, now);
        vp.end_drag();
        vp.on_primary_down(6, 6, now + Duration::from_millis(120));
        assert_eq!(vp.transform(), ViewportTransform::IDENTITY);
    }

    #[test]
    fn test_slow_second_click_is_not_double() {
        let now = Instant::now();
        let mut vp = Viewport::open(1);
        vp.on_wheel(10, 10, ZoomDirection::In);
        let zoomed = vp.transform();
        vp.on_primary_down(6, 6, now);
        vp.end_drag();
        vp.on_primary_down(6, 6, now + Duration::from_millis(900));
        assert_eq!(vp.transform(), zoomed);
    }

    #[test]
    fn test_drag_after_release_is_ignored() {
        let mut vp = Viewport::open(1);
        vp.end_drag();
        vp.on_drag(50, 50);
        assert_eq!(vp.transform(), ViewportTransform::IDENTITY);
    }

    #[test]
    fn test_throttle_coalesces_rapid_writes() {
        let mut throttle = Throttle::default();
        let now = Instant::now();
        assert!(throttle.should_draw(now));
        assert!(!throttle.should_draw(now + Duration::from_millis(5)));
        assert!(throttle.should_draw(now + Duration::from_millis(20)));
    }
}
