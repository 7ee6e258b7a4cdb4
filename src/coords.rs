//! Pixel ↔ percentage-space transforms, anchored to the rendered base-image
//! box. All functions are pure; callers pass the *live* bounds on every call
//! so a reflow between gesture start and end is picked up automatically.
//! Clamping into [0, 100] is the caller's job, not done here.

use egui::{Pos2, Rect, Vec2};

/// Converts a pointer displacement in pixels into a percentage-space
/// displacement relative to `bounds`.
pub fn delta_to_percent(delta: Vec2, bounds: Rect) -> Vec2 {
    Vec2::new(
        axis_to_percent(delta.x, bounds.width()),
        axis_to_percent(delta.y, bounds.height()),
    )
}

/// Converts an absolute screen point into percentage coordinates.
pub fn point_to_percent(point: Pos2, bounds: Rect) -> (f32, f32) {
    let rel = point - bounds.min;
    (
        axis_to_percent(rel.x, bounds.width()),
        axis_to_percent(rel.y, bounds.height()),
    )
}

/// Converts percentage coordinates back into an absolute screen point.
pub fn percent_to_point(x: f32, y: f32, bounds: Rect) -> Pos2 {
    Pos2::new(
        bounds.min.x + x / 100.0 * bounds.width(),
        bounds.min.y + y / 100.0 * bounds.height(),
    )
}

fn axis_to_percent(delta: f32, extent: f32) -> f32 {
    if extent > 0.0 {
        delta / extent * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> Rect {
        Rect::from_min_size(Pos2::new(10.0, 20.0), Vec2::new(400.0, 200.0))
    }

    #[test]
    fn delta_scales_per_axis() {
        let d = delta_to_percent(Vec2::new(100.0, 20.0), bounds());
        assert_eq!(d, Vec2::new(25.0, 10.0));
    }

    #[test]
    fn point_round_trips() {
        let p = percent_to_point(75.0, 10.0, bounds());
        assert_eq!(p, Pos2::new(310.0, 40.0));
        assert_eq!(point_to_percent(p, bounds()), (75.0, 10.0));
    }

    #[test]
    fn live_bounds_change_the_mapping() {
        // Same pixel delta means a different percentage once the box reflows.
        let d = Vec2::new(100.0, 0.0);
        let wide = Rect::from_min_size(Pos2::ZERO, Vec2::new(1000.0, 500.0));
        assert_eq!(delta_to_percent(d, bounds()).x, 25.0);
        assert_eq!(delta_to_percent(d, wide).x, 10.0);
    }

    #[test]
    fn degenerate_bounds_yield_zero() {
        let flat = Rect::from_min_size(Pos2::ZERO, Vec2::new(0.0, 100.0));
        let d = delta_to_percent(Vec2::new(50.0, 50.0), flat);
        assert_eq!(d.x, 0.0);
        assert_eq!(d.y, 50.0);
    }

    #[test]
    fn output_is_not_clamped_here() {
        let d = delta_to_percent(Vec2::new(2000.0, -900.0), bounds());
        assert_eq!(d, Vec2::new(500.0, -450.0));
    }
}
