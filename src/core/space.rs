use cgmath::Matrix4;
use std::cell::Cell;

// -----------------------------------------------------------------------------
// Logical design space (top-left origin, y grows downward)
// -----------------------------------------------------------------------------
#[inline(always)]
pub const fn logical_height() -> f32 {
    480.0
}

#[derive(Clone, Copy, Debug)]
pub struct Metrics {
    pub width: f32,
    pub height: f32,
}

thread_local! {
    static CURRENT_METRICS: Cell<Metrics> = Cell::new(metrics_for_window(854, 480));
}

#[inline(always)]
pub fn set_current_metrics(m: Metrics) {
    CURRENT_METRICS.with(|c| c.set(m));
}

#[inline(always)]
pub fn metrics_for_window(px_w: u32, px_h: u32) -> Metrics {
    let aspect = if px_h == 0 {
        16.0 / 9.0
    } else {
        px_w as f32 / px_h as f32
    };
    Metrics {
        width: logical_height() * aspect,
        height: logical_height(),
    }
}

#[inline(always)]
pub fn screen_width() -> f32 {
    CURRENT_METRICS.with(|c| c.get().width)
}

#[inline(always)]
pub fn screen_height() -> f32 {
    CURRENT_METRICS.with(|c| c.get().height)
}

#[inline(always)]
pub fn screen_center_x() -> f32 {
    0.5 * screen_width()
}

#[inline(always)]
pub fn screen_center_y() -> f32 {
    0.5 * screen_height()
}

/// Ortho for the current window; also publishes the logical metrics.
#[inline(always)]
pub fn ortho_for_window(width: u32, height: u32) -> Matrix4<f32> {
    let m = metrics_for_window(width, height);
    set_current_metrics(m);
    cgmath::ortho(0.0, m.width, m.height, 0.0, -1.0, 1.0)
}

// -----------------------------------------------------------------------------
// Pinhole camera
// -----------------------------------------------------------------------------

/// Focal length of the city camera, in logical units.
pub const FOCAL_LENGTH: f32 = 320.0;
/// Camera eye height above the ground plane, in world units.
pub const CAMERA_HEIGHT: f32 = 140.0;
/// Fixed vertical offset: the horizon sits a little above screen center.
pub const HORIZON_LIFT: f32 = -42.0;

/// Projects a world-space point to logical screen coordinates.
/// Points at or behind the camera plane (depth <= 0) are unprojectable
/// and must be skipped by callers.
#[inline(always)]
pub fn project(x: f32, y: f32, depth: f32) -> Option<(f32, f32)> {
    let s = scale_at(depth)?;
    Some((
        screen_center_x() + x * s,
        screen_center_y() + HORIZON_LIFT + (CAMERA_HEIGHT - y) * s,
    ))
}

/// Perspective scale factor at the given depth, or `None` when unprojectable.
#[inline(always)]
pub fn scale_at(depth: f32) -> Option<f32> {
    if depth <= 0.0 {
        return None;
    }
    Some(FOCAL_LENGTH / depth)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_depth_is_unprojectable() {
        assert!(project(0.0, 0.0, 0.0).is_none());
        assert!(project(10.0, 5.0, -3.0).is_none());
    }

    #[test]
    fn points_converge_to_horizon_with_depth() {
        set_current_metrics(metrics_for_window(854, 480));
        let (near_x, _) = project(100.0, 0.0, 200.0).unwrap();
        let (far_x, _) = project(100.0, 0.0, 4000.0).unwrap();
        let cx = screen_center_x();
        // The same lateral offset shrinks toward screen center as depth grows.
        assert!((far_x - cx).abs() < (near_x - cx).abs());
    }

    #[test]
    fn centerline_projects_to_center_column() {
        set_current_metrics(metrics_for_window(854, 480));
        let (x, _) = project(0.0, 0.0, 500.0).unwrap();
        assert!((x - screen_center_x()).abs() < 1e-4);
    }

    #[test]
    fn nearer_points_are_larger() {
        assert!(scale_at(100.0).unwrap() > scale_at(1000.0).unwrap());
    }

    #[test]
    fn metrics_track_aspect() {
        let wide = metrics_for_window(1920, 1080);
        let tall = metrics_for_window(600, 800);
        assert!(wide.width > wide.height);
        assert!(tall.width < tall.height);
        assert_eq!(wide.height, logical_height());
    }
}
