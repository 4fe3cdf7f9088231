mod opengl;

use cgmath::{Matrix4, Rad, Vector3};
use std::error::Error;
use std::sync::Arc;
use winit::window::Window;

// --- Public Data Contract ---

#[derive(Clone)]
pub struct RenderList {
    pub clear_color: [f32; 4],
    pub objects: Vec<RenderObject>,
}

#[derive(Clone)]
pub struct RenderObject {
    pub transform: Matrix4<f32>,
    pub color: [f32; 4],
    pub blend: BlendMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendMode {
    Alpha,
    Add,
}

// --- Object builders ---
// Everything on screen is the shared unit quad under a model transform.

/// Axis-aligned quad centered on (cx, cy).
#[inline(always)]
pub fn quad(cx: f32, cy: f32, w: f32, h: f32, color: [f32; 4], blend: BlendMode) -> RenderObject {
    RenderObject {
        transform: Matrix4::from_translation(Vector3::new(cx, cy, 0.0))
            * Matrix4::from_nonuniform_scale(w, h, 1.0),
        color,
        blend,
    }
}

/// Axis-aligned quad from its top-left corner.
#[inline(always)]
pub fn rect(x: f32, y: f32, w: f32, h: f32, color: [f32; 4], blend: BlendMode) -> RenderObject {
    quad(x + 0.5 * w, y + 0.5 * h, w, h, color, blend)
}

/// A line segment drawn as a rotated thin quad.
pub fn line(
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    thickness: f32,
    color: [f32; 4],
    blend: BlendMode,
) -> RenderObject {
    let dx = x2 - x1;
    let dy = y2 - y1;
    let len = (dx * dx + dy * dy).sqrt().max(1e-6);
    RenderObject {
        transform: Matrix4::from_translation(Vector3::new(
            0.5 * (x1 + x2),
            0.5 * (y1 + y2),
            0.0,
        )) * Matrix4::from_angle_z(Rad(dy.atan2(dx)))
            * Matrix4::from_nonuniform_scale(len, thickness, 1.0),
        color,
        blend,
    }
}

// --- Backend facade ---

pub struct Backend(opengl::State);

pub fn init(window: Arc<Window>, vsync_enabled: bool) -> Result<Backend, Box<dyn Error>> {
    Ok(Backend(opengl::init(window, vsync_enabled)?))
}

/// Draws one frame. Returns the number of objects drawn.
pub fn draw(backend: &mut Backend, list: &RenderList) -> Result<u32, Box<dyn Error>> {
    opengl::draw(&mut backend.0, list)
}

pub fn resize(backend: &mut Backend, width: u32, height: u32) {
    opengl::resize(&mut backend.0, width, height);
}

pub fn cleanup(backend: &mut Backend) {
    opengl::cleanup(&mut backend.0);
}
