//! Stroke font: every glyph is a handful of line segments in a unit cell,
//! drawn as thin quads by the renderer. Keeps the whole game asset-free.

use crate::core::gfx::{self, BlendMode, RenderObject};

type Seg = (f32, f32, f32, f32);

const ADVANCE: f32 = 0.85;
const STROKE: f32 = 0.10;

// Segment shorthand on a 0.6 x 1.0 cell (y grows downward).
const T: Seg = (0.0, 0.0, 0.6, 0.0);
const M: Seg = (0.0, 0.5, 0.6, 0.5);
const B: Seg = (0.0, 1.0, 0.6, 1.0);
const TL: Seg = (0.0, 0.0, 0.0, 0.5);
const BL: Seg = (0.0, 0.5, 0.0, 1.0);
const TR: Seg = (0.6, 0.0, 0.6, 0.5);
const BR: Seg = (0.6, 0.5, 0.6, 1.0);

fn glyph(c: char) -> &'static [Seg] {
    match c {
        'A' => &[T, TL, TR, M, BL, BR],
        'B' => &[T, TL, TR, M, BL, BR, B],
        'C' => &[T, TL, BL, B],
        'D' => &[T, TL, TR, BL, BR, B],
        'E' => &[T, TL, M, BL, B],
        'F' => &[T, TL, M, BL],
        'G' => &[T, TL, BL, B, BR, (0.3, 0.5, 0.6, 0.5)],
        'H' => &[TL, TR, M, BL, BR],
        'I' => &[T, B, (0.3, 0.0, 0.3, 1.0)],
        'J' => &[TR, BR, B, (0.0, 0.7, 0.0, 1.0)],
        'K' => &[TL, BL, (0.0, 0.5, 0.6, 0.0), (0.0, 0.5, 0.6, 1.0)],
        'L' => &[TL, BL, B],
        'M' => &[TL, BL, TR, BR, (0.0, 0.0, 0.3, 0.5), (0.3, 0.5, 0.6, 0.0)],
        'N' => &[TL, BL, TR, BR, (0.0, 0.0, 0.6, 1.0)],
        'O' => &[T, TL, TR, BL, BR, B],
        'P' => &[T, TL, TR, M, BL],
        'Q' => &[T, TL, TR, BL, BR, B, (0.3, 0.6, 0.7, 1.05)],
        'R' => &[T, TL, TR, M, BL, (0.2, 0.5, 0.6, 1.0)],
        'S' => &[T, TL, M, BR, B],
        'T' => &[T, (0.3, 0.0, 0.3, 1.0)],
        'U' => &[TL, BL, B, BR, TR],
        'V' => &[(0.0, 0.0, 0.3, 1.0), (0.3, 1.0, 0.6, 0.0)],
        'W' => &[TL, BL, TR, BR, (0.0, 1.0, 0.3, 0.5), (0.3, 0.5, 0.6, 1.0)],
        'X' => &[(0.0, 0.0, 0.6, 1.0), (0.6, 0.0, 0.0, 1.0)],
        'Y' => &[(0.0, 0.0, 0.3, 0.5), (0.6, 0.0, 0.3, 0.5), (0.3, 0.5, 0.3, 1.0)],
        'Z' => &[T, (0.6, 0.0, 0.0, 1.0), B],
        '0' => &[T, TL, TR, BL, BR, B],
        '1' => &[TR, BR],
        '2' => &[T, TR, M, BL, B],
        '3' => &[T, TR, M, BR, B],
        '4' => &[TL, TR, M, BR],
        '5' => &[T, TL, M, BR, B],
        '6' => &[T, TL, M, BL, BR, B],
        '7' => &[T, TR, BR],
        '8' => &[T, TL, TR, M, BL, BR, B],
        '9' => &[T, TL, TR, M, BR, B],
        '-' => &[M],
        '+' => &[(0.1, 0.5, 0.5, 0.5), (0.3, 0.3, 0.3, 0.7)],
        ':' => &[(0.3, 0.25, 0.3, 0.35), (0.3, 0.65, 0.3, 0.75)],
        '.' => &[(0.3, 0.92, 0.3, 1.0)],
        '!' => &[(0.3, 0.0, 0.3, 0.7), (0.3, 0.92, 0.3, 1.0)],
        _ => &[],
    }
}

/// Logical width of `text` at the given glyph height.
pub fn text_width(text: &str, height: f32) -> f32 {
    if text.is_empty() {
        return 0.0;
    }
    (text.chars().count() as f32 * ADVANCE - (ADVANCE - 0.6)) * height
}

/// Draws `text` with its top-left corner at (x, y).
pub fn draw_text(
    out: &mut Vec<RenderObject>,
    text: &str,
    x: f32,
    y: f32,
    height: f32,
    color: [f32; 4],
    blend: BlendMode,
) {
    let thickness = (STROKE * height).max(1.0);
    let mut pen = x;
    for c in text.chars() {
        for &(x1, y1, x2, y2) in glyph(c.to_ascii_uppercase()) {
            out.push(gfx::line(
                pen + x1 * height,
                y + y1 * height,
                pen + x2 * height,
                y + y2 * height,
                thickness,
                color,
                blend,
            ));
        }
        pen += ADVANCE * height;
    }
}

/// Draws `text` horizontally centered on x.
pub fn draw_text_centered(
    out: &mut Vec<RenderObject>,
    text: &str,
    x: f32,
    y: f32,
    height: f32,
    color: [f32; 4],
    blend: BlendMode,
) {
    draw_text(
        out,
        text,
        x - 0.5 * text_width(text, height),
        y,
        height,
        color,
        blend,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_hud_character_has_strokes() {
        for c in "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-+:.!".chars() {
            assert!(!glyph(c).is_empty(), "no strokes for {:?}", c);
        }
    }

    #[test]
    fn unknown_characters_render_as_nothing() {
        assert!(glyph('~').is_empty());
        let mut out = Vec::new();
        draw_text(&mut out, "~ ~", 0.0, 0.0, 20.0, [1.0; 4], BlendMode::Alpha);
        assert!(out.is_empty());
    }

    #[test]
    fn lowercase_maps_to_uppercase() {
        let mut upper = Vec::new();
        let mut lower = Vec::new();
        draw_text(&mut upper, "GO", 0.0, 0.0, 20.0, [1.0; 4], BlendMode::Alpha);
        draw_text(&mut lower, "go", 0.0, 0.0, 20.0, [1.0; 4], BlendMode::Alpha);
        assert_eq!(upper.len(), lower.len());
    }

    #[test]
    fn width_scales_with_length_and_height() {
        assert!(text_width("SCORE", 20.0) > text_width("GO", 20.0));
        assert!((text_width("A", 10.0) - 6.0).abs() < 1e-4);
    }
}
