use crate::core::gfx::{self, BlendMode, RenderObject};
use crate::core::space::{screen_center_x, screen_center_y, screen_height, screen_width, HORIZON_LIFT};
use rand::Rng;
use std::f32::consts::TAU;

const STAR_COUNT: usize = 90;
const RAIN_COUNT: usize = 44;
const FAR_TOWERS: usize = 26;
const NEAR_TOWERS: usize = 15;

const FAR_PARALLAX: f32 = 4.0;
const NEAR_PARALLAX: f32 = 11.0;

const SKY_TOP: [f32; 4] = [0.03, 0.01, 0.08, 1.0];
const FAR_TOWER_COLOR: [f32; 4] = [0.10, 0.05, 0.22, 1.0];
const NEAR_TOWER_COLOR: [f32; 4] = [0.05, 0.02, 0.13, 1.0];
const GLOW_COLOR: [f32; 3] = [0.95, 0.25, 0.55];
const RAIN_COLOR: [f32; 3] = [0.35, 0.9, 0.85];

struct Star {
    x: f32,
    y: f32,
    size: f32,
    phase: f32,
}

struct RainDrop {
    x: f32,
    y: f32,
    speed: f32,
    len: f32,
}

struct Tower {
    x: f32,
    w: f32,
    h: f32,
}

/// Decorative backdrop: starfield, data-rain, skyline parallax, and a
/// camera-reactive horizon glow. Owned mutable buffers, updated in place on
/// the frame loop; never consulted by gameplay.
pub struct Atmosphere {
    stars: Vec<Star>,
    rain: Vec<RainDrop>,
    far: Vec<Tower>,
    near: Vec<Tower>,
    drift: f32,
    time: f32,
}

impl Atmosphere {
    pub fn new() -> Self {
        let mut atmosphere = Self {
            stars: Vec::new(),
            rain: Vec::new(),
            far: Vec::new(),
            near: Vec::new(),
            drift: 0.0,
            time: 0.0,
        };
        atmosphere.reseed();
        atmosphere
    }

    /// Regenerates all particle state for the current logical screen size.
    /// Called once at startup and again on every window resize.
    pub fn reseed(&mut self) {
        let (w, h) = (screen_width(), screen_height());
        let horizon = screen_center_y() + HORIZON_LIFT;
        let mut rng = rand::rng();

        self.stars = (0..STAR_COUNT)
            .map(|_| Star {
                x: rng.random_range(0.0..w),
                y: rng.random_range(0.0..horizon.max(1.0)),
                size: rng.random_range(0.8..2.2),
                phase: rng.random_range(0.0..TAU),
            })
            .collect();

        self.rain = (0..RAIN_COUNT)
            .map(|_| RainDrop {
                x: rng.random_range(0.0..w),
                y: rng.random_range(0.0..h),
                speed: rng.random_range(140.0..320.0),
                len: rng.random_range(10.0..26.0),
            })
            .collect();

        let tower_strip = |count: usize, max_h: f32, rng: &mut rand::rngs::ThreadRng| {
            let mut towers = Vec::with_capacity(count);
            let slot = w / count as f32;
            for i in 0..count {
                towers.push(Tower {
                    x: i as f32 * slot + rng.random_range(0.0..slot * 0.5),
                    w: rng.random_range(slot * 0.35..slot * 0.9),
                    h: rng.random_range(max_h * 0.25..max_h),
                });
            }
            towers
        };
        self.far = tower_strip(FAR_TOWERS, 70.0, &mut rng);
        self.near = tower_strip(NEAR_TOWERS, 110.0, &mut rng);
    }

    pub fn update(&mut self, dt: f32, intensity: f32) {
        let (w, h) = (screen_width(), screen_height());
        self.time += dt;
        self.drift += dt;
        for star in &mut self.stars {
            star.phase += dt * 2.0;
        }
        let rain_boost = 1.0 + intensity * 1.6;
        for drop in &mut self.rain {
            drop.y += drop.speed * rain_boost * dt;
            if drop.y - drop.len > h {
                drop.y = -drop.len;
                drop.x = (drop.x + 61.7).rem_euclid(w);
            }
        }
    }

    pub fn render(&self, out: &mut Vec<RenderObject>, intensity: f32) {
        let (w, h) = (screen_width(), screen_height());
        let horizon = screen_center_y() + HORIZON_LIFT;

        // Sky gradient, cheap two-band version.
        out.push(gfx::rect(0.0, 0.0, w, horizon, SKY_TOP, BlendMode::Alpha));

        for star in &self.stars {
            let twinkle = 0.25 + 0.75 * star.phase.sin().powi(2);
            out.push(gfx::quad(
                star.x,
                star.y,
                star.size,
                star.size,
                [0.85, 0.88, 1.0, twinkle * 0.8],
                BlendMode::Add,
            ));
        }

        // Horizon glow breathes with the music.
        let glow_alpha = 0.18 + 0.45 * intensity;
        out.push(gfx::quad(
            screen_center_x(),
            horizon,
            w,
            60.0 + 80.0 * intensity,
            [GLOW_COLOR[0], GLOW_COLOR[1], GLOW_COLOR[2], glow_alpha],
            BlendMode::Add,
        ));

        self.render_skyline(out, &self.far, FAR_PARALLAX, horizon, FAR_TOWER_COLOR);
        self.render_skyline(out, &self.near, NEAR_PARALLAX, horizon, NEAR_TOWER_COLOR);

        for drop in &self.rain {
            out.push(gfx::line(
                drop.x,
                drop.y - drop.len,
                drop.x,
                drop.y,
                1.0,
                [RAIN_COLOR[0], RAIN_COLOR[1], RAIN_COLOR[2], 0.25 + 0.3 * intensity],
                BlendMode::Add,
            ));
        }

        // Ground plane below the horizon.
        out.push(gfx::rect(
            0.0,
            horizon,
            w,
            h - horizon,
            [0.02, 0.01, 0.05, 1.0],
            BlendMode::Alpha,
        ));
    }

    fn render_skyline(
        &self,
        out: &mut Vec<RenderObject>,
        towers: &[Tower],
        parallax: f32,
        horizon: f32,
        color: [f32; 4],
    ) {
        let w = screen_width();
        let offset = (self.drift * parallax).rem_euclid(w);
        for tower in towers {
            let mut x = tower.x - offset;
            if x + tower.w < 0.0 {
                x += w;
            }
            out.push(gfx::rect(x, horizon - tower.h, tower.w, tower.h, color, BlendMode::Alpha));
        }
    }

    /// Cockpit-style overlay: corner brackets and a reticle that tighten with
    /// intensity. Drawn over the HUD, purely decorative.
    pub fn render_overlay(&self, out: &mut Vec<RenderObject>, intensity: f32) {
        let (w, h) = (screen_width(), screen_height());
        let alpha = 0.10 + 0.15 * intensity;
        let color = [0.4, 0.95, 0.9, alpha];
        let margin = 14.0;
        let arm = 26.0;
        for (cx, cy, sx, sy) in [
            (margin, margin, 1.0, 1.0),
            (w - margin, margin, -1.0, 1.0),
            (margin, h - margin, 1.0, -1.0),
            (w - margin, h - margin, -1.0, -1.0),
        ] {
            out.push(gfx::line(cx, cy, cx + arm * sx, cy, 2.0, color, BlendMode::Add));
            out.push(gfx::line(cx, cy, cx, cy + arm * sy, 2.0, color, BlendMode::Add));
        }

        let pulse = 1.0 + 0.15 * (self.time * 2.4).sin() * (0.3 + intensity);
        let r = 9.0 * pulse;
        let cx = screen_center_x();
        let cy = screen_center_y() + HORIZON_LIFT;
        out.push(gfx::line(cx - r, cy, cx - r * 0.4, cy, 1.5, color, BlendMode::Add));
        out.push(gfx::line(cx + r * 0.4, cy, cx + r, cy, 1.5, color, BlendMode::Add));
        out.push(gfx::line(cx, cy - r, cx, cy - r * 0.4, 1.5, color, BlendMode::Add));
        out.push(gfx::line(cx, cy + r * 0.4, cx, cy + r, 1.5, color, BlendMode::Add));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::space::{metrics_for_window, set_current_metrics};

    #[test]
    fn reseed_fills_all_particle_buffers() {
        set_current_metrics(metrics_for_window(1280, 720));
        let atmosphere = Atmosphere::new();
        assert_eq!(atmosphere.stars.len(), STAR_COUNT);
        assert_eq!(atmosphere.rain.len(), RAIN_COUNT);
        assert_eq!(atmosphere.far.len(), FAR_TOWERS);
        assert_eq!(atmosphere.near.len(), NEAR_TOWERS);
    }

    #[test]
    fn rain_wraps_inside_the_screen() {
        set_current_metrics(metrics_for_window(854, 480));
        let mut atmosphere = Atmosphere::new();
        for _ in 0..600 {
            atmosphere.update(1.0 / 60.0, 1.0);
        }
        let h = screen_height();
        for drop in &atmosphere.rain {
            assert!(drop.y - drop.len <= h + 1.0);
        }
    }

    #[test]
    fn stars_stay_above_the_horizon() {
        set_current_metrics(metrics_for_window(854, 480));
        let atmosphere = Atmosphere::new();
        let horizon = screen_center_y() + HORIZON_LIFT;
        for star in &atmosphere.stars {
            assert!(star.y <= horizon);
        }
    }
}
