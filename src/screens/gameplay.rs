use crate::core::audio::{seconds_per_beat, Sequencer, VIZ_BINS};
use crate::core::gfx::{self, BlendMode, RenderObject};
use crate::core::space::{self, screen_center_x, screen_width};
use crate::game::judge;
use crate::game::score::RunState;
use crate::game::world::{World, BUILDING_HALF_WIDTH, JUDGMENT_Z, LANES, MAX_BUILDING_HEIGHT};
use crate::screens::{Screen, ScreenAction};
use crate::ui::font;
use log::{debug, info};
use rand::Rng;
use winit::event::{ElementState, KeyEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

// Visual pacing
const BEAT_PULSE_DECAY: f32 = 2.6;
const SHAKE_DECAY: f32 = 7.0;
const BASS_SMOOTHING: f32 = 10.0;
const GRID_ROW_SPACING: f32 = 200.0;
const GRID_DRAW_DEPTH: f32 = 3600.0;

// Intensity opens the master filter as the combo builds.
const INTENSITY_FLOOR: f32 = 0.35;
const INTENSITY_PER_COMBO: f32 = 0.04;

const GRID_COLOR: [f32; 3] = [0.85, 0.25, 0.75];
const BUILDING_EDGE: [f32; 4] = [0.95, 0.4, 0.9, 0.9];
const BUILDING_FILL: [f32; 4] = [0.12, 0.04, 0.2, 0.85];
const MISSED_FILL: [f32; 4] = [0.25, 0.05, 0.1, 0.8];
const HUD_COLOR: [f32; 4] = [0.85, 0.95, 1.0, 0.95];

pub struct State {
    pub world: World,
    pub run: RunState,
    viz: [u8; VIZ_BINS],
    bass: f32,
    intensity: f32,
    shake: f32,
    beat_pulse: f32,
    grid_scroll: f32,
    pending_inputs: u32,
}

pub fn init() -> State {
    info!("Gameplay session started.");
    State {
        world: World::new(),
        run: RunState::new(),
        viz: [0; VIZ_BINS],
        bass: 0.0,
        intensity: INTENSITY_FLOOR,
        shake: 0.0,
        beat_pulse: 0.0,
        grid_scroll: 0.0,
        pending_inputs: 0,
    }
}

pub fn intensity(state: &State) -> f32 {
    state.intensity
}

pub fn handle_key_press(state: &mut State, event: &KeyEvent) -> ScreenAction {
    if event.state != ElementState::Pressed || event.repeat {
        return ScreenAction::None;
    }
    match event.physical_key {
        PhysicalKey::Code(KeyCode::Space) | PhysicalKey::Code(KeyCode::Enter) => {
            state.pending_inputs += 1;
            ScreenAction::None
        }
        PhysicalKey::Code(KeyCode::Escape) => {
            debug!("Leaving gameplay for the menu.");
            ScreenAction::Navigate(Screen::Menu)
        }
        _ => ScreenAction::None,
    }
}

/// Pointer clicks are lock attempts, same as the fixed keys.
pub fn handle_click(state: &mut State) {
    state.pending_inputs += 1;
}

pub fn update(state: &mut State, seq: &mut Sequencer, dt: f32) -> ScreenAction {
    for _beat in seq.drain_beats() {
        state.beat_pulse = 1.0;
    }
    state.beat_pulse = (state.beat_pulse - dt * BEAT_PULSE_DECAY).max(0.0);

    // Cosmetic energy from the frequency snapshot; judgment never reads it.
    seq.visualization_data(&mut state.viz);
    let bass_raw =
        state.viz[..8].iter().map(|&b| b as f32).sum::<f32>() / (8.0 * 255.0);
    state.bass += (bass_raw - state.bass) * (dt * BASS_SMOOTHING).min(1.0);

    state.intensity =
        (INTENSITY_FLOOR + state.run.combo as f32 * INTENSITY_PER_COMBO).min(1.0);
    seq.set_intensity(state.intensity);

    let spb = seconds_per_beat(seq.bpm());
    let now = seq.current_time();
    for _ in 0..std::mem::take(&mut state.pending_inputs) {
        if let Some(result) = judge::judge_input(&mut state.world, now, spb) {
            let awarded = state.run.apply_judgment(&result);
            state.shake += result.grade.shake_impulse();
            debug!(
                "Judged {:?} (+{} pts, combo {}, health {}).",
                result.grade, awarded, state.run.combo, state.run.health
            );
        }
    }

    let speed = World::scroll_speed(seq.bpm(), state.bass, seq.is_running());
    let passive_misses = state.world.advance(dt, speed);
    for _ in 0..passive_misses {
        state.run.apply_passive_miss();
    }
    state.grid_scroll = (state.grid_scroll + speed * dt).rem_euclid(GRID_ROW_SPACING);
    state.shake *= (-dt * SHAKE_DECAY).exp();

    if state.run.is_dead() {
        info!(
            "Run over: score {}, best combo {}.",
            state.run.score, state.run.best_combo
        );
        return ScreenAction::Navigate(Screen::GameOver);
    }
    ScreenAction::None
}

pub fn render(state: &State, out: &mut Vec<RenderObject>) {
    let mut rng = rand::rng();
    let (shake_x, shake_y) = if state.shake > 0.05 {
        (
            rng.random_range(-state.shake..state.shake),
            rng.random_range(-state.shake..state.shake),
        )
    } else {
        (0.0, 0.0)
    };
    let project = |x: f32, y: f32, depth: f32| {
        space::project(x, y, depth).map(|(sx, sy)| (sx + shake_x, sy + shake_y))
    };

    render_grid(state, out, &project);
    render_judgment_line(state, out, &project);
    render_buildings(state, out, &project);
    render_tokens(state, out);
    render_hud(state, out);
}

fn render_grid(
    state: &State,
    out: &mut Vec<RenderObject>,
    project: &dyn Fn(f32, f32, f32) -> Option<(f32, f32)>,
) {
    let half_span = LANES[LANES.len() - 1] + BUILDING_HALF_WIDTH * 2.0;
    let alpha = 0.18 + 0.15 * state.beat_pulse;
    let color = [GRID_COLOR[0], GRID_COLOR[1], GRID_COLOR[2], alpha];

    // Longitudinal rails between lanes.
    for k in 0..=LANES.len() {
        let x = -half_span + k as f32 * (2.0 * half_span / LANES.len() as f32);
        if let (Some(near), Some(far)) = (project(x, 0.0, 40.0), project(x, 0.0, GRID_DRAW_DEPTH)) {
            out.push(gfx::line(near.0, near.1, far.0, far.1, 1.0, color, BlendMode::Add));
        }
    }

    // Lateral rows scroll toward the camera with the world.
    let mut depth = GRID_ROW_SPACING - state.grid_scroll;
    while depth < GRID_DRAW_DEPTH {
        if let (Some(l), Some(r)) = (
            project(-half_span, 0.0, depth),
            project(half_span, 0.0, depth),
        ) {
            out.push(gfx::line(l.0, l.1, r.0, r.1, 1.0, color, BlendMode::Add));
        }
        depth += GRID_ROW_SPACING;
    }
}

fn render_judgment_line(
    state: &State,
    out: &mut Vec<RenderObject>,
    project: &dyn Fn(f32, f32, f32) -> Option<(f32, f32)>,
) {
    let half_span = LANES[LANES.len() - 1] + BUILDING_HALF_WIDTH * 2.0;
    let Some(left) = project(-half_span, 0.0, JUDGMENT_Z) else { return };
    let Some(right) = project(half_span, 0.0, JUDGMENT_Z) else { return };
    let pulse = 0.55 + 0.45 * state.beat_pulse;
    out.push(gfx::line(
        left.0,
        left.1,
        right.0,
        right.1,
        3.0 + 3.0 * state.beat_pulse,
        [0.3, 1.0, 0.9, pulse],
        BlendMode::Add,
    ));
}

fn render_buildings(
    state: &State,
    out: &mut Vec<RenderObject>,
    project: &dyn Fn(f32, f32, f32) -> Option<(f32, f32)>,
) {
    // Back-to-front so nearer buildings occlude.
    let mut order: Vec<usize> = (0..state.world.targets.len()).collect();
    order.sort_by(|&a, &b| {
        state.world.targets[b]
            .depth
            .partial_cmp(&state.world.targets[a].depth)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for index in order {
        let target = &state.world.targets[index];
        let Some(scale) = space::scale_at(target.depth) else { continue };
        let Some((_, base_y)) = project(target.lane, 0.0, target.depth) else { continue };
        let Some((cx, top_y)) =
            project(target.lane, target.height * MAX_BUILDING_HEIGHT, target.depth)
        else {
            continue;
        };

        let w = BUILDING_HALF_WIDTH * 2.0 * scale;
        let h = (base_y - top_y).max(1.0);
        let (fill, edge) = match target.quality {
            Some(grade) => {
                let c = grade.color();
                ([c[0] * 0.35, c[1] * 0.35, c[2] * 0.35, 0.9], c)
            }
            None if target.missed => (MISSED_FILL, [0.6, 0.15, 0.25, 0.7]),
            None => (BUILDING_FILL, BUILDING_EDGE),
        };

        out.push(gfx::quad(cx, top_y + 0.5 * h, w, h, fill, BlendMode::Alpha));
        // Neon outline.
        let t = (1.5 * scale).clamp(1.0, 3.0);
        out.push(gfx::line(cx - 0.5 * w, top_y, cx + 0.5 * w, top_y, t, edge, BlendMode::Add));
        out.push(gfx::line(cx - 0.5 * w, top_y, cx - 0.5 * w, base_y, t, edge, BlendMode::Add));
        out.push(gfx::line(cx + 0.5 * w, top_y, cx + 0.5 * w, base_y, t, edge, BlendMode::Add));

        if target.locked {
            // Roof beacon on locked buildings.
            out.push(gfx::quad(
                cx,
                top_y - 4.0,
                w * 0.35,
                3.0,
                [edge[0], edge[1], edge[2], 0.8],
                BlendMode::Add,
            ));
        }
    }
}

fn render_tokens(state: &State, out: &mut Vec<RenderObject>) {
    for token in &state.world.tokens {
        let mut color = token.color;
        color[3] = token.alpha;
        font::draw_text_centered(out, token.text, token.x, token.y, 16.0, color, BlendMode::Add);
    }
}

fn render_hud(state: &State, out: &mut Vec<RenderObject>) {
    let w = screen_width();

    font::draw_text(out, "SCORE", 18.0, 16.0, 10.0, [0.6, 0.7, 0.8, 0.9], BlendMode::Alpha);
    font::draw_text(
        out,
        &state.run.score.to_string(),
        18.0,
        30.0,
        18.0,
        HUD_COLOR,
        BlendMode::Alpha,
    );

    let combo_text = format!("COMBO X{}", state.run.combo);
    font::draw_text(
        out,
        &combo_text,
        w - font::text_width(&combo_text, 14.0) - 18.0,
        16.0,
        14.0,
        if state.run.combo >= 5 {
            [1.0, 0.85, 0.25, 1.0]
        } else {
            HUD_COLOR
        },
        BlendMode::Alpha,
    );

    // Health meter.
    let bar_w = 170.0;
    let bar_x = screen_center_x() - 0.5 * bar_w;
    let filled = bar_w * state.run.health as f32 / 100.0;
    out.push(gfx::rect(bar_x, 18.0, bar_w, 10.0, [0.1, 0.1, 0.15, 0.8], BlendMode::Alpha));
    let health_color = if state.run.health > 30 {
        [0.3, 1.0, 0.6, 0.9]
    } else {
        [1.0, 0.3, 0.35, 0.9]
    };
    out.push(gfx::rect(bar_x, 18.0, filled, 10.0, health_color, BlendMode::Alpha));

    // Spectrum ribbon along the bottom edge, straight from the analyser.
    let bin_w = w / state.viz.len() as f32;
    for (i, &magnitude) in state.viz.iter().enumerate() {
        let bar = magnitude as f32 / 255.0 * 26.0;
        if bar >= 1.0 {
            out.push(gfx::rect(
                i as f32 * bin_w,
                space::screen_height() - bar,
                bin_w * 0.7,
                bar,
                [0.5, 0.3, 0.9, 0.35],
                BlendMode::Add,
            ));
        }
    }
}
