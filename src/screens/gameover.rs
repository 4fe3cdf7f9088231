use crate::core::audio::Sequencer;
use crate::core::gfx::{BlendMode, RenderObject};
use crate::core::space::{screen_center_x, screen_center_y};
use crate::screens::{Screen, ScreenAction};
use crate::ui::font;
use log::warn;
use winit::event::{ElementState, KeyEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

pub struct State {
    pub score: u64,
    pub best_combo: u32,
    pulse: f32,
    restart_requested: bool,
    notice: Option<&'static str>,
}

pub fn init(score: u64, best_combo: u32) -> State {
    State {
        score,
        best_combo,
        pulse: 0.0,
        restart_requested: false,
        notice: None,
    }
}

pub fn handle_key_press(state: &mut State, event: &KeyEvent) -> ScreenAction {
    if event.state != ElementState::Pressed {
        return ScreenAction::None;
    }
    match event.physical_key {
        PhysicalKey::Code(KeyCode::Enter) | PhysicalKey::Code(KeyCode::Space) => {
            state.restart_requested = true;
            state.notice = None;
            ScreenAction::None
        }
        PhysicalKey::Code(KeyCode::Escape) => ScreenAction::Navigate(Screen::Menu),
        _ => ScreenAction::None,
    }
}

pub fn update(state: &mut State, seq: &mut Sequencer, dt: f32) -> ScreenAction {
    state.pulse += dt;
    if state.restart_requested {
        // Same rule as the menu: no gameplay until the clock is running.
        seq.start();
        if seq.is_running() {
            state.restart_requested = false;
            return ScreenAction::Navigate(Screen::Gameplay);
        }
        warn!("Audio did not restart; staying on game-over screen.");
        state.restart_requested = false;
        state.notice = Some("AUDIO UNAVAILABLE - PRESS ENTER TO RETRY");
    }
    ScreenAction::None
}

pub fn render(state: &State, out: &mut Vec<RenderObject>) {
    let cx = screen_center_x();
    let cy = screen_center_y();

    font::draw_text_centered(out, "GAME OVER", cx, cy - 120.0, 40.0, [1.0, 0.25, 0.45, 1.0], BlendMode::Add);

    font::draw_text_centered(
        out,
        &format!("FINAL SCORE {}", state.score),
        cx,
        cy - 30.0,
        20.0,
        [0.85, 0.95, 1.0, 1.0],
        BlendMode::Alpha,
    );
    font::draw_text_centered(
        out,
        &format!("BEST COMBO X{}", state.best_combo),
        cx,
        cy + 6.0,
        14.0,
        [1.0, 0.85, 0.25, 0.9],
        BlendMode::Alpha,
    );

    let blink = 0.45 + 0.55 * (state.pulse * 2.2).sin().powi(2);
    font::draw_text_centered(
        out,
        "PRESS ENTER TO RESTART",
        cx,
        cy + 70.0,
        14.0,
        [0.9, 0.9, 1.0, blink],
        BlendMode::Alpha,
    );
    font::draw_text_centered(
        out,
        "ESC FOR MENU",
        cx,
        cy + 98.0,
        10.0,
        [0.6, 0.6, 0.7, 0.7],
        BlendMode::Alpha,
    );

    if let Some(notice) = state.notice {
        font::draw_text_centered(out, notice, cx, cy + 130.0, 11.0, [1.0, 0.35, 0.35, 1.0], BlendMode::Alpha);
    }
}
