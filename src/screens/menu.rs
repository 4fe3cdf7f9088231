use crate::core::audio::Sequencer;
use crate::core::gfx::{BlendMode, RenderObject};
use crate::core::space::{screen_center_x, screen_center_y, screen_height};
use crate::screens::{Screen, ScreenAction};
use crate::ui::font;
use log::{debug, warn};
use winit::event::{ElementState, KeyEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

const TITLE_COLOR: [f32; 4] = [1.0, 0.35, 0.75, 1.0];
const SUBTITLE_COLOR: [f32; 4] = [0.45, 0.9, 0.95, 0.9];
const PROMPT_COLOR: [f32; 3] = [0.9, 0.9, 1.0];
const NOTICE_COLOR: [f32; 4] = [1.0, 0.35, 0.35, 1.0];

pub struct State {
    pulse: f32,
    start_requested: bool,
    notice: Option<&'static str>,
}

pub fn init() -> State {
    State {
        pulse: 0.0,
        start_requested: false,
        notice: None,
    }
}

pub fn handle_key_press(state: &mut State, event: &KeyEvent) -> ScreenAction {
    if event.state != ElementState::Pressed {
        return ScreenAction::None;
    }
    match event.physical_key {
        PhysicalKey::Code(KeyCode::Enter) | PhysicalKey::Code(KeyCode::Space) => {
            debug!("Start requested from menu.");
            state.start_requested = true;
            state.notice = None;
            ScreenAction::None
        }
        PhysicalKey::Code(KeyCode::Escape) => ScreenAction::Exit,
        _ => ScreenAction::None,
    }
}

pub fn update(state: &mut State, seq: &mut Sequencer, dt: f32) -> ScreenAction {
    state.pulse += dt;
    if state.start_requested {
        // Gameplay may only begin once the device is confirmed running, so
        // keep polling instead of assuming the start took.
        seq.start();
        if seq.is_running() {
            state.start_requested = false;
            return ScreenAction::Navigate(Screen::Gameplay);
        }
        warn!("Audio did not start; staying on menu.");
        state.start_requested = false;
        state.notice = Some("AUDIO UNAVAILABLE - PRESS ENTER TO RETRY");
    }
    ScreenAction::None
}

pub fn render(state: &State, out: &mut Vec<RenderObject>) {
    let cx = screen_center_x();
    let h = screen_height();

    font::draw_text_centered(out, "GRIDLOCK", cx, h * 0.24, 52.0, TITLE_COLOR, BlendMode::Add);
    font::draw_text_centered(
        out,
        "LOCK THE SKYLINE TO THE BEAT",
        cx,
        h * 0.24 + 66.0,
        13.0,
        SUBTITLE_COLOR,
        BlendMode::Alpha,
    );

    let blink = 0.45 + 0.55 * (state.pulse * 2.2).sin().powi(2);
    font::draw_text_centered(
        out,
        "PRESS ENTER",
        cx,
        screen_center_y() + 70.0,
        20.0,
        [PROMPT_COLOR[0], PROMPT_COLOR[1], PROMPT_COLOR[2], blink],
        BlendMode::Alpha,
    );

    if let Some(notice) = state.notice {
        font::draw_text_centered(out, notice, cx, screen_center_y() + 110.0, 11.0, NOTICE_COLOR, BlendMode::Alpha);
    }

    font::draw_text_centered(
        out,
        "ESC TO QUIT",
        cx,
        h - 30.0,
        10.0,
        [0.6, 0.6, 0.7, 0.7],
        BlendMode::Alpha,
    );
}
