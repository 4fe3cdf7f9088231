use crate::config;
use crate::core::audio::Sequencer;
use crate::core::gfx::{self, BlendMode, RenderList, RenderObject};
use crate::core::space;
use crate::game::atmosphere::Atmosphere;
use crate::screens::{gameover, gameplay, menu, Screen, ScreenAction};
use log::{error, info};
use std::{error::Error, sync::Arc, time::Instant};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window},
};

const MAX_DELTA_TIME: f32 = 0.1;
const FADE_DURATION: f32 = 0.35;
const CLEAR_COLOR: [f32; 4] = [0.015, 0.005, 0.04, 1.0];

/* -------------------- transition state machine -------------------- */
enum Transition {
    Idle,
    FadingOut { elapsed: f32, target: Screen },
    FadingIn { elapsed: f32 },
}

pub struct App {
    window: Option<Arc<Window>>,
    backend: Option<gfx::Backend>,
    seq: Sequencer,
    atmosphere: Atmosphere,
    current_screen: Screen,
    menu_state: menu::State,
    gameplay_state: Option<gameplay::State>,
    gameover_state: Option<gameover::State>,
    transition: Transition,
    last_frame_time: Option<Instant>,
    frame_count: u32,
    last_title_update: Instant,
    last_fps: f32,
    show_fps: bool,
    vsync: bool,
    fullscreen: bool,
    display_size: (u32, u32),
}

impl App {
    fn new(config: &config::Config) -> Self {
        Self {
            window: None,
            backend: None,
            seq: Sequencer::new(config.master_volume),
            atmosphere: Atmosphere::new(),
            current_screen: Screen::Menu,
            menu_state: menu::init(),
            gameplay_state: None,
            gameover_state: None,
            transition: Transition::Idle,
            last_frame_time: None,
            frame_count: 0,
            last_title_update: Instant::now(),
            last_fps: 0.0,
            show_fps: config.show_fps,
            vsync: config.vsync,
            fullscreen: !config.windowed,
            display_size: (config.display_width, config.display_height),
        }
    }

    fn init_graphics(&mut self, event_loop: &ActiveEventLoop) -> Result<(), Box<dyn Error>> {
        let mut window_attributes = Window::default_attributes()
            .with_title("GRIDLOCK")
            .with_resizable(true);

        if self.fullscreen {
            window_attributes =
                window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        } else {
            window_attributes = window_attributes
                .with_inner_size(PhysicalSize::new(self.display_size.0, self.display_size.1));
        }

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let backend = gfx::init(window.clone(), self.vsync)?;
        // gfx::init published the logical metrics; seed the backdrop for them.
        self.atmosphere.reseed();

        self.window = Some(window);
        self.backend = Some(backend);
        info!("Starting event loop...");
        Ok(())
    }

    fn handle_action(&mut self, action: ScreenAction, event_loop: &ActiveEventLoop) {
        match action {
            ScreenAction::Navigate(target) => {
                if matches!(self.transition, Transition::Idle) {
                    info!("Fading out to {:?}.", target);
                    self.transition = Transition::FadingOut {
                        elapsed: 0.0,
                        target,
                    };
                }
            }
            ScreenAction::Exit => {
                info!("Exit action received. Shutting down.");
                event_loop.exit();
            }
            ScreenAction::None => {}
        }
    }

    fn switch_to(&mut self, target: Screen) {
        match target {
            Screen::Menu => {
                self.seq.stop();
                self.gameplay_state = None;
                self.menu_state = menu::init();
            }
            Screen::Gameplay => {
                // The sequencer was confirmed running by whichever screen
                // requested the navigation.
                self.gameplay_state = Some(gameplay::init());
            }
            Screen::GameOver => {
                let finished = self.gameplay_state.take();
                self.seq.stop();
                let (score, best_combo) = finished
                    .map(|gs| (gs.run.score, gs.run.best_combo))
                    .unwrap_or((0, 0));
                self.gameover_state = Some(gameover::init(score, best_combo));
            }
        }
        self.current_screen = target;
    }

    fn current_intensity(&self) -> f32 {
        match self.current_screen {
            Screen::Gameplay => self
                .gameplay_state
                .as_ref()
                .map(gameplay::intensity)
                .unwrap_or(0.3),
            Screen::Menu => 0.4,
            Screen::GameOver => 0.25,
        }
    }

    fn frame(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        // The very first frame has no delta and performs no integration.
        let dt = match self.last_frame_time {
            Some(prev) => now.duration_since(prev).as_secs_f32().min(MAX_DELTA_TIME),
            None => 0.0,
        };
        self.last_frame_time = Some(now);

        let mut switch_target = None;
        match &mut self.transition {
            Transition::FadingOut { elapsed, target } => {
                *elapsed += dt;
                if *elapsed >= FADE_DURATION {
                    switch_target = Some(*target);
                }
            }
            Transition::FadingIn { elapsed } => {
                *elapsed += dt;
                if *elapsed >= FADE_DURATION {
                    self.transition = Transition::Idle;
                }
            }
            Transition::Idle => {
                let action = match self.current_screen {
                    Screen::Menu => menu::update(&mut self.menu_state, &mut self.seq, dt),
                    Screen::Gameplay => match &mut self.gameplay_state {
                        Some(gs) => gameplay::update(gs, &mut self.seq, dt),
                        None => ScreenAction::None,
                    },
                    Screen::GameOver => match &mut self.gameover_state {
                        Some(gs) => gameover::update(gs, &mut self.seq, dt),
                        None => ScreenAction::None,
                    },
                };
                self.handle_action(action, event_loop);
            }
        }
        if let Some(target) = switch_target {
            self.switch_to(target);
            self.transition = Transition::FadingIn { elapsed: 0.0 };
        }

        let intensity = self.current_intensity();
        self.atmosphere.update(dt, intensity);

        let mut objects: Vec<RenderObject> = Vec::with_capacity(512);
        self.atmosphere.render(&mut objects, intensity);
        match self.current_screen {
            Screen::Menu => menu::render(&self.menu_state, &mut objects),
            Screen::Gameplay => {
                if let Some(gs) = &self.gameplay_state {
                    gameplay::render(gs, &mut objects);
                }
            }
            Screen::GameOver => {
                if let Some(gs) = &self.gameover_state {
                    gameover::render(gs, &mut objects);
                }
            }
        }
        self.atmosphere.render_overlay(&mut objects, intensity);

        let fade_alpha = match &self.transition {
            Transition::FadingOut { elapsed, .. } => (elapsed / FADE_DURATION).clamp(0.0, 1.0),
            Transition::FadingIn { elapsed } => 1.0 - (elapsed / FADE_DURATION).clamp(0.0, 1.0),
            Transition::Idle => 0.0,
        };
        if fade_alpha > 0.0 {
            objects.push(gfx::rect(
                0.0,
                0.0,
                space::screen_width(),
                space::screen_height(),
                [0.0, 0.0, 0.0, fade_alpha],
                BlendMode::Alpha,
            ));
        }

        let list = RenderList {
            clear_color: CLEAR_COLOR,
            objects,
        };
        if let Some(backend) = &mut self.backend {
            if let Err(e) = gfx::draw(backend, &list) {
                error!("Failed to draw frame: {}", e);
                event_loop.exit();
                return;
            }
        }
        self.update_fps_title(now);
    }

    fn update_fps_title(&mut self, now: Instant) {
        self.frame_count += 1;
        let elapsed = now.duration_since(self.last_title_update).as_secs_f32();
        if elapsed >= 1.0 {
            self.last_fps = self.frame_count as f32 / elapsed;
            self.frame_count = 0;
            self.last_title_update = now;
            if let Some(window) = &self.window {
                if self.show_fps {
                    window.set_title(&format!(
                        "GRIDLOCK - {:?} | {:.1} FPS",
                        self.current_screen, self.last_fps
                    ));
                } else {
                    window.set_title("GRIDLOCK");
                }
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init_graphics(event_loop) {
                error!("Failed to initialize graphics: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref().cloned() else { return };
        if window_id != window.id() {
            return;
        }
        let is_transitioning = !matches!(self.transition, Transition::Idle);

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested. Shutting down.");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if new_size.width > 0 && new_size.height > 0 {
                    if let Some(backend) = &mut self.backend {
                        gfx::resize(backend, new_size.width, new_size.height);
                    }
                    // Decorative state is sized for the logical screen;
                    // regenerate it for the new metrics.
                    self.atmosphere.reseed();
                }
            }
            WindowEvent::KeyboardInput { event: key_event, .. } => {
                if is_transitioning {
                    return;
                }
                let action = match self.current_screen {
                    Screen::Menu => menu::handle_key_press(&mut self.menu_state, &key_event),
                    Screen::Gameplay => match &mut self.gameplay_state {
                        Some(gs) => gameplay::handle_key_press(gs, &key_event),
                        None => ScreenAction::None,
                    },
                    Screen::GameOver => match &mut self.gameover_state {
                        Some(gs) => gameover::handle_key_press(gs, &key_event),
                        None => ScreenAction::None,
                    },
                };
                self.handle_action(action, event_loop);
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => {
                if !is_transitioning && self.current_screen == Screen::Gameplay {
                    if let Some(gs) = &mut self.gameplay_state {
                        gameplay::handle_click(gs);
                    }
                }
            }
            WindowEvent::RedrawRequested => self.frame(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.seq.stop();
        if let Some(backend) = &mut self.backend {
            gfx::cleanup(backend);
        }
    }
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let config = config::get();
    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}
