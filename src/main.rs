use log::{error, info, LevelFilter};
use std::error::Error;

mod app;
mod config;
mod core;
mod game;
mod screens;
mod ui;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(LevelFilter::Info)
        .filter_module("gridlock::core::gfx", LevelFilter::Warn)
        .filter_module("gridlock::core::audio", LevelFilter::Info)
        .filter_module("gridlock::screens", LevelFilter::Debug)
        .init();

    info!("GRIDLOCK starting...");

    if let Err(e) = app::run() {
        error!("Application exited with error: {}", e);
        return Err(e);
    }

    info!("Application exited gracefully.");
    Ok(())
}
