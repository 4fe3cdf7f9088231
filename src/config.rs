use configparser::ini::Ini;
use log::{info, warn};
use once_cell::sync::Lazy;

const CONFIG_PATH: &str = "gridlock.ini";

#[derive(Debug, Clone)]
pub struct Config {
    pub display_width: u32,
    pub display_height: u32,
    pub vsync: bool,
    pub windowed: bool,
    pub master_volume: f32,
    pub show_fps: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display_width: 1280,
            display_height: 720,
            vsync: true,
            windowed: true,
            master_volume: 0.8,
            show_fps: true,
        }
    }
}

static CONFIG: Lazy<Config> = Lazy::new(load);

/// Returns the process-wide configuration, read once from `gridlock.ini`.
/// A missing or partial file falls back to defaults key by key.
pub fn get() -> &'static Config {
    &CONFIG
}

fn load() -> Config {
    let mut defaults = Config::default();
    let mut ini = Ini::new();
    match ini.load(CONFIG_PATH) {
        Ok(_) => {
            info!("Loaded configuration from {}", CONFIG_PATH);
            apply(&mut defaults, &ini);
        }
        Err(_) => {
            info!("No {} found, using default configuration.", CONFIG_PATH);
        }
    }
    defaults
}

fn apply(config: &mut Config, ini: &Ini) {
    if let Ok(Some(w)) = ini.getuint("display", "width") {
        if w >= 320 {
            config.display_width = w as u32;
        } else {
            warn!("Ignoring display width {} (too small).", w);
        }
    }
    if let Ok(Some(h)) = ini.getuint("display", "height") {
        if h >= 240 {
            config.display_height = h as u32;
        } else {
            warn!("Ignoring display height {} (too small).", h);
        }
    }
    if let Ok(Some(v)) = ini.getbool("display", "vsync") {
        config.vsync = v;
    }
    if let Ok(Some(v)) = ini.getbool("display", "windowed") {
        config.windowed = v;
    }
    if let Ok(Some(v)) = ini.getbool("display", "show_fps") {
        config.show_fps = v;
    }
    if let Ok(Some(v)) = ini.getfloat("audio", "master_volume") {
        config.master_volume = (v as f32).clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = Config::default();
        assert!(c.display_width >= 320 && c.display_height >= 240);
        assert!((0.0..=1.0).contains(&c.master_volume));
    }

    #[test]
    fn partial_ini_keeps_defaults_for_missing_keys() {
        let mut ini = Ini::new();
        ini.read("[display]\nvsync = false\n".to_string()).unwrap();
        let mut c = Config::default();
        apply(&mut c, &ini);
        assert!(!c.vsync);
        assert_eq!(c.display_width, Config::default().display_width);
        assert_eq!(c.master_volume, Config::default().master_volume);
    }

    #[test]
    fn volume_is_clamped() {
        let mut ini = Ini::new();
        ini.read("[audio]\nmaster_volume = 3.5\n".to_string())
            .unwrap();
        let mut c = Config::default();
        apply(&mut c, &ini);
        assert_eq!(c.master_volume, 1.0);
    }
}
