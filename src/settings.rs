// ============================================================================
// SETTINGS - persisted render defaults (key=value file)
// ============================================================================

use std::path::{Path, PathBuf};

use crate::error::CardError;
use crate::ops::overlay::PAPER_COLOR;
use crate::params::{EffectParameters, PolaroidMode};

/// Defaults applied to every card the CLI or preview builds.
/// Command-line flags override whatever is loaded here.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderSettings {
    pub gpu_acceleration: bool,
    /// "high performance" / "low power"; anything else picks the fast adapter.
    pub preferred_gpu: String,
    pub max_pixel_ratio: f32,
    pub paper_color: [u8; 4],
    pub hald_size: u32,
    pub mode: PolaroidMode,
    pub css_width: f32,
    pub effects: EffectParameters,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            gpu_acceleration: true,
            preferred_gpu: String::new(),
            max_pixel_ratio: crate::canvas::MAX_PIXEL_RATIO,
            paper_color: PAPER_COLOR,
            hald_size: 16,
            mode: PolaroidMode::Classic,
            css_width: 560.0,
            effects: EffectParameters::default(),
        }
    }
}

impl RenderSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/polaroidfx/polaroidfx_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\PolaroidFX\polaroidfx_settings.cfg
    /// On macOS:   ~/Library/Application Support/PolaroidFX/polaroidfx_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("polaroidfx");
            return Some(config_dir.join("polaroidfx_settings.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            return Some(PathBuf::from(appdata).join("PolaroidFX").join("polaroidfx_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("PolaroidFX")
                    .join("polaroidfx_settings.cfg"),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join("polaroidfx_settings.cfg")))
        }
    }

    /// Serialize a colour as "r,g,b,a"
    fn color_to_str(c: [u8; 4]) -> String {
        format!("{},{},{},{}", c[0], c[1], c[2], c[3])
    }

    /// Parse "r,g,b,a" or "#rrggbb"
    fn str_to_color(s: &str) -> Option<[u8; 4]> {
        if let Some(hex) = s.strip_prefix('#') {
            if hex.len() != 6 {
                return None;
            }
            let v = u32::from_str_radix(hex, 16).ok()?;
            return Some([(v >> 16) as u8, (v >> 8) as u8, v as u8, 255]);
        }
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() == 4 {
            let r = parts[0].trim().parse::<u8>().ok()?;
            let g = parts[1].trim().parse::<u8>().ok()?;
            let b = parts[2].trim().parse::<u8>().ok()?;
            let a = parts[3].trim().parse::<u8>().ok()?;
            Some([r, g, b, a])
        } else {
            None
        }
    }

    pub fn to_config_string(&self) -> String {
        let e = &self.effects;
        format!(
            "gpu_acceleration={}\n\
             preferred_gpu={}\n\
             max_pixel_ratio={}\n\
             paper_color={}\n\
             hald_size={}\n\
             mode={}\n\
             css_width={}\n\
             lut_strength={}\n\
             vignette={}\n\
             grain={}\n\
             gloss={}\n\
             spec_power={}\n\
             fresnel={}\n\
             roll={}\n\
             streak={}\n",
            self.gpu_acceleration,
            self.preferred_gpu,
            self.max_pixel_ratio,
            Self::color_to_str(self.paper_color),
            self.hald_size,
            self.mode.as_str(),
            self.css_width,
            e.lut_strength,
            e.vignette,
            e.grain,
            e.gloss,
            e.spec_power,
            e.fresnel,
            e.roll,
            e.streak,
        )
    }

    /// Parse settings text. Unknown keys and malformed values are skipped,
    /// leaving the default in place.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            let f = |cur: f32| val.parse::<f32>().ok().filter(|v| v.is_finite()).unwrap_or(cur);
            match key {
                "gpu_acceleration" => s.gpu_acceleration = val == "true",
                "preferred_gpu" => s.preferred_gpu = val.to_string(),
                "max_pixel_ratio" => {
                    s.max_pixel_ratio = f(s.max_pixel_ratio).clamp(0.25, crate::canvas::MAX_PIXEL_RATIO);
                }
                "paper_color" => {
                    if let Some(c) = Self::str_to_color(val) {
                        s.paper_color = c;
                    }
                }
                "hald_size" => {
                    if let Ok(n) = val.parse::<u32>() {
                        s.hald_size = n;
                    }
                }
                "mode" => {
                    if let Some(m) = PolaroidMode::parse(val) {
                        s.mode = m;
                    }
                }
                "css_width" => s.css_width = f(s.css_width).max(1.0),
                "lut_strength" => s.effects.lut_strength = f(s.effects.lut_strength),
                "vignette" => s.effects.vignette = f(s.effects.vignette),
                "grain" => s.effects.grain = f(s.effects.grain),
                "gloss" => s.effects.gloss = f(s.effects.gloss),
                "spec_power" => s.effects.spec_power = f(s.effects.spec_power),
                "fresnel" => s.effects.fresnel = f(s.effects.fresnel),
                "roll" => s.effects.roll = f(s.effects.roll),
                "streak" => s.effects.streak = f(s.effects.streak),
                _ => {}
            }
        }
        s
    }

    /// Load from the user settings file (default if missing or corrupt).
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        let Ok(content) = std::fs::read_to_string(&path) else { return Self::default() };
        Self::parse(&content)
    }

    /// Load an explicit preset file. Unlike [`RenderSettings::load`], a
    /// missing file is an error.
    pub fn load_from(path: &Path) -> Result<Self, CardError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    pub fn save_to(&self, path: &Path) -> Result<(), CardError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())?;
        Ok(())
    }

    /// Save to the user settings file.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            crate::log_warn!("Failed to save settings to {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_text_round_trips() {
        let mut s = RenderSettings::default();
        s.gpu_acceleration = false;
        s.preferred_gpu = "low power".to_string();
        s.paper_color = [10, 20, 30, 255];
        s.mode = PolaroidMode::OptionA;
        s.effects.gloss = 0.3;
        s.effects.spec_power = 42.0;
        assert_eq!(RenderSettings::parse(&s.to_config_string()), s);
    }

    #[test]
    fn bad_values_keep_defaults() {
        let s = RenderSettings::parse(
            "gloss=lots\nmode=square\npaper_color=1,2\nunknown=1\nno equals sign\nmax_pixel_ratio=9\n",
        );
        let d = RenderSettings::default();
        assert_eq!(s.effects.gloss, d.effects.gloss);
        assert_eq!(s.mode, d.mode);
        assert_eq!(s.paper_color, d.paper_color);
        assert_eq!(s.max_pixel_ratio, 2.0);
    }

    #[test]
    fn hex_paper_colour() {
        let s = RenderSettings::parse("paper_color=#f7f7f5");
        assert_eq!(s.paper_color, [0xF7, 0xF7, 0xF5, 0xFF]);
    }

    #[test]
    fn preset_file_save_and_load() {
        let path = std::env::temp_dir()
            .join("polaroidfx_settings_tests")
            .join("preset.cfg");
        let mut s = RenderSettings::default();
        s.effects.grain = 0.0;
        s.hald_size = 8;
        s.save_to(&path).unwrap();
        assert_eq!(RenderSettings::load_from(&path).unwrap(), s);
        assert!(RenderSettings::load_from(Path::new("/definitely/not/here.cfg")).is_err());
    }
}
