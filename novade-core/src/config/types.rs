//! Configuration data structures.
//!
//! These structs are populated by deserializing TOML. Missing fields take
//! their values from [`super::defaults`]; unknown fields are rejected via
//! `#[serde(deny_unknown_fields)]`.

use serde::Deserialize;
use std::path::PathBuf;

use super::defaults;

/// Configuration settings for the logging subsystem.
///
/// ```
/// use novade_core::config::LoggingConfig;
/// use std::path::PathBuf;
///
/// let log_config: LoggingConfig = toml::from_str(r#"
/// level = "debug"
/// file_path = "/var/log/novade-compositor.log"
/// format = "json"
/// "#).unwrap();
/// assert_eq!(log_config.level, "debug");
/// assert_eq!(log_config.file_path, Some(PathBuf::from("/var/log/novade-compositor.log")));
/// assert_eq!(log_config.format, "json");
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// One of "trace", "debug", "info", "warn", "error" (case-insensitive).
    #[serde(default = "defaults::default_log_level")]
    pub level: String,
    /// Optional log file. Relative paths are resolved against the
    /// application's state directory.
    #[serde(default = "defaults::default_log_file_path")]
    pub file_path: Option<PathBuf>,
    /// "text" or "json".
    #[serde(default = "defaults::default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        defaults::default_logging_config()
    }
}

/// The compositing backend the user prefers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendPreference {
    OpenGl,
    XRender,
}

impl BackendPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendPreference::OpenGl => "opengl",
            BackendPreference::XRender => "xrender",
        }
    }
}

impl std::fmt::Display for BackendPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drop shadow settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShadowConfig {
    #[serde(default = "defaults::default_true")]
    pub enabled: bool,
    #[serde(default = "defaults::default_shadow_x_offset")]
    pub x_offset: i32,
    #[serde(default = "defaults::default_shadow_y_offset")]
    pub y_offset: i32,
    /// Shadow opacity in `[0, 1]`.
    #[serde(default = "defaults::default_shadow_opacity")]
    pub opacity: f64,
    /// Blur width of the shadow edge in pixels.
    #[serde(default = "defaults::default_shadow_fuzzyness")]
    pub fuzzyness: i32,
    /// How far the solid part of the shadow reaches beyond the window.
    #[serde(default = "defaults::default_shadow_size")]
    pub size: i32,
    #[serde(default = "defaults::default_black")]
    pub color: [u8; 3],
    /// Active windows get a stronger shadow.
    #[serde(default = "defaults::default_true")]
    pub intensify_active_shadow: bool,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        defaults::default_shadow_config()
    }
}

/// Desktop cube settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CubeConfig {
    #[serde(default = "defaults::default_true")]
    pub enabled: bool,
    /// Duration of one face-to-face rotation.
    #[serde(default = "defaults::default_cube_rotation_duration_ms")]
    pub rotation_duration_ms: u64,
    /// Opacity of the cube faces, `[0, 1]`.
    #[serde(default = "defaults::default_cube_opacity")]
    pub opacity: f64,
    /// How far the cube is pushed away from the viewer while active.
    #[serde(default = "defaults::default_cube_z_position")]
    pub z_position: f32,
    #[serde(default = "defaults::default_black")]
    pub background: [u8; 3],
}

impl Default for CubeConfig {
    fn default() -> Self {
        defaults::default_cube_config()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FadeConfig {
    #[serde(default = "defaults::default_true")]
    pub enabled: bool,
    #[serde(default = "defaults::default_fade_ms")]
    pub fade_in_ms: u64,
    #[serde(default = "defaults::default_fade_ms")]
    pub fade_out_ms: u64,
}

impl Default for FadeConfig {
    fn default() -> Self {
        defaults::default_fade_config()
    }
}

/// Settings of the compositing engine itself.
///
/// ```
/// use novade_core::config::{BackendPreference, CompositingConfig};
///
/// let config: CompositingConfig = toml::from_str(r#"
/// backend = "xrender"
/// refresh_rate = 75
/// [shadow]
/// size = 8
/// "#).unwrap();
/// assert_eq!(config.backend, "xrender");
/// assert_eq!(config.backend_preference(), Some(BackendPreference::XRender));
/// assert_eq!(config.refresh_rate, 75);
/// assert_eq!(config.shadow.size, 8);
/// assert_eq!(config.shadow.fuzzyness, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompositingConfig {
    #[serde(default = "defaults::default_true")]
    pub enabled: bool,
    /// "opengl" or "xrender" (case-insensitive).
    #[serde(default = "defaults::default_backend")]
    pub backend: String,
    /// Target refresh rate in Hz; `0` asks the display.
    #[serde(default)]
    pub refresh_rate: u32,
    #[serde(default = "defaults::default_true")]
    pub vsync: bool,
    /// Multiplier applied to every effect duration; `0` disables animations.
    #[serde(default = "defaults::default_animation_speed")]
    pub animation_speed: f64,
    #[serde(default)]
    pub shadow: ShadowConfig,
    #[serde(default)]
    pub cube: CubeConfig,
    #[serde(default)]
    pub fade: FadeConfig,
}

impl CompositingConfig {
    /// The parsed backend name, `None` if it is not a known backend.
    pub fn backend_preference(&self) -> Option<BackendPreference> {
        match self.backend.to_lowercase().as_str() {
            "opengl" | "gl" => Some(BackendPreference::OpenGl),
            "xrender" | "render" => Some(BackendPreference::XRender),
            _ => None,
        }
    }

    /// Scales a nominal effect duration by `animation_speed`.
    pub fn scaled_duration_ms(&self, nominal_ms: u64) -> u64 {
        (nominal_ms as f64 * self.animation_speed).round() as u64
    }
}

impl Default for CompositingConfig {
    fn default() -> Self {
        defaults::default_compositing_config()
    }
}

/// Root configuration structure.
///
/// ```
/// use novade_core::config::CoreConfig;
///
/// let loaded_config: CoreConfig = toml::from_str(r#"
/// [logging]
/// level = "warn"
/// [compositing.fade]
/// enabled = false
/// "#).unwrap();
/// assert_eq!(loaded_config.logging.level, "warn");
/// assert!(!loaded_config.compositing.fade.enabled);
/// assert!(loaded_config.compositing.enabled);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub compositing: CompositingConfig,
}
