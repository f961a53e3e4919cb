//! Default configuration values.
//!
//! These functions are referenced by `serde`'s `default` attribute in
//! [`super::types`].

use std::path::PathBuf;

use super::types::{CompositingConfig, CubeConfig, FadeConfig, LoggingConfig, ShadowConfig};

pub(super) fn default_logging_config() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        file_path: default_log_file_path(),
        format: default_log_format(),
    }
}

pub(super) fn default_log_level() -> String {
    "info".to_string()
}

/// No log file by default.
pub(super) fn default_log_file_path() -> Option<PathBuf> {
    None
}

pub(super) fn default_log_format() -> String {
    "text".to_string()
}

pub(super) fn default_true() -> bool {
    true
}

pub(super) fn default_black() -> [u8; 3] {
    [0, 0, 0]
}

pub(super) fn default_backend() -> String {
    "opengl".to_string()
}

pub(super) fn default_animation_speed() -> f64 {
    1.0
}

pub(super) fn default_shadow_x_offset() -> i32 {
    0
}

pub(super) fn default_shadow_y_offset() -> i32 {
    3
}

pub(super) fn default_shadow_opacity() -> f64 {
    0.25
}

pub(super) fn default_shadow_fuzzyness() -> i32 {
    10
}

pub(super) fn default_shadow_size() -> i32 {
    5
}

pub(super) fn default_cube_rotation_duration_ms() -> u64 {
    500
}

pub(super) fn default_cube_opacity() -> f64 {
    0.8
}

pub(super) fn default_cube_z_position() -> f32 {
    100.0
}

pub(super) fn default_fade_ms() -> u64 {
    150
}

pub(super) fn default_shadow_config() -> ShadowConfig {
    ShadowConfig {
        enabled: default_true(),
        x_offset: default_shadow_x_offset(),
        y_offset: default_shadow_y_offset(),
        opacity: default_shadow_opacity(),
        fuzzyness: default_shadow_fuzzyness(),
        size: default_shadow_size(),
        color: default_black(),
        intensify_active_shadow: default_true(),
    }
}

pub(super) fn default_cube_config() -> CubeConfig {
    CubeConfig {
        enabled: default_true(),
        rotation_duration_ms: default_cube_rotation_duration_ms(),
        opacity: default_cube_opacity(),
        z_position: default_cube_z_position(),
        background: default_black(),
    }
}

pub(super) fn default_fade_config() -> FadeConfig {
    FadeConfig {
        enabled: default_true(),
        fade_in_ms: default_fade_ms(),
        fade_out_ms: default_fade_ms(),
    }
}

pub(super) fn default_compositing_config() -> CompositingConfig {
    CompositingConfig {
        enabled: default_true(),
        backend: default_backend(),
        refresh_rate: 0,
        vsync: default_true(),
        animation_speed: default_animation_speed(),
        shadow: default_shadow_config(),
        cube: default_cube_config(),
        fade: default_fade_config(),
    }
}
