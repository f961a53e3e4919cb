//! Configuration loading.
//!
//! [`ConfigLoader::load`] reads an optional system-wide `config.toml`
//! (overridable through `NOVADE_SYSTEM_CONFIG_PATH`) and the user's
//! `config.toml` from the application config directory, merges them table by
//! table with the user file winning, deserializes the result into a
//! [`CoreConfig`] and validates it. Missing files are not an error; the
//! defaults fill in.
//!
//! ```rust,ignore
//! use novade_core::config::ConfigLoader;
//!
//! match ConfigLoader::load() {
//!     Ok(config) => println!("backend: {}", config.compositing.backend),
//!     Err(e) => {
//!         novade_core::logging::init_minimal_logging();
//!         tracing::error!("Configuration loading failed: {}", e);
//!     }
//! }
//! ```

use std::fs;
use std::path::Path;
use toml::Value;

use crate::config::CoreConfig;
use crate::error::{ConfigError, CoreError};
use crate::utils::fs as nova_fs;
use crate::utils::paths::{get_app_config_dir, get_app_state_dir, get_system_config_path_with_override};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads, merges and validates the system and user configuration files.
    pub fn load() -> Result<CoreConfig, CoreError> {
        let system_config_path = get_system_config_path_with_override()?;
        let user_config_path = get_app_config_dir()?.join("config.toml");
        Self::load_layered(Some(&system_config_path), Some(&user_config_path))
    }

    /// Loads and validates a single configuration file. A missing file yields
    /// the defaults.
    pub fn load_from_path(path: &Path) -> Result<CoreConfig, CoreError> {
        Self::load_layered(None, Some(path))
    }

    /// Reads `base` then `overlay`, merging the overlay's tables into the
    /// base.
    pub fn load_layered(base: Option<&Path>, overlay: Option<&Path>) -> Result<CoreConfig, CoreError> {
        let base_value = match base {
            Some(path) => Self::read_toml_value(path)?,
            None => None,
        };
        let overlay_value = match overlay {
            Some(path) => Self::read_toml_value(path)?,
            None => None,
        };

        let mut final_config: CoreConfig = match Self::merge_toml_values(base_value, overlay_value) {
            Some(value) => value.try_into().map_err(ConfigError::ParseError)?,
            None => CoreConfig::default(),
        };

        Self::validate_config(&mut final_config)?;
        Ok(final_config)
    }

    /// Parses `path` into a TOML value; `None` for missing or empty files.
    fn read_toml_value(path: &Path) -> Result<Option<Value>, CoreError> {
        match fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => Ok(None),
            Ok(content) => {
                let value = content.parse::<Value>().map_err(ConfigError::ParseError)?;
                tracing::debug!(path = %path.display(), "configuration file read");
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoreError::Config(ConfigError::ReadError { path: path.to_path_buf(), source: e })),
        }
    }

    /// Merges two optional TOML values. `override_val` takes precedence.
    fn merge_toml_values(base: Option<Value>, override_val: Option<Value>) -> Option<Value> {
        match (base, override_val) {
            (None, None) => None,
            (Some(b), None) => Some(b),
            (None, Some(o)) => Some(o),
            (Some(Value::Table(mut base_table)), Some(Value::Table(override_table))) => {
                Self::merge_toml_tables(&mut base_table, &override_table);
                Some(Value::Table(base_table))
            }
            (_, Some(o)) => Some(o),
        }
    }

    fn merge_toml_tables(base_table: &mut toml::map::Map<String, Value>, override_table: &toml::map::Map<String, Value>) {
        for (key, override_item) in override_table {
            match base_table.get_mut(key) {
                Some(base_item) => {
                    if let (Value::Table(bt), Value::Table(ot)) = (&mut *base_item, override_item) {
                        Self::merge_toml_tables(bt, ot);
                    } else {
                        *base_item = override_item.clone();
                    }
                }
                None => {
                    base_table.insert(key.clone(), override_item.clone());
                }
            }
        }
    }

    /// Normalizes enum-like strings, clamps numeric ranges and resolves the
    /// log file path against the state directory.
    fn validate_config(config: &mut CoreConfig) -> Result<(), CoreError> {
        let level_lower = config.logging.level.to_lowercase();
        match level_lower.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => config.logging.level = level_lower,
            _ => {
                return Err(CoreError::Config(ConfigError::ValidationError(format!(
                    "Invalid log level: '{}'. Must be one of trace, debug, info, warn, error.",
                    config.logging.level
                ))));
            }
        }

        let format_lower = config.logging.format.to_lowercase();
        match format_lower.as_str() {
            "text" | "json" => config.logging.format = format_lower,
            _ => {
                return Err(CoreError::Config(ConfigError::ValidationError(format!(
                    "Invalid log format: '{}'. Must be one of text, json.",
                    config.logging.format
                ))));
            }
        }

        if let Some(log_path) = &config.logging.file_path {
            let absolute_path = if log_path.is_absolute() {
                log_path.clone()
            } else {
                get_app_state_dir()?.join(log_path)
            };
            if let Some(parent_dir) = absolute_path.parent() {
                if !parent_dir.exists() {
                    nova_fs::ensure_dir_exists(parent_dir)?;
                }
            }
            config.logging.file_path = Some(absolute_path);
        }

        Self::validate_compositing_config(config)
    }

    fn validate_compositing_config(config: &mut CoreConfig) -> Result<(), CoreError> {
        let compositing = &mut config.compositing;
        match compositing.backend_preference() {
            Some(preference) => compositing.backend = preference.as_str().to_string(),
            None => {
                return Err(CoreError::Config(ConfigError::ValidationError(format!(
                    "Invalid compositing backend: '{}'. Must be one of opengl, xrender.",
                    compositing.backend
                ))));
            }
        }

        compositing.refresh_rate = compositing.refresh_rate.min(1000);
        if !compositing.animation_speed.is_finite() || compositing.animation_speed < 0.0 {
            return Err(CoreError::Config(ConfigError::ValidationError(format!(
                "Invalid animation_speed: {}. Must be a non-negative number.",
                compositing.animation_speed
            ))));
        }

        compositing.shadow.opacity = compositing.shadow.opacity.clamp(0.0, 1.0);
        compositing.shadow.fuzzyness = compositing.shadow.fuzzyness.max(0);
        compositing.shadow.size = compositing.shadow.size.max(0);
        compositing.cube.opacity = compositing.cube.opacity.clamp(0.0, 1.0);
        if compositing.cube.rotation_duration_ms == 0 {
            compositing.cube.rotation_duration_ms = 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendPreference;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).expect("Failed to write temp config file");
        path
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConfigLoader::load_from_path(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, CoreConfig::default());
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "config.toml", "  \n");
        assert_eq!(ConfigLoader::load_from_path(&path).unwrap(), CoreConfig::default());
    }

    #[test]
    fn test_values_are_normalized_and_clamped() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "config.toml",
            r#"
            [logging]
            level = "DEBUG"
            format = "Json"

            [compositing]
            backend = "XRender"
            refresh_rate = 5000

            [compositing.shadow]
            opacity = 3.0
            "#,
        );
        let config = ConfigLoader::load_from_path(&path).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.compositing.backend, "xrender");
        assert_eq!(config.compositing.backend_preference(), Some(BackendPreference::XRender));
        assert_eq!(config.compositing.refresh_rate, 1000);
        assert_eq!(config.compositing.shadow.opacity, 1.0);
    }

    #[test]
    fn test_invalid_backend_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "config.toml", "[compositing]\nbackend = \"vulkan\"\n");
        match ConfigLoader::load_from_path(&path) {
            Err(CoreError::Config(ConfigError::ValidationError(msg))) => assert!(msg.contains("vulkan")),
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "config.toml", "[compositing\n");
        assert!(matches!(
            ConfigLoader::load_from_path(&path),
            Err(CoreError::Config(ConfigError::ParseError(_)))
        ));
    }

    #[test]
    fn test_user_file_overrides_system_file_per_key() {
        let dir = TempDir::new().unwrap();
        let system = write_config(
            &dir,
            "system.toml",
            "[compositing]\nvsync = false\n[compositing.shadow]\nsize = 9\nfuzzyness = 2\n",
        );
        let user = write_config(&dir, "user.toml", "[compositing.shadow]\nsize = 4\n");
        let config = ConfigLoader::load_layered(Some(&system), Some(&user)).unwrap();
        assert!(!config.compositing.vsync);
        assert_eq!(config.compositing.shadow.size, 4);
        assert_eq!(config.compositing.shadow.fuzzyness, 2);
    }

    #[test]
    fn test_absolute_log_path_parent_is_created() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("logs/nested/compositor.log");
        let content = format!("[logging]\nfile_path = {:?}\n", log_path.display().to_string());
        let path = write_config(&dir, "config.toml", &content);
        let config = ConfigLoader::load_from_path(&path).unwrap();
        assert_eq!(config.logging.file_path, Some(log_path.clone()));
        assert!(log_path.parent().unwrap().is_dir());
    }
}
