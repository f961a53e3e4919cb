//! # NovaDE Core Library (`novade-core`)
//!
//! Ambient infrastructure shared by the NovaDE compositing crates:
//!
//! - **Error Handling**: [`CoreError`] with the more specific [`ConfigError`]
//!   and [`LoggingError`].
//! - **Configuration**: TOML-based [`CoreConfig`] (logging plus the
//!   compositing engine and its effects), loaded and validated by
//!   [`ConfigLoader`].
//! - **Logging**: `tracing` subscribers for console and rolling-file output.
//! - **Utilities**: XDG path resolution and filesystem helpers.
//!
//! ```rust,ignore
//! use novade_core::config::ConfigLoader;
//! use novade_core::logging::init_logging;
//! use novade_core::error::CoreError;
//!
//! fn main() -> Result<(), CoreError> {
//!     let core_config = ConfigLoader::load()?;
//!     init_logging(&core_config.logging, false)?;
//!     tracing::info!(backend = %core_config.compositing.backend, "configuration loaded");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod utils;

pub use config::{BackendPreference, CompositingConfig, ConfigLoader, CoreConfig, LoggingConfig};
pub use error::{ConfigError, CoreError, LoggingError};
pub use logging::{init_logging, init_minimal_logging};
