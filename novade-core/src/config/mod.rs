//! Configuration management.
//!
//! - [`types`]: the configuration schema ([`CoreConfig`], [`LoggingConfig`],
//!   [`CompositingConfig`] and its effect sections).
//! - [`defaults`]: default values referenced by the `serde` attributes.
//! - [`loader`]: [`ConfigLoader`], which locates, merges, parses and
//!   validates `config.toml`.
//!
//! A missing configuration file is not an error; [`CoreConfig::default`]
//! fills in.

pub mod defaults;
pub mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::{
    BackendPreference, CompositingConfig, CoreConfig, CubeConfig, FadeConfig, LoggingConfig, ShadowConfig,
};
