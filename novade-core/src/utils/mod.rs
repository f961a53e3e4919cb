//! General utilities.
//!
//! - [`fs`]: filesystem helpers returning [`crate::error::CoreError`].
//! - [`paths`]: XDG base directories and NovaDE-specific paths.

pub mod fs;
pub mod paths;

pub use fs::ensure_dir_exists;
