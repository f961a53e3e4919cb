//! Error types of the compositing engine.

use novade_compositor_core::SurfaceHandle;
use novade_core::error::CoreError;
use thiserror::Error;

use crate::display::DisplayError;

/// Why compositing could not be enabled. The `Display` text is what the
/// window manager shows to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnavailableReason {
    #[error("disabled by configuration")]
    DisabledByConfig,

    #[error("extension missing: {0}")]
    ExtensionMissing(&'static str),

    #[error("no GPU context")]
    NoGpuContext,

    #[error("backend initialization failed: {0}")]
    BackendInit(String),
}

#[derive(Debug, Error)]
pub enum CompositingError {
    #[error("compositing unavailable: {0}")]
    Unavailable(UnavailableReason),

    #[error("display error: {0}")]
    Display(#[from] DisplayError),

    #[error("configuration error: {0}")]
    Config(#[from] CoreError),

    #[error("unknown surface {0}")]
    UnknownSurface(SurfaceHandle),

    #[error("event loop error: {0}")]
    EventLoop(String),
}

impl CompositingError {
    /// The reason compositing is off, if this error means exactly that.
    pub fn unavailable_reason(&self) -> Option<&UnavailableReason> {
        match self {
            CompositingError::Unavailable(reason) => Some(reason),
            _ => None,
        }
    }
}

impl From<UnavailableReason> for CompositingError {
    fn from(reason: UnavailableReason) -> Self {
        CompositingError::Unavailable(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reason_strings_match_user_facing_text() {
        assert_eq!(UnavailableReason::NoGpuContext.to_string(), "no GPU context");
        assert_eq!(UnavailableReason::DisabledByConfig.to_string(), "disabled by configuration");
        assert_eq!(
            UnavailableReason::ExtensionMissing("Composite").to_string(),
            "extension missing: Composite"
        );
        assert_eq!(
            UnavailableReason::BackendInit("rendering context lost".to_string()).to_string(),
            "backend initialization failed: rendering context lost"
        );
    }

    #[test]
    fn unavailable_error_exposes_reason() {
        let err = CompositingError::from(UnavailableReason::ExtensionMissing("RENDER"));
        assert_eq!(err.unavailable_reason(), Some(&UnavailableReason::ExtensionMissing("RENDER")));
        assert_eq!(err.to_string(), "compositing unavailable: extension missing: RENDER");
        let display = CompositingError::from(DisplayError::ContextLost);
        assert!(display.unavailable_reason().is_none());
    }
}
