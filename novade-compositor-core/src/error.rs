use thiserror::Error;

use crate::arena::SurfaceHandle;

/// Errors raised when a surface handle does not resolve.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArenaError {
    #[error("surface handle {0} is stale or was never issued")]
    StaleHandle(SurfaceHandle),
    #[error("surface {0} is a deleted placeholder")]
    Deleted(SurfaceHandle),
}
