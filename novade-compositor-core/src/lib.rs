//! # Novade Compositor Core
//!
//! Leaf data structures of the NovaDE compositing engine:
//! - Geometry primitives ([`Rectangle`], [`Point`], [`Size`]).
//! - Region algebra ([`Region`]): normalized rectangle sets with union,
//!   intersection, subtraction, translation and scaling, plus an
//!   "infinite" sentinel for unclipped painting.
//! - The surface arena ([`SurfaceArena`]) handing out generational
//!   [`SurfaceHandle`]s, so scene windows and effects never hold direct
//!   references to surfaces.
//! - Surface records ([`Toplevel`]) with their [`DamageTracker`].
//! - The bottom-to-top [`StackingOrder`].
//!
//! Nothing in this crate talks to a display server; the engine crate
//! (`novade-compositor`) builds the scene, backends and effects on top.

pub mod arena;
pub mod damage;
pub mod error;
pub mod geometry;
pub mod region;
pub mod stacking;
pub mod toplevel;

pub use arena::{SurfaceArena, SurfaceHandle};
pub use damage::DamageTracker;
pub use error::ArenaError;
pub use geometry::{Point, Rectangle, Size};
pub use region::Region;
pub use stacking::StackingOrder;
pub use toplevel::{
    DecorationShadow, Desktop, ShadowTile, SurfaceDescriptor, Toplevel, ToplevelKind, WindowId,
    WindowType,
};
