//! NovaDE compositing engine.
//!
//! Turns the window manager's surfaces into frames. The window manager owns
//! a [`Compositor`], reports window changes and damage to it, and lets the
//! event loop call [`Compositor::timer_fired`] when a frame is due (see
//! [`event_loop::insert_frame_timer`]). Rendering goes through a
//! [`display::DisplayConnection`], with an OpenGL backend and an XRender
//! fallback behind [`scene::Scene`].

pub mod compositor;
pub mod display;
pub mod effects;
pub mod error;
pub mod event_loop;
pub mod extensions;
pub mod scene;
pub mod scheduler;

pub use compositor::{CompositingStatus, Compositor, DeletedRef, FrameStats};
pub use display::{DisplayConnection, DisplayError, HeadlessDisplay};
pub use effects::{Effect, EffectKey};
pub use error::{CompositingError, UnavailableReason};
pub use event_loop::{insert_frame_timer, FrameTimerState};
pub use scene::BackendKind;
pub use scheduler::FrameScheduler;
