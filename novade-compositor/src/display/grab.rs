//! Paired grabs on the display server.
//!
//! [`ServerGrab`] reference-counts the global server grab so independent
//! subsystems can nest it. [`InputGrab`] holds the keyboard grab and an
//! invisible full-screen input window for as long as it lives.

use std::cell::Cell;
use std::rc::Rc;

use novade_compositor_core::Rectangle;
use tracing::{debug, error, trace, warn};

use super::{DisplayConnection, InputWindowId};

pub struct ServerGrab {
    display: Rc<dyn DisplayConnection>,
    depth: Cell<u32>,
}

impl ServerGrab {
    pub fn new(display: Rc<dyn DisplayConnection>) -> Self {
        Self { display, depth: Cell::new(0) }
    }

    /// Grabs the server; only the outermost call reaches the display.
    pub fn grab(&self) {
        let depth = self.depth.get();
        if depth == 0 {
            self.display.grab_server();
            trace!("server grabbed");
        }
        self.depth.set(depth + 1);
    }

    /// Releases one level; only the last release reaches the display.
    pub fn ungrab(&self) {
        let depth = self.depth.get();
        debug_assert!(depth > 0, "server ungrab without matching grab");
        if depth == 0 {
            error!("server ungrab without matching grab, ignoring");
            return;
        }
        self.depth.set(depth - 1);
        if depth == 1 {
            self.display.ungrab_server();
            trace!("server released");
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth.get()
    }

    pub fn is_grabbed(&self) -> bool {
        self.depth.get() > 0
    }

    /// Grabs and returns a guard that releases on drop.
    pub fn guard(&self) -> ServerGrabGuard<'_> {
        self.grab();
        ServerGrabGuard { grab: self }
    }
}

impl std::fmt::Debug for ServerGrab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerGrab").field("depth", &self.depth.get()).finish()
    }
}

#[must_use = "the server is released as soon as the guard is dropped"]
pub struct ServerGrabGuard<'a> {
    grab: &'a ServerGrab,
}

impl Drop for ServerGrabGuard<'_> {
    fn drop(&mut self) {
        self.grab.ungrab();
    }
}

/// Exclusive keyboard input for a full-screen effect.
///
/// Owning an `InputGrab` means both the keyboard grab and the input window
/// exist; dropping it releases both, whatever path the owner leaves by.
pub struct InputGrab {
    display: Rc<dyn DisplayConnection>,
    window: InputWindowId,
}

impl InputGrab {
    /// Creates the input window covering `rect` and grabs the keyboard.
    /// Returns `None`, holding nothing, if either step fails.
    pub fn acquire(display: Rc<dyn DisplayConnection>, rect: Rectangle) -> Option<InputGrab> {
        let window = match display.create_input_window(rect) {
            Ok(window) => window,
            Err(e) => {
                warn!("failed to create input window: {}", e);
                return None;
            }
        };
        if !display.grab_keyboard() {
            warn!("keyboard grab refused");
            display.destroy_input_window(window);
            return None;
        }
        debug!(?window, "input grabbed");
        Some(InputGrab { display, window })
    }

    pub fn window(&self) -> InputWindowId {
        self.window
    }
}

impl Drop for InputGrab {
    fn drop(&mut self) {
        self.display.ungrab_keyboard();
        self.display.destroy_input_window(self.window);
        debug!(window = ?self.window, "input released");
    }
}

impl std::fmt::Debug for InputGrab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputGrab").field("window", &self.window).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::headless::{DisplayOp, HeadlessDisplay};
    use novade_compositor_core::Size;
    use rstest::rstest;

    fn headless() -> Rc<HeadlessDisplay> {
        Rc::new(HeadlessDisplay::new(Size::new(800, 600)))
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(5)]
    fn nested_grabs_reach_the_server_once(#[case] n: u32) {
        let display = headless();
        let grab = ServerGrab::new(display.clone());
        for _ in 0..n {
            grab.grab();
        }
        assert!(display.server_grabbed());
        for i in 0..n {
            assert!(display.server_grabbed(), "released early after {} ungrabs", i);
            grab.ungrab();
        }
        assert!(!display.server_grabbed());
        assert_eq!(display.count_ops(|op| matches!(op, DisplayOp::GrabServer)), 1);
        assert_eq!(display.count_ops(|op| matches!(op, DisplayOp::UngrabServer)), 1);
    }

    #[test]
    fn guard_nests_with_manual_grabs() {
        let display = headless();
        let grab = ServerGrab::new(display.clone());
        grab.grab();
        {
            let _guard = grab.guard();
            assert_eq!(grab.depth(), 2);
        }
        assert!(display.server_grabbed());
        grab.ungrab();
        assert!(!display.server_grabbed());
    }

    #[test]
    fn input_grab_releases_everything_on_drop() {
        let display = headless();
        let grab = InputGrab::acquire(display.clone(), Rectangle::new(0, 0, 800, 600)).unwrap();
        assert!(display.keyboard_grabbed());
        assert_eq!(display.live_input_windows(), 1);
        drop(grab);
        assert!(!display.keyboard_grabbed());
        assert_eq!(display.live_input_windows(), 0);
    }

    #[test]
    fn refused_keyboard_grab_holds_nothing() {
        let display = headless();
        display.set_keyboard_grab_fails(true);
        assert!(InputGrab::acquire(display.clone(), Rectangle::new(0, 0, 800, 600)).is_none());
        assert!(!display.keyboard_grabbed());
        assert_eq!(display.live_input_windows(), 0);
    }
}
