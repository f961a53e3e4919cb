#![allow(dead_code)]

use std::rc::Rc;
use std::time::{Duration, Instant};

use novade_compositor::{Compositor, DisplayConnection, HeadlessDisplay};
use novade_compositor_core::{Rectangle, Size, SurfaceDescriptor, SurfaceHandle, WindowId};
use novade_core::config::CompositingConfig;

/// Compositing with every effect switched off.
pub fn plain_config() -> CompositingConfig {
    let mut config = CompositingConfig::default();
    config.shadow.enabled = false;
    config.fade.enabled = false;
    config.cube.enabled = false;
    config
}

/// A compositor on a headless display, with its own frame clock.
pub struct Harness {
    pub display: Rc<HeadlessDisplay>,
    pub compositor: Compositor,
    pub now: Instant,
}

impl Harness {
    pub fn new(screen: Size, config: CompositingConfig) -> Self {
        Self::with_display(HeadlessDisplay::new(screen), config)
    }

    pub fn with_display(display: HeadlessDisplay, config: CompositingConfig) -> Self {
        let display = Rc::new(display);
        let dyn_display: Rc<dyn DisplayConnection> = display.clone();
        Self { compositor: Compositor::new(dyn_display, config), display, now: Instant::now() }
    }

    pub fn add_window(&mut self, window: WindowId, geometry: Rectangle) -> SurfaceHandle {
        self.add_descriptor(SurfaceDescriptor::new(window, geometry))
    }

    pub fn add_descriptor(&mut self, descriptor: SurfaceDescriptor) -> SurfaceHandle {
        self.display.map_window(descriptor.window, descriptor.geometry.size());
        self.compositor.window_added(descriptor)
    }

    pub fn setup(&mut self) {
        if let Err(e) = self.compositor.setup_compositing() {
            panic!("compositing setup failed: {}", e);
        }
    }

    /// Fires the frame timer `ms` later than the previous firing.
    pub fn frame_after(&mut self, ms: u64) -> bool {
        self.now += Duration::from_millis(ms);
        self.compositor.timer_fired(self.now)
    }

    pub fn frame(&mut self) -> bool {
        self.frame_after(50)
    }
}
