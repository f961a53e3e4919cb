//! Runs the compositing engine against the headless display.
//!
//! Loads the configuration (a path may be given as the first argument),
//! maps a few windows, damages one of them continuously and lets the
//! event loop paint for a fixed number of frames, then logs what happened.

use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;

use calloop::timer::{TimeoutAction, Timer};
use calloop::{EventLoop, LoopSignal};
use novade_compositor::{insert_frame_timer, Compositor, DisplayConnection, FrameTimerState, HeadlessDisplay};
use novade_compositor_core::{Rectangle, Size, SurfaceDescriptor, WindowId};
use novade_core::config::{ConfigLoader, CoreConfig};
use novade_core::logging::{init_logging, init_minimal_logging};
use tracing::{error, info, warn};

const FRAMES: u64 = 120;
const DAMAGE_INTERVAL: Duration = Duration::from_millis(4);

struct Demo {
    compositor: Compositor,
    signal: LoopSignal,
    damage_ticks: u64,
}

impl FrameTimerState for Demo {
    fn compositor(&mut self) -> &mut Compositor {
        &mut self.compositor
    }
}

fn load_config() -> CoreConfig {
    let result = match std::env::args_os().nth(1) {
        Some(path) => ConfigLoader::load_from_path(&PathBuf::from(path)),
        None => ConfigLoader::load(),
    };
    match result {
        Ok(config) => config,
        Err(e) => {
            init_minimal_logging();
            warn!("falling back to default configuration: {}", e);
            CoreConfig::default()
        }
    }
}

fn main() -> ExitCode {
    let config = load_config();
    if let Err(e) = init_logging(&config.logging, false) {
        init_minimal_logging();
        warn!("configured logging unavailable, using stderr: {}", e);
    }

    let screen = Size::new(1280, 800);
    let display = Rc::new(HeadlessDisplay::new(screen));
    let windows = [
        (WindowId(1), Rectangle::new(0, 0, 1280, 800)),
        (WindowId(2), Rectangle::new(100, 80, 640, 480)),
        (WindowId(3), Rectangle::new(400, 300, 500, 350)),
    ];
    for (window, geometry) in windows {
        display.map_window(window, geometry.size());
    }

    let dyn_display: Rc<dyn DisplayConnection> = display.clone();
    let mut compositor = Compositor::new(dyn_display, config.compositing);
    for (window, geometry) in windows {
        compositor.window_added(SurfaceDescriptor::new(window, geometry));
    }
    compositor.set_desktop_layout(4, 1);
    if let Err(e) = compositor.setup_compositing() {
        error!("cannot composite: {}", e);
        return ExitCode::FAILURE;
    }

    let mut event_loop: EventLoop<'static, Demo> = match EventLoop::try_new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            error!("failed to create event loop: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let handle = event_loop.handle();
    if let Err(e) = insert_frame_timer(&handle, &mut compositor) {
        error!("failed to install frame timer: {}", e);
        return ExitCode::FAILURE;
    }

    // A client redrawing far faster than the screen refreshes.
    let damage = handle.insert_source(Timer::from_duration(DAMAGE_INTERVAL), |_, _, demo: &mut Demo| {
        demo.damage_ticks += 1;
        let x = (demo.damage_ticks * 7 % 600) as i32;
        demo.compositor.damage_notify(WindowId(3), Rectangle::new(x % 450, 20, 40, 40));
        if demo.compositor.stats().frames >= FRAMES {
            demo.signal.stop();
            return TimeoutAction::Drop;
        }
        TimeoutAction::ToDuration(DAMAGE_INTERVAL)
    });
    if let Err(e) = damage {
        error!("failed to install damage source: {}", e.error);
        return ExitCode::FAILURE;
    }

    let mut demo = Demo { compositor, signal: event_loop.get_signal(), damage_ticks: 0 };
    info!(frames = FRAMES, "running headless compositor");
    if let Err(e) = event_loop.run(Some(Duration::from_millis(100)), &mut demo, |_| {}) {
        error!("event loop failed: {}", e);
        return ExitCode::FAILURE;
    }

    let stats = demo.compositor.stats();
    let status = demo.compositor.compositing_status();
    let presents = display.present_count();
    info!(
        backend = ?status.backend,
        frames = stats.frames,
        empty_frames = stats.empty_frames,
        damage_events = demo.damage_ticks,
        presents,
        skipped_windows = stats.total_skipped_windows,
        "headless run finished"
    );
    demo.compositor.finish_compositing();
    ExitCode::SUCCESS
}
