//! Drives [`Compositor::timer_fired`] from a calloop event loop.
//!
//! The compositor pings a [`calloop::ping`] source whenever it sets a new
//! frame deadline. The ping arms a one-shot [`Timer`] for that deadline
//! unless one is already pending; the timer re-arms itself for as long as
//! the compositor keeps asking for frames.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use calloop::ping::make_ping;
use calloop::timer::{TimeoutAction, Timer};
use calloop::{LoopHandle, RegistrationToken};
use tracing::{error, trace};

use crate::compositor::Compositor;
use crate::error::CompositingError;

/// Event loop data that owns a compositor.
pub trait FrameTimerState {
    fn compositor(&mut self) -> &mut Compositor;
}

/// Hooks `compositor` up to `handle`. Returns the token of the wake-up
/// source; removing it stops new timers from being armed.
pub fn insert_frame_timer<D: FrameTimerState + 'static>(
    handle: &LoopHandle<'static, D>,
    compositor: &mut Compositor,
) -> Result<RegistrationToken, CompositingError> {
    let (ping, source) = make_ping().map_err(|e| CompositingError::EventLoop(e.to_string()))?;
    let armed = Rc::new(Cell::new(false));

    let timer_handle = handle.clone();
    let token = handle
        .insert_source(source, move |(), _, state: &mut D| {
            if armed.get() {
                return;
            }
            if let Some(deadline) = state.compositor().next_timeout() {
                arm_timer(&timer_handle, &armed, deadline);
            }
        })
        .map_err(|e| CompositingError::EventLoop(e.error.to_string()))?;

    if compositor.next_timeout().is_some() {
        ping.ping();
    }
    compositor.set_wakeup(move || ping.ping());
    Ok(token)
}

fn arm_timer<D: FrameTimerState + 'static>(handle: &LoopHandle<'static, D>, armed: &Rc<Cell<bool>>, deadline: Instant) {
    trace!("frame timer armed");
    armed.set(true);
    let timer_armed = armed.clone();
    let inserted = handle.insert_source(Timer::from_deadline(deadline), move |deadline, _, state: &mut D| {
        let compositor = state.compositor();
        compositor.timer_fired(Instant::now().max(deadline));
        match compositor.next_timeout() {
            Some(next) => TimeoutAction::ToInstant(next),
            None => {
                timer_armed.set(false);
                TimeoutAction::Drop
            }
        }
    });
    if let Err(e) = inserted {
        error!("failed to arm frame timer: {}", e.error);
        armed.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{DisplayConnection, HeadlessDisplay};
    use calloop::EventLoop;
    use novade_compositor_core::{Rectangle, Size, SurfaceDescriptor, WindowId};
    use novade_core::config::CompositingConfig;
    use std::time::Duration;

    struct State {
        compositor: Compositor,
    }

    impl FrameTimerState for State {
        fn compositor(&mut self) -> &mut Compositor {
            &mut self.compositor
        }
    }

    #[test]
    fn damage_gets_painted_by_the_loop() {
        let display = Rc::new(HeadlessDisplay::new(Size::new(200, 200)));
        display.map_window(WindowId(1), Size::new(50, 50));
        let dyn_display: Rc<dyn DisplayConnection> = display.clone();
        let mut config = CompositingConfig::default();
        config.fade.enabled = false;
        config.shadow.enabled = false;
        let mut compositor = Compositor::new(dyn_display, config);
        compositor.window_added(SurfaceDescriptor::new(WindowId(1), Rectangle::new(10, 10, 50, 50)));
        assert!(compositor.setup_compositing().is_ok());

        let mut event_loop: EventLoop<'static, State> = match EventLoop::try_new() {
            Ok(event_loop) => event_loop,
            Err(e) => panic!("event loop: {}", e),
        };
        assert!(insert_frame_timer(&event_loop.handle(), &mut compositor).is_ok());
        let mut state = State { compositor };

        for _ in 0..5 {
            assert!(event_loop.dispatch(Some(Duration::from_millis(30)), &mut state).is_ok());
        }
        assert_eq!(state.compositor.stats().frames, 1);
        assert!(state.compositor.scheduler().is_idle());

        state.compositor.damage_notify(WindowId(1), Rectangle::new(0, 0, 5, 5));
        for _ in 0..5 {
            assert!(event_loop.dispatch(Some(Duration::from_millis(30)), &mut state).is_ok());
        }
        assert_eq!(state.compositor.stats().frames, 2);
        assert!(display.present_count() >= 2);
    }
}
