//! Frame pacing.
//!
//! The scheduler owns no timer. It tells the event loop when the next frame
//! is due ([`FrameScheduler::deadline`]) and is told when the frame starts
//! and ends. Frames are spaced at least one refresh interval apart measured
//! from the start of the previous frame, so a burst of repaint requests
//! arms one timer for the rest of the current interval instead of a full
//! new one.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::display::SwapResult;

pub const FALLBACK_REFRESH_RATE: f64 = 50.0;
pub const MIN_REFRESH_RATE: f64 = 1.0;
pub const MAX_REFRESH_RATE: f64 = 1000.0;

/// Margin after a vertical retrace before the next frame is due.
const VSYNC_SLACK: Duration = Duration::from_millis(1);

/// Picks the refresh rate: a configured override wins, then what the
/// display reports, then the fallback. Always within
/// [`MIN_REFRESH_RATE`]..=[`MAX_REFRESH_RATE`].
pub fn refresh_rate(display: Option<f64>, override_hz: u32) -> f64 {
    let rate = if override_hz > 0 {
        f64::from(override_hz)
    } else {
        match display {
            Some(rate) if rate.is_finite() && rate > 0.0 => rate,
            _ => FALLBACK_REFRESH_RATE,
        }
    };
    rate.clamp(MIN_REFRESH_RATE, MAX_REFRESH_RATE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Scheduled { deadline: Instant },
    Painting,
}

#[derive(Debug, Clone)]
pub struct FrameScheduler {
    interval: Duration,
    vsync: bool,
    state: FrameState,
    frame_start: Option<Instant>,
    /// No frame may start before this.
    earliest_next: Option<Instant>,
    /// A repaint arrived while painting.
    repaint_requested: bool,
}

impl FrameScheduler {
    pub fn new(refresh_rate: f64, vsync: bool) -> Self {
        let rate = refresh_rate.clamp(MIN_REFRESH_RATE, MAX_REFRESH_RATE);
        let interval = Duration::from_secs_f64(1.0 / rate);
        debug!(rate, ?interval, vsync, "frame scheduler configured");
        Self { interval, vsync, state: FrameState::Idle, frame_start: None, earliest_next: None, repaint_requested: false }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == FrameState::Idle
    }

    /// When the armed timer should fire.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            FrameState::Scheduled { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Asks for a frame. Returns whether a new deadline was set, in which
    /// case the caller must (re)arm its timer.
    pub fn schedule(&mut self, now: Instant) -> bool {
        match self.state {
            FrameState::Idle => {
                let deadline = self.earliest_next.map_or(now, |earliest| earliest.max(now));
                trace!(in_ms = deadline.saturating_duration_since(now).as_secs_f64() * 1000.0, "frame scheduled");
                self.state = FrameState::Scheduled { deadline };
                true
            }
            FrameState::Scheduled { .. } => false,
            FrameState::Painting => {
                self.repaint_requested = true;
                false
            }
        }
    }

    /// Called when the timer fires. Returns whether a frame may be painted
    /// now; a timer firing early or without a schedule is ignored.
    pub fn begin_frame(&mut self, now: Instant) -> bool {
        match self.state {
            FrameState::Scheduled { deadline } if now >= deadline => {
                self.state = FrameState::Painting;
                self.frame_start = Some(now);
                self.repaint_requested = false;
                true
            }
            _ => false,
        }
    }

    /// The timer fired but there was nothing to paint. Pacing is left as
    /// it was, since nothing reached the screen.
    pub fn cancel_frame(&mut self, now: Instant) {
        if self.state != FrameState::Painting {
            return;
        }
        self.frame_start = None;
        self.state = FrameState::Idle;
        if std::mem::take(&mut self.repaint_requested) {
            self.schedule(now);
        } else {
            trace!("nothing to paint, going idle");
        }
    }

    /// Books the frame that just finished. `more` is whether someone (an
    /// animating effect, a deferred window) already wants another frame.
    pub fn end_frame(&mut self, now: Instant, swap: SwapResult, more: bool) {
        let start = self.frame_start.take().unwrap_or(now);
        let earliest = if self.vsync && swap.blocked_on_vsync {
            // The swap returned right after a retrace; aim just past the next.
            now + self.interval + VSYNC_SLACK
        } else {
            start + self.interval
        };
        self.earliest_next = Some(earliest);
        let again = more || self.repaint_requested;
        self.repaint_requested = false;
        self.state = FrameState::Idle;
        if again {
            self.schedule(now);
        }
    }

    /// Forgets pacing history, e.g. after a backend switch.
    pub fn reset(&mut self) {
        self.state = FrameState::Idle;
        self.frame_start = None;
        self.earliest_next = None;
        self.repaint_requested = false;
    }
}
