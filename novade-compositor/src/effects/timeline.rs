// Copyright 2024 NovaDE Compositor contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Time-driven progress for effect animations.

use std::f64::consts::PI;
use std::time::{Duration, Instant};

use tracing::trace;

/// State of an animation.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AnimationState {
    Running,
    Completed,
}

impl AnimationState {
    pub fn is_completed(self) -> bool {
        self == AnimationState::Completed
    }
}

/// Maps linear progress in `[0, 1]` to eased progress in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    Linear,
    /// Starts slow.
    EaseIn,
    /// Ends slow.
    EaseOut,
    EaseInOut,
}

impl Curve {
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Curve::Linear => t,
            Curve::EaseIn => 1.0 - (t * PI / 2.0).cos(),
            Curve::EaseOut => (t * PI / 2.0).sin(),
            Curve::EaseInOut => (1.0 - (t * PI).cos()) / 2.0,
        }
    }
}

/// A single run from 0 to 1 over a fixed duration.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    start_time: Instant,
    duration: Duration,
    curve: Curve,
    progress: f64,
}

impl Timeline {
    pub fn new(start_time: Instant, duration: Duration, curve: Curve) -> Self {
        Self { start_time, duration, curve, progress: 0.0 }
    }

    /// A timeline that begins part of the way through, so that a reversed
    /// animation continues from where the interrupted one stopped.
    pub fn starting_at(start_time: Instant, duration: Duration, curve: Curve, progress: f64) -> Self {
        let progress = progress.clamp(0.0, 1.0);
        let already = duration.mul_f64(progress);
        Self {
            start_time: start_time.checked_sub(already).unwrap_or(start_time),
            duration,
            curve,
            progress,
        }
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }

    /// Updates the progress from the current time.
    pub fn update(&mut self, now: Instant) -> AnimationState {
        if self.duration.is_zero() {
            self.progress = 1.0;
        } else {
            let elapsed = now.saturating_duration_since(self.start_time);
            self.progress = (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0);
        }
        trace!(progress = self.progress, "timeline updated");
        self.state()
    }

    pub fn state(&self) -> AnimationState {
        if self.progress >= 1.0 {
            AnimationState::Completed
        } else {
            AnimationState::Running
        }
    }

    pub fn is_done(&self) -> bool {
        self.state() == AnimationState::Completed
    }

    /// Linear progress.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Progress through the curve.
    pub fn value(&self) -> f64 {
        self.curve.apply(self.progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn linear_timeline_lifecycle() {
        let start = Instant::now();
        let mut timeline = Timeline::new(start, Duration::from_millis(100), Curve::Linear);
        assert_eq!(timeline.value(), 0.0);
        assert_eq!(timeline.update(start), AnimationState::Running);

        assert_eq!(timeline.update(start + Duration::from_millis(50)), AnimationState::Running);
        assert!(close(timeline.value(), 0.5));

        assert_eq!(timeline.update(start + Duration::from_millis(100)), AnimationState::Completed);
        assert_eq!(timeline.value(), 1.0);

        assert_eq!(timeline.update(start + Duration::from_millis(150)), AnimationState::Completed);
        assert_eq!(timeline.value(), 1.0);
    }

    #[test]
    fn zero_duration_completes_immediately() {
        let start = Instant::now();
        let mut timeline = Timeline::new(start, Duration::ZERO, Curve::EaseInOut);
        assert_eq!(timeline.update(start), AnimationState::Completed);
        assert_eq!(timeline.value(), 1.0);
    }

    #[rstest]
    #[case(Curve::EaseIn)]
    #[case(Curve::EaseOut)]
    #[case(Curve::EaseInOut)]
    fn curves_keep_their_end_points(#[case] curve: Curve) {
        assert!(close(curve.apply(0.0), 0.0));
        assert!(close(curve.apply(1.0), 1.0));
        let mut last = 0.0;
        for i in 1..=10 {
            let v = curve.apply(f64::from(i) / 10.0);
            assert!(v >= last);
            last = v;
        }
    }

    #[test]
    fn ease_in_starts_slower_than_ease_out() {
        assert!(Curve::EaseIn.apply(0.25) < 0.25);
        assert!(Curve::EaseOut.apply(0.25) > 0.25);
        assert!(close(Curve::EaseInOut.apply(0.5), 0.5));
    }

    #[test]
    fn starting_part_way_continues_from_there() {
        let now = Instant::now() + Duration::from_secs(1);
        let mut timeline = Timeline::starting_at(now, Duration::from_millis(200), Curve::Linear, 0.25);
        timeline.update(now);
        assert!(close(timeline.progress(), 0.25));
        timeline.update(now + Duration::from_millis(100));
        assert!(close(timeline.progress(), 0.75));
    }
}
