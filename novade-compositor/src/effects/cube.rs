//! Desktop cube.
//!
//! Every desktop is one face of a prism seen from the front. While the cube
//! is up it owns the keyboard; Left/Right turn it one face at a time,
//! Up/Down tilt it, Return or Escape put it away.
//!
//! Turns are queued strictly first in, first out. Each step's easing is
//! fixed when it starts: a lone step eases in and out, the first of a chain
//! eases in, middle steps are linear and the last eases out. The desktop
//! switch is committed once a step is half done.

use std::any::Any;
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::time::Duration;

use glam::Vec3;
use novade_compositor_core::Region;
use novade_core::config::CubeConfig;
use tracing::{debug, info, warn};

use super::timeline::{Curve, Timeline};
use super::{Effect, EffectContext, EffectKey, EffectWindow};
use crate::display::{Color, InputGrab};
use crate::scene::{
    BackendKind, PaintMask, RotationAxis, RotationData, ScreenPaintData, ScreenPass, ScreenPrePaintData,
    WindowPrePaintData,
};

/// Quad size while the cube is up, so faces are drawn as a mesh.
const VERTEX_GRID: i32 = 250;
const TILT_STEP: f32 = 45.0;
const TILT_LIMIT: f32 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    fn steps(self) -> i64 {
        match self {
            Direction::Left => -1,
            Direction::Right => 1,
        }
    }
}

#[derive(Debug)]
pub enum CubePhase {
    Static,
    Rotating {
        timeline: Timeline,
        direction: Direction,
        /// Desktop facing the viewer when the step started.
        from: u32,
        committed: bool,
        queue: VecDeque<Direction>,
    },
    VerticalRotating {
        timeline: Timeline,
        from: f32,
        to: f32,
    },
}

/// The cube's state. The input grab lives inside the states that need it,
/// so it cannot outlast them.
#[derive(Debug, Default)]
pub enum CubeState {
    #[default]
    Inactive,
    Starting {
        grab: InputGrab,
        timeline: Timeline,
    },
    Active {
        grab: InputGrab,
        phase: CubePhase,
        tilt: f32,
    },
    /// Input is already released; only the zoom-out animation is left.
    Stopping {
        timeline: Timeline,
        tilt: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CubeEvent {
    Activate,
    Key(EffectKey),
    Tick,
    Cancel,
}

pub struct CubeEffect {
    config: CubeConfig,
    duration: Duration,
    state: CubeState,
    /// Desktop facing the viewer.
    front: u32,
}

impl CubeEffect {
    pub const NAME: &'static str = "cube";

    pub fn new(config: CubeConfig, duration: Duration) -> Self {
        Self { config, duration, state: CubeState::Inactive, front: 1 }
    }

    pub fn state(&self) -> &CubeState {
        &self.state
    }

    pub fn is_inactive(&self) -> bool {
        matches!(self.state, CubeState::Inactive)
    }

    pub fn holds_input(&self) -> bool {
        matches!(self.state, CubeState::Starting { .. } | CubeState::Active { .. })
    }

    pub fn front(&self) -> u32 {
        self.front
    }

    /// Brings the cube up. Returns whether it is now starting.
    pub fn activate(&mut self, ctx: &mut EffectContext<'_>) -> bool {
        self.transition(CubeEvent::Activate, ctx);
        matches!(self.state, CubeState::Starting { .. })
    }

    /// The single place where the state changes.
    fn transition(&mut self, event: CubeEvent, ctx: &mut EffectContext<'_>) {
        let state = std::mem::take(&mut self.state);
        self.state = match (state, event) {
            (CubeState::Inactive, CubeEvent::Activate) => self.start(ctx),
            (state, CubeEvent::Cancel) => {
                if !matches!(state, CubeState::Inactive) {
                    info!("cube cancelled");
                    ctx.requests.add_repaint_full();
                }
                drop(state);
                CubeState::Inactive
            }
            (CubeState::Starting { grab, mut timeline }, CubeEvent::Tick) => {
                if timeline.update(ctx.now).is_completed() {
                    CubeState::Active { grab, phase: CubePhase::Static, tilt: 0.0 }
                } else {
                    CubeState::Starting { grab, timeline }
                }
            }
            (CubeState::Starting { grab, timeline }, CubeEvent::Key(EffectKey::Escape | EffectKey::Return)) => {
                drop(grab);
                self.stop(1.0 - timeline.progress(), 0.0, ctx)
            }
            (CubeState::Active { grab, phase, tilt }, CubeEvent::Key(EffectKey::Escape | EffectKey::Return)) => {
                drop(grab);
                if let CubePhase::Rotating { committed: false, direction, from, .. } = phase {
                    // Half-way turns snap to the face being turned towards.
                    self.commit(from, direction, ctx);
                }
                self.stop(0.0, tilt, ctx)
            }
            (CubeState::Active { grab, phase, tilt }, CubeEvent::Key(key)) => {
                let phase = self.on_key(phase, key, tilt, ctx);
                if !matches!(phase, CubePhase::Static) {
                    // Frames have stopped while the cube stood still.
                    ctx.requests.add_repaint_full();
                }
                CubeState::Active { grab, phase, tilt }
            }
            (CubeState::Active { grab, phase, tilt }, CubeEvent::Tick) => {
                let (phase, tilt) = self.advance(phase, tilt, ctx);
                CubeState::Active { grab, phase, tilt }
            }
            (CubeState::Stopping { mut timeline, tilt }, CubeEvent::Tick) => {
                if timeline.update(ctx.now).is_completed() {
                    info!(desktop = self.front, "cube closed");
                    ctx.requests.add_repaint_full();
                    CubeState::Inactive
                } else {
                    CubeState::Stopping { timeline, tilt }
                }
            }
            (state, _) => state,
        };
    }

    fn start(&mut self, ctx: &mut EffectContext<'_>) -> CubeState {
        if ctx.backend != BackendKind::OpenGl {
            debug!(backend = %ctx.backend, "cube needs the OpenGL backend");
            return CubeState::Inactive;
        }
        if ctx.desktops.count < 2 {
            debug!("cube needs at least two desktops");
            return CubeState::Inactive;
        }
        let Some(grab) = InputGrab::acquire(ctx.display.clone(), ctx.screen) else {
            warn!("cube not started, input grab failed");
            return CubeState::Inactive;
        };
        self.front = ctx.desktops.current;
        info!(desktop = self.front, faces = ctx.desktops.count, "cube starting");
        ctx.requests.add_repaint_full();
        CubeState::Starting { grab, timeline: Timeline::new(ctx.now, self.duration, Curve::EaseInOut) }
    }

    /// `already` is how much of the zoom-out is skipped because the zoom-in
    /// never finished.
    fn stop(&mut self, already: f64, tilt: f32, ctx: &mut EffectContext<'_>) -> CubeState {
        debug!(desktop = self.front, "cube stopping");
        ctx.requests.add_repaint_full();
        CubeState::Stopping {
            timeline: Timeline::starting_at(ctx.now, self.duration, Curve::EaseInOut, already),
            tilt,
        }
    }

    fn on_key(&mut self, phase: CubePhase, key: EffectKey, tilt: f32, ctx: &mut EffectContext<'_>) -> CubePhase {
        let direction = match key {
            EffectKey::Left => Direction::Left,
            EffectKey::Right => Direction::Right,
            EffectKey::Up | EffectKey::Down => {
                if !matches!(phase, CubePhase::Static) {
                    return phase;
                }
                let step = if key == EffectKey::Up { TILT_STEP } else { -TILT_STEP };
                let to = (tilt + step).clamp(-TILT_LIMIT, TILT_LIMIT);
                if to == tilt {
                    return phase;
                }
                return CubePhase::VerticalRotating {
                    timeline: Timeline::new(ctx.now, self.duration, Curve::EaseInOut),
                    from: tilt,
                    to,
                };
            }
            _ => return phase,
        };
        match phase {
            CubePhase::Static => self.begin_step(direction, VecDeque::new(), false, ctx),
            CubePhase::Rotating { timeline, direction: current, from, committed, mut queue } => {
                queue.push_back(direction);
                CubePhase::Rotating { timeline, direction: current, from, committed, queue }
            }
            // Turns wait until the tilt settles.
            vertical @ CubePhase::VerticalRotating { .. } => vertical,
        }
    }

    fn begin_step(
        &mut self,
        direction: Direction,
        queue: VecDeque<Direction>,
        chained: bool,
        ctx: &mut EffectContext<'_>,
    ) -> CubePhase {
        let curve = match (chained, queue.is_empty()) {
            (false, true) => Curve::EaseInOut,
            (false, false) => Curve::EaseIn,
            (true, false) => Curve::Linear,
            (true, true) => Curve::EaseOut,
        };
        debug!(?direction, ?curve, queued = queue.len(), "cube step");
        CubePhase::Rotating {
            timeline: Timeline::new(ctx.now, self.duration, curve),
            direction,
            from: self.front,
            committed: false,
            queue,
        }
    }

    fn commit(&mut self, from: u32, direction: Direction, ctx: &mut EffectContext<'_>) {
        self.front = ctx.desktops.offset(from, direction.steps());
        debug!(desktop = self.front, "cube committed desktop");
        ctx.requests.switch_desktop(self.front);
    }

    fn advance(&mut self, phase: CubePhase, tilt: f32, ctx: &mut EffectContext<'_>) -> (CubePhase, f32) {
        match phase {
            CubePhase::Static => (CubePhase::Static, tilt),
            CubePhase::Rotating { mut timeline, direction, from, mut committed, mut queue } => {
                timeline.update(ctx.now);
                if !committed && timeline.value() >= 0.5 {
                    self.commit(from, direction, ctx);
                    committed = true;
                }
                if !timeline.is_done() {
                    return (CubePhase::Rotating { timeline, direction, from, committed, queue }, tilt);
                }
                match queue.pop_front() {
                    Some(next) => (self.begin_step(next, queue, true, ctx), tilt),
                    None => (CubePhase::Static, tilt),
                }
            }
            CubePhase::VerticalRotating { mut timeline, from, to } => {
                if timeline.update(ctx.now).is_completed() {
                    (CubePhase::Static, to)
                } else {
                    let tilt = from + (to - from) * timeline.value() as f32;
                    (CubePhase::VerticalRotating { timeline, from, to }, tilt)
                }
            }
        }
    }

    /// Rotation of the prism in degrees, positive when turning right.
    fn rotation(&self, count: u32) -> f32 {
        let face = 360.0 / count as f32;
        let CubeState::Active { phase: CubePhase::Rotating { timeline, direction, committed, .. }, .. } = &self.state
        else {
            return 0.0;
        };
        let sign = direction.steps() as f32;
        let value = timeline.value() as f32;
        // Angles are relative to `front`, which flips at the commit.
        if *committed {
            sign * (value - 1.0) * face
        } else {
            sign * value * face
        }
    }

    fn tilt(&self) -> f32 {
        match &self.state {
            CubeState::Active { phase: CubePhase::VerticalRotating { timeline, from, to }, .. } => {
                from + (to - from) * timeline.value() as f32
            }
            CubeState::Active { tilt, .. } | CubeState::Stopping { tilt, .. } => *tilt,
            _ => 0.0,
        }
    }

    /// 0 when flat on the screen, 1 when fully pulled back.
    fn zoom(&self) -> f32 {
        match &self.state {
            CubeState::Inactive => 0.0,
            CubeState::Starting { timeline, .. } => timeline.value() as f32,
            CubeState::Active { .. } => 1.0,
            CubeState::Stopping { timeline, .. } => 1.0 - timeline.value() as f32,
        }
    }

    /// One pass per face that faces the viewer, the ones furthest away
    /// first.
    fn face_passes(&self, ctx: &EffectContext<'_>) -> Vec<ScreenPass> {
        let count = ctx.desktops.count.max(1);
        let (w, h) = (ctx.screen.width as f32, ctx.screen.height as f32);
        let face = 360.0 / count as f32;
        let apothem = if count > 2 { (w / 2.0) / (PI / count as f32).tan() } else { 0.0 };
        let zoom = self.zoom();
        let rotation = self.rotation(count);
        let tilt = self.tilt() * zoom;
        let origin = Vec3::new(w / 2.0, h / 2.0, apothem);
        let opacity = 1.0 - (1.0 - self.config.opacity.clamp(0.0, 1.0)) * f64::from(zoom);

        let mut faces: Vec<(f32, u32)> = (0..count)
            .map(|i| {
                let desktop = ctx.desktops.offset(self.front, i64::from(i));
                let mut angle = i as f32 * face - rotation;
                if angle > 180.0 {
                    angle -= 360.0;
                }
                (angle, desktop)
            })
            .filter(|(angle, _)| angle.abs() < 90.0)
            .collect();
        faces.sort_by(|a, b| b.0.abs().total_cmp(&a.0.abs()));

        faces
            .into_iter()
            .map(|(angle, desktop)| ScreenPass {
                data: ScreenPaintData {
                    translate: Vec3::new(0.0, 0.0, self.config.z_position * zoom),
                    rotation: Some(RotationData { axis: RotationAxis::Y, angle: -angle, origin }),
                    tilt: (tilt != 0.0).then_some(RotationData { axis: RotationAxis::X, angle: tilt, origin }),
                    ..ScreenPaintData::default()
                },
                desktop: Some(desktop),
                opacity,
            })
            .collect()
    }
}

impl Effect for CubeEffect {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn is_active(&self) -> bool {
        match &self.state {
            CubeState::Inactive => false,
            CubeState::Active { phase, .. } => !matches!(phase, CubePhase::Static),
            CubeState::Starting { .. } | CubeState::Stopping { .. } => true,
        }
    }

    fn is_fullscreen(&self) -> bool {
        true
    }

    fn pre_paint_screen(&mut self, data: &mut ScreenPrePaintData, ctx: &mut EffectContext<'_>) {
        self.transition(CubeEvent::Tick, ctx);
        if self.is_inactive() {
            return;
        }
        data.mask |= PaintMask::SCREEN_TRANSFORMED;
        data.paint = Region::infinite();
        data.background = Some(Color::from_rgb8(self.config.background));
        data.passes = self.face_passes(ctx);
    }

    fn pre_paint_window(
        &mut self,
        _window: &EffectWindow<'_>,
        data: &mut WindowPrePaintData,
        _ctx: &mut EffectContext<'_>,
    ) {
        if !self.is_inactive() {
            data.request_vertex_grid(VERTEX_GRID);
        }
    }

    fn post_paint_screen(&mut self, ctx: &mut EffectContext<'_>) {
        if self.is_active() {
            ctx.requests.add_repaint_full();
        }
    }

    fn handle_key(&mut self, key: EffectKey, ctx: &mut EffectContext<'_>) -> bool {
        if !self.holds_input() {
            return false;
        }
        self.transition(CubeEvent::Key(key), ctx);
        true
    }

    fn cancel(&mut self, ctx: &mut EffectContext<'_>) {
        self.transition(CubeEvent::Cancel, ctx);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl std::fmt::Debug for CubeEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CubeEffect").field("state", &self.state).field("front", &self.front).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{DisplayConnection, HeadlessDisplay};
    use crate::effects::{DesktopLayout, EffectRequests};
    use novade_compositor_core::{Rectangle, Size};
    use rstest::rstest;
    use std::rc::Rc;
    use std::time::Instant;

    struct Harness {
        display: Rc<HeadlessDisplay>,
        dyn_display: Rc<dyn DisplayConnection>,
        requests: EffectRequests,
        desktops: DesktopLayout,
        backend: BackendKind,
        now: Instant,
    }

    impl Harness {
        fn new() -> Self {
            let display = Rc::new(HeadlessDisplay::new(Size::new(800, 600)));
            Self {
                dyn_display: display.clone(),
                display,
                requests: EffectRequests::default(),
                desktops: DesktopLayout::new(4, 1),
                backend: BackendKind::OpenGl,
                now: Instant::now(),
            }
        }

        fn with<R>(&mut self, f: impl FnOnce(&mut EffectContext<'_>) -> R) -> R {
            let mut ctx = EffectContext {
                display: &self.dyn_display,
                backend: self.backend,
                screen: Rectangle::new(0, 0, 800, 600),
                desktops: self.desktops,
                now: self.now,
                active_window: None,
                requests: &mut self.requests,
            };
            f(&mut ctx)
        }

        fn tick(&mut self, cube: &mut CubeEffect, ms: u64) {
            self.now += Duration::from_millis(ms);
            let mut data = ScreenPrePaintData::new(PaintMask::empty(), Region::new());
            self.with(|ctx| cube.pre_paint_screen(&mut data, ctx));
        }
    }

    fn cube() -> CubeEffect {
        CubeEffect::new(CubeConfig::default(), Duration::from_millis(100))
    }

    #[test]
    fn activation_holds_input_until_escape() {
        let mut h = Harness::new();
        let mut cube = cube();
        assert!(h.with(|ctx| cube.activate(ctx)));
        assert!(h.display.keyboard_grabbed());
        assert_eq!(h.display.live_input_windows(), 1);
        h.tick(&mut cube, 150);
        assert!(matches!(cube.state(), CubeState::Active { .. }));

        assert!(h.with(|ctx| cube.handle_key(EffectKey::Escape, ctx)));
        assert!(matches!(cube.state(), CubeState::Stopping { .. }));
        assert!(!h.display.keyboard_grabbed());
        assert_eq!(h.display.live_input_windows(), 0);
        h.tick(&mut cube, 150);
        assert!(cube.is_inactive());
    }

    #[test]
    fn cancel_releases_input_synchronously() {
        let mut h = Harness::new();
        let mut cube = cube();
        h.with(|ctx| cube.activate(ctx));
        h.tick(&mut cube, 150);
        h.with(|ctx| cube.handle_key(EffectKey::Right, ctx));
        h.tick(&mut cube, 20);
        h.with(|ctx| cube.cancel(ctx));
        assert!(cube.is_inactive());
        assert!(!h.display.keyboard_grabbed());
        assert_eq!(h.display.live_input_windows(), 0);
    }

    #[test]
    fn refused_grab_keeps_the_cube_down() {
        let mut h = Harness::new();
        h.display.set_keyboard_grab_fails(true);
        let mut cube = cube();
        assert!(!h.with(|ctx| cube.activate(ctx)));
        assert!(cube.is_inactive());
        assert_eq!(h.display.live_input_windows(), 0);
    }

    #[test]
    fn needs_gpu_backend() {
        let mut h = Harness::new();
        h.backend = BackendKind::XRender;
        let mut cube = cube();
        assert!(!h.with(|ctx| cube.activate(ctx)));
        assert!(!h.display.keyboard_grabbed());
    }

    #[test]
    fn desktop_commits_at_half_turn() {
        let mut h = Harness::new();
        let mut cube = cube();
        h.with(|ctx| cube.activate(ctx));
        h.tick(&mut cube, 150);
        h.with(|ctx| cube.handle_key(EffectKey::Right, ctx));
        h.tick(&mut cube, 40);
        assert!(h.requests.desktop_switches.is_empty());
        h.tick(&mut cube, 20);
        assert_eq!(h.requests.desktop_switches, vec![2]);
        assert_eq!(cube.front(), 2);
        h.tick(&mut cube, 60);
        assert!(matches!(cube.state(), CubeState::Active { phase: CubePhase::Static, .. }));
    }

    #[rstest]
    #[case(EffectKey::Right)]
    #[case(EffectKey::Left)]
    #[case(EffectKey::Up)]
    fn turning_a_resting_cube_asks_for_frames(#[case] key: EffectKey) {
        let mut h = Harness::new();
        let mut cube = cube();
        h.with(|ctx| cube.activate(ctx));
        h.tick(&mut cube, 150);
        assert!(!cube.is_active());
        h.requests = EffectRequests::default();

        assert!(h.with(|ctx| cube.handle_key(key, ctx)));
        assert!(cube.is_active());
        assert!(h.requests.full_repaint);
    }

    #[test]
    fn queued_turns_run_in_order_with_chained_curves() {
        let mut h = Harness::new();
        let mut cube = cube();
        h.with(|ctx| cube.activate(ctx));
        h.tick(&mut cube, 150);
        for key in [EffectKey::Right, EffectKey::Right, EffectKey::Left] {
            h.with(|ctx| cube.handle_key(key, ctx));
        }
        let curve = |cube: &CubeEffect| match cube.state() {
            CubeState::Active { phase: CubePhase::Rotating { timeline, .. }, .. } => Some(timeline.curve()),
            _ => None,
        };
        // The first step started before anything was queued.
        assert_eq!(curve(&cube), Some(Curve::EaseInOut));
        h.tick(&mut cube, 100);
        assert_eq!(curve(&cube), Some(Curve::Linear));
        h.tick(&mut cube, 100);
        assert_eq!(curve(&cube), Some(Curve::EaseOut));
        h.tick(&mut cube, 100);
        assert_eq!(h.requests.desktop_switches, vec![2, 3, 2]);
        assert_eq!(cube.front(), 2);
    }

    #[test]
    fn active_cube_replaces_the_screen_pass() {
        let mut h = Harness::new();
        let mut cube = cube();
        h.with(|ctx| cube.activate(ctx));
        h.now += Duration::from_millis(150);
        let mut data = ScreenPrePaintData::new(PaintMask::SCREEN_REGION, Region::new());
        h.with(|ctx| cube.pre_paint_screen(&mut data, ctx));
        assert!(data.mask.contains(PaintMask::SCREEN_TRANSFORMED));
        assert!(data.paint.is_infinite());
        assert_eq!(data.passes.len(), 1);
        assert_eq!(data.passes[0].desktop, Some(1));
    }
}
