mod common;

use common::{plain_config, Harness};
use novade_compositor::display::headless::DisplayOp;
use novade_compositor_core::{Rectangle, Region, Size, WindowId};
use pretty_assertions::assert_eq;

#[test]
fn idle_screen_stops_painting() {
    let mut h = Harness::new(Size::new(640, 480), plain_config());
    h.add_window(WindowId(1), Rectangle::new(20, 20, 200, 100));
    h.setup();

    assert!(h.frame());
    assert_eq!(h.display.present_count(), 1);
    assert!(h.compositor.scheduler().is_idle());

    for _ in 0..5 {
        assert!(!h.frame());
    }
    assert_eq!(h.display.present_count(), 1);
    assert_eq!(h.compositor.stats().frames, 1);
    assert_eq!(h.compositor.next_timeout(), None);
}

#[test]
fn captured_damage_is_forgotten() {
    let mut h = Harness::new(Size::new(640, 480), plain_config());
    let window = h.add_window(WindowId(1), Rectangle::new(100, 100, 200, 200));
    h.setup();
    assert!(h.frame());

    let damage = Rectangle::new(5, 5, 10, 10);
    h.compositor.damage_notify(WindowId(1), damage);
    let toplevel = h.compositor.surface(window).map(|t| t.damage().damage().clone());
    assert_eq!(toplevel, Some(Region::from_rect(damage)));
    h.display.clear_ops();

    assert!(h.frame());
    let tracker = h.compositor.surface(window).map(|t| t.damage().clone());
    assert!(tracker.as_ref().is_some_and(|d| !d.has_damage()));
    assert!(tracker.as_ref().is_some_and(|d| !d.has_repaints()));
    assert_eq!(h.compositor.stats().last_painted_area, 100);
    assert_eq!(
        h.display.count_ops(|op| matches!(op, DisplayOp::UpdateTexture { damage: d, .. } if *d == Region::from_rect(damage))),
        1
    );
    assert!(!h.frame());
}

#[test]
fn damage_outside_the_window_is_dropped() {
    let mut h = Harness::new(Size::new(640, 480), plain_config());
    h.add_window(WindowId(1), Rectangle::new(0, 0, 50, 50));
    h.setup();
    assert!(h.frame());

    h.compositor.damage_notify(WindowId(1), Rectangle::new(60, 60, 10, 10));
    assert!(!h.frame());
    h.compositor.damage_notify(WindowId(1), Rectangle::new(40, 40, 30, 30));
    assert!(h.frame());
    assert_eq!(h.compositor.stats().last_painted_area, 100);
}

#[test]
fn covered_window_is_not_drawn() {
    let mut h = Harness::new(Size::new(400, 400), plain_config());
    h.add_window(WindowId(1), Rectangle::new(50, 50, 100, 100));
    h.add_window(WindowId(2), Rectangle::new(0, 0, 300, 300));
    h.setup();
    assert!(h.frame());

    let draws = h.display.draws();
    let area_of = |size: Size| -> i64 {
        draws.iter().filter(|d| d.texture_size == size).map(|d| d.drawn_area()).sum()
    };
    assert_eq!(area_of(Size::new(100, 100)), 0);
    assert_eq!(area_of(Size::new(300, 300)), 300 * 300);

    // The background only fills what no window covers.
    let background: i64 = h
        .display
        .ops()
        .iter()
        .filter_map(|op| match op {
            DisplayOp::FillSolid { rects, .. } => Some(Region::from_rects(rects.iter().copied()).area()),
            _ => None,
        })
        .sum();
    assert_eq!(background, 400 * 400 - 300 * 300);
}

#[test]
fn each_pixel_is_drawn_once_in_the_opaque_pass() {
    let mut h = Harness::new(Size::new(400, 300), plain_config());
    h.add_window(WindowId(1), Rectangle::new(0, 0, 200, 200));
    h.add_window(WindowId(2), Rectangle::new(100, 100, 200, 150));
    h.add_window(WindowId(3), Rectangle::new(150, 50, 100, 100));
    h.setup();
    assert!(h.frame());

    let draws = h.display.draws();
    let total: i64 = draws.iter().map(|d| d.drawn_area()).sum();
    let mut union = Region::new();
    for draw in &draws {
        union.union_with(&draw.drawn_region());
    }
    assert_eq!(total, union.area());
}

#[test]
fn translucent_window_is_blended_over_what_is_below() {
    let mut h = Harness::new(Size::new(400, 400), plain_config());
    h.add_window(WindowId(1), Rectangle::new(0, 0, 400, 400));
    let top = h.add_window(WindowId(2), Rectangle::new(100, 100, 100, 100));
    assert!(h.compositor.window_opacity_changed(top, 0.5).is_ok());
    h.setup();
    assert!(h.frame());

    let draws = h.display.draws();
    let below = draws.iter().find(|d| d.texture_size == Size::new(400, 400)).map(|d| d.drawn_area());
    assert_eq!(below, Some(400 * 400));
    let blended = draws.iter().find(|d| d.texture_size == Size::new(100, 100));
    assert!(blended.is_some_and(|d| d.blend && (d.opacity - 0.5).abs() < 1e-6));
}

#[test]
fn fast_damage_is_throttled_to_the_refresh_rate() {
    let mut h = Harness::new(Size::new(200, 200), plain_config());
    h.add_window(WindowId(1), Rectangle::new(0, 0, 100, 100));
    h.setup();

    let mut painted = 0;
    for _ in 0..100 {
        h.compositor.damage_notify(WindowId(1), Rectangle::new(0, 0, 10, 10));
        if h.frame_after(1) {
            painted += 1;
        }
    }
    // 60 Hz over 100 ms.
    assert!((5..=7).contains(&painted), "{} frames", painted);
    assert_eq!(h.compositor.stats().frames, painted);
}

#[test]
fn restack_repaints_and_keeps_the_new_order() {
    let mut h = Harness::new(Size::new(200, 200), plain_config());
    let a = h.add_window(WindowId(1), Rectangle::new(0, 0, 100, 100));
    let b = h.add_window(WindowId(2), Rectangle::new(50, 50, 100, 100));
    h.setup();
    assert!(h.frame());
    assert_eq!(h.compositor.stacking(), &[a, b]);

    h.compositor.restack(&[b, a]);
    assert_eq!(h.compositor.stacking(), &[b, a]);
    assert!(h.frame());
    assert_eq!(h.compositor.stats().last_painted_area, 200 * 200);
}

#[test]
fn restack_keeps_windows_the_order_leaves_out() {
    let mut h = Harness::new(Size::new(200, 200), plain_config());
    let a = h.add_window(WindowId(1), Rectangle::new(0, 0, 100, 100));
    let b = h.add_window(WindowId(2), Rectangle::new(50, 50, 100, 100));
    let c = h.add_window(WindowId(3), Rectangle::new(100, 100, 100, 100));
    h.setup();
    assert!(h.frame());

    h.compositor.restack(&[c, b, b, a, c]);
    assert_eq!(h.compositor.stacking(), &[c, b, a]);

    h.compositor.restack(&[b]);
    assert_eq!(h.compositor.stacking(), &[b, c, a]);
}

#[test]
fn windows_on_other_desktops_are_not_painted() {
    use novade_compositor_core::Desktop;

    let mut h = Harness::new(Size::new(200, 200), plain_config());
    let window = h.add_window(WindowId(1), Rectangle::new(0, 0, 100, 100));
    h.compositor.set_desktop_layout(2, 1);
    assert!(h.compositor.set_window_desktop(window, Desktop::Number(2)).is_ok());
    h.setup();
    assert!(h.frame());
    assert!(h.display.draws().is_empty());

    h.compositor.set_desktop_layout(2, 2);
    assert!(h.frame());
    assert_eq!(h.display.draws().len(), 1);
}
