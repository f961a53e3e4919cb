mod common;

use common::{plain_config, Harness};
use novade_compositor::display::headless::DisplayOp;
use novade_compositor::display::{Extension, HeadlessDisplay};
use novade_compositor::{BackendKind, UnavailableReason};
use novade_compositor_core::{Rectangle, Size, WindowId};
use novade_core::config::BackendPreference;
use pretty_assertions::assert_eq;
use rstest::rstest;

#[test]
fn opengl_is_preferred() {
    let mut h = Harness::new(Size::new(320, 240), plain_config());
    h.setup();
    let status = h.compositor.compositing_status();
    assert!(status.enabled);
    assert_eq!(status.backend, Some(BackendKind::OpenGl));
    assert_eq!(status.reason, None);
    assert!(h.display.has_gl_context());
}

#[rstest]
#[case::no_gl(false, false)]
#[case::context_fails(true, true)]
fn falls_back_to_xrender(#[case] gl_available: bool, #[case] context_fails: bool) {
    let display = HeadlessDisplay::new(Size::new(320, 240));
    display.set_gl_available(gl_available);
    display.set_gl_context_fails(context_fails);
    let mut h = Harness::with_display(display, plain_config());
    h.add_window(WindowId(1), Rectangle::new(10, 10, 100, 100));
    h.setup();

    assert_eq!(h.compositor.compositing_status().backend, Some(BackendKind::XRender));
    assert!(!h.display.has_gl_context());
    assert!(h.frame());
    assert!(!h.display.composites().is_empty());
    assert!(h.display.draws().is_empty());
}

#[test]
fn nothing_to_render_with_is_reported() {
    let display = HeadlessDisplay::new(Size::new(320, 240));
    display.set_gl_available(false);
    display.set_extension(Extension::Render, None);
    let mut h = Harness::with_display(display, plain_config());

    let err = h.compositor.setup_compositing().err();
    assert_eq!(
        err.as_ref().and_then(|e| e.unavailable_reason()),
        Some(&UnavailableReason::ExtensionMissing("RENDER"))
    );
    let status = h.compositor.compositing_status();
    assert!(!status.enabled);
    assert_eq!(status.reason.as_deref(), Some("extension missing: RENDER"));
    assert!(!h.display.is_redirected());
    assert!(!h.display.server_grabbed());
}

#[test]
fn missing_composite_is_reported() {
    let display = HeadlessDisplay::new(Size::new(320, 240));
    display.set_extension(Extension::Composite, None);
    let mut h = Harness::with_display(display, plain_config());
    let err = h.compositor.setup_compositing().err();
    assert_eq!(
        err.as_ref().and_then(|e| e.unavailable_reason()),
        Some(&UnavailableReason::ExtensionMissing("Composite"))
    );
}

#[test]
fn without_damage_whole_windows_are_repainted() {
    let display = HeadlessDisplay::new(Size::new(320, 240));
    display.set_extension(Extension::Damage, None);
    let mut h = Harness::with_display(display, plain_config());
    h.add_window(WindowId(1), Rectangle::new(0, 0, 100, 50));
    h.setup();
    assert_eq!(h.display.live_damage_objects(), 0);
    assert!(h.frame());

    h.compositor.damage_notify(WindowId(1), Rectangle::new(0, 0, 1, 1));
    assert!(h.frame());
    assert_eq!(h.compositor.stats().last_painted_area, 100 * 50);
}

#[test]
fn server_grab_nests_and_releases_once() {
    let mut h = Harness::new(Size::new(320, 240), plain_config());
    h.add_window(WindowId(1), Rectangle::new(0, 0, 100, 100));

    h.compositor.server_grab().grab();
    h.setup();
    assert!(h.frame());
    assert!(h.display.server_grabbed());
    assert_eq!(h.display.count_ops(|op| *op == DisplayOp::GrabServer), 1);

    h.compositor.server_grab().ungrab();
    assert!(!h.display.server_grabbed());
    assert_eq!(h.display.count_ops(|op| *op == DisplayOp::UngrabServer), 1);
    assert_eq!(h.compositor.server_grab().depth(), 0);
}

#[test]
fn setup_and_paint_leave_the_server_ungrabbed() {
    let mut h = Harness::new(Size::new(320, 240), plain_config());
    h.add_window(WindowId(1), Rectangle::new(0, 0, 100, 100));
    h.setup();
    assert!(h.frame());
    assert!(!h.display.server_grabbed());
    let grabs = h.display.count_ops(|op| *op == DisplayOp::GrabServer);
    let ungrabs = h.display.count_ops(|op| *op == DisplayOp::UngrabServer);
    assert!(grabs >= 2);
    assert_eq!(grabs, ungrabs);
}

#[test]
fn resize_drops_the_old_capture() {
    let mut h = Harness::new(Size::new(640, 480), plain_config());
    let window = h.add_window(WindowId(1), Rectangle::new(0, 0, 100, 100));
    h.setup();
    assert!(h.frame());
    assert_eq!(h.display.live_pixmaps(), 1);

    h.display.resize_window(WindowId(1), Size::new(200, 150));
    assert!(h.compositor.window_geometry_changed(window, Rectangle::new(0, 0, 200, 150)).is_ok());
    // Released as soon as the geometry changes, not at the next paint.
    assert_eq!(h.display.live_pixmaps(), 0);
    assert_eq!(h.display.live_textures(), 0);

    h.display.clear_ops();
    assert!(h.frame());
    assert_eq!(h.display.live_pixmaps(), 1);
    assert_eq!(h.display.live_textures(), 1);
    let sizes: Vec<Size> = h.display.draws().iter().map(|d| d.texture_size).collect();
    assert_eq!(sizes, vec![Size::new(200, 150)]);
}

#[test]
fn stale_capture_is_retried_next_frame() {
    let mut h = Harness::new(Size::new(640, 480), plain_config());
    let window = h.add_window(WindowId(1), Rectangle::new(0, 0, 100, 100));
    h.setup();
    assert!(h.frame());

    h.display.resize_window(WindowId(1), Size::new(200, 150));
    h.display.set_pixmap_size(WindowId(1), Some(Size::new(100, 100)));
    assert!(h.compositor.window_geometry_changed(window, Rectangle::new(0, 0, 200, 150)).is_ok());
    assert!(h.frame());
    assert_eq!(h.compositor.stats().last_skipped_windows, 1);
    assert_eq!(h.display.live_pixmaps(), 0);
    assert!(h.compositor.next_timeout().is_some());

    h.display.set_pixmap_size(WindowId(1), None);
    assert!(h.frame());
    assert_eq!(h.compositor.stats().last_skipped_windows, 0);
    assert_eq!(h.display.live_pixmaps(), 1);
}

#[test]
fn backend_switch_rebuilds_everything() {
    let mut h = Harness::new(Size::new(320, 240), plain_config());
    h.add_window(WindowId(1), Rectangle::new(0, 0, 100, 100));
    h.setup();
    assert!(h.frame());
    assert_eq!(h.display.live_textures(), 1);

    assert!(h.compositor.switch_backend(BackendPreference::XRender).is_ok());
    assert_eq!(h.compositor.compositing_status().backend, Some(BackendKind::XRender));
    assert_eq!(h.display.live_textures(), 0);
    assert!(!h.display.has_gl_context());
    assert!(h.display.is_redirected());

    assert!(h.frame());
    assert_eq!(h.display.live_pixmaps(), 1);
    assert!(h.display.live_pictures() >= 1);
}

#[test]
fn finishing_releases_every_resource() {
    let mut config = plain_config();
    config.shadow.enabled = true;
    let mut h = Harness::new(Size::new(320, 240), config);
    h.add_window(WindowId(1), Rectangle::new(10, 10, 100, 100));
    h.add_window(WindowId(2), Rectangle::new(50, 50, 100, 100));
    h.setup();
    assert!(h.frame());
    assert!(h.display.live_textures() > 2);

    h.compositor.finish_compositing();
    assert_eq!(h.display.live_textures(), 0);
    assert_eq!(h.display.live_pictures(), 0);
    assert_eq!(h.display.live_pixmaps(), 0);
    assert_eq!(h.display.live_damage_objects(), 0);
    assert!(!h.display.is_redirected());
    assert!(!h.display.server_grabbed());

    // Windows stay known and come back with the next setup.
    h.setup();
    assert!(h.frame());
    assert_eq!(h.display.live_pixmaps(), 2);
}

#[test]
fn lost_context_turns_compositing_off() {
    let mut h = Harness::new(Size::new(320, 240), plain_config());
    h.add_window(WindowId(1), Rectangle::new(0, 0, 100, 100));
    h.setup();
    assert!(h.frame());

    // Dropping the context behind the backend's back makes the next swap fail.
    use novade_compositor::DisplayConnection;
    h.display.destroy_gl_context();
    h.compositor.add_repaint_full();
    h.frame();
    let status = h.compositor.compositing_status();
    assert!(!status.enabled);
    assert_eq!(status.reason.as_deref(), Some("backend initialization failed: rendering context lost"));
}
