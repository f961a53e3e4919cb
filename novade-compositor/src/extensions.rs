//! Capability probe.
//!
//! [`Extensions::probe`] asks the display once which optional extensions it
//! offers; every query afterwards is a plain read of the cached answer. A
//! missing extension is a normal answer, not an error.

use tracing::info;

use crate::display::{DisplayConnection, Extension, ExtensionInfo};
use crate::error::UnavailableReason;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions {
    composite: Option<ExtensionInfo>,
    damage: Option<ExtensionInfo>,
    fixes: Option<ExtensionInfo>,
    render: Option<ExtensionInfo>,
    shape: Option<ExtensionInfo>,
    sync: Option<ExtensionInfo>,
    randr: Option<ExtensionInfo>,
    gl: bool,
}

impl Extensions {
    pub fn probe(display: &dyn DisplayConnection) -> Self {
        let extensions = Self {
            composite: display.query_extension(Extension::Composite),
            damage: display.query_extension(Extension::Damage),
            fixes: display.query_extension(Extension::Fixes),
            render: display.query_extension(Extension::Render),
            shape: display.query_extension(Extension::Shape),
            sync: display.query_extension(Extension::Sync),
            randr: display.query_extension(Extension::RandR),
            gl: display.gl_context_available(),
        };
        for extension in Extension::ALL {
            match extensions.info(extension) {
                Some(v) => info!("{} extension {}.{} available", extension.name(), v.major, v.minor),
                None => info!("{} extension not available", extension.name()),
            }
        }
        extensions
    }

    pub fn info(&self, extension: Extension) -> Option<ExtensionInfo> {
        match extension {
            Extension::Composite => self.composite,
            Extension::Damage => self.damage,
            Extension::Fixes => self.fixes,
            Extension::Render => self.render,
            Extension::Shape => self.shape,
            Extension::Sync => self.sync,
            Extension::RandR => self.randr,
        }
    }

    pub fn has_composite(&self) -> bool {
        self.composite.is_some()
    }

    pub fn composite_version(&self) -> Option<(u32, u32)> {
        self.composite.map(|v| (v.major, v.minor))
    }

    /// Naming a redirected window's pixmap needs Composite 0.2.
    pub fn composite_pixmap_available(&self) -> bool {
        self.composite.map_or(false, |v| v.at_least(0, 2))
    }

    /// The overlay window arrived with Composite 0.3.
    pub fn composite_overlay_available(&self) -> bool {
        self.composite.map_or(false, |v| v.at_least(0, 3))
    }

    pub fn has_damage(&self) -> bool {
        self.damage.is_some()
    }

    pub fn damage_event_base(&self) -> Option<u8> {
        self.damage.map(|v| v.event_base)
    }

    /// Server-side region objects need XFIXES 2.0.
    pub fn fixes_region_available(&self) -> bool {
        self.fixes.map_or(false, |v| v.at_least(2, 0))
    }

    pub fn has_render(&self) -> bool {
        self.render.is_some()
    }

    pub fn render_version(&self) -> Option<(u32, u32)> {
        self.render.map(|v| (v.major, v.minor))
    }

    pub fn shape_available(&self) -> bool {
        self.shape.is_some()
    }

    /// Input shapes came with SHAPE 1.1.
    pub fn shape_input_available(&self) -> bool {
        self.shape.map_or(false, |v| v.at_least(1, 1))
    }

    pub fn sync_available(&self) -> bool {
        self.sync.is_some()
    }

    /// Output hotplug notifications need RANDR 1.2.
    pub fn randr_available(&self) -> bool {
        self.randr.map_or(false, |v| v.at_least(1, 2))
    }

    pub fn gl_available(&self) -> bool {
        self.gl
    }

    /// Whether redirection and at least one backend are possible at all.
    pub fn compositing_possible(&self) -> Result<(), UnavailableReason> {
        if !self.composite_pixmap_available() {
            return Err(UnavailableReason::ExtensionMissing(Extension::Composite.name()));
        }
        if !self.has_render() && !self.gl {
            return Err(UnavailableReason::ExtensionMissing(Extension::Render.name()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::HeadlessDisplay;
    use novade_compositor_core::Size;
    use pretty_assertions::assert_eq;

    #[test]
    fn probe_caches_versions() {
        let display = HeadlessDisplay::new(Size::new(100, 100));
        let ext = Extensions::probe(&display);
        assert_eq!(ext.composite_version(), Some((0, 4)));
        assert!(ext.composite_overlay_available());
        assert_eq!(ext.damage_event_base(), Some(91));
        assert!(ext.shape_input_available());
        assert!(ext.gl_available());
        assert_eq!(ext.compositing_possible(), Ok(()));
    }

    #[test]
    fn old_composite_cannot_name_pixmaps() {
        let display = HeadlessDisplay::new(Size::new(100, 100));
        display.set_extension(Extension::Composite, Some(ExtensionInfo::new(0, 1, 0)));
        let ext = Extensions::probe(&display);
        assert!(ext.has_composite());
        assert!(!ext.composite_pixmap_available());
        assert_eq!(ext.compositing_possible(), Err(UnavailableReason::ExtensionMissing("Composite")));
    }

    #[test]
    fn missing_damage_is_not_fatal() {
        let display = HeadlessDisplay::new(Size::new(100, 100));
        display.set_extension(Extension::Damage, None);
        let ext = Extensions::probe(&display);
        assert!(!ext.has_damage());
        assert_eq!(ext.damage_event_base(), None);
        assert_eq!(ext.compositing_possible(), Ok(()));
    }

    #[test]
    fn no_backend_at_all_is_reported() {
        let display = HeadlessDisplay::new(Size::new(100, 100));
        display.set_extension(Extension::Render, None);
        display.set_gl_available(false);
        let ext = Extensions::probe(&display);
        assert_eq!(ext.compositing_possible(), Err(UnavailableReason::ExtensionMissing("RENDER")));
    }
}
