//! Per-floor mask composition.
//!
//! Tiles author optional masks as sibling image files of their albedo
//! (`map.webp` → `map_Water.webp`). The compositor resolves those files
//! against host directory listings, composes every tile's mask of a kind
//! into one scene-space texture per floor, and exposes the result as a
//! [`MaskBundle`] plus CPU pixel buffers for particle spawn sampling.

mod compose;
mod resolve;

pub use compose::{MaskCompositor, WATER_DEGENERATE_COVERAGE};
pub use resolve::MaskResolver;

use std::collections::HashMap;

/// Kinds of per-tile authored masks, plus the compositor-generated floor
/// alpha mask used for clipping upper floors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MaskKind {
    Outdoors,
    Water,
    Specular,
    Tree,
    Window,
    /// Generated from tile alpha during composition; never authored.
    FloorAlpha,
}

impl MaskKind {
    /// The authored kinds, in composition order.
    pub const AUTHORED: &[MaskKind] = &[
        MaskKind::Outdoors,
        MaskKind::Water,
        MaskKind::Specular,
        MaskKind::Tree,
        MaskKind::Window,
    ];

    /// File-name suffix inserted before the extension.
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Outdoors => "_Outdoors",
            Self::Water => "_Water",
            Self::Specular => "_Specular",
            Self::Tree => "_Tree",
            Self::Window => "_Window",
            Self::FloorAlpha => "",
        }
    }

    pub const fn is_authored(self) -> bool {
        !matches!(self, Self::FloorAlpha)
    }
}

/// One composed scene-space mask texture.
pub struct MaskTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub size: [u32; 2],
}

/// All composed masks for one floor. Immutable to readers; only the
/// compositor mutates bundles on (re)composition.
pub struct MaskBundle {
    pub floor_index: usize,
    /// True when the floor had no contributing tiles; effects then sample a
    /// shared 1x1 transparent texture instead.
    pub empty: bool,
    pub textures: HashMap<MaskKind, MaskTexture>,
    /// Lazily filled CPU copies, invalidated together with the textures.
    pub(crate) cpu: HashMap<MaskKind, Option<Vec<u8>>>,
}

impl MaskBundle {
    pub(crate) fn empty_for(floor_index: usize) -> Self {
        Self {
            floor_index,
            empty: true,
            textures: HashMap::new(),
            cpu: HashMap::new(),
        }
    }

    pub fn view(&self, kind: MaskKind) -> Option<&wgpu::TextureView> {
        self.textures.get(&kind).map(|t| &t.view)
    }

    pub fn has(&self, kind: MaskKind) -> bool {
        self.textures.contains_key(&kind)
    }

    /// CPU pixels for spawn sampling, if the compositor has read this kind
    /// back already (see [`MaskCompositor::cpu_pixels`]).
    pub fn cpu_pixels(&self, kind: MaskKind) -> Option<&[u8]> {
        self.cpu.get(&kind).and_then(|p| p.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authored_kinds_have_suffixes() {
        for kind in MaskKind::AUTHORED {
            assert!(kind.is_authored());
            assert!(kind.suffix().starts_with('_'));
        }
        assert!(!MaskKind::FloorAlpha.is_authored());
    }

    #[test]
    fn empty_bundle_has_no_textures() {
        let bundle = MaskBundle::empty_for(3);
        assert!(bundle.empty);
        assert_eq!(bundle.floor_index, 3);
        assert!(!bundle.has(MaskKind::Water));
        assert!(bundle.view(MaskKind::Outdoors).is_none());
    }
}
