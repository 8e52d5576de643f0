//! Camera layers and effect layer classification.
//!
//! Floors, the overlay, and feature layers are bit positions in a camera
//! layer mask. Everything that switches visibility does so by swapping a
//! `LayerMask`, never by mutating object visibility flags mid-frame.

use std::fmt;

/// Highest floor index that can hold a dedicated camera layer bit.
pub const MAX_FLOOR_LAYERS: usize = 19;

/// Named camera-layer bitset.
///
/// Bit 0 is the global scene, bits 1..=19 are floors, bit 20 is the overlay,
/// bit 21 the depth-debug visualiser. The remaining bits are free for host
/// feature layers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LayerMask(u32);

impl LayerMask {
    pub const NONE: Self = Self(0);
    pub const GLOBAL_SCENE: Self = Self(1 << 0);
    pub const OVERLAY: Self = Self(1 << 20);
    pub const DEPTH_DEBUG: Self = Self(1 << 21);

    /// Every bit set; the default camera mask before any pass narrows it.
    pub const ALL: Self = Self(u32::MAX);

    /// The dedicated layer for a floor index. Floors beyond
    /// [`MAX_FLOOR_LAYERS`] share the last bit; the V2 compositor refuses to
    /// activate in that case rather than silently merging floors.
    pub fn floor(index: usize) -> Self {
        let bit = 1 + index.min(MAX_FLOOR_LAYERS - 1);
        Self(1 << bit)
    }

    /// Union of every floor bit.
    pub fn all_floors() -> Self {
        let mut mask = 0u32;
        for i in 0..MAX_FLOOR_LAYERS {
            mask |= 1 << (1 + i);
        }
        Self(mask)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn intersect(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for LayerMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LayerMask({:#010x})", self.0)
    }
}

/// Classified render layers, strictly ordered. Scene effects are everything
/// below `PostProcessing`; post effects are `PostProcessing` and up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EffectLayer {
    Base,
    Material,
    SurfaceEffects,
    Particles,
    Environmental,
    PostProcessing,
}

impl EffectLayer {
    /// Strictly increasing numeric order used for the render sort.
    pub const fn order(self) -> u8 {
        match self {
            Self::Base => 0,
            Self::Material => 10,
            Self::SurfaceEffects => 20,
            Self::Particles => 30,
            Self::Environmental => 40,
            Self::PostProcessing => 50,
        }
    }

    pub const fn is_post(self) -> bool {
        self.order() >= Self::PostProcessing.order()
    }
}

impl PartialOrd for EffectLayer {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EffectLayer {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.order().cmp(&other.order())
    }
}
