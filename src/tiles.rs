//! Tile document integration.
//!
//! Classifies tiles into depth bands, tracks overhead-tile hover fades, and
//! answers roof/water-occluder queries for the mask and lighting passes.

use std::collections::HashMap;

use crate::host::{HostEvent, TileDoc};

/// Z offsets of the background/foreground/overhead bands. The bands share
/// the same ground plane; these offsets only order coplanar tiles for depth
/// comparisons, so they must stay exactly as authored.
pub const BAND_Z_OFFSETS: [f32; 3] = [0.01, 0.02, 0.08];

/// Seconds a hover-hidden overhead tile takes to fade out.
pub const HOVER_FADE_SECS: f32 = 2.0;

/// Minimum continuous-render window requested for a hover fade, so the fade
/// completes regardless of idle throttling.
pub const HOVER_CONTINUOUS_SECS: f64 = 2.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileBand {
    Background,
    Foreground,
    Overhead,
}

impl TileBand {
    pub const fn z_offset(self) -> f32 {
        match self {
            Self::Background => BAND_Z_OFFSETS[0],
            Self::Foreground => BAND_Z_OFFSETS[1],
            Self::Overhead => BAND_Z_OFFSETS[2],
        }
    }
}

pub fn classify_band(tile: &TileDoc) -> TileBand {
    if tile.overhead {
        TileBand::Overhead
    } else if tile.elevation > 0.0 {
        TileBand::Foreground
    } else {
        TileBand::Background
    }
}

#[derive(Clone, Copy, Debug)]
struct Fade {
    start_wall: f64,
    from: f32,
    to: f32,
}

/// Per-session tile state the composer owns: hover fades and document cache.
pub struct TileManager {
    docs: HashMap<String, TileDoc>,
    fades: HashMap<String, Fade>,
}

impl TileManager {
    pub fn new() -> Self {
        Self {
            docs: HashMap::new(),
            fades: HashMap::new(),
        }
    }

    /// Refresh the document cache from the host's current tile set.
    pub fn sync(&mut self, tiles: Vec<TileDoc>) {
        self.docs.clear();
        for tile in tiles {
            self.docs.insert(tile.id.clone(), tile);
        }
        self.fades.retain(|id, _| self.docs.contains_key(id));
    }

    pub fn apply_event(&mut self, event: &HostEvent) {
        match event {
            HostEvent::TileDeleted { id, .. } => {
                self.docs.remove(id);
                self.fades.remove(id);
            }
            HostEvent::TileCreated { .. }
            | HostEvent::TileUpdated { .. }
            | HostEvent::FloorsChanged
            | HostEvent::TileHoverHide { .. } => {}
        }
    }

    pub fn doc(&self, id: &str) -> Option<&TileDoc> {
        self.docs.get(id)
    }

    /// Begin fading an overhead tile out for hover-hide.
    pub fn hover_hide(&mut self, id: &str, now_wall: f64) {
        let from = self.opacity(id, now_wall);
        self.fades.insert(
            id.to_string(),
            Fade { start_wall: now_wall, from, to: 0.0 },
        );
    }

    /// Fade the tile back in when the hover ends.
    pub fn hover_show(&mut self, id: &str, now_wall: f64) {
        let from = self.opacity(id, now_wall);
        self.fades.insert(
            id.to_string(),
            Fade { start_wall: now_wall, from, to: 1.0 },
        );
    }

    /// The tile's current fade opacity; 1.0 when no fade is active.
    pub fn opacity(&self, id: &str, now_wall: f64) -> f32 {
        let Some(fade) = self.fades.get(id) else {
            return 1.0;
        };
        let t = ((now_wall - fade.start_wall) as f32 / HOVER_FADE_SECS).clamp(0.0, 1.0);
        fade.from + (fade.to - fade.from) * t
    }

    /// True while any fade is still moving.
    pub fn any_fade_active(&self, now_wall: f64) -> bool {
        self.fades
            .values()
            .any(|f| ((now_wall - f.start_wall) as f32) < HOVER_FADE_SECS)
    }

    /// Drop fades that reached their target opacity.
    pub fn prune_finished_fades(&mut self, now_wall: f64) {
        self.fades
            .retain(|_, f| ((now_wall - f.start_wall) as f32) < HOVER_FADE_SECS || f.to >= 1.0);
    }

    /// Overhead tiles flagged as roofs, used for the roof occlusion layer.
    pub fn roof_tiles(&self) -> impl Iterator<Item = &TileDoc> {
        self.docs
            .values()
            .filter(|t| t.overhead && t.flags.overhead_is_roof)
    }

    /// Tiles that suppress water effects underneath them.
    pub fn water_occluders(&self) -> impl Iterator<Item = &TileDoc> {
        self.docs.values().filter(|t| t.flags.occludes_water)
    }
}

impl Default for TileManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, overhead: bool, elevation: f32) -> TileDoc {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "albedoPath": "maps/a.webp",
            "x": 0.0, "y": 0.0, "width": 10.0, "height": 10.0,
            "elevation": elevation,
            "overhead": overhead,
        }))
        .unwrap()
    }

    #[test]
    fn bands_order_by_z_offset() {
        assert!(TileBand::Background.z_offset() < TileBand::Foreground.z_offset());
        assert!(TileBand::Foreground.z_offset() < TileBand::Overhead.z_offset());
        assert_eq!(classify_band(&doc("a", true, 0.0)), TileBand::Overhead);
        assert_eq!(classify_band(&doc("b", false, 5.0)), TileBand::Foreground);
        assert_eq!(classify_band(&doc("c", false, 0.0)), TileBand::Background);
    }

    #[test]
    fn hover_fade_reaches_zero_within_duration() {
        let mut mgr = TileManager::new();
        mgr.sync(vec![doc("roof", true, 10.0)]);
        mgr.hover_hide("roof", 100.0);

        assert_eq!(mgr.opacity("roof", 100.0), 1.0);
        let half = mgr.opacity("roof", 100.0 + HOVER_FADE_SECS as f64 / 2.0);
        assert!((half - 0.5).abs() < 1e-4);
        assert_eq!(mgr.opacity("roof", 100.0 + HOVER_FADE_SECS as f64), 0.0);
        assert!(mgr.any_fade_active(100.5));
        assert!(!mgr.any_fade_active(100.0 + HOVER_FADE_SECS as f64 + 0.1));
    }

    #[test]
    fn hover_show_fades_back_from_current_opacity() {
        let mut mgr = TileManager::new();
        mgr.sync(vec![doc("roof", true, 10.0)]);
        mgr.hover_hide("roof", 0.0);
        // Halfway out, hover ends.
        mgr.hover_show("roof", 1.0);
        let start = mgr.opacity("roof", 1.0);
        assert!((start - 0.5).abs() < 1e-4);
        assert_eq!(mgr.opacity("roof", 1.0 + HOVER_FADE_SECS as f64), 1.0);
    }

    #[test]
    fn deleted_tiles_lose_their_fade() {
        let mut mgr = TileManager::new();
        mgr.sync(vec![doc("roof", true, 10.0)]);
        mgr.hover_hide("roof", 0.0);
        mgr.apply_event(&HostEvent::TileDeleted { id: "roof".into(), elevation: 10.0 });
        assert!(mgr.doc("roof").is_none());
        assert_eq!(mgr.opacity("roof", 0.5), 1.0);
    }

    #[test]
    fn roof_and_water_occluder_queries_filter_flags() {
        let mut roof = doc("roof", true, 10.0);
        roof.flags.overhead_is_roof = true;
        let mut dock = doc("dock", false, 0.0);
        dock.flags.occludes_water = true;
        let plain = doc("plain", false, 0.0);

        let mut mgr = TileManager::new();
        mgr.sync(vec![roof, dock, plain]);
        assert_eq!(mgr.roof_tiles().count(), 1);
        assert_eq!(mgr.water_occluders().count(), 1);
    }
}
