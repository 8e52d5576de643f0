//! The `SceneHost` boundary.
//!
//! The compositor never reaches into globals; everything it needs from the
//! surrounding map application — scene geometry, tile documents, environment
//! state, assets, settings — arrives through this trait, threaded to every
//! subsystem on construction.

use std::collections::HashMap;

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::{Deserialize, Serialize};

/// GPU capability tier reported by the host. Effects declare a required tier
/// and are skipped at registration when the detected tier is below it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuTier {
    Low,
    Medium,
    High,
}

impl GpuTier {
    pub const fn level(self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    pub const fn supports(self, required: Self) -> bool {
        self.level() >= required.level()
    }
}

/// How a texture will be consumed. Albedo textures decode as colour (sRGB,
/// flipped, mipmapped); authored masks are raw data and must never be
/// colour-decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureRole {
    Albedo,
    DataMask,
}

/// Tri-state per-tile override for optional behaviours like specular masks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriState {
    #[default]
    Auto,
    On,
    Off,
}

/// Persisted per-tile flags consumed read-only by the compositor.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TileFlags {
    pub bypass_effects: bool,
    pub overhead_is_roof: bool,
    pub occludes_water: bool,
    pub enable_specular: TriState,
    pub cloud_shadows_enabled: bool,
    pub cloud_tops_enabled: bool,
    pub range_bottom: f32,
    pub range_top: f32,
}

/// A tile document as the host persists it. World-space rect plus the
/// transform parts that matter for mask composition.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileDoc {
    pub id: String,
    /// Path or URL of the tile's albedo image. Mask siblings derive from it.
    pub albedo_path: String,
    /// World-space rect: top-left corner and size before rotation.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Rotation about the rect centre, degrees.
    #[serde(default)]
    pub rotation: f32,
    /// Signed scale; negative values mirror the tile.
    #[serde(default = "one")]
    pub scale_x: f32,
    #[serde(default = "one")]
    pub scale_y: f32,
    #[serde(default = "one")]
    pub alpha: f32,
    /// Host sort key; draw order within a floor is (sort asc, id asc).
    #[serde(default)]
    pub sort: i32,
    pub elevation: f32,
    /// True for tiles drawn above tokens (roofs, canopies).
    #[serde(default)]
    pub overhead: bool,
    #[serde(default)]
    pub flags: TileFlags,
}

fn one() -> f32 {
    1.0
}

impl TileDoc {
    pub fn center(&self) -> [f32; 2] {
        [self.x + self.width * 0.5, self.y + self.height * 0.5]
    }
}

/// A wall segment; used as an occluder when composing structure masks.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WallDoc {
    pub id: String,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Walls above this elevation do not occlude the floor below.
    #[serde(default)]
    pub elevation: f32,
}

/// A logical vertical slice of the scene. Floors are ordered bottom→top and
/// floor 0 is the ground floor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Floor {
    pub index: usize,
    /// Elevation range `[bottom, top)`.
    pub bottom: f32,
    pub top: f32,
}

impl Floor {
    pub fn contains_elevation(&self, elevation: f32) -> bool {
        elevation >= self.bottom && elevation < self.top
    }
}

/// Camera snapshot taken once per frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CameraSnapshot {
    /// World-space centre of the view.
    pub center: [f32; 2],
    pub zoom: f32,
    pub rotation: f32,
}

/// Well-known setting keys read through [`SceneHost::setting`].
pub mod settings {
    pub const EXPERIMENTAL_FLOOR_RENDERING: &str = "experimentalFloorRendering";
    pub const USE_COMPOSITOR_V2: &str = "useCompositorV2";
    pub const GPU_TIER: &str = "gpuTier";
    pub const RENDER_ADAPTIVE_DECIMATION: &str = "renderAdaptiveDecimation";
}

/// Typed view over the settings the compositor cares about, resolved once per
/// construction (never read inside a frame).
#[derive(Clone, Copy, Debug)]
pub struct ComposerSettings {
    pub experimental_floor_rendering: bool,
    pub use_compositor_v2: bool,
    pub gpu_tier: GpuTier,
    pub adaptive_decimation: bool,
}

impl ComposerSettings {
    pub fn from_host(host: &dyn SceneHost) -> Self {
        let bool_setting = |key: &str, default: bool| -> bool {
            host.setting(key)
                .and_then(|v| v.as_bool())
                .unwrap_or(default)
        };
        let gpu_tier = host
            .setting(settings::GPU_TIER)
            .and_then(|v| serde_json::from_value::<GpuTier>(v).ok())
            .unwrap_or(GpuTier::Medium);
        Self {
            experimental_floor_rendering: bool_setting(
                settings::EXPERIMENTAL_FLOOR_RENDERING,
                false,
            ),
            use_compositor_v2: bool_setting(settings::USE_COMPOSITOR_V2, false),
            gpu_tier,
            adaptive_decimation: bool_setting(settings::RENDER_ADAPTIVE_DECIMATION, true),
        }
    }
}

/// Everything the compositor consumes from the surrounding application.
pub trait SceneHost {
    // --- scene geometry -----------------------------------------------------

    fn visible_floors(&self) -> Vec<Floor>;
    /// Make the given floor's tiles solely visible (legacy isolation path).
    fn set_floor_visible(&self, index: usize);
    /// Undo any visibility narrowing done by [`Self::set_floor_visible`].
    fn restore_visibility(&self);
    fn tiles(&self) -> Vec<TileDoc>;
    fn walls(&self) -> Vec<WallDoc>;
    fn camera(&self) -> CameraSnapshot;
    /// Physical pixels of the drawing buffer; render targets match this.
    fn drawing_buffer_size(&self) -> [u32; 2];
    /// Logical canvas size in CSS-ish units (may differ under DPI scaling).
    fn canvas_dimensions(&self) -> [f32; 2];
    /// World-space rect covered by the scene, for mask composition.
    fn scene_rect(&self) -> [f32; 4];

    // --- environment state --------------------------------------------------

    fn darkness_level(&self) -> f32;
    /// Hour of day in `0..24`.
    fn time_of_day(&self) -> f32;
    fn wind_speed(&self) -> f32;
    fn wind_direction(&self) -> f32;
    fn roof_mask_intensity(&self, u: f32, v: f32) -> f32;

    // --- assets -------------------------------------------------------------

    /// Load and decode a texture. The role decides colour handling; see
    /// [`TextureRole`].
    fn load_texture(&self, url: &str, role: TextureRole) -> Result<image::DynamicImage>;
    /// List the file names present in a directory. Mask probing confirms
    /// candidates against this listing and never issues speculative fetches.
    fn list_directory_files(&self, dir: &str) -> Result<Vec<String>>;

    // --- settings & notifications -------------------------------------------

    fn setting(&self, key: &str) -> Option<serde_json::Value>;
    /// Single-effect-error banner. The composer guarantees at most one call
    /// per effect per session.
    fn notify_warning(&self, message: &str);

    // --- parameter persistence (read-only) ----------------------------------

    /// Current UI parameter snapshot per effect id, for V2 replay.
    fn ui_parameter_snapshot(&self) -> HashMap<String, serde_json::Value> {
        HashMap::new()
    }
    /// Scene-persisted parameter flags per effect id. Only parameters that
    /// were actually persisted appear here; UI schema defaults do not.
    fn persisted_effect_flags(&self) -> HashMap<String, serde_json::Value> {
        HashMap::new()
    }
}

/// Change notifications from the host. Drained at frame start; never applied
/// mid-frame.
#[derive(Clone, Debug, PartialEq)]
pub enum HostEvent {
    TileCreated { id: String, elevation: f32 },
    TileUpdated { id: String, elevation: f32, mask_relevant: bool },
    TileDeleted { id: String, elevation: f32 },
    FloorsChanged,
    TileHoverHide { id: String },
}

/// Channel pair for host→compositor events. The sender side is handed to the
/// host's document hooks; the compositor drains the receiver once per frame.
pub struct HostEvents {
    tx: Sender<HostEvent>,
    rx: Receiver<HostEvent>,
}

impl HostEvents {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> Sender<HostEvent> {
        self.tx.clone()
    }

    /// Drain everything queued since the last frame.
    pub fn drain(&self) -> Vec<HostEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Default for HostEvents {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_tier_ordering_matches_levels() {
        assert!(GpuTier::High.supports(GpuTier::Low));
        assert!(GpuTier::Medium.supports(GpuTier::Medium));
        assert!(!GpuTier::Low.supports(GpuTier::Medium));
        assert!(GpuTier::Low < GpuTier::High);
    }

    #[test]
    fn tile_doc_deserializes_with_defaults() {
        let doc: TileDoc = serde_json::from_str(
            r#"{"id":"t1","albedoPath":"maps/tavern.webp","x":0,"y":0,
                "width":400,"height":300,"elevation":0}"#,
        )
        .unwrap();
        assert_eq!(doc.scale_x, 1.0);
        assert_eq!(doc.alpha, 1.0);
        assert_eq!(doc.flags.enable_specular, TriState::Auto);
        assert!(!doc.flags.bypass_effects);
        assert_eq!(doc.center(), [200.0, 150.0]);
    }

    #[test]
    fn tri_state_round_trips_lowercase() {
        let v: TriState = serde_json::from_str("\"on\"").unwrap();
        assert_eq!(v, TriState::On);
        assert_eq!(serde_json::to_string(&TriState::Auto).unwrap(), "\"auto\"");
    }

    #[test]
    fn floor_elevation_range_is_half_open() {
        let floor = Floor { index: 0, bottom: 0.0, top: 10.0 };
        assert!(floor.contains_elevation(0.0));
        assert!(floor.contains_elevation(9.99));
        assert!(!floor.contains_elevation(10.0));
    }

    #[test]
    fn host_events_drain_in_order() {
        let events = HostEvents::new();
        let tx = events.sender();
        tx.send(HostEvent::FloorsChanged).unwrap();
        tx.send(HostEvent::TileDeleted { id: "t".into(), elevation: 0.0 })
            .unwrap();
        let drained = events.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0], HostEvent::FloorsChanged);
        assert!(events.drain().is_empty());
    }
}
