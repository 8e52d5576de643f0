//! Layered effect compositor for 2.5-D tile maps.
//!
//! The crate drives an ordered set of visual effects across classified render
//! layers, isolates each logical floor of a multi-storey scene into its own
//! render target, composites the floors bottom-to-top with premultiplied
//! alpha, and routes per-tile authored masks (outdoors/water/specular/...)
//! through a scene-wide mask compositor that feeds effect shaders.
//!
//! Module map:
//! - `time`: monotonic frame clock with pauseable time scale
//! - `frame_state`: per-frame camera/viewport snapshot
//! - `layers`: named camera-layer bitset and effect layer classification
//! - `host`: the `SceneHost` boundary (tiles, floors, settings, assets)
//! - `gpu`: device/queue context, fullscreen pipelines, headless setup
//! - `wgsl`: shader sources for the compositor's own passes
//! - `target_pool`: named, resize-tracked HDR render targets
//! - `masks`: per-floor mask resolution, composition and CPU readback
//! - `effects`: the effect contract (scene-mesh / post-process / particle)
//! - `composer`: registry, scheduler, per-floor loop, post chain, decimation
//! - `floor_v2`: camera-layer-mask floor isolation (alternate path)
//! - `tiles` / `walls`: tile and wall document integration
//! - `overlay`: fixed overlay and depth-debug tail passes
//! - `warmup`: progressive shader warmup

pub mod composer;
pub mod effects;
pub mod floor_v2;
pub mod frame_state;
pub mod gpu;
pub mod host;
pub mod layers;
pub mod masks;
pub mod overlay;
pub mod target_pool;
pub mod tiles;
pub mod time;
pub mod walls;
pub mod warmup;
pub mod wgsl;

pub use composer::EffectComposer;
pub use effects::{Effect, EffectDesc, FloorScope};
pub use host::{GpuTier, SceneHost};
pub use time::{FrameClock, FrameInfo};
