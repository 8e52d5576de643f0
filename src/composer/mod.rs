//! The effect composer.
//!
//! Owns the effect registry, the time manager, the render target pool, the
//! mask compositor and the floor compositor; drives the whole frame. Frame
//! decisions are planned as data in [`schedule`] and executed in [`frame`]
//! and [`floors`]; registration and lifecycle live here.

mod batch;
mod decimation;
mod floors;
mod frame;
pub(crate) mod passes;
mod schedule;
mod updatables;

pub use batch::{BatchOptions, BatchReport};
pub use decimation::{
    DECIMATION_EMA_ALPHA, DECIMATION_ENTER_MS, DECIMATION_EXIT_MS, DecimationState,
};
pub use frame::FrameTargets;
pub use schedule::{
    ChainBuf, ChainStep, FrameSchedule, ScheduleEntry, build_schedule, build_schedule_into,
    decimation_skips, plan_post_chain,
};
pub use updatables::{Updatable, UpdatableSet};

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use anyhow::{Result, bail};

use crate::effects::{Effect, EffectCtx, EffectDesc, EffectKind, FloorScope, ParamMap};
use crate::floor_v2::FloorCompositorV2;
use crate::frame_state::FrameState;
use crate::gpu::GpuContext;
use crate::host::{ComposerSettings, HostEvents, SceneHost};
use crate::layers::LayerMask;
use crate::masks::{MaskCompositor, MaskKind};
use crate::target_pool::RenderTargetPool;
use crate::tiles::TileManager;
use crate::time::{FrameClock, FrameInfo};

/// The host-side renderer for the world itself (tile sprites, tokens,
/// drawings). The composer decides targets, camera layer masks and clear
/// behaviour; the host draws.
pub trait WorldRenderer {
    fn render_world(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        target_format: wgpu::TextureFormat,
        camera_mask: LayerMask,
        clear: Option<wgpu::Color>,
    ) -> Result<()>;

    /// Capture depth for the active floor (or the whole scene) with the
    /// given layers excluded. Returns `None` when no depth manager is
    /// attached.
    fn capture_depth(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        floor: Option<usize>,
        exclude: LayerMask,
    ) -> Result<Option<wgpu::TextureView>>;
}

pub struct EffectComposer {
    pub(crate) gpu: GpuContext,
    pub(crate) pool: RenderTargetPool,
    pub(crate) passes: passes::ComposerPasses,
    pub(crate) masks: MaskCompositor,
    pub(crate) clock: FrameClock,
    pub(crate) frame_state: FrameState,
    pub(crate) settings: ComposerSettings,
    pub(crate) events: HostEvents,
    pub(crate) effects: Vec<Effect>,
    pub(crate) index_by_id: HashMap<String, usize>,
    /// Reentrancy guard for lazy initialisation.
    initializing: HashSet<String>,
    pub(crate) updatables: UpdatableSet,
    pub(crate) decimation: DecimationState,
    pub(crate) schedule: FrameSchedule,
    pub(crate) entries_scratch: Vec<ScheduleEntry>,
    pub(crate) chain_scratch: Vec<usize>,
    pub(crate) tiles: TileManager,
    pub(crate) floor_v2: Option<FloorCompositorV2>,
    /// (floor, kind) pairs whose composed mask was non-null last time we
    /// looked; drives `on_mask_arrived`.
    pub(crate) present_masks: HashSet<(usize, MaskKind)>,
    pub(crate) mask_subscriptions: HashMap<String, Vec<MaskKind>>,
    pub(crate) depth_debug_enabled: bool,
    /// Wall-elapsed deadline of the current continuous-render window.
    pub(crate) continuous_until: f64,
    pub(crate) last_info: Option<FrameInfo>,
    pub(crate) frame_started: Option<Instant>,
    pub(crate) order_dirty: bool,
    pub(crate) disposed: bool,
}

impl EffectComposer {
    pub fn new(gpu: GpuContext, host: &dyn SceneHost) -> Self {
        let settings = ComposerSettings::from_host(host);
        let pool = RenderTargetPool::new(&gpu);
        let passes = passes::ComposerPasses::new(&gpu);
        let masks = MaskCompositor::new(&gpu);
        Self {
            gpu,
            pool,
            passes,
            masks,
            clock: FrameClock::new(),
            frame_state: FrameState::default(),
            settings,
            events: HostEvents::new(),
            effects: Vec::new(),
            index_by_id: HashMap::new(),
            initializing: HashSet::new(),
            updatables: UpdatableSet::new(),
            decimation: DecimationState::new(),
            schedule: FrameSchedule::default(),
            entries_scratch: Vec::new(),
            chain_scratch: Vec::new(),
            tiles: TileManager::new(),
            floor_v2: None,
            present_masks: HashSet::new(),
            mask_subscriptions: HashMap::new(),
            depth_debug_enabled: false,
            continuous_until: 0.0,
            last_info: None,
            frame_started: None,
            order_dirty: true,
            disposed: false,
        }
    }

    pub fn events(&self) -> &HostEvents {
        &self.events
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub fn settings(&self) -> ComposerSettings {
        self.settings
    }

    pub fn decimation(&self) -> &DecimationState {
        &self.decimation
    }

    pub fn tiles(&self) -> &TileManager {
        &self.tiles
    }

    pub fn set_depth_debug(&mut self, enabled: bool) {
        self.depth_debug_enabled = enabled;
    }

    pub fn set_time_scale(&mut self, scale: f32) {
        self.clock.set_scale(scale);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    // --- registry -----------------------------------------------------------

    /// Register and initialise a single effect. Returns `Ok(false)` when the
    /// effect was skipped (tier mismatch or init failure); duplicates are an
    /// error.
    pub fn register_effect(
        &mut self,
        host: &dyn SceneHost,
        desc: EffectDesc,
        kind: EffectKind,
    ) -> Result<bool> {
        if self.disposed {
            bail!("composer is disposed");
        }
        if self.index_by_id.contains_key(&desc.id) {
            bail!("effect '{}' is already registered", desc.id);
        }
        if !self.settings.gpu_tier.supports(desc.required_tier) {
            eprintln!(
                "[composer] skipping effect '{}': requires {:?}, gpu tier is {:?}",
                desc.id, desc.required_tier, self.settings.gpu_tier
            );
            return Ok(false);
        }

        let mut effect = Effect::new(&desc, kind);
        let output_format = self.pool.color_format();
        let init_result = {
            let mut ctx = EffectCtx {
                gpu: &self.gpu,
                host,
                pool: &mut self.pool,
                frame_state: &self.frame_state,
                output_format,
            };
            effect.initialize(&mut ctx)
        };
        if let Err(e) = init_result {
            eprintln!("[composer] effect '{}' failed to initialize: {e:#}", desc.id);
            return Ok(false);
        }

        self.insert_effect(desc, effect);
        Ok(true)
    }

    pub(crate) fn insert_effect(&mut self, desc: EffectDesc, effect: Effect) {
        let index = self.effects.len();
        self.index_by_id.insert(desc.id.clone(), index);
        if !desc.mask_subscriptions.is_empty() {
            self.mask_subscriptions
                .insert(desc.id.clone(), desc.mask_subscriptions.clone());
        }
        self.effects.push(effect);
        self.invalidate_render_order();
    }

    /// Idempotent lazy initialisation. Returns true when this call performed
    /// the initialisation; false when nothing was pending (or another call
    /// is already doing it). A failure leaves the pending flag set so a
    /// retry is possible.
    pub fn ensure_effect_initialized(&mut self, host: &dyn SceneHost, id: &str) -> Result<bool> {
        let Some(&index) = self.index_by_id.get(id) else {
            bail!("unknown effect '{id}'");
        };
        if !self.effects[index].header.lazy_init_pending {
            return Ok(false);
        }
        if !self.initializing.insert(id.to_string()) {
            return Ok(false);
        }

        let output_format = self.pool.color_format();
        let result = {
            let Self { effects, gpu, pool, frame_state, .. } = self;
            let mut ctx = EffectCtx {
                gpu,
                host,
                pool,
                frame_state,
                output_format,
            };
            effects[index].initialize(&mut ctx)
        };
        self.initializing.remove(id);

        match result {
            Ok(()) => {
                let header = &mut self.effects[index].header;
                header.lazy_init_pending = false;
                header.enabled = true;
                self.invalidate_render_order();
                Ok(true)
            }
            Err(e) => {
                // Pending stays set; the next ensure call retries.
                Err(e.context(format!("lazy init of effect '{id}' failed")))
            }
        }
    }

    /// Dispose and remove an effect.
    pub fn unregister_effect(&mut self, id: &str) -> bool {
        let Some(&index) = self.index_by_id.get(id) else {
            return false;
        };
        self.effects[index].dispose();
        self.effects.remove(index);
        self.mask_subscriptions.remove(id);
        self.index_by_id.clear();
        for (i, effect) in self.effects.iter().enumerate() {
            self.index_by_id.insert(effect.header.id().to_string(), i);
        }
        self.invalidate_render_order();
        true
    }

    pub fn set_effect_enabled(&mut self, id: &str, enabled: bool) -> bool {
        let Some(&index) = self.index_by_id.get(id) else {
            return false;
        };
        self.effects[index].header.enabled = enabled;
        self.invalidate_render_order();
        true
    }

    /// Merge parameters into an effect and notify it.
    pub fn set_effect_params(&mut self, id: &str, params: ParamMap) -> bool {
        let Some(&index) = self.index_by_id.get(id) else {
            return false;
        };
        let effect = &mut self.effects[index];
        effect.header.params.extend(params);
        effect.params_changed();
        true
    }

    pub fn effect_header(&self, id: &str) -> Option<&crate::effects::EffectHeader> {
        self.index_by_id.get(id).map(|&i| &self.effects[i].header)
    }

    pub fn effect_ids(&self) -> Vec<String> {
        self.effects
            .iter()
            .map(|e| e.header.id().to_string())
            .collect()
    }

    /// Mutation of the registry during a frame is forbidden; this only marks
    /// the cached order dirty for the next frame.
    pub fn invalidate_render_order(&mut self) {
        self.order_dirty = true;
    }

    pub fn render_order_dirty(&self) -> bool {
        self.order_dirty
    }

    // --- updatables ---------------------------------------------------------

    pub fn register_updatable(
        &mut self,
        id: impl Into<String>,
        update_hz: Option<f32>,
        essential: bool,
        updatable: Box<dyn Updatable>,
    ) -> bool {
        let v2_active = self.floor_v2.is_some();
        self.updatables
            .register(id, update_hz, essential, updatable, v2_active)
    }

    pub fn remove_updatable(&mut self, id: &str) -> bool {
        self.updatables.remove(id)
    }

    // --- continuous render --------------------------------------------------

    /// Keep rendering for at least this many seconds from now, bypassing any
    /// idle FPS cap. Used by overhead-tile fades.
    pub fn request_continuous_render(&mut self, seconds: f64) {
        let now = self.last_info.map(|i| i.wall_elapsed).unwrap_or(0.0);
        self.continuous_until = self.continuous_until.max(now + seconds);
    }

    /// True when any active effect needs continuous rendering, when the V2
    /// compositor requests it, or while a requested window is open.
    pub fn wants_continuous_render(&self) -> bool {
        let now = self.last_info.map(|i| i.wall_elapsed).unwrap_or(0.0);
        if now < self.continuous_until {
            return true;
        }
        if self
            .floor_v2
            .as_ref()
            .is_some_and(|v2| v2.wants_continuous_render())
        {
            return true;
        }
        self.effects.iter().any(|e| {
            e.header.requires_continuous_render && e.header.is_active() && e.has_visible_work()
        })
    }

    // --- lifecycle ----------------------------------------------------------

    pub fn dispose(&mut self) {
        for effect in &mut self.effects {
            effect.dispose();
        }
        self.effects.clear();
        self.index_by_id.clear();
        self.mask_subscriptions.clear();
        self.pool.dispose();
        self.disposed = true;
    }

    // --- internals shared by frame/floors/batch -----------------------------

    /// Snapshot the registry into schedule entries.
    pub(crate) fn rebuild_entries(&mut self) {
        self.entries_scratch.clear();
        for (i, effect) in self.effects.iter().enumerate() {
            let h = &effect.header;
            self.entries_scratch.push(ScheduleEntry {
                index: i,
                layer_order: h.layer().order(),
                priority: h.priority,
                is_post: h.layer().is_post(),
                required_tier: h.required_tier,
                always_render: h.always_render,
                no_frame_skip: h.no_frame_skip,
                floor_scope_global: h.floor_scope() == FloorScope::Global,
                active: h.is_active() && effect.has_visible_work(),
            });
        }
        self.order_dirty = false;
    }
}

/// Record a runtime failure: disable the effect for the session and notify
/// the user exactly once.
pub(crate) fn note_effect_error(
    effect: &mut Effect,
    host: &dyn SceneHost,
    phase: &str,
    err: anyhow::Error,
) {
    eprintln!(
        "[composer] effect '{}' failed during {phase}: {err:#}",
        effect.header.id()
    );
    effect.mark_errored(format!("{err:#}"));
    if !effect.header.error_notified {
        effect.header.error_notified = true;
        host.notify_warning(&format!(
            "Visual effect '{}' was disabled after an error.",
            effect.header.id()
        ));
    }
}
