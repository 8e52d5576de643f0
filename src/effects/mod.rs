//! The effect contract.
//!
//! Effects are tagged variants over a shared header: a world-mesh effect, a
//! fullscreen post-process effect, or a particle effect. The composer owns
//! every registered effect and dispatches on the tag; effects own their GPU
//! resources and must release them in `dispose`.

mod params;
mod particle;
mod post_process;
mod scene_mesh;

pub mod builtin;

pub use params::{ParamMap, param_bool, param_f32, param_str};
pub use particle::ParticleEffect;
pub use post_process::PostProcessEffect;
pub use scene_mesh::{AssetBundle, BasePlane, SceneMeshEffect};

use anyhow::Result;

use crate::frame_state::FrameState;
use crate::gpu::GpuContext;
use crate::host::{GpuTier, SceneHost};
use crate::layers::EffectLayer;
use crate::masks::{MaskBundle, MaskKind};
use crate::target_pool::RenderTargetPool;
use crate::time::FrameInfo;

/// Whether an effect's output applies per floor or once to the accumulated
/// image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FloorScope {
    #[default]
    Floor,
    Global,
}

/// Lifecycle state. `enabled` toggles within `Renderable` without leaving
/// the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectState {
    /// In the registry, not yet initialised (or deferred for lazy init).
    Registered,
    /// Initialised successfully; renders when enabled.
    Renderable,
    /// A runtime failure disabled it for the rest of the session.
    Errored,
    Disposed,
}

/// Construction-time description of an effect.
#[derive(Clone, Debug)]
pub struct EffectDesc {
    pub id: String,
    pub layer: EffectLayer,
    pub priority: i32,
    pub required_tier: GpuTier,
    pub floor_scope: FloorScope,
    pub enabled: bool,
    pub always_render: bool,
    pub no_frame_skip: bool,
    pub requires_continuous_render: bool,
    /// Mask kinds whose arrival this effect wants to hear about; a lazy
    /// effect is initialised when a subscribed mask first becomes non-null.
    pub mask_subscriptions: Vec<MaskKind>,
}

impl EffectDesc {
    pub fn new(id: impl Into<String>, layer: EffectLayer) -> Self {
        Self {
            id: id.into(),
            layer,
            priority: 0,
            required_tier: GpuTier::Low,
            floor_scope: FloorScope::Floor,
            enabled: true,
            always_render: false,
            no_frame_skip: false,
            requires_continuous_render: false,
            mask_subscriptions: Vec::new(),
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn required_tier(mut self, tier: GpuTier) -> Self {
        self.required_tier = tier;
        self
    }

    pub fn floor_scope(mut self, scope: FloorScope) -> Self {
        self.floor_scope = scope;
        self
    }

    pub fn always_render(mut self, v: bool) -> Self {
        self.always_render = v;
        self
    }

    pub fn no_frame_skip(mut self, v: bool) -> Self {
        self.no_frame_skip = v;
        self
    }

    pub fn continuous_render(mut self, v: bool) -> Self {
        self.requires_continuous_render = v;
        self
    }

    pub fn subscribe_mask(mut self, kind: MaskKind) -> Self {
        self.mask_subscriptions.push(kind);
        self
    }
}

/// Shared header fields. `id`, `layer` and `floor_scope` are fixed at
/// registration; the rest may change over the effect's life.
#[derive(Debug)]
pub struct EffectHeader {
    id: String,
    layer: EffectLayer,
    floor_scope: FloorScope,
    pub priority: i32,
    pub required_tier: GpuTier,
    pub enabled: bool,
    pub always_render: bool,
    pub no_frame_skip: bool,
    pub requires_continuous_render: bool,
    pub params: ParamMap,
    pub(crate) state: EffectState,
    pub(crate) lazy_init_pending: bool,
    pub(crate) error_state: Option<String>,
    pub(crate) error_notified: bool,
}

impl EffectHeader {
    pub(crate) fn from_desc(desc: &EffectDesc) -> Self {
        Self {
            id: desc.id.clone(),
            layer: desc.layer,
            floor_scope: desc.floor_scope,
            priority: desc.priority,
            required_tier: desc.required_tier,
            enabled: desc.enabled,
            always_render: desc.always_render,
            no_frame_skip: desc.no_frame_skip,
            requires_continuous_render: desc.requires_continuous_render,
            params: ParamMap::new(),
            state: EffectState::Registered,
            lazy_init_pending: false,
            error_state: None,
            error_notified: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn layer(&self) -> EffectLayer {
        self.layer
    }

    pub fn floor_scope(&self) -> FloorScope {
        self.floor_scope
    }

    pub fn state(&self) -> EffectState {
        self.state
    }

    pub fn error_state(&self) -> Option<&str> {
        self.error_state.as_deref()
    }

    pub fn is_lazy_pending(&self) -> bool {
        self.lazy_init_pending
    }

    /// Renderable and enabled.
    pub fn is_active(&self) -> bool {
        self.enabled && self.state == EffectState::Renderable
    }
}

/// Everything an effect may touch during a lifecycle call. Rebuilt on the
/// stack per call; holds no ownership.
pub struct EffectCtx<'a> {
    pub gpu: &'a GpuContext,
    pub host: &'a dyn SceneHost,
    pub pool: &'a mut RenderTargetPool,
    pub frame_state: &'a FrameState,
    /// Format of the target the next `render` call will draw into.
    pub output_format: wgpu::TextureFormat,
}

/// The tagged behaviour variants.
pub enum EffectKind {
    SceneMesh(Box<dyn SceneMeshEffect>),
    PostProcess(Box<dyn PostProcessEffect>),
    Particle(Box<dyn ParticleEffect>),
}

impl EffectKind {
    pub fn is_post_capable(&self) -> bool {
        matches!(self, Self::PostProcess(_))
    }
}

/// A registered effect: shared header plus tagged behaviour.
pub struct Effect {
    pub header: EffectHeader,
    pub kind: EffectKind,
}

impl Effect {
    pub(crate) fn new(desc: &EffectDesc, kind: EffectKind) -> Self {
        let mut header = EffectHeader::from_desc(desc);
        // Particle effects default to continuous rendering; is_active gates
        // the actual cost to floors with visible emitters.
        if matches!(kind, EffectKind::Particle(_)) {
            header.requires_continuous_render = true;
        }
        Self { header, kind }
    }

    /// Run the variant's initialisation chain. On success the effect becomes
    /// renderable.
    pub(crate) fn initialize(&mut self, ctx: &mut EffectCtx<'_>) -> Result<()> {
        match &mut self.kind {
            EffectKind::SceneMesh(e) => {
                e.on_initialize(ctx)?;
                let base = BasePlane { rect: ctx.host.scene_rect(), z: 0.0 };
                e.on_base_mesh_set(&base, &AssetBundle::default());
                e.create_mesh(ctx)?;
                e.create_shadow_resources(ctx)?;
            }
            EffectKind::PostProcess(e) => e.create_material(ctx)?,
            EffectKind::Particle(e) => e.create_particle_systems(ctx)?,
        }
        self.header.state = EffectState::Renderable;
        Ok(())
    }

    pub(crate) fn prepare_frame(&mut self, info: &FrameInfo, ctx: &mut EffectCtx<'_>) -> Result<()> {
        match &mut self.kind {
            EffectKind::SceneMesh(e) => e.prepare_frame(info, ctx),
            EffectKind::PostProcess(e) => e.prepare_frame(info, ctx),
            EffectKind::Particle(e) => e.prepare_frame(info, ctx),
        }
    }

    pub(crate) fn update(&mut self, info: &FrameInfo, ctx: &mut EffectCtx<'_>) -> Result<()> {
        match &mut self.kind {
            EffectKind::SceneMesh(e) => e.on_update(info, ctx),
            EffectKind::PostProcess(e) => e.on_update(info, ctx),
            EffectKind::Particle(e) => e.on_update(info, ctx),
        }
    }

    pub(crate) fn render(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        ctx: &mut EffectCtx<'_>,
    ) -> Result<()> {
        match &mut self.kind {
            EffectKind::SceneMesh(e) => e.render(encoder, target, ctx),
            EffectKind::PostProcess(e) => e.render(encoder, target, ctx),
            EffectKind::Particle(e) => e.render(encoder, target, ctx),
        }
    }

    pub(crate) fn bind_floor_masks(&mut self, bundle: &MaskBundle, floor_key: usize) {
        match &mut self.kind {
            EffectKind::SceneMesh(e) => e.bind_floor_masks(bundle, floor_key),
            EffectKind::PostProcess(e) => e.bind_floor_masks(bundle, floor_key),
            EffectKind::Particle(e) => e.bind_floor_masks(bundle, floor_key),
        }
    }

    pub(crate) fn on_mask_arrived(&mut self, kind: MaskKind, view: &wgpu::TextureView) {
        match &mut self.kind {
            EffectKind::SceneMesh(e) => e.on_mask_arrived(kind, view),
            EffectKind::PostProcess(e) => e.on_mask_arrived(kind, view),
            EffectKind::Particle(e) => e.on_mask_arrived(kind, view),
        }
    }

    pub(crate) fn params_changed(&mut self) {
        let params = self.header.params.clone();
        match &mut self.kind {
            EffectKind::SceneMesh(e) => e.params_changed(&params),
            EffectKind::PostProcess(e) => e.params_changed(&params),
            EffectKind::Particle(e) => e.params_changed(&params),
        }
    }

    /// Particle effects are active only while an emitter is visible; other
    /// kinds are active whenever enabled.
    pub(crate) fn has_visible_work(&self) -> bool {
        match &self.kind {
            EffectKind::Particle(e) => e.is_active(),
            _ => true,
        }
    }

    pub(crate) fn dispose(&mut self) {
        match &mut self.kind {
            EffectKind::SceneMesh(e) => e.dispose(),
            EffectKind::PostProcess(e) => e.dispose(),
            EffectKind::Particle(e) => e.dispose(),
        }
        self.header.state = EffectState::Disposed;
        self.header.enabled = false;
    }

    /// Record a runtime failure: disable for the rest of the session and
    /// remember the message for the one-shot user notification.
    pub(crate) fn mark_errored(&mut self, message: String) {
        self.header.enabled = false;
        self.header.state = EffectState::Errored;
        self.header.error_state = Some(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullPost;
    impl PostProcessEffect for NullPost {
        fn create_material(&mut self, _ctx: &mut EffectCtx<'_>) -> Result<()> {
            Ok(())
        }
        fn set_input_texture(&mut self, _view: wgpu::TextureView) {}
        fn set_buffers(
            &mut self,
            _read: crate::target_pool::TargetName,
            _write: Option<crate::target_pool::TargetName>,
        ) {
        }
        fn set_render_to_screen(&mut self, _to_screen: bool) {}
        fn render(
            &mut self,
            _encoder: &mut wgpu::CommandEncoder,
            _target: &wgpu::TextureView,
            _ctx: &mut EffectCtx<'_>,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn desc_builder_and_header_defaults() {
        let desc = EffectDesc::new("bloom", EffectLayer::PostProcessing)
            .priority(10)
            .required_tier(GpuTier::Medium)
            .floor_scope(FloorScope::Global)
            .always_render(true);
        let effect = Effect::new(&desc, EffectKind::PostProcess(Box::new(NullPost)));
        assert_eq!(effect.header.id(), "bloom");
        assert_eq!(effect.header.layer(), EffectLayer::PostProcessing);
        assert_eq!(effect.header.floor_scope(), FloorScope::Global);
        assert_eq!(effect.header.state(), EffectState::Registered);
        assert!(effect.header.always_render);
        assert!(!effect.header.is_active());
    }

    #[test]
    fn errored_effect_is_disabled_and_keeps_message() {
        let desc = EffectDesc::new("water", EffectLayer::SurfaceEffects);
        let mut effect = Effect::new(&desc, EffectKind::PostProcess(Box::new(NullPost)));
        effect.header.state = EffectState::Renderable;
        assert!(effect.header.is_active());
        effect.mark_errored("shader blew up".into());
        assert!(!effect.header.is_active());
        assert_eq!(effect.header.state(), EffectState::Errored);
        assert_eq!(effect.header.error_state(), Some("shader blew up"));
    }

    #[test]
    fn dispose_moves_to_terminal_state() {
        let desc = EffectDesc::new("fog", EffectLayer::Environmental);
        let mut effect = Effect::new(&desc, EffectKind::PostProcess(Box::new(NullPost)));
        effect.dispose();
        assert_eq!(effect.header.state(), EffectState::Disposed);
        assert!(!effect.header.is_active());
    }
}
