//! Particle effects.
//!
//! A particle effect owns one or more particle systems whose emitters spawn
//! against the CPU pixel buffers of composed masks (rain only outdoors,
//! spray only over water). Particle effects default to requesting
//! continuous rendering while any emitter is visible; the composer queries
//! [`ParticleEffect::is_active`] to decide.

use anyhow::Result;

use crate::effects::{EffectCtx, ParamMap};
use crate::masks::{MaskBundle, MaskKind};
use crate::time::FrameInfo;

pub trait ParticleEffect {
    /// Build the particle systems. Required.
    fn create_particle_systems(&mut self, ctx: &mut EffectCtx<'_>) -> Result<()>;

    /// True iff at least one system has a visible emitter.
    fn is_active(&self) -> bool;

    /// Once per frame; advance particle lifetimes here so simulation speed
    /// is independent of floor count.
    fn prepare_frame(&mut self, _info: &FrameInfo, _ctx: &mut EffectCtx<'_>) -> Result<()> {
        Ok(())
    }

    /// Once per floor. Must not integrate time.
    fn on_update(&mut self, _info: &FrameInfo, _ctx: &mut EffectCtx<'_>) -> Result<()> {
        Ok(())
    }

    fn render(
        &mut self,
        _encoder: &mut wgpu::CommandEncoder,
        _target: &wgpu::TextureView,
        _ctx: &mut EffectCtx<'_>,
    ) -> Result<()> {
        Ok(())
    }

    /// Spawn-mask bindings for the current floor.
    fn bind_floor_masks(&mut self, _bundle: &MaskBundle, _floor_key: usize) {}

    fn on_mask_arrived(&mut self, _kind: MaskKind, _view: &wgpu::TextureView) {}

    fn params_changed(&mut self, _params: &ParamMap) {}

    fn dispose(&mut self) {}
}
