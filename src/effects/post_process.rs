//! Fullscreen post-process effects.
//!
//! A post effect owns a fullscreen material and operates on the framebuffer
//! of the scene. The composer drives the ping-pong chain: for each step it
//! calls `on_update`, then `set_input_texture` with the read buffer's
//! texture, `set_buffers` with the pair, `set_render_to_screen` for the last
//! step, and finally `render` into the configured target.

use anyhow::Result;

use crate::effects::{EffectCtx, ParamMap};
use crate::masks::{MaskBundle, MaskKind};
use crate::target_pool::TargetName;
use crate::time::FrameInfo;

pub trait PostProcessEffect {
    /// Build the fullscreen material. Required.
    fn create_material(&mut self, ctx: &mut EffectCtx<'_>) -> Result<()>;

    /// The texture this pass samples. Views are cheap handles; implementors
    /// store the clone.
    fn set_input_texture(&mut self, view: wgpu::TextureView);

    /// The named read/write pair for this step. `write` is `None` when the
    /// step outputs to screen.
    fn set_buffers(&mut self, read: TargetName, write: Option<TargetName>);

    /// True exactly for the last step of a chain.
    fn set_render_to_screen(&mut self, to_screen: bool);

    /// Once per frame, before any floor. Integrate time here.
    fn prepare_frame(&mut self, _info: &FrameInfo, _ctx: &mut EffectCtx<'_>) -> Result<()> {
        Ok(())
    }

    /// Once per chain step; may run once per floor for floor-scoped chains.
    fn on_update(&mut self, _info: &FrameInfo, _ctx: &mut EffectCtx<'_>) -> Result<()> {
        Ok(())
    }

    /// Draw the fullscreen quad into `target`. `ctx.output_format` matches
    /// the target's format (the screen's format differs from the pool's).
    fn render(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        ctx: &mut EffectCtx<'_>,
    ) -> Result<()>;

    fn bind_floor_masks(&mut self, _bundle: &MaskBundle, _floor_key: usize) {}

    fn on_mask_arrived(&mut self, _kind: MaskKind, _view: &wgpu::TextureView) {}

    fn params_changed(&mut self, _params: &ParamMap) {}

    fn dispose(&mut self) {}
}
