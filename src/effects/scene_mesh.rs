//! World-mesh effects.
//!
//! A scene-mesh effect owns geometry parented to the world (a water plane, a
//! cloud layer) and renders into the current floor target during the scene
//! phase. Time-based simulation belongs in `prepare_frame`, which runs once
//! per frame; `on_update` runs once per floor and must not integrate time.

use std::collections::HashMap;

use anyhow::Result;

use crate::effects::{EffectCtx, ParamMap};
use crate::masks::{MaskBundle, MaskKind};
use crate::time::FrameInfo;

/// The shared ground plane every scene-mesh effect builds on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BasePlane {
    /// World rect `[x, y, w, h]`.
    pub rect: [f32; 4],
    pub z: f32,
}

/// Textures shared with an effect when its base mesh is set.
#[derive(Default)]
pub struct AssetBundle {
    pub textures: HashMap<String, wgpu::TextureView>,
}

pub trait SceneMeshEffect {
    fn on_initialize(&mut self, _ctx: &mut EffectCtx<'_>) -> Result<()> {
        Ok(())
    }

    /// Called when the composer hands the effect the shared ground plane.
    fn on_base_mesh_set(&mut self, _base: &BasePlane, _assets: &AssetBundle) {}

    /// Build the effect's mesh and material. Required.
    fn create_mesh(&mut self, ctx: &mut EffectCtx<'_>) -> Result<()>;

    /// Optional shadow render target / material setup.
    fn create_shadow_resources(&mut self, _ctx: &mut EffectCtx<'_>) -> Result<()> {
        Ok(())
    }

    /// Once per frame, before any floor. Integrate time here.
    fn prepare_frame(&mut self, _info: &FrameInfo, _ctx: &mut EffectCtx<'_>) -> Result<()> {
        Ok(())
    }

    /// Once per floor in the floor loop. Must not integrate time.
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

    /// The current floor's composed masks. Effects clone the views they need.
    fn bind_floor_masks(&mut self, _bundle: &MaskBundle, _floor_key: usize) {}

    /// A subscribed mask's texture transitioned from null to non-null.
    fn on_mask_arrived(&mut self, _kind: MaskKind, _view: &wgpu::TextureView) {}

    fn params_changed(&mut self, _params: &ParamMap) {}

    /// Remove the mesh and release material and shadow resources.
    fn dispose(&mut self) {}
}
