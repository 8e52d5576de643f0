//! Camera-layer-mask floor isolation (the V2 path).
//!
//! Instead of toggling tile visibility per floor, every floor owns a
//! dedicated camera layer bit; tiles set their layer on creation and the
//! compositor renders each floor by switching the camera mask. The
//! accumulate + alpha-clip pipeline is shared with the legacy floor path.
//! While V2 is active it is the sole renderer: effect sorting, the post
//! chain and the overlay pass are suppressed, and only essential updatables
//! run.

use std::collections::HashMap;

use anyhow::Result;

use crate::composer::passes::ComposerPasses;
use crate::composer::{EffectComposer, FrameTargets, WorldRenderer};
use crate::effects::ParamMap;
use crate::host::SceneHost;
use crate::layers::LayerMask;
use crate::masks::MaskKind;
use crate::target_pool::names;
use crate::time::FrameInfo;

/// Effect families whose V1 schema defaults would corrupt V2; only
/// parameters that were actually persisted are replayed for them.
const PERSISTED_ONLY_PREFIXES: &[&str] = &["water"];

pub struct FloorCompositorV2 {
    continuous: bool,
}

impl FloorCompositorV2 {
    pub fn new() -> Self {
        Self { continuous: false }
    }

    /// Animated subsystems under V2 still bypass idle throttling through
    /// this.
    pub fn wants_continuous_render(&self) -> bool {
        self.continuous
    }

    pub fn set_continuous(&mut self, continuous: bool) {
        self.continuous = continuous;
    }
}

impl Default for FloorCompositorV2 {
    fn default() -> Self {
        Self::new()
    }
}

fn is_persisted_only(effect_id: &str) -> bool {
    PERSISTED_ONLY_PREFIXES
        .iter()
        .any(|p| effect_id == *p || effect_id.starts_with(&format!("{p}_")))
}

fn as_param_map(value: &serde_json::Value) -> Option<ParamMap> {
    value
        .as_object()
        .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

/// Merge the host's UI snapshot and persisted flags into per-effect
/// parameter sets for replay.
///
/// Parameters are pushed to effects via UI callbacks, but the V2 pipeline is
/// created lazily on first render, so it must pull current values or start
/// with constructor defaults. The generic replay takes the UI snapshot with
/// persisted flags layered on top; water-family effects skip the generic
/// map entirely and replay only what was actually persisted.
pub(crate) fn merge_replay(
    ui: &HashMap<String, serde_json::Value>,
    persisted: &HashMap<String, serde_json::Value>,
) -> Vec<(String, ParamMap)> {
    let mut ids: Vec<&String> = ui.keys().chain(persisted.keys()).collect();
    ids.sort();
    ids.dedup();

    let mut out = Vec::new();
    for id in ids {
        let mut params = ParamMap::new();
        if !is_persisted_only(id) {
            if let Some(map) = ui.get(id).and_then(as_param_map) {
                params.extend(map);
            }
        }
        if let Some(map) = persisted.get(id).and_then(as_param_map) {
            params.extend(map);
        }
        if !params.is_empty() {
            out.push((id.clone(), params));
        }
    }
    out
}

/// Render the whole frame through V2. Creates the compositor lazily on
/// first use, replaying parameters first so effects do not run with
/// constructor defaults.
pub(crate) fn render_v2(
    composer: &mut EffectComposer,
    host: &dyn SceneHost,
    world: &mut dyn WorldRenderer,
    targets: &FrameTargets<'_>,
    info: &FrameInfo,
) -> Result<()> {
    if composer.floor_v2.is_none() {
        eprintln!("[floors] creating compositor v2");
        let replay = merge_replay(&host.ui_parameter_snapshot(), &host.persisted_effect_flags());
        for (id, params) in replay {
            composer.set_effect_params(&id, params);
        }
        composer.floor_v2 = Some(FloorCompositorV2::new());
    }

    let [w, h] = composer.frame_state.buffer_size;
    let pool_format = composer.pool.color_format();
    let accum_view = composer
        .pool
        .get(names::ACCUMULATION, w, h, false)?
        .view
        .clone();

    let mut encoder = composer
        .gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("tilefx.frame.v2"),
        });
    ComposerPasses::clear(&mut encoder, &accum_view);

    let mut floors = host.visible_floors();
    floors.sort_by_key(|f| f.index);

    for floor in &floors {
        let floor_view = composer.pool.get(names::FLOOR, w, h, false)?.view.clone();
        world.render_world(
            &mut encoder,
            &floor_view,
            pool_format,
            LayerMask::floor(floor.index),
            Some(wgpu::Color::TRANSPARENT),
        )?;

        let mut floor_final = floor_view;
        if floor.index > 0 {
            composer.masks.compose_floor(&composer.gpu, host, floor)?;
            let clip_mask = composer
                .masks
                .bundle(floor.index)
                .and_then(|b| {
                    b.view(MaskKind::FloorAlpha)
                        .or_else(|| b.view(MaskKind::Outdoors))
                })
                .cloned();
            if let Some(mask_view) = clip_mask {
                let clip_view = composer
                    .pool
                    .get(names::FLOOR_CLIP, w, h, false)?
                    .view
                    .clone();
                let EffectComposer { passes, gpu, .. } = composer;
                passes.alpha_clip(
                    gpu,
                    &mut encoder,
                    &floor_final,
                    &mask_view,
                    &clip_view,
                    pool_format,
                );
                floor_final = clip_view;
            }
        }

        let EffectComposer { passes, gpu, .. } = composer;
        passes.composite_over(gpu, &mut encoder, &floor_final, &accum_view, pool_format);
    }

    let EffectComposer { passes, gpu, .. } = composer;
    passes.composite_over(
        gpu,
        &mut encoder,
        &accum_view,
        targets.screen,
        targets.screen_format,
    );
    composer.gpu.queue.submit(std::iter::once(encoder.finish()));

    // Animated subsystems (tile fades) keep V2 out of idle throttling.
    let fades_active = composer.tiles.any_fade_active(info.wall_elapsed);
    if let Some(v2) = composer.floor_v2.as_mut() {
        v2.set_continuous(fades_active);
    }
    Ok(())
}
