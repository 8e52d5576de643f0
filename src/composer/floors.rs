//! Per-floor rendering.
//!
//! Each visible floor is isolated into its own render target, runs its
//! floor-scoped effects and post chain, is alpha-clipped against its floor
//! mask (so gaps in upper floors reveal the floors below), and is
//! composited onto the accumulator with premultiplied alpha. Global-scoped
//! effects then run once on the accumulated image.

use anyhow::Result;

use crate::composer::frame::{ChainIo, FrameTargets, run_post_chain, run_scene_effects};
use crate::composer::passes::ComposerPasses;
use crate::composer::{EffectComposer, WorldRenderer};
use crate::effects::FloorScope;
use crate::host::{Floor, SceneHost};
use crate::layers::LayerMask;
use crate::masks::MaskKind;
use crate::target_pool::{TargetName, names};
use crate::time::FrameInfo;

/// Render every visible floor bottom→top, then the global effects and the
/// global post chain. Returns the last captured depth view for the debug
/// tail.
pub(crate) fn render_floors_path(
    composer: &mut EffectComposer,
    host: &dyn SceneHost,
    world: &mut dyn WorldRenderer,
    targets: &FrameTargets<'_>,
    info: &FrameInfo,
    floors: &[Floor],
) -> Result<Option<wgpu::TextureView>> {
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
            label: Some("tilefx.frame.floors"),
        });
    ComposerPasses::clear(&mut encoder, &accum_view);

    let mut ordered: Vec<&Floor> = floors.iter().collect();
    ordered.sort_by_key(|f| f.index);

    let mut last_depth = None;
    for floor in ordered {
        // a. Isolate this floor's tiles; the global scene layer stays off.
        host.set_floor_visible(floor.index);
        if let Some(depth) =
            world.capture_depth(&mut encoder, Some(floor.index), LayerMask::OVERLAY)?
        {
            last_depth = Some(depth);
        }

        // b. Compose and bind this floor's masks.
        bind_floor_masks(composer, host, floor)?;

        // c/d. The isolated world into the floor target, then floor-scoped
        // scene effects on top.
        let floor_view = composer.pool.get(names::FLOOR, w, h, false)?.view.clone();
        world.render_world(
            &mut encoder,
            &floor_view,
            pool_format,
            LayerMask::ALL
                .without(LayerMask::OVERLAY)
                .without(LayerMask::GLOBAL_SCENE),
            Some(wgpu::Color::TRANSPARENT),
        )?;
        run_scene_effects(
            composer,
            host,
            &mut encoder,
            &floor_view,
            pool_format,
            info,
            Some(FloorScope::Floor),
        );

        // e. Floor-scoped post chain on the floor ping-pong pair.
        composer.chain_scratch.clear();
        for &index in &composer.schedule.post {
            if composer.effects[index].header.floor_scope() == FloorScope::Floor {
                composer.chain_scratch.push(index);
            }
        }
        let mut floor_final = floor_view.clone();
        if !composer.chain_scratch.is_empty() {
            let final_view = composer
                .pool
                .get(names::FLOOR_FINAL, w, h, false)?
                .view
                .clone();
            run_post_chain(
                composer,
                host,
                &mut encoder,
                info,
                &ChainIo {
                    source_view: &floor_view,
                    source_name: TargetName::from(names::FLOOR),
                    ping_a: names::FLOOR_POST_A,
                    ping_b: names::FLOOR_POST_B,
                    out_view: &final_view,
                    out_format: pool_format,
                    out_name: Some(TargetName::from(names::FLOOR_FINAL)),
                },
            )?;
            floor_final = final_view;
        }

        // f. Upper floors multiply in their alpha-clip mask; the ground
        // floor never clips against itself.
        if floor.index > 0 {
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

        // g. Premultiplied alpha-over onto the accumulator.
        let EffectComposer { passes, gpu, .. } = composer;
        passes.composite_over(gpu, &mut encoder, &floor_final, &accum_view, pool_format);
    }
    host.restore_visibility();

    // Global scene effects run once, on the accumulated image.
    run_scene_effects(
        composer,
        host,
        &mut encoder,
        &accum_view,
        pool_format,
        info,
        Some(FloorScope::Global),
    );

    // Global post chain; without one, the accumulator blits to screen with
    // the same alpha-over blend.
    composer.chain_scratch.clear();
    for &index in &composer.schedule.post {
        if composer.effects[index].header.floor_scope() == FloorScope::Global {
            composer.chain_scratch.push(index);
        }
    }
    if composer.chain_scratch.is_empty() {
        let EffectComposer { passes, gpu, .. } = composer;
        passes.composite_over(
            gpu,
            &mut encoder,
            &accum_view,
            targets.screen,
            targets.screen_format,
        );
    } else {
        run_post_chain(
            composer,
            host,
            &mut encoder,
            info,
            &ChainIo {
                source_view: &accum_view,
                source_name: TargetName::from(names::ACCUMULATION),
                ping_a: names::POST_1,
                ping_b: names::POST_2,
                out_view: targets.screen,
                out_format: targets.screen_format,
                out_name: None,
            },
        )?;
    }

    composer.gpu.queue.submit(std::iter::once(encoder.finish()));
    Ok(last_depth)
}

/// Compose the floor's bundle, fire `on_mask_arrived` transitions (lazy
/// initialisation included), and hand the bundle to every floor-scoped
/// effect.
pub(crate) fn bind_floor_masks(
    composer: &mut EffectComposer,
    host: &dyn SceneHost,
    floor: &Floor,
) -> Result<()> {
    // Compose first; collect the null→non-null transitions while the bundle
    // borrow is alive.
    let mut arrivals: Vec<(MaskKind, wgpu::TextureView)> = Vec::new();
    {
        let bundle = composer.masks.compose_floor(&composer.gpu, host, floor)?;
        for (&kind, texture) in &bundle.textures {
            if !composer.present_masks.contains(&(floor.index, kind)) {
                arrivals.push((kind, texture.view.clone()));
            }
        }
    }

    for (kind, view) in &arrivals {
        composer.present_masks.insert((floor.index, *kind));
        let subscribed: Vec<String> = composer
            .mask_subscriptions
            .iter()
            .filter(|(_, kinds)| kinds.contains(kind))
            .map(|(id, _)| id.clone())
            .collect();
        for id in subscribed {
            if composer
                .effect_header(&id)
                .is_some_and(|h| h.is_lazy_pending())
            {
                if let Err(e) = composer.ensure_effect_initialized(host, &id) {
                    eprintln!("[composer] mask-triggered init of '{id}' failed: {e:#}");
                    continue;
                }
            }
            if let Some(&index) = composer.index_by_id.get(&id) {
                composer.effects[index].on_mask_arrived(*kind, view);
            }
        }
    }

    let EffectComposer { effects, masks, schedule, .. } = composer;
    if let Some(bundle) = masks.bundle(floor.index) {
        for &index in &schedule.prepare {
            let effect = &mut effects[index];
            if effect.header.floor_scope() == FloorScope::Floor {
                effect.bind_floor_masks(bundle, floor.index);
            }
        }
    }
    Ok(())
}
