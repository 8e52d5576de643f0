//! Progressive shader warmup.
//!
//! Walks the same sequence as a real frame but finishes the GPU queue and
//! yields the thread after every effect, so each shader compilation becomes
//! observable to a progress callback instead of landing as one long first
//! frame. Compiled-program counts come from the context's pipeline counter.

use anyhow::Result;

use crate::composer::EffectComposer;
use crate::composer::passes::ComposerPasses;
use crate::effects::{EffectCtx, EffectKind};
use crate::host::SceneHost;
use crate::target_pool::{TargetName, names};
use crate::time::FrameInfo;

#[derive(Clone, Copy, Debug)]
pub struct WarmupProgress<'a> {
    pub completed: usize,
    pub total: usize,
    pub effect_id: &'a str,
    /// Render pipelines built so far, across the whole context.
    pub pipelines_compiled: u64,
}

/// Drive every active effect through one zero-delta update/render so its
/// pipelines compile, reporting after each one.
pub fn progressive_warmup(
    composer: &mut EffectComposer,
    host: &dyn SceneHost,
    on_progress: &mut dyn FnMut(WarmupProgress<'_>),
) -> Result<()> {
    let info = FrameInfo {
        elapsed: 0.0,
        wall_elapsed: 0.0,
        delta: 0.0,
        raw_delta: 0.0,
        frame_count: 0,
        scale: 1.0,
    };

    composer.frame_state.capture(host);
    let [w, h] = composer.frame_state.buffer_size;
    let pool_format = composer.pool.color_format();
    let scene_view = composer.pool.get(names::SCENE, w, h, false)?.view.clone();
    let post_view = composer.pool.get(names::POST_1, w, h, false)?.view.clone();

    composer.rebuild_entries();
    let order: Vec<usize> = {
        let schedule = crate::composer::build_schedule(
            &composer.entries_scratch,
            0,
            false,
            composer.settings.gpu_tier,
        );
        schedule.prepare
    };
    let total = order.len();

    eprintln!("[warmup] compiling {total} effects");
    for (completed, &index) in order.iter().enumerate() {
        {
            let EffectComposer { effects, gpu, pool, frame_state, .. } = composer;
            let effect = &mut effects[index];
            let mut encoder = gpu
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("tilefx.warmup"),
                });

            let mut ctx = EffectCtx {
                gpu,
                host,
                pool: &mut *pool,
                frame_state,
                output_format: pool_format,
            };
            if let Err(e) = effect.prepare_frame(&info, &mut ctx) {
                eprintln!(
                    "[warmup] '{}' prepare failed: {e:#}",
                    effect.header.id()
                );
            }

            let warm_result = (|| -> Result<()> {
                let mut ctx = EffectCtx {
                    gpu,
                    host,
                    pool: &mut *pool,
                    frame_state,
                    output_format: pool_format,
                };
                effect.update(&info, &mut ctx)?;

                if let EffectKind::PostProcess(post) = &mut effect.kind {
                    post.set_input_texture(scene_view.clone());
                    post.set_buffers(
                        TargetName::from(names::SCENE),
                        Some(TargetName::from(names::POST_1)),
                    );
                    post.set_render_to_screen(false);
                    ComposerPasses::clear(&mut encoder, &post_view);
                }
                let target = match &effect.kind {
                    EffectKind::PostProcess(_) => &post_view,
                    _ => &scene_view,
                };
                let mut ctx = EffectCtx {
                    gpu,
                    host,
                    pool: &mut *pool,
                    frame_state,
                    output_format: pool_format,
                };
                effect.render(&mut encoder, target, &mut ctx)
            })();
            if let Err(e) = warm_result {
                eprintln!("[warmup] '{}' render failed: {e:#}", effect.header.id());
            }

            gpu.queue.submit(std::iter::once(encoder.finish()));
            // Make the compile observable before moving on.
            let _ = gpu.device.poll(wgpu::PollType::wait_indefinitely());
        }
        std::thread::yield_now();

        let effect_id = composer.effects[index].header.id().to_string();
        on_progress(WarmupProgress {
            completed: completed + 1,
            total,
            effect_id: &effect_id,
            pipelines_compiled: composer.gpu.pipelines_created(),
        });
    }
    Ok(())
}
