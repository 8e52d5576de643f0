//! Per-frame execution (legacy single-floor path).
//!
//! `render_frame` is the only entry point the host's animation-frame
//! callback touches. It ticks time, drains host events, plans the frame,
//! and walks the plan: scene effects into the scene target, the post chain
//! ping-ponging into the screen, then the fixed overlay and depth-debug
//! tail. A render call never suspends; all awaitable work happens at
//! registration time.

use std::time::Instant;

use anyhow::{Result, bail};

use crate::composer::passes::ComposerPasses;
use crate::composer::{
    EffectComposer, WorldRenderer, floors, note_effect_error, plan_post_chain, schedule,
};
use crate::effects::{EffectCtx, EffectKind, FloorScope};
use crate::host::{HostEvent, SceneHost};
use crate::layers::{LayerMask, MAX_FLOOR_LAYERS};
use crate::overlay;
use crate::target_pool::{TargetName, names};
use crate::tiles::HOVER_CONTINUOUS_SECS;
use crate::time::FrameInfo;

/// Where this frame presents.
pub struct FrameTargets<'a> {
    pub screen: &'a wgpu::TextureView,
    pub screen_format: wgpu::TextureFormat,
}

impl EffectComposer {
    /// Render one frame. Single-threaded; must not be re-entered.
    pub fn render_frame(
        &mut self,
        host: &dyn SceneHost,
        world: &mut dyn WorldRenderer,
        targets: &FrameTargets<'_>,
    ) -> Result<()> {
        let result = self.render_frame_inner(host, world, targets);
        // Target allocation failures are fatal to the session; release
        // everything instead of limping on with a dead pool.
        if result.is_err() && self.pool.is_disposed() && !self.disposed {
            eprintln!("[composer] render target failure; disposing composer");
            self.dispose();
        }
        result
    }

    fn render_frame_inner(
        &mut self,
        host: &dyn SceneHost,
        world: &mut dyn WorldRenderer,
        targets: &FrameTargets<'_>,
    ) -> Result<()> {
        if self.disposed {
            bail!("composer is disposed");
        }
        self.frame_started = Some(Instant::now());

        // 1. Host events, then the frame snapshot.
        self.process_host_events(host);
        let info = self.clock.tick();
        self.last_info = Some(info);
        self.frame_state.capture(host);
        let [w, h] = self.frame_state.buffer_size;
        self.pool.resize_all(w, h)?;

        let floors_list = host.visible_floors();
        let v2_eligible = self.settings.use_compositor_v2
            && !floors_list.is_empty()
            && floors_list.len() <= MAX_FLOOR_LAYERS;
        if self.settings.use_compositor_v2 && !v2_eligible && !floors_list.is_empty() {
            eprintln!(
                "[floors] {} floors exceed the {} layer bits; staying on the legacy path",
                floors_list.len(),
                MAX_FLOOR_LAYERS
            );
        }

        if v2_eligible {
            // V2 is the sole renderer: no effect sorting, no post chain, no
            // overlay. Essential updatables still run.
            self.updatables.run(&info, true);
            crate::floor_v2::render_v2(self, host, world, targets, &info)?;
            self.finish_frame(info);
            return Ok(());
        }

        // 2. Updatables at their declared frequencies.
        self.updatables.run(&info, false);

        // 3. Plan the frame.
        self.rebuild_entries();
        let decimating = self.settings.adaptive_decimation && self.decimation.active;
        let gpu_tier = self.settings.gpu_tier;
        {
            let Self { schedule: plan, entries_scratch, .. } = self;
            schedule::build_schedule_into(
                plan,
                entries_scratch,
                info.frame_count,
                decimating,
                gpu_tier,
            );
        }

        // 4. prepare_frame on every active effect, exactly once, before any
        //    update or render.
        run_prepare_frame(self, host, &info);

        // 5-8. Scene + post, per floor or single pass.
        let depth_view = if self.settings.experimental_floor_rendering && !floors_list.is_empty()
        {
            floors::render_floors_path(self, host, world, targets, &info, &floors_list)?
        } else {
            self.render_legacy(host, world, targets, &info)?
        };

        // 9-10. Fixed tail: overlay, then the depth visualiser.
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tilefx.frame.tail"),
            });
        overlay::overlay_pass(world, &mut encoder, targets.screen, targets.screen_format)?;
        if self.depth_debug_enabled {
            if let Some(depth) = depth_view.as_ref() {
                let viewport = overlay::depth_debug_viewport(self.frame_state.buffer_size);
                let Self { passes, gpu, .. } = self;
                passes.depth_debug(
                    gpu,
                    &mut encoder,
                    depth,
                    targets.screen,
                    targets.screen_format,
                    viewport,
                );
            }
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        self.finish_frame(info);
        Ok(())
    }

    fn finish_frame(&mut self, info: FrameInfo) {
        // 11. Decimation EMA from the measured frame time.
        if let Some(started) = self.frame_started.take() {
            if self.settings.adaptive_decimation {
                self.decimation
                    .record(started.elapsed().as_secs_f32() * 1000.0);
            }
        }
        self.tiles.prune_finished_fades(info.wall_elapsed);
    }

    fn process_host_events(&mut self, host: &dyn SceneHost) {
        let events = self.events.drain();
        if events.is_empty() {
            return;
        }
        let now = self.last_info.map(|i| i.wall_elapsed).unwrap_or(0.0);
        let floors_list = host.visible_floors();
        for event in &events {
            self.tiles.apply_event(event);
            match event {
                HostEvent::TileCreated { elevation, .. }
                | HostEvent::TileDeleted { elevation, .. } => {
                    self.masks.invalidate_elevation(&floors_list, *elevation);
                }
                HostEvent::TileUpdated { elevation, mask_relevant, .. } => {
                    if *mask_relevant {
                        self.masks.invalidate_elevation(&floors_list, *elevation);
                    }
                }
                HostEvent::FloorsChanged => self.masks.invalidate_all(),
                HostEvent::TileHoverHide { id } => {
                    self.tiles.hover_hide(id, now);
                    self.request_continuous_render(HOVER_CONTINUOUS_SECS);
                }
            }
        }
        self.tiles.sync(host.tiles());
    }

    /// Legacy path: one world pass plus the global post chain. Returns the
    /// captured depth view for the debug tail.
    fn render_legacy(
        &mut self,
        host: &dyn SceneHost,
        world: &mut dyn WorldRenderer,
        targets: &FrameTargets<'_>,
        info: &FrameInfo,
    ) -> Result<Option<wgpu::TextureView>> {
        let [w, h] = self.frame_state.buffer_size;
        let pool_format = self.pool.color_format();
        let has_post = !self.schedule.post.is_empty();

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tilefx.frame.legacy"),
            });

        // Depth for the active floor, overlay masked off.
        let depth_view = world.capture_depth(&mut encoder, None, LayerMask::OVERLAY)?;

        let world_mask = LayerMask::ALL.without(LayerMask::OVERLAY);
        if has_post {
            let scene_view = self.pool.get(names::SCENE, w, h, false)?.view.clone();
            world.render_world(
                &mut encoder,
                &scene_view,
                pool_format,
                world_mask,
                Some(wgpu::Color::TRANSPARENT),
            )?;
            run_scene_effects(self, host, &mut encoder, &scene_view, pool_format, info, None);

            self.chain_scratch.clear();
            self.chain_scratch.extend_from_slice(&self.schedule.post);
            run_post_chain(
                self,
                host,
                &mut encoder,
                info,
                &ChainIo {
                    source_view: &scene_view,
                    source_name: TargetName::from(names::SCENE),
                    ping_a: names::POST_1,
                    ping_b: names::POST_2,
                    out_view: targets.screen,
                    out_format: targets.screen_format,
                    out_name: None,
                },
            )?;
        } else {
            world.render_world(
                &mut encoder,
                targets.screen,
                targets.screen_format,
                world_mask,
                Some(wgpu::Color::TRANSPARENT),
            )?;
            run_scene_effects(
                self,
                host,
                &mut encoder,
                targets.screen,
                targets.screen_format,
                info,
                None,
            );
        }

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(depth_view)
    }
}

/// `prepare_frame` for every effect in the plan, with per-effect error
/// capture.
pub(crate) fn run_prepare_frame(composer: &mut EffectComposer, host: &dyn SceneHost, info: &FrameInfo) {
    let output_format = composer.pool.color_format();
    let EffectComposer { effects, schedule, gpu, pool, frame_state, .. } = composer;
    for &index in &schedule.prepare {
        let effect = &mut effects[index];
        let mut ctx = EffectCtx {
            gpu,
            host,
            pool: &mut *pool,
            frame_state,
            output_format,
        };
        if let Err(e) = effect.prepare_frame(info, &mut ctx) {
            note_effect_error(effect, host, "prepareFrame", e);
        }
    }
}

/// Update + render each scheduled scene effect into `target`. When `scope`
/// is set, only effects of that floor scope run.
pub(crate) fn run_scene_effects(
    composer: &mut EffectComposer,
    host: &dyn SceneHost,
    encoder: &mut wgpu::CommandEncoder,
    target: &wgpu::TextureView,
    target_format: wgpu::TextureFormat,
    info: &FrameInfo,
    scope: Option<FloorScope>,
) {
    let EffectComposer { effects, schedule, gpu, pool, frame_state, .. } = composer;
    for &index in &schedule.scene {
        let effect = &mut effects[index];
        if scope.is_some_and(|s| effect.header.floor_scope() != s) {
            continue;
        }
        let mut ctx = EffectCtx {
            gpu,
            host,
            pool: &mut *pool,
            frame_state,
            output_format: target_format,
        };
        if let Err(e) = effect.update(info, &mut ctx) {
            note_effect_error(effect, host, "update", e);
            continue;
        }
        let mut ctx = EffectCtx {
            gpu,
            host,
            pool: &mut *pool,
            frame_state,
            output_format: target_format,
        };
        if let Err(e) = effect.render(encoder, target, &mut ctx) {
            note_effect_error(effect, host, "render", e);
        }
    }
}

/// Buffer mapping for one post chain run.
pub(crate) struct ChainIo<'a> {
    pub source_view: &'a wgpu::TextureView,
    pub source_name: TargetName,
    pub ping_a: &'static str,
    pub ping_b: &'static str,
    pub out_view: &'a wgpu::TextureView,
    pub out_format: wgpu::TextureFormat,
    /// `None` when the chain output is the screen.
    pub out_name: Option<TargetName>,
}

/// Execute the post chain in `composer.chain_scratch` over the given
/// buffers. Each step: update, bind input, assign buffers, clear the
/// output, render. A failing effect is disabled and its step degrades to a
/// blit so downstream steps keep a valid input.
pub(crate) fn run_post_chain(
    composer: &mut EffectComposer,
    host: &dyn SceneHost,
    encoder: &mut wgpu::CommandEncoder,
    info: &FrameInfo,
    io: &ChainIo<'_>,
) -> Result<()> {
    if composer.chain_scratch.is_empty() {
        return Ok(());
    }
    let [w, h] = composer.frame_state.buffer_size;
    let pool_format = composer.pool.color_format();
    let ping_a_view = composer.pool.get(io.ping_a, w, h, false)?.view.clone();
    let ping_b_view = composer.pool.get(io.ping_b, w, h, false)?.view.clone();

    let steps = plan_post_chain(&composer.chain_scratch);
    let EffectComposer { effects, gpu, pool, frame_state, passes, .. } = composer;

    for step in &steps {
        let (read_view, read_name) = match step.read {
            schedule::ChainBuf::Source => (io.source_view, io.source_name.clone()),
            schedule::ChainBuf::PingA => (&ping_a_view, TargetName::from(io.ping_a)),
            schedule::ChainBuf::PingB => (&ping_b_view, TargetName::from(io.ping_b)),
            schedule::ChainBuf::Out => unreachable!("chain never reads its output"),
        };
        let (write_format, write_name, to_screen) = match step.write {
            schedule::ChainBuf::PingA => {
                (pool_format, Some(TargetName::from(io.ping_a)), false)
            }
            schedule::ChainBuf::PingB => {
                (pool_format, Some(TargetName::from(io.ping_b)), false)
            }
            schedule::ChainBuf::Out => (io.out_format, io.out_name.clone(), io.out_name.is_none()),
            schedule::ChainBuf::Source => unreachable!("chain never writes its source"),
        };
        let write_view: &wgpu::TextureView = match step.write {
            schedule::ChainBuf::PingA => &ping_a_view,
            schedule::ChainBuf::PingB => &ping_b_view,
            schedule::ChainBuf::Out => io.out_view,
            schedule::ChainBuf::Source => unreachable!("chain never writes its source"),
        };

        let effect = &mut effects[step.effect];
        let step_result = (|| -> Result<()> {
            let mut ctx = EffectCtx {
                gpu,
                host,
                pool: &mut *pool,
                frame_state,
                output_format: write_format,
            };
            effect.update(info, &mut ctx)?;

            let EffectKind::PostProcess(post) = &mut effect.kind else {
                bail!("non-post effect scheduled in post chain");
            };
            post.set_input_texture(read_view.clone());
            post.set_buffers(read_name.clone(), write_name.clone());
            post.set_render_to_screen(to_screen);

            ComposerPasses::clear(encoder, write_view);
            let mut ctx = EffectCtx {
                gpu,
                host,
                pool: &mut *pool,
                frame_state,
                output_format: write_format,
            };
            effect.render(encoder, write_view, &mut ctx)
        })();

        if let Err(e) = step_result {
            note_effect_error(effect, host, "post chain", e);
            // Keep the chain's data flowing for the remaining steps.
            passes.blit(gpu, encoder, read_view, write_view, write_format);
        }
    }
    Ok(())
}
