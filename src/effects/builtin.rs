//! Built-in effects.
//!
//! One effect per contract variant, exercising the framework end to end: a
//! brightness/contrast/saturation grade and a separable Gaussian blur on
//! the post chain, an interior darkening pass driven by the outdoors mask,
//! and a rain particle effect gated by the same mask. Hosts register their
//! own effect libraries; these also serve the warmup and integration tests.

use std::collections::HashMap;

use anyhow::Result;

use crate::effects::{
    EffectCtx, ParamMap, ParticleEffect, PostProcessEffect, SceneMeshEffect, param_f32,
};
use crate::masks::{MaskBundle, MaskKind};
use crate::target_pool::TargetName;
use crate::time::FrameInfo;
use crate::wgsl;

/// Fullscreen brightness/contrast/saturation grade.
pub struct ColorGradeEffect {
    brightness: f32,
    contrast: f32,
    saturation: f32,
    module: Option<wgpu::ShaderModule>,
    bind_layout: Option<wgpu::BindGroupLayout>,
    sampler: Option<wgpu::Sampler>,
    uniform: Option<wgpu::Buffer>,
    /// One pipeline per target format; the screen's format differs from the
    /// pool's.
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
    input: Option<wgpu::TextureView>,
}

impl ColorGradeEffect {
    pub fn new() -> Self {
        Self {
            brightness: 0.0,
            contrast: 1.0,
            saturation: 1.0,
            module: None,
            bind_layout: None,
            sampler: None,
            uniform: None,
            pipelines: HashMap::new(),
            input: None,
        }
    }
}

impl Default for ColorGradeEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl PostProcessEffect for ColorGradeEffect {
    fn create_material(&mut self, ctx: &mut EffectCtx<'_>) -> Result<()> {
        let source = wgsl::fullscreen_module(wgsl::COLOR_GRADE_FS);
        wgsl::validate_wgsl(&source, "color grade")?;
        self.module = Some(ctx.gpu.create_shader("tilefx.fx.color_grade", &source));
        self.bind_layout = Some(ctx.gpu.fullscreen_bind_layout("tilefx.fx.color_grade", 1, true));
        self.sampler = Some(ctx.gpu.linear_clamp_sampler("tilefx.fx.color_grade"));
        self.uniform = Some(ctx.gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tilefx.fx.color_grade.params"),
            size: 16,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        Ok(())
    }

    fn set_input_texture(&mut self, view: wgpu::TextureView) {
        self.input = Some(view);
    }

    fn set_buffers(&mut self, _read: TargetName, _write: Option<TargetName>) {}

    fn set_render_to_screen(&mut self, _to_screen: bool) {
        // The grade is identical on- and off-screen.
    }

    fn on_update(&mut self, _info: &FrameInfo, ctx: &mut EffectCtx<'_>) -> Result<()> {
        if let Some(uniform) = &self.uniform {
            let values = [self.brightness, self.contrast, self.saturation, 0.0];
            ctx.gpu
                .queue
                .write_buffer(uniform, 0, bytemuck::bytes_of(&values));
        }
        Ok(())
    }

    fn render(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        ctx: &mut EffectCtx<'_>,
    ) -> Result<()> {
        let (Some(module), Some(bind_layout), Some(sampler), Some(uniform), Some(input)) = (
            self.module.as_ref(),
            self.bind_layout.as_ref(),
            self.sampler.as_ref(),
            self.uniform.as_ref(),
            self.input.as_ref(),
        ) else {
            anyhow::bail!("color grade rendered before create_material/set_input_texture");
        };

        let pipeline = self
            .pipelines
            .entry(ctx.output_format)
            .or_insert_with(|| {
                ctx.gpu.build_fullscreen_pipeline(
                    "tilefx.fx.color_grade",
                    module,
                    bind_layout,
                    ctx.output_format,
                    None,
                )
            });

        let bind_group = ctx.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tilefx.fx.color_grade"),
            layout: bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(input),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform.as_entire_binding(),
                },
            ],
        });

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("tilefx.fx.color_grade"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        rpass.set_pipeline(pipeline);
        rpass.set_bind_group(0, &bind_group, &[]);
        rpass.draw(0..3, 0..1);
        Ok(())
    }

    fn params_changed(&mut self, params: &ParamMap) {
        self.brightness = param_f32(params, "brightness", 0.0).clamp(-1.0, 1.0);
        self.contrast = param_f32(params, "contrast", 1.0).clamp(0.0, 4.0);
        self.saturation = param_f32(params, "saturation", 1.0).clamp(0.0, 4.0);
    }

    fn dispose(&mut self) {
        self.pipelines.clear();
        self.module = None;
        self.bind_layout = None;
        self.sampler = None;
        self.uniform = None;
        self.input = None;
    }
}

/// Darkens interiors using the inverse of the outdoors mask, scaled by the
/// scene darkness level. Floor-scoped: each floor samples its own mask.
pub struct RoofShadowEffect {
    strength: f32,
    module: Option<wgpu::ShaderModule>,
    bind_layout: Option<wgpu::BindGroupLayout>,
    sampler: Option<wgpu::Sampler>,
    uniform: Option<wgpu::Buffer>,
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
    mask_view: Option<wgpu::TextureView>,
    darkness: f32,
}

impl RoofShadowEffect {
    pub fn new() -> Self {
        Self {
            strength: 0.6,
            module: None,
            bind_layout: None,
            sampler: None,
            uniform: None,
            pipelines: HashMap::new(),
            mask_view: None,
            darkness: 0.0,
        }
    }
}

impl Default for RoofShadowEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneMeshEffect for RoofShadowEffect {
    fn create_mesh(&mut self, ctx: &mut EffectCtx<'_>) -> Result<()> {
        let source = wgsl::fullscreen_module(wgsl::ROOF_SHADOW_FS);
        wgsl::validate_wgsl(&source, "roof shadow")?;
        self.module = Some(ctx.gpu.create_shader("tilefx.fx.roof_shadow", &source));
        self.bind_layout = Some(ctx.gpu.fullscreen_bind_layout("tilefx.fx.roof_shadow", 1, true));
        self.sampler = Some(ctx.gpu.linear_clamp_sampler("tilefx.fx.roof_shadow"));
        self.uniform = Some(ctx.gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tilefx.fx.roof_shadow.params"),
            size: 16,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        Ok(())
    }

    fn prepare_frame(&mut self, _info: &FrameInfo, ctx: &mut EffectCtx<'_>) -> Result<()> {
        self.darkness = ctx.frame_state.darkness_level;
        if let Some(uniform) = &self.uniform {
            let values = [self.strength, self.darkness, 0.0, 0.0];
            ctx.gpu
                .queue
                .write_buffer(uniform, 0, bytemuck::bytes_of(&values));
        }
        Ok(())
    }

    fn render(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        ctx: &mut EffectCtx<'_>,
    ) -> Result<()> {
        // No outdoors mask on this floor: nothing to darken.
        let Some(mask_view) = self.mask_view.as_ref() else {
            return Ok(());
        };
        let (Some(module), Some(bind_layout), Some(sampler), Some(uniform)) = (
            self.module.as_ref(),
            self.bind_layout.as_ref(),
            self.sampler.as_ref(),
            self.uniform.as_ref(),
        ) else {
            anyhow::bail!("roof shadow rendered before create_mesh");
        };

        let pipeline = self.pipelines.entry(ctx.output_format).or_insert_with(|| {
            ctx.gpu.build_fullscreen_pipeline(
                "tilefx.fx.roof_shadow",
                module,
                bind_layout,
                ctx.output_format,
                Some(wgpu::BlendState::ALPHA_BLENDING),
            )
        });

        let bind_group = ctx.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tilefx.fx.roof_shadow"),
            layout: bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(mask_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform.as_entire_binding(),
                },
            ],
        });

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("tilefx.fx.roof_shadow"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        rpass.set_pipeline(pipeline);
        rpass.set_bind_group(0, &bind_group, &[]);
        rpass.draw(0..3, 0..1);
        Ok(())
    }

    fn bind_floor_masks(&mut self, bundle: &MaskBundle, _floor_key: usize) {
        self.mask_view = bundle.view(MaskKind::Outdoors).cloned();
    }

    fn on_mask_arrived(&mut self, kind: MaskKind, view: &wgpu::TextureView) {
        if kind == MaskKind::Outdoors {
            self.mask_view = Some(view.clone());
        }
    }

    fn params_changed(&mut self, params: &ParamMap) {
        self.strength = param_f32(params, "strength", 0.6).clamp(0.0, 1.0);
    }

    fn dispose(&mut self) {
        self.pipelines.clear();
        self.module = None;
        self.bind_layout = None;
        self.sampler = None;
        self.uniform = None;
        self.mask_view = None;
    }
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct BlurUniform {
    dir: [f32; 4],
    taps: [[f32; 4]; 8],
}

/// Separable Gaussian blur: horizontal into an effect-owned intermediate,
/// vertical into the chain target.
pub struct GaussianBlurEffect {
    radius_px: f32,
    module: Option<wgpu::ShaderModule>,
    bind_layout: Option<wgpu::BindGroupLayout>,
    sampler: Option<wgpu::Sampler>,
    uniform_h: Option<wgpu::Buffer>,
    uniform_v: Option<wgpu::Buffer>,
    intermediate: Option<(wgpu::Texture, wgpu::TextureView, [u32; 2], wgpu::TextureFormat)>,
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
    input: Option<wgpu::TextureView>,
}

impl GaussianBlurEffect {
    pub fn new() -> Self {
        Self {
            radius_px: 4.0,
            module: None,
            bind_layout: None,
            sampler: None,
            uniform_h: None,
            uniform_v: None,
            intermediate: None,
            pipelines: HashMap::new(),
            input: None,
        }
    }

    fn blur_uniform(&self, direction: [f32; 2]) -> BlurUniform {
        let sigma = (self.radius_px / 3.0).max(0.1);
        let (offsets, weights, count) = wgsl::gaussian_taps_8(sigma);
        let mut taps = [[0.0f32; 4]; 8];
        for i in 0..8 {
            taps[i] = [offsets[i], weights[i], 0.0, 0.0];
        }
        BlurUniform {
            dir: [direction[0], direction[1], count as f32, 0.0],
            taps,
        }
    }

    fn ensure_intermediate(&mut self, ctx: &EffectCtx<'_>, size: [u32; 2]) {
        let pool_format = ctx.pool.color_format();
        let stale = match &self.intermediate {
            Some((_, _, s, f)) => *s != size || *f != pool_format,
            None => true,
        };
        if stale {
            let texture = ctx.gpu.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("tilefx.fx.blur.intermediate"),
                size: wgpu::Extent3d {
                    width: size[0],
                    height: size[1],
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: pool_format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            self.intermediate = Some((texture, view, size, pool_format));
        }
    }
}

impl Default for GaussianBlurEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl PostProcessEffect for GaussianBlurEffect {
    fn create_material(&mut self, ctx: &mut EffectCtx<'_>) -> Result<()> {
        let source = wgsl::fullscreen_module(wgsl::GAUSSIAN_BLUR_FS);
        wgsl::validate_wgsl(&source, "gaussian blur")?;
        self.module = Some(ctx.gpu.create_shader("tilefx.fx.blur", &source));
        self.bind_layout = Some(ctx.gpu.fullscreen_bind_layout("tilefx.fx.blur", 1, true));
        self.sampler = Some(ctx.gpu.linear_clamp_sampler("tilefx.fx.blur"));
        for uniform in [&mut self.uniform_h, &mut self.uniform_v] {
            *uniform = Some(ctx.gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("tilefx.fx.blur.params"),
                size: std::mem::size_of::<BlurUniform>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
        }
        Ok(())
    }

    fn set_input_texture(&mut self, view: wgpu::TextureView) {
        self.input = Some(view);
    }

    fn set_buffers(&mut self, _read: TargetName, _write: Option<TargetName>) {}

    fn set_render_to_screen(&mut self, _to_screen: bool) {
        // Both passes are format-aware already; nothing differs on-screen.
    }

    fn on_update(&mut self, _info: &FrameInfo, ctx: &mut EffectCtx<'_>) -> Result<()> {
        let horizontal = self.blur_uniform([1.0, 0.0]);
        let vertical = self.blur_uniform([0.0, 1.0]);
        if let (Some(h), Some(v)) = (&self.uniform_h, &self.uniform_v) {
            ctx.gpu.queue.write_buffer(h, 0, bytemuck::bytes_of(&horizontal));
            ctx.gpu.queue.write_buffer(v, 0, bytemuck::bytes_of(&vertical));
        }
        Ok(())
    }

    fn render(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        ctx: &mut EffectCtx<'_>,
    ) -> Result<()> {
        self.ensure_intermediate(ctx, ctx.frame_state.buffer_size);
        let pool_format = ctx.pool.color_format();
        let (Some(module), Some(bind_layout), Some(sampler), Some(uniform_h), Some(uniform_v)) = (
            self.module.as_ref(),
            self.bind_layout.as_ref(),
            self.sampler.as_ref(),
            self.uniform_h.as_ref(),
            self.uniform_v.as_ref(),
        ) else {
            anyhow::bail!("blur rendered before create_material");
        };
        let Some(input) = self.input.as_ref() else {
            anyhow::bail!("blur rendered without an input texture");
        };
        let (_, intermediate_view, _, _) =
            self.intermediate.as_ref().expect("intermediate just ensured");

        for format in [pool_format, ctx.output_format] {
            self.pipelines.entry(format).or_insert_with(|| {
                ctx.gpu
                    .build_fullscreen_pipeline("tilefx.fx.blur", module, bind_layout, format, None)
            });
        }

        let intermediate_src = intermediate_view.clone();
        let passes = [
            (input, uniform_h, intermediate_view, pool_format),
            (&intermediate_src, uniform_v, target, ctx.output_format),
        ];
        for (src, uniform, dst, format) in passes {
            let bind_group = ctx.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("tilefx.fx.blur"),
                layout: bind_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(src),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: uniform.as_entire_binding(),
                    },
                ],
            });
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("tilefx.fx.blur"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: dst,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            rpass.set_pipeline(&self.pipelines[&format]);
            rpass.set_bind_group(0, &bind_group, &[]);
            rpass.draw(0..3, 0..1);
        }
        Ok(())
    }

    fn params_changed(&mut self, params: &ParamMap) {
        self.radius_px = param_f32(params, "radius", 4.0).clamp(0.0, 32.0);
    }

    fn dispose(&mut self) {
        self.pipelines.clear();
        self.module = None;
        self.bind_layout = None;
        self.sampler = None;
        self.uniform_h = None;
        self.uniform_v = None;
        self.intermediate = None;
        self.input = None;
    }
}

const RAIN_DROP_COUNT: usize = 128;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct RainUniform {
    dir: [f32; 4],
    drops: [[f32; 4]; RAIN_DROP_COUNT],
}

#[derive(Clone, Copy)]
struct RainDrop {
    pos: [f32; 2],
    speed: f32,
    life: f32,
}

/// Rain streaks falling across the floor, visible only where the outdoors
/// mask is set. Lifetimes integrate in `prepare_frame` so the simulation
/// speed is independent of floor count.
pub struct RainEffect {
    intensity: f32,
    drops: Vec<RainDrop>,
    rng_state: u32,
    fall_dir: [f32; 2],
    module: Option<wgpu::ShaderModule>,
    bind_layout: Option<wgpu::BindGroupLayout>,
    sampler: Option<wgpu::Sampler>,
    uniform: Option<wgpu::Buffer>,
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
    mask_view: Option<wgpu::TextureView>,
}

impl RainEffect {
    pub fn new() -> Self {
        Self {
            intensity: 0.7,
            drops: Vec::new(),
            rng_state: 0x9e37_79b9,
            fall_dir: [0.08, 1.0],
            module: None,
            bind_layout: None,
            sampler: None,
            uniform: None,
            pipelines: HashMap::new(),
            mask_view: None,
        }
    }

    fn next_unit(&mut self) -> f32 {
        // xorshift32; good enough for spawn jitter.
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng_state = x;
        (x >> 8) as f32 / ((1u32 << 24) as f32)
    }

    fn spawn_drop(&mut self) -> RainDrop {
        RainDrop {
            pos: [self.next_unit(), -self.next_unit() * 0.2],
            speed: 0.8 + self.next_unit() * 0.6,
            life: 1.0 + self.next_unit() * 2.0,
        }
    }
}

impl Default for RainEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl ParticleEffect for RainEffect {
    fn create_particle_systems(&mut self, ctx: &mut EffectCtx<'_>) -> Result<()> {
        let source = wgsl::fullscreen_module(wgsl::RAIN_FS);
        wgsl::validate_wgsl(&source, "rain")?;
        self.module = Some(ctx.gpu.create_shader("tilefx.fx.rain", &source));
        self.bind_layout = Some(ctx.gpu.fullscreen_bind_layout("tilefx.fx.rain", 1, true));
        self.sampler = Some(ctx.gpu.linear_clamp_sampler("tilefx.fx.rain"));
        self.uniform = Some(ctx.gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tilefx.fx.rain.params"),
            size: std::mem::size_of::<RainUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        self.drops = (0..RAIN_DROP_COUNT).map(|_| RainDrop {
            pos: [0.0, 2.0],
            speed: 1.0,
            life: 0.0,
        })
        .collect();
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.intensity > 0.0 && !self.drops.is_empty()
    }

    fn prepare_frame(&mut self, info: &FrameInfo, ctx: &mut EffectCtx<'_>) -> Result<()> {
        let wind = ctx.frame_state.wind_direction.to_radians();
        let lean = ctx.frame_state.wind_speed.clamp(0.0, 1.0) * 0.3;
        let dir = [wind.sin() * lean + 0.05, 1.0];
        let len = (dir[0] * dir[0] + dir[1] * dir[1]).sqrt();
        self.fall_dir = [dir[0] / len, dir[1] / len];

        for i in 0..self.drops.len() {
            let mut drop = self.drops[i];
            drop.life -= info.delta;
            drop.pos[0] += self.fall_dir[0] * drop.speed * info.delta;
            drop.pos[1] += self.fall_dir[1] * drop.speed * info.delta;
            if drop.life <= 0.0 || drop.pos[1] > 1.1 {
                drop = self.spawn_drop();
            }
            self.drops[i] = drop;
        }
        Ok(())
    }

    fn on_update(&mut self, _info: &FrameInfo, ctx: &mut EffectCtx<'_>) -> Result<()> {
        let Some(uniform) = &self.uniform else {
            return Ok(());
        };
        let mut data = RainUniform {
            dir: [self.fall_dir[0], self.fall_dir[1], 0.02, self.intensity],
            drops: [[0.0; 4]; RAIN_DROP_COUNT],
        };
        for (slot, drop) in data.drops.iter_mut().zip(&self.drops) {
            let fade = drop.life.clamp(0.0, 1.0);
            *slot = [drop.pos[0], drop.pos[1], 0.0, fade];
        }
        ctx.gpu.queue.write_buffer(uniform, 0, bytemuck::bytes_of(&data));
        Ok(())
    }

    fn render(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        ctx: &mut EffectCtx<'_>,
    ) -> Result<()> {
        // Indoors-only floors have no outdoors mask and get no rain.
        let Some(mask_view) = self.mask_view.as_ref() else {
            return Ok(());
        };
        let (Some(module), Some(bind_layout), Some(sampler), Some(uniform)) = (
            self.module.as_ref(),
            self.bind_layout.as_ref(),
            self.sampler.as_ref(),
            self.uniform.as_ref(),
        ) else {
            anyhow::bail!("rain rendered before create_particle_systems");
        };

        let pipeline = self.pipelines.entry(ctx.output_format).or_insert_with(|| {
            ctx.gpu.build_fullscreen_pipeline(
                "tilefx.fx.rain",
                module,
                bind_layout,
                ctx.output_format,
                Some(wgpu::BlendState::ALPHA_BLENDING),
            )
        });

        let bind_group = ctx.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tilefx.fx.rain"),
            layout: bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(mask_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform.as_entire_binding(),
                },
            ],
        });

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("tilefx.fx.rain"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        rpass.set_pipeline(pipeline);
        rpass.set_bind_group(0, &bind_group, &[]);
        rpass.draw(0..3, 0..1);
        Ok(())
    }

    fn bind_floor_masks(&mut self, bundle: &MaskBundle, _floor_key: usize) {
        self.mask_view = bundle.view(MaskKind::Outdoors).cloned();
    }

    fn on_mask_arrived(&mut self, kind: MaskKind, view: &wgpu::TextureView) {
        if kind == MaskKind::Outdoors {
            self.mask_view = Some(view.clone());
        }
    }

    fn params_changed(&mut self, params: &ParamMap) {
        self.intensity = param_f32(params, "intensity", 0.7).clamp(0.0, 1.0);
    }

    fn dispose(&mut self) {
        self.pipelines.clear();
        self.module = None;
        self.bind_layout = None;
        self.sampler = None;
        self.uniform = None;
        self.mask_view = None;
        self.drops.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rain_rng_is_deterministic_and_in_range() {
        let mut a = RainEffect::new();
        let mut b = RainEffect::new();
        for _ in 0..100 {
            let va = a.next_unit();
            assert_eq!(va, b.next_unit());
            assert!((0.0..1.0).contains(&va));
        }
    }

    #[test]
    fn blur_uniform_encodes_taps_for_both_axes() {
        let blur = GaussianBlurEffect::new();
        let h = blur.blur_uniform([1.0, 0.0]);
        let v = blur.blur_uniform([0.0, 1.0]);
        assert_eq!(h.dir[2], v.dir[2], "tap count depends only on radius");
        assert!(h.dir[2] >= 1.0);
        assert_eq!(h.taps, v.taps);
        assert_eq!(h.dir[0], 1.0);
        assert_eq!(v.dir[1], 1.0);
    }
}

