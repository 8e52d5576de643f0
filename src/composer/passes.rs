//! Fixed compositor passes.
//!
//! Blit, floor-over-accumulator composite, alpha clip and the depth-debug
//! visualiser. Pipelines are cached per target format because the screen's
//! surface format differs from the pool's HDR format.

use std::collections::HashMap;

use crate::gpu::GpuContext;
use crate::wgsl;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum PassKind {
    Blit,
    CompositeOver,
    AlphaClip,
    DepthDebug,
}

pub struct ComposerPasses {
    blit_module: wgpu::ShaderModule,
    composite_module: wgpu::ShaderModule,
    clip_module: wgpu::ShaderModule,
    depth_module: wgpu::ShaderModule,
    tex1_layout: wgpu::BindGroupLayout,
    tex2_layout: wgpu::BindGroupLayout,
    depth_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    pipelines: HashMap<(PassKind, wgpu::TextureFormat), wgpu::RenderPipeline>,
}

impl ComposerPasses {
    pub fn new(ctx: &GpuContext) -> Self {
        let blit_module =
            ctx.create_shader("tilefx.pass.blit", &wgsl::fullscreen_module(wgsl::BLIT_FS));
        let composite_module = ctx.create_shader(
            "tilefx.pass.composite_over",
            &wgsl::fullscreen_module(wgsl::COMPOSITE_OVER_FS),
        );
        let clip_module = ctx.create_shader(
            "tilefx.pass.alpha_clip",
            &wgsl::fullscreen_module(wgsl::ALPHA_CLIP_FS),
        );
        let depth_module = ctx.create_shader("tilefx.pass.depth_debug", wgsl::DEPTH_DEBUG);

        let tex1_layout = ctx.fullscreen_bind_layout("tilefx.pass.tex1", 1, false);
        let tex2_layout = ctx.fullscreen_bind_layout("tilefx.pass.tex2", 2, false);
        let depth_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("tilefx.pass.depth"),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Depth,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    }],
                });

        Self {
            blit_module,
            composite_module,
            clip_module,
            depth_module,
            tex1_layout,
            tex2_layout,
            depth_layout,
            sampler: ctx.linear_clamp_sampler("tilefx.pass.sampler"),
            pipelines: HashMap::new(),
        }
    }

    /// Clear a target to transparent black without drawing.
    pub fn clear(encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("tilefx.pass.clear"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
    }

    /// Straight copy, replacing the destination.
    pub fn blit(
        &mut self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        src: &wgpu::TextureView,
        dst: &wgpu::TextureView,
        dst_format: wgpu::TextureFormat,
    ) {
        let pipeline = self.pipeline(ctx, PassKind::Blit, dst_format);
        let bind_group = self.tex1_group(ctx, src);
        draw_fullscreen(encoder, &pipeline, &bind_group, dst, wgpu::LoadOp::Load);
    }

    /// Premultiplied alpha-over of `src` onto `dst`. The shader zeroes RGB
    /// below the 0.004 alpha threshold before the blend.
    pub fn composite_over(
        &mut self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        src: &wgpu::TextureView,
        dst: &wgpu::TextureView,
        dst_format: wgpu::TextureFormat,
    ) {
        let pipeline = self.pipeline(ctx, PassKind::CompositeOver, dst_format);
        let bind_group = self.tex1_group(ctx, src);
        draw_fullscreen(encoder, &pipeline, &bind_group, dst, wgpu::LoadOp::Load);
    }

    /// Multiply a floor image by its clip mask into `dst` (cleared first).
    pub fn alpha_clip(
        &mut self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        color: &wgpu::TextureView,
        mask: &wgpu::TextureView,
        dst: &wgpu::TextureView,
        dst_format: wgpu::TextureFormat,
    ) {
        let pipeline = self.pipeline(ctx, PassKind::AlphaClip, dst_format);
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tilefx.pass.alpha_clip"),
            layout: &self.tex2_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(color),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(mask),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        draw_fullscreen(
            encoder,
            &pipeline,
            &bind_group,
            dst,
            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
        );
    }

    /// Render the depth texture into a subwindow of the screen.
    pub fn depth_debug(
        &mut self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        depth: &wgpu::TextureView,
        dst: &wgpu::TextureView,
        dst_format: wgpu::TextureFormat,
        viewport: [f32; 4],
    ) {
        let pipeline = self.pipeline(ctx, PassKind::DepthDebug, dst_format);
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tilefx.pass.depth_debug"),
            layout: &self.depth_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(depth),
            }],
        });

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("tilefx.pass.depth_debug"),
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
        rpass.set_viewport(viewport[0], viewport[1], viewport[2], viewport[3], 0.0, 1.0);
        rpass.set_pipeline(&pipeline);
        rpass.set_bind_group(0, &bind_group, &[]);
        rpass.draw(0..3, 0..1);
    }

    fn tex1_group(&self, ctx: &GpuContext, src: &wgpu::TextureView) -> wgpu::BindGroup {
        ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tilefx.pass.tex1"),
            layout: &self.tex1_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(src),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }

    fn pipeline(
        &mut self,
        ctx: &GpuContext,
        kind: PassKind,
        format: wgpu::TextureFormat,
    ) -> wgpu::RenderPipeline {
        if let Some(p) = self.pipelines.get(&(kind, format)) {
            return p.clone();
        }
        let (module, layout, blend, label) = match kind {
            PassKind::Blit => (&self.blit_module, &self.tex1_layout, None, "tilefx.pass.blit"),
            PassKind::CompositeOver => (
                &self.composite_module,
                &self.tex1_layout,
                Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                "tilefx.pass.composite_over",
            ),
            PassKind::AlphaClip => (
                &self.clip_module,
                &self.tex2_layout,
                None,
                "tilefx.pass.alpha_clip",
            ),
            PassKind::DepthDebug => (
                &self.depth_module,
                &self.depth_layout,
                None,
                "tilefx.pass.depth_debug",
            ),
        };
        let pipeline = ctx.build_fullscreen_pipeline(label, module, layout, format, blend);
        self.pipelines.insert((kind, format), pipeline.clone());
        pipeline
    }
}

fn draw_fullscreen(
    encoder: &mut wgpu::CommandEncoder,
    pipeline: &wgpu::RenderPipeline,
    bind_group: &wgpu::BindGroup,
    dst: &wgpu::TextureView,
    load: wgpu::LoadOp<wgpu::Color>,
) {
    let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: None,
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: dst,
            resolve_target: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        occlusion_query_set: None,
        timestamp_writes: None,
    });
    rpass.set_pipeline(pipeline);
    rpass.set_bind_group(0, bind_group, &[]);
    rpass.draw(0..3, 0..1);
}
