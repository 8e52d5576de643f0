//! Device/queue context and shared pipeline plumbing.
//!
//! All GPU work in the crate goes through a [`GpuContext`]. The context also
//! counts pipeline creations so the warmup pass can report shader-compile
//! progress without renderer internals.

use std::cell::Cell;
use std::sync::Arc;

use anyhow::{Result, anyhow};

/// Shared handle to the device and queue plus adapter-derived capabilities.
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    adapter: Option<Arc<wgpu::Adapter>>,
    pipelines_created: Cell<u64>,
}

impl GpuContext {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        adapter: Option<Arc<wgpu::Adapter>>,
    ) -> Self {
        Self {
            device,
            queue,
            adapter,
            pipelines_created: Cell::new(0),
        }
    }

    /// Format features as the adapter reports them, falling back to WebGPU's
    /// guaranteed feature set when adapter-specific queries are unavailable.
    pub fn format_features(&self, format: wgpu::TextureFormat) -> wgpu::TextureFormatFeatures {
        let device_features = self.device.features();
        if device_features.contains(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES) {
            if let Some(adapter) = self.adapter.as_ref() {
                return adapter.get_texture_format_features(format);
            }
        }
        format.guaranteed_format_features(device_features)
    }

    /// Whether the given format can serve as a blendable, filterable render
    /// target — the requirements of every target in the pool.
    pub fn supports_render_target(&self, format: wgpu::TextureFormat) -> bool {
        let features = self.format_features(format);
        features
            .allowed_usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING)
            && features
                .flags
                .contains(wgpu::TextureFormatFeatureFlags::FILTERABLE)
            && features
                .flags
                .contains(wgpu::TextureFormatFeatureFlags::BLENDABLE)
    }

    pub fn create_shader(&self, label: &str, source: &str) -> wgpu::ShaderModule {
        self.device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(std::borrow::Cow::Owned(source.to_string())),
            })
    }

    /// Number of render pipelines built through this context so far.
    pub fn pipelines_created(&self) -> u64 {
        self.pipelines_created.get()
    }

    pub fn linear_clamp_sampler(&self, label: &str) -> wgpu::Sampler {
        self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        })
    }

    /// Bind group layout for `texture_2d<f32>` entries followed by one
    /// sampler, optionally followed by one uniform buffer — the shape every
    /// fullscreen pass in this crate uses.
    pub fn fullscreen_bind_layout(
        &self,
        label: &str,
        texture_count: u32,
        with_uniform: bool,
    ) -> wgpu::BindGroupLayout {
        let mut entries = Vec::new();
        for binding in 0..texture_count {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: texture_count,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
        if with_uniform {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: texture_count + 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }
        self.device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &entries,
            })
    }

    /// Build a fullscreen-triangle pipeline (`vs_main`/`fs_main`, draw
    /// `0..3`) over the given bind group layout.
    pub fn build_fullscreen_pipeline(
        &self,
        label: &str,
        module: &wgpu::ShaderModule,
        bind_layout: &wgpu::BindGroupLayout,
        target_format: wgpu::TextureFormat,
        blend: Option<wgpu::BlendState>,
    ) -> wgpu::RenderPipeline {
        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[bind_layout],
                push_constant_ranges: &[],
            });

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: target_format,
                        blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
        self.pipelines_created.set(self.pipelines_created.get() + 1);
        pipeline
    }

    /// Record a pipeline created outside the shared helpers so warmup counts
    /// stay honest.
    pub fn note_pipeline_created(&self) {
        self.pipelines_created.set(self.pipelines_created.get() + 1);
    }
}

/// Adapter + device acquired without a window, for tests and offscreen use.
pub struct HeadlessGpu {
    pub ctx: GpuContext,
}

impl HeadlessGpu {
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| anyhow!("no suitable GPU adapter: {e}"))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("tilefx.headless"),
            ..Default::default()
        }))
        .map_err(|e| anyhow!("failed to acquire device: {e}"))?;

        Ok(Self {
            ctx: GpuContext::new(
                Arc::new(device),
                Arc::new(queue),
                Some(Arc::new(adapter)),
            ),
        })
    }
}
