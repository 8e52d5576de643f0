//! Named, resize-tracked offscreen render targets.
//!
//! The pool owns every offscreen colour buffer the compositor renders into:
//! the scene target, the ping-pong pair, per-floor targets and the
//! accumulator. Targets are HDR float where the GPU supports it; the
//! precision is chosen once at startup and never switches mid-session.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, bail};
use half::f16;

use crate::gpu::GpuContext;

/// Interned target name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetName(Arc<str>);

impl TargetName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TargetName {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for TargetName {
    fn from(s: String) -> Self {
        Self(Arc::from(s.as_str()))
    }
}

impl std::fmt::Display for TargetName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Well-known target names used by the composer.
pub mod names {
    pub const SCENE: &str = "scene";
    pub const POST_1: &str = "post_1";
    pub const POST_2: &str = "post_2";
    pub const FLOOR: &str = "floor";
    pub const FLOOR_POST_A: &str = "floor_post_a";
    pub const FLOOR_POST_B: &str = "floor_post_b";
    pub const FLOOR_FINAL: &str = "floor_final";
    pub const FLOOR_CLIP: &str = "floor_clip";
    pub const ACCUMULATION: &str = "accumulation";
}

/// One named offscreen buffer. Dimensions always equal the current drawing
/// buffer size; the texture is reused across frames.
pub struct RenderTarget {
    pub name: TargetName,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub depth_view: Option<wgpu::TextureView>,
    pub size: [u32; 2],
    pub with_depth: bool,
}

/// Chosen once at pool creation, never changed mid-session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetPrecision {
    HdrFloat16,
    Unorm8,
}

pub struct RenderTargetPool {
    gpu_device: Arc<wgpu::Device>,
    targets: HashMap<TargetName, RenderTarget>,
    color_format: wgpu::TextureFormat,
    precision: TargetPrecision,
    max_dimension: u32,
    disposed: bool,
}

impl RenderTargetPool {
    /// Probe the adapter once and lock in the target precision.
    pub fn new(ctx: &GpuContext) -> Self {
        let (color_format, precision) =
            if ctx.supports_render_target(wgpu::TextureFormat::Rgba16Float) {
                (wgpu::TextureFormat::Rgba16Float, TargetPrecision::HdrFloat16)
            } else {
                (wgpu::TextureFormat::Rgba8Unorm, TargetPrecision::Unorm8)
            };
        if precision == TargetPrecision::Unorm8 {
            eprintln!("[composer] HDR float targets unsupported; falling back to 8-bit");
        }
        Self {
            gpu_device: ctx.device.clone(),
            targets: HashMap::new(),
            color_format,
            precision,
            max_dimension: ctx.device.limits().max_texture_dimension_2d,
            disposed: false,
        }
    }

    pub fn color_format(&self) -> wgpu::TextureFormat {
        self.color_format
    }

    pub fn precision(&self) -> TargetPrecision {
        self.precision
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Fetch a target, creating it lazily and re-creating it when the
    /// requested dimensions differ from the cached ones. Failure here is
    /// fatal to the session: the pool marks itself disposed.
    pub fn get(
        &mut self,
        name: &str,
        width: u32,
        height: u32,
        with_depth: bool,
    ) -> Result<&RenderTarget> {
        if self.disposed {
            bail!("render target pool is disposed");
        }
        if width == 0 || height == 0 || width > self.max_dimension || height > self.max_dimension {
            self.disposed = true;
            bail!(
                "render target '{name}' has unusable dimensions {width}x{height} (max {})",
                self.max_dimension
            );
        }

        let key = TargetName::from(name);
        let needs_create = match self.targets.get(&key) {
            Some(existing) => {
                existing.size != [width, height] || existing.with_depth != with_depth
            }
            None => true,
        };

        if needs_create {
            let target = self.create_target(key.clone(), width, height, with_depth);
            self.targets.insert(key.clone(), target);
        }
        Ok(self.targets.get(&key).expect("target just inserted"))
    }

    /// Re-size every cached target to the new drawing-buffer dimensions.
    pub fn resize_all(&mut self, width: u32, height: u32) -> Result<()> {
        if self.disposed {
            bail!("render target pool is disposed");
        }
        let names: Vec<(TargetName, bool)> = self
            .targets
            .iter()
            .filter(|(_, t)| t.size != [width, height])
            .map(|(name, t)| (name.clone(), t.with_depth))
            .collect();
        for (name, with_depth) in names {
            let target = self.create_target(name.clone(), width, height, with_depth);
            self.targets.insert(name, target);
        }
        Ok(())
    }

    pub fn dispose(&mut self) {
        self.targets.clear();
        self.disposed = true;
    }

    fn create_target(
        &self,
        name: TargetName,
        width: u32,
        height: u32,
        with_depth: bool,
    ) -> RenderTarget {
        let texture = self.gpu_device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("tilefx.rt.{name}")),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.color_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let depth_view = with_depth.then(|| {
            let depth = self.gpu_device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&format!("tilefx.rt.{name}.depth")),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Depth32Float,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            });
            depth.create_view(&wgpu::TextureViewDescriptor::default())
        });

        RenderTarget {
            name,
            texture,
            view,
            depth_view,
            size: [width, height],
            with_depth,
        }
    }
}

/// Bytes per pixel of the pool's colour format.
fn bytes_per_pixel(format: wgpu::TextureFormat) -> u32 {
    match format {
        wgpu::TextureFormat::Rgba16Float => 8,
        _ => 4,
    }
}

/// Read a target (or any copyable RGBA texture) back into tightly packed
/// RGBA8 bytes. HDR targets are tonemapped by clamping to `[0, 1]`.
pub fn read_back_rgba8(
    ctx: &GpuContext,
    texture: &wgpu::Texture,
    size: [u32; 2],
    format: wgpu::TextureFormat,
) -> Result<Vec<u8>> {
    let [width, height] = size;
    let bpp = bytes_per_pixel(format);
    let unpadded_row = width * bpp;
    let padded_row = unpadded_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
        * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let buffer_size = (padded_row * height) as u64;

    let readback = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("tilefx.readback"),
        size: buffer_size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("tilefx.readback.encoder"),
        });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &readback,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    ctx.queue.submit(std::iter::once(encoder.finish()));

    let slice = readback.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });

    let mut mapped_ok = false;
    for _ in 0..500 {
        let _ = ctx.device.poll(wgpu::PollType::Poll);
        if let Ok(result) = rx.try_recv() {
            mapped_ok = result.is_ok();
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    if !mapped_ok {
        readback.unmap();
        bail!("readback buffer mapping timed out");
    }

    let padded = slice.get_mapped_range().to_vec();
    readback.unmap();

    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for row in 0..height {
        let start = (row * padded_row) as usize;
        let row_bytes = &padded[start..start + unpadded_row as usize];
        match format {
            wgpu::TextureFormat::Rgba16Float => {
                for chunk in row_bytes.chunks_exact(2) {
                    let value = f16::from_le_bytes([chunk[0], chunk[1]]).to_f32();
                    pixels.push((value.clamp(0.0, 1.0) * 255.0).round() as u8);
                }
            }
            _ => pixels.extend_from_slice(row_bytes),
        }
    }
    Ok(pixels)
}
