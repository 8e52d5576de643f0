//! GPU mask composition.
//!
//! For every floor, each mask kind is composed by drawing the contributing
//! tiles' mask textures into one scene-space target at their world rects,
//! honouring rotation, mirror flips and tile alpha. Ordering within a kind
//! is tile sort key ascending then document id, so recomposition is
//! deterministic.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use anyhow::{Context, Result};
use wgpu::util::DeviceExt;

use crate::gpu::GpuContext;
use crate::host::{Floor, SceneHost, TextureRole, TileDoc, TriState, WallDoc};
use crate::masks::{MaskBundle, MaskKind, MaskTexture};
use crate::target_pool::read_back_rgba8;
use crate::walls::{WALL_THICKNESS, occluders_for_floor};
use crate::wgsl;

/// A `_Water` mask covering more than this fraction of its tile (averaged on
/// a 64x64 readback) is treated as a degenerate whole-tile mask and replaced
/// by the tile's alpha channel — otherwise tinting would blanket the tile.
pub const WATER_DEGENERATE_COVERAGE: f32 = 0.98;

/// Longest edge of a composed mask texture.
const MASK_RESOLUTION_MAX: u32 = 2048;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct TileTransformUniform {
    scene_rect: [f32; 4],
    center_half: [f32; 4],
    rot_flip: [f32; 4],
    misc: [f32; 4],
}

/// Where a tile's scalar comes from for a given kind.
#[derive(Clone, Debug, PartialEq)]
enum MaskSource {
    /// A resolved sibling mask file.
    Url(String),
    /// The tile's own alpha channel (degenerate water masks, forced-on
    /// specular without a file, and the generated floor-alpha mask).
    AlbedoAlpha,
}

struct CachedTexture {
    view: wgpu::TextureView,
    /// Average of `r * a` over a 64x64 subsample, for the water heuristic.
    coverage: f32,
}

struct CachedBundle {
    signature: u64,
    bundle: MaskBundle,
}

pub struct MaskCompositor {
    pipeline: wgpu::RenderPipeline,
    bind_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    /// 1x1 white texture backing wall erase draws.
    white_view: wgpu::TextureView,
    resolver: super::MaskResolver,
    bundles: HashMap<usize, CachedBundle>,
    /// Mask-file textures by URL. `None` records a decode failure so the
    /// warning logs once and the tile stays excluded.
    mask_textures: HashMap<String, Option<CachedTexture>>,
    /// Albedo textures by path, used when the alpha channel is the scalar.
    albedo_textures: HashMap<String, Option<CachedTexture>>,
}

impl MaskCompositor {
    pub fn new(ctx: &GpuContext) -> Self {
        let bind_layout = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("tilefx.masks.layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let module = ctx.create_shader("tilefx.masks.compose", wgsl::MASK_COMPOSE);
        let layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("tilefx.masks.compose"),
                bind_group_layouts: &[&bind_layout],
                push_constant_ranges: &[],
            });
        let pipeline = ctx
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("tilefx.masks.compose"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: wgpu::TextureFormat::Rgba8Unorm,
                        blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
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
        ctx.note_pipeline_created();

        let white = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("tilefx.masks.white"),
            size: wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &white,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &[255, 255, 255, 255],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
        );

        Self {
            pipeline,
            bind_layout,
            sampler: ctx.linear_clamp_sampler("tilefx.masks.sampler"),
            white_view: white.create_view(&wgpu::TextureViewDescriptor::default()),
            resolver: super::MaskResolver::new(),
            bundles: HashMap::new(),
            mask_textures: HashMap::new(),
            albedo_textures: HashMap::new(),
        }
    }

    /// Compose (or fetch the cached) bundle for one floor.
    pub fn compose_floor(
        &mut self,
        ctx: &GpuContext,
        host: &dyn SceneHost,
        floor: &Floor,
    ) -> Result<&MaskBundle> {
        let mut tiles: Vec<TileDoc> = host
            .tiles()
            .into_iter()
            .filter(|t| !t.flags.bypass_effects && floor.contains_elevation(t.elevation))
            .collect();
        tiles.sort_by(|a, b| a.sort.cmp(&b.sort).then_with(|| a.id.cmp(&b.id)));

        let mut sources: Vec<Vec<(MaskKind, MaskSource)>> = Vec::with_capacity(tiles.len());
        for tile in &tiles {
            sources.push(self.sources_for_tile(host, tile)?);
        }

        let walls = host.walls();
        let signature = bundle_signature(floor, host.scene_rect(), &tiles, &sources, &walls);
        let cached_is_current = self
            .bundles
            .get(&floor.index)
            .is_some_and(|c| c.signature == signature);

        if !cached_is_current {
            let bundle = self.compose_bundle(ctx, host, floor, &tiles, &sources)?;
            self.bundles
                .insert(floor.index, CachedBundle { signature, bundle });
        }
        Ok(&self.bundles.get(&floor.index).expect("bundle just cached").bundle)
    }

    /// The cached bundle for a floor, if one has been composed.
    pub fn bundle(&self, floor_index: usize) -> Option<&MaskBundle> {
        self.bundles.get(&floor_index).map(|c| &c.bundle)
    }

    /// CPU pixels of the last composed texture for a kind, read back lazily
    /// and cached until the bundle is invalidated. `None` when the floor has
    /// no such mask.
    pub fn cpu_pixels(
        &mut self,
        ctx: &GpuContext,
        floor_index: usize,
        kind: MaskKind,
    ) -> Option<&[u8]> {
        let cached = self.bundles.get_mut(&floor_index)?;
        if !cached.bundle.cpu.contains_key(&kind) {
            let pixels = cached.bundle.textures.get(&kind).and_then(|t| {
                read_back_rgba8(ctx, &t.texture, t.size, wgpu::TextureFormat::Rgba8Unorm)
                    .map_err(|e| eprintln!("[masks] cpu readback failed: {e:#}"))
                    .ok()
            });
            cached.bundle.cpu.insert(kind, pixels);
        }
        cached.bundle.cpu.get(&kind).and_then(|p| p.as_deref())
    }

    /// Warm every visible floor's bundle.
    pub fn preload_all_floors(&mut self, ctx: &GpuContext, host: &dyn SceneHost) -> Result<()> {
        for floor in host.visible_floors() {
            self.compose_floor(ctx, host, &floor)?;
        }
        Ok(())
    }

    pub fn invalidate_floor(&mut self, floor_index: usize) {
        self.bundles.remove(&floor_index);
    }

    pub fn invalidate_all(&mut self) {
        self.bundles.clear();
    }

    /// Invalidate the floors whose elevation range contains the given
    /// elevation; tile hooks call this for create/update/delete.
    pub fn invalidate_elevation(&mut self, floors: &[Floor], elevation: f32) {
        for floor in floors {
            if floor.contains_elevation(elevation) {
                self.bundles.remove(&floor.index);
            }
        }
    }

    /// Forget a tile's resolved mask URLs after its texture source changed.
    pub fn invalidate_tile_path(&mut self, albedo_path: &str) {
        self.resolver.invalidate_path(albedo_path);
    }

    // --- composition -------------------------------------------------------

    fn sources_for_tile(
        &mut self,
        host: &dyn SceneHost,
        tile: &TileDoc,
    ) -> Result<Vec<(MaskKind, MaskSource)>> {
        let mut out = Vec::new();
        for &kind in MaskKind::AUTHORED {
            let source = match (kind, tile.flags.enable_specular) {
                (MaskKind::Specular, TriState::Off) => None,
                (MaskKind::Specular, TriState::On) => Some(
                    self.resolver
                        .resolve(host, &tile.albedo_path, kind)?
                        .map(MaskSource::Url)
                        .unwrap_or(MaskSource::AlbedoAlpha),
                ),
                _ => self
                    .resolver
                    .resolve(host, &tile.albedo_path, kind)?
                    .map(MaskSource::Url),
            };
            if let Some(source) = source {
                out.push((kind, source));
            }
        }
        // Every tile contributes its alpha coverage to the floor-alpha mask.
        out.push((MaskKind::FloorAlpha, MaskSource::AlbedoAlpha));
        Ok(out)
    }

    fn compose_bundle(
        &mut self,
        ctx: &GpuContext,
        host: &dyn SceneHost,
        floor: &Floor,
        tiles: &[TileDoc],
        sources: &[Vec<(MaskKind, MaskSource)>],
    ) -> Result<MaskBundle> {
        if tiles.is_empty() {
            return Ok(MaskBundle::empty_for(floor.index));
        }

        let scene_rect = host.scene_rect();
        let size = mask_resolution(scene_rect);
        let mut bundle = MaskBundle {
            floor_index: floor.index,
            empty: false,
            textures: HashMap::new(),
            cpu: HashMap::new(),
        };

        let all_kinds = MaskKind::AUTHORED
            .iter()
            .copied()
            .chain(std::iter::once(MaskKind::FloorAlpha));
        for kind in all_kinds {
            let mut draws: Vec<(usize, MaskSource)> = Vec::new();
            for (tile_idx, tile_sources) in sources.iter().enumerate() {
                for (k, source) in tile_sources {
                    if *k == kind {
                        draws.push((tile_idx, source.clone()));
                    }
                }
            }
            if draws.is_empty() {
                continue;
            }

            // Degenerate whole-tile water masks fall back to the tile alpha.
            if kind == MaskKind::Water {
                for (tile_idx, source) in &mut draws {
                    if let MaskSource::Url(url) = source {
                        let coverage = self
                            .mask_texture(ctx, host, url)
                            .map(|t| t.coverage)
                            .unwrap_or(0.0);
                        if coverage > WATER_DEGENERATE_COVERAGE {
                            eprintln!(
                                "[masks] water mask '{url}' covers {:.1}% of tile '{}'; \
                                 substituting tile alpha",
                                coverage * 100.0,
                                tiles[*tile_idx].id
                            );
                            *source = MaskSource::AlbedoAlpha;
                        }
                    }
                }
            }

            // Walls on this floor block outdoor light from bleeding through
            // interior boundaries; they erase the outdoors scalar.
            let wall_erases: Vec<TileTransformUniform> = if kind == MaskKind::Outdoors {
                occluders_for_floor(&host.walls(), floor)
                    .into_iter()
                    .map(|wall| wall_uniform(scene_rect, wall))
                    .collect()
            } else {
                Vec::new()
            };

            if let Some(texture) =
                self.compose_kind(ctx, host, scene_rect, size, tiles, &draws, &wall_erases)?
            {
                bundle.textures.insert(kind, texture);
            }
        }

        bundle.empty = bundle.textures.is_empty();
        Ok(bundle)
    }

    #[allow(clippy::too_many_arguments)]
    fn compose_kind(
        &mut self,
        ctx: &GpuContext,
        host: &dyn SceneHost,
        scene_rect: [f32; 4],
        size: [u32; 2],
        tiles: &[TileDoc],
        draws: &[(usize, MaskSource)],
        wall_erases: &[TileTransformUniform],
    ) -> Result<Option<MaskTexture>> {
        // Resolve textures first; tiles whose texture fails to load are
        // silently excluded and the bundle still composes.
        let mut bind_groups: Vec<(usize, wgpu::BindGroup)> = Vec::new();
        for (tile_idx, source) in draws {
            let tile = &tiles[*tile_idx];
            let (view, use_alpha) = match source {
                MaskSource::Url(url) => {
                    match self.mask_texture(ctx, host, url) {
                        Some(t) => (t.view.clone(), 0.0),
                        None => continue,
                    }
                }
                MaskSource::AlbedoAlpha => {
                    match self.albedo_texture(ctx, host, &tile.albedo_path) {
                        Some(t) => (t.view.clone(), 1.0),
                        None => continue,
                    }
                }
            };

            let uniform = tile_uniform(scene_rect, tile, use_alpha);
            let buffer = ctx
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("tilefx.masks.tile"),
                    contents: bytemuck::bytes_of(&uniform),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
            let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("tilefx.masks.tile"),
                layout: &self.bind_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });
            bind_groups.push((*tile_idx, bind_group));
        }

        if bind_groups.is_empty() {
            return Ok(None);
        }

        for uniform in wall_erases {
            let buffer = ctx
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("tilefx.masks.wall"),
                    contents: bytemuck::bytes_of(uniform),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
            let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("tilefx.masks.wall"),
                layout: &self.bind_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&self.white_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });
            bind_groups.push((usize::MAX, bind_group));
        }

        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("tilefx.masks.composed"),
            size: wgpu::Extent3d {
                width: size[0],
                height: size[1],
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tilefx.masks.compose"),
            });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("tilefx.masks.compose"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
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
            rpass.set_pipeline(&self.pipeline);
            for (_, bind_group) in &bind_groups {
                rpass.set_bind_group(0, bind_group, &[]);
                rpass.draw(0..6, 0..1);
            }
        }
        ctx.queue.submit(std::iter::once(encoder.finish()));

        Ok(Some(MaskTexture { texture, view, size }))
    }

    fn mask_texture(
        &mut self,
        ctx: &GpuContext,
        host: &dyn SceneHost,
        url: &str,
    ) -> Option<&CachedTexture> {
        if !self.mask_textures.contains_key(url) {
            let loaded = load_texture_cached(ctx, host, url, TextureRole::DataMask);
            self.mask_textures.insert(url.to_string(), loaded);
        }
        self.mask_textures.get(url).and_then(|t| t.as_ref())
    }

    fn albedo_texture(
        &mut self,
        ctx: &GpuContext,
        host: &dyn SceneHost,
        path: &str,
    ) -> Option<&CachedTexture> {
        if !self.albedo_textures.contains_key(path) {
            let loaded = load_texture_cached(ctx, host, path, TextureRole::Albedo);
            self.albedo_textures.insert(path.to_string(), loaded);
        }
        self.albedo_textures.get(path).and_then(|t| t.as_ref())
    }
}

fn load_texture_cached(
    ctx: &GpuContext,
    host: &dyn SceneHost,
    url: &str,
    role: TextureRole,
) -> Option<CachedTexture> {
    let decode = || -> Result<CachedTexture> {
        let img = host
            .load_texture(url, role)
            .with_context(|| format!("failed to load '{url}'"))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        let coverage = coverage_64(&rgba);

        // Masks are data: no sRGB decode, no flip. Albedo is only used for
        // its alpha channel here, so it gets the same raw treatment.
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(url),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(CachedTexture { view, coverage })
    };

    match decode() {
        Ok(t) => Some(t),
        Err(e) => {
            eprintln!("[masks] excluding tile texture: {e:#}");
            None
        }
    }
}

/// Average of `r * a` over a 64x64 nearest subsample.
fn coverage_64(rgba: &image::RgbaImage) -> f32 {
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return 0.0;
    }
    let mut sum = 0.0f64;
    for sy in 0..64u32 {
        for sx in 0..64u32 {
            let x = (sx * width / 64).min(width - 1);
            let y = (sy * height / 64).min(height - 1);
            let p = rgba.get_pixel(x, y);
            sum += (p.0[0] as f64 / 255.0) * (p.0[3] as f64 / 255.0);
        }
    }
    (sum / (64.0 * 64.0)) as f32
}

/// Scene-proportional mask resolution with the long edge capped.
fn mask_resolution(scene_rect: [f32; 4]) -> [u32; 2] {
    let [_, _, w, h] = scene_rect;
    let (w, h) = (w.max(1.0), h.max(1.0));
    let scale = (MASK_RESOLUTION_MAX as f32 / w.max(h)).min(1.0);
    [
        ((w * scale).round() as u32).max(1),
        ((h * scale).round() as u32).max(1),
    ]
}

fn tile_uniform(scene_rect: [f32; 4], tile: &TileDoc, use_alpha: f32) -> TileTransformUniform {
    let rotation = tile.rotation.to_radians();
    TileTransformUniform {
        scene_rect,
        center_half: [
            tile.x + tile.width * 0.5,
            tile.y + tile.height * 0.5,
            tile.width * 0.5 * tile.scale_x.abs(),
            tile.height * 0.5 * tile.scale_y.abs(),
        ],
        rot_flip: [
            rotation.sin(),
            rotation.cos(),
            tile.scale_x.signum(),
            tile.scale_y.signum(),
        ],
        misc: [tile.alpha, use_alpha, 0.0, 0.0],
    }
}

/// A wall segment as an erase quad: the same transform uniform as a tile,
/// with the erase flag set.
fn wall_uniform(scene_rect: [f32; 4], wall: &WallDoc) -> TileTransformUniform {
    let dx = wall.x2 - wall.x1;
    let dy = wall.y2 - wall.y1;
    let len = (dx * dx + dy * dy).sqrt();
    let rotation = dy.atan2(dx);
    TileTransformUniform {
        scene_rect,
        center_half: [
            (wall.x1 + wall.x2) * 0.5,
            (wall.y1 + wall.y2) * 0.5,
            len * 0.5,
            WALL_THICKNESS * 0.5,
        ],
        rot_flip: [rotation.sin(), rotation.cos(), 1.0, 1.0],
        misc: [1.0, 0.0, 1.0, 0.0],
    }
}

fn bundle_signature(
    floor: &Floor,
    scene_rect: [f32; 4],
    tiles: &[TileDoc],
    sources: &[Vec<(MaskKind, MaskSource)>],
    walls: &[WallDoc],
) -> u64 {
    let mut hasher = DefaultHasher::new();
    floor.index.hash(&mut hasher);
    for v in scene_rect {
        v.to_bits().hash(&mut hasher);
    }
    for (tile, tile_sources) in tiles.iter().zip(sources) {
        tile.id.hash(&mut hasher);
        for v in [
            tile.x,
            tile.y,
            tile.width,
            tile.height,
            tile.rotation,
            tile.scale_x,
            tile.scale_y,
            tile.alpha,
        ] {
            v.to_bits().hash(&mut hasher);
        }
        tile.sort.hash(&mut hasher);
        tile.albedo_path.hash(&mut hasher);
        for (kind, source) in tile_sources {
            kind.suffix().hash(&mut hasher);
            match source {
                MaskSource::Url(url) => url.hash(&mut hasher),
                MaskSource::AlbedoAlpha => "alpha".hash(&mut hasher),
            }
        }
    }
    for wall in walls {
        wall.id.hash(&mut hasher);
        for v in [wall.x1, wall.y1, wall.x2, wall.y2, wall.elevation] {
            v.to_bits().hash(&mut hasher);
        }
    }
    hasher.finish()
}
