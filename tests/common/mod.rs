//! Shared doubles for the scenario tests: an in-memory scene host, a world
//! renderer that paints each floor a solid colour, and recording effects.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::{Result, bail};

use tilefx::composer::WorldRenderer;
use tilefx::effects::{EffectCtx, PostProcessEffect, SceneMeshEffect};
use tilefx::gpu::{GpuContext, HeadlessGpu};
use tilefx::host::{CameraSnapshot, Floor, SceneHost, TextureRole, TileDoc, WallDoc};
use tilefx::layers::LayerMask;
use tilefx::target_pool::TargetName;
use tilefx::time::FrameInfo;

/// Acquire a headless GPU, or `None` (with a note) when the environment has
/// no adapter — the caller should return early in that case.
pub fn headless_gpu() -> Option<HeadlessGpu> {
    match HeadlessGpu::new() {
        Ok(gpu) => Some(gpu),
        Err(e) => {
            eprintln!("[test] no adapter, skipping: {e:#}");
            None
        }
    }
}

/// An offscreen "screen" texture standing in for the surface.
pub fn make_screen(ctx: &GpuContext, size: [u32; 2]) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("test.screen"),
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
    (texture, view)
}

pub struct MockHost {
    pub floors: Vec<Floor>,
    pub tiles: Vec<TileDoc>,
    pub images: HashMap<String, image::RgbaImage>,
    pub listings: HashMap<String, Vec<String>>,
    pub settings: HashMap<String, serde_json::Value>,
    pub warnings: RefCell<Vec<String>>,
    pub visible_floor: Rc<Cell<Option<usize>>>,
    pub scene_rect: [f32; 4],
    pub buffer_size: [u32; 2],
    pub texture_loads: Cell<usize>,
}

impl MockHost {
    pub fn new(buffer_size: [u32; 2]) -> Self {
        Self {
            floors: vec![Floor { index: 0, bottom: 0.0, top: f32::MAX }],
            tiles: Vec::new(),
            images: HashMap::new(),
            listings: HashMap::new(),
            settings: HashMap::new(),
            warnings: RefCell::new(Vec::new()),
            visible_floor: Rc::new(Cell::new(None)),
            scene_rect: [0.0, 0.0, buffer_size[0] as f32, buffer_size[1] as f32],
            buffer_size,
            texture_loads: Cell::new(0),
        }
    }

    pub fn set_setting(&mut self, key: &str, value: serde_json::Value) {
        self.settings.insert(key.to_string(), value);
    }
}

impl SceneHost for MockHost {
    fn visible_floors(&self) -> Vec<Floor> {
        self.floors.clone()
    }
    fn set_floor_visible(&self, index: usize) {
        self.visible_floor.set(Some(index));
    }
    fn restore_visibility(&self) {
        self.visible_floor.set(None);
    }
    fn tiles(&self) -> Vec<TileDoc> {
        self.tiles.clone()
    }
    fn walls(&self) -> Vec<WallDoc> {
        Vec::new()
    }
    fn camera(&self) -> CameraSnapshot {
        CameraSnapshot { center: [0.0, 0.0], zoom: 1.0, rotation: 0.0 }
    }
    fn drawing_buffer_size(&self) -> [u32; 2] {
        self.buffer_size
    }
    fn canvas_dimensions(&self) -> [f32; 2] {
        [self.buffer_size[0] as f32, self.buffer_size[1] as f32]
    }
    fn scene_rect(&self) -> [f32; 4] {
        self.scene_rect
    }
    fn darkness_level(&self) -> f32 {
        0.0
    }
    fn time_of_day(&self) -> f32 {
        12.0
    }
    fn wind_speed(&self) -> f32 {
        0.0
    }
    fn wind_direction(&self) -> f32 {
        0.0
    }
    fn roof_mask_intensity(&self, _u: f32, _v: f32) -> f32 {
        0.0
    }
    fn load_texture(&self, url: &str, _role: TextureRole) -> Result<image::DynamicImage> {
        self.texture_loads.set(self.texture_loads.get() + 1);
        match self.images.get(url) {
            Some(img) => Ok(image::DynamicImage::ImageRgba8(img.clone())),
            None => bail!("mock host has no image '{url}'"),
        }
    }
    fn list_directory_files(&self, dir: &str) -> Result<Vec<String>> {
        Ok(self.listings.get(dir).cloned().unwrap_or_default())
    }
    fn setting(&self, key: &str) -> Option<serde_json::Value> {
        self.settings.get(key).cloned()
    }
    fn notify_warning(&self, message: &str) {
        self.warnings.borrow_mut().push(message.to_string());
    }
}

/// Paints the whole target a solid colour per visible floor.
pub struct MockWorld {
    pub visible_floor: Rc<Cell<Option<usize>>>,
    pub floor_colors: Vec<wgpu::Color>,
    pub render_count: Cell<usize>,
}

impl MockWorld {
    pub fn new(visible_floor: Rc<Cell<Option<usize>>>, floor_colors: Vec<wgpu::Color>) -> Self {
        Self {
            visible_floor,
            floor_colors,
            render_count: Cell::new(0),
        }
    }
}

impl WorldRenderer for MockWorld {
    fn render_world(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        _target_format: wgpu::TextureFormat,
        camera_mask: LayerMask,
        _clear: Option<wgpu::Color>,
    ) -> Result<()> {
        // Nothing lives on the overlay layer in these scenes.
        if camera_mask == LayerMask::OVERLAY {
            return Ok(());
        }
        self.render_count.set(self.render_count.get() + 1);
        let floor = self.visible_floor.get().unwrap_or(0);
        let color = self
            .floor_colors
            .get(floor)
            .copied()
            .unwrap_or(wgpu::Color::TRANSPARENT);
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("test.world"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(color),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        Ok(())
    }

    fn capture_depth(
        &mut self,
        _encoder: &mut wgpu::CommandEncoder,
        _floor: Option<usize>,
        _exclude: LayerMask,
    ) -> Result<Option<wgpu::TextureView>> {
        Ok(None)
    }
}

pub type CallLog = Rc<RefCell<Vec<String>>>;

pub fn new_log() -> CallLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// Post effect that records every contract call instead of drawing.
pub struct RecordingPost {
    pub id: &'static str,
    pub log: CallLog,
    pub fail_create: bool,
    pub fail_render: bool,
}

impl RecordingPost {
    pub fn new(id: &'static str, log: CallLog) -> Self {
        Self { id, log, fail_create: false, fail_render: false }
    }
}

impl PostProcessEffect for RecordingPost {
    fn create_material(&mut self, _ctx: &mut EffectCtx<'_>) -> Result<()> {
        if self.fail_create {
            bail!("{}: create_material failed on purpose", self.id);
        }
        self.log.borrow_mut().push(format!("{}:create", self.id));
        Ok(())
    }

    fn set_input_texture(&mut self, _view: wgpu::TextureView) {
        self.log.borrow_mut().push(format!("{}:input", self.id));
    }

    fn set_buffers(&mut self, read: TargetName, write: Option<TargetName>) {
        self.log.borrow_mut().push(format!(
            "{}:buffers:{}->{}",
            self.id,
            read,
            write.map(|w| w.to_string()).unwrap_or_else(|| "screen".into())
        ));
    }

    fn set_render_to_screen(&mut self, to_screen: bool) {
        if to_screen {
            self.log.borrow_mut().push(format!("{}:to_screen", self.id));
        }
    }

    fn prepare_frame(&mut self, _info: &FrameInfo, _ctx: &mut EffectCtx<'_>) -> Result<()> {
        self.log.borrow_mut().push(format!("{}:prepare", self.id));
        Ok(())
    }

    fn on_update(&mut self, _info: &FrameInfo, _ctx: &mut EffectCtx<'_>) -> Result<()> {
        self.log.borrow_mut().push(format!("{}:update", self.id));
        Ok(())
    }

    fn render(
        &mut self,
        _encoder: &mut wgpu::CommandEncoder,
        _target: &wgpu::TextureView,
        _ctx: &mut EffectCtx<'_>,
    ) -> Result<()> {
        if self.fail_render {
            bail!("{}: render failed on purpose", self.id);
        }
        self.log.borrow_mut().push(format!("{}:render", self.id));
        Ok(())
    }
}

/// Scene effect that records calls; used for floor-loop counting.
pub struct RecordingScene {
    pub id: &'static str,
    pub log: CallLog,
}

impl RecordingScene {
    pub fn new(id: &'static str, log: CallLog) -> Self {
        Self { id, log }
    }
}

impl SceneMeshEffect for RecordingScene {
    fn create_mesh(&mut self, _ctx: &mut EffectCtx<'_>) -> Result<()> {
        self.log.borrow_mut().push(format!("{}:create", self.id));
        Ok(())
    }

    fn prepare_frame(&mut self, _info: &FrameInfo, _ctx: &mut EffectCtx<'_>) -> Result<()> {
        self.log.borrow_mut().push(format!("{}:prepare", self.id));
        Ok(())
    }

    fn on_update(&mut self, _info: &FrameInfo, _ctx: &mut EffectCtx<'_>) -> Result<()> {
        self.log.borrow_mut().push(format!("{}:update", self.id));
        Ok(())
    }

    fn render(
        &mut self,
        _encoder: &mut wgpu::CommandEncoder,
        _target: &wgpu::TextureView,
        _ctx: &mut EffectCtx<'_>,
    ) -> Result<()> {
        self.log.borrow_mut().push(format!("{}:render", self.id));
        Ok(())
    }

    fn bind_floor_masks(&mut self, _bundle: &tilefx::masks::MaskBundle, floor_key: usize) {
        self.log
            .borrow_mut()
            .push(format!("{}:masks:{}", self.id, floor_key));
    }
}
