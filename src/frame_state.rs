//! Per-frame camera/viewport snapshot.
//!
//! Screen-space effects all read the same snapshot instead of querying the
//! host mid-frame. The snapshot is rebuilt in place once per frame, before
//! any effect runs; there is no steady-state allocation.

use crate::host::{CameraSnapshot, SceneHost};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameState {
    pub camera: CameraSnapshot,
    /// Drawing buffer size in physical pixels.
    pub buffer_size: [u32; 2],
    /// Logical canvas size.
    pub canvas_size: [f32; 2],
    /// World rect `[x, y, w, h]` covered by the scene.
    pub scene_rect: [f32; 4],
    pub darkness_level: f32,
    pub time_of_day: f32,
    pub wind_speed: f32,
    pub wind_direction: f32,
}

impl FrameState {
    pub fn capture(&mut self, host: &dyn SceneHost) {
        self.camera = host.camera();
        self.buffer_size = host.drawing_buffer_size();
        self.canvas_size = host.canvas_dimensions();
        self.scene_rect = host.scene_rect();
        self.darkness_level = host.darkness_level();
        self.time_of_day = host.time_of_day();
        self.wind_speed = host.wind_speed();
        self.wind_direction = host.wind_direction();
    }

    /// Convert a world-space point to scene UV in `[0, 1]`.
    pub fn world_to_scene_uv(&self, world: [f32; 2]) -> [f32; 2] {
        let [sx, sy, sw, sh] = self.scene_rect;
        [
            if sw > 0.0 { (world[0] - sx) / sw } else { 0.0 },
            if sh > 0.0 { (world[1] - sy) / sh } else { 0.0 },
        ]
    }

    pub fn aspect(&self) -> f32 {
        if self.buffer_size[1] == 0 {
            1.0
        } else {
            self.buffer_size[0] as f32 / self.buffer_size[1] as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_to_scene_uv_maps_corners() {
        let state = FrameState {
            scene_rect: [100.0, 200.0, 400.0, 800.0],
            ..Default::default()
        };
        assert_eq!(state.world_to_scene_uv([100.0, 200.0]), [0.0, 0.0]);
        assert_eq!(state.world_to_scene_uv([500.0, 1000.0]), [1.0, 1.0]);
        assert_eq!(state.world_to_scene_uv([300.0, 600.0]), [0.5, 0.5]);
    }

    #[test]
    fn degenerate_scene_rect_does_not_divide_by_zero() {
        let state = FrameState::default();
        assert_eq!(state.world_to_scene_uv([5.0, 5.0]), [0.0, 0.0]);
        assert_eq!(state.aspect(), 1.0);
    }
}
