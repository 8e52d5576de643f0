//! Overlay and depth-debug tail passes.
//!
//! A fixed final sequence after all other rendering: the overlay layer is
//! drawn straight to screen with no clear, bypassing the post chain, and an
//! optional depth visualiser renders into a corner subwindow. Neither pass
//! ever enters the ping-pong chain.

use anyhow::Result;

use crate::composer::WorldRenderer;
use crate::layers::LayerMask;

/// Fraction of the short screen edge the depth-debug subwindow occupies.
const DEPTH_DEBUG_FRACTION: f32 = 0.25;
const DEPTH_DEBUG_MARGIN: f32 = 16.0;

/// Draw overlay-layer objects (UI markers, measurement templates) to screen.
/// Auto-clear is disabled: the overlay composites over the finished frame.
pub fn overlay_pass(
    world: &mut dyn WorldRenderer,
    encoder: &mut wgpu::CommandEncoder,
    screen: &wgpu::TextureView,
    screen_format: wgpu::TextureFormat,
) -> Result<()> {
    world.render_world(encoder, screen, screen_format, LayerMask::OVERLAY, None)
}

/// Viewport rect `[x, y, w, h]` of the depth-debug subwindow: bottom-left
/// corner, a quarter of the short edge.
pub fn depth_debug_viewport(buffer_size: [u32; 2]) -> [f32; 4] {
    let short = buffer_size[0].min(buffer_size[1]) as f32;
    let side = (short * DEPTH_DEBUG_FRACTION).max(1.0);
    [
        DEPTH_DEBUG_MARGIN,
        (buffer_size[1] as f32 - side - DEPTH_DEBUG_MARGIN).max(0.0),
        side,
        side,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_sits_in_the_bottom_left() {
        let [x, y, w, h] = depth_debug_viewport([1920, 1080]);
        assert_eq!(x, DEPTH_DEBUG_MARGIN);
        assert_eq!(w, h);
        assert_eq!(w, 1080.0 * DEPTH_DEBUG_FRACTION);
        assert!(y + h <= 1080.0);
    }

    #[test]
    fn viewport_stays_on_screen_for_tiny_buffers() {
        let [x, y, w, h] = depth_debug_viewport([32, 32]);
        assert!(x >= 0.0 && y >= 0.0);
        assert!(w >= 1.0 && h >= 1.0);
    }
}
