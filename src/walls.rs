//! Wall document integration.
//!
//! Walls act as occluders when composing structure-dependent masks: a wall
//! on a floor blocks outdoor light and water tinting from bleeding through
//! interior boundaries. The mask compositor draws each occluding wall as a
//! thin erase quad over the composed scalar.

use crate::host::{Floor, WallDoc};

/// World-space thickness of a wall occluder quad.
pub const WALL_THICKNESS: f32 = 8.0;

/// Walls whose elevation makes them occlude the given floor.
pub fn occluders_for_floor<'a>(walls: &'a [WallDoc], floor: &Floor) -> Vec<&'a WallDoc> {
    walls
        .iter()
        .filter(|w| floor.contains_elevation(w.elevation))
        .collect()
}
