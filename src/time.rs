//! Monotonic frame clock.
//!
//! One `FrameClock` lives in the composer and is ticked exactly once per
//! rendered frame. Effects receive the resulting [`FrameInfo`] snapshot and
//! never touch the clock itself.

use std::time::Instant;

/// Longest delta a single frame may report, in seconds. A debugger pause or a
/// backgrounded tab would otherwise feed a multi-second step into every
/// simulation.
pub const MAX_FRAME_DELTA_SECS: f32 = 0.1;

/// Read-only per-frame time snapshot.
///
/// `delta` is scaled by the clock's time scale and clamped; `raw_delta` is the
/// clamped wallclock step with no scale applied. Wallclock-sensitive
/// animations (e.g. UI fades) consume `raw_delta` / `wall_elapsed`, simulation
/// consumes `delta` / `elapsed`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameInfo {
    /// Accumulated scaled time, seconds. Monotonic (scale is never negative).
    pub elapsed: f64,
    /// Accumulated real time since clock creation, seconds. Monotonic.
    pub wall_elapsed: f64,
    /// Scaled, clamped frame delta in seconds.
    pub delta: f32,
    /// Unscaled, clamped frame delta in seconds.
    pub raw_delta: f32,
    /// Frames ticked so far, starting at 1 on the first tick.
    pub frame_count: u64,
    /// The scale that produced `delta` this frame.
    pub scale: f32,
}

/// Pauseable monotonic clock producing one [`FrameInfo`] per tick.
pub struct FrameClock {
    start: Instant,
    last_wall: f64,
    elapsed: f64,
    wall_elapsed: f64,
    frame_count: u64,
    scale: f32,
    paused: bool,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            last_wall: 0.0,
            elapsed: 0.0,
            wall_elapsed: 0.0,
            frame_count: 0,
            scale: 1.0,
            paused: false,
        }
    }

    /// Time scale multiplies `delta` only. Clamped to be non-negative so
    /// `elapsed` stays monotonic.
    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale.max(0.0);
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// While paused, `delta` is 0 but `raw_delta` and `wall_elapsed` keep
    /// advancing.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Advance the clock by one frame and return the snapshot.
    pub fn tick(&mut self) -> FrameInfo {
        let now = self.start.elapsed().as_secs_f64();
        self.tick_at(now)
    }

    /// Advance using an explicit wallclock reading in seconds since clock
    /// creation. The render loop uses [`Self::tick`]; tests drive this
    /// directly.
    pub fn tick_at(&mut self, now_secs: f64) -> FrameInfo {
        let raw_step = (now_secs - self.last_wall).max(0.0);
        self.last_wall = self.last_wall.max(now_secs);

        let raw_delta = (raw_step as f32).min(MAX_FRAME_DELTA_SECS);
        let effective_scale = if self.paused { 0.0 } else { self.scale };
        let delta = raw_delta * effective_scale;

        self.wall_elapsed += raw_delta as f64;
        self.elapsed += delta as f64;
        self.frame_count += 1;

        FrameInfo {
            elapsed: self.elapsed,
            wall_elapsed: self.wall_elapsed,
            delta,
            raw_delta,
            frame_count: self.frame_count,
            scale: effective_scale,
        }
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_is_clamped_to_spike_ceiling() {
        let mut clock = FrameClock::new();
        clock.tick_at(0.016);
        let info = clock.tick_at(5.0);
        assert_eq!(info.delta, MAX_FRAME_DELTA_SECS);
        assert_eq!(info.raw_delta, MAX_FRAME_DELTA_SECS);
        // Wall elapsed advances by the clamped step, not the real gap.
        assert!((info.wall_elapsed - (0.016 + 0.1)).abs() < 1e-9);
    }

    #[test]
    fn elapsed_and_frame_count_are_monotonic() {
        let mut clock = FrameClock::new();
        let mut last_elapsed = 0.0;
        let mut last_count = 0;
        // Include a backwards wallclock reading; elapsed must not regress.
        for now in [0.016, 0.032, 0.020, 0.048] {
            let info = clock.tick_at(now);
            assert!(info.elapsed >= last_elapsed);
            assert!(info.frame_count > last_count);
            last_elapsed = info.elapsed;
            last_count = info.frame_count;
        }
    }

    #[test]
    fn scale_multiplies_delta_but_not_raw_delta() {
        let mut clock = FrameClock::new();
        clock.set_scale(2.0);
        let info = clock.tick_at(0.016);
        assert!((info.delta - 0.032).abs() < 1e-6);
        assert!((info.raw_delta - 0.016).abs() < 1e-6);
        assert!((info.wall_elapsed - 0.016).abs() < 1e-9);
        assert!((info.elapsed - 0.032).abs() < 1e-6);
    }

    #[test]
    fn paused_clock_freezes_scaled_time_only() {
        let mut clock = FrameClock::new();
        clock.tick_at(0.016);
        clock.set_paused(true);
        let info = clock.tick_at(0.032);
        assert_eq!(info.delta, 0.0);
        assert!(info.raw_delta > 0.0);
        clock.set_paused(false);
        let info = clock.tick_at(0.048);
        assert!(info.delta > 0.0);
    }

    #[test]
    fn negative_scale_is_clamped() {
        let mut clock = FrameClock::new();
        clock.set_scale(-3.0);
        let info = clock.tick_at(0.016);
        assert_eq!(info.delta, 0.0);
        assert_eq!(clock.scale(), 0.0);
    }
}
