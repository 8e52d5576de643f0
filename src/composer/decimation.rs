//! Adaptive frame-time decimation.
//!
//! The composer keeps an exponential moving average of frame time and flips
//! into a decimating state through a hysteresis band: enter above 20 ms,
//! leave below 14 ms. While decimating, non-critical effects are skipped on
//! odd frames; the filter itself lives in the schedule builder.

pub const DECIMATION_ENTER_MS: f32 = 20.0;
pub const DECIMATION_EXIT_MS: f32 = 14.0;
pub const DECIMATION_EMA_ALPHA: f32 = 0.1;

/// Only the composer mutates this; everything else reads.
#[derive(Clone, Copy, Debug)]
pub struct DecimationState {
    pub avg_frame_time_ms: f32,
    pub active: bool,
    seeded: bool,
}

impl DecimationState {
    pub fn new() -> Self {
        Self {
            avg_frame_time_ms: 0.0,
            active: false,
            seeded: false,
        }
    }

    /// Fold one frame time into the EMA and apply the hysteresis.
    pub fn record(&mut self, frame_time_ms: f32) {
        if self.seeded {
            self.avg_frame_time_ms = self.avg_frame_time_ms
                * (1.0 - DECIMATION_EMA_ALPHA)
                + frame_time_ms * DECIMATION_EMA_ALPHA;
        } else {
            self.avg_frame_time_ms = frame_time_ms;
            self.seeded = true;
        }

        if !self.active && self.avg_frame_time_ms > DECIMATION_ENTER_MS {
            self.active = true;
            eprintln!(
                "[decimate] entering decimation (avg {:.1} ms)",
                self.avg_frame_time_ms
            );
        } else if self.active && self.avg_frame_time_ms < DECIMATION_EXIT_MS {
            self.active = false;
            eprintln!(
                "[decimate] leaving decimation (avg {:.1} ms)",
                self.avg_frame_time_ms
            );
        }
    }
}

impl Default for DecimationState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sustained_slow_frames_enter_quickly() {
        let mut state = DecimationState::new();
        state.record(30.0);
        state.record(30.0);
        assert!(state.active, "EMA seeded at 30 ms must cross 20 ms at once");
    }

    #[test]
    fn fast_frames_eventually_exit() {
        let mut state = DecimationState::new();
        for _ in 0..5 {
            state.record(30.0);
        }
        assert!(state.active);
        let mut frames = 0;
        while state.active {
            state.record(10.0);
            frames += 1;
            assert!(frames < 100, "EMA of 10 ms frames must fall below 14 ms");
        }
        // Once out, staying fast keeps it out.
        for _ in 0..10 {
            state.record(10.0);
            assert!(!state.active);
        }
    }

    #[test]
    fn band_interior_holds_current_state() {
        let mut state = DecimationState::new();
        // 17 ms sits inside the hysteresis band: never enters from idle.
        for _ in 0..50 {
            state.record(17.0);
            assert!(!state.active);
        }
        // Push it in, then 17 ms frames keep it decimating.
        for _ in 0..50 {
            state.record(40.0);
        }
        assert!(state.active);
        for _ in 0..50 {
            state.record(17.0);
            assert!(state.active);
        }
    }
}
