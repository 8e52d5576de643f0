//! Frame scheduling as data.
//!
//! All per-frame decisions — the stable render order, the decimation filter,
//! the ping-pong target assignment — are computed here into plain values
//! before anything touches the GPU. The ordering and ping-pong invariants
//! are tested on these values alone.

use crate::host::GpuTier;

/// Snapshot of the per-effect fields the scheduler needs.
#[derive(Clone, Copy, Debug)]
pub struct ScheduleEntry {
    /// Index into the composer's registry.
    pub index: usize,
    pub layer_order: u8,
    pub priority: i32,
    pub is_post: bool,
    pub required_tier: GpuTier,
    pub always_render: bool,
    pub no_frame_skip: bool,
    pub floor_scope_global: bool,
    /// Renderable, enabled, and (for particles) has visible work.
    pub active: bool,
}

/// The plan for one frame. Owned by the composer and rebuilt in place each
/// frame so the steady-state render path does not allocate.
#[derive(Clone, Debug, Default)]
pub struct FrameSchedule {
    /// Every active effect, in render order; `prepare_frame` targets.
    pub prepare: Vec<usize>,
    /// Scene effects passing the decimation filter, in render order.
    pub scene: Vec<usize>,
    /// Post effects passing the decimation filter, in render order.
    pub post: Vec<usize>,
    /// Sort scratch: positions into the entries slice.
    order_scratch: Vec<usize>,
}

impl FrameSchedule {
    fn clear(&mut self) {
        self.prepare.clear();
        self.scene.clear();
        self.post.clear();
        self.order_scratch.clear();
    }
}

/// Whether the decimation rules skip this effect on this frame.
///
/// While decimating, medium/high-tier effects skip odd frames unless they
/// opt out via `always_render`/`no_frame_skip`. A low-tier GPU additionally
/// always skips high-tier effects and renders medium-tier on even frames
/// only, decimating or not.
pub fn decimation_skips(
    entry: &ScheduleEntry,
    frame_count: u64,
    decimating: bool,
    gpu_tier: GpuTier,
) -> bool {
    let odd_frame = frame_count % 2 == 1;
    if gpu_tier == GpuTier::Low {
        if entry.required_tier == GpuTier::High {
            return true;
        }
        if entry.required_tier == GpuTier::Medium && odd_frame {
            return true;
        }
    }
    if decimating
        && odd_frame
        && entry.required_tier >= GpuTier::Medium
        && !entry.always_render
        && !entry.no_frame_skip
    {
        return true;
    }
    false
}

/// Build the frame schedule into reused buffers.
///
/// The sort is stable over `(layer order, priority)`: with a fixed active
/// set, frame f and frame f+1 produce identical sequences, and insertion
/// order breaks ties.
pub fn build_schedule_into(
    schedule: &mut FrameSchedule,
    entries: &[ScheduleEntry],
    frame_count: u64,
    decimating: bool,
    gpu_tier: GpuTier,
) {
    schedule.clear();

    // `entries` arrive in registry insertion order; a stable sort keyed on
    // (layer, priority) preserves that order within ties.
    schedule
        .order_scratch
        .extend(entries.iter().enumerate().filter(|(_, e)| e.active).map(|(i, _)| i));
    schedule.order_scratch.sort_by(|&a, &b| {
        entries[a]
            .layer_order
            .cmp(&entries[b].layer_order)
            .then(entries[a].priority.cmp(&entries[b].priority))
    });

    for pos in 0..schedule.order_scratch.len() {
        let entry = &entries[schedule.order_scratch[pos]];
        schedule.prepare.push(entry.index);
        if decimation_skips(entry, frame_count, decimating, gpu_tier) {
            continue;
        }
        if entry.is_post {
            schedule.post.push(entry.index);
        } else {
            schedule.scene.push(entry.index);
        }
    }
}

pub fn build_schedule(
    entries: &[ScheduleEntry],
    frame_count: u64,
    decimating: bool,
    gpu_tier: GpuTier,
) -> FrameSchedule {
    let mut schedule = FrameSchedule::default();
    build_schedule_into(&mut schedule, entries, frame_count, decimating, gpu_tier);
    schedule
}

/// Logical buffers of a ping-pong chain. `Source` is the chain input
/// (scene or floor target, or the accumulator); `Out` is the chain output
/// (screen, or the tracked floor-final target).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainBuf {
    Source,
    PingA,
    PingB,
    Out,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainStep {
    /// Registry index of the post effect.
    pub effect: usize,
    pub read: ChainBuf,
    pub write: ChainBuf,
}

/// Assign ping-pong buffers to an ordered post chain. Step 0 reads the
/// source; each later step reads the previous write; the last step writes
/// `Out`.
pub fn plan_post_chain(effects: &[usize]) -> Vec<ChainStep> {
    let count = effects.len();
    let mut steps = Vec::with_capacity(count);
    let mut read = ChainBuf::Source;
    for (i, &effect) in effects.iter().enumerate() {
        let write = if i + 1 == count {
            ChainBuf::Out
        } else if i % 2 == 0 {
            ChainBuf::PingA
        } else {
            ChainBuf::PingB
        };
        steps.push(ChainStep { effect, read, write });
        read = write;
    }
    steps
}
