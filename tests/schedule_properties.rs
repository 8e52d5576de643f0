//! Property tests over the pure frame-planning layer: stable render order,
//! ping-pong chain invariants, and decimation hysteresis.

use proptest::prelude::*;

use tilefx::composer::{
    ChainBuf, DECIMATION_ENTER_MS, DECIMATION_EXIT_MS, DecimationState, ScheduleEntry,
    build_schedule, plan_post_chain,
};
use tilefx::host::GpuTier;

fn arb_entry(index: usize) -> impl Strategy<Value = ScheduleEntry> {
    (
        0u8..6,
        -20i32..20,
        any::<bool>(),
        prop_oneof![Just(GpuTier::Low), Just(GpuTier::Medium), Just(GpuTier::High)],
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(move |(layer, priority, active, tier, always, no_skip)| ScheduleEntry {
            index,
            layer_order: layer * 10,
            priority,
            is_post: layer >= 5,
            required_tier: tier,
            always_render: always,
            no_frame_skip: no_skip,
            floor_scope_global: false,
            active,
        })
}

fn arb_entries() -> impl Strategy<Value = Vec<ScheduleEntry>> {
    (0usize..24).prop_flat_map(|len| {
        (0..len).map(arb_entry).collect::<Vec<_>>()
    })
}

proptest! {
    /// With a fixed active set and unchanged layer/priority, frame f and
    /// frame f+2 (same parity) produce identical sequences.
    #[test]
    fn render_order_is_stable_across_frames(entries in arb_entries(), frame in 0u64..1000) {
        let a = build_schedule(&entries, frame, false, GpuTier::High);
        let b = build_schedule(&entries, frame + 2, false, GpuTier::High);
        prop_assert_eq!(&a.prepare, &b.prepare);
        prop_assert_eq!(&a.scene, &b.scene);
        prop_assert_eq!(&a.post, &b.post);
    }

    /// The sorted sequence respects (layer, priority) and preserves
    /// insertion order within ties.
    #[test]
    fn render_order_respects_layer_then_priority(entries in arb_entries()) {
        let schedule = build_schedule(&entries, 0, false, GpuTier::High);
        let key = |idx: usize| {
            let e = entries.iter().find(|e| e.index == idx).unwrap();
            (e.layer_order, e.priority, e.index)
        };
        for pair in schedule.prepare.windows(2) {
            prop_assert!(key(pair[0]) <= key(pair[1]));
        }
    }

    /// Decimated frames only ever drop effects; they never reorder or
    /// invent them.
    #[test]
    fn decimation_filters_are_subsequences(entries in arb_entries(), frame in 0u64..1000) {
        let full = build_schedule(&entries, frame, false, GpuTier::High);
        let thin = build_schedule(&entries, frame, true, GpuTier::High);
        prop_assert_eq!(&full.prepare, &thin.prepare);

        let mut cursor = full.scene.iter();
        for idx in &thin.scene {
            prop_assert!(cursor.any(|f| f == idx), "{} out of order", idx);
        }
        let mut cursor = full.post.iter();
        for idx in &thin.post {
            prop_assert!(cursor.any(|f| f == idx), "{} out of order", idx);
        }
    }

    /// Ping-pong chain: the last step writes Out, every later step reads the
    /// previous write, and no step reads its own write.
    #[test]
    fn post_chain_invariants(count in 1usize..12) {
        let effects: Vec<usize> = (0..count).collect();
        let steps = plan_post_chain(&effects);
        prop_assert_eq!(steps.len(), count);
        prop_assert_eq!(steps.last().unwrap().write, ChainBuf::Out);
        prop_assert_eq!(steps[0].read, ChainBuf::Source);
        for i in 1..steps.len() {
            prop_assert_eq!(steps[i].read, steps[i - 1].write);
        }
        for step in &steps {
            prop_assert_ne!(step.read, step.write);
            prop_assert_ne!(step.write, ChainBuf::Source);
        }
    }

    /// Hysteresis: the active flag only flips when the EMA actually crossed
    /// the corresponding threshold on that sample.
    #[test]
    fn decimation_flips_only_across_thresholds(times in prop::collection::vec(1.0f32..50.0, 1..200)) {
        let mut state = DecimationState::new();
        let mut was_active = state.active;
        for t in times {
            state.record(t);
            if state.active != was_active {
                if state.active {
                    prop_assert!(state.avg_frame_time_ms > DECIMATION_ENTER_MS);
                } else {
                    prop_assert!(state.avg_frame_time_ms < DECIMATION_EXIT_MS);
                }
            } else if was_active {
                // Still active: the EMA cannot be below the exit threshold.
                prop_assert!(state.avg_frame_time_ms >= DECIMATION_EXIT_MS);
            } else {
                prop_assert!(state.avg_frame_time_ms <= DECIMATION_ENTER_MS);
            }
            was_active = state.active;
        }
    }
}

/// The literal scenario from the frame-time series [30,30,30,30,30]:
/// decimation enters by the second sample; sustained 10 ms frames leave
/// once the EMA drops below the exit threshold.
#[test]
fn decimation_scenario_enters_fast_and_exits_below_14ms() {
    let mut state = DecimationState::new();
    for i in 0..5 {
        state.record(30.0);
        if i >= 1 {
            assert!(state.active, "not active after sample {i}");
        }
    }
    let mut samples = 0;
    while state.active {
        state.record(10.0);
        samples += 1;
        assert!(samples < 64, "never exited");
    }
    assert!(state.avg_frame_time_ms < DECIMATION_EXIT_MS);
}
