//! Registry and lifecycle scenarios: batch registration with deferral, lazy
//! initialisation, init failure, runtime failure isolation, and the post
//! chain's ping-pong contract.

mod common;

use std::collections::HashSet;

use common::{MockHost, MockWorld, RecordingPost, headless_gpu, make_screen, new_log};
use tilefx::composer::{BatchOptions, EffectComposer, FrameTargets};
use tilefx::effects::{EffectDesc, EffectKind};
use tilefx::layers::EffectLayer;

fn post_desc(id: &str, priority: i32) -> EffectDesc {
    EffectDesc::new(id, EffectLayer::PostProcessing).priority(priority)
}

#[test]
fn post_chain_renders_by_priority_and_ping_pongs_to_screen() {
    let Some(gpu) = headless_gpu() else { return };
    let host = MockHost::new([32, 32]);
    let mut composer = EffectComposer::new(gpu.ctx, &host);
    let (_screen_tex, screen_view) = make_screen(composer.gpu(), [32, 32]);

    let log = new_log();
    // Registered [A, B]; priority orders them [B, A].
    composer
        .register_effect(
            &host,
            post_desc("A", 10),
            EffectKind::PostProcess(Box::new(RecordingPost::new("A", log.clone()))),
        )
        .unwrap();
    composer
        .register_effect(
            &host,
            post_desc("B", 5),
            EffectKind::PostProcess(Box::new(RecordingPost::new("B", log.clone()))),
        )
        .unwrap();

    let mut world = MockWorld::new(host.visible_floor.clone(), vec![wgpu::Color::RED]);
    composer
        .render_frame(
            &host,
            &mut world,
            &FrameTargets {
                screen: &screen_view,
                screen_format: wgpu::TextureFormat::Rgba8Unorm,
            },
        )
        .unwrap();

    let entries = log.borrow().clone();
    // prepare_frame for both effects precedes every update/render.
    let last_prepare = entries.iter().rposition(|e| e.ends_with(":prepare")).unwrap();
    let first_update = entries.iter().position(|e| e.ends_with(":update")).unwrap();
    assert!(last_prepare < first_update, "prepare after update in {entries:?}");

    // B renders into post_1; A samples post_1 and writes the screen.
    let chain: Vec<&String> = entries
        .iter()
        .filter(|e| e.contains(":buffers") || e.ends_with(":render") || e.ends_with(":to_screen"))
        .collect();
    assert_eq!(
        chain,
        vec![
            "B:buffers:scene->post_1",
            "B:render",
            "A:buffers:post_1->screen",
            "A:to_screen",
            "A:render",
        ],
        "full log: {entries:?}"
    );
}

#[test]
fn batch_registers_in_order_and_defers_skip_ids() {
    let Some(gpu) = headless_gpu() else { return };
    let host = MockHost::new([16, 16]);
    let mut composer = EffectComposer::new(gpu.ctx, &host);

    let log = new_log();
    let batch = vec![
        (
            post_desc("E1", 0),
            EffectKind::PostProcess(Box::new(RecordingPost::new("E1", log.clone()))),
        ),
        (
            post_desc("E2", 1),
            EffectKind::PostProcess(Box::new(RecordingPost::new("E2", log.clone()))),
        ),
        (
            post_desc("E3", 2),
            EffectKind::PostProcess(Box::new(RecordingPost::new("E3", log.clone()))),
        ),
    ];
    let report = composer
        .register_effect_batch(
            &host,
            batch,
            BatchOptions {
                skip_ids: HashSet::from(["E2".to_string()]),
                ..Default::default()
            },
        )
        .unwrap();

    // All three sit in the registry in array order.
    assert_eq!(composer.effect_ids(), vec!["E1", "E2", "E3"]);
    assert_eq!(report.registered, vec!["E1", "E3"]);
    assert_eq!(report.deferred, vec!["E2"]);
    assert!(report.skipped.is_empty());
    assert_eq!(report.timings.len(), 2);

    let e2 = composer.effect_header("E2").unwrap();
    assert!(!e2.enabled);
    assert!(e2.is_lazy_pending());

    // Deferred init resolves exactly once.
    assert!(composer.ensure_effect_initialized(&host, "E2").unwrap());
    let e2 = composer.effect_header("E2").unwrap();
    assert!(!e2.is_lazy_pending());
    assert!(e2.enabled);
    assert!(!composer.ensure_effect_initialized(&host, "E2").unwrap());
}

#[test]
fn batch_progress_reports_every_initialisation() {
    let Some(gpu) = headless_gpu() else { return };
    let host = MockHost::new([16, 16]);
    let mut composer = EffectComposer::new(gpu.ctx, &host);

    let log = new_log();
    let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen_cb = seen.clone();
    let batch = vec![
        (
            post_desc("P1", 0),
            EffectKind::PostProcess(Box::new(RecordingPost::new("P1", log.clone()))),
        ),
        (
            post_desc("P2", 1),
            EffectKind::PostProcess(Box::new(RecordingPost::new("P2", log.clone()))),
        ),
    ];
    composer
        .register_effect_batch(
            &host,
            batch,
            BatchOptions {
                concurrency: 1,
                on_progress: Some(Box::new(move |done, total, id| {
                    seen_cb.lock().unwrap().push((done, total, id.to_string()));
                })),
                ..Default::default()
            },
        )
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(*seen, vec![(1, 2, "P1".to_string()), (2, 2, "P2".to_string())]);
}

#[test]
fn failing_initialize_omits_the_effect() {
    let Some(gpu) = headless_gpu() else { return };
    let host = MockHost::new([16, 16]);
    let mut composer = EffectComposer::new(gpu.ctx, &host);
    let (_screen_tex, screen_view) = make_screen(composer.gpu(), [16, 16]);

    let log = new_log();
    let mut bad = RecordingPost::new("bad", log.clone());
    bad.fail_create = true;
    let registered = composer
        .register_effect(&host, post_desc("bad", 0), EffectKind::PostProcess(Box::new(bad)))
        .unwrap();

    assert!(!registered);
    assert!(composer.effect_header("bad").is_none());

    // No further attempt to call its methods.
    let mut world = MockWorld::new(host.visible_floor.clone(), vec![wgpu::Color::RED]);
    composer
        .render_frame(
            &host,
            &mut world,
            &FrameTargets {
                screen: &screen_view,
                screen_format: wgpu::TextureFormat::Rgba8Unorm,
            },
        )
        .unwrap();
    assert!(log.borrow().is_empty(), "got {:?}", log.borrow());
}

#[test]
fn duplicate_registration_is_an_error() {
    let Some(gpu) = headless_gpu() else { return };
    let host = MockHost::new([16, 16]);
    let mut composer = EffectComposer::new(gpu.ctx, &host);

    let log = new_log();
    composer
        .register_effect(
            &host,
            post_desc("dup", 0),
            EffectKind::PostProcess(Box::new(RecordingPost::new("dup", log.clone()))),
        )
        .unwrap();
    let err = composer.register_effect(
        &host,
        post_desc("dup", 0),
        EffectKind::PostProcess(Box::new(RecordingPost::new("dup", log))),
    );
    assert!(err.is_err());
}

#[test]
fn runtime_failure_disables_effect_and_notifies_once() {
    let Some(gpu) = headless_gpu() else { return };
    let host = MockHost::new([16, 16]);
    let mut composer = EffectComposer::new(gpu.ctx, &host);
    let (_screen_tex, screen_view) = make_screen(composer.gpu(), [16, 16]);

    let log = new_log();
    let mut flaky = RecordingPost::new("flaky", log.clone());
    flaky.fail_render = true;
    composer
        .register_effect(&host, post_desc("flaky", 0), EffectKind::PostProcess(Box::new(flaky)))
        .unwrap();

    let mut world = MockWorld::new(host.visible_floor.clone(), vec![wgpu::Color::RED]);
    let targets = FrameTargets {
        screen: &screen_view,
        screen_format: wgpu::TextureFormat::Rgba8Unorm,
    };

    // The frame completes despite the failure.
    composer.render_frame(&host, &mut world, &targets).unwrap();
    let header = composer.effect_header("flaky").unwrap();
    assert!(!header.enabled);
    assert!(header.error_state().is_some());
    assert_eq!(host.warnings.borrow().len(), 1);

    // Disabled for the rest of the session; no second notification.
    let updates_before = log.borrow().iter().filter(|e| e.ends_with(":update")).count();
    composer.render_frame(&host, &mut world, &targets).unwrap();
    let updates_after = log.borrow().iter().filter(|e| e.ends_with(":update")).count();
    assert_eq!(updates_before, updates_after);
    assert_eq!(host.warnings.borrow().len(), 1);
}
