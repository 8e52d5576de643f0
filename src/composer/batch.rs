//! Batched effect registration.
//!
//! Phase 1 inserts every effect into the registry synchronously in array
//! order, so the render order is deterministic no matter how initialisation
//! completes. Phase 2 initialises in bounded groups: up to `concurrency`
//! pipeline builds are issued before the device is polled, letting the
//! driver compile shaders in parallel without unbounded in-flight work.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};

use crate::composer::EffectComposer;
use crate::effects::{Effect, EffectCtx, EffectDesc, EffectKind};
use crate::host::SceneHost;

pub struct BatchOptions {
    pub concurrency: usize,
    /// Effects inserted but deferred: disabled, lazy-init pending.
    pub skip_ids: HashSet<String>,
    /// Called after each initialisation with (completed, total, id).
    pub on_progress: Option<Box<dyn FnMut(usize, usize, &str)>>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            skip_ids: HashSet::new(),
            on_progress: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub registered: Vec<String>,
    pub skipped: Vec<String>,
    pub deferred: Vec<String>,
    pub timings: Vec<(String, Duration)>,
}

impl EffectComposer {
    pub fn register_effect_batch(
        &mut self,
        host: &dyn SceneHost,
        batch: Vec<(EffectDesc, EffectKind)>,
        mut options: BatchOptions,
    ) -> Result<BatchReport> {
        if self.disposed {
            bail!("composer is disposed");
        }
        let concurrency = options.concurrency.max(1);
        let mut report = BatchReport::default();
        let mut to_init: Vec<String> = Vec::new();

        // Phase 1: synchronous insertion in array order.
        for (desc, kind) in batch {
            if self.index_by_id.contains_key(&desc.id) {
                eprintln!("[composer] batch: duplicate effect '{}'", desc.id);
                report.skipped.push(desc.id);
                continue;
            }
            if !self.settings.gpu_tier.supports(desc.required_tier) {
                eprintln!(
                    "[composer] batch: skipping '{}': requires {:?}, gpu tier is {:?}",
                    desc.id, desc.required_tier, self.settings.gpu_tier
                );
                report.skipped.push(desc.id);
                continue;
            }

            let mut effect = Effect::new(&desc, kind);
            if options.skip_ids.contains(&desc.id) {
                effect.header.enabled = false;
                effect.header.lazy_init_pending = true;
                report.deferred.push(desc.id.clone());
            } else {
                to_init.push(desc.id.clone());
            }
            self.insert_effect(desc, effect);
        }

        // Phase 2: bounded initialisation, registry order preserved.
        let total = to_init.len();
        let mut completed = 0usize;
        for group in to_init.chunks(concurrency) {
            for id in group {
                let index = self.index_by_id[id];
                let output_format = self.pool.color_format();
                let started = Instant::now();
                let result = {
                    let Self { effects, gpu, pool, frame_state, .. } = self;
                    let mut ctx = EffectCtx {
                        gpu,
                        host,
                        pool,
                        frame_state,
                        output_format,
                    };
                    effects[index].initialize(&mut ctx)
                };
                report.timings.push((id.clone(), started.elapsed()));
                completed += 1;

                match result {
                    Ok(()) => report.registered.push(id.clone()),
                    Err(e) => {
                        // Left deferred so a later ensure call can retry.
                        eprintln!("[composer] batch: '{id}' failed to initialize: {e:#}");
                        let header = &mut self.effects[index].header;
                        header.enabled = false;
                        header.lazy_init_pending = true;
                        report.deferred.push(id.clone());
                    }
                }
                if let Some(progress) = options.on_progress.as_mut() {
                    progress(completed, total, id);
                }
            }
            // Let in-flight shader compilation drain before the next group.
            let _ = self.gpu.device.poll(wgpu::PollType::Poll);
        }

        self.invalidate_render_order();
        Ok(report)
    }
}
