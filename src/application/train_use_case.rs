// ============================================================
// TrainUseCase
// ============================================================
// Orchestrates a training run in order:
//
//   Step 1: Load YAML config + KEY VALUE overrides   (config)
//   Step 2: Install it as the process-wide config     (config)
//   Step 3: Bootstrap the distributed context        (distributed)
//   Step 4: Bind this rank's device, seed the backend
//   Step 5: Run the epoch loop                        (ml::trainer)
//
// The caller chooses the burn backend and how a device index
// maps to a device, so the same flow runs on wgpu and on CPU.

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::tensor::backend::AutodiffBackend;

use crate::application::load_config;
use crate::config;
use crate::distributed::{setup_distributed, CommBackend};
use crate::infra::show_log;
use crate::ml::trainer::{run_training, TrainReport};

/// Everything the `train` command hands over
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub cfg_file: PathBuf,
    /// Flat `KEY VALUE` override list
    pub opts:     Vec<String>,
    pub backend:  CommBackend,
    pub port:     Option<u16>,
}

pub struct TrainUseCase {
    options: TrainOptions,
}

impl TrainUseCase {
    pub fn new(options: TrainOptions) -> Self {
        Self { options }
    }

    /// Execute the run on backend `B`; `device_for` maps the rank's
    /// device index to a `B` device.
    pub fn execute<B, F>(&self, device_for: F) -> Result<TrainReport>
    where
        B: AutodiffBackend,
        F: Fn(usize) -> B::Device,
    {
        let o = &self.options;

        // ── Steps 1-2: configuration ──────────────────────────────────────────
        let cfg = load_config(&o.cfg_file, &o.opts)?;
        let cfg = config::install(cfg).context("Cannot install the global config")?;

        // ── Step 3: distributed bootstrap ─────────────────────────────────────
        let dist = setup_distributed(cfg, o.backend, o.port)
            .context("Distributed setup failed")?;
        let rank = dist.context.rank;
        show_log(&format!("Config:\n{}", cfg.to_yaml()?), rank);

        // ── Step 4: device and seed ───────────────────────────────────────────
        let device = device_for(dist.context.device_index);
        tracing::info!("Rank {} using device {:?}", rank, device);
        B::seed(cfg.rng_seed);

        // ── Step 5: training loop ─────────────────────────────────────────────
        let report = run_training::<B>(cfg, &dist, device)
            .with_context(|| format!("Training failed on rank {rank}"))?;
        Ok(report)
    }
}
