// ============================================================
// Infrastructure Layer
// ============================================================
// Cross-cutting pieces used by the training loop:
//
//   meters.rs      — AverageMeter / ProgressMeter and rank-0
//                    console output (show_log)
//
//   checkpoint.rs  — model and optimizer records (CompactRecorder)
//                    plus the TrainState JSON, with `_best` copies
//
//   metrics.rs     — per-epoch CSV log
//
// Everything here writes to stdout or OUT_DIR; none of it
// touches the process group.

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Running-average meters and progress lines
pub mod meters;

/// Training metrics CSV logger
pub mod metrics;

pub use checkpoint::{
    has_checkpoint, has_optimizer, load_checkpoint, load_optimizer, save_checkpoint,
    save_optimizer, TrainState, CHECKPOINT_NAME,
};
pub use meters::{get_meters, show_log, AverageMeter, EpochMeters, MeterFormat, ProgressMeter};
pub use metrics::{EpochMetrics, MetricsLogger};
