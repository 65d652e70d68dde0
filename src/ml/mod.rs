// ============================================================
// ML Layer (Burn)
// ============================================================
// Model, optimisation and evaluation pieces:
//
//   model.rs     — ConvNet classifier and build_model (MODEL.ARCH)
//
//   optim.rs     — SGD (momentum, dampening, Nesterov, weight
//                  decay) from the OPTIM section
//
//   scheduler.rs — per-epoch learning rate: cosine or multi-step
//
//   accuracy.rs  — top-k accuracy in percent
//
//   trainer.rs   — epoch loop: train, validate, checkpoint
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// Top-k accuracy
pub mod accuracy;

/// Convolutional classifier
pub mod model;

/// Optimizer construction
pub mod optim;

/// Learning rate schedules
pub mod scheduler;

/// Train / validate / checkpoint loop
pub mod trainer;

pub use accuracy::accuracy;
pub use model::{build_model, ConvNet, ConvNetConfig};
pub use optim::construct_optimizer;
pub use scheduler::{get_lr_scheduler, LrSchedule, LrScheduler};
pub use trainer::{run_training, TrainReport};
