// ============================================================
// Data Pipeline
// ============================================================
// Image files on disk all the way to device-ready batches:
//
//   class-per-directory images
//       │
//       ▼
//   ImageFolder         → scans classes, decodes on demand
//       │
//       ▼
//   DistributedSampler  → this rank's shuffled share (train only)
//       │
//       ▼
//   ImageBatcher        → transform + normalize + stack
//       │
//       ▼
//   DataLoader          → burn's (multi-worker) iteration
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Implements Burn's Dataset trait over a class-per-directory tree
pub mod dataset;

/// Per-rank dataset sharding with per-epoch reshuffling
pub mod sampler;

/// Crop / resize / flip / normalize
pub mod transform;

/// Implements Burn's Batcher trait to create image batches
pub mod batcher;

/// Builds the train and validation loaders from the config
pub mod loader;

pub use batcher::{ImageBatch, ImageBatcher};
pub use dataset::{ImageFolder, ImageItem};
pub use loader::{construct_loader, Loaders};
pub use sampler::DistributedSampler;
pub use transform::Transform;
