// ============================================================
// Distributed Layer
// ============================================================
//   env.rs    — reads Slurm / launcher variables, binds a device,
//               creates the process group
//   group.rs  — ProcessGroup trait with single-process and
//               in-process (thread) implementations
//   reduce.rs — scaled all-reduce over burn tensors
//
// Only the sum reduction is exposed; averaging is sum followed
// by a 1/world_size scale.

pub mod env;
pub mod group;
pub mod reduce;

pub use env::{
    init_process_group, setup_distributed, CommBackend, DistContext, Distributed, LaunchMode,
};
pub use group::{ProcessGroup, ReduceWork, SingleProcess, ThreadGroup};
pub use reduce::scaled_all_reduce;
