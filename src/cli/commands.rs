// ============================================================
// CLI Commands and Arguments
// ============================================================
// Three subcommands:
//
//   train    --cfg FILE [KEY VALUE ...]   run the training loop
//   env                                   show the resolved rank
//   schedule --cfg FILE [KEY VALUE ...]   print the lr per epoch
//
// Trailing KEY VALUE pairs override the YAML config, e.g.
//   distrib-cls train --cfg run.yaml OPTIM.BASE_LR 0.2 TRAIN.WORKERS 8
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::application::train_use_case::TrainOptions;
use crate::distributed::CommBackend;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a classifier on an ImageFolder dataset
    Train(TrainArgs),

    /// Print the distributed context this process resolves to
    Env(EnvArgs),

    /// Print the learning rate of every epoch
    Schedule(ScheduleArgs),
}

/// Where the tensors live
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accelerator {
    /// wgpu, one adapter per local rank
    Wgpu,
    /// ndarray on the host CPU
    Cpu,
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// YAML config file
    #[arg(long)]
    pub cfg: PathBuf,

    /// Collective backend (nccl or gloo)
    #[arg(long, default_value = "nccl")]
    pub backend: CommBackend,

    /// Rendezvous port, overrides MASTER_PORT under Slurm
    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long, value_enum, default_value_t = Accelerator::Wgpu)]
    pub device: Accelerator,

    /// Config overrides as KEY VALUE pairs
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub opts: Vec<String>,
}

impl From<&TrainArgs> for TrainOptions {
    fn from(a: &TrainArgs) -> Self {
        TrainOptions {
            cfg_file: a.cfg.clone(),
            opts:     a.opts.clone(),
            backend:  a.backend,
            port:     a.port,
        }
    }
}

#[derive(Args, Debug)]
pub struct EnvArgs {
    /// Rendezvous port, overrides MASTER_PORT under Slurm
    #[arg(long)]
    pub port: Option<u16>,

    /// Accelerators per node
    #[arg(long, default_value_t = 1)]
    pub num_gpus: usize,
}

#[derive(Args, Debug)]
pub struct ScheduleArgs {
    /// YAML config file
    #[arg(long)]
    pub cfg: PathBuf,

    /// Config overrides as KEY VALUE pairs
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub opts: Vec<String>,
}
