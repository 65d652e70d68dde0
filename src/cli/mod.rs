// ============================================================
// CLI / Presentation Layer
// ============================================================
// Parses arguments with clap and routes each subcommand to a
// use case. Backend and device selection happen here, so the
// layers below stay generic over the burn backend.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use burn::backend::{
    ndarray::NdArrayDevice,
    wgpu::WgpuDevice,
    Autodiff, NdArray, Wgpu,
};
use clap::Parser;

use commands::{Accelerator, Commands, EnvArgs, ScheduleArgs, TrainArgs};

use crate::application::{
    inspect_use_case::{inspect_env, lr_schedule},
    train_use_case::TrainUseCase,
};

#[derive(Parser, Debug)]
#[command(
    name = "distrib-cls",
    version,
    about = "Distributed image-classification training with burn."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match &self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Env(args)      => run_env(args),
            Commands::Schedule(args) => run_schedule(args),
        }
    }
}

fn run_train(args: &TrainArgs) -> Result<()> {
    tracing::info!("Starting training from config '{}'", args.cfg.display());
    let use_case = TrainUseCase::new(args.into());

    let report = match args.device {
        Accelerator::Wgpu => use_case.execute::<Autodiff<Wgpu>, _>(WgpuDevice::DiscreteGpu)?,
        Accelerator::Cpu  => use_case.execute::<Autodiff<NdArray>, _>(|_| NdArrayDevice::Cpu)?,
    };

    tracing::info!(
        "Finished {} epochs, best Acc@1 {:.3}",
        report.epochs_run,
        report.best_acc1
    );
    Ok(())
}

fn run_env(args: &EnvArgs) -> Result<()> {
    let resolution = inspect_env(args.port, args.num_gpus)?;
    let ctx = &resolution.context;

    println!("mode:         {:?}", ctx.mode);
    println!("rank:         {}/{}", ctx.rank, ctx.world_size);
    println!("local rank:   {}", ctx.local_rank);
    println!("device index: {}", ctx.device_index);
    println!("master:       {}:{}",
        ctx.master_addr.as_deref().unwrap_or("-"),
        ctx.master_port.as_deref().unwrap_or("-"),
    );
    for (var, value) in &resolution.exports {
        println!("export {var}={value}");
    }
    Ok(())
}

fn run_schedule(args: &ScheduleArgs) -> Result<()> {
    for (epoch, lr) in lr_schedule(&args.cfg, &args.opts)? {
        println!("{epoch:>4}  {lr:.6}");
    }
    Ok(())
}
