// ============================================================
// Training Loop
// ============================================================
// Epoch loop tying every helper together:
//
//   for epoch in start..OPTIM.MAX_EPOCH:
//     sampler.set_epoch(epoch)          ← new shard permutation
//     train_epoch  (Autodiff backend)   ← SGD at scheduler lr
//     validate     (inner backend)      ← model.valid(), no graph
//     scheduler.step()
//     rank 0: checkpoint (+ _best copy) and metrics.csv row
//
// Per-batch loss / Acc@1 / Acc@5 are averaged across ranks with
// scaled_all_reduce before they reach the meters, so every rank
// prints the same numbers.
//
// Reference: Burn Book §5 (Training)

use std::{path::Path, sync::Arc, time::Instant};

use burn::{
    data::dataloader::DataLoader,
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::config::Config as RunConfig;
use crate::data::{batcher::ImageBatch, construct_loader};
use crate::distributed::{scaled_all_reduce, Distributed, ProcessGroup};
use crate::error::{Error, Result};
use crate::infra::{
    get_meters, has_checkpoint, has_optimizer, load_checkpoint, load_optimizer, save_checkpoint,
    save_optimizer, show_log, EpochMetrics, MetricsLogger, ProgressMeter, TrainState,
    CHECKPOINT_NAME,
};
use crate::ml::{
    accuracy::accuracy,
    model::{build_model, ConvNet},
    optim::construct_optimizer,
    scheduler::{get_lr_scheduler, LrSchedule},
};

/// Rank-averaged results of one pass over a loader
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochSummary {
    pub loss: f64,
    pub acc1: f64,
    pub acc5: f64,
}

/// What a finished run reports back
#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    pub epochs_run: usize,
    pub best_acc1:  f64,
}

/// Average `[loss, acc1, acc5]` across the group
fn reduce_metrics<B: Backend>(
    group:  &dyn ProcessGroup,
    values: [f64; 3],
    device: &B::Device,
) -> Result<[f64; 3]> {
    if group.world_size() == 1 {
        return Ok(values);
    }
    let packed = Tensor::<B, 1>::from_floats(values.map(|v| v as f32), device);
    let reduced = scaled_all_reduce(group, vec![packed])?;

    let mut out = [0.0; 3];
    for (slot, v) in out.iter_mut().zip(reduced[0].to_data().iter::<f32>()) {
        *slot = v as f64;
    }
    Ok(out)
}

/// burn ends a loader pass at the first item that fails to load, so a
/// short pass means an unreadable sample.
fn check_batch_count(seen: usize, expected: usize, pass: &str) -> Result<()> {
    if seen < expected {
        return Err(Error::Dataset(format!(
            "{pass} loader yielded {seen} of {expected} batches; a sample failed to load"
        )));
    }
    Ok(())
}

/// One optimisation pass over the training loader
#[allow(clippy::too_many_arguments)]
pub fn train_epoch<B, O>(
    mut model:   ConvNet<B>,
    optim:       &mut O,
    loader:      &Arc<dyn DataLoader<ImageBatch<B>>>,
    num_batches: usize,
    lr:          f64,
    epoch:       usize,
    cfg:         &RunConfig,
    dist:        &Distributed,
) -> Result<(ConvNet<B>, EpochSummary)>
where
    B: AutodiffBackend,
    O: Optimizer<ConvNet<B>, B>,
{
    let rank       = dist.context.rank;
    let print_freq = cfg.train.print_freq.max(1);
    let mut meters = get_meters(true);
    let progress   = ProgressMeter::new(num_batches, format!("Epoch: [{epoch}]"));

    let mut seen = 0;
    let mut end  = Instant::now();
    for (i, batch) in loader.iter().enumerate() {
        seen = i + 1;
        meters.data_time.update(end.elapsed().as_secs_f64(), 1);

        let n      = batch.targets.dims()[0];
        let device = batch.images.device();

        let (loss, logits) = model.forward_loss(batch.images, batch.targets.clone());
        let accs = accuracy(logits.detach(), batch.targets, &[1, 5])?;
        let loss_value: f64 = loss.clone().into_scalar().elem::<f64>();

        let [loss_avg, acc1, acc5] = reduce_metrics::<B::InnerBackend>(
            dist.group.as_ref(),
            [loss_value, accs[0], accs[1]],
            &device,
        )?;
        meters.losses.update(loss_avg, n);
        meters.top1.update(acc1, n);
        meters.top5.update(acc5, n);

        // Backward pass + SGD update
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optim.step(lr, model, grads);

        meters.batch_time.update(end.elapsed().as_secs_f64(), 1);
        end = Instant::now();

        if i % print_freq == 0 {
            progress.display(i, &meters.shown(), rank);
        }
    }
    check_batch_count(seen, num_batches, "train")?;

    let summary = EpochSummary {
        loss: meters.losses.avg,
        acc1: meters.top1.avg,
        acc5: meters.top5.avg,
    };
    Ok((model, summary))
}

/// Evaluate on the validation loader without building a graph
pub fn validate<B: Backend>(
    model:       &ConvNet<B>,
    loader:      &Arc<dyn DataLoader<ImageBatch<B>>>,
    num_batches: usize,
    cfg:         &RunConfig,
    dist:        &Distributed,
) -> Result<EpochSummary> {
    let rank       = dist.context.rank;
    let print_freq = cfg.train.print_freq.max(1);
    let mut meters = get_meters(false);
    let progress   = ProgressMeter::new(num_batches, "Test: ");

    let mut seen = 0;
    let mut end  = Instant::now();
    for (i, batch) in loader.iter().enumerate() {
        seen = i + 1;
        let n      = batch.targets.dims()[0];
        let device = batch.images.device();

        let (loss, logits) = model.forward_loss(batch.images, batch.targets.clone());
        let accs = accuracy(logits, batch.targets, &[1, 5])?;
        let loss_value: f64 = loss.into_scalar().elem::<f64>();

        let [loss_avg, acc1, acc5] =
            reduce_metrics::<B>(dist.group.as_ref(), [loss_value, accs[0], accs[1]], &device)?;
        meters.losses.update(loss_avg, n);
        meters.top1.update(acc1, n);
        meters.top5.update(acc5, n);

        meters.batch_time.update(end.elapsed().as_secs_f64(), 1);
        end = Instant::now();

        if i % print_freq == 0 {
            progress.display(i, &meters.shown(), rank);
        }
    }
    check_batch_count(seen, num_batches, "val")?;

    show_log(
        &format!(" * Acc@1 {:.3} Acc@5 {:.3}", meters.top1.avg, meters.top5.avg),
        rank,
    );
    Ok(EpochSummary {
        loss: meters.losses.avg,
        acc1: meters.top1.avg,
        acc5: meters.top5.avg,
    })
}

/// Train from scratch, or from `OUT_DIR/ckpt.*` when TRAIN.RESUME is set
pub fn run_training<B: AutodiffBackend>(
    cfg:    &RunConfig,
    dist:   &Distributed,
    device: B::Device,
) -> Result<TrainReport> {
    let rank    = dist.context.rank;
    let out_dir = Path::new(&cfg.out_dir);

    // ── Data, model, optimiser, schedule ─────────────────────────────────────
    let loaders   = construct_loader::<B>(cfg, &dist.context, &device)?;
    let mut model = build_model::<B>(cfg, &device)?;
    let mut optim = construct_optimizer::<B, ConvNet<B>>(cfg);
    let mut scheduler = get_lr_scheduler(cfg)?;
    tracing::info!(
        "Model '{}' ready: {} classes, {} train / {} val batches per epoch",
        cfg.model.arch,
        cfg.model.num_classes,
        loaders.train_batches,
        loaders.val_batches,
    );

    // ── Resume ────────────────────────────────────────────────────────────────
    let mut start_epoch = 0;
    let mut best_acc1   = 0.0f64;
    if cfg.train.resume && has_checkpoint::<B>(out_dir, CHECKPOINT_NAME) {
        let (restored, state) =
            load_checkpoint::<B, ConvNet<B>>(out_dir, CHECKPOINT_NAME, model, &device)?;
        if state.arch != cfg.model.arch {
            return Err(Error::Checkpoint(format!(
                "checkpoint holds '{}' but MODEL.ARCH is '{}'",
                state.arch, cfg.model.arch
            )));
        }
        if has_optimizer::<B>(out_dir, CHECKPOINT_NAME) {
            optim = load_optimizer::<B, ConvNet<B>, _>(out_dir, CHECKPOINT_NAME, optim, &device)?;
        } else {
            tracing::warn!("No optimizer state next to the checkpoint; momentum starts empty");
        }
        model       = restored;
        start_epoch = state.epoch;
        best_acc1   = state.best_acc1;
        scheduler   = scheduler.with_last_epoch(start_epoch);
        show_log(&format!("Resuming from epoch {start_epoch} (best Acc@1 {best_acc1:.3})"), rank);
    }

    let metrics = if dist.context.is_main_process() {
        Some(MetricsLogger::new(out_dir)?)
    } else {
        None
    };

    // ── Epoch loop ────────────────────────────────────────────────────────────
    let max_epoch = cfg.optim.max_epoch;
    for epoch in start_epoch..max_epoch {
        loaders.sampler.set_epoch(epoch);
        let lr = scheduler.get_lr();

        let (trained, train) = train_epoch(
            model,
            &mut optim,
            &loaders.train,
            loaders.train_batches,
            lr,
            epoch,
            cfg,
            dist,
        )?;
        model = trained;

        let val = validate(&model.valid(), &loaders.val, loaders.val_batches, cfg, dist)?;
        scheduler.step();

        let row = EpochMetrics {
            epoch:      epoch + 1,
            lr,
            train_loss: train.loss,
            train_acc1: train.acc1,
            val_loss:   val.loss,
            val_acc1:   val.acc1,
            val_acc5:   val.acc5,
        };
        let is_best = row.is_improvement(best_acc1);
        best_acc1   = best_acc1.max(row.val_acc1);

        show_log(
            &format!(
                "Epoch {:>3}/{} | lr={:.6} | train_loss={:.4} | val_loss={:.4} | Acc@1={:.3} | Acc@5={:.3}",
                row.epoch,
                max_epoch,
                row.lr,
                row.train_loss,
                row.val_loss,
                row.val_acc1,
                row.val_acc5,
            ),
            rank,
        );

        if let Some(logger) = &metrics {
            let state = TrainState {
                epoch:     row.epoch,
                arch:      cfg.model.arch.clone(),
                best_acc1,
            };
            save_checkpoint::<B, ConvNet<B>>(out_dir, CHECKPOINT_NAME, &state, &model, is_best)?;
            save_optimizer::<B, ConvNet<B>, _>(out_dir, CHECKPOINT_NAME, &optim)?;
            logger.log(&row)?;
        }
    }

    tracing::info!("Training complete, best Acc@1 {:.3}", best_acc1);
    Ok(TrainReport {
        epochs_run: max_epoch.saturating_sub(start_epoch),
        best_acc1,
    })
}
