// ============================================================
// Checkpoints
// ============================================================
// One checkpoint is two files sharing a stem:
//
//   checkpoint/
//     ckpt.mpk          ← model record (CompactRecorder)
//     ckpt.json         ← TrainState: epoch, arch, best_acc1
//     ckpt_optim.mpk    ← optimizer record (SGD momentum buffers)
//     ckpt_best.mpk     ← copies made when top-1 improved
//     ckpt_best.json
//
// The recorder picks the weight file's extension, so paths are
// handed to it without one and the `_best` copy asks the
// recorder which extension it wrote.
//
// Only rank 0 writes; every rank may read.

use std::{
    fs,
    path::{Path, PathBuf},
};

use burn::{
    module::AutodiffModule,
    optim::Optimizer,
    prelude::*,
    record::{CompactRecorder, FileRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Stem used by the training driver
pub const CHECKPOINT_NAME: &str = "ckpt";

/// Primitive training progress stored next to the weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainState {
    /// Number of epochs completed
    pub epoch:     usize,
    pub arch:      String,
    pub best_acc1: f64,
}

fn record_stem(dir: &Path, filename: &str) -> PathBuf {
    dir.join(filename)
}

fn state_path(dir: &Path, filename: &str) -> PathBuf {
    dir.join(format!("{filename}.json"))
}

fn weights_path<B: Backend>(dir: &Path, filename: &str) -> PathBuf {
    let ext = <CompactRecorder as FileRecorder<B>>::file_extension();
    dir.join(format!("{filename}.{ext}"))
}

fn optim_name(filename: &str) -> String {
    format!("{filename}_optim")
}

/// Write `model` and `state` under `dir`; copy both to `{filename}_best.*`
/// when `is_best`.
pub fn save_checkpoint<B: Backend, M: Module<B>>(
    dir:      &Path,
    filename: &str,
    state:    &TrainState,
    model:    &M,
    is_best:  bool,
) -> Result<()> {
    fs::create_dir_all(dir)?;

    CompactRecorder::new()
        .record(model.clone().into_record(), record_stem(dir, filename))
        .map_err(|e| {
            Error::Checkpoint(format!("cannot save '{}': {e}", dir.join(filename).display()))
        })?;

    let json = serde_json::to_string_pretty(state)
        .map_err(|e| Error::Checkpoint(format!("cannot encode training state: {e}")))?;
    fs::write(state_path(dir, filename), json)?;

    tracing::debug!("Saved checkpoint '{}' at epoch {}", filename, state.epoch);

    if is_best {
        let best = format!("{filename}_best");
        fs::copy(weights_path::<B>(dir, filename), weights_path::<B>(dir, &best))?;
        fs::copy(state_path(dir, filename), state_path(dir, &best))?;
        tracing::info!("New best Acc@1 {:.3} at epoch {}", state.best_acc1, state.epoch);
    }

    Ok(())
}

/// Restore weights into `model` and read the matching `TrainState`
pub fn load_checkpoint<B: Backend, M: Module<B>>(
    dir:      &Path,
    filename: &str,
    model:    M,
    device:   &B::Device,
) -> Result<(M, TrainState)> {
    let json = fs::read_to_string(state_path(dir, filename)).map_err(|e| {
        Error::Checkpoint(format!(
            "cannot read '{}': {e}",
            state_path(dir, filename).display()
        ))
    })?;
    let state: TrainState = serde_json::from_str(&json)
        .map_err(|e| Error::Checkpoint(format!("corrupt training state: {e}")))?;

    let record = CompactRecorder::new()
        .load(record_stem(dir, filename), device)
        .map_err(|e| {
            Error::Checkpoint(format!("cannot load '{}': {e}", dir.join(filename).display()))
        })?;

    tracing::info!("Loaded checkpoint '{}' (epoch {})", filename, state.epoch);
    Ok((model.load_record(record), state))
}

/// Both halves of the checkpoint exist
pub fn has_checkpoint<B: Backend>(dir: &Path, filename: &str) -> bool {
    weights_path::<B>(dir, filename).is_file() && state_path(dir, filename).is_file()
}

/// Write the optimizer's per-parameter state next to checkpoint `filename`
pub fn save_optimizer<B, M, O>(dir: &Path, filename: &str, optim: &O) -> Result<()>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    fs::create_dir_all(dir)?;
    let name = optim_name(filename);

    CompactRecorder::new()
        .record(optim.to_record(), record_stem(dir, &name))
        .map_err(|e| {
            Error::Checkpoint(format!("cannot save '{}': {e}", dir.join(&name).display()))
        })?;

    tracing::debug!("Saved optimizer state '{}'", name);
    Ok(())
}

/// Restore state written by [`save_optimizer`] into `optim`
pub fn load_optimizer<B, M, O>(
    dir:      &Path,
    filename: &str,
    optim:    O,
    device:   &B::Device,
) -> Result<O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    let name = optim_name(filename);
    let record = CompactRecorder::new()
        .load(record_stem(dir, &name), device)
        .map_err(|e| {
            Error::Checkpoint(format!("cannot load '{}': {e}", dir.join(&name).display()))
        })?;

    tracing::info!("Loaded optimizer state '{}'", name);
    Ok(optim.load_record(record))
}

pub fn has_optimizer<B: Backend>(dir: &Path, filename: &str) -> bool {
    weights_path::<B>(dir, &optim_name(filename)).is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::{ConvNet, ConvNetConfig};
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn tiny_model() -> ConvNet<TestBackend> {
        ConvNetConfig::new(3).with_width(2).init(&Default::default())
    }

    #[test]
    fn test_round_trip_restores_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = TrainState { epoch: 7, arch: "convnet".to_string(), best_acc1: 61.25 };
        let model = tiny_model();

        save_checkpoint::<TestBackend, _>(dir.path(), CHECKPOINT_NAME, &state, &model, false)
            .unwrap();
        assert!(has_checkpoint::<TestBackend>(dir.path(), CHECKPOINT_NAME));
        assert!(!has_checkpoint::<TestBackend>(dir.path(), "ckpt_best"));

        let (restored, loaded) = load_checkpoint::<TestBackend, _>(
            dir.path(),
            CHECKPOINT_NAME,
            tiny_model(),
            &Default::default(),
        )
        .unwrap();
        assert_eq!(loaded, state);

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 8, 8], &Default::default());
        let a: Vec<f32> = model.forward(input.clone()).into_data().iter::<f32>().collect();
        let b: Vec<f32> = restored.forward(input).into_data().iter::<f32>().collect();
        for (x, y) in a.iter().zip(&b) {
            // compact records store half precision
            assert!((x - y).abs() < 1e-2, "{x} vs {y}");
        }
    }

    #[test]
    fn test_best_copy() {
        let dir = tempfile::tempdir().unwrap();
        let state = TrainState { epoch: 1, arch: "convnet".to_string(), best_acc1: 10.0 };

        save_checkpoint::<TestBackend, _>(dir.path(), CHECKPOINT_NAME, &state, &tiny_model(), true)
            .unwrap();
        assert!(has_checkpoint::<TestBackend>(dir.path(), "ckpt_best"));

        let (_, best) = load_checkpoint::<TestBackend, _>(
            dir.path(),
            "ckpt_best",
            tiny_model(),
            &Default::default(),
        )
        .unwrap();
        assert_eq!(best, state);
    }

    #[test]
    fn test_optimizer_state_round_trip() {
        use crate::{config::Config, ml::optim::sgd_config};
        use burn::{
            backend::Autodiff,
            nn::{Linear, LinearConfig},
            optim::GradientsParams,
        };

        type AdBackend = Autodiff<TestBackend>;

        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let cfg = Config::default();

        let model: Linear<AdBackend> = LinearConfig::new(2, 1).init(&device);
        let mut optim = sgd_config(&cfg).init::<AdBackend, Linear<AdBackend>>();
        let loss = model.forward(Tensor::<AdBackend, 2>::ones([3, 2], &device)).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        let _model = optim.step(0.1, model, grads);

        assert!(!has_optimizer::<AdBackend>(dir.path(), CHECKPOINT_NAME));
        save_optimizer::<AdBackend, Linear<AdBackend>, _>(dir.path(), CHECKPOINT_NAME, &optim)
            .unwrap();
        assert!(has_optimizer::<AdBackend>(dir.path(), CHECKPOINT_NAME));

        // a fresh optimizer has no momentum buffers until restored
        let fresh = sgd_config(&cfg).init::<AdBackend, Linear<AdBackend>>();
        assert!(fresh.to_record().is_empty());

        let restored = load_optimizer::<AdBackend, Linear<AdBackend>, _>(
            dir.path(),
            CHECKPOINT_NAME,
            fresh,
            &device,
        )
        .unwrap();
        // weight and bias
        assert_eq!(restored.to_record().len(), 2);
    }

    #[test]
    fn test_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!has_checkpoint::<TestBackend>(dir.path(), CHECKPOINT_NAME));
        let err = load_checkpoint::<TestBackend, _>(
            dir.path(),
            CHECKPOINT_NAME,
            tiny_model(),
            &Default::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Checkpoint(_)));
    }
}
