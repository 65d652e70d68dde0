// ============================================================
// Loader Construction
// ============================================================
// Builds the train and validation DataLoaders from the config:
//
//   train: ImageFolder(TRAIN.DATASET/TRAIN.SPLIT)
//            → DistributedSampler (shuffled, this rank's share)
//            → ImageBatcher(RandomResizedCrop + flip)
//            → DataLoader(TRAIN.BATCH_SIZE, TRAIN.WORKERS)
//
//   val:   ImageFolder(TRAIN.DATASET/TEST.SPLIT)
//            → ImageBatcher(Resize + CenterCrop)
//            → DataLoader(TEST.BATCH_SIZE, in order)
//
// The validation loader produces batches on the inner
// (non-autodiff) backend, so evaluation carries no graph.
//
// Reference: Burn Book §4 (DataLoader)

use std::{path::Path, sync::Arc};

use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    tensor::backend::AutodiffBackend,
};

use crate::config::Config;
use crate::data::{
    batcher::{ImageBatch, ImageBatcher},
    dataset::{ImageFolder, ImageItem},
    sampler::DistributedSampler,
    transform::Transform,
};
use crate::distributed::DistContext;
use crate::error::Result;

pub type TrainSampler = DistributedSampler<ImageFolder, ImageItem>;

pub struct Loaders<B: AutodiffBackend> {
    pub train:   Arc<dyn DataLoader<ImageBatch<B>>>,
    pub val:     Arc<dyn DataLoader<ImageBatch<B::InnerBackend>>>,
    /// Shares its index table with the train loader; call
    /// `set_epoch` before every training epoch.
    pub sampler: TrainSampler,
    /// Batches per training epoch on this rank
    pub train_batches: usize,
    /// Batches per validation pass
    pub val_batches:   usize,
}

pub fn construct_loader<B: AutodiffBackend>(
    cfg:    &Config,
    dist:   &DistContext,
    device: &B::Device,
) -> Result<Loaders<B>> {
    let root     = Path::new(&cfg.train.dataset);
    let trainset = ImageFolder::new(root.join(&cfg.train.split))?;
    let valset   = ImageFolder::new(root.join(&cfg.test.split))?;
    let val_len  = valset.len();

    let sampler = DistributedSampler::new(trainset, dist.rank, dist.world_size, true, cfg.rng_seed)?;
    let train_len = sampler.num_samples();

    let train_transform = Transform::Train { size: cfg.train.im_size as u32 };
    let val_transform   = Transform::Eval {
        resize: cfg.test.im_size as u32,
        crop:   cfg.train.im_size as u32,
    };

    let mut train = DataLoaderBuilder::new(ImageBatcher::<B>::new(device.clone(), train_transform))
        .batch_size(cfg.train.batch_size);
    let mut val = DataLoaderBuilder::new(ImageBatcher::<B::InnerBackend>::new(device.clone(), val_transform))
        .batch_size(cfg.test.batch_size);

    // zero workers means batching on the calling thread
    if cfg.train.workers > 0 {
        train = train.num_workers(cfg.train.workers);
        val   = val.num_workers(cfg.train.workers);
    }

    let train = train.build(sampler.clone());
    let val   = val.build(valset);

    let train_batches = train_len.div_ceil(cfg.train.batch_size.max(1));
    let val_batches   = val_len.div_ceil(cfg.test.batch_size.max(1));

    tracing::info!(
        "Loaders ready: {} train items/rank ({} batches), {} val items ({} batches)",
        train_len,
        train_batches,
        val_len,
        val_batches,
    );

    Ok(Loaders { train, val, sampler, train_batches, val_batches })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::write_fixture;
    use crate::distributed::LaunchMode;
    use burn::backend::{Autodiff, NdArray};
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn context(rank: usize, world_size: usize) -> DistContext {
        DistContext {
            mode: LaunchMode::Launcher,
            rank,
            world_size,
            local_rank: rank,
            device_index: 0,
            master_addr: None,
            master_port: None,
        }
    }

    #[test]
    fn test_loaders_shard_and_batch() {
        let tmp = TempDir::new().unwrap();
        write_fixture(&tmp.path().join("train"), &["a", "b", "c"], 3);
        write_fixture(&tmp.path().join("val"), &["a", "b", "c"], 1);

        let mut cfg = Config::default();
        cfg.train.dataset    = tmp.path().display().to_string();
        cfg.train.batch_size = 2;
        cfg.train.im_size    = 8;
        cfg.train.workers    = 0;
        cfg.test.batch_size  = 2;
        cfg.test.im_size     = 10;

        let loaders = construct_loader::<TestBackend>(&cfg, &context(1, 2), &Default::default()).unwrap();
        assert_eq!(loaders.sampler.num_samples(), 5);
        assert_eq!(loaders.train_batches, 3);
        assert_eq!(loaders.val_batches, 2);

        let sizes: Vec<usize> = loaders.train.iter().map(|b| b.targets.dims()[0]).collect();
        assert_eq!(sizes, vec![2, 2, 1]);

        let first = loaders.val.iter().next().unwrap();
        assert_eq!(first.images.dims(), [2, 3, 8, 8]);
    }
}
