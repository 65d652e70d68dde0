// ============================================================
// Distributed Sampler
// ============================================================
// Restricts a dataset to this rank's share.
//
//   1. Permute 0..N (seeded by seed + epoch when shuffling) so
//      every rank computes the same order.
//   2. Pad by wrapping around to total = ceil(N / world) * world,
//      so every rank gets the same number of items.
//   3. Rank r takes positions r, r + world, r + 2*world, ...
//
// The sampler is a Dataset wrapper: the DataLoader iterates it
// in order and never sees the other ranks' items. Clones share
// the index table, so the trainer keeps one clone to call
// set_epoch() while the loader owns another.

use std::{marker::PhantomData, sync::Arc};

use burn::data::dataset::Dataset;
use parking_lot::RwLock;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::error::{Error, Result};

pub struct DistributedSampler<D, I> {
    dataset:    Arc<D>,
    rank:       usize,
    world_size: usize,
    shuffle:    bool,
    seed:       u64,
    indices:    Arc<RwLock<Vec<usize>>>,
    _item:      PhantomData<fn() -> I>,
}

impl<D, I> Clone for DistributedSampler<D, I> {
    fn clone(&self) -> Self {
        Self {
            dataset:    Arc::clone(&self.dataset),
            rank:       self.rank,
            world_size: self.world_size,
            shuffle:    self.shuffle,
            seed:       self.seed,
            indices:    Arc::clone(&self.indices),
            _item:      PhantomData,
        }
    }
}

impl<D: Dataset<I>, I> DistributedSampler<D, I> {
    pub fn new(dataset: D, rank: usize, world_size: usize, shuffle: bool, seed: u64) -> Result<Self> {
        if world_size == 0 || rank >= world_size {
            return Err(Error::InvalidArgument(format!(
                "rank {rank} is outside a world of size {world_size}"
            )));
        }

        let sampler = Self {
            dataset: Arc::new(dataset),
            rank,
            world_size,
            shuffle,
            seed,
            indices: Arc::new(RwLock::new(Vec::new())),
            _item: PhantomData,
        };
        sampler.set_epoch(0);
        Ok(sampler)
    }

    /// Items this rank yields per epoch: ceil(N / world_size)
    pub fn num_samples(&self) -> usize {
        self.dataset.len().div_ceil(self.world_size)
    }

    /// Recompute this rank's indices for `epoch`
    pub fn set_epoch(&self, epoch: usize) {
        let indices = shard_indices(
            self.dataset.len(),
            self.rank,
            self.world_size,
            self.shuffle.then(|| self.seed.wrapping_add(epoch as u64)),
        );
        *self.indices.write() = indices;
        tracing::debug!("Sampler rank {} reshuffled for epoch {}", self.rank, epoch);
    }

    /// Dataset indices this rank currently yields
    pub fn indices(&self) -> Vec<usize> {
        self.indices.read().clone()
    }
}

/// Indices of `len` items that belong to `rank`.
/// `seed` of `None` keeps the natural order.
pub fn shard_indices(len: usize, rank: usize, world_size: usize, seed: Option<u64>) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..len).collect();
    if let Some(seed) = seed {
        order.shuffle(&mut StdRng::seed_from_u64(seed));
    }

    let total = len.div_ceil(world_size) * world_size;
    (0..total)
        .skip(rank)
        .step_by(world_size)
        .map(|pos| order[pos % len])
        .collect()
}

impl<D, I> Dataset<I> for DistributedSampler<D, I>
where
    D: Dataset<I>,
    I: Send + Sync,
{
    fn get(&self, index: usize) -> Option<I> {
        let inner = *self.indices.read().get(index)?;
        self.dataset.get(inner)
    }

    fn len(&self) -> usize {
        self.num_samples()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::data::dataset::InMemDataset;
    use std::collections::HashSet;

    #[test]
    fn test_shards_cover_dataset_with_padding() {
        let world = 3;
        let shards: Vec<Vec<usize>> = (0..world).map(|r| shard_indices(10, r, world, Some(7))).collect();

        for shard in &shards {
            assert_eq!(shard.len(), 4);
        }
        let seen: HashSet<usize> = shards.iter().flatten().copied().collect();
        assert_eq!(seen.len(), 10);
    }

    #[test]
    fn test_unshuffled_order_is_strided() {
        assert_eq!(shard_indices(5, 0, 2, None), vec![0, 2, 4]);
        assert_eq!(shard_indices(5, 1, 2, None), vec![1, 3, 0]);
        assert!(shard_indices(0, 0, 2, None).is_empty());
    }

    #[test]
    fn test_set_epoch_reshuffles_shared_state() {
        let data = InMemDataset::new((0..64).collect::<Vec<usize>>());
        let sampler = DistributedSampler::new(data, 1, 2, true, 0).unwrap();
        let loader_side = sampler.clone();

        let epoch0 = loader_side.indices();
        sampler.set_epoch(1);
        let epoch1 = loader_side.indices();

        assert_eq!(loader_side.len(), 32);
        assert_ne!(epoch0, epoch1);

        sampler.set_epoch(0);
        assert_eq!(loader_side.indices(), epoch0);
        assert_eq!(loader_side.get(0), Some(epoch0[0]));
    }

    #[test]
    fn test_rank_out_of_range() {
        let data = InMemDataset::new(vec![1usize, 2, 3]);
        assert!(DistributedSampler::new(data, 2, 2, false, 0).is_err());
    }
}
