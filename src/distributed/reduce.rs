use burn::{prelude::*, tensor::TensorData};

use crate::distributed::group::ProcessGroup;
use crate::error::Result;

/// All-reduce `tensors` across the group and scale by `1 / world_size`,
/// giving every rank the mean.
///
/// All reductions are queued before any is waited on so communication
/// for different tensors overlaps. Only the sum operator is supported.
/// A one-rank group returns its inputs untouched.
pub fn scaled_all_reduce<B: Backend, const D: usize>(
    group:   &dyn ProcessGroup,
    tensors: Vec<Tensor<B, D>>,
) -> Result<Vec<Tensor<B, D>>> {
    let world_size = group.world_size();
    if world_size == 1 {
        return Ok(tensors);
    }

    let mut pending = Vec::with_capacity(tensors.len());
    for tensor in &tensors {
        let buffer: Vec<f32> = tensor.to_data().iter::<f32>().collect();
        pending.push((group.all_reduce_sum(buffer)?, tensor.dims(), tensor.device()));
    }

    let mut reduced = Vec::with_capacity(pending.len());
    for (work, dims, device) in pending {
        let summed = work.wait()?;
        reduced.push(Tensor::<B, D>::from_data(TensorData::new(summed, dims.to_vec()), &device));
    }

    let scale = 1.0 / world_size as f32;
    Ok(reduced.into_iter().map(|t| t.mul_scalar(scale)).collect())
}
