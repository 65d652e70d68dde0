use burn::prelude::*;

use crate::error::{Error, Result};

/// Top-k accuracy in percent for each `k` in `topk`.
///
/// output: [batch, classes] scores, target: [batch] class indices.
pub fn accuracy<B: Backend>(
    output: Tensor<B, 2>,
    target: Tensor<B, 1, Int>,
    topk:   &[usize],
) -> Result<Vec<f64>> {
    let [_, num_classes] = output.dims();
    let scores: Vec<f32>  = output.into_data().iter::<f32>().collect();
    let targets: Vec<i64> = target.into_data().iter::<i64>().collect();
    topk_accuracy(&scores, num_classes, &targets, topk)
}

/// Host-side top-k accuracy over row-major `scores`.
///
/// A sample counts for `k` when fewer than `k` classes outrank its
/// target; equal scores rank the lower class index first. `k` above
/// the class count behaves like the class count.
pub fn topk_accuracy(
    scores:      &[f32],
    num_classes: usize,
    targets:     &[i64],
    topk:        &[usize],
) -> Result<Vec<f64>> {
    let batch = targets.len();
    if topk.is_empty() || topk.contains(&0) {
        return Err(Error::InvalidArgument("topk needs at least one k >= 1".to_string()));
    }
    if batch == 0 || num_classes == 0 {
        return Err(Error::InvalidArgument("accuracy of an empty batch".to_string()));
    }
    if scores.len() != batch * num_classes {
        return Err(Error::InvalidArgument(format!(
            "{} scores do not fit {batch} targets x {num_classes} classes",
            scores.len()
        )));
    }

    let mut ranks = Vec::with_capacity(batch);
    for (row, &target) in scores.chunks(num_classes).zip(targets) {
        let t = usize::try_from(target)
            .ok()
            .filter(|&t| t < num_classes)
            .ok_or_else(|| Error::InvalidArgument(format!("target {target} out of range")))?;
        let s = row[t];
        let rank = row
            .iter()
            .enumerate()
            .filter(|&(c, &v)| v > s || (v == s && c < t))
            .count();
        ranks.push(rank);
    }

    Ok(topk
        .iter()
        .map(|&k| {
            let correct = ranks.iter().filter(|&&r| r < k).count();
            correct as f64 * 100.0 / batch as f64
        })
        .collect())
}
