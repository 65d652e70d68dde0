// ============================================================
// Image Batcher
// ============================================================
// Implements Burn's Batcher trait: applies the split's
// transform to every decoded image and stacks the results.
//
//   Input:  Vec of N ImageItems (any size, RGB u8)
//   Output: ImageBatch { images: [N, 3, S, S], targets: [N] }
//
// S is the transform's output size, so all images in a batch
// line up regardless of their source resolution.
//
// Reference: Burn Book §4 (Batcher)

use burn::{data::dataloader::batcher::Batcher, prelude::*, tensor::TensorData};

use crate::data::{dataset::ImageItem, transform::{to_normalized_chw, Transform}};

#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// Normalized pixels — shape: [batch_size, 3, size, size]
    pub images:  Tensor<B, 4>,
    /// Class indices — shape: [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    pub device:    B::Device,
    pub transform: Transform,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device, transform: Transform) -> Self {
        Self { device, transform }
    }
}

impl<B: Backend> Batcher<ImageItem, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>) -> ImageBatch<B> {
        let batch_size = items.len();
        let size       = self.transform.output_size() as usize;
        let mut rng    = rand::thread_rng();

        let mut pixels = Vec::with_capacity(batch_size * 3 * size * size);
        for item in &items {
            let image = self.transform.apply(&item.image, &mut rng);
            to_normalized_chw(&image, &mut pixels);
        }

        let targets: Vec<i32> = items.iter().map(|item| item.label as i32).collect();

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, 3, size, size]),
            &self.device,
        );
        let targets = Tensor::<B, 1, Int>::from_ints(targets.as_slice(), &self.device);

        ImageBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use image::{Rgb, RgbImage};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_batch_shapes_and_labels() {
        let batcher = ImageBatcher::<TestBackend>::new(
            Default::default(),
            Transform::Eval { resize: 10, crop: 8 },
        );
        let items = vec![
            ImageItem { image: RgbImage::from_pixel(20, 12, Rgb([1, 2, 3])), label: 4 },
            ImageItem { image: RgbImage::from_pixel(9, 30, Rgb([9, 8, 7])), label: 1 },
        ];

        let batch = batcher.batch(items);
        assert_eq!(batch.images.dims(), [2, 3, 8, 8]);

        let labels: Vec<i64> = batch.targets.to_data().iter::<i64>().collect();
        assert_eq!(labels, vec![4, 1]);
    }
}
