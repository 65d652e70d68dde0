use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

use crate::config::Config as RunConfig;

/// Architectures `build_model` knows how to construct
pub const ARCHS: &[&str] = &["convnet"];

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct ConvNetConfig {
    pub num_classes: usize,
    /// Channels of the first block; each later block doubles it
    #[config(default = 64)]
    pub width: usize,
}

impl ConvNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvNet<B> {
        let widths = [3, self.width, self.width * 2, self.width * 4];
        let blocks = widths
            .windows(2)
            .map(|w| ConvBlock {
                conv: Conv2dConfig::new([w[0], w[1]], [3, 3])
                    .with_stride([2, 2])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device),
                norm: BatchNormConfig::new(w[1]).init(device),
            })
            .collect();

        ConvNet {
            blocks,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            head: LinearConfig::new(self.width * 4, self.num_classes).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub norm: BatchNorm<B, 2>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        relu(self.norm.forward(self.conv.forward(x)))
    }
}

/// Three stride-2 conv blocks, global average pool, linear head
#[derive(Module, Debug)]
pub struct ConvNet<B: Backend> {
    pub blocks: Vec<ConvBlock<B>>,
    pub pool:   AdaptiveAvgPool2d,
    pub head:   Linear<B>,
}

impl<B: Backend> ConvNet<B> {
    /// images: [batch, 3, H, W] → logits: [batch, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = images;
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.pool.forward(x); // [batch, channels, 1, 1]
        self.head.forward(x.flatten::<2>(1, 3))
    }

    /// Cross-entropy loss together with the logits it was computed from
    pub fn forward_loss(
        &self,
        images:  Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits.clone(), targets);
        (loss, logits)
    }
}

/// Build the network named by `MODEL.ARCH`
pub fn build_model<B: Backend>(
    cfg: &RunConfig,
    device: &B::Device,
) -> crate::error::Result<ConvNet<B>> {
    match cfg.model.arch.as_str() {
        "convnet" => Ok(ConvNetConfig::new(cfg.model.num_classes)
            .with_width(cfg.model.width)
            .init(device)),
        other => Err(crate::error::Error::Config(format!(
            "Unknown MODEL.ARCH '{other}' (available: {})",
            ARCHS.join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model: ConvNet<TestBackend> = ConvNetConfig::new(5).with_width(4).init(&device);

        let logits = model.forward(Tensor::zeros([2, 3, 16, 16], &device));
        assert_eq!(logits.dims(), [2, 5]);
    }

    #[test]
    fn test_unknown_arch() {
        let mut cfg = RunConfig::default();
        cfg.model.arch = "resnet9000".to_string();
        let err = build_model::<TestBackend>(&cfg, &Default::default()).unwrap_err();
        assert!(matches!(err, crate::error::Error::Config(_)));
    }
}
