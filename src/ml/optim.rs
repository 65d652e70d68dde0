// ============================================================
// Optimizer Construction
// ============================================================
// SGD with momentum / dampening / Nesterov and L2 weight decay,
// all taken from the OPTIM section. Burn applies the learning
// rate per step, so OPTIM.BASE_LR reaches the optimizer through
// the LR scheduler rather than through this constructor.
//
//   v = momentum * v + (1 - dampening) * (g + wd * θ)
//   θ = θ - lr * (nesterov ? g + momentum * v : v)

use burn::{
    module::AutodiffModule,
    optim::{decay::WeightDecayConfig, momentum::MomentumConfig, Optimizer, SgdConfig},
    tensor::backend::AutodiffBackend,
};

use crate::config::Config;

/// SGD settings derived from the OPTIM section
pub fn sgd_config(cfg: &Config) -> SgdConfig {
    let o = &cfg.optim;

    let momentum = (o.momentum > 0.0).then(|| {
        MomentumConfig::new()
            .with_momentum(o.momentum)
            .with_dampening(o.dampening)
            .with_nesterov(o.nesterov)
    });
    let weight_decay = (o.weight_decay > 0.0).then(|| WeightDecayConfig::new(o.weight_decay as f32));

    SgdConfig::new()
        .with_momentum(momentum)
        .with_weight_decay(weight_decay)
}

pub fn construct_optimizer<B, M>(cfg: &Config) -> impl Optimizer<M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    tracing::debug!(
        "SGD: momentum={} dampening={} nesterov={} weight_decay={}",
        cfg.optim.momentum,
        cfg.optim.dampening,
        cfg.optim.nesterov,
        cfg.optim.weight_decay,
    );
    sgd_config(cfg).init::<B, M>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{Autodiff, NdArray},
        nn::{Linear, LinearConfig},
        optim::GradientsParams,
        tensor::{ElementConversion, Tensor},
    };

    type TestBackend = Autodiff<NdArray<f32>>;

    fn weight(model: &Linear<TestBackend>) -> f32 {
        model.weight.val().into_scalar().elem::<f32>()
    }

    #[test]
    fn test_step_moves_against_gradient() {
        let device = Default::default();
        let cfg = Config::default();

        let model: Linear<TestBackend> = LinearConfig::new(1, 1).init(&device);
        let mut optim = construct_optimizer::<TestBackend, Linear<TestBackend>>(&cfg);

        // d(sum(w * 1 + b))/dw over 4 rows = 4
        let loss = model.forward(Tensor::<TestBackend, 2>::ones([4, 1], &device)).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &model);

        let before = weight(&model);
        let model = optim.step(0.1, model, grads);
        assert!(weight(&model) < before);
    }

    #[test]
    fn test_zero_momentum_and_decay_disable_terms() {
        let mut cfg = Config::default();
        cfg.optim.momentum = 0.0;
        cfg.optim.weight_decay = 0.0;

        let device = Default::default();
        let model: Linear<TestBackend> = LinearConfig::new(1, 1).init(&device);
        let mut optim = construct_optimizer::<TestBackend, Linear<TestBackend>>(&cfg);

        let loss = model.forward(Tensor::<TestBackend, 2>::ones([2, 1], &device)).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &model);

        // plain SGD: w' = w - lr * 2
        let before = weight(&model);
        let model = optim.step(0.5, model, grads);
        assert!((weight(&model) - (before - 1.0)).abs() < 1e-5);
    }
}
