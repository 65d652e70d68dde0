//! Epoch-level learning rate schedules
//!
//! - `cos`   — cosine annealing from `OPTIM.BASE_LR` to `1e-5` over
//!   `OPTIM.MAX_EPOCH` epochs
//! - `steps` — multiply by `OPTIM.LR_MULT` at 3/7 and 6/7 of
//!   `OPTIM.MAX_EPOCH`

use std::f64::consts::PI;

use crate::config::Config;
use crate::error::{Error, Result};

/// Floor of the cosine schedule
pub const COS_ETA_MIN: f64 = 1e-5;

pub trait LrSchedule {
    /// Learning rate for the current epoch
    fn get_lr(&self) -> f64;

    /// Advance one epoch
    fn step(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
pub struct CosineAnnealingLr {
    base_lr:    f64,
    eta_min:    f64,
    t_max:      usize,
    last_epoch: usize,
}

impl CosineAnnealingLr {
    pub fn new(base_lr: f64, t_max: usize, eta_min: f64) -> Self {
        Self { base_lr, eta_min, t_max, last_epoch: 0 }
    }

    /// lr = eta_min + (base - eta_min) * (1 + cos(pi * t / T)) / 2
    pub fn lr_at(&self, epoch: usize) -> f64 {
        let progress = epoch as f64 / self.t_max.max(1) as f64;
        self.eta_min + (self.base_lr - self.eta_min) * (1.0 + (PI * progress).cos()) / 2.0
    }
}

impl LrSchedule for CosineAnnealingLr {
    fn get_lr(&self) -> f64 {
        self.lr_at(self.last_epoch)
    }

    fn step(&mut self) {
        self.last_epoch += 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultiStepLr {
    base_lr:    f64,
    milestones: Vec<usize>,
    gamma:      f64,
    last_epoch: usize,
}

impl MultiStepLr {
    pub fn new(base_lr: f64, mut milestones: Vec<usize>, gamma: f64) -> Self {
        milestones.sort_unstable();
        Self { base_lr, milestones, gamma, last_epoch: 0 }
    }

    pub fn milestones(&self) -> &[usize] {
        &self.milestones
    }

    /// lr = base * gamma ^ (milestones passed)
    pub fn lr_at(&self, epoch: usize) -> f64 {
        let passed = self.milestones.iter().filter(|&&m| m <= epoch).count();
        self.base_lr * self.gamma.powi(passed as i32)
    }
}

impl LrSchedule for MultiStepLr {
    fn get_lr(&self) -> f64 {
        self.lr_at(self.last_epoch)
    }

    fn step(&mut self) {
        self.last_epoch += 1;
    }
}

/// Schedule selected by `OPTIM.LR_POLICY`
#[derive(Debug, Clone, PartialEq)]
pub enum LrScheduler {
    Cosine(CosineAnnealingLr),
    MultiStep(MultiStepLr),
}

impl LrScheduler {
    pub fn last_epoch(&self) -> usize {
        match self {
            Self::Cosine(s)    => s.last_epoch,
            Self::MultiStep(s) => s.last_epoch,
        }
    }

    /// Position the schedule at `epoch`, e.g. when resuming
    pub fn with_last_epoch(mut self, epoch: usize) -> Self {
        match &mut self {
            Self::Cosine(s)    => s.last_epoch = epoch,
            Self::MultiStep(s) => s.last_epoch = epoch,
        }
        self
    }

    /// Learning rate the schedule gives at `epoch`
    pub fn lr_at(&self, epoch: usize) -> f64 {
        match self {
            Self::Cosine(s)    => s.lr_at(epoch),
            Self::MultiStep(s) => s.lr_at(epoch),
        }
    }
}

impl LrSchedule for LrScheduler {
    fn get_lr(&self) -> f64 {
        match self {
            Self::Cosine(s)    => s.get_lr(),
            Self::MultiStep(s) => s.get_lr(),
        }
    }

    fn step(&mut self) {
        match self {
            Self::Cosine(s)    => s.step(),
            Self::MultiStep(s) => s.step(),
        }
    }
}

pub fn get_lr_scheduler(cfg: &Config) -> Result<LrScheduler> {
    let o = &cfg.optim;
    match o.lr_policy.as_str() {
        "cos" => Ok(LrScheduler::Cosine(CosineAnnealingLr::new(
            o.base_lr,
            o.max_epoch,
            COS_ETA_MIN,
        ))),
        "steps" => Ok(LrScheduler::MultiStep(MultiStepLr::new(
            o.base_lr,
            vec![o.max_epoch * 3 / 7, o.max_epoch * 6 / 7],
            o.lr_mult,
        ))),
        other => Err(Error::UnsupportedLrPolicy(other.to_string())),
    }
}
