// ============================================================
// Metrics Logger
// ============================================================
// Appends one CSV row per epoch to OUT_DIR/metrics.csv so runs
// can be plotted afterwards:
//
//   epoch,lr,train_loss,train_acc1,val_loss,val_acc1,val_acc5
//   1,0.100000,6.512300,0.412000,6.301100,0.960000,3.820000
//   2,0.099975,5.980400,1.874000,5.811700,2.450000,8.910000
//
// Accuracies are percentages. The header is written only when
// the file is new, so a resumed run keeps appending.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::error::Result;

const HEADER: &str = "epoch,lr,train_loss,train_acc1,val_loss,val_acc1,val_acc5";

/// One row of the metrics CSV
#[derive(Debug, Clone, PartialEq)]
pub struct EpochMetrics {
    /// 1-based epoch number
    pub epoch:      usize,
    /// Learning rate used during the epoch
    pub lr:         f64,
    pub train_loss: f64,
    pub train_acc1: f64,
    pub val_loss:   f64,
    pub val_acc1:   f64,
    pub val_acc5:   f64,
}

impl EpochMetrics {
    /// True if top-1 validation accuracy beats `best_acc1`
    pub fn is_improvement(&self, best_acc1: f64) -> bool {
        self.val_acc1 > best_acc1
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let csv_path = dir.join("metrics.csv");

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;
        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            m.epoch, m.lr, m.train_loss, m.train_acc1, m.val_loss, m.val_acc1, m.val_acc5,
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_acc1={:.3}",
            m.epoch,
            m.train_loss,
            m.val_acc1,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}
