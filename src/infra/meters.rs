// ============================================================
// Meters
// ============================================================
// AverageMeter keeps the latest value of a metric plus a
// weighted running average; ProgressMeter lays several meters
// out on one line:
//
//   Epoch: [3][ 40/391] | Time  0.212 ( 0.230) | Loss 1.9034 (2.0118) | ...
//
// Meters are reset at epoch boundaries by constructing fresh
// ones (get_meters) or calling reset().

use std::fmt;

/// Field width and decimals used when a meter is displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterFormat {
    pub width:     usize,
    pub precision: usize,
}

impl MeterFormat {
    pub const fn new(width: usize, precision: usize) -> Self {
        Self { width, precision }
    }
}

impl Default for MeterFormat {
    fn default() -> Self {
        Self::new(0, 6)
    }
}

/// Computes and stores the average and current value
#[derive(Debug, Clone, PartialEq)]
pub struct AverageMeter {
    pub name:  String,
    pub fmt:   MeterFormat,
    pub val:   f64,
    pub sum:   f64,
    pub count: f64,
    pub avg:   f64,
}

impl AverageMeter {
    pub fn new(name: impl Into<String>, fmt: MeterFormat) -> Self {
        Self { name: name.into(), fmt, val: 0.0, sum: 0.0, count: 0.0, avg: 0.0 }
    }

    pub fn reset(&mut self) {
        self.val   = 0.0;
        self.sum   = 0.0;
        self.count = 0.0;
        self.avg   = 0.0;
    }

    /// Record `val` observed over `n` samples
    pub fn update(&mut self, val: f64, n: usize) {
        self.val    = val;
        self.sum   += val * n as f64;
        self.count += n as f64;
        if self.count > 0.0 {
            self.avg = self.sum / self.count;
        }
    }
}

impl fmt::Display for AverageMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let MeterFormat { width, precision } = self.fmt;
        write!(
            f,
            "{} {:width$.precision$} ({:width$.precision$})",
            self.name, self.val, self.avg,
        )
    }
}

pub struct ProgressMeter {
    num_batches: usize,
    digits:      usize,
    prefix:      String,
}

impl ProgressMeter {
    pub fn new(num_batches: usize, prefix: impl Into<String>) -> Self {
        Self {
            num_batches,
            digits: num_batches.to_string().len(),
            prefix: prefix.into(),
        }
    }

    /// `{prefix}[{batch}/{total}] | meter | meter ...`
    pub fn format(&self, batch: usize, meters: &[&AverageMeter]) -> String {
        let mut entries = vec![format!(
            "{}[{:>w$}/{}]",
            self.prefix,
            batch,
            self.num_batches,
            w = self.digits
        )];
        entries.extend(meters.iter().map(|m| m.to_string()));
        entries.join(" | ")
    }

    /// Print the progress line on rank 0
    pub fn display(&self, batch: usize, meters: &[&AverageMeter], rank: usize) {
        show_log(&self.format(batch, meters), rank);
    }
}

/// The five meters tracked per epoch
#[derive(Debug, Clone)]
pub struct EpochMeters {
    pub is_train:   bool,
    pub batch_time: AverageMeter,
    pub data_time:  AverageMeter,
    pub losses:     AverageMeter,
    pub top1:       AverageMeter,
    pub top5:       AverageMeter,
}

impl EpochMeters {
    /// Meters shown on a progress line; eval lines skip the data timer
    pub fn shown(&self) -> Vec<&AverageMeter> {
        let mut shown = vec![&self.batch_time];
        if self.is_train {
            shown.push(&self.data_time);
        }
        shown.extend([&self.losses, &self.top1, &self.top5]);
        shown
    }
}

pub fn get_meters(is_train: bool) -> EpochMeters {
    EpochMeters {
        is_train,
        batch_time: AverageMeter::new("Time", MeterFormat::new(6, 3)),
        data_time:  AverageMeter::new("Data", MeterFormat::new(5, 3)),
        losses:     AverageMeter::new("Loss", MeterFormat::new(6, 4)),
        top1:       AverageMeter::new("Acc@1", MeterFormat::new(6, 3)),
        top5:       AverageMeter::new("Acc@5", MeterFormat::new(6, 3)),
    }
}

/// Print only on the main process
pub fn show_log(msg: &str, rank: usize) {
    if rank == 0 {
        println!("{msg}");
    }
}
