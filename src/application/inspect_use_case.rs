// ============================================================
// Inspect Use Cases
// ============================================================
// Read-only helpers behind the `env` and `schedule` commands:
// they resolve what a run would see without training anything.

use std::path::Path;

use anyhow::{Context, Result};

use crate::application::load_config;
use crate::distributed::env::{resolve_env, slurm_first_host, EnvResolution};
use crate::ml::scheduler::{get_lr_scheduler, LrSchedule};

/// Resolve the distributed context from the real environment
/// without exporting anything or creating a process group.
pub fn inspect_env(port: Option<u16>, num_gpus: usize) -> Result<EnvResolution> {
    resolve_env(|var| std::env::var(var).ok(), port, num_gpus, slurm_first_host)
        .context("Cannot resolve the distributed environment")
}

/// Learning rate for each epoch of the configured run
pub fn lr_schedule(cfg_file: &Path, opts: &[String]) -> Result<Vec<(usize, f64)>> {
    let cfg = load_config(cfg_file, opts)?;
    let mut scheduler = get_lr_scheduler(&cfg)?;

    let mut lrs = Vec::with_capacity(cfg.optim.max_epoch);
    for epoch in 0..cfg.optim.max_epoch {
        lrs.push((epoch, scheduler.get_lr()));
        scheduler.step();
    }
    Ok(lrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_schedule_from_file_with_overrides() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        fs::write(&path, "OPTIM:\n  LR_POLICY: steps\n  BASE_LR: 1.0\n  MAX_EPOCH: 7\n").unwrap();

        let lrs = lr_schedule(&path, &["OPTIM.LR_MULT".to_string(), "0.5".to_string()]).unwrap();
        let values: Vec<f64> = lrs.iter().map(|&(_, lr)| lr).collect();
        assert_eq!(values, vec![1.0, 1.0, 1.0, 0.5, 0.5, 0.5, 0.25]);
    }

    #[test]
    fn test_bad_policy_is_reported() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        fs::write(&path, "OPTIM:\n  LR_POLICY: exp\n").unwrap();

        let err = lr_schedule(&path, &[]).unwrap_err();
        assert!(format!("{err:#}").contains("not supported"));
    }
}
