// ============================================================
// Application / Use Cases
// ============================================================
// Workflow coordination only: the use cases call into config,
// distributed, data, ml and infra, and never do tensor work or
// argument parsing themselves.
//
//   train_use_case.rs   — config → distributed setup → training
//   inspect_use_case.rs — resolved environment, lr schedule
//
// Reference: Clean Architecture pattern

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::Config;

/// The training workflow
pub mod train_use_case;

/// Read-only inspection workflows
pub mod inspect_use_case;

/// Read `cfg_file` and apply the `KEY VALUE` overrides
pub fn load_config(cfg_file: &Path, opts: &[String]) -> Result<Config> {
    let mut cfg = Config::from_file(cfg_file)
        .with_context(|| format!("Cannot load config '{}'", cfg_file.display()))?;
    cfg.merge_from_list(opts)
        .context("Cannot apply command-line overrides")?;
    Ok(cfg)
}
