// ============================================================
// Global Configuration
// ============================================================
// One Config value describes a whole training run. It is read
// from a YAML file with UPPERCASE sections, optionally patched
// with dotted `KEY VALUE` pairs from the command line, and then
// installed once as the process-wide configuration.
//
//   MODEL:
//     ARCH: convnet
//     NUM_CLASSES: 10
//   TRAIN:
//     DATASET: ./data/cifar10
//     BATCH_SIZE: 64
//   OPTIM:
//     LR_POLICY: steps
//     MAX_EPOCH: 70
//   OUT_DIR: ./checkpoint
//
// Every field has a default, so a config file only needs the
// keys it changes.
//
// Reference: serde_yaml documentation

use std::{path::Path, sync::OnceLock};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
pub struct Config {
    pub model:    ModelConfig,
    pub train:    TrainConfig,
    pub test:     TestConfig,
    pub optim:    OptimConfig,
    pub device:   DeviceConfig,
    /// Directory checkpoints and the metrics CSV are written to
    pub out_dir:  String,
    /// Base seed for the distributed sampler's per-epoch shuffle
    pub rng_seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model:    ModelConfig::default(),
            train:    TrainConfig::default(),
            test:     TestConfig::default(),
            optim:    OptimConfig::default(),
            device:   DeviceConfig::default(),
            out_dir:  "./checkpoint".to_string(),
            rng_seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
pub struct ModelConfig {
    pub arch:        String,
    pub num_classes: usize,
    /// Channel width of the first convolution block
    pub width:       usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self { arch: "convnet".to_string(), num_classes: 1000, width: 64 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
pub struct TrainConfig {
    /// Dataset root; the train and val splits are sub-directories
    pub dataset:    String,
    pub split:      String,
    pub batch_size: usize,
    /// Side of the random-resized crop, also the eval center crop
    pub im_size:    usize,
    pub workers:    usize,
    /// Print a progress line every N batches
    pub print_freq: usize,
    /// Resume from OUT_DIR when a checkpoint is present
    pub resume:     bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dataset:    "./data/imagenet".to_string(),
            split:      "train".to_string(),
            batch_size: 32,
            im_size:    224,
            workers:    4,
            print_freq: 10,
            resume:     false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
pub struct TestConfig {
    pub split:      String,
    pub batch_size: usize,
    /// Shorter side after resize, before the center crop
    pub im_size:    usize,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self { split: "val".to_string(), batch_size: 200, im_size: 256 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
pub struct OptimConfig {
    pub base_lr:      f64,
    pub momentum:     f64,
    pub weight_decay: f64,
    pub dampening:    f64,
    pub nesterov:     bool,
    /// `cos` or `steps`
    pub lr_policy:    String,
    pub max_epoch:    usize,
    /// Multiplicative factor applied at each `steps` milestone
    pub lr_mult:      f64,
}

impl Default for OptimConfig {
    fn default() -> Self {
        Self {
            base_lr:      0.1,
            momentum:     0.9,
            weight_decay: 1e-4,
            dampening:    0.0,
            nesterov:     true,
            lr_policy:    "cos".to_string(),
            max_epoch:    100,
            lr_mult:      0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
pub struct DeviceConfig {
    /// Accelerators per node; ranks are bound round-robin
    pub num_gpus: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self { num_gpus: 1 }
    }
}

impl Config {
    /// Parse a YAML document. Missing keys keep their defaults,
    /// unknown keys are rejected.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("Failed to parse YAML config: {e}")))
    }

    /// Read and parse a YAML config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        let cfg = Self::from_yaml_str(&yaml)?;
        tracing::debug!("Loaded config from '{}'", path.display());
        Ok(cfg)
    }

    /// Apply `KEY VALUE` overrides, e.g. `["OPTIM.BASE_LR", "0.2"]`.
    ///
    /// Keys are dotted paths into the YAML layout and must already
    /// exist. Values are parsed as YAML scalars, so the override must
    /// still deserialize into the field's type.
    pub fn merge_from_list<S: AsRef<str>>(&mut self, opts: &[S]) -> Result<()> {
        if opts.len() % 2 != 0 {
            return Err(Error::Config(format!(
                "Override list needs KEY VALUE pairs, got {} items",
                opts.len()
            )));
        }

        let mut root = serde_yaml::to_value(&*self)
            .map_err(|e| Error::Config(format!("Cannot serialise config: {e}")))?;

        for pair in opts.chunks(2) {
            let (key, raw) = (pair[0].as_ref(), pair[1].as_ref());
            let value: Value =
                serde_yaml::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
            set_dotted(&mut root, key, value)?;
            tracing::debug!("Config override {} = {}", key, raw);
        }

        *self = serde_yaml::from_value(root)
            .map_err(|e| Error::Config(format!("Invalid override: {e}")))?;
        Ok(())
    }

    /// Render the config back to YAML, used for logging the run setup
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }
}

fn set_dotted(root: &mut Value, key: &str, value: Value) -> Result<()> {
    let mut node = root;
    let mut parts = key.split('.').peekable();

    while let Some(part) = parts.next() {
        let map: &mut Mapping = node
            .as_mapping_mut()
            .ok_or_else(|| Error::Config(format!("'{key}' does not name a config section")))?;
        let slot = map
            .get_mut(part)
            .ok_or_else(|| Error::Config(format!("Non-existent config key: {key}")))?;

        if parts.peek().is_none() {
            *slot = value;
            return Ok(());
        }
        node = slot;
    }

    Err(Error::Config("Empty config key".to_string()))
}

// ─── Process-wide instance ────────────────────────────────────────────────────

static GLOBAL: OnceLock<Config> = OnceLock::new();

/// Install the process-wide configuration. Can only happen once.
pub fn install(cfg: Config) -> Result<&'static Config> {
    GLOBAL
        .set(cfg)
        .map_err(|_| Error::Config("Global config is already installed".to_string()))?;
    global()
}

/// The installed process-wide configuration
pub fn global() -> Result<&'static Config> {
    GLOBAL
        .get()
        .ok_or_else(|| Error::Config("Global config has not been installed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let cfg = Config::from_yaml_str(
            "MODEL:\n  NUM_CLASSES: 10\nOPTIM:\n  LR_POLICY: steps\n  MAX_EPOCH: 70\n",
        )
        .unwrap();

        assert_eq!(cfg.model.num_classes, 10);
        assert_eq!(cfg.model.arch, "convnet");
        assert_eq!(cfg.optim.lr_policy, "steps");
        assert_eq!(cfg.optim.max_epoch, 70);
        assert_eq!(cfg.train, TrainConfig::default());
        assert_eq!(cfg.out_dir, "./checkpoint");
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::from_yaml_str("TRAIN:\n  BATCH: 4\n").is_err());
    }

    #[test]
    fn test_merge_from_list() {
        let mut cfg = Config::default();
        cfg.merge_from_list(&["OPTIM.BASE_LR", "0.2", "TRAIN.SPLIT", "train_sub", "OUT_DIR", "/tmp/x"])
            .unwrap();

        assert_eq!(cfg.optim.base_lr, 0.2);
        assert_eq!(cfg.train.split, "train_sub");
        assert_eq!(cfg.out_dir, "/tmp/x");
    }

    #[test]
    fn test_merge_rejects_bad_overrides() {
        let mut cfg = Config::default();
        assert!(cfg.merge_from_list(&["OPTIM.NOPE", "1"]).is_err());
        assert!(cfg.merge_from_list(&["TRAIN.BATCH_SIZE", "many"]).is_err());
        assert!(cfg.merge_from_list(&["TRAIN.BATCH_SIZE"]).is_err());
        // failed merges leave the config untouched
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let cfg = Config::default();
        let back = Config::from_yaml_str(&cfg.to_yaml().unwrap()).unwrap();
        assert_eq!(cfg, back);
    }
}
