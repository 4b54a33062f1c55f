//! TOML config loading for the merit CLI.
//!
//! Deserializes `configs/merit.toml`, which has a required `[model]` section
//! and an optional `[training]` section, then merges with CLI overrides.

use std::path::{Path, PathBuf};

use merit::training::augment::AugmentationConfig;
use merit::training::trainer::MeritTrainingConfig;
use merit::MeritConfig;
use serde::Deserialize;

/// Top-level structure matching `configs/merit.toml`.
#[derive(Debug, Deserialize)]
pub struct MeritToml {
    /// Objective and network sizes.
    pub model: ModelSection,
    /// Training loop overrides; anything missing keeps the library default.
    #[serde(default)]
    pub training: TrainingOverrides,
}

/// `[model]` section. Sizes are required, coefficients fall back to defaults.
#[derive(Debug, Deserialize)]
pub struct ModelSection {
    pub projection_size: usize,
    pub projection_hidden_size: usize,
    pub prediction_size: usize,
    pub prediction_hidden_size: usize,
    pub moving_average_decay: Option<f64>,
    pub beta: Option<f64>,
    /// Output width of the GCN backbone (and projector input width).
    pub d_representation: Option<usize>,
}

/// Optional overrides for `MeritTrainingConfig` fields.
#[derive(Debug, Default, Deserialize)]
pub struct TrainingOverrides {
    pub lr: Option<f64>,
    pub weight_decay: Option<f64>,
    pub max_grad_norm: Option<f64>,
    pub total_steps: Option<usize>,
    pub warmup_steps: Option<usize>,
    pub patience: Option<usize>,
    pub log_interval: Option<usize>,
    pub checkpoint_interval: Option<usize>,
    pub checkpoint_dir: Option<String>,
    pub seed: Option<u64>,
    pub sparse: Option<bool>,
    pub sample_size: Option<usize>,
    pub edge_modification_rate: Option<f64>,
    pub feature_mask_rate: Option<f64>,
}

/// Flags given on the `train` command line.
#[derive(Debug, Default)]
pub struct TrainCliOverrides {
    pub output_dir: Option<PathBuf>,
    pub steps: Option<usize>,
    pub lr: Option<f64>,
    pub seed: Option<u64>,
}

/// Load and deserialize a `MeritToml` from a TOML file.
pub fn load_merit_toml(path: &Path) -> anyhow::Result<MeritToml> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {e}", path.display()))?;
    let config: MeritToml = toml::from_str(&contents)?;
    tracing::info!(path = %path.display(), "Loaded merit config");
    Ok(config)
}

/// Build a `MeritConfig` from the `[model]` section.
pub fn build_merit_config(model: &ModelSection) -> MeritConfig {
    let mut config = MeritConfig::new(
        model.projection_size,
        model.projection_hidden_size,
        model.prediction_size,
        model.prediction_hidden_size,
    );
    if let Some(decay) = model.moving_average_decay {
        config.moving_average_decay = decay;
    }
    if let Some(beta) = model.beta {
        config.beta = beta;
    }
    if let Some(d) = model.d_representation {
        config.d_representation = d;
    }
    config
}

/// Build a `MeritTrainingConfig` from library defaults, TOML overrides, and CLI flags.
///
/// Priority chain: `MeritTrainingConfig::new()` defaults < TOML values < CLI flags.
pub fn build_training_config(
    overrides: &TrainingOverrides,
    cli: &TrainCliOverrides,
) -> MeritTrainingConfig {
    let mut config = MeritTrainingConfig::new();
    let mut augmentation = AugmentationConfig::new();

    // Apply TOML overrides
    if let Some(v) = overrides.lr {
        config.lr = v;
    }
    if let Some(v) = overrides.weight_decay {
        config.weight_decay = v;
    }
    if let Some(v) = overrides.max_grad_norm {
        config.max_grad_norm = v;
    }
    if let Some(v) = overrides.total_steps {
        config.total_steps = v;
    }
    if let Some(v) = overrides.warmup_steps {
        config.warmup_steps = v;
    }
    if let Some(v) = overrides.patience {
        config.patience = v;
    }
    if let Some(v) = overrides.log_interval {
        config.log_interval = v;
    }
    if let Some(v) = overrides.checkpoint_interval {
        config.checkpoint_interval = v;
    }
    if let Some(v) = &overrides.checkpoint_dir {
        config.checkpoint_dir = v.clone();
    }
    if let Some(v) = overrides.seed {
        config.seed = v;
    }
    if let Some(v) = overrides.sparse {
        config.sparse = v;
    }
    if let Some(v) = overrides.sample_size {
        augmentation.sample_size = v;
    }
    if let Some(v) = overrides.edge_modification_rate {
        augmentation.edge_modification_rate = v;
    }
    if let Some(v) = overrides.feature_mask_rate {
        augmentation.feature_mask_rate = v;
    }
    config.augmentation = augmentation;

    // CLI overrides take highest priority
    if let Some(dir) = &cli.output_dir {
        config.checkpoint_dir = dir.to_string_lossy().into_owned();
    }
    if let Some(steps) = cli.steps {
        config.total_steps = steps;
    }
    if let Some(lr) = cli.lr {
        config.lr = lr;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }

    config
}
