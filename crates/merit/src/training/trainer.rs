//! MERIT training loop.
//!
//! Each step draws two augmented views over a shared node sample, evaluates
//! the objective, steps AdamW (warmup + cosine LR, gradient-norm clipping) on
//! the online network only, then moves the target encoder one EMA step.
//! Training stops early once the loss has not improved for `patience` steps.

use std::path::Path;
use std::time::Instant;

use burn::grad_clipping::GradientClippingConfig;
use burn::module::{AutodiffModule, ModuleDisplay};
use burn::optim::{AdamWConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::model::bridge::{tensor_to_f64, view_to_tensors};
use crate::model::gnn::GraphNeuralNetwork;
use crate::model::merit::{Merit, MeritConfig, OnlineNetwork, TargetEncoder};
use crate::training::augment::{augmented_pair, AugmentationConfig};
use crate::training::data::GraphData;
use crate::training::metrics::{embedding_std, MeritMetrics, MetricsHistory};

/// Metadata saved alongside each checkpoint for resuming training.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub struct CheckpointMeta {
    pub step: usize,
    pub trained_steps: u64,
    pub skipped_steps: u64,
    pub best_loss: Option<f64>,
}

/// Configuration for MERIT training.
#[derive(Config, Debug)]
pub struct MeritTrainingConfig {
    /// Base learning rate for AdamW.
    #[config(default = 3e-4)]
    pub lr: f64,
    /// Weight decay for AdamW.
    #[config(default = 0.0)]
    pub weight_decay: f64,
    /// Maximum gradient norm for clipping.
    #[config(default = 1.0)]
    pub max_grad_norm: f64,
    /// Total number of training steps.
    #[config(default = 500)]
    pub total_steps: usize,
    /// Number of linear warmup steps.
    #[config(default = 20)]
    pub warmup_steps: usize,
    /// Steps without improvement of the best loss before stopping. 0 disables.
    #[config(default = 20)]
    pub patience: usize,
    /// Steps between metric logging.
    #[config(default = 10)]
    pub log_interval: usize,
    /// Steps between checkpoint saves. 0 disables periodic checkpoints.
    #[config(default = 100)]
    pub checkpoint_interval: usize,
    /// Directory for saving checkpoints.
    #[config(default = "String::from(\"checkpoints/merit\")")]
    pub checkpoint_dir: String,
    /// Seed for view sampling.
    #[config(default = 0)]
    pub seed: u64,
    /// Treat adjacency as a single shared matrix (see `GraphNeuralNetwork`).
    #[config(default = false)]
    pub sparse: bool,
    /// View generation.
    #[config(default = "AugmentationConfig::new()")]
    pub augmentation: AugmentationConfig,
}

/// Compute the learning rate at a given step using warmup + cosine decay.
///
/// - Warmup phase (`step < warmup_steps`): linearly ramps from 0 to `base_lr`.
/// - Cosine phase: decays from `base_lr` to 0 following a cosine schedule.
pub fn lr_schedule(base_lr: f64, warmup_steps: usize, total_steps: usize, step: usize) -> f64 {
    if warmup_steps > 0 && step < warmup_steps {
        base_lr * (step + 1) as f64 / warmup_steps as f64
    } else {
        let decay_steps = total_steps.saturating_sub(warmup_steps).max(1);
        let progress = (step.saturating_sub(warmup_steps)) as f64 / decay_steps as f64;
        let progress = progress.min(1.0);
        base_lr * 0.5 * (1.0 + (std::f64::consts::PI * progress).cos())
    }
}

/// Running average of the loss terms over a logging interval.
struct RunningAvg {
    loss: f64,
    cross_view: f64,
    cross_network: f64,
    count: usize,
}

impl RunningAvg {
    fn new() -> Self {
        Self { loss: 0.0, cross_view: 0.0, cross_network: 0.0, count: 0 }
    }

    fn update(&mut self, loss: f64, cross_view: f64, cross_network: f64) {
        self.loss += loss;
        self.cross_view += cross_view;
        self.cross_network += cross_network;
        self.count += 1;
    }

    fn avg_metrics(&self, embedding_std: f64, target_drift: f64) -> Option<MeritMetrics> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some(MeritMetrics {
            loss: self.loss / n,
            cross_view_loss: self.cross_view / n,
            cross_network_loss: self.cross_network / n,
            embedding_std,
            target_drift,
        })
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

/// Write `online`, `target` (if present), `optimizer` and `meta.json` into `dir`.
fn save_checkpoint<B, G, O>(
    dir: &str,
    merit: &Merit<B, G>,
    optimizer: &O,
    meta: &CheckpointMeta,
) -> anyhow::Result<()>
where
    B: AutodiffBackend,
    G: GraphNeuralNetwork<B> + AutodiffModule<B>,
    G::InnerModule: ModuleDisplay,
    O: Optimizer<OnlineNetwork<B, G>, B>,
{
    std::fs::create_dir_all(dir)?;
    let recorder = recorder();

    merit
        .online()
        .clone()
        .save_file(format!("{dir}/online"), &recorder)
        .map_err(|e| anyhow::anyhow!("Failed to save online network to {dir}: {e}"))?;

    if let Ok(target) = merit.target() {
        target
            .encoder()
            .clone()
            .save_file(format!("{dir}/target"), &recorder)
            .map_err(|e| anyhow::anyhow!("Failed to save target encoder to {dir}: {e}"))?;
    }

    recorder
        .record(optimizer.to_record(), format!("{dir}/optimizer").into())
        .map_err(|e| anyhow::anyhow!("Failed to save optimizer to {dir}: {e}"))?;

    let meta_path = format!("{dir}/meta.json");
    serde_json::to_writer_pretty(std::fs::File::create(&meta_path)?, meta)?;
    Ok(())
}

/// Read `meta.json` from a checkpoint directory.
pub fn load_meta(dir: &Path) -> anyhow::Result<CheckpointMeta> {
    let meta_path = dir.join("meta.json");
    let file = std::fs::File::open(&meta_path)
        .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", meta_path.display()))?;
    serde_json::from_reader(file)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", meta_path.display()))
}

/// Run the MERIT training loop.
///
/// # Arguments
/// - `config`: training hyperparameters
/// - `merit`: objective with an initialised target (consumed and returned updated)
/// - `graph`: the graph views are sampled from
/// - `device`: burn device for tensor operations
/// - `resume_step`: if `Some(step)`, load optimizer state and metadata from
///   `{checkpoint_dir}/step_{step}/` and continue training with the next step.
///   The caller restores `merit` from the same directory with [`load_checkpoint`].
///
/// # Returns
/// The trained objective. The best online network is also saved under
/// `{checkpoint_dir}/best`, the last one under `{checkpoint_dir}/final`.
pub fn train<B, G>(
    config: &MeritTrainingConfig,
    mut merit: Merit<B, G>,
    graph: &GraphData,
    device: &B::Device,
    resume_step: Option<usize>,
) -> anyhow::Result<Merit<B, G>>
where
    B: AutodiffBackend,
    G: GraphNeuralNetwork<B> + AutodiffModule<B>,
    G::InnerModule: ModuleDisplay,
{
    graph.validate()?;
    config.augmentation.validate()?;
    merit.target()?;
    std::fs::create_dir_all(&config.checkpoint_dir)?;

    let optim_config = AdamWConfig::new()
        .with_weight_decay(config.weight_decay as f32)
        .with_grad_clipping(Some(GradientClippingConfig::Norm(
            config.max_grad_norm as f32,
        )));
    let mut optimizer = optim_config.init::<B, OnlineNetwork<B, G>>();

    let mut history = MetricsHistory::new();
    let mut running_avg = RunningAvg::new();
    let train_start = Instant::now();
    let mut trained_steps: u64 = 0;
    let mut skipped_steps: u64 = 0;
    let mut best_loss = f64::INFINITY;
    let start_step: usize;

    if let Some(step) = resume_step {
        let step_dir = format!("{}/step_{step}", config.checkpoint_dir);
        let optim_path = format!("{step_dir}/optimizer");
        let optim_record = recorder()
            .load(optim_path.into(), device)
            .map_err(|e| anyhow::anyhow!("Failed to load optimizer from {step_dir}: {e}"))?;
        optimizer = optimizer.load_record(optim_record);

        let meta = load_meta(Path::new(&step_dir))?;
        trained_steps = meta.trained_steps;
        skipped_steps = meta.skipped_steps;
        best_loss = meta.best_loss.unwrap_or(f64::INFINITY);
        // The checkpoint was written after step `step` completed.
        start_step = step + 1;

        tracing::info!(
            start_step,
            trained_steps,
            skipped_steps,
            "Resumed training from checkpoint"
        );
    } else {
        start_step = 0;
    }

    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(start_step as u64));
    let mut steps_since_best = 0usize;
    let mut last_step = start_step;

    tracing::info!(
        nodes = graph.num_nodes,
        edges = graph.edges.len(),
        sample_size = config.augmentation.sample_size,
        total_steps = config.total_steps,
        beta = merit.beta(),
        decay = merit.ema().decay(),
        "Starting MERIT training"
    );

    for step in start_step..config.total_steps {
        last_step = step;
        let lr = lr_schedule(config.lr, config.warmup_steps, config.total_steps, step);

        let (view_1, view_2) = augmented_pair(graph, &config.augmentation, &mut rng);
        let view_1 = view_to_tensors::<B>(&view_1, device);
        let view_2 = view_to_tensors::<B>(&view_2, device);

        let parts = merit.forward_components(view_1.clone(), view_2, config.sparse)?;
        let loss_val = tensor_to_f64(parts.total.clone());
        if !loss_val.is_finite() {
            skipped_steps += 1;
            tracing::warn!(step, skipped_steps, loss = loss_val, "Step skipped (non-finite loss)");
            continue;
        }
        trained_steps += 1;

        let cross_view_val = tensor_to_f64(parts.cross_view);
        let cross_network_val = tensor_to_f64(parts.cross_network);

        // Backward + optimizer step on the online network, then EMA on the target
        let grads = GradientsParams::from_grads(parts.total.backward(), merit.online());
        merit = merit.map_online(|online| optimizer.step(lr, online, grads));
        merit.update_moving_average()?;

        running_avg.update(loss_val, cross_view_val, cross_network_val);

        if loss_val < best_loss {
            best_loss = loss_val;
            steps_since_best = 0;
            save_checkpoint(
                &format!("{}/best", config.checkpoint_dir),
                &merit,
                &optimizer,
                &CheckpointMeta {
                    step,
                    trained_steps,
                    skipped_steps,
                    best_loss: Some(best_loss),
                },
            )?;
        } else {
            steps_since_best += 1;
        }

        if config.log_interval > 0 && step % config.log_interval == 0 {
            let reps = merit.embed(view_1, config.sparse);
            let [batch, nodes, dim] = reps.dims();
            let std = embedding_std(reps.reshape([batch * nodes, dim]));
            let drift = merit.target_drift()?;

            if let Some(metrics) = running_avg.avg_metrics(std, drift) {
                let warnings = metrics.health_check();
                if !warnings.is_empty() {
                    tracing::warn!(step, "Health check warnings: {:?}", warnings);
                }
                let lr_str = format!("{:.2e}", lr);
                tracing::info!(
                    step,
                    lr = %lr_str,
                    "avg({}) loss={:.4} cross_view={:.4} cross_network={:.4} std={:.3} drift={:.2e}",
                    running_avg.count,
                    metrics.loss,
                    metrics.cross_view_loss,
                    metrics.cross_network_loss,
                    metrics.embedding_std,
                    metrics.target_drift,
                );
                let interval_loss = metrics.loss;
                if history.push(step, metrics) {
                    tracing::debug!(step, interval_loss, "New best interval-average loss");
                }
            }
            running_avg.reset();
        }

        if config.checkpoint_interval > 0 && step > 0 && step % config.checkpoint_interval == 0 {
            save_checkpoint(
                &format!("{}/step_{step}", config.checkpoint_dir),
                &merit,
                &optimizer,
                &CheckpointMeta {
                    step,
                    trained_steps,
                    skipped_steps,
                    best_loss: best_loss.is_finite().then_some(best_loss),
                },
            )?;
            tracing::info!(step, "Checkpoint saved (online + target + optimizer + meta)");
        }

        if config.patience > 0 && steps_since_best >= config.patience {
            tracing::info!(
                step,
                best_loss,
                patience = config.patience,
                "Early stopping: no improvement"
            );
            break;
        }
    }

    let total_time = train_start.elapsed();
    tracing::info!(
        trained_steps,
        skipped_steps,
        last_step,
        best_loss,
        logged = history.len(),
        best_interval = ?history.best(),
        elapsed_secs = format!("{:.1}", total_time.as_secs_f64()),
        "Training loop finished"
    );

    save_checkpoint(
        &format!("{}/final", config.checkpoint_dir),
        &merit,
        &optimizer,
        &CheckpointMeta {
            step: last_step + 1,
            trained_steps,
            skipped_steps,
            best_loss: best_loss.is_finite().then_some(best_loss),
        },
    )?;
    tracing::info!("Training complete. Final checkpoint saved.");

    Ok(merit)
}

/// Restore a [`Merit`] objective from a checkpoint directory.
///
/// The online network is loaded from `{dir}/online`. The target is loaded
/// from `{dir}/target` when present, otherwise it is mirrored from the
/// restored online encoder.
pub fn load_checkpoint<B: Backend, G: GraphNeuralNetwork<B>>(
    dir: &Path,
    config: &MeritConfig,
    init_gnn: impl Fn(&B::Device) -> G,
    device: &B::Device,
) -> anyhow::Result<Merit<B, G>> {
    let recorder = recorder();
    let online = config
        .init_online(&init_gnn, device)
        .load_file(dir.join("online"), &recorder, device)
        .map_err(|e| anyhow::anyhow!("Failed to load online network from {}: {e}", dir.display()))?;

    let merit = config.from_online(online, &init_gnn, device)?;

    let target_path = dir.join("target.mpk");
    if !target_path.exists() {
        tracing::info!(dir = %dir.display(), "No saved target, mirrored from online encoder");
        return Ok(merit);
    }
    let target = config
        .init_encoder(init_gnn(device), device)
        .load_file(dir.join("target"), &recorder, device)
        .map_err(|e| anyhow::anyhow!("Failed to load target encoder from {}: {e}", dir.display()))?;
    Ok(merit.with_target(TargetEncoder::restore(target)))
}
