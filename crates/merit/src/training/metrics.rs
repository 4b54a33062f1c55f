//! Training metrics with health checks.

use burn::prelude::*;

/// Embedding spread below this is reported as collapse.
const COLLAPSE_STD: f64 = 1e-4;
/// Target/online mean absolute parameter gap above this is reported as divergence.
const DIVERGED_DRIFT: f64 = 1.0;

/// Metrics for one training step or a logging-interval average.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct MeritMetrics {
    pub loss: f64,
    pub cross_view_loss: f64,
    pub cross_network_loss: f64,
    /// Mean per-dimension standard deviation of node representations.
    pub embedding_std: f64,
    /// Mean absolute parameter difference between target and online encoders.
    pub target_drift: f64,
}

impl MeritMetrics {
    /// Human-readable warnings; empty when training looks healthy.
    pub fn health_check(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.loss.is_finite() {
            warnings.push(format!("loss is not finite ({})", self.loss));
        }
        if self.embedding_std < COLLAPSE_STD {
            warnings.push(format!(
                "embeddings collapsed (std={:.2e})",
                self.embedding_std
            ));
        }
        if self.target_drift == 0.0 {
            warnings.push("target encoder identical to online encoder".to_string());
        } else if self.target_drift > DIVERGED_DRIFT {
            warnings.push(format!(
                "target encoder diverged from online (drift={:.3})",
                self.target_drift
            ));
        }
        warnings
    }
}

/// Mean over columns of the per-column standard deviation of a `(rows, dim)` batch.
pub fn embedding_std<B: Backend>(embeddings: Tensor<B, 2>) -> f64 {
    let [rows, _] = embeddings.dims();
    if rows < 2 {
        return 0.0;
    }
    let centered = embeddings.clone() - embeddings.mean_dim(0);
    let var = centered.powf_scalar(2.0).sum_dim(0).div_scalar((rows - 1) as f64);
    let std: f32 = var.sqrt().mean().into_scalar().elem();
    std as f64
}

/// Logged metrics over a run, with the best loss seen so far.
#[derive(Debug, Default)]
pub struct MetricsHistory {
    entries: Vec<(usize, MeritMetrics)>,
    best: Option<(usize, f64)>,
}

impl MetricsHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record metrics at `step`. Returns `true` if this is a new best loss.
    pub fn push(&mut self, step: usize, metrics: MeritMetrics) -> bool {
        let improved = metrics.loss.is_finite()
            && self.best.map_or(true, |(_, best)| metrics.loss < best);
        if improved {
            self.best = Some((step, metrics.loss));
        }
        self.entries.push((step, metrics));
        improved
    }

    /// `(step, loss)` of the lowest finite loss recorded.
    pub fn best(&self) -> Option<(usize, f64)> {
        self.best
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
