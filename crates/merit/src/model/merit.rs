//! The MERIT objective: online encoder + predictor trained against an EMA
//! target encoder.
//!
//! [`OnlineNetwork`] is the only module handed to an optimizer. The target is
//! a structural mirror of the online encoder, built once from a freshly
//! initialised shell (its own parameter ids and batch-norm running state) and
//! afterwards moved only by [`Merit::update_moving_average`]. All target
//! parameters are marked `no_grad`, and its forward detaches both inputs and
//! outputs.

use burn::prelude::*;

use crate::error::MeritError;
use crate::model::ema::{copy_parameters, parameter_distance, update_moving_average, EmaUpdater};
use crate::model::encoder::{GraphEncoder, GraphEncoderConfig};
use crate::model::gnn::GraphNeuralNetwork;
use crate::model::mlp::{Mlp, MlpConfig};
use crate::training::loss::{contrastive_loss_cross_network, contrastive_loss_cross_view};

/// Hyperparameters of the MERIT objective.
#[derive(Config, Debug)]
pub struct MeritConfig {
    /// Output dimension of the encoder's projection head.
    pub projection_size: usize,
    /// Hidden dimension of the projection head.
    pub projection_hidden_size: usize,
    /// Output dimension of the predictor.
    pub prediction_size: usize,
    /// Hidden dimension of the predictor.
    pub prediction_hidden_size: usize,
    /// EMA decay of the target encoder, in `[0, 1]`.
    #[config(default = 0.99)]
    pub moving_average_decay: f64,
    /// Weight of the cross-view term, in `[0, 1]`; the cross-network term gets `1 - beta`.
    #[config(default = 0.5)]
    pub beta: f64,
    /// Width of the GNN representations.
    #[config(default = 512)]
    pub d_representation: usize,
}

impl MeritConfig {
    /// Check `beta` and `moving_average_decay` lie in `[0, 1]`.
    pub fn validate(&self) -> Result<(), MeritError> {
        for (name, value) in [
            ("beta", self.beta),
            ("moving_average_decay", self.moving_average_decay),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MeritError::InvalidConfig(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Wrap `gnn` with a fresh projection head sized by this config.
    pub fn init_encoder<B: Backend, G: GraphNeuralNetwork<B>>(
        &self,
        gnn: G,
        device: &B::Device,
    ) -> GraphEncoder<B, G> {
        GraphEncoderConfig::new(self.projection_size, self.projection_hidden_size)
            .with_d_representation(self.d_representation)
            .init(gnn, device)
    }

    /// Build an online network with fresh parameters.
    ///
    /// `init_gnn` is called once per backbone.
    pub fn init_online<B: Backend, G: GraphNeuralNetwork<B>>(
        &self,
        init_gnn: impl Fn(&B::Device) -> G,
        device: &B::Device,
    ) -> OnlineNetwork<B, G> {
        OnlineNetwork {
            encoder: self.init_encoder(init_gnn(device), device),
            predictor: MlpConfig::new(
                self.projection_size,
                self.prediction_size,
                self.prediction_hidden_size,
            )
            .init(device),
        }
    }

    /// Build the full objective: a fresh online network and its target mirror.
    pub fn init<B: Backend, G: GraphNeuralNetwork<B>>(
        &self,
        init_gnn: impl Fn(&B::Device) -> G,
        device: &B::Device,
    ) -> Result<Merit<B, G>, MeritError> {
        self.validate()?;
        let online = self.init_online(&init_gnn, device);
        self.from_online(online, init_gnn, device)
    }

    /// Wrap an existing online network (e.g. loaded from a checkpoint) and
    /// mirror a new target from it.
    pub fn from_online<B: Backend, G: GraphNeuralNetwork<B>>(
        &self,
        online: OnlineNetwork<B, G>,
        init_gnn: impl Fn(&B::Device) -> G,
        device: &B::Device,
    ) -> Result<Merit<B, G>, MeritError> {
        self.validate()?;
        let shell = self.init_encoder(init_gnn(device), device);
        let target = TargetEncoder::mirror(shell, &online.encoder)?;
        tracing::debug!(
            decay = self.moving_average_decay,
            beta = self.beta,
            "Built target encoder mirror"
        );
        Ok(Merit {
            online,
            target: Some(target),
            ema: EmaUpdater::new(self.moving_average_decay),
            beta: self.beta,
        })
    }
}

/// Online encoder + predictor. The trainable half of [`Merit`].
#[derive(Module, Debug)]
pub struct OnlineNetwork<B: Backend, G> {
    pub encoder: GraphEncoder<B, G>,
    pub predictor: Mlp<B>,
}

/// Non-trainable EMA mirror of the online encoder.
#[derive(Debug, Clone)]
pub struct TargetEncoder<B: Backend, G: GraphNeuralNetwork<B>> {
    encoder: GraphEncoder<B, G>,
}

impl<B: Backend, G: GraphNeuralNetwork<B>> TargetEncoder<B, G> {
    /// Copy `online`'s parameter values into `shell` and freeze it.
    ///
    /// `shell` must be built from the same configuration as `online`.
    pub fn mirror(
        shell: GraphEncoder<B, G>,
        online: &GraphEncoder<B, G>,
    ) -> Result<Self, MeritError> {
        let encoder = copy_parameters(shell, online)?.no_grad();
        Ok(Self { encoder })
    }

    /// Freeze an encoder restored from a checkpoint as-is.
    pub fn restore(encoder: GraphEncoder<B, G>) -> Self {
        Self {
            encoder: encoder.no_grad(),
        }
    }

    /// Projected embeddings of `view`, detached from any graph.
    pub fn forward(&self, view: AugmentedView<B>, sparse: bool) -> Tensor<B, 2> {
        self.encoder
            .forward(view.adjacency.detach(), view.features.detach(), sparse)
            .detach()
    }

    pub fn encoder(&self) -> &GraphEncoder<B, G> {
        &self.encoder
    }

    /// One EMA step toward `online`. On error the target is left unchanged.
    fn update(&mut self, ema: &EmaUpdater, online: &GraphEncoder<B, G>) -> Result<(), MeritError> {
        let updated = update_moving_average(ema, self.encoder.clone(), online)?;
        self.encoder = updated.no_grad();
        Ok(())
    }
}

/// One augmented view of a batch of graphs.
#[derive(Debug, Clone)]
pub struct AugmentedView<B: Backend> {
    /// `(batch, nodes, nodes)`
    pub adjacency: Tensor<B, 3>,
    /// `(batch, nodes, features)`
    pub features: Tensor<B, 3>,
}

impl<B: Backend> AugmentedView<B> {
    /// Number of embedding rows this view produces (`batch * nodes`).
    pub fn rows(&self) -> usize {
        let [batch, nodes, _] = self.features.dims();
        batch * nodes
    }
}

/// Scalar loss plus its two mean components.
///
/// `total` carries the autodiff graph; the components are detached and only
/// meant for logging.
#[derive(Debug, Clone)]
pub struct MeritLoss<B: Backend> {
    pub total: Tensor<B, 1>,
    pub cross_view: Tensor<B, 1>,
    pub cross_network: Tensor<B, 1>,
}

/// Dual-network MERIT objective.
#[derive(Debug)]
pub struct Merit<B: Backend, G: GraphNeuralNetwork<B>> {
    online: OnlineNetwork<B, G>,
    target: Option<TargetEncoder<B, G>>,
    ema: EmaUpdater,
    beta: f64,
}

impl<B: Backend, G: GraphNeuralNetwork<B>> Merit<B, G> {
    /// Scalar MERIT loss, shape `[1]`.
    ///
    /// ```text
    /// loss_1 = beta * cross_view(pred_1, pred_2, target_2) + (1 - beta) * cross_network(emb_1, target_2)
    /// loss_2 = beta * cross_view(pred_2, pred_1, target_1) + (1 - beta) * cross_network(emb_2, target_1)
    /// total  = mean(0.5 * (loss_1 + loss_2))
    /// ```
    pub fn forward(
        &self,
        view_1: AugmentedView<B>,
        view_2: AugmentedView<B>,
        sparse: bool,
    ) -> Result<Tensor<B, 1>, MeritError> {
        Ok(self.forward_components(view_1, view_2, sparse)?.total)
    }

    /// [`Merit::forward`] plus the mean cross-view and cross-network terms.
    ///
    /// # Errors
    /// - [`MeritError::TargetNotInitialized`] after `reset_moving_average`
    /// - [`MeritError::ViewMismatch`] if the views yield different row counts
    /// - [`MeritError::DegenerateBatch`] with fewer than two rows
    pub fn forward_components(
        &self,
        view_1: AugmentedView<B>,
        view_2: AugmentedView<B>,
        sparse: bool,
    ) -> Result<MeritLoss<B>, MeritError> {
        let target = self.target()?;
        let (rows_1, rows_2) = (view_1.rows(), view_2.rows());
        if rows_1 != rows_2 {
            return Err(MeritError::ViewMismatch { rows_1, rows_2 });
        }
        if rows_1 < 2 {
            return Err(MeritError::DegenerateBatch { rows: rows_1 });
        }

        let encoder = &self.online.encoder;
        let online_emb_1 =
            encoder.forward(view_1.adjacency.clone(), view_1.features.clone(), sparse);
        let online_emb_2 =
            encoder.forward(view_2.adjacency.clone(), view_2.features.clone(), sparse);

        let online_pred_1 = self.online.predictor.forward(online_emb_1.clone());
        let online_pred_2 = self.online.predictor.forward(online_emb_2.clone());

        let target_emb_1 = target.forward(view_1, sparse);
        let target_emb_2 = target.forward(view_2, sparse);

        let cross_view_1 = contrastive_loss_cross_view(
            online_pred_1.clone(),
            online_pred_2.clone(),
            target_emb_2.clone(),
        );
        let cross_view_2 =
            contrastive_loss_cross_view(online_pred_2, online_pred_1, target_emb_1.clone());
        let cross_network_1 = contrastive_loss_cross_network(online_emb_1, target_emb_2);
        let cross_network_2 = contrastive_loss_cross_network(online_emb_2, target_emb_1);

        let loss_1 = cross_view_1.clone().mul_scalar(self.beta)
            + cross_network_1.clone().mul_scalar(1.0 - self.beta);
        let loss_2 = cross_view_2.clone().mul_scalar(self.beta)
            + cross_network_2.clone().mul_scalar(1.0 - self.beta);
        let total = (loss_1 + loss_2).mul_scalar(0.5).mean();

        Ok(MeritLoss {
            total,
            cross_view: (cross_view_1 + cross_view_2).mul_scalar(0.5).mean().detach(),
            cross_network: (cross_network_1 + cross_network_2)
                .mul_scalar(0.5)
                .mean()
                .detach(),
        })
    }

    /// Detached online GNN representations of `view`, `(batch, nodes, d)`.
    pub fn embed(&self, view: AugmentedView<B>, sparse: bool) -> Tensor<B, 3> {
        self.online
            .encoder
            .represent(view.adjacency, view.features, sparse)
            .detach()
    }

    /// Release the target encoder. Further updates fail until a new
    /// objective is built.
    pub fn reset_moving_average(&mut self) {
        self.target = None;
    }

    /// Move the target one EMA step toward the online encoder.
    pub fn update_moving_average(&mut self) -> Result<(), MeritError> {
        let target = self
            .target
            .as_mut()
            .ok_or(MeritError::TargetNotInitialized)?;
        target.update(&self.ema, &self.online.encoder)
    }

    /// Mean absolute parameter difference between target and online encoders.
    pub fn target_drift(&self) -> Result<f64, MeritError> {
        parameter_distance(self.target()?.encoder(), &self.online.encoder)
    }

    pub fn target(&self) -> Result<&TargetEncoder<B, G>, MeritError> {
        self.target.as_ref().ok_or(MeritError::TargetNotInitialized)
    }

    pub fn online(&self) -> &OnlineNetwork<B, G> {
        &self.online
    }

    /// Replace the online network, e.g. with the result of an optimizer step.
    /// The target is untouched.
    pub fn map_online(self, f: impl FnOnce(OnlineNetwork<B, G>) -> OnlineNetwork<B, G>) -> Self {
        let Merit {
            online,
            target,
            ema,
            beta,
        } = self;
        Merit {
            online: f(online),
            target,
            ema,
            beta,
        }
    }

    /// Replace the target encoder.
    pub fn with_target(mut self, target: TargetEncoder<B, G>) -> Self {
        self.target = Some(target);
        self
    }

    pub fn into_online(self) -> OnlineNetwork<B, G> {
        self.online
    }

    pub fn ema(&self) -> &EmaUpdater {
        &self.ema
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }
}
