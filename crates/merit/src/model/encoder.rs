//! Graph encoder: GNN backbone followed by the projection head.
//!
//! The backbone is injected (any [`GraphNeuralNetwork`]); the encoder only
//! flattens its `(batch, nodes, d)` output to `(batch * nodes, d)` rows and
//! projects them. The projector input width is a hard contract with the
//! backbone's output width and is not checked here: a mismatch surfaces as a
//! backend shape panic on the first forward.

use burn::prelude::*;

use crate::model::gnn::GraphNeuralNetwork;
use crate::model::mlp::{Mlp, MlpConfig};

/// Configuration for the projection side of a [`GraphEncoder`].
#[derive(Config, Debug)]
pub struct GraphEncoderConfig {
    /// Output dimension of the projection head.
    pub projection_size: usize,
    /// Hidden dimension of the projection head.
    pub projection_hidden_size: usize,
    /// Width of the backbone representations fed to the projector.
    #[config(default = 512)]
    pub d_representation: usize,
}

impl GraphEncoderConfig {
    /// Wrap `gnn` with a freshly initialised projection head.
    pub fn init<B: Backend, G: GraphNeuralNetwork<B>>(
        &self,
        gnn: G,
        device: &B::Device,
    ) -> GraphEncoder<B, G> {
        GraphEncoder {
            gnn,
            projector: MlpConfig::new(
                self.d_representation,
                self.projection_size,
                self.projection_hidden_size,
            )
            .init(device),
        }
    }
}

/// GNN backbone + projection MLP.
#[derive(Module, Debug)]
pub struct GraphEncoder<B: Backend, G> {
    pub(crate) gnn: G,
    pub(crate) projector: Mlp<B>,
}

impl<B: Backend, G: GraphNeuralNetwork<B>> GraphEncoder<B, G> {
    /// Node representations from the backbone only, `(batch, nodes, d)`.
    pub fn represent(
        &self,
        adjacency: Tensor<B, 3>,
        features: Tensor<B, 3>,
        sparse: bool,
    ) -> Tensor<B, 3> {
        self.gnn.forward(features, adjacency, sparse)
    }

    /// Projected embeddings, `(batch * nodes, projection_size)`.
    pub fn forward(
        &self,
        adjacency: Tensor<B, 3>,
        features: Tensor<B, 3>,
        sparse: bool,
    ) -> Tensor<B, 2> {
        let representations = self.represent(adjacency, features, sparse);
        let [batch, nodes, dim] = representations.dims();
        let flat = representations.reshape([batch * nodes, dim]);
        self.projector.forward(flat)
    }
}
