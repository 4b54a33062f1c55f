//! Test doubles for the GNN collaborator.

use burn::prelude::*;

use crate::model::gnn::GraphNeuralNetwork;

/// Parameter-free backbone that returns the node features unchanged.
///
/// Lets the objective be exercised on raw feature batches: with 512-wide
/// features it satisfies the projector's input contract directly.
#[derive(Module, Clone, Debug, Default)]
pub struct IdentityGnn;

impl<B: Backend> GraphNeuralNetwork<B> for IdentityGnn {
    fn forward(
        &self,
        features: Tensor<B, 3>,
        _adjacency: Tensor<B, 3>,
        _sparse: bool,
    ) -> Tensor<B, 3> {
        features
    }
}
