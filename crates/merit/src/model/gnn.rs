//! Graph neural network collaborator.
//!
//! MERIT does not care how node representations are produced, only that the
//! network is a burn [`Module`] (so it can be mirrored and EMA-tracked) and
//! that it maps `(features, adjacency)` to `(batch, nodes, d)`
//! representations whose width matches the projector input.

use burn::module::{ModuleDisplay, Param};
use burn::nn::{Initializer, Linear, LinearConfig, PRelu, PReluConfig};
use burn::prelude::*;

/// Default representation width expected by the projection head.
pub const GNN_OUTPUT_DIM: usize = 512;

/// A graph neural network usable as the MERIT backbone.
pub trait GraphNeuralNetwork<B: Backend>: Module<B> + ModuleDisplay {
    /// Compute node representations.
    ///
    /// - `features`: `(batch, nodes, d_features)`
    /// - `adjacency`: `(batch, nodes, nodes)`, already normalised
    /// - `sparse`: the adjacency is one shared `(1, nodes, nodes)` matrix
    ///
    /// Returns `(batch, nodes, d_output)`.
    fn forward(&self, features: Tensor<B, 3>, adjacency: Tensor<B, 3>, sparse: bool)
        -> Tensor<B, 3>;
}

/// Configuration for the one-layer graph convolution.
#[derive(Config, Debug)]
pub struct GcnConfig {
    /// Node feature dimension.
    pub d_input: usize,
    /// Output representation dimension.
    #[config(default = 512)]
    pub d_output: usize,
}

/// Graph convolution: `PReLU(Â · X W + b)`.
///
/// `W` has no bias of its own and is Xavier-uniform initialised; the bias `b`
/// is applied after aggregation and starts at zero.
#[derive(Module, Debug)]
pub struct Gcn<B: Backend> {
    /// Feature transform, d_input → d_output (no bias).
    pub(crate) linear: Linear<B>,
    /// Post-aggregation bias, shape (d_output,).
    bias: Param<Tensor<B, 1>>,
    /// Output activation.
    activation: PRelu<B>,
}

impl GcnConfig {
    /// Initialize a GCN layer.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Gcn<B> {
        Gcn {
            linear: LinearConfig::new(self.d_input, self.d_output)
                .with_bias(false)
                .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                .init(device),
            bias: Param::from_tensor(Tensor::zeros([self.d_output], device)),
            activation: PReluConfig::new().init(device),
        }
    }
}

impl<B: Backend> GraphNeuralNetwork<B> for Gcn<B> {
    fn forward(
        &self,
        features: Tensor<B, 3>,
        adjacency: Tensor<B, 3>,
        sparse: bool,
    ) -> Tensor<B, 3> {
        let seq = self.linear.forward(features); // (batch, nodes, d_output)

        let aggregated = if sparse {
            // Shared adjacency over a single graph: (n, n) @ (n, d).
            let adjacency: Tensor<B, 2> = adjacency.squeeze(0);
            let seq: Tensor<B, 2> = seq.squeeze(0);
            adjacency.matmul(seq).unsqueeze::<3>()
        } else {
            adjacency.matmul(seq)
        };

        let bias = self.bias.val().unsqueeze::<3>(); // (1, 1, d_output)
        self.activation.forward(aggregated + bias)
    }
}
