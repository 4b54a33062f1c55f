//! Two-layer MLP used as the projection head and the predictor.

use burn::nn::{BatchNorm, BatchNormConfig, Linear, LinearConfig, PRelu, PReluConfig};
use burn::prelude::*;

/// Configuration for the two-layer MLP shared by the projection and
/// predictor heads.
///
/// ```text
/// (batch, d_input)
///   → Linear(d_input→d_hidden) → BatchNorm1d → PReLU
///   → Linear(d_hidden→d_output)
///   → (batch, d_output)
/// ```
#[derive(Config, Debug)]
pub struct MlpConfig {
    /// Input dimension.
    pub d_input: usize,
    /// Output dimension.
    pub d_output: usize,
    /// Hidden dimension (batch-normalised and PReLU-activated).
    pub d_hidden: usize,
}

/// Linear → batch norm → PReLU → linear.
///
/// Batch norm follows burn's backend convention: batch statistics when the
/// backend tracks gradients, running statistics otherwise.
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    /// d_input → d_hidden.
    pub(crate) linear1: Linear<B>,
    /// Normalisation over the hidden features.
    norm: BatchNorm<B, 0>,
    /// Single learnable negative slope, initialised to 0.25.
    activation: PRelu<B>,
    /// d_hidden → d_output.
    pub(crate) linear2: Linear<B>,
}

impl MlpConfig {
    /// Initialize an MLP with the given configuration.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Mlp<B> {
        Mlp {
            linear1: LinearConfig::new(self.d_input, self.d_hidden).init(device),
            norm: BatchNormConfig::new(self.d_hidden).init(device),
            activation: PReluConfig::new().init(device),
            linear2: LinearConfig::new(self.d_hidden, self.d_output).init(device),
        }
    }
}

impl<B: Backend> Mlp<B> {
    /// Input shape: `(batch, d_input)`
    /// Output shape: `(batch, d_output)`
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.linear1.forward(x);
        let x = self.norm.forward(x);
        let x = self.activation.forward(x);
        self.linear2.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let mlp = MlpConfig::new(512, 64, 128).init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 2>::random(
            [8, 512],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let output = mlp.forward(input);
        assert_eq!(output.dims(), [8, 64]);
    }

    #[test]
    fn test_different_inputs_different_outputs() {
        let device = Default::default();
        let mlp = MlpConfig::new(16, 4, 8).init::<TestBackend>(&device);

        let input1 = Tensor::<TestBackend, 2>::random(
            [4, 16],
            Distribution::Normal(3.0, 1.0),
            &device,
        );
        let input2 = Tensor::<TestBackend, 2>::random(
            [4, 16],
            Distribution::Normal(-3.0, 1.0),
            &device,
        );

        let diff: f32 = (mlp.forward(input1) - mlp.forward(input2))
            .abs()
            .sum()
            .into_scalar()
            .elem();
        assert!(diff > 1e-6, "Different inputs should differ, diff={diff}");
    }

    #[test]
    fn test_batch_norm_uses_batch_statistics_under_autodiff() {
        // With batch statistics every hidden unit is centred over the batch, so
        // shifting the whole input batch by a constant leaves the output unchanged.
        let device = Default::default();
        let mlp = MlpConfig::new(8, 4, 6).init::<TestAutodiffBackend>(&device);
        let input = Tensor::<TestAutodiffBackend, 2>::random(
            [16, 8],
            Distribution::Normal(0.0, 1.0),
            &device,
        );

        let out = mlp.forward(input.clone());
        let shifted = mlp.forward(input.add_scalar(5.0));

        let max_diff: f32 = (out - shifted).abs().max().into_scalar().elem();
        assert!(max_diff < 1e-3, "Output should be shift-invariant, max diff {max_diff}");
    }

    #[test]
    fn test_gradient_flows_through_both_linears() {
        use burn::optim::GradientsParams;

        let device = Default::default();
        let mlp = MlpConfig::new(8, 4, 6).init::<TestAutodiffBackend>(&device);
        let input = Tensor::<TestAutodiffBackend, 2>::random(
            [4, 8],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let loss = mlp.forward(input).powf_scalar(2.0).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &mlp);

        let grad1 = grads
            .get::<NdArray<f32>, 2>(mlp.linear1.weight.id)
            .expect("linear1 weight should have gradient");
        let grad1_sum: f32 = grad1.abs().sum().into_scalar().elem();
        assert!(grad1_sum > 0.0, "linear1 gradient is zero");

        let grad2 = grads
            .get::<NdArray<f32>, 2>(mlp.linear2.weight.id)
            .expect("linear2 weight should have gradient");
        let grad2_sum: f32 = grad2.abs().sum().into_scalar().elem();
        assert!(grad2_sum > 0.0, "linear2 gradient is zero");
    }
}
