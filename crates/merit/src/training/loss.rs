//! Cosine similarity and the two MERIT contrastive terms.
//!
//! Both terms are InfoNCE-style: the diagonal of an exponentiated cosine
//! similarity matrix is the positive pair, the rest of the row are the
//! negatives. No temperature is applied. Both return per-sample losses of
//! shape `(n,)`; averaging is left to the objective.

use burn::prelude::*;
use burn::tensor::TensorData;

/// Lower bound on a row norm during L2 normalisation.
pub const NORM_EPS: f64 = 1e-12;

/// Divide each row by `max(‖row‖₂, NORM_EPS)`.
///
/// A zero row stays zero, so its similarities are 0 rather than NaN.
pub fn l2_normalize<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    // Clamp the squared norm so the sqrt gradient stays finite on zero rows.
    let norm = x
        .clone()
        .powf_scalar(2.0)
        .sum_dim(1)
        .clamp_min(NORM_EPS * NORM_EPS)
        .sqrt(); // (n, 1)
    x / norm
}

/// Pairwise cosine similarity: `(n1, d) × (n2, d) → (n1, n2)`.
pub fn sim<B: Backend>(x: Tensor<B, 2>, y: Tensor<B, 2>) -> Tensor<B, 2> {
    l2_normalize(x).matmul(l2_normalize(y).transpose())
}

fn identity<B: Backend>(n: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut data = vec![0.0_f32; n * n];
    for i in 0..n {
        data[i * n + i] = 1.0;
    }
    Tensor::from_data(TensorData::new(data, [n, n]), device)
}

/// Main diagonal of a square matrix, `(n, n) → (n,)`.
fn diagonal<B: Backend>(m: Tensor<B, 2>) -> Tensor<B, 1> {
    let [n, _] = m.dims();
    let eye = identity::<B>(n, &m.device());
    (m * eye).sum_dim(1).squeeze::<1>(1)
}

fn row_sums<B: Backend>(m: Tensor<B, 2>) -> Tensor<B, 1> {
    m.sum_dim(1).squeeze::<1>(1)
}

/// Cross-view contrastive term.
///
/// ```text
/// intra = exp(sim(pred_1, pred_1)),  inter = exp(sim(pred_1, pred_2))
/// loss_i = -log( inter_ii / (Σ_j intra_ij + Σ_j inter_ij - intra_ii) )
/// ```
///
/// Sample `i` in the other view is the positive; every other sample in both
/// views is a negative. `_target` is accepted for call-site symmetry with the
/// cross-network term and does not enter the computation.
///
/// # Arguments
/// - `pred_1`, `pred_2`: `(n, d)`, row `i` of each describes the same node
/// - `_target`: `(n, d)`, unused
///
/// # Returns
/// Per-sample losses, shape `(n,)`, all `>= 0`.
pub fn contrastive_loss_cross_view<B: Backend>(
    pred_1: Tensor<B, 2>,
    pred_2: Tensor<B, 2>,
    _target: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let intra = sim(pred_1.clone(), pred_1.clone()).exp();
    let inter = sim(pred_1, pred_2).exp();

    let intra_diag = diagonal(intra.clone());
    let inter_diag = diagonal(inter.clone());
    let denominator = row_sums(intra) + row_sums(inter) - intra_diag;

    (inter_diag / denominator).log().neg()
}

/// Cross-network contrastive term.
///
/// ```text
/// cross = exp(sim(pred, target))
/// loss_i = -log( cross_ii / Σ_j cross_ij )
/// ```
///
/// # Arguments
/// - `pred`: `(n, d)` online embeddings of one view
/// - `target`: `(n, d)` detached target embeddings of the other view
///
/// # Returns
/// Per-sample losses, shape `(n,)`, all `>= 0`.
pub fn contrastive_loss_cross_network<B: Backend>(
    pred: Tensor<B, 2>,
    target: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let cross = sim(pred, target).exp();
    let cross_diag = diagonal(cross.clone());
    (cross_diag / row_sums(cross)).log().neg()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    fn to_vec<const D: usize>(t: Tensor<TestBackend, D>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_self_similarity_diagonal_is_one() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::random([6, 10], Distribution::Normal(0.0, 3.0), &device);
        let diag = to_vec(diagonal(sim(x.clone(), x)));
        for (i, d) in diag.iter().enumerate() {
            assert!((d - 1.0).abs() < 1e-5, "sim(x,x)[{i},{i}] = {d}");
        }
    }

    #[test]
    fn test_similarity_shape_and_range() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::random([3, 5], Distribution::Normal(0.0, 1.0), &device);
        let y = Tensor::<TestBackend, 2>::random([4, 5], Distribution::Normal(0.0, 1.0), &device);
        let s = sim(x, y);
        assert_eq!(s.dims(), [3, 4]);
        for v in to_vec(s) {
            assert!((-1.0 - 1e-5..=1.0 + 1e-5).contains(&v), "cosine out of range: {v}");
        }
    }

    #[test]
    fn test_similarity_invariant_to_row_rescaling() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[1.0_f32, 2.0, -1.0], [0.5, -3.0, 2.0]]),
            &device,
        );
        let y = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[2.0_f32, 0.0, 1.0], [1.0, 1.0, 1.0], [-4.0, 2.0, 0.5]]),
            &device,
        );
        let scales = Tensor::<TestBackend, 2>::from_data(TensorData::from([[7.5_f32], [0.01]]), &device);

        let base = to_vec(sim(x.clone(), y.clone()));
        let scaled = to_vec(sim(x * scales, y.mul_scalar(3.0)));
        for (a, b) in base.iter().zip(&scaled) {
            assert!((a - b).abs() < 1e-5, "{a} vs {b}");
        }
    }

    #[test]
    fn test_zero_row_gives_zero_similarity() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[0.0_f32, 0.0, 0.0], [1.0, 0.0, 0.0]]),
            &device,
        );
        let s = to_vec(sim(x.clone(), x));
        assert_eq!(s[0], 0.0);
        assert_eq!(s[1], 0.0);
        assert!((s[3] - 1.0).abs() < 1e-6);
        assert!(s.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_losses_have_batch_length_and_are_non_negative() {
        let device = Default::default();
        let a = Tensor::<TestBackend, 2>::random([5, 8], Distribution::Normal(0.0, 1.0), &device);
        let b = Tensor::<TestBackend, 2>::random([5, 8], Distribution::Normal(0.0, 1.0), &device);
        let t = Tensor::<TestBackend, 2>::random([5, 8], Distribution::Normal(0.0, 1.0), &device);

        let view = contrastive_loss_cross_view(a.clone(), b, t.clone());
        let network = contrastive_loss_cross_network(a, t);
        assert_eq!(view.dims(), [5]);
        assert_eq!(network.dims(), [5]);
        for v in to_vec(view).into_iter().chain(to_vec(network)) {
            assert!(v.is_finite() && v >= 0.0, "loss must be finite and >= 0, got {v}");
        }
    }

    #[test]
    fn test_identical_embeddings_give_uniform_loss() {
        // Every similarity is 1: cross-network ratio is 1/n, cross-view 1/(2n-1).
        let device = Default::default();
        let n = 4;
        let x = Tensor::<TestBackend, 2>::ones([n, 3], &device);

        let network = to_vec(contrastive_loss_cross_network(x.clone(), x.clone()));
        let view = to_vec(contrastive_loss_cross_view(x.clone(), x.clone(), x));
        let expected_network = (n as f32).ln();
        let expected_view = ((2 * n - 1) as f32).ln();
        for v in network {
            assert!((v - expected_network).abs() < 1e-4, "expected {expected_network}, got {v}");
        }
        for v in view {
            assert!((v - expected_view).abs() < 1e-4, "expected {expected_view}, got {v}");
        }
    }

    #[test]
    fn test_aligned_pairs_beat_swapped_pairs() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[1.0_f32, 0.0], [-1.0, 0.0]]),
            &device,
        );
        let swapped = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[-1.0_f32, 0.0], [1.0, 0.0]]),
            &device,
        );

        let aligned = to_vec(contrastive_loss_cross_network(x.clone(), x.clone()));
        let misaligned = to_vec(contrastive_loss_cross_network(x, swapped));

        // ln(1 + e^-2) for the aligned case.
        let expected = (1.0_f32 + (-2.0_f32).exp()).ln();
        for (a, m) in aligned.iter().zip(&misaligned) {
            assert!((a - expected).abs() < 1e-5, "expected {expected}, got {a}");
            assert!(m > a, "misaligned {m} should exceed aligned {a}");
        }
    }

    #[test]
    fn test_single_row_collapses_to_zero() {
        let device = Default::default();
        let a = Tensor::<TestBackend, 2>::random([1, 4], Distribution::Normal(0.0, 1.0), &device);
        let b = Tensor::<TestBackend, 2>::random([1, 4], Distribution::Normal(0.0, 1.0), &device);

        let view = to_vec(contrastive_loss_cross_view(a.clone(), b.clone(), b.clone()));
        let network = to_vec(contrastive_loss_cross_network(a, b));
        assert!(view[0].abs() < 1e-5, "got {}", view[0]);
        assert!(network[0].abs() < 1e-5, "got {}", network[0]);
    }

    #[test]
    fn test_cross_view_ignores_target_argument() {
        let device = Default::default();
        let a = Tensor::<TestAutodiffBackend, 2>::random([4, 6], Distribution::Normal(0.0, 1.0), &device)
            .require_grad();
        let b = Tensor::<TestAutodiffBackend, 2>::random([4, 6], Distribution::Normal(0.0, 1.0), &device)
            .require_grad();
        let t = Tensor::<TestAutodiffBackend, 2>::random([4, 6], Distribution::Normal(0.0, 1.0), &device)
            .require_grad();

        let loss = contrastive_loss_cross_view(a.clone(), b.clone(), t.clone()).mean();
        let grads = loss.backward();

        assert!(a.grad(&grads).is_some(), "pred_1 should receive gradient");
        assert!(b.grad(&grads).is_some(), "pred_2 should receive gradient");
        assert!(t.grad(&grads).is_none(), "target must not enter the cross-view term");
    }
}
