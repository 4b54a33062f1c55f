//! Tensor bridge: conversions between host-side graph views / embedding rows
//! (`Vec<f32>`) and burn tensors.
//!
//! Graph views are produced on the host by the augmentation pipeline; the
//! objective needs `(batch, nodes, ·)` tensors. A view always becomes a batch
//! of one graph.

use burn::prelude::*;
use burn::tensor::TensorData;

use crate::model::merit::AugmentedView;
use crate::training::augment::GraphView;

/// Convert one [`GraphView`] into a batch-of-one [`AugmentedView`].
///
/// Adjacency becomes `(1, n, n)`, features `(1, n, f)`.
///
/// # Panics
/// Panics if the flat buffers disagree with `num_nodes` / `feature_dim`.
pub fn view_to_tensors<B: Backend>(view: &GraphView, device: &B::Device) -> AugmentedView<B> {
    let n = view.num_nodes;
    let f = view.feature_dim;
    assert_eq!(
        view.adjacency.len(),
        n * n,
        "adjacency has {} entries, expected {n}x{n}",
        view.adjacency.len()
    );
    assert_eq!(
        view.features.len(),
        n * f,
        "features have {} entries, expected {n}x{f}",
        view.features.len()
    );

    AugmentedView {
        adjacency: Tensor::from_data(TensorData::new(view.adjacency.clone(), [1, n, n]), device),
        features: Tensor::from_data(TensorData::new(view.features.clone(), [1, n, f]), device),
    }
}

/// Split a `(rows, dim)` tensor into host rows.
pub fn tensor_to_rows<B: Backend>(tensor: Tensor<B, 2>) -> Vec<Vec<f32>> {
    let [_, dim] = tensor.dims();
    if dim == 0 {
        return Vec::new();
    }
    let flat: Vec<f32> = tensor.into_data().iter::<f32>().collect();
    flat.chunks(dim).map(<[f32]>::to_vec).collect()
}

/// Extract a single f64 scalar from a burn 1D tensor.
///
/// # Panics
/// Panics if the tensor does not contain exactly one element.
pub fn tensor_to_f64<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    let val: f32 = tensor.into_scalar().elem();
    val as f64
}
