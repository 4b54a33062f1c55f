//! Stochastic graph views for contrastive training.
//!
//! Each training step samples one node subset and builds two views of the
//! induced subgraph from it, so row `i` of both views is the same node.
//! Views differ by edge modification (drop a fraction of edges, add the same
//! number of random ones) and by masking whole feature columns.

use burn::prelude::*;
use rand::seq::index;
use rand::Rng;

use crate::training::data::{normalize_adjacency, GraphData};

/// Configuration for view generation.
#[derive(Config, Debug)]
pub struct AugmentationConfig {
    /// Nodes sampled per step (the whole graph if it is smaller).
    #[config(default = 2000)]
    pub sample_size: usize,
    /// Fraction of edges dropped and re-added at random, per view.
    #[config(default = 0.2)]
    pub edge_modification_rate: f64,
    /// Fraction of feature columns zeroed, per view.
    #[config(default = 0.2)]
    pub feature_mask_rate: f64,
}

impl AugmentationConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sample_size < 2 {
            anyhow::bail!("sample_size must be >= 2, got {}", self.sample_size);
        }
        for (name, rate) in [
            ("edge_modification_rate", self.edge_modification_rate),
            ("feature_mask_rate", self.feature_mask_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                anyhow::bail!("{name} must be in [0, 1], got {rate}");
            }
        }
        Ok(())
    }
}

/// One dense view of a (sub)graph, ready for the tensor bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphView {
    pub num_nodes: usize,
    pub feature_dim: usize,
    /// GCN-normalised adjacency, row-major `num_nodes × num_nodes`.
    pub adjacency: Vec<f32>,
    /// Row-major `num_nodes × feature_dim`.
    pub features: Vec<f32>,
}

impl GraphView {
    /// Unaugmented view of the whole graph.
    pub fn from_graph(graph: &GraphData) -> Self {
        Self {
            num_nodes: graph.num_nodes,
            feature_dim: graph.feature_dim(),
            adjacency: normalize_adjacency(&graph.dense_adjacency(), graph.num_nodes),
            features: graph.flat_features(),
        }
    }
}

/// Sample `sample_size` distinct node ids, or every node in order if the graph is smaller.
pub fn sample_nodes(num_nodes: usize, sample_size: usize, rng: &mut impl Rng) -> Vec<usize> {
    if sample_size >= num_nodes {
        return (0..num_nodes).collect();
    }
    index::sample(rng, num_nodes, sample_size).into_vec()
}

/// Drop each edge with probability `rate`, then add as many uniformly random
/// non-loop edges as were dropped.
pub fn modify_edges(
    edges: &[(usize, usize)],
    num_nodes: usize,
    rate: f64,
    rng: &mut impl Rng,
) -> Vec<(usize, usize)> {
    let mut kept: Vec<(usize, usize)> = edges
        .iter()
        .copied()
        .filter(|_| rng.gen::<f64>() >= rate)
        .collect();
    let dropped = edges.len() - kept.len();
    if num_nodes >= 2 {
        for _ in 0..dropped {
            let u = rng.gen_range(0..num_nodes);
            let mut v = rng.gen_range(0..num_nodes - 1);
            if v >= u {
                v += 1;
            }
            kept.push((u, v));
        }
    }
    kept
}

/// Zero `floor(rate * dim)` randomly chosen feature columns across all nodes.
pub fn mask_feature_columns(features: &[Vec<f32>], rate: f64, rng: &mut impl Rng) -> Vec<Vec<f32>> {
    let dim = features.first().map_or(0, Vec::len);
    let n_masked = ((dim as f64) * rate).floor() as usize;
    let masked = index::sample(rng, dim, n_masked.min(dim)).into_vec();

    let mut out = features.to_vec();
    for row in &mut out {
        for &c in &masked {
            row[c] = 0.0;
        }
    }
    out
}

/// One augmented view of `graph`.
pub fn augment_view(graph: &GraphData, config: &AugmentationConfig, rng: &mut impl Rng) -> GraphView {
    let augmented = GraphData {
        num_nodes: graph.num_nodes,
        edges: modify_edges(&graph.edges, graph.num_nodes, config.edge_modification_rate, rng),
        features: mask_feature_columns(&graph.features, config.feature_mask_rate, rng),
    };
    GraphView::from_graph(&augmented)
}

/// Two independently augmented views over one shared node sample.
pub fn augmented_pair(
    graph: &GraphData,
    config: &AugmentationConfig,
    rng: &mut impl Rng,
) -> (GraphView, GraphView) {
    let nodes = sample_nodes(graph.num_nodes, config.sample_size, rng);
    let subgraph = graph.induced_subgraph(&nodes);
    let view_1 = augment_view(&subgraph, config, rng);
    let view_2 = augment_view(&subgraph, config, rng);
    (view_1, view_2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ring(n: usize, dim: usize) -> GraphData {
        GraphData {
            num_nodes: n,
            edges: (0..n).map(|i| (i, (i + 1) % n)).collect(),
            features: (0..n)
                .map(|i| (0..dim).map(|j| (i * dim + j) as f32 + 1.0).collect())
                .collect(),
        }
    }

    #[test]
    fn test_sample_nodes_distinct_and_bounded() {
        let mut rng = StdRng::seed_from_u64(7);
        let nodes = sample_nodes(100, 30, &mut rng);
        assert_eq!(nodes.len(), 30);
        let mut sorted = nodes.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 30);
        assert!(nodes.iter().all(|&n| n < 100));

        assert_eq!(sample_nodes(5, 30, &mut rng), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_modify_edges_preserves_count() {
        let mut rng = StdRng::seed_from_u64(3);
        let g = ring(50, 2);
        let modified = modify_edges(&g.edges, g.num_nodes, 0.3, &mut rng);
        assert_eq!(modified.len(), g.edges.len());
        assert!(modified.iter().all(|&(u, v)| u != v && u < 50 && v < 50));
        assert_ne!(modified, g.edges);

        let untouched = modify_edges(&g.edges, g.num_nodes, 0.0, &mut rng);
        assert_eq!(untouched, g.edges);
    }

    #[test]
    fn test_mask_feature_columns() {
        let mut rng = StdRng::seed_from_u64(11);
        let g = ring(6, 10);
        let masked = mask_feature_columns(&g.features, 0.3, &mut rng);

        let zero_columns: Vec<usize> = (0..10)
            .filter(|&c| masked.iter().all(|row| row[c] == 0.0))
            .collect();
        assert_eq!(zero_columns.len(), 3);
        for (row, original) in masked.iter().zip(&g.features) {
            for c in 0..10 {
                if !zero_columns.contains(&c) {
                    assert_eq!(row[c], original[c]);
                }
            }
        }
    }

    #[test]
    fn test_augmented_pair_shares_nodes() {
        let mut rng = StdRng::seed_from_u64(5);
        let g = ring(40, 4);
        let config = AugmentationConfig::new()
            .with_sample_size(12)
            .with_feature_mask_rate(0.0)
            .with_edge_modification_rate(0.5);

        let (a, b) = augmented_pair(&g, &config, &mut rng);
        assert_eq!(a.num_nodes, 12);
        assert_eq!(b.num_nodes, 12);
        assert_eq!(a.adjacency.len(), 144);
        // Without feature masking both views carry the same node rows.
        assert_eq!(a.features, b.features);
    }

    #[test]
    fn test_validate() {
        assert!(AugmentationConfig::new().validate().is_ok());
        assert!(AugmentationConfig::new().with_feature_mask_rate(1.5).validate().is_err());
        assert!(AugmentationConfig::new().with_sample_size(1).validate().is_err());
    }
}
