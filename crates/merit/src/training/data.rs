//! Graph data loading for MERIT training.
//!
//! A graph file is JSON with an undirected edge list and one feature row per
//! node:
//!
//! ```json
//! { "num_nodes": 3, "edges": [[0, 1], [1, 2]], "features": [[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]] }
//! ```
//!
//! Everything here works on plain `Vec`s; conversion to burn tensors happens
//! in [`crate::model::bridge`].

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

/// An undirected attributed graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    /// Number of nodes; node ids are `0..num_nodes`.
    pub num_nodes: usize,
    /// Undirected edges. Self-loops and duplicates are tolerated.
    pub edges: Vec<(usize, usize)>,
    /// One feature row per node, all of the same width.
    pub features: Vec<Vec<f32>>,
}

/// Summary statistics printed by `merit summary`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphSummary {
    pub num_nodes: usize,
    pub num_edges: usize,
    pub feature_dim: usize,
    pub isolated_nodes: usize,
    pub mean_degree: f64,
}

impl GraphData {
    /// Load and validate a graph from a JSON file.
    pub fn from_json(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| anyhow::anyhow!("Failed to open graph file {}: {e}", path.display()))?;
        let graph: GraphData = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| anyhow::anyhow!("Failed to parse graph file {}: {e}", path.display()))?;
        graph.validate()?;
        tracing::info!(
            path = %path.display(),
            nodes = graph.num_nodes,
            edges = graph.edges.len(),
            feature_dim = graph.feature_dim(),
            "Loaded graph"
        );
        Ok(graph)
    }

    /// Check node count, feature widths and edge endpoints.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.num_nodes == 0 {
            anyhow::bail!("graph has no nodes");
        }
        if self.features.len() != self.num_nodes {
            anyhow::bail!(
                "expected {} feature rows, got {}",
                self.num_nodes,
                self.features.len()
            );
        }
        let dim = self.feature_dim();
        if dim == 0 {
            anyhow::bail!("feature dimension must be > 0");
        }
        if let Some((i, row)) = self.features.iter().enumerate().find(|(_, r)| r.len() != dim) {
            anyhow::bail!("feature row {i} has length {}, expected {dim}", row.len());
        }
        if let Some(&(u, v)) = self
            .edges
            .iter()
            .find(|&&(u, v)| u >= self.num_nodes || v >= self.num_nodes)
        {
            anyhow::bail!("edge ({u}, {v}) out of range for {} nodes", self.num_nodes);
        }
        Ok(())
    }

    /// Width of the feature rows (0 for an empty graph).
    pub fn feature_dim(&self) -> usize {
        self.features.first().map_or(0, Vec::len)
    }

    /// Subgraph induced by `nodes`, relabelled `0..nodes.len()` in the given order.
    pub fn induced_subgraph(&self, nodes: &[usize]) -> GraphData {
        let position: HashMap<usize, usize> =
            nodes.iter().enumerate().map(|(i, &n)| (n, i)).collect();
        let edges = self
            .edges
            .iter()
            .filter_map(|&(u, v)| Some((*position.get(&u)?, *position.get(&v)?)))
            .collect();
        let features = nodes.iter().map(|&n| self.features[n].clone()).collect();
        GraphData {
            num_nodes: nodes.len(),
            edges,
            features,
        }
    }

    /// Symmetric 0/1 adjacency, row-major `num_nodes × num_nodes`, no self-loops added.
    pub fn dense_adjacency(&self) -> Vec<f32> {
        let n = self.num_nodes;
        let mut adjacency = vec![0.0_f32; n * n];
        for &(u, v) in &self.edges {
            adjacency[u * n + v] = 1.0;
            adjacency[v * n + u] = 1.0;
        }
        adjacency
    }

    /// Features flattened row-major, `num_nodes × feature_dim`.
    pub fn flat_features(&self) -> Vec<f32> {
        self.features.iter().flat_map(|row| row.iter().copied()).collect()
    }

    pub fn summary(&self) -> GraphSummary {
        let mut unique: HashSet<(usize, usize)> = HashSet::new();
        for &(u, v) in &self.edges {
            if u != v {
                unique.insert((u.min(v), u.max(v)));
            }
        }
        let mut degree = vec![0_usize; self.num_nodes];
        for &(u, v) in &unique {
            degree[u] += 1;
            degree[v] += 1;
        }
        let isolated_nodes = degree.iter().filter(|&&d| d == 0).count();
        let mean_degree = if self.num_nodes > 0 {
            degree.iter().sum::<usize>() as f64 / self.num_nodes as f64
        } else {
            0.0
        };
        GraphSummary {
            num_nodes: self.num_nodes,
            num_edges: unique.len(),
            feature_dim: self.feature_dim(),
            isolated_nodes,
            mean_degree,
        }
    }
}

/// Symmetric GCN normalisation `D^-1/2 (A + I) D^-1/2` of a dense `n × n` matrix.
///
/// Existing diagonal entries are replaced by the self-loop, so the result
/// does not depend on whether `A` already had self-loops.
pub fn normalize_adjacency(adjacency: &[f32], n: usize) -> Vec<f32> {
    assert_eq!(adjacency.len(), n * n, "adjacency must be {n}x{n}");
    let mut a = adjacency.to_vec();
    for i in 0..n {
        a[i * n + i] = 1.0;
    }
    let inv_sqrt_degree: Vec<f32> = (0..n)
        .map(|i| {
            let d: f32 = a[i * n..(i + 1) * n].iter().sum();
            1.0 / d.sqrt()
        })
        .collect();
    for i in 0..n {
        for j in 0..n {
            a[i * n + j] *= inv_sqrt_degree[i] * inv_sqrt_degree[j];
        }
    }
    a
}
