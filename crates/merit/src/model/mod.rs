//! MERIT model components: the MLP block, the GNN collaborator trait and
//! default GCN, the projecting graph encoder, the EMA parameter
//! synchronizer, the tensor bridge, and the dual-network objective.

pub mod bridge;
pub mod ema;
pub mod encoder;
pub mod gnn;
pub mod merit;
pub mod mlp;
