//! MERIT: self-supervised graph representation learning.
//!
//! An online graph encoder and predictor are trained against an
//! exponential-moving-average (EMA) target encoder with two contrastive
//! terms: cross-view (online prediction of one augmented view against the
//! other) and cross-network (online embedding against the target embedding of
//! the other view), blended by `beta`.
//!
//! The graph neural network itself is a collaborator behind the
//! [`model::gnn::GraphNeuralNetwork`] trait; [`model::gnn::Gcn`] is the
//! default one-layer GCN.

pub mod error;
pub mod mocks;
pub mod model;
pub mod training;

pub use error::MeritError;
pub use model::merit::{Merit, MeritConfig, OnlineNetwork};
