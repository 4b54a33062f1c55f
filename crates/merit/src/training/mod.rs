//! MERIT training pipeline: graph data, view augmentation, contrastive
//! losses, metrics with health checks, and the AdamW training loop.

pub mod augment;
pub mod data;
pub mod loss;
pub mod metrics;
pub mod trainer;
