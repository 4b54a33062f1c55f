//! Exponential moving average of module parameters.
//!
//! [`EmaUpdater`] is the scalar rule; [`update_moving_average`] applies it
//! pairwise over two structurally identical burn modules. Pairing follows
//! the module visiting order, so both modules must be the same type built
//! from the same configuration. Count and shape agreement is checked before
//! any value is written.

use burn::module::{Module, ModuleMapper, ModuleVisitor, ParamId};
use burn::prelude::*;

use crate::error::MeritError;

/// EMA rule with an immutable decay coefficient in `[0, 1]`.
///
/// `update_average(old, new) = old * decay + (1 - decay) * new`, or `new`
/// when there is no previous value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmaUpdater {
    decay: f64,
}

impl EmaUpdater {
    /// The caller is responsible for `decay ∈ [0, 1]`; see `MeritConfig::init`.
    pub fn new(decay: f64) -> Self {
        Self { decay }
    }

    pub fn decay(&self) -> f64 {
        self.decay
    }

    pub fn update_average<B: Backend, const D: usize>(
        &self,
        old: Option<Tensor<B, D>>,
        new: Tensor<B, D>,
    ) -> Tensor<B, D> {
        match old {
            None => new,
            Some(old) => old.mul_scalar(self.decay) + new.mul_scalar(1.0 - self.decay),
        }
    }
}

/// One float tensor of a module, flattened, with its original shape.
#[derive(Debug, Clone)]
pub struct ParameterSnapshot<B: Backend> {
    pub shape: Vec<usize>,
    pub values: Tensor<B, 1>,
}

struct SnapshotCollector<B: Backend> {
    snapshots: Vec<ParameterSnapshot<B>>,
}

impl<B: Backend> ModuleVisitor<B> for SnapshotCollector<B> {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        let shape = tensor.dims().to_vec();
        let numel = shape.iter().product::<usize>();
        self.snapshots.push(ParameterSnapshot {
            shape,
            values: tensor.clone().detach().reshape([numel]),
        });
    }
}

struct ShapeCollector {
    shapes: Vec<Vec<usize>>,
}

impl<B: Backend> ModuleVisitor<B> for ShapeCollector {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        self.shapes.push(tensor.dims().to_vec());
    }
}

#[derive(Debug, Clone, Copy)]
enum SyncMode {
    Copy,
    Average,
}

struct SyncMapper<B: Backend> {
    ema: EmaUpdater,
    mode: SyncMode,
    sources: std::vec::IntoIter<ParameterSnapshot<B>>,
}

impl<B: Backend> ModuleMapper<B> for SyncMapper<B> {
    fn map_float<const D: usize>(&mut self, _id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        // Counts were checked up front; running out here cannot happen.
        let Some(source) = self.sources.next() else {
            return tensor;
        };
        let new: Tensor<B, D> = source.values.reshape(tensor.dims());
        let old = match self.mode {
            SyncMode::Copy => None,
            SyncMode::Average => Some(tensor.detach()),
        };
        self.ema.update_average(old, new)
    }
}

/// Detached, flattened copies of every float tensor of `module`, in visiting order.
pub fn collect_parameters<B: Backend, M: Module<B>>(module: &M) -> Vec<ParameterSnapshot<B>> {
    let mut collector = SnapshotCollector { snapshots: Vec::new() };
    module.visit(&mut collector);
    collector.snapshots
}

/// Snapshot `online` after checking it mirrors `target` position by position.
fn mirrored_sources<B: Backend, M: Module<B>>(
    target: &M,
    online: &M,
) -> Result<Vec<ParameterSnapshot<B>>, MeritError> {
    let mut shapes = ShapeCollector { shapes: Vec::new() };
    target.visit(&mut shapes);
    let sources = collect_parameters(online);

    if shapes.shapes.len() != sources.len() {
        return Err(MeritError::ParameterCountMismatch {
            target_len: shapes.shapes.len(),
            online_len: sources.len(),
        });
    }
    for (index, (target_shape, source)) in shapes.shapes.iter().zip(&sources).enumerate() {
        if *target_shape != source.shape {
            return Err(MeritError::ShapeMismatch {
                index,
                target_shape: target_shape.clone(),
                online_shape: source.shape.clone(),
            });
        }
    }
    Ok(sources)
}

/// Move every parameter of `target` toward its counterpart in `online`
/// using `ema`. `online` is only read.
///
/// "Every parameter" means every float tensor the module exposes to a
/// visitor, buffers included: batch-norm running mean and variance are
/// averaged as well, rather than left to evolve from the target's own
/// forward passes as a trainable-parameters-only EMA would.
pub fn update_moving_average<B: Backend, M: Module<B>>(
    ema: &EmaUpdater,
    target: M,
    online: &M,
) -> Result<M, MeritError> {
    let sources = mirrored_sources(&target, online)?;
    Ok(target.map(&mut SyncMapper {
        ema: *ema,
        mode: SyncMode::Average,
        sources: sources.into_iter(),
    }))
}

/// Overwrite every parameter of `target` with the value from `online`
/// (the EMA rule with no previous value). Parameter ids of `target` are kept.
pub fn copy_parameters<B: Backend, M: Module<B>>(target: M, online: &M) -> Result<M, MeritError> {
    let sources = mirrored_sources(&target, online)?;
    Ok(target.map(&mut SyncMapper {
        ema: EmaUpdater::new(0.0),
        mode: SyncMode::Copy,
        sources: sources.into_iter(),
    }))
}

/// Mean absolute element-wise difference between two mirrored modules.
pub fn parameter_distance<B: Backend, M: Module<B>>(a: &M, b: &M) -> Result<f64, MeritError> {
    let sources = mirrored_sources(a, b)?;
    let mut total = 0.0_f64;
    let mut count = 0_usize;
    for (left, right) in collect_parameters(a).into_iter().zip(sources) {
        count += left.shape.iter().product::<usize>();
        let sum: f64 = (left.values - right.values).abs().sum().into_scalar().elem();
        total += sum;
    }
    Ok(if count == 0 { 0.0 } else { total / count as f64 })
}
