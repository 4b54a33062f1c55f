/// Errors raised by the MERIT objective and its parameter synchronizer.
#[derive(Debug, thiserror::Error)]
pub enum MeritError {
    /// The target encoder was released by `reset_moving_average` (or never built).
    #[error("target encoder not initialized")]
    TargetNotInitialized,

    /// Target and online modules expose a different number of parameters.
    #[error("parameter count mismatch: target has {target_len}, online has {online_len}")]
    ParameterCountMismatch { target_len: usize, online_len: usize },

    /// Parameter at `index` (visiting order) has different shapes in target and online.
    #[error("shape mismatch at parameter {index}: target {target_shape:?}, online {online_shape:?}")]
    ShapeMismatch {
        index: usize,
        target_shape: Vec<usize>,
        online_shape: Vec<usize>,
    },

    /// Contrastive terms need at least two rows to have any negatives.
    #[error("degenerate batch: {rows} embedding row(s), need at least 2")]
    DegenerateBatch { rows: usize },

    /// The two views do not yield the same number of embedding rows.
    #[error("view mismatch: view 1 has {rows_1} row(s), view 2 has {rows_2}")]
    ViewMismatch { rows_1: usize, rows_2: usize },

    /// Hyperparameter outside its valid range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
