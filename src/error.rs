use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeldsparError {
    #[error("Dimension error: {0}")]
    InvalidDimensions(String),

    #[error("Element error: degenerate triangle with area {area}")]
    DegenerateElement { area: f64 },

    #[error("Solver error: zero pivot in column {pivot}")]
    ZeroPivot { pivot: usize },

    #[error("Solver error: row {row} reduced to zeros, system has infinitely many solutions")]
    UnderdeterminedSystem { row: usize },

    #[error("Solver error: row {row} has a zero diagonal and nonzero residual, system has no solution")]
    InconsistentSystem { row: usize },

    #[error("Graph error: node handle no longer refers to a live node")]
    StaleNode,

    #[error("Selection error: {0}")]
    InvalidSelection(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("LEB error: {0}")]
    Leb(String),

    #[error("Post Processor error: {0}")]
    PostProcessor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FeldsparError {
    /// Whether this error only aborts the current solver tick.
    ///
    /// These come from the geometry or constraints of the model at the time
    /// of the tick; the next tick may succeed once either changes.
    pub fn is_solver_failure(&self) -> bool {
        matches!(
            self,
            FeldsparError::DegenerateElement { .. }
                | FeldsparError::ZeroPivot { .. }
                | FeldsparError::UnderdeterminedSystem { .. }
                | FeldsparError::InconsistentSystem { .. }
        )
    }
}
