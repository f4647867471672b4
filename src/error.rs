use thiserror::Error;

/// Failure classes surfaced by the notebook core.
///
/// Every operation boundary maps its failures into one of these; none of
/// them is fatal to the process.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotebookError {
    /// Malformed markup/graph input or an unreachable image source.
    /// Shown verbatim in the offending cell's output, never propagated.
    #[error("Render Error: {0}")]
    Render(String),

    /// The remote execution service reported a logical failure.
    #[error("Execution Error: {0}")]
    Execution(String),

    /// Network or HTTP failure reaching the execution or persistence
    /// backend.
    #[error("{0}")]
    Transport(String),

    /// A snapshot (import, restore, transfer payload) did not have the
    /// required shape. The document is left untouched.
    #[error("Invalid snapshot: {0}")]
    Validation(String),

    /// The presentation payload exceeds the transfer channel capacity.
    #[error("Presentation payload too large: {size} bytes exceeds capacity of {capacity} bytes")]
    Capacity { size: usize, capacity: usize },
}

impl NotebookError {
    /// Whether this failure should be styled as an error in a cell's
    /// output region.
    pub fn is_cell_local(&self) -> bool {
        matches!(
            self,
            NotebookError::Render(_) | NotebookError::Execution(_) | NotebookError::Transport(_)
        )
    }
}
