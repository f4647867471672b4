// Notebook Cell Editor - Core Library

pub mod autosave;
pub mod backend;
pub mod cell;
pub mod document;
pub mod error;
pub mod execution;
pub mod logging;
pub mod present;
pub mod render;
pub mod reorder;
pub mod snapshot;
pub mod ui;

// Re-export main types for convenience
pub use autosave::{AutosaveStore, Debouncer, AUTOSAVE_DEBOUNCE};
pub use backend::NotebookApi;
pub use cell::{Cell, CellKind, CellOutput};
pub use document::Document;
pub use error::NotebookError;
pub use execution::{
    compose_output, ExecutionClient, ExecutionOutcome, ExecutionPool, ExecutionRequest,
    ExecutionResponse, ExecutionTarget,
};
pub use present::{
    PresentationCell, PresentationDeck, PresentationPayload, TransferChannel,
    TRANSFER_CAPACITY_BYTES,
};
pub use reorder::{drop_side, DragController, DragOutcome, DropSide};
pub use snapshot::AutosaveSnapshot;
pub use ui::NotebookApp;
