use crate::{CellKind, CellOutput, Document, NotebookError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ulid::Ulid;

/// Capacity of the transfer channel between the editor and the
/// presentation consumer
pub const TRANSFER_CAPACITY_BYTES: usize = 5 * 1024 * 1024;

/// One cell as handed to the presentation consumer: kind, content, and
/// the current rendered output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentationCell {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub output_is_error: bool,
}

impl PresentationCell {
    pub fn kind(&self) -> CellKind {
        CellKind::parse(&self.kind)
    }
}

/// The transfer payload: every non-hidden cell in document order, wrapped
/// with a capture timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresentationPayload {
    pub timestamp: DateTime<Utc>,
    pub cells: Vec<PresentationCell>,
}

impl PresentationPayload {
    /// Build the payload by traversal, excluding presentation-hidden
    /// cells
    pub fn capture(document: &Document, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            cells: document
                .iter()
                .filter(|cell| !cell.presentation_hidden)
                .map(|cell| PresentationCell {
                    id: cell.id().to_string(),
                    kind: cell.kind().as_str().to_string(),
                    content: cell.content.clone(),
                    output: cell.output.text.clone(),
                    output_is_error: cell.output.is_error,
                })
                .collect(),
        }
    }
}

/// Size-bounded hand-off between the editor and the presentation
/// consumer. Publishing serializes the payload and rejects it when it
/// exceeds capacity, before any consumer is opened; the consumer reads an
/// immutable blob.
#[derive(Debug)]
pub struct TransferChannel {
    capacity: usize,
    slot: Option<String>,
}

impl TransferChannel {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slot: None,
        }
    }

    /// Serialize and stage the payload. Over-capacity payloads fail with
    /// a capacity error; any other serialization failure is a generic
    /// validation failure. The slot is untouched on failure.
    pub fn publish(&mut self, payload: &PresentationPayload) -> Result<(), NotebookError> {
        let blob = serde_json::to_string(payload).map_err(|e| {
            NotebookError::Validation(format!("could not serialize presentation payload: {e}"))
        })?;
        if blob.len() > self.capacity {
            return Err(NotebookError::Capacity {
                size: blob.len(),
                capacity: self.capacity,
            });
        }
        self.slot = Some(blob);
        Ok(())
    }

    /// Consume the staged payload. A blob that fails validation is
    /// discarded and reads as absent.
    pub fn take(&mut self) -> Option<PresentationPayload> {
        let blob = self.slot.take()?;
        match serde_json::from_str(&blob) {
            Ok(payload) => Some(payload),
            Err(err) => {
                log::warn!("Discarding invalid presentation payload: {err}");
                None
            }
        }
    }

    pub fn is_staged(&self) -> bool {
        self.slot.is_some()
    }
}

impl Default for TransferChannel {
    fn default() -> Self {
        Self::new(TRANSFER_CAPACITY_BYTES)
    }
}

/// The presentation consumer's view: one cell per slide, in captured
/// order, with strictly linear navigation that never wraps. The deck
/// treats the payload as immutable; lazily executed code outputs are
/// cached here and never written back into the editor document.
#[derive(Debug)]
pub struct PresentationDeck {
    cells: Vec<PresentationCell>,
    index: usize,
    run_cache: HashMap<Ulid, CellOutput>,
}

impl PresentationDeck {
    pub fn from_payload(payload: PresentationPayload) -> Self {
        Self {
            cells: payload.cells,
            index: 0,
            run_cache: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn current(&self) -> Option<&PresentationCell> {
        self.cells.get(self.index)
    }

    /// 1-based slide position, `(0, 0)` for an empty deck
    pub fn position(&self) -> (usize, usize) {
        if self.cells.is_empty() {
            (0, 0)
        } else {
            (self.index + 1, self.cells.len())
        }
    }

    /// Advance one slide; never wraps
    pub fn next(&mut self) -> bool {
        if self.index + 1 < self.cells.len() {
            self.index += 1;
            true
        } else {
            false
        }
    }

    /// Go back one slide; never wraps
    pub fn prev(&mut self) -> bool {
        if self.index > 0 {
            self.index -= 1;
            true
        } else {
            false
        }
    }

    /// Whether the current slide is a code cell whose output must be
    /// fetched lazily through the execution contract
    pub fn current_needs_execution(&self) -> Option<(Ulid, String)> {
        let cell = self.current()?;
        if cell.kind() != CellKind::Code || !cell.output.trim().is_empty() {
            return None;
        }
        let id = Ulid::from_string(&cell.id).ok()?;
        if self.run_cache.contains_key(&id) {
            return None;
        }
        Some((id, cell.content.clone()))
    }

    /// Cache a lazily fetched output, deck-local only
    pub fn cache_output(&mut self, cell_id: Ulid, output: CellOutput) {
        self.run_cache.insert(cell_id, output);
    }

    /// Output to show for the current slide: the captured one, or the
    /// deck-local cache for lazily executed code
    pub fn current_output(&self) -> Option<CellOutput> {
        let cell = self.current()?;
        if !cell.output.trim().is_empty() {
            return Some(CellOutput {
                text: cell.output.clone(),
                is_error: cell.output_is_error,
            });
        }
        let id = Ulid::from_string(&cell.id).ok()?;
        self.run_cache.get(&id).cloned()
    }
}
