use crate::{Cell, CellKind};
use anyhow::{anyhow, Result};
use ulid::Ulid;

/// The ordered sequence of cells currently open.
///
/// Order is defined entirely by position in this container: there is no
/// stored index field anywhere, so document order can never desynchronize
/// from displayed order. All persistence and export paths serialize by
/// traversal.
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// Cells in canonical order; position is the order key
    cells: Vec<Cell>,

    /// At most one active cell, updated on user interaction
    active: Option<Ulid>,
}

impl Document {
    /// Create a new empty document
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Traverse cells in canonical order
    pub fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    /// Canonical order as ids, derived by traversal
    pub fn order(&self) -> Vec<Ulid> {
        self.cells.iter().map(|c| c.id()).collect()
    }

    pub fn get(&self, id: Ulid) -> Option<&Cell> {
        self.cells.iter().find(|c| c.id() == id)
    }

    pub fn get_mut(&mut self, id: Ulid) -> Option<&mut Cell> {
        self.cells.iter_mut().find(|c| c.id() == id)
    }

    pub fn index_of(&self, id: Ulid) -> Option<usize> {
        self.cells.iter().position(|c| c.id() == id)
    }

    // ========== Structural operations ==========

    /// Insert a cell after the reference cell, or append when the
    /// reference is `None`.
    pub fn insert_after(&mut self, reference: Option<Ulid>, cell: Cell) -> Result<()> {
        if self.index_of(cell.id()).is_some() {
            return Err(anyhow!("Duplicate cell id: {}", cell.id()));
        }
        match reference {
            Some(ref_id) => {
                let idx = self
                    .index_of(ref_id)
                    .ok_or_else(|| anyhow!("Reference cell not found: {}", ref_id))?;
                self.cells.insert(idx + 1, cell);
            }
            None => self.cells.push(cell),
        }
        Ok(())
    }

    /// Insert relative to the active cell when one exists, else append.
    /// The inserted cell becomes active.
    pub fn insert_after_active(&mut self, cell: Cell) -> Result<()> {
        let id = cell.id();
        let reference = self.active.filter(|a| self.index_of(*a).is_some());
        self.insert_after(reference, cell)?;
        self.active = Some(id);
        Ok(())
    }

    /// Remove a cell. Removing the last remaining cell is permitted here;
    /// the application layer re-seeds a blank cell when the "never empty
    /// at rest" invariant must hold.
    pub fn remove(&mut self, id: Ulid) -> Result<Cell> {
        let idx = self
            .index_of(id)
            .ok_or_else(|| anyhow!("Cell not found: {}", id))?;
        if self.active == Some(id) {
            self.active = None;
        }
        Ok(self.cells.remove(idx))
    }

    /// Move a cell immediately before the target. Moving a cell relative
    /// to itself or to a position it already occupies is a no-op.
    pub fn move_before(&mut self, id: Ulid, target: Ulid) -> Result<()> {
        self.relocate(id, target, true)
    }

    /// Move a cell immediately after the target.
    pub fn move_after(&mut self, id: Ulid, target: Ulid) -> Result<()> {
        self.relocate(id, target, false)
    }

    fn relocate(&mut self, id: Ulid, target: Ulid, before: bool) -> Result<()> {
        if id == target {
            return Ok(());
        }
        let from = self
            .index_of(id)
            .ok_or_else(|| anyhow!("Cell not found: {}", id))?;
        let to = self
            .index_of(target)
            .ok_or_else(|| anyhow!("Target cell not found: {}", target))?;

        let cell = self.cells.remove(from);
        // Removing the source shifts the target left when it sat above it
        let to = if from < to { to - 1 } else { to };
        let insert_at = if before { to } else { to + 1 };
        self.cells.insert(insert_at, cell);
        Ok(())
    }

    /// Swap the cell with its immediate predecessor. Returns false when it
    /// is already first.
    pub fn move_up(&mut self, id: Ulid) -> Result<bool> {
        let idx = self
            .index_of(id)
            .ok_or_else(|| anyhow!("Cell not found: {}", id))?;
        if idx == 0 {
            return Ok(false);
        }
        self.cells.swap(idx, idx - 1);
        Ok(true)
    }

    /// Swap the cell with its immediate successor. Returns false when it
    /// is already last.
    pub fn move_down(&mut self, id: Ulid) -> Result<bool> {
        let idx = self
            .index_of(id)
            .ok_or_else(|| anyhow!("Cell not found: {}", id))?;
        if idx + 1 >= self.cells.len() {
            return Ok(false);
        }
        self.cells.swap(idx, idx + 1);
        Ok(true)
    }

    /// Replace the whole sequence (load, import, restore). All-or-nothing:
    /// duplicate ids reject the batch and leave the document untouched.
    pub fn replace_all(&mut self, cells: Vec<Cell>) -> Result<()> {
        for (i, cell) in cells.iter().enumerate() {
            if cells[..i].iter().any(|c| c.id() == cell.id()) {
                return Err(anyhow!("Duplicate cell id in snapshot: {}", cell.id()));
            }
        }
        self.cells = cells;
        self.active = None;
        Ok(())
    }

    // ========== Active cell ==========

    pub fn active(&self) -> Option<Ulid> {
        self.active.filter(|id| self.index_of(*id).is_some())
    }

    pub fn set_active(&mut self, id: Ulid) {
        if self.index_of(id).is_some() {
            self.active = Some(id);
        }
    }

    pub fn clear_active(&mut self) {
        self.active = None;
    }

    /// Next code cell after the given one, in document order. Used by the
    /// run-and-advance shortcut.
    pub fn next_code_cell_after(&self, id: Ulid) -> Option<Ulid> {
        let idx = self.index_of(id)?;
        self.cells[idx + 1..]
            .iter()
            .find(|c| c.kind() == CellKind::Code)
            .map(|c| c.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CellKind;

    fn doc_with(kinds: &[CellKind]) -> (Document, Vec<Ulid>) {
        let mut doc = Document::new();
        let mut ids = Vec::new();
        for kind in kinds {
            let cell = Cell::new(*kind);
            ids.push(cell.id());
            doc.insert_after(None, cell).unwrap();
        }
        (doc, ids)
    }

    #[test]
    fn test_insert_after_none_appends() {
        let (doc, ids) = doc_with(&[CellKind::Code, CellKind::Markdown, CellKind::Graph]);
        assert_eq!(doc.order(), ids);
    }

    #[test]
    fn test_insert_after_reference() {
        let (mut doc, ids) = doc_with(&[CellKind::Code, CellKind::Code]);
        let cell = Cell::new(CellKind::Markdown);
        let new_id = cell.id();
        doc.insert_after(Some(ids[0]), cell).unwrap();
        assert_eq!(doc.order(), vec![ids[0], new_id, ids[1]]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let (mut doc, ids) = doc_with(&[CellKind::Code]);
        let dup = Cell::with_id(ids[0], CellKind::Markdown);
        assert!(doc.insert_after(None, dup).is_err());
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn test_remove_last_cell_yields_empty() {
        let (mut doc, ids) = doc_with(&[CellKind::Code]);
        doc.remove(ids[0]).unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn test_remove_clears_active() {
        let (mut doc, ids) = doc_with(&[CellKind::Code, CellKind::Code]);
        doc.set_active(ids[0]);
        doc.remove(ids[0]).unwrap();
        assert_eq!(doc.active(), None);
    }

    #[test]
    fn test_move_before_and_after() {
        let (mut doc, ids) = doc_with(&[CellKind::Code, CellKind::Code, CellKind::Code]);

        doc.move_before(ids[2], ids[0]).unwrap();
        assert_eq!(doc.order(), vec![ids[2], ids[0], ids[1]]);

        doc.move_after(ids[2], ids[1]).unwrap();
        assert_eq!(doc.order(), vec![ids[0], ids[1], ids[2]]);
    }

    #[test]
    fn test_move_relative_to_self_is_noop() {
        let (mut doc, ids) = doc_with(&[CellKind::Code, CellKind::Code]);
        doc.move_before(ids[1], ids[1]).unwrap();
        assert_eq!(doc.order(), ids);
        doc.move_after(ids[0], ids[0]).unwrap();
        assert_eq!(doc.order(), ids);
    }

    #[test]
    fn test_move_before_adjacent_successor_is_stable() {
        let (mut doc, ids) = doc_with(&[CellKind::Code, CellKind::Code]);
        // A is already directly before B
        doc.move_before(ids[0], ids[1]).unwrap();
        assert_eq!(doc.order(), ids);
    }

    #[test]
    fn test_move_up_down() {
        let (mut doc, ids) = doc_with(&[CellKind::Code, CellKind::Code]);
        assert!(!doc.move_up(ids[0]).unwrap());
        assert!(doc.move_down(ids[0]).unwrap());
        assert_eq!(doc.order(), vec![ids[1], ids[0]]);
        assert!(!doc.move_down(ids[0]).unwrap());
    }

    #[test]
    fn test_insert_after_active() {
        let (mut doc, ids) = doc_with(&[CellKind::Code, CellKind::Code]);
        doc.set_active(ids[0]);
        let cell = Cell::new(CellKind::Graph);
        let new_id = cell.id();
        doc.insert_after_active(cell).unwrap();
        assert_eq!(doc.order(), vec![ids[0], new_id, ids[1]]);
        assert_eq!(doc.active(), Some(new_id));
    }

    #[test]
    fn test_insert_after_active_appends_without_active() {
        let (mut doc, ids) = doc_with(&[CellKind::Code]);
        let cell = Cell::new(CellKind::Markdown);
        let new_id = cell.id();
        doc.insert_after_active(cell).unwrap();
        assert_eq!(doc.order(), vec![ids[0], new_id]);
    }

    #[test]
    fn test_replace_all_rejects_duplicates() {
        let (mut doc, ids) = doc_with(&[CellKind::Code]);
        let dup_id = Ulid::new();
        let batch = vec![
            Cell::with_id(dup_id, CellKind::Code),
            Cell::with_id(dup_id, CellKind::Markdown),
        ];
        assert!(doc.replace_all(batch).is_err());
        // Document untouched on rejection
        assert_eq!(doc.order(), ids);
    }

    #[test]
    fn test_next_code_cell_after() {
        let (mut doc, ids) = doc_with(&[CellKind::Code, CellKind::Markdown, CellKind::Code]);
        assert_eq!(doc.next_code_cell_after(ids[0]), Some(ids[2]));
        assert_eq!(doc.next_code_cell_after(ids[2]), None);
        doc.remove(ids[2]).unwrap();
        assert_eq!(doc.next_code_cell_after(ids[0]), None);
    }
}
