use chrono::Utc;
use notebook_cell_editor::{
    compose_output, snapshot, AutosaveSnapshot, AutosaveStore, Cell, CellKind, CellOutput,
    Debouncer, Document, DragController, DragOutcome, DropSide, ExecutionResponse,
    PresentationDeck, PresentationPayload, TransferChannel,
};
use proptest::prelude::*;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use ulid::Ulid;

fn cell(kind: CellKind, content: &str) -> Cell {
    Cell::with_content(kind, content)
}

#[test]
fn presentation_excludes_hidden_and_keeps_relative_order() {
    // [A:code, B:markdown(hidden), C:graph] -> slides [A, C]
    let mut doc = Document::new();
    let a = cell(CellKind::Code, "print(1)");
    let mut b = cell(CellKind::Markdown, "# b");
    b.presentation_hidden = true;
    let c = cell(CellKind::Graph, "digraph G { A->B }");
    let (a_id, c_id) = (a.id(), c.id());
    doc.insert_after(None, a).unwrap();
    doc.insert_after(None, b).unwrap();
    doc.insert_after(None, c).unwrap();

    let payload = PresentationPayload::capture(&doc, Utc::now());
    let mut channel = TransferChannel::default();
    channel.publish(&payload).unwrap();
    let mut deck = PresentationDeck::from_payload(channel.take().unwrap());

    assert_eq!(deck.len(), 2);
    assert_eq!(deck.current().unwrap().id, a_id.to_string());
    assert!(deck.next());
    assert_eq!(deck.current().unwrap().id, c_id.to_string());
    assert!(!deck.next());
}

#[test]
fn execution_output_composition_matches_contract() {
    let response: ExecutionResponse =
        serde_json::from_str(r#"{"stdout": "5\n", "error": "boom"}"#).unwrap();
    let out = compose_output(&response);
    assert_eq!(out.text, "5\n\n[error]\nboom\n");
    assert!(out.is_error);
}

#[test]
fn drop_side_decides_final_order() {
    let mut doc = Document::new();
    let x = cell(CellKind::Code, "x");
    let y = cell(CellKind::Code, "y");
    let z = cell(CellKind::Code, "z");
    let (x_id, y_id) = (x.id(), y.id());
    doc.insert_after(None, y).unwrap();
    doc.insert_after(None, z).unwrap();
    doc.insert_after(None, x).unwrap();

    // Pointer above Y's midpoint: X lands before Y
    let mut drag = DragController::new();
    drag.begin(x_id);
    let side = notebook_cell_editor::drop_side(110.0, 100.0, 50.0);
    assert_eq!(side, DropSide::Before);
    assert_eq!(drag.drop_on(&mut doc, y_id, side), DragOutcome::Moved);
    assert_eq!(doc.order()[0], x_id);
    assert_eq!(doc.order()[1], y_id);

    // Pointer below the midpoint: X lands after Y
    let mut drag = DragController::new();
    drag.begin(x_id);
    let side = notebook_cell_editor::drop_side(140.0, 100.0, 50.0);
    assert_eq!(side, DropSide::After);
    assert_eq!(drag.drop_on(&mut doc, y_id, side), DragOutcome::Moved);
    assert_eq!(doc.order()[0], y_id);
    assert_eq!(doc.order()[1], x_id);
}

#[test]
fn burst_of_edits_produces_one_autosave_write() {
    let dir = TempDir::new().unwrap();
    let store = AutosaveStore::at(dir.path().join("autosave.json"));
    let mut debouncer = Debouncer::new(Duration::from_millis(400));
    let mut doc = Document::new();
    doc.insert_after(None, cell(CellKind::Code, "")).unwrap();
    let id = doc.order()[0];

    let t0 = Instant::now();
    let mut writes = 0;
    for (i, tick) in (0..10).zip(0u64..) {
        doc.get_mut(id).unwrap().set_content(format!("edit {i}"));
        debouncer.schedule(t0 + Duration::from_millis(tick * 20));
        if debouncer.fire_due(t0 + Duration::from_millis(tick * 20)) {
            writes += 1;
        }
    }
    // The window elapses once after the burst
    if debouncer.fire_due(t0 + Duration::from_millis(180 + 401)) {
        store
            .write(&AutosaveSnapshot::capture(&doc, Utc::now()))
            .unwrap();
        writes += 1;
    }
    assert_eq!(writes, 1);

    // The single write reflects the final state
    let loaded = store.read().unwrap();
    assert_eq!(loaded.cells[0].content, "edit 9");
}

#[test]
fn rejected_import_leaves_document_unchanged() {
    let mut doc = Document::new();
    doc.insert_after(None, cell(CellKind::Code, "keep me")).unwrap();
    let before: Vec<Cell> = doc.iter().cloned().collect();

    let err = snapshot::parse_interchange(r#"{"exported_at": "2024-01-01T00:00:00Z"}"#);
    assert!(err.is_err());

    let after: Vec<Cell> = doc.iter().cloned().collect();
    assert_eq!(before, after);
}

#[test]
fn autosave_restore_round_trip_through_store() {
    let dir = TempDir::new().unwrap();
    let store = AutosaveStore::at(dir.path().join("autosave.json"));

    let mut doc = Document::new();
    let mut md = cell(CellKind::Markdown, "# hello");
    md.presentation_hidden = true;
    doc.insert_after(None, cell(CellKind::Code, "a = 1")).unwrap();
    doc.insert_after(None, md).unwrap();

    store
        .write(&AutosaveSnapshot::capture(&doc, Utc::now()))
        .unwrap();

    let mut restored = Document::new();
    restored
        .replace_all(store.read().unwrap().into_cells())
        .unwrap();
    assert_eq!(restored.order(), doc.order());
    assert!(restored.iter().nth(1).unwrap().presentation_hidden);
}

#[test]
fn saved_notebook_round_trip_preserves_outputs() {
    let mut doc = Document::new();
    let mut code = cell(CellKind::Code, "print(5)");
    code.set_output(CellOutput::ok("5\n"));
    doc.insert_after(None, code).unwrap();

    let wire = serde_json::to_string(&snapshot::saved_cells(&doc)).unwrap();
    let parsed: Vec<snapshot::SavedCell> = serde_json::from_str(&wire).unwrap();
    let cells = snapshot::cells_from_saved(parsed);
    assert_eq!(cells[0].output.text, "5\n");
    assert_eq!(cells[0].content, "print(5)");
}

// ========== Ordering property ==========

#[derive(Debug, Clone)]
enum Op {
    InsertAfter(usize),
    Append,
    Remove(usize),
    MoveBefore(usize, usize),
    MoveAfter(usize, usize),
    MoveUp(usize),
    MoveDown(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..16usize).prop_map(Op::InsertAfter),
        Just(Op::Append),
        (0..16usize).prop_map(Op::Remove),
        (0..16usize, 0..16usize).prop_map(|(a, b)| Op::MoveBefore(a, b)),
        (0..16usize, 0..16usize).prop_map(|(a, b)| Op::MoveAfter(a, b)),
        (0..16usize).prop_map(Op::MoveUp),
        (0..16usize).prop_map(Op::MoveDown),
    ]
}

/// Mirror of the container semantics over plain ids
fn model_move(model: &mut Vec<Ulid>, source: Ulid, target: Ulid, before: bool) {
    if source == target {
        return;
    }
    let from = model.iter().position(|id| *id == source).unwrap();
    model.remove(from);
    let to = model.iter().position(|id| *id == target).unwrap();
    model.insert(if before { to } else { to + 1 }, source);
}

proptest! {
    /// For all insert/move/delete sequences, traversal reflects exactly
    /// the surviving cells in the order implied by the operations.
    #[test]
    fn traversal_always_matches_operation_order(
        ops in proptest::collection::vec(op_strategy(), 0..48)
    ) {
        let mut doc = Document::new();
        let mut model: Vec<Ulid> = Vec::new();

        for op in ops {
            match op {
                Op::InsertAfter(i) => {
                    let new = Cell::new(CellKind::Code);
                    let id = new.id();
                    if model.is_empty() {
                        doc.insert_after(None, new).unwrap();
                        model.push(id);
                    } else {
                        let i = i % model.len();
                        doc.insert_after(Some(model[i]), new).unwrap();
                        model.insert(i + 1, id);
                    }
                }
                Op::Append => {
                    let new = Cell::new(CellKind::Code);
                    let id = new.id();
                    doc.insert_after(None, new).unwrap();
                    model.push(id);
                }
                Op::Remove(i) => {
                    if !model.is_empty() {
                        let i = i % model.len();
                        doc.remove(model[i]).unwrap();
                        model.remove(i);
                    }
                }
                Op::MoveBefore(a, b) => {
                    if !model.is_empty() {
                        let (a, b) = (a % model.len(), b % model.len());
                        let (source, target) = (model[a], model[b]);
                        doc.move_before(source, target).unwrap();
                        model_move(&mut model, source, target, true);
                    }
                }
                Op::MoveAfter(a, b) => {
                    if !model.is_empty() {
                        let (a, b) = (a % model.len(), b % model.len());
                        let (source, target) = (model[a], model[b]);
                        doc.move_after(source, target).unwrap();
                        model_move(&mut model, source, target, false);
                    }
                }
                Op::MoveUp(i) => {
                    if !model.is_empty() {
                        let i = i % model.len();
                        let moved = doc.move_up(model[i]).unwrap();
                        prop_assert_eq!(moved, i > 0);
                        if i > 0 {
                            model.swap(i, i - 1);
                        }
                    }
                }
                Op::MoveDown(i) => {
                    if !model.is_empty() {
                        let i = i % model.len();
                        let moved = doc.move_down(model[i]).unwrap();
                        prop_assert_eq!(moved, i + 1 < model.len());
                        if i + 1 < model.len() {
                            model.swap(i, i + 1);
                        }
                    }
                }
            }
            prop_assert_eq!(doc.order(), model.clone());
        }

        // Snapshots serialize by traversal, so they agree with the model
        // too
        let captured = AutosaveSnapshot::capture(&doc, Utc::now());
        let captured_ids: Vec<String> = captured.cells.iter().map(|c| c.id.clone()).collect();
        let model_ids: Vec<String> = model.iter().map(|id| id.to_string()).collect();
        prop_assert_eq!(captured_ids, model_ids);
    }
}
