use crate::{Cell, CellKind, CellOutput, Document, NotebookError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub const APP_NAME: &str = "notebook_cell_editor";

fn parse_cell_id(id: Option<&str>) -> Ulid {
    // Snapshots from older builds may carry foreign or missing ids; a
    // fresh id keeps the cell instead of dropping it.
    id.and_then(|s| Ulid::from_string(s).ok())
        .unwrap_or_else(Ulid::new)
}

// ========== Autosave ==========

/// One cell as captured by autosave: content and hidden flag, no output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutosaveCell {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "presentationHidden")]
    pub presentation_hidden: bool,
}

/// The autosave blob: the full document plus a capture timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutosaveSnapshot {
    pub timestamp: DateTime<Utc>,
    pub cells: Vec<AutosaveCell>,
}

impl AutosaveSnapshot {
    /// Capture the document in traversal order
    pub fn capture(document: &Document, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            cells: document
                .iter()
                .map(|cell| AutosaveCell {
                    id: cell.id().to_string(),
                    kind: cell.kind().as_str().to_string(),
                    content: cell.content.clone(),
                    presentation_hidden: cell.presentation_hidden,
                })
                .collect(),
        }
    }

    /// Rebuild cells in snapshot order
    pub fn into_cells(self) -> Vec<Cell> {
        self.cells
            .into_iter()
            .map(|saved| {
                let mut cell =
                    Cell::with_id(parse_cell_id(Some(&saved.id)), CellKind::parse(&saved.kind));
                cell.content = saved.content;
                cell.presentation_hidden = saved.presentation_hidden;
                cell
            })
            .collect()
    }
}

// ========== Named save/load (backend wire shape) ==========

/// One cell as the persistence backend stores it, including the last
/// rendered output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SavedCell {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub output: String,
}

/// Capture the document for a named save, in traversal order
pub fn saved_cells(document: &Document) -> Vec<SavedCell> {
    document
        .iter()
        .map(|cell| SavedCell {
            id: cell.id().to_string(),
            kind: cell.kind().as_str().to_string(),
            code: cell.content.clone(),
            output: cell.output.text.clone(),
        })
        .collect()
}

/// Rebuild cells from a loaded notebook file
pub fn cells_from_saved(saved: Vec<SavedCell>) -> Vec<Cell> {
    saved
        .into_iter()
        .map(|entry| {
            let mut cell =
                Cell::with_id(parse_cell_id(Some(&entry.id)), CellKind::parse(&entry.kind));
            cell.content = entry.code;
            if !entry.output.is_empty() {
                cell.output = CellOutput::ok(entry.output);
            }
            cell
        })
        .collect()
}

// ========== Interchange (import/export) ==========

/// One cell in the interchange file: id, type, and content only
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InterchangeCell {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub code: String,
}

/// The downloadable interchange document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterchangeDoc {
    pub exported_at: DateTime<Utc>,
    pub app: String,
    pub cells: Vec<InterchangeCell>,
}

impl InterchangeDoc {
    /// Serialize the document for export; output is deliberately not
    /// included.
    pub fn capture(document: &Document, exported_at: DateTime<Utc>) -> Self {
        Self {
            exported_at,
            app: APP_NAME.to_string(),
            cells: document
                .iter()
                .map(|cell| InterchangeCell {
                    id: cell.id().to_string(),
                    kind: cell.kind().as_str().to_string(),
                    code: cell.content.clone(),
                })
                .collect(),
        }
    }
}

/// Parse and validate an interchange blob. Any parse failure, or a
/// missing/array-less `cells` field, is a validation error and the caller
/// must leave the current document untouched.
pub fn parse_interchange(raw: &str) -> Result<Vec<Cell>, NotebookError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| NotebookError::Validation(format!("not valid JSON: {e}")))?;
    let cells = value
        .get("cells")
        .and_then(|c| c.as_array())
        .ok_or_else(|| NotebookError::Validation("missing 'cells' array".to_string()))?;

    cells
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let obj = entry
                .as_object()
                .ok_or_else(|| NotebookError::Validation(format!("cell {i} is not an object")))?;
            let kind = obj
                .get("type")
                .and_then(|v| v.as_str())
                .map(CellKind::parse)
                .unwrap_or(CellKind::Code);
            let id = parse_cell_id(obj.get("id").and_then(|v| v.as_str()));
            let mut cell = Cell::with_id(id, kind);
            cell.content = obj
                .get("code")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            Ok(cell)
        })
        .collect()
}

// ========== Script flattening ==========

/// Collapse a user-supplied base name to filesystem-safe characters,
/// capped at 120 chars
pub fn sanitize_base_name(name: &str) -> String {
    let mut out = String::new();
    let mut last_was_sep = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
            out.push(ch);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    out.trim_matches('_').chars().take(120).collect()
}

/// Timestamp label used in script and notebook filenames
pub fn timestamp_label(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

/// Filename for an exported script
pub fn script_filename(base_name: &str, ts: &str) -> String {
    let safe = sanitize_base_name(base_name);
    if safe.is_empty() {
        format!("{ts}.py")
    } else {
        format!("{safe}_{ts}.py")
    }
}

/// Flatten the notebook to a runnable script: code cells verbatim, all
/// other kinds as comment blocks, each preceded by a cell header.
pub fn flatten_script(document: &Document, ts: &str) -> String {
    let mut lines: Vec<String> = vec![
        "#!/usr/bin/env python3".to_string(),
        format!("# Exported script {ts} from Notebook Cell Editor"),
        String::new(),
    ];
    for cell in document.iter() {
        if cell.kind() == CellKind::Code {
            lines.push(format!("# --- cell: {} (code) ---", cell.id()));
            lines.push(cell.content.clone());
        } else {
            lines.push(format!("# --- cell: {} ({}) ---", cell.id(), cell.kind()));
            for line in cell.content.split('\n') {
                lines.push(format!("# {line}"));
            }
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn sample_document() -> Document {
        let mut doc = Document::new();
        let mut code = Cell::with_content(CellKind::Code, "print(5)");
        code.output = CellOutput::ok("5\n");
        let mut md = Cell::with_content(CellKind::Markdown, "# Title");
        md.presentation_hidden = true;
        doc.insert_after(None, code).unwrap();
        doc.insert_after(None, md).unwrap();
        doc.insert_after(None, Cell::with_content(CellKind::Graph, "digraph G { A->B }"))
            .unwrap();
        doc
    }

    #[test]
    fn test_autosave_round_trip_preserves_order_and_flags() {
        let doc = sample_document();
        let snapshot = AutosaveSnapshot::capture(&doc, Utc::now());
        let cells = snapshot.into_cells();
        assert_eq!(cells.len(), 3);
        assert_eq!(cells[0].kind(), CellKind::Code);
        assert_eq!(cells[0].content, "print(5)");
        // Output is never part of autosave
        assert!(cells[0].output.is_empty());
        assert!(cells[1].presentation_hidden);
        assert_eq!(
            cells.iter().map(|c| c.id()).collect::<Vec<_>>(),
            doc.order()
        );
    }

    #[test]
    fn test_autosave_tolerates_foreign_ids() {
        let raw = r#"{"timestamp":"2024-01-01T00:00:00Z","cells":[{"id":"cell_1712","type":"dot","content":"digraph{}"}]}"#;
        let snapshot: AutosaveSnapshot = serde_json::from_str(raw).unwrap();
        let cells = snapshot.into_cells();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].kind(), CellKind::Graph);
    }

    #[test]
    fn test_saved_cells_include_output() {
        let doc = sample_document();
        let saved = saved_cells(&doc);
        assert_eq!(saved[0].output, "5\n");
        let cells = cells_from_saved(saved);
        assert_eq!(cells[0].output, CellOutput::ok("5\n"));
        assert!(cells[2].output.is_empty());
    }

    #[test]
    fn test_interchange_excludes_output() {
        let doc = sample_document();
        let interchange = InterchangeDoc::capture(&doc, Utc::now());
        let json = serde_json::to_string(&interchange).unwrap();
        assert!(!json.contains("output"));
        assert!(json.contains("\"exported_at\""));
        assert_eq!(interchange.app, APP_NAME);
    }

    #[test]
    fn test_parse_interchange_round_trip() {
        let doc = sample_document();
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let json = serde_json::to_string(&InterchangeDoc::capture(&doc, ts)).unwrap();
        let cells = parse_interchange(&json).unwrap();
        assert_eq!(cells.iter().map(|c| c.id()).collect::<Vec<_>>(), doc.order());
        assert_eq!(cells[2].content, "digraph G { A->B }");
    }

    #[test]
    fn test_parse_interchange_missing_cells_rejected() {
        assert_matches!(
            parse_interchange(r#"{"exported_at":"2024-01-01T00:00:00Z"}"#),
            Err(NotebookError::Validation(msg)) if msg.contains("cells")
        );
    }

    #[test]
    fn test_parse_interchange_cells_not_array_rejected() {
        assert_matches!(
            parse_interchange(r#"{"cells": 4}"#),
            Err(NotebookError::Validation(_))
        );
    }

    #[test]
    fn test_parse_interchange_garbage_rejected() {
        assert_matches!(
            parse_interchange("{ invalid json }"),
            Err(NotebookError::Validation(_))
        );
    }

    #[test]
    fn test_sanitize_base_name() {
        assert_eq!(sanitize_base_name("my report (v2)!"), "my_report_v2");
        assert_eq!(sanitize_base_name("___"), "");
        assert_eq!(sanitize_base_name("ok-1.2_x"), "ok-1.2_x");
        assert_eq!(sanitize_base_name("").len(), 0);
        assert!(sanitize_base_name(&"x".repeat(300)).len() <= 120);
    }

    #[test]
    fn test_script_filename() {
        assert_eq!(script_filename("demo", "20240601_120000"), "demo_20240601_120000.py");
        assert_eq!(script_filename("  ", "20240601_120000"), "20240601_120000.py");
    }

    #[test]
    fn test_flatten_script_comments_non_code() {
        let doc = sample_document();
        let script = flatten_script(&doc, "20240601_120000");
        assert!(script.starts_with("#!/usr/bin/env python3"));
        assert!(script.contains("(code) ---\nprint(5)"));
        assert!(script.contains("(markdown) ---\n# # Title"));
        assert!(script.contains("(graph) ---\n# digraph G { A->B }"));
    }
}
