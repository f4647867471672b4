use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// A cell in the notebook, representing a single unit of content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cell {
    /// Unique identifier (sortable, timestamp-based); never reused
    id: Ulid,

    /// Cell kind, fixed at creation; determines the run strategy
    kind: CellKind,

    /// Editable text buffer
    pub content: String,

    /// Last rendered or executed result; empty until first run
    pub output: CellOutput,

    /// Excludes the cell from presentation export without deleting it
    pub presentation_hidden: bool,
}

impl Cell {
    /// Create a new empty cell of the given kind
    pub fn new(kind: CellKind) -> Self {
        Self::with_id(Ulid::new(), kind)
    }

    /// Create a cell with a specific ID (snapshot restore, testing)
    pub fn with_id(id: Ulid, kind: CellKind) -> Self {
        Self {
            id,
            kind,
            content: String::new(),
            output: CellOutput::default(),
            presentation_hidden: false,
        }
    }

    /// Create a cell with initial content
    pub fn with_content(kind: CellKind, content: impl Into<String>) -> Self {
        let mut cell = Self::new(kind);
        cell.content = content.into();
        cell
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    /// The kind is immutable after creation; there is deliberately no
    /// setter.
    pub fn kind(&self) -> CellKind {
        self.kind
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    pub fn set_output(&mut self, output: CellOutput) {
        self.output = output;
    }

    pub fn toggle_presentation_hidden(&mut self) -> bool {
        self.presentation_hidden = !self.presentation_hidden;
        self.presentation_hidden
    }
}

/// Cell kind determines how content is rendered or executed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Code,
    Markdown,
    Graph,
    Image,
}

impl CellKind {
    /// Parse a kind from its wire form. Unknown or missing kinds fall back
    /// to `Code`, matching how loaded documents have always been treated.
    /// `dot` is a legacy alias for `Graph`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" => CellKind::Markdown,
            "graph" | "dot" => CellKind::Graph,
            "image" => CellKind::Image,
            _ => CellKind::Code,
        }
    }

    /// Wire form of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            CellKind::Code => "code",
            CellKind::Markdown => "markdown",
            CellKind::Graph => "graph",
            CellKind::Image => "image",
        }
    }

    /// Label for the run control: code executes, everything else renders
    pub fn run_label(&self) -> &'static str {
        match self {
            CellKind::Code => "▶ Run",
            _ => "▶ Render",
        }
    }

    /// Placeholder shown in an empty input buffer
    pub fn placeholder(&self) -> &'static str {
        match self {
            CellKind::Code => "# Python code here",
            CellKind::Markdown => "# Markdown here",
            CellKind::Graph => "DOT graph here (e.g., digraph G { A->B })",
            CellKind::Image => "Image URL or data URI or file path",
        }
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result region of a cell: rendered markup or executed text, plus
/// whether it represents a failure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CellOutput {
    pub text: String,
    pub is_error: bool,
}

impl CellOutput {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.is_error = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_creation() {
        let cell = Cell::new(CellKind::Code);
        assert_eq!(cell.kind(), CellKind::Code);
        assert!(cell.content.is_empty());
        assert!(cell.output.is_empty());
        assert!(!cell.presentation_hidden);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Cell::new(CellKind::Markdown);
        let b = Cell::new(CellKind::Markdown);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_kind_parse_round_trip() {
        for kind in [
            CellKind::Code,
            CellKind::Markdown,
            CellKind::Graph,
            CellKind::Image,
        ] {
            assert_eq!(CellKind::parse(kind.as_str()), kind);
        }
    }

    #[test]
    fn test_kind_parse_fallbacks() {
        assert_eq!(CellKind::parse("dot"), CellKind::Graph);
        assert_eq!(CellKind::parse("DOT"), CellKind::Graph);
        assert_eq!(CellKind::parse(""), CellKind::Code);
        assert_eq!(CellKind::parse("spreadsheet"), CellKind::Code);
    }

    #[test]
    fn test_toggle_presentation_hidden() {
        let mut cell = Cell::new(CellKind::Graph);
        assert!(cell.toggle_presentation_hidden());
        assert!(!cell.toggle_presentation_hidden());
    }

    #[test]
    fn test_output_states() {
        let mut out = CellOutput::ok("5\n");
        assert!(!out.is_error);
        assert!(!out.is_empty());

        out = CellOutput::error("boom");
        assert!(out.is_error);

        out.clear();
        assert!(out.is_empty());
        assert!(!out.is_error);
    }
}
