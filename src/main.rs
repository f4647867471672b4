use chrono::Utc;
use notebook_cell_editor::{
    compose_output, render, snapshot, Cell, CellKind, CellOutput, Document, ExecutionResponse,
    PresentationDeck, PresentationPayload, TransferChannel,
};

fn main() {
    notebook_cell_editor::logging::init_logging();

    println!("Notebook Cell Editor - Core Walkthrough");
    println!("=======================================\n");

    // Build a small document
    let mut document = Document::new();

    let code = Cell::with_content(CellKind::Code, "print(2 + 3)");
    let code_id = code.id();
    document.insert_after(None, code).unwrap();

    let markdown = Cell::with_content(CellKind::Markdown, "# Agenda\n\n- intro\n- demo");
    let markdown_id = markdown.id();
    document.insert_after(None, markdown).unwrap();

    let graph = Cell::with_content(CellKind::Graph, "digraph G { Edit -> Run -> Present }");
    let graph_id = graph.id();
    document.insert_after(None, graph).unwrap();

    println!("✓ Created document with {} cells", document.len());

    // Render the non-code cells through their strategies
    for id in [markdown_id, graph_id] {
        let cell = document.get(id).unwrap();
        let output = match render::render(cell.kind(), &cell.content) {
            Ok(markup) => CellOutput::ok(markup),
            Err(err) => CellOutput::error(err.to_string()),
        };
        document.get_mut(id).unwrap().set_output(output);
    }
    println!("✓ Rendered markdown and graph cells");

    // Compose a code output the way an execution response would arrive
    let response: ExecutionResponse =
        serde_json::from_str(r#"{"stdout": "5\n", "result": "5"}"#).unwrap();
    document
        .get_mut(code_id)
        .unwrap()
        .set_output(compose_output(&response));
    println!("✓ Composed execution output");

    // Reorder: move the markdown cell to the top
    document.move_before(markdown_id, code_id).unwrap();
    println!(
        "✓ Reordered; document order is now: {:?}",
        document
            .iter()
            .map(|c| c.kind().as_str())
            .collect::<Vec<_>>()
    );

    // Hide the markdown cell from presentation and hand the rest off
    document
        .get_mut(markdown_id)
        .unwrap()
        .toggle_presentation_hidden();

    let payload = PresentationPayload::capture(&document, Utc::now());
    let mut channel = TransferChannel::default();
    channel.publish(&payload).unwrap();
    let deck = PresentationDeck::from_payload(channel.take().unwrap());
    println!(
        "✓ Presentation deck holds {} slides (1 cell hidden)",
        deck.len()
    );

    // Interchange round trip
    let exported =
        serde_json::to_string_pretty(&snapshot::InterchangeDoc::capture(&document, Utc::now()))
            .unwrap();
    let reimported = snapshot::parse_interchange(&exported).unwrap();
    println!("✓ Interchange round trip: {} cells\n", reimported.len());

    println!("Run the GUI with: cargo run --bin gui");
}
