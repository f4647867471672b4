use eframe::egui;
use notebook_cell_editor::NotebookApp;

fn main() -> eframe::Result<()> {
    notebook_cell_editor::logging::init_logging();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_title("Notebook Cell Editor"),
        ..Default::default()
    };

    eframe::run_native(
        "Notebook Cell Editor",
        options,
        Box::new(|_cc| Ok(Box::new(NotebookApp::new()))),
    )
}
