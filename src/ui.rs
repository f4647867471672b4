use crate::{
    autosave::{AutosaveStore, Debouncer},
    backend::{backend_base_url, NotebookApi},
    render,
    reorder::{autoscroll_delta, drop_side, DragController, DragOutcome, DropSide},
    snapshot::{
        self, flatten_script, saved_cells, script_filename, timestamp_label, AutosaveSnapshot,
        InterchangeDoc,
    },
    Cell, CellKind, CellOutput, Document, ExecutionClient, ExecutionPool, ExecutionTarget,
    NotebookError, PresentationDeck, PresentationPayload, TransferChannel,
};
use chrono::Utc;
use egui::{Color32, Key, Modifiers, RichText, Stroke};
use std::collections::HashSet;
use std::time::Instant;
use ulid::Ulid;

/// Per-cell actions queued while drawing and applied afterwards, so the
/// draw loop never mutates the document it is iterating.
#[derive(Debug, Clone, Copy)]
enum CellAction {
    Run(Ulid),
    MoveUp(Ulid),
    MoveDown(Ulid),
    Delete(Ulid),
    ToggleCollapse(Ulid),
    Copy(Ulid),
    ToggleHidden(Ulid),
}

/// Main application state
pub struct NotebookApp {
    /// The ordered document of cells
    document: Document,

    /// Remote execution dispatch
    pool: ExecutionPool,

    /// Persistence backend client
    api: NotebookApi,

    /// Local autosave store
    store: AutosaveStore,

    /// Debounced autosave trigger
    debouncer: Debouncer,

    /// Pointer-drag reorder state
    drag: DragController,

    /// Presentation hand-off channel
    channel: TransferChannel,

    /// Open presentation deck, if any
    deck: Option<PresentationDeck>,
    present_open: bool,

    /// Base name used for saves and script export
    file_name_input: String,

    /// Known backend files (refreshed on demand)
    file_list: Vec<String>,

    /// Status bar message
    status_message: String,

    /// Collapsed cells (view state only)
    collapsed: HashSet<Ulid>,

    /// One-shot focus / scroll requests honored during the next draw
    focus_cell: Option<Ulid>,
    scroll_to: Option<Ulid>,

    /// Cell rectangles from the current frame, for drag targeting
    cell_rects: Vec<(Ulid, egui::Rect)>,
}

impl Default for NotebookApp {
    fn default() -> Self {
        Self::new()
    }
}

impl NotebookApp {
    pub fn new() -> Self {
        let base_url = backend_base_url();
        let store = AutosaveStore::default_location().unwrap_or_else(|err| {
            log::warn!("Falling back to local autosave path: {err}");
            AutosaveStore::at("autosave.json")
        });

        let mut app = Self {
            document: Document::new(),
            pool: ExecutionPool::new(ExecutionClient::new(base_url.clone())),
            api: NotebookApi::new(base_url),
            store,
            debouncer: Debouncer::default(),
            drag: DragController::new(),
            channel: TransferChannel::default(),
            deck: None,
            present_open: false,
            file_name_input: String::new(),
            file_list: Vec::new(),
            status_message: "Welcome to Notebook Cell Editor!".to_string(),
            collapsed: HashSet::new(),
            focus_cell: None,
            scroll_to: None,
            cell_rects: Vec::new(),
        };

        // Autosave is restored silently at startup when present and
        // non-empty
        if let Some(stored) = app.store.read() {
            if !stored.cells.is_empty() {
                match app.document.replace_all(stored.into_cells()) {
                    Ok(()) => app.status_message = "✓ Restored autosaved session".to_string(),
                    Err(err) => log::warn!("Could not restore autosave: {err}"),
                }
            }
        }
        app.seed_if_empty();
        app
    }

    /// The document is never empty at rest: re-seed one blank code cell
    fn seed_if_empty(&mut self) {
        if self.document.is_empty() {
            let cell = Cell::new(CellKind::Code);
            let id = cell.id();
            if self.document.insert_after(None, cell).is_ok() {
                self.document.set_active(id);
            }
        }
    }

    fn schedule_autosave(&mut self) {
        self.debouncer.schedule(Instant::now());
    }

    fn do_autosave(&mut self) {
        let captured = AutosaveSnapshot::capture(&self.document, Utc::now());
        if let Err(err) = self.store.write(&captured) {
            log::warn!("autosave error: {err:#}");
        }
    }

    // ========== Cell operations ==========

    fn insert_cell(&mut self, kind: CellKind) {
        let cell = Cell::new(kind);
        let id = cell.id();
        if self.document.insert_after_active(cell).is_ok() {
            self.focus_cell = Some(id);
            self.scroll_to = Some(id);
            self.schedule_autosave();
        }
    }

    fn delete_cell(&mut self, id: Ulid) {
        if self.document.remove(id).is_ok() {
            self.collapsed.remove(&id);
            self.seed_if_empty();
            self.schedule_autosave();
        }
    }

    /// Run or render one cell according to its kind's strategy
    fn run_cell(&mut self, id: Ulid) {
        let Some(cell) = self.document.get(id) else {
            return;
        };
        match cell.kind() {
            CellKind::Code => {
                if !self
                    .pool
                    .spawn(ExecutionTarget::Editor, id, cell.content.clone())
                {
                    self.status_message = "⚠ Cell is already running".to_string();
                }
            }
            kind => {
                let output = match render::render(kind, &cell.content) {
                    Ok(markup) => CellOutput::ok(markup),
                    Err(err) => CellOutput::error(err.to_string()),
                };
                if let Some(cell) = self.document.get_mut(id) {
                    cell.set_output(output);
                }
            }
        }
    }

    fn copy_cell(&mut self, id: Ulid) {
        let Some(cell) = self.document.get(id) else {
            return;
        };
        let text = cell.content.clone();
        match arboard::Clipboard::new().and_then(|mut cb| cb.set_text(text)) {
            Ok(()) => self.status_message = "✓ Copied cell content".to_string(),
            Err(err) => self.status_message = format!("❌ Copy failed: {err}"),
        }
    }

    fn apply_action(&mut self, action: CellAction) {
        match action {
            CellAction::Run(id) => self.run_cell(id),
            CellAction::MoveUp(id) => {
                if self.document.move_up(id).unwrap_or(false) {
                    self.after_keyboard_move(id);
                }
            }
            CellAction::MoveDown(id) => {
                if self.document.move_down(id).unwrap_or(false) {
                    self.after_keyboard_move(id);
                }
            }
            CellAction::Delete(id) => self.delete_cell(id),
            CellAction::ToggleCollapse(id) => {
                if !self.collapsed.remove(&id) {
                    self.collapsed.insert(id);
                }
            }
            CellAction::Copy(id) => self.copy_cell(id),
            CellAction::ToggleHidden(id) => {
                if let Some(cell) = self.document.get_mut(id) {
                    cell.toggle_presentation_hidden();
                    self.schedule_autosave();
                }
            }
        }
    }

    /// The moved cell stays active, keeps input focus, and is scrolled
    /// into view
    fn after_keyboard_move(&mut self, id: Ulid) {
        self.document.set_active(id);
        self.focus_cell = Some(id);
        self.scroll_to = Some(id);
        self.schedule_autosave();
    }

    // ========== Persistence actions ==========

    fn save_notebook(&mut self) {
        let cells = saved_cells(&self.document);
        match self.api.save(&cells, self.file_name_input.trim()) {
            Ok(filename) => {
                alert("Saved", &format!("Saved: {filename}"));
                self.status_message = format!("✓ Saved: {filename}");
                self.refresh_list();
            }
            Err(err) => alert("Save failed", &err.to_string()),
        }
    }

    fn refresh_list(&mut self) {
        match self.api.list() {
            Ok(files) => {
                self.file_list = files;
                self.status_message = format!("✓ {} notebook file(s)", self.file_list.len());
            }
            Err(err) => self.status_message = format!("❌ List failed: {err}"),
        }
    }

    /// Loading is an intentional open: it replaces the document without
    /// confirmation
    fn load_notebook(&mut self, filename: &str) {
        match self.api.load(filename) {
            Ok(saved) => {
                let cells = snapshot::cells_from_saved(saved);
                if let Err(err) = self.document.replace_all(cells) {
                    alert("Load failed", &format!("Invalid notebook file: {err}"));
                    return;
                }
                self.collapsed.clear();
                self.seed_if_empty();
                self.status_message = format!("✓ Loaded: {filename}");
            }
            Err(err) => alert("Load failed", &err.to_string()),
        }
    }

    /// Explicit restore is destructive and requires confirmation
    fn restore_from_autosave(&mut self) {
        let Some(stored) = self.store.read() else {
            alert("Restore", "No autosaved session found.");
            return;
        };
        if !confirm(
            "Restore autosaved session?",
            "Current cells will be replaced.",
        ) {
            return;
        }
        if let Err(err) = self.document.replace_all(stored.into_cells()) {
            alert("Restore failed", &format!("Invalid autosave: {err}"));
            return;
        }
        self.collapsed.clear();
        self.seed_if_empty();
        self.status_message = "✓ Restored autosaved session".to_string();
    }

    fn clear_autosave(&mut self) {
        self.debouncer.cancel();
        match self.store.clear() {
            Ok(_) => alert("Autosave", "Autosave cleared."),
            Err(err) => alert("Autosave", &format!("Clear failed: {err:#}")),
        }
    }

    fn export_json(&mut self) {
        let doc = InterchangeDoc::capture(&self.document, Utc::now());
        let default_name = format!("notebook_export_{}.json", timestamp_label(Utc::now()));
        let Some(path) = rfd::FileDialog::new()
            .add_filter("JSON", &["json"])
            .set_file_name(default_name)
            .save_file()
        else {
            return;
        };
        let result = serde_json::to_string_pretty(&doc)
            .map_err(anyhow::Error::from)
            .and_then(|json| std::fs::write(&path, json).map_err(anyhow::Error::from));
        match result {
            Ok(()) => self.status_message = format!("✓ Exported: {}", path.display()),
            Err(err) => alert("Export failed", &err.to_string()),
        }
    }

    /// Import is destructive and requires confirmation; on any failure
    /// the current document is left untouched
    fn import_json(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("JSON", &["json"])
            .pick_file()
        else {
            return;
        };
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) => {
                alert("Import failed", &format!("Failed to read file: {err}"));
                return;
            }
        };
        let cells = match snapshot::parse_interchange(&raw) {
            Ok(cells) => cells,
            Err(err) => {
                alert("Import failed", &err.to_string());
                return;
            }
        };
        if !confirm("Import notebook?", "Import will replace current cells.") {
            return;
        }
        if let Err(err) = self.document.replace_all(cells) {
            alert("Import failed", &err.to_string());
            return;
        }
        self.collapsed.clear();
        self.seed_if_empty();
        self.schedule_autosave();
        alert("Import", "Import completed.");
    }

    /// Flatten to a runnable script, save locally, and post a best-effort
    /// server-side copy
    fn export_script(&mut self) {
        let ts = timestamp_label(Utc::now());
        let content = flatten_script(&self.document, &ts);
        let filename = script_filename(&self.file_name_input, &ts);
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("Python", &["py"])
            .set_file_name(filename)
            .save_file()
        {
            if let Err(err) = std::fs::write(&path, &content) {
                alert("Export failed", &format!("Failed to write script: {err}"));
                return;
            }
            self.status_message = format!("✓ Exported: {}", path.display());
        }
        self.api
            .export_script_fire_and_forget(self.file_name_input.trim().to_string(), content);
    }

    // ========== Presentation ==========

    fn start_presentation(&mut self) {
        let payload = PresentationPayload::capture(&self.document, Utc::now());
        match self.channel.publish(&payload) {
            Ok(()) => {
                // The consumer is opened only after a successful publish
                if let Some(received) = self.channel.take() {
                    self.deck = Some(PresentationDeck::from_payload(received));
                    self.present_open = true;
                }
            }
            Err(NotebookError::Capacity { .. }) => alert(
                "Presentation failed",
                "The notebook content is too large to be transferred. \
                 Please reduce the size of your outputs.",
            ),
            Err(err) => {
                log::error!("Presentation prep error: {err}");
                alert(
                    "Presentation failed",
                    "An unexpected error occurred while preparing the presentation.",
                );
            }
        }
    }

    fn draw_presentation(&mut self, ctx: &egui::Context) {
        if ctx.input(|i| i.viewport().close_requested() || i.key_pressed(Key::Escape)) {
            self.present_open = false;
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            return;
        }

        // A code slide with no captured output lazily runs through the
        // same execution contract; the result stays in the deck.
        let pending = self
            .deck
            .as_ref()
            .and_then(|deck| deck.current_needs_execution());
        if let Some((cell_id, code)) = pending {
            self.pool
                .spawn(ExecutionTarget::Presentation, cell_id, code);
        }

        let Some(deck) = self.deck.as_mut() else {
            self.present_open = false;
            return;
        };

        if ctx.input(|i| i.key_pressed(Key::ArrowRight)) {
            deck.next();
        }
        if ctx.input(|i| i.key_pressed(Key::ArrowLeft)) {
            deck.prev();
        }

        egui::TopBottomPanel::bottom("slide_nav").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("⟨ Prev").clicked() {
                    deck.prev();
                }
                if ui.button("Next ⟩").clicked() {
                    deck.next();
                }
                let (current, total) = deck.position();
                ui.label(format!("{current} / {total}"));
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical()
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    let Some(cell) = deck.current() else {
                        ui.heading("No content to present");
                        return;
                    };
                    ui.label(
                        RichText::new(cell.kind().as_str().to_uppercase())
                            .small()
                            .weak(),
                    );
                    ui.separator();
                    match cell.kind() {
                        CellKind::Code => {
                            ui.label(RichText::new(&cell.content).monospace().size(18.0));
                            ui.separator();
                            match deck.current_output() {
                                Some(output) => {
                                    let color = if output.is_error {
                                        Color32::LIGHT_RED
                                    } else {
                                        Color32::LIGHT_GREEN
                                    };
                                    ui.label(RichText::new(&output.text).monospace().color(color));
                                }
                                None => {
                                    ui.spinner();
                                }
                            }
                        }
                        _ => {
                            let markup = deck
                                .current_output()
                                .map(|o| o.text)
                                .filter(|t| !t.trim().is_empty())
                                .unwrap_or_else(|| cell.content.clone());
                            ui.label(RichText::new(markup).monospace().size(16.0));
                        }
                    }
                });
        });
    }

    // ========== Editor panels ==========

    fn draw_menu_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("💾 Save to server").clicked() {
                        self.save_notebook();
                        ui.close_menu();
                    }
                    if ui.button("🔃 Refresh file list").clicked() {
                        self.refresh_list();
                        ui.close_menu();
                    }
                    ui.menu_button("📂 Open", |ui| {
                        if self.file_list.is_empty() {
                            ui.label("(refresh the file list first)");
                        }
                        let files = self.file_list.clone();
                        for file in files {
                            if ui.button(&file).clicked() {
                                self.load_notebook(&file);
                                ui.close_menu();
                            }
                        }
                    });
                    ui.separator();
                    if ui.button("⬇ Export JSON…").clicked() {
                        self.export_json();
                        ui.close_menu();
                    }
                    if ui.button("⬆ Import JSON…").clicked() {
                        self.import_json();
                        ui.close_menu();
                    }
                    if ui.button("🐍 Export script…").clicked() {
                        self.export_script();
                        ui.close_menu();
                    }
                    ui.separator();
                    if ui.button("⟲ Restore autosave…").clicked() {
                        self.restore_from_autosave();
                        ui.close_menu();
                    }
                    if ui.button("🗑 Clear autosave").clicked() {
                        self.clear_autosave();
                        ui.close_menu();
                    }
                });

                ui.menu_button("Insert", |ui| {
                    for kind in [
                        CellKind::Code,
                        CellKind::Markdown,
                        CellKind::Graph,
                        CellKind::Image,
                    ] {
                        if ui.button(format!("+ {kind} cell")).clicked() {
                            self.insert_cell(kind);
                            ui.close_menu();
                        }
                    }
                    ui.separator();
                    ui.menu_button("Graph template", |ui| {
                        for key in render::GRAPH_TEMPLATE_KEYS {
                            if ui.button(*key).clicked() {
                                self.insert_graph_template(key);
                                ui.close_menu();
                            }
                        }
                    });
                });

                ui.separator();
                ui.label("Name:");
                ui.add(
                    egui::TextEdit::singleline(&mut self.file_name_input)
                        .hint_text("notebook name")
                        .desired_width(160.0),
                );

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("🎞 Present").clicked() {
                        self.start_presentation();
                    }
                });
            });
        });
    }

    /// Fill the active graph cell with the template, or insert a new
    /// graph cell carrying it
    fn insert_graph_template(&mut self, key: &str) {
        let Some(template) = render::graph_template(key) else {
            return;
        };
        let active_graph = self
            .document
            .active()
            .filter(|id| self.document.get(*id).map(Cell::kind) == Some(CellKind::Graph));
        match active_graph {
            Some(id) => {
                if let Some(cell) = self.document.get_mut(id) {
                    cell.set_content(template);
                }
                self.focus_cell = Some(id);
                self.schedule_autosave();
            }
            None => {
                let cell = Cell::with_content(CellKind::Graph, template);
                let id = cell.id();
                if self.document.insert_after_active(cell).is_ok() {
                    self.focus_cell = Some(id);
                    self.scroll_to = Some(id);
                    self.schedule_autosave();
                }
            }
        }
    }

    fn draw_status_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(&self.status_message);
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if self.debouncer.pending() {
                        ui.label(RichText::new("autosave pending…").weak());
                    } else if self.pool.has_in_flight() {
                        ui.label(RichText::new("running…").weak());
                    }
                });
            });
        });
    }

    fn draw_cells(&mut self, ui: &mut egui::Ui) {
        self.cell_rects.clear();
        let mut actions: Vec<CellAction> = Vec::new();
        let mut edited = false;
        let order = self.document.order();
        let active = self.document.active();
        let drag_source = self.drag.source();

        for id in order {
            let Some((kind, hidden, output, preview)) = self.document.get(id).map(|cell| {
                (
                    cell.kind(),
                    cell.presentation_hidden,
                    cell.output.clone(),
                    cell.content.lines().next().unwrap_or("").to_string(),
                )
            }) else {
                continue;
            };
            let in_flight = self.pool.is_in_flight(ExecutionTarget::Editor, id);
            let collapsed = self.collapsed.contains(&id);
            let is_active = active == Some(id);
            let is_dragging = drag_source == Some(id);

            let stroke = if is_dragging {
                Stroke::new(2.0, Color32::YELLOW)
            } else if is_active {
                Stroke::new(1.5, Color32::LIGHT_BLUE)
            } else {
                Stroke::new(1.0, Color32::DARK_GRAY)
            };

            let mut drag_started = false;
            let mut gained_focus = false;

            let frame_response = egui::Frame::group(ui.style())
                .stroke(stroke)
                .show(ui, |ui| {
                    ui.horizontal(|ui| {
                        let handle = ui.add(
                            egui::Label::new(RichText::new("⠿").size(16.0))
                                .sense(egui::Sense::drag()),
                        );
                        if handle.drag_started() {
                            drag_started = true;
                        }
                        ui.label(RichText::new(kind.as_str().to_uppercase()).small().strong());
                        if hidden {
                            ui.label(RichText::new("hidden in present").small().weak());
                        }

                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            if ui.button("🗑").on_hover_text("Delete").clicked() {
                                actions.push(CellAction::Delete(id));
                            }
                            if ui
                                .button(if hidden { "🙉" } else { "👁" })
                                .on_hover_text("Hide in Present")
                                .clicked()
                            {
                                actions.push(CellAction::ToggleHidden(id));
                            }
                            if ui.button("⎘").on_hover_text("Copy").clicked() {
                                actions.push(CellAction::Copy(id));
                            }
                            if ui
                                .button(if collapsed { "▶" } else { "▼" })
                                .on_hover_text("Collapse")
                                .clicked()
                            {
                                actions.push(CellAction::ToggleCollapse(id));
                            }
                            if ui.button("⬇").on_hover_text("Move Down").clicked() {
                                actions.push(CellAction::MoveDown(id));
                            }
                            if ui.button("⬆").on_hover_text("Move Up").clicked() {
                                actions.push(CellAction::MoveUp(id));
                            }
                            if ui
                                .add_enabled(!in_flight, egui::Button::new(kind.run_label()))
                                .clicked()
                            {
                                actions.push(CellAction::Run(id));
                            }
                        });
                    });

                    if collapsed {
                        ui.label(RichText::new(preview).weak().monospace());
                        return;
                    }

                    let editor = {
                        // Sole mutable document borrow in this frame body
                        let Some(cell) = self.document.get_mut(id) else {
                            return;
                        };
                        ui.add(
                            egui::TextEdit::multiline(&mut cell.content)
                                .id(egui::Id::new(("cell-input", id)))
                                .hint_text(kind.placeholder())
                                .font(egui::TextStyle::Monospace)
                                .desired_width(f32::INFINITY)
                                .desired_rows(3),
                        )
                    };
                    if editor.changed() {
                        edited = true;
                    }
                    if editor.gained_focus() {
                        gained_focus = true;
                    }
                    if self.focus_cell == Some(id) {
                        editor.request_focus();
                        self.focus_cell = None;
                    }

                    if !output.is_empty() {
                        let (fill, color) = if output.is_error {
                            (Color32::from_rgb(60, 20, 20), Color32::LIGHT_RED)
                        } else {
                            (Color32::from_gray(24), Color32::LIGHT_GRAY)
                        };
                        egui::Frame::none().fill(fill).inner_margin(6.0).show(ui, |ui| {
                            ui.set_width(ui.available_width());
                            ui.label(RichText::new(&output.text).monospace().color(color));
                        });
                    }
                })
                .response;

            if drag_started && self.drag.begin(id) {
                self.document.set_active(id);
            }
            if gained_focus {
                self.document.set_active(id);
            }
            // Pointer-down anywhere else in the cell frame marks it
            // active too
            if frame_response.interact(egui::Sense::click()).clicked() {
                self.document.set_active(id);
            }
            if self.scroll_to == Some(id) {
                frame_response.scroll_to_me(Some(egui::Align::Center));
                self.scroll_to = None;
            }
            self.cell_rects.push((id, frame_response.rect));
        }

        self.handle_drag(ui);

        for action in actions {
            self.apply_action(action);
        }
        if edited {
            self.schedule_autosave();
        }
    }

    /// Hover targeting, insertion indicator, autoscroll, and drop/cancel
    /// for an active drag gesture
    fn handle_drag(&mut self, ui: &mut egui::Ui) {
        if !self.drag.is_dragging() {
            return;
        }
        let pointer = ui.ctx().pointer_latest_pos();
        if let Some(pos) = pointer {
            let target = self
                .cell_rects
                .iter()
                .find(|(_, rect)| pos.y >= rect.top() && pos.y <= rect.bottom())
                .copied();
            if let Some((target_id, rect)) = target {
                let side = drop_side(pos.y, rect.top(), rect.height());
                self.drag.hover(target_id, side);
                // The single insertion-point indicator
                let y = match side {
                    DropSide::Before => rect.top() - 2.0,
                    DropSide::After => rect.bottom() + 2.0,
                };
                ui.painter()
                    .hline(rect.x_range(), y, Stroke::new(3.0, Color32::LIGHT_BLUE));
            }

            // Constant-speed autoscroll inside the viewport edge margins
            let clip = ui.clip_rect();
            let delta = autoscroll_delta(pos.y, clip.top(), clip.bottom());
            if delta != 0.0 {
                ui.scroll_with_delta(egui::Vec2::new(0.0, -delta));
            }
        }

        let released = ui.input(|i| i.pointer.any_released());
        let escaped = ui.input(|i| i.key_pressed(Key::Escape));
        if escaped {
            self.drag.cancel();
        } else if released {
            let drop_target = pointer.and_then(|pos| {
                self.cell_rects
                    .iter()
                    .find(|(_, rect)| pos.y >= rect.top() && pos.y <= rect.bottom())
                    .map(|(id, rect)| (*id, drop_side(pos.y, rect.top(), rect.height())))
            });
            match drop_target {
                Some((target_id, side)) => {
                    if self.drag.drop_on(&mut self.document, target_id, side)
                        == DragOutcome::Moved
                    {
                        self.schedule_autosave();
                    }
                }
                // Indicator removal and state reset are unconditional,
                // even when the drop targeted no valid cell
                None => self.drag.cancel(),
            }
        }
        ui.ctx().request_repaint();
    }

    /// Keyboard protocol: structural shortcuts act on the active cell
    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        let Some(id) = self.document.active() else {
            return;
        };
        if ctx.input_mut(|i| i.consume_key(Modifiers::ALT, Key::ArrowUp))
            && self.document.move_up(id).unwrap_or(false)
        {
            self.after_keyboard_move(id);
        }
        if ctx.input_mut(|i| i.consume_key(Modifiers::ALT, Key::ArrowDown))
            && self.document.move_down(id).unwrap_or(false)
        {
            self.after_keyboard_move(id);
        }
        if ctx.input_mut(|i| i.consume_key(Modifiers::COMMAND, Key::Enter)) {
            self.run_cell(id);
            if let Some(next) = self.document.next_code_cell_after(id) {
                self.document.set_active(next);
                self.focus_cell = Some(next);
                self.scroll_to = Some(next);
            }
        }
        if ctx.input_mut(|i| i.consume_key(Modifiers::ALT, Key::Enter)) {
            self.run_cell(id);
            let cell = Cell::new(CellKind::Code);
            let new_id = cell.id();
            if self.document.insert_after(Some(id), cell).is_ok() {
                self.document.set_active(new_id);
                self.focus_cell = Some(new_id);
                self.scroll_to = Some(new_id);
                self.schedule_autosave();
            }
        }
        if ctx.input_mut(|i| i.consume_key(Modifiers::COMMAND, Key::Backspace)) {
            self.delete_cell(id);
        }
    }

    /// Route completed executions: editor outcomes write only their own
    /// cell's output; presentation outcomes stay in the deck.
    fn poll_executions(&mut self) {
        for outcome in self.pool.poll() {
            match outcome.target {
                ExecutionTarget::Editor => {
                    // The cell may have been deleted while in flight
                    if let Some(cell) = self.document.get_mut(outcome.cell_id) {
                        cell.set_output(outcome.output);
                    }
                }
                ExecutionTarget::Presentation => {
                    if let Some(deck) = self.deck.as_mut() {
                        deck.cache_output(outcome.cell_id, outcome.output);
                    }
                }
            }
        }
    }
}

fn alert(title: &str, message: &str) {
    rfd::MessageDialog::new()
        .set_level(rfd::MessageLevel::Info)
        .set_title(title)
        .set_description(message)
        .set_buttons(rfd::MessageButtons::Ok)
        .show();
}

fn confirm(title: &str, message: &str) -> bool {
    rfd::MessageDialog::new()
        .set_level(rfd::MessageLevel::Warning)
        .set_title(title)
        .set_description(message)
        .set_buttons(rfd::MessageButtons::YesNo)
        .show()
        == rfd::MessageDialogResult::Yes
}

impl eframe::App for NotebookApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_executions();
        self.handle_shortcuts(ctx);

        self.draw_menu_bar(ctx);
        self.draw_status_bar(ctx);
        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical()
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    self.draw_cells(ui);
                });
        });

        if self.present_open {
            let viewport_id = egui::ViewportId::from_hash_of("presentation");
            let builder = egui::ViewportBuilder::default()
                .with_title("Presentation")
                .with_inner_size([1024.0, 768.0]);
            ctx.show_viewport_immediate(viewport_id, builder, |ctx, _class| {
                self.draw_presentation(ctx);
            });
        } else if self.deck.is_some() {
            self.deck = None;
        }

        if self.debouncer.fire_due(Instant::now()) {
            self.do_autosave();
        }
        if self.debouncer.pending() || self.pool.has_in_flight() {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }
    }
}
