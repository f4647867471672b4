use crate::snapshot::AutosaveSnapshot;
use anyhow::{Context, Result};
use directories_next::ProjectDirs;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Coalescing delay: bursts of edits inside this window produce one write
pub const AUTOSAVE_DEBOUNCE: Duration = Duration::from_millis(400);

/// Coalesces rapid repeated triggers into one delayed action. Each
/// `schedule` pushes the deadline out; `fire_due` reports readiness
/// exactly once per burst.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// (Re)arm the debounce window from `now`
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    /// True exactly once when the window has elapsed; disarms itself
    pub fn fire_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(AUTOSAVE_DEBOUNCE)
    }
}

/// Local persistent autosave store: one JSON blob at a fixed path,
/// written only through the debounced path, cleared only by the explicit
/// clear action.
#[derive(Debug, Clone)]
pub struct AutosaveStore {
    path: PathBuf,
}

impl AutosaveStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default platform data-dir location
    pub fn default_location() -> Result<Self> {
        let dirs = ProjectDirs::from("", "", "notebook_cell_editor")
            .context("Could not determine a data directory for autosave")?;
        Ok(Self::at(dirs.data_dir().join("autosave.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the snapshot, replacing any previous one (last write wins)
    pub fn write(&self, snapshot: &AutosaveSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create autosave directory: {}", parent.display())
            })?;
        }
        let file = File::create(&self.path)
            .with_context(|| format!("Failed to create autosave file: {}", self.path.display()))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer(writer, snapshot)
            .with_context(|| format!("Failed to write autosave: {}", self.path.display()))?;
        Ok(())
    }

    /// Read the stored snapshot. A missing file, unparseable blob, or a
    /// blob without a `cells` array is treated as absent; invalid blobs
    /// are logged, never surfaced.
    pub fn read(&self) -> Option<AutosaveSnapshot> {
        let file = File::open(&self.path).ok()?;
        match serde_json::from_reader::<_, AutosaveSnapshot>(BufReader::new(file)) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                log::warn!(
                    "Discarding invalid autosave at {}: {err}",
                    self.path.display()
                );
                None
            }
        }
    }

    /// Remove the store. Returns whether anything was actually removed.
    pub fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| {
                format!("Failed to clear autosave: {}", self.path.display())
            }),
        }
    }
}
