use crate::execution::failure_from_response;
use crate::snapshot::SavedCell;
use crate::NotebookError;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

/// Base URL for the execution and persistence backend, overridable via
/// `NOTEBOOK_BACKEND_URL`
pub fn backend_base_url() -> String {
    std::env::var("NOTEBOOK_BACKEND_URL").unwrap_or_else(|_| "http://127.0.0.1:8000".to_string())
}

#[derive(Debug, Serialize)]
struct SaveRequest<'a> {
    cells: &'a [SavedCell],
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct SaveResponse {
    filename: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    files: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LoadResponse {
    #[serde(default)]
    cells: Vec<SavedCell>,
}

#[derive(Debug, Serialize)]
struct ExportScriptRequest<'a> {
    name: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExportScriptResponse {
    #[serde(default)]
    saved: bool,
    #[serde(default)]
    filename: Option<String>,
}

/// Client for the notebook persistence backend. Save/list/load are
/// explicit user actions and run synchronously with a short timeout;
/// script export is fire-and-forget.
pub struct NotebookApi {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl NotebookApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Save the document under a user-supplied base name; the backend
    /// answers with the generated filename.
    pub fn save(&self, cells: &[SavedCell], name: &str) -> Result<String, NotebookError> {
        let response = self
            .http
            .post(format!("{}/save", self.base_url))
            .json(&SaveRequest { cells, name })
            .send()
            .map_err(|e| NotebookError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(failure_from_response(response));
        }
        response
            .json::<SaveResponse>()
            .map(|r| r.filename)
            .map_err(|e| NotebookError::Transport(e.to_string()))
    }

    /// List previously saved notebook files
    pub fn list(&self) -> Result<Vec<String>, NotebookError> {
        let response = self
            .http
            .get(format!("{}/list", self.base_url))
            .send()
            .map_err(|e| NotebookError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(failure_from_response(response));
        }
        response
            .json::<ListResponse>()
            .map(|r| r.files)
            .map_err(|e| NotebookError::Transport(e.to_string()))
    }

    /// Fetch a previously saved notebook by filename
    pub fn load(&self, filename: &str) -> Result<Vec<SavedCell>, NotebookError> {
        let response = self
            .http
            .get(format!("{}/load", self.base_url))
            .query(&[("file", filename)])
            .send()
            .map_err(|e| NotebookError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(failure_from_response(response));
        }
        response
            .json::<LoadResponse>()
            .map(|r| r.cells)
            .map_err(|e| NotebookError::Transport(e.to_string()))
    }

    /// Best-effort server-side copy of an exported script. Runs on a
    /// worker thread; failures are logged and never block the user.
    pub fn export_script_fire_and_forget(&self, name: String, content: String) {
        let http = self.http.clone();
        let url = format!("{}/export_script", self.base_url);
        thread::spawn(move || {
            let sent = http
                .post(&url)
                .json(&ExportScriptRequest {
                    name: &name,
                    content: &content,
                })
                .send();
            match sent {
                Ok(response) if response.status().is_success() => {
                    match response.json::<ExportScriptResponse>() {
                        Ok(body) if body.saved => log::info!(
                            "Server-side script saved: {}",
                            body.filename.as_deref().unwrap_or("<unnamed>")
                        ),
                        Ok(_) => log::warn!("Server-side script save refused"),
                        Err(err) => log::warn!("Server-side script save bad response: {err}"),
                    }
                }
                Ok(response) => {
                    log::warn!("Server-side script save failed: {}", response.status())
                }
                Err(err) => log::warn!("Server-side script save error: {err}"),
            }
        });
    }
}
