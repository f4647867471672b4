use crate::{CellOutput, NotebookError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use ulid::Ulid;

/// Request body for the remote execution service
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_id: Option<String>,
    pub code: String,
}

/// Response body from the remote execution service. Presence of `error`
/// marks a logical failure despite HTTP success.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExecutionResponse {
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub traceback: Option<String>,
}

impl ExecutionResponse {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Compose the output region for an execution response.
///
/// Segments in order, joined by a newline: stdout (if non-empty), the
/// string form of the result (if present), stderr behind a `[stderr]`
/// separator line, and the error message plus optional traceback behind
/// an `[error]` separator. The error state is set iff the response
/// signals an error.
pub fn compose_output(response: &ExecutionResponse) -> CellOutput {
    let mut parts: Vec<String> = Vec::new();

    if let Some(stdout) = &response.stdout {
        if !stdout.is_empty() {
            parts.push(stdout.clone());
        }
    }
    if let Some(result) = &response.result {
        match result {
            serde_json::Value::Null => {}
            serde_json::Value::String(s) => parts.push(s.clone()),
            other => parts.push(other.to_string()),
        }
    }
    if let Some(stderr) = &response.stderr {
        if !stderr.is_empty() {
            parts.push(format!("[stderr]\n{stderr}"));
        }
    }
    if let Some(error) = &response.error {
        let mut segment = format!("[error]\n{error}");
        if let Some(traceback) = &response.traceback {
            segment.push('\n');
            segment.push_str(traceback);
        }
        segment.push('\n');
        parts.push(segment);
    }

    CellOutput {
        text: parts.join("\n"),
        is_error: response.is_error(),
    }
}

/// Blocking HTTP client for the execution contract. Calls are issued from
/// worker threads, never from the UI thread.
pub struct ExecutionClient {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl ExecutionClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Execute one cell's code. Transport failures surface the HTTP
    /// status, reason phrase, and any `detail` from the body.
    pub fn execute(
        &self,
        cell_id: Option<Ulid>,
        code: &str,
    ) -> Result<ExecutionResponse, NotebookError> {
        let request = ExecutionRequest {
            cell_id: cell_id.map(|id| id.to_string()),
            code: code.to_string(),
        };
        let response = self
            .http
            .post(format!("{}/execute", self.base_url))
            .json(&request)
            .send()
            .map_err(|e| NotebookError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(failure_from_response(response));
        }
        response
            .json::<ExecutionResponse>()
            .map_err(|e| NotebookError::Transport(e.to_string()))
    }
}

/// Map a non-success HTTP response to a transport error carrying status,
/// reason phrase, and the body's `detail` (stringified when structured).
pub(crate) fn failure_from_response(response: reqwest::blocking::Response) -> NotebookError {
    let status = response.status();
    let mut message = format!(
        "Server Error: {} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    );
    if let Ok(body) = response.json::<serde_json::Value>() {
        if let Some(detail) = body.get("detail") {
            let text = match detail {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            message.push('\n');
            message.push_str(&text);
        }
    }
    NotebookError::Transport(message)
}

/// Where an execution outcome should be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionTarget {
    /// Write into the editor document's own cell
    Editor,
    /// Cache into the presentation deck only; never written back into
    /// the editor document
    Presentation,
}

/// Completed execution delivered back to the UI thread
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub cell_id: Ulid,
    pub target: ExecutionTarget,
    pub output: CellOutput,
}

/// Dispatches executions to worker threads and collects their outcomes.
///
/// One in-flight request per (target, cell) pair: re-invocation of a cell
/// is refused while its own request is pending, which is the only
/// backpressure mechanism. Other cells run concurrently and each outcome
/// writes only to its own cell.
pub struct ExecutionPool {
    client: Arc<ExecutionClient>,
    tx: Sender<ExecutionOutcome>,
    rx: Receiver<ExecutionOutcome>,
    in_flight: HashSet<(ExecutionTarget, Ulid)>,
}

impl ExecutionPool {
    pub fn new(client: ExecutionClient) -> Self {
        let (tx, rx) = channel();
        Self {
            client: Arc::new(client),
            tx,
            rx,
            in_flight: HashSet::new(),
        }
    }

    pub fn is_in_flight(&self, target: ExecutionTarget, cell_id: Ulid) -> bool {
        self.in_flight.contains(&(target, cell_id))
    }

    /// Spawn an execution unless one is already pending for this cell.
    /// Returns whether a request was actually issued.
    pub fn spawn(&mut self, target: ExecutionTarget, cell_id: Ulid, code: String) -> bool {
        if !self.in_flight.insert((target, cell_id)) {
            return false;
        }
        let client = Arc::clone(&self.client);
        let tx = self.tx.clone();
        thread::spawn(move || {
            let output = match client.execute(Some(cell_id), &code) {
                Ok(response) => compose_output(&response),
                Err(err) => CellOutput::error(err.to_string()),
            };
            // Receiver may be gone at shutdown
            let _ = tx.send(ExecutionOutcome {
                cell_id,
                target,
                output,
            });
        });
        true
    }

    /// Drain completed executions. The in-flight flag for each outcome is
    /// released unconditionally, success or failure.
    pub fn poll(&mut self) -> Vec<ExecutionOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(outcome) = self.rx.try_recv() {
            self.in_flight.remove(&(outcome.target, outcome.cell_id));
            outcomes.push(outcome);
        }
        outcomes
    }

    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }
}
