//! Meshy REST transport
//!
//! Knows which versioned endpoint serves each job kind and issues the
//! authenticated calls. Responses are returned raw; interpretation is left to
//! [`super::task::normalize_task`].

use super::task::RawTask;
use crate::job::JobKind;
use crate::params::JobParams;
use meshforge_core::{ForgeError, Result};
use serde::Deserialize;
use std::io::{self, BufRead, BufReader, Read};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MESHY_URL: &str = "https://api.meshy.ai";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Raw task operations against one backend.
///
/// Implementations are shared across threads by stream workers, so they must
/// be `Send + Sync`.
pub trait TaskTransport: Send + Sync + 'static {
    /// Current credit balance
    fn balance(&self) -> Result<f64>;

    /// Submit a task and return its ID
    fn create_task(&self, params: &JobParams) -> Result<String>;

    /// Fetch a task by ID from the endpoint serving `kind`
    fn fetch_task(&self, kind: JobKind, task_id: &str) -> Result<RawTask>;

    /// Open the event stream for a task, buffered for line reads.
    ///
    /// Once `cancel` fires, a blocked or later read returns end-of-stream and
    /// the connection is released.
    fn open_stream(
        &self,
        kind: JobKind,
        task_id: &str,
        cancel: CancellationToken,
    ) -> Result<Box<dyn BufRead + Send>>;
}

/// Path of the collection serving `kind`. Text-to-3D lives on the v2 surface,
/// everything else on v1.
pub fn endpoint(kind: JobKind) -> &'static str {
    match kind {
        JobKind::TextTo3d => "/openapi/v2/text-to-3d",
        JobKind::ImageTo3d => "/openapi/v1/image-to-3d",
        JobKind::MultiImageTo3d => "/openapi/v1/multi-image-to-3d",
        JobKind::Remesh => "/openapi/v1/remesh",
        JobKind::Retexture => "/openapi/v1/retexture",
        JobKind::Rig => "/openapi/v1/rigging",
        JobKind::Animate => "/openapi/v1/animations",
    }
}

const BALANCE_PATH: &str = "/openapi/v1/balance";

#[derive(Deserialize)]
struct CreateResponse {
    result: String,
}

#[derive(Deserialize)]
struct BalanceResponse {
    balance: f64,
}

/// Blocking HTTP client for the Meshy API.
///
/// Request/response calls go through ureq. Event streams use reqwest on a
/// per-stream runtime so a cancelled read can drop the connection mid-wait.
pub struct MeshyClient {
    api_key: String,
    base_url: String,
    agent: ureq::Agent,
}

impl MeshyClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Self {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");

        let mut response = self
            .agent
            .get(&url)
            .header("Authorization", &self.bearer())
            .call()
            .map_err(|e| transport_error("GET", path, e))?;

        response
            .body_mut()
            .read_json()
            .map_err(|e| ForgeError::Transport(format!("Failed to parse response from {}: {}", path, e)))
    }

    fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        payload: &serde_json::Value,
    ) -> Result<T> {
        let url = self.url(path);
        tracing::debug!(%url, "POST");

        let mut response = self
            .agent
            .post(&url)
            .header("Authorization", &self.bearer())
            .header("Content-Type", "application/json")
            .send_json(payload)
            .map_err(|e| transport_error("POST", path, e))?;

        response
            .body_mut()
            .read_json()
            .map_err(|e| ForgeError::Transport(format!("Failed to parse response from {}: {}", path, e)))
    }
}

impl TaskTransport for MeshyClient {
    fn balance(&self) -> Result<f64> {
        let response: BalanceResponse = self.get_json(BALANCE_PATH)?;
        Ok(response.balance)
    }

    fn create_task(&self, params: &JobParams) -> Result<String> {
        let body = params.to_body()?;
        let response: CreateResponse = self.post_json(endpoint(params.kind()), &body)?;
        Ok(response.result)
    }

    fn fetch_task(&self, kind: JobKind, task_id: &str) -> Result<RawTask> {
        self.get_json(&format!("{}/{}", endpoint(kind), task_id))
    }

    fn open_stream(
        &self,
        kind: JobKind,
        task_id: &str,
        cancel: CancellationToken,
    ) -> Result<Box<dyn BufRead + Send>> {
        let path = format!("{}/{}/stream", endpoint(kind), task_id);
        let url = self.url(&path);
        tracing::debug!(%url, "Opening event stream");

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        // Streams stay open for minutes, so only the connect phase is bounded
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ForgeError::Transport(format!("Failed to build stream client: {}", e)))?;

        let request = client
            .get(&url)
            .bearer_auth(&self.api_key)
            .header("Accept", "text/event-stream")
            .send();

        let response = runtime.block_on(async {
            tokio::select! {
                response = request => Some(response),
                _ = cancel.cancelled() => None,
            }
        });

        let response = match response {
            Some(Ok(response)) => response
                .error_for_status()
                .map_err(|e| stream_error(&path, e))?,
            Some(Err(e)) => return Err(stream_error(&path, e)),
            None => {
                return Err(ForgeError::Transport(format!(
                    "Stream {} cancelled while connecting",
                    path
                )))
            }
        };

        Ok(Box::new(BufReader::new(StreamBody {
            runtime,
            response: Some(response),
            cancel,
            chunk: Vec::new(),
            pos: 0,
        })))
    }
}

/// Response body of an event stream that stops at cancellation
struct StreamBody {
    runtime: tokio::runtime::Runtime,
    response: Option<reqwest::Response>,
    cancel: CancellationToken,
    chunk: Vec<u8>,
    pos: usize,
}

impl Read for StreamBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.chunk.len() {
            let Some(response) = self.response.as_mut() else {
                return Ok(0);
            };
            let cancel = &self.cancel;
            let next = self.runtime.block_on(async {
                tokio::select! {
                    chunk = response.chunk() => Some(chunk),
                    _ = cancel.cancelled() => None,
                }
            });

            match next {
                Some(Ok(Some(bytes))) => {
                    self.chunk = bytes.to_vec();
                    self.pos = 0;
                }
                Some(Ok(None)) | None => {
                    // Dropping the response closes the connection
                    self.response = None;
                    return Ok(0);
                }
                Some(Err(e)) => {
                    self.response = None;
                    return Err(io::Error::other(e));
                }
            }
        }

        let n = buf.len().min(self.chunk.len() - self.pos);
        buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

fn stream_error(path: &str, err: reqwest::Error) -> ForgeError {
    ForgeError::Transport(format!("Meshy API GET {} failed: {}", path, err))
}

fn transport_error(method: &str, path: &str, err: ureq::Error) -> ForgeError {
    ForgeError::Transport(format!("Meshy API {} {} failed: {}", method, path, err))
}
