//! Shared HTTP plumbing for backends: client construction, error
//! classification and SSE line splitting.

use std::time::Duration;

use decentra_core::BackendError;

pub(crate) fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// Map a transport-level failure into a backend error kind.
pub(crate) fn transport_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::timeout(err.to_string())
    } else if err.is_connect() {
        BackendError::connection(err.to_string())
    } else if err.is_decode() {
        BackendError::api(format!("Failed to decode response: {err}"))
    } else {
        BackendError::connection(err.to_string())
    }
}

/// Turn a non-success response into a classified error, consuming the body.
pub(crate) async fn status_error(response: reqwest::Response) -> BackendError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    BackendError::from_status(status, body)
}

/// Accumulates raw bytes and yields complete SSE lines. Bytes are only
/// decoded once a full line is present, so a character split across network
/// chunks survives intact.
#[derive(Default)]
pub(crate) struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Next complete, non-empty, non-comment line.
    pub(crate) fn next_line(&mut self) -> Option<String> {
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw[..line_end]);
            let line = line.trim_end_matches('\r');
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            return Some(line.to_string());
        }
        None
    }
}
