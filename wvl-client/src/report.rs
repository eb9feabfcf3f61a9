//! Submission transport and response interpretation.
//!
//! One POST per page view, fire-and-forget: a success response is logged
//! at debug, an application-level failure or transport failure at warn,
//! and in every case the attempt ends there. Nothing is retried and
//! nothing reaches the end user.

use std::sync::Arc;

use wvl_common::{CollectResponse, SchemaVersion, Submission};

/// Failures of a single submission attempt.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Request could not complete (connection, TLS, read).
    #[error("transport error: {0}")]
    Transport(String),
    /// Response body was not the expected JSON shape.
    #[error("invalid response body: {0}")]
    InvalidResponse(#[from] serde_json::Error),
    /// The blocking submission task was cancelled or panicked.
    #[error("submission task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Blocking POST seam, so tests can substitute the HTTP layer.
pub trait Transport: Send + Sync {
    /// POST a form-encoded body and return the raw response body.
    fn post_form(
        &self,
        url: &str,
        fields: &[(&'static str, String)],
    ) -> Result<String, ReportError>;
}

/// Real transport backed by ureq.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpTransport;

impl Transport for HttpTransport {
    fn post_form(
        &self,
        url: &str,
        fields: &[(&'static str, String)],
    ) -> Result<String, ReportError> {
        let mut response = ureq::post(url)
            .send_form(fields.iter().map(|(name, value)| (*name, value.as_str())))
            .map_err(|e| ReportError::Transport(e.to_string()))?;
        response
            .body_mut()
            .read_to_string()
            .map_err(|e| ReportError::Transport(e.to_string()))
    }
}

/// Serializes a finalized snapshot and sends it once to the collection
/// endpoint.
pub struct Reporter {
    transport: Arc<dyn Transport>,
}

impl Reporter {
    /// Reporter using the real HTTP transport.
    pub fn new() -> Self {
        Self::with_transport(Arc::new(HttpTransport))
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Send one submission and interpret the JSON response.
    ///
    /// The blocking POST runs on the blocking pool; the page-view task
    /// stays suspended for the network round trip.
    pub async fn submit(
        &self,
        endpoint: &str,
        submission: Submission,
        version: SchemaVersion,
    ) -> Result<CollectResponse, ReportError> {
        let fields = submission.form_fields(version);
        let transport = Arc::clone(&self.transport);
        let url = endpoint.to_string();
        let body =
            tokio::task::spawn_blocking(move || transport.post_form(&url, &fields)).await??;
        Ok(CollectResponse::from_json(&body)?)
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}
