//! Mock transports for driving the pipeline without a network.

use std::sync::{Arc, Mutex};

use wvl_client::report::{ReportError, Transport};

/// One recorded POST.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub url: String,
    pub fields: Vec<(&'static str, String)>,
}

impl RecordedCall {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Transport double that records every POST and answers with a canned
/// outcome.
pub struct RecordingTransport {
    body: Option<String>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingTransport {
    /// Always answers with a success response.
    pub fn accepting() -> Arc<Self> {
        Self::with_body(r#"{"success":true,"data":"Performance data logged successfully."}"#)
    }

    /// Always answers with an application-level failure response.
    pub fn rejecting() -> Arc<Self> {
        Self::with_body(r#"{"success":false,"data":"Invalid data received."}"#)
    }

    /// Fails every request at the transport level.
    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            body: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn with_body(body: &str) -> Arc<Self> {
        Arc::new(Self {
            body: Some(body.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Transport for RecordingTransport {
    fn post_form(
        &self,
        url: &str,
        fields: &[(&'static str, String)],
    ) -> Result<String, ReportError> {
        self.calls.lock().unwrap().push(RecordedCall {
            url: url.to_string(),
            fields: fields.to_vec(),
        });
        match &self.body {
            Some(body) => Ok(body.clone()),
            None => Err(ReportError::Transport("connection refused".to_string())),
        }
    }
}
