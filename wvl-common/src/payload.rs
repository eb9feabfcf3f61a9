//! Wire contract for metric submissions.
//!
//! The submission schema evolved additively across deployments: TTFB-only,
//! then the four paint/layout metrics, then INP, then the page-render
//! correlation token. [`SchemaVersion`] captures the four shapes;
//! [`Submission::form_fields`] renders the form-encoded body for any of
//! them. The canonical client version is [`SchemaVersion::Correlated`].

use serde::{Deserialize, Serialize};

use crate::types::UserClassification;

/// Action discriminator for the four/five-metric submission.
pub const ACTION_LOG_WEBVITALS: &str = "log_webvitals";

/// Action discriminator for the legacy TTFB-only submission.
pub const ACTION_LOG_TTFB: &str = "log_ttfb";

/// Shape of the form-encoded submission body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaVersion {
    /// TTFB, user type, URL and nonce only.
    TtfbOnly,
    /// Adds LCP, CLS, FCP and the measurement window.
    FourMetric,
    /// Adds INP.
    FiveMetric,
    /// Adds the page-render correlation token.
    #[default]
    Correlated,
}

impl SchemaVersion {
    /// The action discriminator sent with this schema.
    pub fn action(&self) -> &'static str {
        match self {
            Self::TtfbOnly => ACTION_LOG_TTFB,
            _ => ACTION_LOG_WEBVITALS,
        }
    }

    /// Whether the paint/layout metric set (LCP, CLS, FCP, window) is sent.
    pub fn includes_paint_metrics(&self) -> bool {
        !matches!(self, Self::TtfbOnly)
    }

    /// Whether INP is sent.
    pub fn includes_inp(&self) -> bool {
        matches!(self, Self::FiveMetric | Self::Correlated)
    }

    /// Whether the page-render correlation token is echoed back.
    pub fn includes_correlation(&self) -> bool {
        matches!(self, Self::Correlated)
    }
}

/// Finalized per-page-view metric values, taken as one snapshot at flush.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalsSnapshot {
    pub ttfb: f64,
    pub fcp: f64,
    pub lcp: f64,
    pub cls: f64,
    pub inp: f64,
    /// Seconds from page-load start to the last metric update.
    pub measurement_seconds: f64,
}

/// One outbound submission: the snapshot plus its contextual fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub vitals: VitalsSnapshot,
    pub user_type: UserClassification,
    /// Page URL, captured at page-load time.
    pub url: String,
    /// Anti-forgery token issued with the page.
    pub nonce: String,
    /// Correlation token; `None` submits uncorrelated.
    pub page_render_uuid: Option<String>,
}

impl Submission {
    /// Render the form-encoded field list for the given schema version.
    ///
    /// Field presence follows the additive schema: older versions simply
    /// omit fields they predate. A missing correlation token is omitted
    /// rather than sent empty, so the submission proceeds uncorrelated.
    pub fn form_fields(&self, version: SchemaVersion) -> Vec<(&'static str, String)> {
        let mut fields = Vec::with_capacity(11);

        if version.includes_paint_metrics() {
            fields.push(("lcp", fmt_metric(self.vitals.lcp)));
            fields.push(("cls", fmt_metric(self.vitals.cls)));
        }
        fields.push(("ttfb", fmt_metric(self.vitals.ttfb)));
        if version.includes_paint_metrics() {
            fields.push(("fcp", fmt_metric(self.vitals.fcp)));
        }
        if version.includes_inp() {
            fields.push(("inp", fmt_metric(self.vitals.inp)));
        }
        if version.includes_paint_metrics() {
            fields.push(("measurementSeconds", fmt_metric(self.vitals.measurement_seconds)));
        }

        fields.push(("action", version.action().to_string()));
        fields.push(("userType", self.user_type.as_str().to_string()));
        fields.push(("url", self.url.clone()));
        fields.push(("nonce", self.nonce.clone()));

        if version.includes_correlation()
            && let Some(uuid) = &self.page_render_uuid
        {
            fields.push(("pageRenderUuid", uuid.clone()));
        }

        fields
    }
}

fn fmt_metric(value: f64) -> String {
    value.to_string()
}

/// JSON response from the collection endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectResponse {
    pub success: bool,
    /// Human-readable outcome message.
    pub data: String,
}

impl CollectResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: message.into(),
        }
    }

    /// Parse an endpoint response body.
    pub fn from_json(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }
}
