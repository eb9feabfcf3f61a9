//! Common types used across the client pipeline and the daemon.

use serde::{Deserialize, Serialize};

/// Visitor classification, derived once at collection time from ambient
/// session state supplied by the host page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserClassification {
    /// Anonymous visitor.
    Guest,
    /// Authenticated visitor.
    LoggedIn,
}

impl UserClassification {
    /// Derive the classification from the host page's session flag.
    pub fn from_logged_in(logged_in: bool) -> Self {
        if logged_in { Self::LoggedIn } else { Self::Guest }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::LoggedIn => "logged_in",
        }
    }
}

impl Default for UserClassification {
    fn default() -> Self {
        Self::Guest
    }
}

impl std::fmt::Display for UserClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Server-provided page-load configuration, injected before the client
/// pipeline starts.
///
/// The correlation token is absent for uncorrelated (pre-V4) deployments;
/// when present the client echoes it back unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageConfig {
    /// URL of the collection endpoint.
    pub collect_url: String,
    /// Anti-forgery token issued for this page load.
    pub nonce: String,
    /// Opaque page-render correlation token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_render_uuid: Option<String>,
}

/// Navigation timing milestones, in milliseconds from navigation start.
///
/// TTFB is derived exactly once from these at record creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationTiming {
    /// Time the request was issued.
    pub request_start: f64,
    /// Time the first response byte arrived.
    pub response_start: f64,
}

impl NavigationTiming {
    /// Interval between request start and first byte of response.
    pub fn ttfb_ms(&self) -> f64 {
        self.response_start - self.request_start
    }
}
