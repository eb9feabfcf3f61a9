//! Page-view pipeline: entry loop plus the one-shot flush.
//!
//! The page view's task is the ownership scope for the whole pipeline:
//! record, observers and flush timer all live inside it, so dropping the
//! task (page teardown) is the only cancellation path. Entry delivery and
//! the flush deadline are multiplexed on one task — no two handlers ever
//! touch the record concurrently.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

use wvl_common::{
    CollectResponse, NavigationTiming, PageConfig, SchemaVersion, Submission,
    UserClassification, VitalsSnapshot,
};

use crate::observe::{ObserverSet, PerformanceEntry};
use crate::record::RenderRecord;
use crate::report::{ReportError, Reporter};

/// Fixed delay from pipeline start to the single flush.
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_millis(5000);

/// Inputs for one page view.
#[derive(Debug)]
pub struct PageView {
    /// Server-provided page-load configuration.
    pub config: PageConfig,
    /// Page URL, captured at page-load time.
    pub url: String,
    /// Visitor classification, derived once by the host.
    pub user: UserClassification,
    /// Navigation timing, when the host exposes it.
    pub navigation: Option<NavigationTiming>,
    /// Entry delivery channel. The host pre-loads buffered entries
    /// (recorded before the pipeline started) ahead of live ones. `None`
    /// means the host lacks performance observation support.
    pub entries: Option<mpsc::Receiver<PerformanceEntry>>,
}

/// Pipeline tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Delay from pipeline start to the one-shot flush.
    pub flush_delay: Duration,
    /// Wire schema for the submission.
    pub schema: SchemaVersion,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            flush_delay: DEFAULT_FLUSH_DELAY,
            schema: SchemaVersion::Correlated,
        }
    }
}

/// Result of the single flush: the snapshot that was taken and how the
/// submission went.
#[derive(Debug)]
pub struct FlushOutcome {
    pub snapshot: VitalsSnapshot,
    pub response: Result<CollectResponse, ReportError>,
}

/// Run one page view to completion.
///
/// Applies entries as they arrive, flushes exactly once after the
/// configured delay, and hands the snapshot to the reporter. Returns
/// `None` without submitting when the host lacks performance observation
/// support (the observing schemas degrade to a no-op). Submission
/// failures are logged and dropped, never retried.
pub async fn run_page_view(
    view: PageView,
    config: PipelineConfig,
    reporter: &Reporter,
) -> Option<FlushOutcome> {
    let mut record = RenderRecord::new(view.navigation.as_ref());

    // The legacy TTFB-only schema predates the observers and submits the
    // navigation-derived value alone; every observing schema requires the
    // entry source and silently disables itself without one.
    let mut rx = if config.schema.includes_paint_metrics() {
        match view.entries {
            Some(rx) => Some(rx),
            None => {
                debug!("performance observation unsupported, collection disabled");
                return None;
            }
        }
    } else {
        None
    };

    let mut observers = ObserverSet::new();
    let mut open = rx.is_some();
    let flush = sleep_until(Instant::now() + config.flush_delay);
    tokio::pin!(flush);

    loop {
        tokio::select! {
            _ = &mut flush => break,
            maybe = recv_next(&mut rx), if open => match maybe {
                Some(entry) => observers.apply(&mut record, &entry),
                // Source closed; wait out the flush deadline.
                None => open = false,
            },
        }
    }

    let snapshot = record.snapshot();
    let submission = Submission {
        vitals: snapshot,
        user_type: view.user,
        url: view.url,
        nonce: view.config.nonce,
        page_render_uuid: view.config.page_render_uuid,
    };

    let response = reporter
        .submit(&view.config.collect_url, submission, config.schema)
        .await;
    match &response {
        Ok(body) if body.success => debug!(data = %body.data, "submission accepted"),
        Ok(body) => warn!(data = %body.data, "submission rejected"),
        Err(e) => warn!(error = %e, "submission failed"),
    }

    Some(FlushOutcome { snapshot, response })
}

async fn recv_next(
    rx: &mut Option<mpsc::Receiver<PerformanceEntry>>,
) -> Option<PerformanceEntry> {
    match rx.as_mut() {
        Some(entries) => entries.recv().await,
        None => std::future::pending().await,
    }
}
