//! Performance-entry observation and dispatch.
//!
//! Four categories of performance signal are watched: paint timing,
//! largest-contentful-paint candidates, generic event timing (the INP
//! source), and layout shifts. [`ObserverSet`] applies each category's
//! acceptance rules and forwards accepted entries to the record's
//! per-metric setters. Subscriptions are buffered: the host replays
//! entries recorded before the pipeline started, in recorded order, ahead
//! of live delivery.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::record::RenderRecord;

/// Paint entry name accepted for FCP.
pub const FIRST_CONTENTFUL_PAINT: &str = "first-contentful-paint";

/// Event entry name accepted for INP.
pub const INTERACTION_TO_NEXT_PAINT: &str = "interaction-to-next-paint";

/// One performance event delivered by the host page.
///
/// Tagged so recorded traces round-trip as JSON with the browser's entry
/// type strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PerformanceEntry {
    /// Paint timing entry; only `first-contentful-paint` is accepted.
    #[serde(rename_all = "camelCase")]
    Paint { name: String, start_time: f64 },
    /// Largest-contentful-paint candidate.
    #[serde(rename_all = "camelCase")]
    LargestContentfulPaint { start_time: f64 },
    /// Generic event timing entry; the INP signal carries a duration.
    #[serde(rename_all = "camelCase")]
    Event { name: String, duration: f64 },
    /// Layout-shift entry; shifts following user input are excluded.
    #[serde(rename_all = "camelCase")]
    LayoutShift { value: f64, had_recent_input: bool },
}

/// Dispatches entries into the record, one acceptance rule per category.
#[derive(Debug, Default)]
pub struct ObserverSet {
    fcp_seen: bool,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one entry. Rejected entries leave the record untouched.
    pub fn apply(&mut self, record: &mut RenderRecord, entry: &PerformanceEntry) {
        match entry {
            PerformanceEntry::Paint { name, start_time } => {
                // First occurrence wins; later paint entries never overwrite.
                if name == FIRST_CONTENTFUL_PAINT && !self.fcp_seen {
                    self.fcp_seen = true;
                    record.set_fcp(*start_time);
                    debug!(fcp = *start_time, "FCP");
                }
            }
            PerformanceEntry::LargestContentfulPaint { start_time } => {
                record.observe_lcp(*start_time);
                debug!(lcp = *start_time, "LCP");
            }
            PerformanceEntry::Event { name, duration } => {
                if name == INTERACTION_TO_NEXT_PAINT {
                    record.set_inp(*duration);
                    debug!(inp = *duration, "INP");
                }
            }
            PerformanceEntry::LayoutShift {
                value,
                had_recent_input,
            } => {
                if !had_recent_input {
                    record.add_layout_shift(*value);
                    debug!(shift = *value, "CLS");
                }
            }
        }
    }
}
