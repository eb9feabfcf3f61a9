//! Recorded page traces for replaying through the pipeline.
//!
//! A trace is the JSON record of one page view's performance entries and
//! their arrival offsets, plus the navigation timing the page started
//! with. The replay feeder delivers entries at their recorded offsets so
//! the pipeline sees the same interleaving the browser produced.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

use wvl_common::NavigationTiming;

use crate::observe::PerformanceEntry;

/// One recorded performance entry and its arrival offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEntry {
    /// Milliseconds from page-load start to delivery.
    pub at_ms: u64,
    #[serde(flatten)]
    pub entry: PerformanceEntry,
}

/// A recorded page view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageTrace {
    #[serde(default)]
    pub navigation: Option<NavigationTiming>,
    #[serde(default)]
    pub entries: Vec<TimedEntry>,
}

impl PageTrace {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Spawn a feeder delivering the trace's entries at their recorded
    /// offsets, scaled by `speed` (2.0 = twice as fast). Returns the
    /// receiving end for the pipeline; dropping it ends the feeder.
    pub fn replay(&self, speed: f64) -> mpsc::Receiver<PerformanceEntry> {
        let (tx, rx) = mpsc::channel(64);
        let mut entries = self.entries.clone();
        entries.sort_by_key(|timed| timed.at_ms);
        let speed = if speed > 0.0 { speed } else { 1.0 };
        let start = Instant::now();

        tokio::spawn(async move {
            for timed in entries {
                let offset = Duration::from_millis(timed.at_ms).div_f64(speed);
                sleep_until(start + offset).await;
                if tx.send(timed.entry).await.is_err() {
                    break;
                }
            }
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::FIRST_CONTENTFUL_PAINT;

    const SAMPLE: &str = r#"{
        "navigation": { "requestStart": 10.0, "responseStart": 180.0 },
        "entries": [
            { "at_ms": 800, "type": "paint", "name": "first-contentful-paint", "startTime": 800.0 },
            { "at_ms": 1200, "type": "largest-contentful-paint", "startTime": 1200.0 },
            { "at_ms": 1500, "type": "largest-contentful-paint", "startTime": 1500.0 },
            { "at_ms": 2000, "type": "layout-shift", "value": 0.01, "hadRecentInput": false },
            { "at_ms": 2600, "type": "event", "name": "interaction-to-next-paint", "duration": 24.0 }
        ]
    }"#;

    #[test]
    fn parses_all_entry_categories() {
        let trace = PageTrace::from_json(SAMPLE).unwrap();
        assert_eq!(trace.entries.len(), 5);
        assert_eq!(trace.navigation.unwrap().ttfb_ms(), 170.0);
        assert_eq!(
            trace.entries[0].entry,
            PerformanceEntry::Paint {
                name: FIRST_CONTENTFUL_PAINT.to_string(),
                start_time: 800.0,
            }
        );
    }

    #[test]
    fn json_round_trip_preserves_offsets() {
        let trace = PageTrace::from_json(SAMPLE).unwrap();
        let reparsed = PageTrace::from_json(&trace.to_json_pretty().unwrap()).unwrap();
        assert_eq!(trace, reparsed);
    }

    #[tokio::test(start_paused = true)]
    async fn replay_delivers_in_offset_order() {
        let trace = PageTrace::from_json(SAMPLE).unwrap();
        let mut rx = trace.replay(1.0);

        let mut delivered = Vec::new();
        while let Some(entry) = rx.recv().await {
            delivered.push(entry);
        }
        assert_eq!(delivered.len(), 5);
        assert!(matches!(delivered[0], PerformanceEntry::Paint { .. }));
        assert!(matches!(delivered[4], PerformanceEntry::Event { .. }));
    }
}
