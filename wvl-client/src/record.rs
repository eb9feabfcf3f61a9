//! Per-page-view metric accumulator.

use tokio::time::Instant;
use wvl_common::{NavigationTiming, VitalsSnapshot};

/// Mutable accumulator for one page view's metrics.
///
/// Created at page-load start and owned by the page view's pipeline; the
/// observers are the only writers, each through its own setter. TTFB is
/// derived once at creation and never rewritten. Every accepted update
/// also recomputes the elapsed collection window.
#[derive(Debug)]
pub struct RenderRecord {
    started: Instant,
    ttfb: f64,
    fcp: f64,
    lcp: f64,
    cls: f64,
    inp: f64,
    measurement_seconds: f64,
}

impl RenderRecord {
    /// Create the record at page-load start.
    ///
    /// Without navigation timing (the host did not expose it), TTFB stays
    /// at its zero default.
    pub fn new(navigation: Option<&NavigationTiming>) -> Self {
        Self {
            started: Instant::now(),
            ttfb: navigation.map(NavigationTiming::ttfb_ms).unwrap_or(0.0),
            fcp: 0.0,
            lcp: 0.0,
            cls: 0.0,
            inp: 0.0,
            measurement_seconds: 0.0,
        }
    }

    /// Record the first-contentful-paint timestamp.
    pub fn set_fcp(&mut self, start_time: f64) {
        self.fcp = start_time;
        self.touch();
    }

    /// Record a largest-contentful-paint candidate. Each call replaces the
    /// previous value: the browser reports progressively larger candidates
    /// and only the last one before flush matters.
    pub fn observe_lcp(&mut self, start_time: f64) {
        self.lcp = start_time;
        self.touch();
    }

    /// Accumulate one qualifying layout shift's magnitude.
    pub fn add_layout_shift(&mut self, value: f64) {
        self.cls += value;
        self.touch();
    }

    /// Record the interaction-to-next-paint duration.
    pub fn set_inp(&mut self, duration: f64) {
        self.inp = duration;
        self.touch();
    }

    fn touch(&mut self) {
        self.measurement_seconds = self.started.elapsed().as_secs_f64();
    }

    /// Take the current values as one snapshot for transmission.
    pub fn snapshot(&self) -> VitalsSnapshot {
        VitalsSnapshot {
            ttfb: self.ttfb,
            fcp: self.fcp,
            lcp: self.lcp,
            cls: self.cls,
            inp: self.inp,
            measurement_seconds: self.measurement_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn new_record_defaults_to_zero() {
        let record = RenderRecord::new(None);
        let snapshot = record.snapshot();
        assert_eq!(snapshot, VitalsSnapshot::default());
    }

    #[test]
    fn ttfb_derived_once_from_navigation_timing() {
        let nav = NavigationTiming {
            request_start: 10.0,
            response_start: 190.0,
        };
        let record = RenderRecord::new(Some(&nav));
        assert_eq!(record.snapshot().ttfb, 180.0);
    }

    #[test]
    fn lcp_last_write_wins() {
        let mut record = RenderRecord::new(None);
        record.observe_lcp(1200.0);
        record.observe_lcp(1500.0);
        record.observe_lcp(900.0);
        // The last delivered candidate, not the maximum.
        assert_eq!(record.snapshot().lcp, 900.0);
    }

    #[test]
    fn cls_accumulates() {
        let mut record = RenderRecord::new(None);
        record.add_layout_shift(0.01);
        record.add_layout_shift(0.02);
        assert!((record.snapshot().cls - 0.03).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn updates_recompute_elapsed_seconds() {
        let mut record = RenderRecord::new(None);
        tokio::time::advance(Duration::from_millis(1500)).await;
        record.add_layout_shift(0.05);
        let after_first = record.snapshot().measurement_seconds;
        assert!((after_first - 1.5).abs() < 0.01);

        tokio::time::advance(Duration::from_millis(2000)).await;
        record.observe_lcp(2400.0);
        let after_second = record.snapshot().measurement_seconds;
        assert!((after_second - 3.5).abs() < 0.01);
    }
}
