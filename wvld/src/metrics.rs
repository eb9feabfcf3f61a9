//! Prometheus metrics for the collection daemon.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, TextEncoder};

lazy_static! {
    /// Page-render identities issued.
    pub static ref RENDERS_ISSUED_TOTAL: IntCounter = IntCounter::new(
        "wvld_renders_issued_total",
        "Page render identities issued"
    )
    .expect("metric can be created");

    /// Submissions accepted and stored.
    pub static ref SUBMISSIONS_STORED_TOTAL: IntCounter = IntCounter::new(
        "wvld_submissions_stored_total",
        "Metric submissions accepted and stored"
    )
    .expect("metric can be created");

    /// Submissions rejected before or during storage.
    pub static ref SUBMISSIONS_REJECTED_TOTAL: IntCounter = IntCounter::new(
        "wvld_submissions_rejected_total",
        "Metric submissions rejected"
    )
    .expect("metric can be created");
}

/// Register the daemon's metrics with the default registry.
pub fn register_metrics() -> prometheus::Result<()> {
    let registry = prometheus::default_registry();
    registry.register(Box::new(RENDERS_ISSUED_TOTAL.clone()))?;
    registry.register(Box::new(SUBMISSIONS_STORED_TOTAL.clone()))?;
    registry.register(Box::new(SUBMISSIONS_REJECTED_TOTAL.clone()))?;
    Ok(())
}

/// Encode all registered metrics in the Prometheus text format.
pub fn encode_metrics() -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&prometheus::default_registry().gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_includes_registered_counters() {
        let _ = register_metrics();
        RENDERS_ISSUED_TOTAL.inc();
        let output = encode_metrics().unwrap();
        assert!(output.contains("wvld_renders_issued_total"));
    }
}
