//! Shared types and the wire contract for the web vitals logger.
//!
//! The client pipeline (`wvl-client`) and the collection daemon (`wvld`)
//! both speak the form-encoded submission schema defined in [`payload`],
//! and exchange the page-load configuration defined in [`types`].

pub mod payload;
pub mod types;

pub use payload::{
    ACTION_LOG_TTFB, ACTION_LOG_WEBVITALS, CollectResponse, SchemaVersion, Submission,
    VitalsSnapshot,
};
pub use types::{NavigationTiming, PageConfig, UserClassification};
