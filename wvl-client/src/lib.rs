//! Client-side web vitals collection pipeline.
//!
//! One [`pipeline::PageView`] models one page render: performance entries
//! arrive asynchronously from the host page, [`observe::ObserverSet`]
//! filters them into the [`record::RenderRecord`] accumulator, and a
//! one-shot flush hands the finalized snapshot to the
//! [`report::Reporter`] for a single, best-effort, form-encoded POST to
//! the collection endpoint. Loss is silent: nothing is retried.

pub mod observe;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod trace;
