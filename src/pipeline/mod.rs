//! Pipeline stages of a workflow run.
//!
//! Each submodule implements one stage. The coordinator in
//! [`crate::workflow`] decides when each runs; the stages themselves only
//! talk to services and dispatch state actions.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ enrich ──▶ (stage 4) ──▶ analysis
//! (PDFs)   (one by one) (racing)                 (Q&A catalog)
//! ```
//!
//! 1. [`input`]: read local paths, download URLs, reject non-PDFs
//! 2. [`extract`]: sequential extraction loop with fixed pacing
//! 3. [`enrich`]: concurrent enrichment requests behind a quorum
//! 4. [`analysis`]: the automated question sequence over the first
//!    completed document

pub mod analysis;
pub mod enrich;
pub mod extract;
pub mod input;
