//! Leaf analysis pipeline: upload → vision model → normalizer → store.
//!
//! - [`Analyzer`]: orchestrates one analysis request
//! - [`normalize`]: turns untrusted model text into a [`Diagnosis`](crate::storage::Diagnosis)
//! - [`extract`]: finds JSON objects embedded in prose

mod analyzer;
pub mod extract;
mod normalizer;

pub use analyzer::*;
pub use normalizer::{clamp_confidence, normalize};
