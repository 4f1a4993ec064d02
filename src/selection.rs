//! Disambiguation capability for `[select]` modality slots.
//!
//! When a request carries the `[select]` suffix and several files of that
//! type exist for one subject/eye, a human has to pick one. The pipeline
//! never talks to a UI directly: it calls the injected [`ImageSelector`],
//! which may block for as long as it likes. This is the only suspension
//! point of a run.
//!
//! The deterministic implementations here ([`FirstCandidate`],
//! [`NoSelection`], [`NthCandidate`]) make the pipeline usable headless and
//! in tests; the binary ships an interactive terminal prompt.

use crate::pipeline::discover::ImageAsset;
use std::path::PathBuf;
use std::sync::Arc;

/// Chooses one file among several candidates of the same modality.
pub trait ImageSelector: Send + Sync {
    /// Pick one of `candidates` (sorted by sequence number) or `None` for
    /// "use no image".
    ///
    /// # Arguments
    /// * `candidates` — never empty
    /// * `title`      — human-readable context, e.g. `"1204 OD - BAF"`
    fn request_disambiguation(&self, candidates: &[ImageAsset], title: &str) -> Option<PathBuf>;
}

/// Always picks the first candidate in sequence order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstCandidate;

impl ImageSelector for FirstCandidate {
    fn request_disambiguation(&self, candidates: &[ImageAsset], _title: &str) -> Option<PathBuf> {
        candidates.first().map(|a| a.path.clone())
    }
}

/// Always answers "none"; the slot gets a placeholder.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSelection;

impl ImageSelector for NoSelection {
    fn request_disambiguation(&self, _candidates: &[ImageAsset], _title: &str) -> Option<PathBuf> {
        None
    }
}

/// Picks the candidate at a fixed 0-based position, or none when out of range.
#[derive(Debug, Clone, Copy)]
pub struct NthCandidate(pub usize);

impl ImageSelector for NthCandidate {
    fn request_disambiguation(&self, candidates: &[ImageAsset], _title: &str) -> Option<PathBuf> {
        candidates.get(self.0).map(|a| a.path.clone())
    }
}

/// Convenience alias matching the type stored in [`crate::config::CompilationConfig`].
pub type Selector = Arc<dyn ImageSelector>;
