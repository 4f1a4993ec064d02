//! Progress-callback trait for per-subject compilation events.
//!
//! Inject an [`Arc<dyn CompilationProgressCallback>`] via
//! [`crate::config::CompilationConfigBuilder::progress_callback`] to receive
//! events as the pipeline assembles each subject canvas.
//!
//! # Example
//!
//! ```rust
//! use eyegrid::CompilationProgressCallback;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl CompilationProgressCallback for CountingCallback {
//!     fn on_subject_complete(&self, subject_id: &str, index: usize, total: usize, placed: usize) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{subject_id}: {placed} images ({}/{total})", index + 1);
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { done: AtomicUsize::new(0) });
//! cb.on_subject_complete("1204", 0, 3, 4);
//! assert_eq!(cb.done.load(Ordering::SeqCst), 1);
//! ```

use std::sync::Arc;

/// Called by the compilation pipeline as it works through the subjects.
///
/// Implementations must be `Send + Sync` because the job may run on a
/// blocking worker thread (see [`crate::compile::compile_async`]). All
/// methods default to no-ops so callers only override what they care about.
pub trait CompilationProgressCallback: Send + Sync {
    /// Called once, after discovery, before the first subject is assembled.
    ///
    /// # Arguments
    /// * `total_subjects` — number of subjects that will be placed
    fn on_compilation_start(&self, total_subjects: usize) {
        let _ = total_subjects;
    }

    /// Called before a subject canvas is assembled.
    ///
    /// # Arguments
    /// * `subject_id` — the subject being assembled
    /// * `index`      — 0-indexed position in placement order
    /// * `total`      — number of subjects being placed
    fn on_subject_start(&self, subject_id: &str, index: usize, total: usize) {
        let _ = (subject_id, index, total);
    }

    /// Called after a subject canvas is assembled.
    ///
    /// # Arguments
    /// * `placed` — slots that received a real image (not a placeholder)
    fn on_subject_complete(&self, subject_id: &str, index: usize, total: usize, placed: usize) {
        let _ = (subject_id, index, total, placed);
    }

    /// Called when a file for this subject could not be used.
    fn on_asset_error(&self, subject_id: &str, error: &str) {
        let _ = (subject_id, error);
    }

    /// Called once after the document raster has been drawn.
    ///
    /// # Arguments
    /// * `total_subjects` — subjects placed
    /// * `width`, `height` — size of the finished document in pixels
    fn on_compilation_complete(&self, total_subjects: usize, width: u32, height: u32) {
        let _ = (total_subjects, width, height);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl CompilationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::CompilationConfig`].
pub type ProgressCallback = Arc<dyn CompilationProgressCallback>;
