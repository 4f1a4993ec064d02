//! Error types for the eyegrid library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`CompileError`] — **Fatal**: the document cannot be produced at all
//!   (bad configuration, no images anywhere, no usable font, output not
//!   writable). Returned as `Err(CompileError)` from the `compile*` functions.
//!
//! * [`AssetError`] — **Non-fatal**: a single file could not be used (its
//!   name does not follow the naming convention, or it does not decode).
//!   The file is skipped or replaced by a placeholder and the batch goes on;
//!   the errors are collected in [`crate::output::CompilationStats`].
//!
//! A batch over dozens of subjects should not be lost to one bad file, so
//! only conditions that leave nothing to draw are fatal.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the eyegrid library.
#[derive(Debug, Error)]
pub enum CompileError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A requested modality string could not be parsed.
    #[error("Invalid modality request '{request}': {reason}")]
    InvalidModality { request: String, reason: String },

    /// Every modality request was rejected; there is nothing to lay out.
    #[error("No usable modality requests remain after parsing")]
    NoModalities,

    // ── Input errors ──────────────────────────────────────────────────────
    /// No image file for any active subject was found in any directory.
    #[error("No images found for the configured subjects in: {}", display_paths(.directories))]
    NoImagesFound { directories: Vec<PathBuf> },

    /// A configured source directory could not be listed.
    #[error("Cannot read directory '{path}': {source}")]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Font errors ───────────────────────────────────────────────────────
    /// No font was configured and none of the well-known system fonts exist.
    #[error(
        "No font available for text rendering.\n\
Pass --font /path/to/font.ttf (any TrueType/OpenType font) or set EYEGRID_FONT."
    )]
    FontNotFound,

    /// The font file exists but could not be parsed.
    #[error("Failed to load font '{path}': {detail}")]
    FontLoadFailed { path: PathBuf, detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the output image file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The composed raster could not be encoded in the requested format.
    #[error("Failed to encode '{path}': {detail}")]
    EncodeFailed { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "(no directories)".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A non-fatal error for a single image file.
///
/// Naming errors make the file unavailable for resolution; decode errors
/// turn its slot into a black placeholder.
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AssetError {
    /// The filename has the wrong number of `_`-separated fields.
    #[error("{path}: expected {expected} '_'-separated fields, found {found}")]
    FilenameMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    /// The eye field is neither OD nor OS.
    #[error("{path}: unknown eye '{token}' (expected OD or OS)")]
    UnknownEye { path: PathBuf, token: String },

    /// The leading sequence number of a planar filename is not a number.
    #[error("{path}: sequence number '{token}' is not an integer")]
    BadSequence { path: PathBuf, token: String },

    /// The file could not be opened or decoded as an image.
    #[error("{path}: decode failed: {detail}")]
    DecodeFailed { path: PathBuf, detail: String },

    /// The selector returned a path that was not among the candidates.
    #[error("{path}: selection is not one of the offered candidates")]
    UnknownSelection { path: PathBuf },
}

impl AssetError {
    /// The file this error is about.
    pub fn path(&self) -> &std::path::Path {
        match self {
            AssetError::FilenameMismatch { path, .. }
            | AssetError::UnknownEye { path, .. }
            | AssetError::BadSequence { path, .. }
            | AssetError::DecodeFailed { path, .. }
            | AssetError::UnknownSelection { path } => path,
        }
    }
}
