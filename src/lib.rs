//! # eyegrid
//!
//! Compile per-subject retinal images into one large figure.
//!
//! ## Why this crate?
//!
//! Longitudinal imaging studies produce hundreds of files per time point:
//! en-face confocal scans (cSLO) in several modalities and cross-sectional
//! scans (OCT), for both eyes of every animal. Laying them out by hand in a
//! slide editor is slow and error-prone. This crate reads the exports
//! straight from the imagers' folder conventions and composes a single
//! raster: one canvas per subject (OD and OS side by side, one row per
//! requested modality), arranged in a grid, optionally grouped by cohort.
//!
//! ## Pipeline Overview
//!
//! ```text
//! directories + subject table + modality requests
//!  │
//!  ├─ 1. Parse     "cSLO BAF (2nd)" → ModalitySpec
//!  ├─ 2. Discover  filenames → ImageAsset buckets (subject / eye / imager)
//!  ├─ 3. Measure   slot sizes + heading height, once per run
//!  ├─ 4. Plan      title, groups, labels, subject slots → document extent
//!  └─ 5. Render    assemble each subject canvas and paste it
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use eyegrid::{compile_to_file, CompilationConfig, Imager, SubjectRecord};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CompilationConfig::builder()
//!         .directory("/data/week4/cslo", Imager::Planar)
//!         .directory("/data/week4/oct", Imager::CrossSectional)
//!         .subject(SubjectRecord::new("1204", "M-17", "Control"))
//!         .subject(SubjectRecord::new("1205", "M-18", "Treated"))
//!         .group_order(["Control", "Treated"])
//!         .modality("cSLO BAF", "BAF")
//!         .modality("cSLO IRAF [select]", "IRAF")
//!         .modality("OCT horizontal", "Horizontal")
//!         .cross_sectional_height(300)
//!         .build()?;
//!     let stats = compile_to_file("week4.jpg", &config).await?;
//!     eprintln!("{} subjects, {} placeholders", stats.subjects_placed, stats.placeholders);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `eyegrid` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! eyegrid = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod compile;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod selection;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use compile::{compile, compile_async, compile_to_file, inspect, resolve_typesetter};
pub use config::{
    CompilationConfig, CompilationConfigBuilder, FontSizes, Imager, LayoutStyle, ModalityRequest,
    RenderMode, SourceDirectory, SubjectRecord, SubjectTable,
};
pub use error::{AssetError, CompileError};
pub use output::{CompilationOutput, CompilationStats, SourceInventory};
pub use pipeline::discover::{Eye, ImageAsset};
pub use pipeline::layout::grid_size;
pub use pipeline::modality::{ModalitySpec, SelectionPolicy};
pub use pipeline::text::{GlyphTypesetter, TextExtent, Typesetter};
pub use progress::{CompilationProgressCallback, NoopProgressCallback, ProgressCallback};
pub use selection::{FirstCandidate, ImageSelector, NoSelection, NthCandidate};
