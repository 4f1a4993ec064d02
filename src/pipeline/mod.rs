//! Pipeline stages for composing the document.
//!
//! Each submodule implements one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! discover ──▶ modality ──▶ canvas ──▶ layout
//! (files)      (slots)      (subject)  (document)
//!                 ▲            ▲  ▲
//!                 │        bounds text
//!             selector
//! ```
//!
//! 1. [`discover`] — walk the source directories and parse filenames
//! 2. [`modality`] — parse request strings; pick one file per slot
//! 3. [`bounds`]   — find the retina band in cross-sectional scans and
//!    normalise their height
//! 4. [`text`]     — font metrics and glyph drawing
//! 5. [`canvas`]   — fixed-size per-subject canvases
//! 6. [`layout`]   — place everything and size the document

pub mod bounds;
pub mod canvas;
pub mod discover;
pub mod layout;
pub mod modality;
pub mod text;
