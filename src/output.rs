//! Result types returned by the compile entry points.

use crate::error::AssetError;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// The composed document plus statistics about the run.
#[derive(Debug, Clone)]
pub struct CompilationOutput {
    /// The finished document raster.
    pub image: RgbImage,
    pub stats: CompilationStats,
}

/// Aggregate statistics for one compilation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompilationStats {
    /// Subjects placed in the document.
    pub subjects_placed: usize,
    /// Image files discovered for included subjects.
    pub files_discovered: usize,
    /// Slots filled with a real image.
    pub images_placed: usize,
    /// Slots filled with a placeholder (no file, declined selection, decode failure).
    pub placeholders: usize,
    /// Files skipped for malformed names plus files that failed to decode.
    pub asset_errors: Vec<AssetError>,
    /// Grid columns used.
    pub columns: usize,
    /// Size of every subject canvas.
    pub subject_canvas_width: u32,
    pub subject_canvas_height: u32,
    /// Size of the document.
    pub width: u32,
    pub height: u32,
    pub total_duration_ms: u64,
}

/// What the source directories offer, gathered without composing anything.
///
/// This is the data an interactive front end shows before a run: which
/// subjects exist, which request strings make sense, and sensible defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInventory {
    /// Subject ids found on disk, sorted.
    pub subjects: Vec<String>,
    /// Request strings accepted by the modality parser, sorted.
    pub available_requests: Vec<String>,
    /// `(rows, columns)` for the subjects considered.
    pub suggested_grid: (usize, usize),
    /// Smallest cross-sectional height that keeps every detected retina whole.
    pub suggested_cross_sectional_height: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn stats_serialise_with_errors() {
        let stats = CompilationStats {
            subjects_placed: 2,
            images_placed: 5,
            placeholders: 3,
            asset_errors: vec![AssetError::DecodeFailed {
                path: PathBuf::from("/d/1_OD_h.png"),
                detail: "truncated".into(),
            }],
            width: 1200,
            height: 900,
            ..Default::default()
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["subjects_placed"], 2);
        assert_eq!(json["width"], 1200);
        assert!(json["asset_errors"][0]["DecodeFailed"].is_object());
    }

    #[test]
    fn inventory_json_shape() {
        let inv = SourceInventory {
            subjects: vec!["1".into(), "2".into()],
            available_requests: vec!["OCT horizontal".into()],
            suggested_grid: (1, 2),
            suggested_cross_sectional_height: Some(120),
        };
        let json = serde_json::to_string(&inv).unwrap();
        assert!(json.contains("\"suggested_grid\":[1,2]"), "{json}");
        let back: SourceInventory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, inv);
    }
}
