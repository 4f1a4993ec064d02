//! Text measurement and drawing.
//!
//! Layout is decided from text metrics before a single pixel is drawn, so the
//! pipeline talks to fonts through the [`Typesetter`] trait: measure first,
//! draw later, with the same numbers. [`GlyphTypesetter`] is the real
//! implementation (ab_glyph outlines, rasterised by imageproc).
//!
//! All coordinates refer to the *ink box* of the text, not its line box: a
//! string measured as `w × h` and drawn at `(x, y)` covers exactly
//! `x..x+w, y..y+h`. This keeps centring arithmetic in the layout code free
//! of baseline bookkeeping.

use crate::error::CompileError;
use ab_glyph::{point, Font, FontArc, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Ink-box size of a measured string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextExtent {
    pub width: u32,
    pub height: u32,
    /// Offset of the ink from the pen origin (ascender line, left edge).
    /// Drawing code subtracts it to place the ink exactly.
    pub ink_left: i32,
    pub ink_top: i32,
}

/// Measures and draws single-line text at a pixel size.
pub trait Typesetter: Send + Sync {
    /// Ink-box extent of `text` at `size` pixels. Empty text measures `0 × 0`.
    fn measure(&self, text: &str, size: f32) -> TextExtent;

    /// Draw `text` so that its ink box starts at `(x, y)`.
    fn draw(&self, canvas: &mut RgbImage, text: &str, size: f32, x: i32, y: i32, color: Rgb<u8>);
}

/// [`Typesetter`] backed by a TrueType/OpenType font.
#[derive(Clone)]
pub struct GlyphTypesetter {
    font: FontArc,
}

impl std::fmt::Debug for GlyphTypesetter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlyphTypesetter")
            .field("glyphs", &self.font.glyph_count())
            .finish()
    }
}

impl GlyphTypesetter {
    /// Load a font file.
    pub fn from_file(path: &Path) -> Result<Self, CompileError> {
        let bytes = std::fs::read(path).map_err(|e| CompileError::FontLoadFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let font = FontArc::try_from_vec(bytes).map_err(|e| CompileError::FontLoadFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        debug!("Loaded font {}", path.display());
        Ok(Self { font })
    }

    /// Wrap in-memory font data.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ab_glyph::InvalidFont> {
        Ok(Self {
            font: FontArc::try_from_vec(bytes)?,
        })
    }
}

impl Typesetter for GlyphTypesetter {
    fn measure(&self, text: &str, size: f32) -> TextExtent {
        let scale = PxScale::from(size);
        let scaled = self.font.as_scaled(scale);

        // Same glyph placement as imageproc's text drawing: pen starts on the
        // ascender line, advancing with kerning.
        let mut pen_x = 0.0f32;
        let mut last = None;
        let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
        let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
        for c in text.chars() {
            let id = self.font.glyph_id(c);
            if let Some(prev) = last {
                pen_x += scaled.kern(prev, id);
            }
            let glyph = id.with_scale_and_position(scale, point(pen_x, scaled.ascent()));
            pen_x += scaled.h_advance(id);
            last = Some(id);

            if let Some(outlined) = self.font.outline_glyph(glyph) {
                let bb = outlined.px_bounds();
                min_x = min_x.min(bb.min.x);
                min_y = min_y.min(bb.min.y);
                max_x = max_x.max(bb.max.x);
                max_y = max_y.max(bb.max.y);
            }
        }

        if min_x > max_x {
            // Nothing visible (empty or whitespace only).
            return TextExtent::default();
        }
        TextExtent {
            width: (max_x - min_x).ceil() as u32,
            height: (max_y - min_y).ceil() as u32,
            ink_left: min_x.round() as i32,
            ink_top: min_y.round() as i32,
        }
    }

    fn draw(&self, canvas: &mut RgbImage, text: &str, size: f32, x: i32, y: i32, color: Rgb<u8>) {
        if text.is_empty() {
            return;
        }
        let extent = self.measure(text, size);
        draw_text_mut(
            canvas,
            color,
            x - extent.ink_left,
            y - extent.ink_top,
            PxScale::from(size),
            &self.font,
            text,
        );
    }
}

/// Fonts probed when neither a typesetter nor a font path is configured.
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// First existing well-known system font, if any.
pub fn locate_system_font() -> Option<PathBuf> {
    SYSTEM_FONT_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
}

/// Fixed-metric typesetter for unit tests: every character is a
/// `size/2 × size` block, ink starts at the line top.
#[cfg(test)]
pub(crate) struct BlockTypesetter;

#[cfg(test)]
impl Typesetter for BlockTypesetter {
    fn measure(&self, text: &str, size: f32) -> TextExtent {
        let n = text.chars().count() as f32;
        if n == 0.0 {
            return TextExtent::default();
        }
        TextExtent {
            width: (n * size / 2.0).ceil() as u32,
            height: size.ceil() as u32,
            ink_left: 0,
            ink_top: 0,
        }
    }

    fn draw(&self, canvas: &mut RgbImage, text: &str, size: f32, x: i32, y: i32, color: Rgb<u8>) {
        let e = self.measure(text, size);
        for py in y.max(0)..(y + e.height as i32).min(canvas.height() as i32) {
            for px in x.max(0)..(x + e.width as i32).min(canvas.width() as i32) {
                canvas.put_pixel(px as u32, py as u32, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_typesetter_draws_its_measured_box() {
        let mut canvas = RgbImage::new(40, 40);
        let ts = BlockTypesetter;
        let e = ts.measure("ab", 10.0);
        assert_eq!((e.width, e.height), (10, 10));
        ts.draw(&mut canvas, "ab", 10.0, 5, 7, Rgb([255, 255, 255]));
        assert_eq!(*canvas.get_pixel(5, 7), Rgb([255, 255, 255]));
        assert_eq!(*canvas.get_pixel(14, 16), Rgb([255, 255, 255]));
        assert_eq!(*canvas.get_pixel(15, 7), Rgb([0, 0, 0]));
        assert_eq!(*canvas.get_pixel(5, 17), Rgb([0, 0, 0]));
    }

    #[test]
    fn missing_font_file_is_reported() {
        let err = GlyphTypesetter::from_file(Path::new("/no/such/font.ttf")).unwrap_err();
        assert!(matches!(err, CompileError::FontLoadFailed { .. }));
    }

    #[test]
    fn garbage_font_bytes_rejected() {
        assert!(GlyphTypesetter::from_bytes(b"definitely not a font".to_vec()).is_err());
    }

    #[test]
    fn glyph_typesetter_ink_lands_at_requested_origin() {
        // Only meaningful where a system font is installed.
        let Some(path) = locate_system_font() else {
            return;
        };
        let ts = GlyphTypesetter::from_file(&path).unwrap();
        assert_eq!(ts.measure("", 40.0), TextExtent::default());
        assert_eq!(ts.measure("   ", 40.0), TextExtent::default());

        let e = ts.measure("OD", 40.0);
        assert!(e.width > 0 && e.height > 0);
        assert!(ts.measure("ODOS", 40.0).width > e.width);

        let mut canvas = RgbImage::new(200, 120);
        ts.draw(&mut canvas, "OD", 40.0, 30, 50, Rgb([255, 255, 255]));
        let lit: Vec<(u32, u32)> = canvas
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] > 0)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!lit.is_empty());
        let top = lit.iter().map(|&(_, y)| y).min().unwrap();
        let left = lit.iter().map(|&(x, _)| x).min().unwrap();
        assert!((49..=51).contains(&top), "ink top at {top}");
        assert!((29..=31).contains(&left), "ink left at {left}");
    }
}
