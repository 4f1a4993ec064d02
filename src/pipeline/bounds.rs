//! Region detection and height normalisation for cross-sectional scans.
//!
//! A cross-sectional (OCT) scan is a dark frame with one horizontally
//! extended bright band: the retina. [`detect`] finds the band's vertical
//! extent from a per-row brightness profile; [`fit_to_height`] uses it to
//! crop every scan to a common height centred on the band, or pads scans that
//! are already shorter.
//!
//! The profile value of a row is its 95th-percentile intensity, which ignores
//! a few hot pixels but still responds to a wide bright band. The threshold
//! adapts to the whole frame: `max(mean + std, 50)`. Colour scans are
//! reduced to grey with BT.601 weights before profiling.

use image::{imageops, DynamicImage, GrayImage, Luma, RgbImage};
use std::path::PathBuf;
use tracing::debug;

/// Minimum brightness a row must exceed, whatever the frame statistics.
const THRESHOLD_FLOOR: f64 = 50.0;

const ROW_PERCENTILE: f64 = 95.0;

/// Vertical extent of the bright region, inclusive on both ends.
///
/// When nothing qualifies, [`detect`] returns the inverted sentinel
/// `top = height, bottom = 0`; check [`RetinaBounds::is_empty`] before using
/// the coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetinaBounds {
    pub top: u32,
    pub bottom: u32,
}

impl RetinaBounds {
    pub fn is_empty(&self) -> bool {
        self.top > self.bottom
    }

    pub fn center(&self) -> u32 {
        (self.top + self.bottom) / 2
    }

    /// `bottom - top`, or 0 for empty bounds.
    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// Find the rows of the brightest horizontally extended band.
pub fn detect(image: &GrayImage) -> RetinaBounds {
    let (width, height) = image.dimensions();
    let empty = RetinaBounds {
        top: height,
        bottom: 0,
    };
    if width == 0 || height == 0 {
        return empty;
    }

    let pixels = image.as_raw();
    let n = pixels.len() as f64;
    let mean = pixels.iter().map(|&p| p as f64).sum::<f64>() / n;
    let variance = pixels
        .iter()
        .map(|&p| {
            let d = p as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let threshold = (mean + variance.sqrt()).max(THRESHOLD_FLOOR);

    let mut row = Vec::with_capacity(width as usize);
    let mut bright = None::<(u32, u32)>;
    for (y, chunk) in pixels.chunks_exact(width as usize).enumerate() {
        row.clear();
        row.extend_from_slice(chunk);
        if percentile(&mut row, ROW_PERCENTILE) > threshold {
            let y = y as u32;
            bright = Some(match bright {
                None => (y, y),
                Some((top, _)) => (top, y),
            });
        }
    }

    match bright {
        Some((top, bottom)) => RetinaBounds { top, bottom },
        None => empty,
    }
}

/// Linear-interpolated percentile of `values` (sorted in place).
fn percentile(values: &mut [u8], q: f64) -> f64 {
    values.sort_unstable();
    let rank = q / 100.0 * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let (a, b) = (values[lo] as f64, values[hi] as f64);
    a + (b - a) * (rank - lo as f64)
}

/// Bring a cross-sectional scan to exactly `target` rows.
///
/// * same height: returned unchanged;
/// * taller: a `target`-row window centred on the detected band, clamped to
///   the image. When no band is found the window is centred on the image;
/// * shorter: centred vertically on a black canvas.
pub fn fit_to_height(image: DynamicImage, target: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    if height == target {
        return image;
    }

    if height > target {
        let bounds = detect(&gray_bt601(&image));
        let center = if bounds.is_empty() {
            debug!("No bright band found, cropping around the image centre");
            height / 2
        } else {
            bounds.center()
        };
        let mut top = center.saturating_sub(target / 2);
        if top + target > height {
            top = height - target;
        }
        return image.crop_imm(0, top, width, target);
    }

    let mut canvas = RgbImage::new(width, target);
    let y_offset = (target - height) / 2;
    imageops::overlay(&mut canvas, &image.to_rgb8(), 0, y_offset as i64);
    DynamicImage::ImageRgb8(canvas)
}

/// Keep the top `width × width` square of a planar scan, dropping the label
/// strip burnt into its bottom. Scans wider than tall are padded with black.
pub fn square_crop(image: DynamicImage) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    if height >= width {
        return image.crop_imm(0, 0, width, width);
    }
    let mut canvas = RgbImage::new(width, width);
    imageops::overlay(&mut canvas, &image.to_rgb8(), 0, 0);
    DynamicImage::ImageRgb8(canvas)
}

/// The smallest target height that keeps every detected band whole: the
/// maximum band height over all decodable scans.
///
/// Scans that fail to decode or have no band are ignored. Returns `None` when
/// nothing usable remains.
pub fn suggest_target_height(paths: &[PathBuf]) -> Option<u32> {
    paths
        .iter()
        .filter_map(|path| match image::open(path) {
            Ok(img) => Some(detect(&gray_bt601(&img))),
            Err(e) => {
                debug!("Skipping {} for height suggestion: {}", path.display(), e);
                None
            }
        })
        .filter(|b| !b.is_empty())
        .map(|b| b.height())
        .max()
}

/// BT.601 luma: `0.299 R + 0.587 G + 0.114 B`, rounded.
fn gray_bt601(image: &DynamicImage) -> GrayImage {
    let rgb = image.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0.map(u32::from);
        Luma([((299 * r + 587 * g + 114 * b + 500) / 1000) as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Dark frame with rows `top..=bottom` bright.
    fn banded(width: u32, height: u32, top: u32, bottom: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |_, y| {
            if (top..=bottom).contains(&y) {
                Luma([250])
            } else {
                Luma([10])
            }
        })
    }

    #[test]
    fn detects_bright_band() {
        let b = detect(&banded(100, 100, 40, 60));
        assert_eq!(b, RetinaBounds { top: 40, bottom: 60 });
        assert_eq!(b.center(), 50);
        assert_eq!(b.height(), 20);
    }

    #[test]
    fn uniform_gray_gives_empty_sentinel() {
        let img = GrayImage::from_pixel(80, 100, Luma([128]));
        let b = detect(&img);
        assert_eq!(b, RetinaBounds { top: 100, bottom: 0 });
        assert!(b.is_empty());
        assert_eq!(b.height(), 0);
    }

    #[test]
    fn dim_band_below_floor_is_ignored() {
        // mean + std is under 50 here, so the floor decides.
        let img = GrayImage::from_fn(50, 50, |_, y| if y == 10 { Luma([45]) } else { Luma([0]) });
        assert!(detect(&img).is_empty());
    }

    #[test]
    fn sparse_hot_pixels_do_not_count() {
        let mut img = banded(100, 100, 40, 60);
        // Two hot pixels in an otherwise dark row stay below the 95th percentile.
        img.put_pixel(3, 5, Luma([255]));
        img.put_pixel(70, 5, Luma([255]));
        assert_eq!(detect(&img), RetinaBounds { top: 40, bottom: 60 });
    }

    #[test]
    fn percentile_interpolates() {
        let mut v = [0u8, 10, 20, 30, 40];
        assert!((percentile(&mut v, 95.0) - 38.0).abs() < 1e-9);
        let mut one = [7u8];
        assert_eq!(percentile(&mut one, 95.0), 7.0);
    }

    fn banded_rgb(height: u32, top: u32, bottom: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(banded(60, height, top, bottom))
    }

    fn bright_rows(img: &DynamicImage) -> Vec<u32> {
        let gray = img.to_luma8();
        (0..gray.height())
            .filter(|&y| gray.get_pixel(0, y)[0] > 200)
            .collect()
    }

    #[test]
    fn crop_centres_window_on_band() {
        let out = fit_to_height(banded_rgb(200, 90, 110), 60);
        assert_eq!((out.width(), out.height()), (60, 60));
        // Centre 100, window 70..130, band lands at 20..=40.
        let rows = bright_rows(&out);
        assert_eq!(rows.first(), Some(&20));
        assert_eq!(rows.last(), Some(&40));
    }

    #[test]
    fn crop_window_clamped_to_bottom() {
        let out = fit_to_height(banded_rgb(100, 85, 95), 40);
        assert_eq!(out.height(), 40);
        // Centre 90 would need rows 70..110; clamped to 60..100.
        let rows = bright_rows(&out);
        assert_eq!(rows.first(), Some(&25));
        assert_eq!(rows.last(), Some(&35));
    }

    #[test]
    fn crop_window_clamped_to_top() {
        let out = fit_to_height(banded_rgb(100, 2, 8), 40);
        let rows = bright_rows(&out);
        assert_eq!(rows.first(), Some(&2));
        assert_eq!(rows.last(), Some(&8));
    }

    #[test]
    fn pads_short_image_centred_on_black() {
        let src = DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 30, Rgb([200, 100, 50])));
        let out = fit_to_height(src, 50).to_rgb8();
        assert_eq!(out.dimensions(), (20, 50));
        assert_eq!(*out.get_pixel(5, 9), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(5, 10), Rgb([200, 100, 50]));
        assert_eq!(*out.get_pixel(5, 39), Rgb([200, 100, 50]));
        assert_eq!(*out.get_pixel(5, 40), Rgb([0, 0, 0]));
    }

    #[test]
    fn matching_height_is_untouched() {
        let src = banded_rgb(40, 1, 2);
        let out = fit_to_height(src.clone(), 40);
        assert_eq!(out.to_luma8(), src.to_luma8());
    }

    #[test]
    fn square_crop_drops_bottom_strip() {
        let src = DynamicImage::ImageRgb8(RgbImage::new(30, 45));
        let out = square_crop(src);
        assert_eq!((out.width(), out.height()), (30, 30));

        let wide = DynamicImage::ImageRgb8(RgbImage::new(30, 20));
        let out = square_crop(wide);
        assert_eq!((out.width(), out.height()), (30, 30));
    }

    #[test]
    fn gray_uses_bt601_weights() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(4, 1, |x, _| match x {
            0 => Rgb([255, 0, 0]),
            1 => Rgb([0, 255, 0]),
            2 => Rgb([0, 0, 255]),
            _ => Rgb([255, 255, 255]),
        }));
        let gray = gray_bt601(&img);
        let values: Vec<u8> = gray.pixels().map(|p| p[0]).collect();
        assert_eq!(values, vec![76, 150, 29, 255]);
    }

    #[test]
    fn dark_red_band_clears_floor() {
        // 220 red is 66 under BT.601 but under 50 with BT.709 weights.
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(50, 100, |_, y| {
            if (70..=79).contains(&y) {
                Rgb([220, 0, 0])
            } else {
                Rgb([0, 0, 0])
            }
        }));
        let gray = gray_bt601(&img);
        assert_eq!(gray.get_pixel(0, 75)[0], 66);
        assert_eq!(detect(&gray), RetinaBounds { top: 70, bottom: 79 });

        let out = fit_to_height(img, 20).to_rgb8();
        let rows: Vec<u32> = (0..out.height())
            .filter(|&y| out.get_pixel(0, y)[0] > 200)
            .collect();
        // Centre 74, window 64..84, band lands at 6..=15.
        assert_eq!(rows, (6..=15).collect::<Vec<u32>>());
    }

    #[test]
    fn suggests_largest_band_height() {
        let tmp = tempfile::TempDir::new().unwrap();
        let a = tmp.path().join("1_OD_h.png");
        let b = tmp.path().join("1_OS_h.png");
        let flat = tmp.path().join("2_OD_h.png");
        let broken = tmp.path().join("3_OD_h.png");
        banded(40, 100, 20, 30).save(&a).unwrap();
        banded(40, 100, 10, 50).save(&b).unwrap();
        GrayImage::from_pixel(40, 100, Luma([128])).save(&flat).unwrap();
        std::fs::write(&broken, b"garbage").unwrap();

        assert_eq!(suggest_target_height(&[a, b, flat, broken]), Some(40));
        assert_eq!(suggest_target_height(&[]), None);
    }
}
