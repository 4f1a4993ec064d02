//! Per-subject canvas assembly.
//!
//! Two phases, in this order:
//!
//! 1. [`CanvasGeometry::measure`], once per run. Fixes the slot sizes from one
//!    representative image per imager and the heading height from font
//!    metrics. Every subject canvas of the run has exactly this size.
//! 2. [`SubjectCanvasAssembler::assemble`], once per subject. Draws the
//!    heading and pastes one image (or placeholder) per `(eye, slot)`.
//!
//! ```text
//! ┌───────────── 2 × image_width ─────────────┐
//! │              subject id                    │  heading area
//! │             (lab id)                       │  (background colour)
//! │        OD                    OS            │
//! ├─────────────────────┬──────────────────────┤
//! │ slot 1              │ slot 1               │  image area (black)
//! │ slot 2              │ slot 2               │
//! └─────────────────────┴──────────────────────┘
//! ```

use crate::config::{CompilationConfig, Imager, RenderMode, SubjectRecord, SubjectTable};
use crate::error::AssetError;
use crate::pipeline::bounds::{fit_to_height, square_crop};
use crate::pipeline::discover::{DiscoveredAssets, Eye, ImageAsset};
use crate::pipeline::modality::{resolve, ModalitySpec};
use crate::pipeline::text::Typesetter;
use crate::selection::{ImageSelector, NoSelection};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Slot width when no planar image sets it.
pub const DEFAULT_IMAGE_WIDTH: u32 = 768;
/// Planar frame size assumed when the representative cannot be read.
pub const DEFAULT_PLANAR_SIZE: (u32, u32) = (768, 868);
/// Cross-sectional frame size assumed when the representative cannot be read.
pub const DEFAULT_CROSS_SECTIONAL_SIZE: (u32, u32) = (640, 480);

const PLACEHOLDER_TEXT: &str = "No preview available";
/// Reference string for the heading line height (ascenders and descenders).
const LINE_HEIGHT_PROBE: &str = "Hpqy";

/// Vertical positions inside the heading area, identical for every subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadingMetrics {
    /// Top of the identifying line.
    pub id_top: u32,
    /// Top of the parenthesised lab id line, when both ids are shown.
    pub secondary_top: Option<u32>,
    /// Top of the OD/OS labels.
    pub eye_label_top: u32,
    /// Height of the heading area; the image area starts here.
    pub total_height: u32,
}

impl HeadingMetrics {
    fn measure(config: &CompilationConfig, typesetter: &dyn Typesetter) -> Self {
        let style = &config.style;
        let sizes = &style.font_sizes;
        let line_height = typesetter.measure(LINE_HEIGHT_PROBE, sizes.heading).height;

        let id_top = style.gap_before_heading;
        let mut id_bottom = id_top + line_height;

        let secondary_top = if config.show_subject_id && config.show_lab_id {
            let top = id_bottom + style.gap_after_heading;
            id_bottom = top + line_height;
            Some(top)
        } else {
            None
        };

        let eye_label_top = id_bottom + style.gap_after_heading;
        let eye_label_height = typesetter.measure(Eye::Right.label(), sizes.subheading).height;

        HeadingMetrics {
            id_top,
            secondary_top,
            eye_label_top,
            total_height: eye_label_top + eye_label_height + style.gap_after_eye_labels,
        }
    }
}

/// Fixed sizes shared by every subject canvas of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanvasGeometry {
    /// Width of one eye column; every pasted image is resized to it.
    pub image_width: u32,
    pub planar_height: u32,
    pub cross_height: u32,
    /// Slot heights in declared slot order.
    pub slot_heights: Vec<u32>,
    pub heading: HeadingMetrics,
}

impl CanvasGeometry {
    /// Compute the run's layout constants. Must run before any
    /// [`SubjectCanvasAssembler::assemble`] call.
    ///
    /// The first discovered asset of each imager is the size representative;
    /// only its header is read.
    pub fn measure(
        config: &CompilationConfig,
        specs: &[ModalitySpec],
        discovered: &DiscoveredAssets,
        typesetter: &dyn Typesetter,
    ) -> Self {
        let planar = discovered
            .first_of(Imager::Planar)
            .map(|a| representative_size(a, DEFAULT_PLANAR_SIZE));
        let (image_width, planar_height) = match planar {
            Some((w, h)) => (w, if config.crop_planar_text { w } else { h }),
            None => {
                let (w, h) = DEFAULT_PLANAR_SIZE;
                (DEFAULT_IMAGE_WIDTH, if config.crop_planar_text { w } else { h })
            }
        };

        let (cross_w, mut cross_h) = discovered
            .first_of(Imager::CrossSectional)
            .map(|a| representative_size(a, DEFAULT_CROSS_SECTIONAL_SIZE))
            .unwrap_or(DEFAULT_CROSS_SECTIONAL_SIZE);
        if let Some(target) = config.cross_sectional_height {
            cross_h = target;
        }
        let cross_height = scaled_height(cross_w, cross_h, image_width);

        let slot_heights = specs
            .iter()
            .map(|s| match s.imager {
                Imager::Planar => planar_height,
                Imager::CrossSectional => cross_height,
            })
            .collect();

        let geometry = CanvasGeometry {
            image_width,
            planar_height,
            cross_height,
            slot_heights,
            heading: HeadingMetrics::measure(config, typesetter),
        };
        debug!(
            "Subject canvas {}x{} (slots {:?}, heading {})",
            geometry.width(),
            geometry.height(),
            geometry.slot_heights,
            geometry.heading.total_height
        );
        geometry
    }

    /// Canvas width: one column per eye.
    pub fn width(&self) -> u32 {
        2 * self.image_width
    }

    pub fn image_area_height(&self) -> u32 {
        self.slot_heights.iter().sum()
    }

    /// Canvas height: heading plus every slot.
    pub fn height(&self) -> u32 {
        self.heading.total_height + self.image_area_height()
    }

    pub fn slot_height(&self, imager: Imager) -> u32 {
        match imager {
            Imager::Planar => self.planar_height,
            Imager::CrossSectional => self.cross_height,
        }
    }
}

fn representative_size(asset: &ImageAsset, fallback: (u32, u32)) -> (u32, u32) {
    match image::image_dimensions(&asset.path) {
        Ok(dims) => dims,
        Err(e) => {
            warn!(
                "Cannot read size of {}: {}; assuming {}x{}",
                asset.path.display(),
                e,
                fallback.0,
                fallback.1
            );
            fallback
        }
    }
}

/// Height after resizing `width × height` to `target_width`, aspect kept.
fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    if width == 0 {
        return height;
    }
    (target_width as u64 * height as u64 / width as u64) as u32
}

/// Candidate files grouped by subject, eye and imager.
///
/// Built once from the discovered assets, keeping only included subjects and
/// modality types some slot asks for. Within a bucket, assets keep discovery
/// order (lexicographic path order).
#[derive(Debug, Default)]
pub struct AssetBuckets {
    buckets: HashMap<String, HashMap<(Eye, Imager), Vec<ImageAsset>>>,
}

impl AssetBuckets {
    pub fn build(assets: &[ImageAsset], subjects: &SubjectTable, specs: &[ModalitySpec]) -> Self {
        let wanted: HashSet<(Imager, &str)> = specs
            .iter()
            .map(|s| (s.imager, s.type_name.as_str()))
            .collect();

        let mut buckets: HashMap<String, HashMap<(Eye, Imager), Vec<ImageAsset>>> = HashMap::new();
        for asset in assets {
            if !subjects.contains(&asset.subject_id)
                || !wanted.contains(&(asset.imager, asset.type_name.as_str()))
            {
                continue;
            }
            buckets
                .entry(asset.subject_id.clone())
                .or_default()
                .entry((asset.eye, asset.imager))
                .or_default()
                .push(asset.clone());
        }
        Self { buckets }
    }

    /// Candidates of one subject/eye/imager; empty when there are none.
    pub fn bucket(&self, subject_id: &str, eye: Eye, imager: Imager) -> &[ImageAsset] {
        self.buckets
            .get(subject_id)
            .and_then(|b| b.get(&(eye, imager)))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of subjects with at least one usable asset.
    pub fn subject_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn asset_count(&self) -> usize {
        self.buckets
            .values()
            .flat_map(|b| b.values())
            .map(Vec::len)
            .sum()
    }
}

/// One assembled subject canvas plus what happened while filling it.
#[derive(Debug, Clone)]
pub struct SubjectCanvas {
    pub image: RgbImage,
    /// Slots filled with a real image.
    pub placed: usize,
    /// Slots filled with a placeholder.
    pub placeholders: usize,
    pub errors: Vec<AssetError>,
}

/// Builds subject canvases against one precomputed [`CanvasGeometry`].
pub struct SubjectCanvasAssembler<'a> {
    config: &'a CompilationConfig,
    geometry: &'a CanvasGeometry,
    buckets: &'a AssetBuckets,
    specs: &'a [ModalitySpec],
    typesetter: &'a dyn Typesetter,
    selector: &'a dyn ImageSelector,
}

impl<'a> SubjectCanvasAssembler<'a> {
    pub fn new(
        config: &'a CompilationConfig,
        geometry: &'a CanvasGeometry,
        buckets: &'a AssetBuckets,
        specs: &'a [ModalitySpec],
        typesetter: &'a dyn Typesetter,
        selector: &'a dyn ImageSelector,
    ) -> Self {
        Self {
            config,
            geometry,
            buckets,
            specs,
            typesetter,
            selector,
        }
    }

    /// Assemble the canvas of one subject.
    pub fn assemble(&self, subject: &SubjectRecord) -> SubjectCanvas {
        let g = self.geometry;
        let style = &self.config.style;

        let mut image = RgbImage::from_pixel(g.width(), g.height(), style.background_rgb());
        let image_area = RgbImage::new(g.width(), g.image_area_height());
        imageops::replace(&mut image, &image_area, 0, g.heading.total_height as i64);

        self.draw_heading(&mut image, subject);

        let mut out = SubjectCanvas {
            image,
            placed: 0,
            placeholders: 0,
            errors: Vec::new(),
        };
        if self.config.mode == RenderMode::PreviewLayout {
            return out;
        }

        // Preview modes never block on a human.
        let selector: &dyn ImageSelector = match self.config.mode {
            RenderMode::Full => self.selector,
            _ => &NoSelection,
        };

        for eye in Eye::ALL {
            let x = (eye.column() * g.image_width) as i64;
            let mut y = g.heading.total_height as i64;

            for spec in self.specs {
                let bucket = self.buckets.bucket(&subject.subject_id, eye, spec.imager);
                let title = format!("{} {} - {}", subject.subject_id, eye, spec.type_name);

                let chosen = match resolve(bucket, spec, selector, &title) {
                    Ok(chosen) => chosen,
                    Err(e) => {
                        warn!("{}", e);
                        out.errors.push(e);
                        None
                    }
                };

                let slot_image = match chosen.map(|asset| self.load(asset)) {
                    Some(Ok(img)) => {
                        out.placed += 1;
                        img
                    }
                    Some(Err(e)) => {
                        warn!("Using placeholder: {}", e);
                        out.errors.push(e);
                        out.placeholders += 1;
                        self.placeholder(spec)
                    }
                    None => {
                        debug!("{}: no image", title);
                        out.placeholders += 1;
                        self.placeholder(spec)
                    }
                };

                imageops::replace(&mut out.image, &slot_image, x, y);
                y += slot_image.height() as i64;
            }
        }

        out
    }

    fn draw_heading(&self, canvas: &mut RgbImage, subject: &SubjectRecord) {
        let g = self.geometry;
        let sizes = &self.config.style.font_sizes;
        let color = self.config.style.text_rgb();

        let id_text = if self.config.show_subject_id {
            subject.subject_id.as_str()
        } else if self.config.show_lab_id {
            subject.lab_id.as_str()
        } else {
            ""
        };
        self.draw_centered(canvas, id_text, sizes.heading, 0, g.width(), g.heading.id_top, color);

        if let Some(top) = g.heading.secondary_top {
            let text = format!("({})", subject.lab_id);
            self.draw_centered(canvas, &text, sizes.subheading, 0, g.width(), top, color);
        }

        for eye in Eye::ALL {
            let left = eye.column() * g.image_width;
            self.draw_centered(
                canvas,
                eye.label(),
                sizes.subheading,
                left,
                g.image_width,
                g.heading.eye_label_top,
                color,
            );
        }
    }

    /// Draw `text` horizontally centred in `left..left + span`.
    #[allow(clippy::too_many_arguments)]
    fn draw_centered(
        &self,
        canvas: &mut RgbImage,
        text: &str,
        size: f32,
        left: u32,
        span: u32,
        top: u32,
        color: Rgb<u8>,
    ) {
        if text.is_empty() {
            return;
        }
        let w = self.typesetter.measure(text, size).width as i32;
        let x = left as i32 + (span as i32 - w) / 2;
        self.typesetter
            .draw(canvas, text, size, x, top as i32, color);
    }

    /// Decode, crop and resize one asset to the column width.
    fn load(&self, asset: &ImageAsset) -> Result<RgbImage, AssetError> {
        let mut img = image::open(&asset.path).map_err(|e| AssetError::DecodeFailed {
            path: asset.path.clone(),
            detail: e.to_string(),
        })?;

        img = match asset.imager {
            Imager::Planar if self.config.crop_planar_text => square_crop(img),
            Imager::CrossSectional => match self.config.cross_sectional_height {
                Some(target) => fit_to_height(img, target),
                None => img,
            },
            _ => img,
        };

        Ok(fit_to_width(img, self.geometry.image_width))
    }

    fn placeholder(&self, spec: &ModalitySpec) -> RgbImage {
        let width = self.geometry.image_width;
        let height = self.geometry.slot_height(spec.imager);
        let mut img = RgbImage::new(width, height);

        if self.config.mode == RenderMode::PreviewLayoutAndImages && spec.is_user_select() {
            let size = self.config.style.font_sizes.placeholder;
            let e = self.typesetter.measure(PLACEHOLDER_TEXT, size);
            let x = (width as i32 - e.width as i32) / 2;
            let y = (height as i32 - e.height as i32) / 2;
            self.typesetter.draw(
                &mut img,
                PLACEHOLDER_TEXT,
                size,
                x,
                y,
                self.config.style.text_rgb(),
            );
        }
        img
    }
}

/// Resize to `width`, keeping the aspect ratio (Lanczos3).
fn fit_to_width(img: DynamicImage, width: u32) -> RgbImage {
    let rgb = img.to_rgb8();
    if rgb.width() == width {
        return rgb;
    }
    let height = scaled_height(rgb.width(), rgb.height(), width).max(1);
    imageops::resize(&rgb, width, height, FilterType::Lanczos3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LayoutStyle, SubjectRecord};
    use crate::pipeline::text::BlockTypesetter;
    use crate::selection::FirstCandidate;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const RED: Rgb<u8> = Rgb([220, 20, 20]);
    const GREEN: Rgb<u8> = Rgb([20, 220, 20]);

    fn save(path: &Path, w: u32, h: u32, color: Rgb<u8>) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(w, h, color).save(path).unwrap();
    }

    fn asset(path: PathBuf, eye: Eye, imager: Imager, type_name: &str, seq: u32) -> ImageAsset {
        ImageAsset {
            path,
            subject_id: "1".into(),
            eye,
            imager,
            type_name: type_name.into(),
            sequence_number: seq,
        }
    }

    fn small_style() -> LayoutStyle {
        let mut style = LayoutStyle::default();
        style.font_sizes.heading = 10.0;
        style.font_sizes.subheading = 8.0;
        style.font_sizes.placeholder = 4.0;
        style
    }

    fn config(mode: RenderMode, show_lab: bool) -> CompilationConfig {
        CompilationConfig::builder()
            .directory("/unused", Imager::Planar)
            .subject(SubjectRecord::new("1", "L7", "A"))
            .modality("cSLO BAF", "BAF")
            .modality("OCT horizontal", "H")
            .cross_sectional_height(30)
            .show_lab_id(show_lab)
            .style(small_style())
            .mode(mode)
            .build()
            .unwrap()
    }

    /// Planar 40×50 (square-cropped to 40×40), cross-sectional 80×60.
    fn fixture(tmp: &TempDir) -> DiscoveredAssets {
        let p_od = tmp.path().join("1_1_OD_BAF.png");
        let p_os = tmp.path().join("1_1_OS_BAF.png");
        let c_od = tmp.path().join("1_OD_horizontal.png");
        save(&p_od, 40, 50, RED);
        save(&p_os, 40, 50, RED);
        save(&c_od, 80, 60, GREEN);
        DiscoveredAssets {
            assets: vec![
                asset(p_od, Eye::Right, Imager::Planar, "BAF", 1),
                asset(p_os, Eye::Left, Imager::Planar, "BAF", 1),
                asset(c_od, Eye::Right, Imager::CrossSectional, "horizontal", 0),
            ],
            skipped: vec![],
        }
    }

    #[test]
    fn heading_metrics_follow_gaps_and_font_sizes() {
        let cfg = config(RenderMode::Full, false);
        let h = HeadingMetrics::measure(&cfg, &BlockTypesetter);
        // gap 10, line 10, gap 15, labels 8, gap 25
        assert_eq!(h.id_top, 10);
        assert_eq!(h.secondary_top, None);
        assert_eq!(h.eye_label_top, 35);
        assert_eq!(h.total_height, 68);

        let cfg = config(RenderMode::Full, true);
        let h = HeadingMetrics::measure(&cfg, &BlockTypesetter);
        assert_eq!(h.secondary_top, Some(35));
        assert_eq!(h.eye_label_top, 60);
        assert_eq!(h.total_height, 93);
    }

    #[test]
    fn geometry_from_representatives() {
        let tmp = TempDir::new().unwrap();
        let found = fixture(&tmp);
        let cfg = config(RenderMode::Full, false);
        let specs = ModalitySpec::parse_all(&cfg.images_to_use).unwrap();
        let g = CanvasGeometry::measure(&cfg, &specs, &found, &BlockTypesetter);

        assert_eq!(g.image_width, 40);
        assert_eq!(g.planar_height, 40);
        // Cross-sectional 80 wide at target height 30, scaled to 40 wide.
        assert_eq!(g.cross_height, 15);
        assert_eq!(g.slot_heights, vec![40, 15]);
        assert_eq!(g.width(), 80);
        assert_eq!(g.height(), 68 + 55);
    }

    #[test]
    fn geometry_defaults_without_representatives() {
        let mut cfg = config(RenderMode::Full, false);
        cfg.cross_sectional_height = None;
        let specs = ModalitySpec::parse_all(&cfg.images_to_use).unwrap();
        let g = CanvasGeometry::measure(&cfg, &specs, &DiscoveredAssets::default(), &BlockTypesetter);
        assert_eq!(g.image_width, 768);
        assert_eq!(g.planar_height, 768);
        assert_eq!(g.cross_height, 576);
    }

    #[test]
    fn buckets_filter_by_subject_and_requested_type() {
        let table: SubjectTable = vec![SubjectRecord::new("1", "", "")].into_iter().collect();
        let specs = vec![ModalitySpec::parse("cSLO BAF", "").unwrap()];
        let mut other = asset(PathBuf::from("/x/2_2_OD_BAF.png"), Eye::Right, Imager::Planar, "BAF", 2);
        other.subject_id = "2".into();
        let assets = vec![
            asset(PathBuf::from("/x/1_1_OD_BAF.png"), Eye::Right, Imager::Planar, "BAF", 1),
            asset(PathBuf::from("/x/1_1_OD_IRAF.png"), Eye::Right, Imager::Planar, "IRAF", 1),
            other,
        ];
        let b = AssetBuckets::build(&assets, &table, &specs);
        assert_eq!(b.subject_count(), 1);
        assert_eq!(b.asset_count(), 1);
        assert_eq!(b.bucket("1", Eye::Right, Imager::Planar).len(), 1);
        assert!(b.bucket("1", Eye::Left, Imager::Planar).is_empty());
        assert!(b.bucket("2", Eye::Right, Imager::Planar).is_empty());
    }

    fn assemble(mode: RenderMode, found: &DiscoveredAssets) -> (CanvasGeometry, SubjectCanvas) {
        let cfg = config(mode, false);
        let specs = ModalitySpec::parse_all(&cfg.images_to_use).unwrap();
        let g = CanvasGeometry::measure(&cfg, &specs, found, &BlockTypesetter);
        let buckets = AssetBuckets::build(&found.assets, &cfg.subjects, &specs);
        let subject = cfg.subjects.get("1").unwrap().clone();
        let canvas = SubjectCanvasAssembler::new(
            &cfg,
            &g,
            &buckets,
            &specs,
            &BlockTypesetter,
            &FirstCandidate,
        )
        .assemble(&subject);
        (g, canvas)
    }

    #[test]
    fn assembles_slots_in_eye_columns() {
        let tmp = TempDir::new().unwrap();
        let found = fixture(&tmp);
        let (g, c) = assemble(RenderMode::Full, &found);

        assert_eq!(c.image.dimensions(), (g.width(), g.height()));
        assert_eq!((c.placed, c.placeholders), (3, 1));
        assert!(c.errors.is_empty());

        let top = g.heading.total_height;
        // Planar slot in both columns.
        assert_eq!(*c.image.get_pixel(20, top + 20), RED);
        assert_eq!(*c.image.get_pixel(60, top + 20), RED);
        // Cross-sectional slot (resampled): OD present, OS placeholder (black).
        let od = c.image.get_pixel(20, top + 40 + 7);
        assert!(od[1] > 200 && od[0] < 40, "got {od:?}");
        assert_eq!(*c.image.get_pixel(60, top + 40 + 7), Rgb([0, 0, 0]));
        // Heading area uses the background colour.
        assert_eq!(*c.image.get_pixel(0, 0), Rgb([15, 15, 15]));
    }

    #[test]
    fn heading_shows_subject_id_and_eye_labels() {
        let tmp = TempDir::new().unwrap();
        let found = fixture(&tmp);
        let (g, c) = assemble(RenderMode::PreviewLayout, &found);
        let white = Rgb([255, 255, 255]);

        // "1" at size 10 is 5 wide, centred in 80.
        assert_eq!(*c.image.get_pixel(37, 10), white);
        assert_eq!(*c.image.get_pixel(36, 10), Rgb([15, 15, 15]));
        // "OD" at size 8 is 8 wide, centred in 0..40.
        assert_eq!(*c.image.get_pixel(16, g.heading.eye_label_top), white);
        assert_eq!(*c.image.get_pixel(56, g.heading.eye_label_top), white);
    }

    #[test]
    fn preview_layout_draws_no_images() {
        let tmp = TempDir::new().unwrap();
        let found = fixture(&tmp);
        let (g, c) = assemble(RenderMode::PreviewLayout, &found);
        assert_eq!((c.placed, c.placeholders), (0, 0));
        assert_eq!(*c.image.get_pixel(20, g.heading.total_height + 20), Rgb([0, 0, 0]));
    }

    #[test]
    fn undecodable_file_becomes_placeholder() {
        let tmp = TempDir::new().unwrap();
        let found = fixture(&tmp);
        // assets[0] stays intact as the size representative.
        std::fs::write(&found.assets[1].path, b"not a png").unwrap();
        let (_, c) = assemble(RenderMode::Full, &found);
        assert_eq!(c.placed, 2);
        assert_eq!(c.errors.len(), 1);
        assert!(matches!(c.errors[0], AssetError::DecodeFailed { .. }));
    }

    #[test]
    fn select_slot_placeholder_text_in_preview_with_images() {
        let tmp = TempDir::new().unwrap();
        let found = fixture(&tmp);
        let mut cfg = config(RenderMode::PreviewLayoutAndImages, false);
        cfg.images_to_use[0].request = "cSLO BAF [select]".into();
        let specs = ModalitySpec::parse_all(&cfg.images_to_use).unwrap();
        let g = CanvasGeometry::measure(&cfg, &specs, &found, &BlockTypesetter);
        let buckets = AssetBuckets::build(&found.assets, &cfg.subjects, &specs);
        let subject = cfg.subjects.get("1").unwrap().clone();
        let c = SubjectCanvasAssembler::new(&cfg, &g, &buckets, &specs, &BlockTypesetter, &FirstCandidate)
            .assemble(&subject);

        // The selector is never asked, so the planar slots are placeholders.
        assert_eq!(c.placed, 1);
        // "No preview available" (20 chars at size 4) is 40 wide, 4 tall,
        // centred in the 40×40 slot: rows 18..22.
        let top = g.heading.total_height;
        assert_eq!(*c.image.get_pixel(20, top + 19), Rgb([255, 255, 255]));
        assert_eq!(*c.image.get_pixel(20, top + 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn fit_to_width_keeps_aspect() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(80, 60));
        assert_eq!(fit_to_width(img, 40).dimensions(), (40, 30));
        let img = DynamicImage::ImageRgb8(RgbImage::new(40, 7));
        assert_eq!(fit_to_width(img, 40).dimensions(), (40, 7));
    }
}
