//! Configuration types for a compilation run.
//!
//! All compilation behaviour is controlled through [`CompilationConfig`],
//! built via its [`CompilationConfigBuilder`]. The config is immutable once
//! built and is passed by reference into every pipeline stage; required
//! keys are validated in [`CompilationConfigBuilder::build`] rather than at
//! first use deep inside a batch.

use crate::error::CompileError;
use crate::pipeline::text::Typesetter;
use crate::progress::ProgressCallback;
use crate::selection::ImageSelector;
use image::Rgb;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration for one compilation document.
///
/// Built via [`CompilationConfig::builder()`].
///
/// # Example
/// ```rust
/// use eyegrid::{CompilationConfig, Imager, SubjectRecord};
///
/// let config = CompilationConfig::builder()
///     .directory("/data/cslo", Imager::Planar)
///     .directory("/data/oct", Imager::CrossSectional)
///     .subject(SubjectRecord::new("1204", "M-17", "Control"))
///     .modality("cSLO BAF", "BAF")
///     .modality("OCT horizontal", "Horizontal")
///     .columns(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.columns, Some(4));
/// ```
#[derive(Clone)]
pub struct CompilationConfig {
    /// Source directories, each tagged with the imager that produced it.
    pub directories: Vec<SourceDirectory>,

    /// Ordered subject table. Excluded records are kept but never placed.
    pub subjects: SubjectTable,

    /// Group names in display order. Empty means one ungrouped grid.
    pub group_order: Vec<String>,

    /// Requested modality slots in column order, e.g. `("cSLO BAF (2nd)", "BAF")`.
    pub images_to_use: Vec<ModalityRequest>,

    /// Grid rows. `None` derives it from the subject count.
    pub rows: Option<usize>,

    /// Grid columns. `None` derives it from the subject count.
    pub columns: Option<usize>,

    /// Square-crop planar images, removing the burnt-in label strip at the bottom. Default: true.
    pub crop_planar_text: bool,

    /// Normalise every cross-sectional image to this height (crop around the
    /// detected retina, or pad). `None` leaves heights as captured.
    pub cross_sectional_height: Option<u32>,

    /// Show the subject id as the main heading. Default: true.
    pub show_subject_id: bool,

    /// Show the lab id (as the main heading, or in parentheses below the
    /// subject id when both are enabled). Default: false.
    pub show_lab_id: bool,

    /// Document title. Default: "In vivo imaging".
    pub title: String,

    /// Line under the title. Default: empty.
    pub subtitle: String,

    /// Full document, or one of the two preview modes. Default: [`RenderMode::Full`].
    pub mode: RenderMode,

    /// Margins, gaps, colours and font sizes.
    pub style: LayoutStyle,

    /// TrueType/OpenType font used for every text element. If `None` along
    /// with `typesetter`, well-known system font locations are probed.
    pub font_path: Option<PathBuf>,

    /// Pre-constructed typesetter. Takes precedence over `font_path`.
    pub typesetter: Option<Arc<dyn Typesetter>>,

    /// Answers `[select]` slots. `None` behaves like [`crate::selection::NoSelection`].
    pub selector: Option<Arc<dyn ImageSelector>>,

    /// Optional per-subject progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for CompilationConfig {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            subjects: SubjectTable::default(),
            group_order: Vec::new(),
            images_to_use: Vec::new(),
            rows: None,
            columns: None,
            crop_planar_text: true,
            cross_sectional_height: None,
            show_subject_id: true,
            show_lab_id: false,
            title: "In vivo imaging".to_string(),
            subtitle: String::new(),
            mode: RenderMode::default(),
            style: LayoutStyle::default(),
            font_path: None,
            typesetter: None,
            selector: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for CompilationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilationConfig")
            .field("directories", &self.directories)
            .field("subjects", &self.subjects.len())
            .field("group_order", &self.group_order)
            .field("images_to_use", &self.images_to_use)
            .field("rows", &self.rows)
            .field("columns", &self.columns)
            .field("crop_planar_text", &self.crop_planar_text)
            .field("cross_sectional_height", &self.cross_sectional_height)
            .field("show_subject_id", &self.show_subject_id)
            .field("show_lab_id", &self.show_lab_id)
            .field("title", &self.title)
            .field("mode", &self.mode)
            .field("font_path", &self.font_path)
            .field("typesetter", &self.typesetter.as_ref().map(|_| "<dyn Typesetter>"))
            .field("selector", &self.selector.as_ref().map(|_| "<dyn ImageSelector>"))
            .finish()
    }
}

impl CompilationConfig {
    /// Create a new builder for `CompilationConfig`.
    pub fn builder() -> CompilationConfigBuilder {
        CompilationConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`CompilationConfig`].
#[derive(Debug)]
pub struct CompilationConfigBuilder {
    config: CompilationConfig,
}

impl CompilationConfigBuilder {
    pub fn directory(mut self, path: impl Into<PathBuf>, imager: Imager) -> Self {
        self.config.directories.push(SourceDirectory {
            path: path.into(),
            imager,
        });
        self
    }

    pub fn directories(mut self, dirs: impl IntoIterator<Item = SourceDirectory>) -> Self {
        self.config.directories.extend(dirs);
        self
    }

    pub fn subject(mut self, record: SubjectRecord) -> Self {
        self.config.subjects.push(record);
        self
    }

    pub fn subjects(mut self, table: SubjectTable) -> Self {
        self.config.subjects = table;
        self
    }

    pub fn group_order(mut self, groups: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.group_order = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn modality(mut self, request: impl Into<String>, display_name: impl Into<String>) -> Self {
        self.config.images_to_use.push(ModalityRequest {
            request: request.into(),
            display_name: display_name.into(),
        });
        self
    }

    pub fn images_to_use(mut self, requests: impl IntoIterator<Item = ModalityRequest>) -> Self {
        self.config.images_to_use.extend(requests);
        self
    }

    pub fn rows(mut self, n: usize) -> Self {
        self.config.rows = Some(n);
        self
    }

    pub fn columns(mut self, n: usize) -> Self {
        self.config.columns = Some(n);
        self
    }

    pub fn crop_planar_text(mut self, v: bool) -> Self {
        self.config.crop_planar_text = v;
        self
    }

    pub fn cross_sectional_height(mut self, height: u32) -> Self {
        self.config.cross_sectional_height = Some(height);
        self
    }

    pub fn show_subject_id(mut self, v: bool) -> Self {
        self.config.show_subject_id = v;
        self
    }

    pub fn show_lab_id(mut self, v: bool) -> Self {
        self.config.show_lab_id = v;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = title.into();
        self
    }

    pub fn subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.config.subtitle = subtitle.into();
        self
    }

    pub fn mode(mut self, mode: RenderMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn style(mut self, style: LayoutStyle) -> Self {
        self.config.style = style;
        self
    }

    pub fn font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.font_path = Some(path.into());
        self
    }

    pub fn typesetter(mut self, typesetter: Arc<dyn Typesetter>) -> Self {
        self.config.typesetter = Some(typesetter);
        self
    }

    pub fn selector(mut self, selector: Arc<dyn ImageSelector>) -> Self {
        self.config.selector = Some(selector);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CompilationConfig, CompileError> {
        let c = &self.config;
        if c.directories.is_empty() {
            return Err(CompileError::InvalidConfig(
                "At least one source directory is required".into(),
            ));
        }
        if c.images_to_use.is_empty() {
            return Err(CompileError::InvalidConfig(
                "At least one modality request (images_to_use) is required".into(),
            ));
        }
        if c.subjects.active().next().is_none() {
            return Err(CompileError::InvalidConfig(
                "The subject table has no included subjects".into(),
            ));
        }
        if c.columns == Some(0) {
            return Err(CompileError::InvalidConfig("Columns must be ≥ 1".into()));
        }
        if c.rows == Some(0) {
            return Err(CompileError::InvalidConfig("Rows must be ≥ 1".into()));
        }
        if c.cross_sectional_height == Some(0) {
            return Err(CompileError::InvalidConfig(
                "Cross-sectional target height must be ≥ 1 pixel".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums and records ────────────────────────────────────────────────────

/// The two acquisition devices whose exports are compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Imager {
    /// En-face confocal scanning (cSLO). One subfolder per subject, OD/OS below it.
    #[serde(rename = "cslo", alias = "cSLO", alias = "planar")]
    Planar,
    /// Cross-sectional scanning (OCT). One flat folder for all subjects.
    #[serde(rename = "oct", alias = "OCT", alias = "cross_sectional")]
    CrossSectional,
}

impl Imager {
    /// The token used in request strings and available-modality listings.
    pub fn token(self) -> &'static str {
        match self {
            Imager::Planar => "cSLO",
            Imager::CrossSectional => "OCT",
        }
    }
}

impl fmt::Display for Imager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Imager {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cslo" | "planar" => Ok(Imager::Planar),
            "oct" | "cross_sectional" | "cross-sectional" => Ok(Imager::CrossSectional),
            other => Err(format!("unknown imager '{other}' (expected cSLO or OCT)")),
        }
    }
}

/// One configured input directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDirectory {
    pub path: PathBuf,
    pub imager: Imager,
}

/// One row of the subject metadata table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub subject_id: String,
    #[serde(default)]
    pub lab_id: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub excluded: bool,
}

impl SubjectRecord {
    pub fn new(
        subject_id: impl Into<String>,
        lab_id: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            lab_id: lab_id.into(),
            group: group.into(),
            excluded: false,
        }
    }

    pub fn excluded(mut self, v: bool) -> Self {
        self.excluded = v;
        self
    }
}

/// Ordered subject table. Read once per run, never mutated by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectTable {
    records: Vec<SubjectRecord>,
}

impl SubjectTable {
    pub fn new(records: Vec<SubjectRecord>) -> Self {
        Self { records }
    }

    /// Append a record; a later record for the same subject id replaces the earlier one.
    pub fn push(&mut self, record: SubjectRecord) {
        if let Some(existing) = self
            .records
            .iter_mut()
            .find(|r| r.subject_id == record.subject_id)
        {
            *existing = record;
        } else {
            self.records.push(record);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Included subjects in table order.
    pub fn active(&self) -> impl Iterator<Item = &SubjectRecord> {
        self.records.iter().filter(|r| !r.excluded)
    }

    /// Look up an included subject.
    pub fn get(&self, subject_id: &str) -> Option<&SubjectRecord> {
        self.active().find(|r| r.subject_id == subject_id)
    }

    pub fn contains(&self, subject_id: &str) -> bool {
        self.get(subject_id).is_some()
    }

    /// Included subjects of one group, in table order.
    pub fn in_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a SubjectRecord> {
        self.active().filter(move |r| r.group == group)
    }
}

impl FromIterator<SubjectRecord> for SubjectTable {
    fn from_iter<I: IntoIterator<Item = SubjectRecord>>(iter: I) -> Self {
        let mut table = SubjectTable::default();
        for record in iter {
            table.push(record);
        }
        table
    }
}

/// A `(request_string, display_name)` pair as entered by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModalityRequest {
    pub request: String,
    pub display_name: String,
}

/// What the run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Every slot resolved and drawn; `[select]` slots ask the selector. (default)
    #[default]
    Full,
    /// Titles, headings and labels only; image areas stay black.
    PreviewLayout,
    /// Images drawn, but `[select]` slots never ask and show "No preview available".
    PreviewLayoutAndImages,
}

/// Text sizes in pixels for each kind of text element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FontSizes {
    pub title: f32,
    pub subtitle: f32,
    pub group: f32,
    pub heading: f32,
    pub subheading: f32,
    pub placeholder: f32,
}

impl Default for FontSizes {
    fn default() -> Self {
        Self {
            title: 225.0,
            subtitle: 150.0,
            group: 185.0,
            heading: 150.0,
            subheading: 120.0,
            placeholder: 60.0,
        }
    }
}

/// Cosmetic constants. None of them affects which image goes where.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutStyle {
    pub background: [u8; 3],
    pub text_color: [u8; 3],
    pub column_margin: u32,
    pub row_margin: u32,
    pub outer_margin: u32,
    /// Space above the subject heading.
    pub gap_before_heading: u32,
    /// Space below the subject heading (and below the lab id line).
    pub gap_after_heading: u32,
    /// Space between the OD/OS labels and the first image.
    pub gap_after_eye_labels: u32,
    pub font_sizes: FontSizes,
}

impl Default for LayoutStyle {
    fn default() -> Self {
        Self {
            background: [15, 15, 15],
            text_color: [255, 255, 255],
            column_margin: 45,
            row_margin: 150,
            outer_margin: 50,
            gap_before_heading: 10,
            gap_after_heading: 15,
            gap_after_eye_labels: 25,
            font_sizes: FontSizes::default(),
        }
    }
}

impl LayoutStyle {
    pub fn background_rgb(&self) -> Rgb<u8> {
        Rgb(self.background)
    }

    pub fn text_rgb(&self) -> Rgb<u8> {
        Rgb(self.text_color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> CompilationConfigBuilder {
        CompilationConfig::builder()
            .directory("/data/cslo", Imager::Planar)
            .subject(SubjectRecord::new("100", "L-1", "A"))
            .modality("cSLO BAF", "BAF")
    }

    #[test]
    fn minimal_config_builds_with_defaults() {
        let config = minimal().build().expect("valid config");
        assert!(config.crop_planar_text);
        assert!(config.show_subject_id);
        assert!(!config.show_lab_id);
        assert_eq!(config.mode, RenderMode::Full);
        assert_eq!(config.style.outer_margin, 50);
        assert_eq!(config.rows, None);
    }

    #[test]
    fn build_rejects_missing_directories() {
        let err = CompilationConfig::builder()
            .subject(SubjectRecord::new("100", "", ""))
            .modality("cSLO BAF", "BAF")
            .build()
            .unwrap_err();
        assert!(matches!(err, CompileError::InvalidConfig(_)));
    }

    #[test]
    fn build_rejects_missing_modalities() {
        let err = CompilationConfig::builder()
            .directory("/x", Imager::Planar)
            .subject(SubjectRecord::new("100", "", ""))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("images_to_use"));
    }

    #[test]
    fn build_rejects_fully_excluded_table() {
        let err = CompilationConfig::builder()
            .directory("/x", Imager::Planar)
            .subject(SubjectRecord::new("100", "", "").excluded(true))
            .modality("cSLO BAF", "BAF")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("no included subjects"));
    }

    #[test]
    fn build_rejects_zero_grid_and_height() {
        assert!(minimal().columns(0).build().is_err());
        assert!(minimal().rows(0).build().is_err());
        assert!(minimal().cross_sectional_height(0).build().is_err());
    }

    #[test]
    fn imager_parses_tokens_case_insensitively() {
        assert_eq!("cSLO".parse::<Imager>(), Ok(Imager::Planar));
        assert_eq!("oct".parse::<Imager>(), Ok(Imager::CrossSectional));
        assert!("fundus".parse::<Imager>().is_err());
        assert_eq!(Imager::CrossSectional.to_string(), "OCT");
    }

    #[test]
    fn imager_deserialises_settings_spelling() {
        let d: SourceDirectory =
            serde_json::from_str(r#"{"path": "/d", "imager": "cslo"}"#).expect("json");
        assert_eq!(d.imager, Imager::Planar);
        let d: SourceDirectory =
            serde_json::from_str(r#"{"path": "/d", "imager": "OCT"}"#).expect("json");
        assert_eq!(d.imager, Imager::CrossSectional);
    }

    #[test]
    fn subject_table_keeps_order_and_filters_excluded() {
        let table: SubjectTable = vec![
            SubjectRecord::new("30", "c", "B"),
            SubjectRecord::new("10", "a", "A").excluded(true),
            SubjectRecord::new("20", "b", "A"),
        ]
        .into_iter()
        .collect();

        let ids: Vec<_> = table.active().map(|r| r.subject_id.as_str()).collect();
        assert_eq!(ids, vec!["30", "20"]);
        assert!(!table.contains("10"));
        assert_eq!(table.in_group("A").count(), 1);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn subject_table_push_replaces_duplicate_ids() {
        let mut table = SubjectTable::default();
        table.push(SubjectRecord::new("1", "old", "A"));
        table.push(SubjectRecord::new("1", "new", "B"));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("1").map(|r| r.lab_id.as_str()), Some("new"));
    }
}
