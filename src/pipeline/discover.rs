//! Source discovery: walk the configured directories and turn filenames into
//! [`ImageAsset`]s.
//!
//! ## Naming conventions
//!
//! ```text
//! planar (cSLO)          root/<subject>/{OD,OS}/<seq>_<subject>_<eye>_<modality>.<ext>
//! cross-sectional (OCT)  root/<subject>_<eye>_<modality>.<ext>
//! ```
//!
//! Everything the layout needs (subject, eye, modality, ordering) is encoded
//! in the filename, so discovery never opens a file. Directory listings are
//! sorted before use: `read_dir` order is platform-defined, and candidate
//! order later decides ties between files of the same modality.

use crate::config::{Imager, SourceDirectory, SubjectTable};
use crate::error::{AssetError, CompileError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Raster extensions recognised as images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "tif", "tiff", "bmp"];

/// Check if a path has one of the recognised raster extensions.
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Left/right eye. Labelled OD (right) / OS (left) everywhere in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Eye {
    #[serde(rename = "OD")]
    Right,
    #[serde(rename = "OS")]
    Left,
}

impl Eye {
    /// Column order on a subject canvas: OD left, OS right.
    pub const ALL: [Eye; 2] = [Eye::Right, Eye::Left];

    pub fn label(self) -> &'static str {
        match self {
            Eye::Right => "OD",
            Eye::Left => "OS",
        }
    }

    /// 0 for the OD column, 1 for the OS column.
    pub fn column(self) -> u32 {
        match self {
            Eye::Right => 0,
            Eye::Left => 1,
        }
    }

    fn parse(token: &str) -> Option<Eye> {
        match token.to_ascii_uppercase().as_str() {
            "OD" => Some(Eye::Right),
            "OS" => Some(Eye::Left),
            _ => None,
        }
    }
}

impl fmt::Display for Eye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One image file, described entirely by its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub path: PathBuf,
    pub subject_id: String,
    pub eye: Eye,
    pub imager: Imager,
    pub type_name: String,
    /// Leading capture number for planar files; always 0 for cross-sectional files.
    pub sequence_number: u32,
}

impl ImageAsset {
    /// Parse a filename according to the imager's naming convention.
    pub fn from_path(path: &Path, imager: Imager) -> Result<ImageAsset, AssetError> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let fields: Vec<&str> = stem.split('_').collect();

        let expected = match imager {
            Imager::Planar => 4,
            Imager::CrossSectional => 3,
        };
        if fields.len() != expected {
            return Err(AssetError::FilenameMismatch {
                path: path.to_path_buf(),
                expected,
                found: fields.len(),
            });
        }

        // Cross-sectional names have no leading sequence field.
        let (sequence_number, rest) = match imager {
            Imager::Planar => {
                let seq = fields[0]
                    .parse::<u32>()
                    .map_err(|_| AssetError::BadSequence {
                        path: path.to_path_buf(),
                        token: fields[0].to_string(),
                    })?;
                (seq, &fields[1..])
            }
            Imager::CrossSectional => (0, &fields[..]),
        };

        let eye = Eye::parse(rest[1]).ok_or_else(|| AssetError::UnknownEye {
            path: path.to_path_buf(),
            token: rest[1].to_string(),
        })?;

        Ok(ImageAsset {
            path: path.to_path_buf(),
            subject_id: rest[0].to_string(),
            eye,
            imager,
            type_name: rest[2].to_string(),
            sequence_number,
        })
    }
}

/// Result of walking every configured directory.
#[derive(Debug, Clone, Default)]
pub struct DiscoveredAssets {
    /// Parsed assets of included subjects, planar before cross-sectional,
    /// each imager in lexicographic path order.
    pub assets: Vec<ImageAsset>,
    /// Files that looked like images but whose names could not be parsed.
    pub skipped: Vec<AssetError>,
}

impl DiscoveredAssets {
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// First asset of an imager, used as the sizing representative.
    pub fn first_of(&self, imager: Imager) -> Option<&ImageAsset> {
        self.assets.iter().find(|a| a.imager == imager)
    }
}

/// Walk all directories and collect the assets of included subjects.
///
/// Files of subjects that are not in the table (or are excluded) are ignored
/// silently; files with malformed names are reported in
/// [`DiscoveredAssets::skipped`].
pub fn discover_assets(
    directories: &[SourceDirectory],
    subjects: &SubjectTable,
) -> Result<DiscoveredAssets, CompileError> {
    let mut found = DiscoveredAssets::default();

    for imager in [Imager::Planar, Imager::CrossSectional] {
        let mut paths = Vec::new();
        for dir in directories.iter().filter(|d| d.imager == imager) {
            match imager {
                Imager::Planar => {
                    for subject_dir in list_dir_sorted(&dir.path)? {
                        let name = file_name(&subject_dir);
                        if !subject_dir.is_dir() || !subjects.contains(&name) {
                            continue;
                        }
                        collect_eye_folder_images(&subject_dir, &mut paths);
                    }
                }
                Imager::CrossSectional => {
                    for path in list_dir_sorted(&dir.path)? {
                        if !path.is_file() || !is_image_file(&path) {
                            continue;
                        }
                        let name = file_name(&path);
                        let subject = name.split('_').next().unwrap_or_default();
                        if subjects.contains(subject) {
                            paths.push(path);
                        }
                    }
                }
            }
        }
        paths.sort();

        for path in paths {
            match ImageAsset::from_path(&path, imager) {
                Ok(asset) if subjects.contains(&asset.subject_id) => found.assets.push(asset),
                Ok(asset) => debug!(
                    "Ignoring {} (subject {} not included)",
                    path.display(),
                    asset.subject_id
                ),
                Err(e) => {
                    warn!("Skipping file: {}", e);
                    found.skipped.push(e);
                }
            }
        }
    }

    debug!(
        "Discovered {} assets ({} skipped)",
        found.assets.len(),
        found.skipped.len()
    );
    Ok(found)
}

/// Find every subject id present on disk, sorted and deduplicated.
///
/// Cross-sectional directories contribute the first filename field of every
/// image; planar directories contribute each subfolder that holds both an
/// `OD` and an `OS` folder.
pub fn discover_subjects(directories: &[SourceDirectory]) -> Result<Vec<String>, CompileError> {
    let mut subjects = BTreeSet::new();

    for dir in directories {
        for path in list_dir_sorted(&dir.path)? {
            match dir.imager {
                Imager::CrossSectional => {
                    if path.is_file() && is_image_file(&path) {
                        let name = file_name(&path);
                        if let Some(id) = name.split('_').next() {
                            subjects.insert(id.to_string());
                        }
                    }
                }
                Imager::Planar => {
                    if path.is_dir() && path.join("OD").is_dir() && path.join("OS").is_dir() {
                        subjects.insert(file_name(&path));
                    }
                }
            }
        }
    }

    Ok(subjects.into_iter().collect())
}

/// List the request strings a user can choose from, sorted.
///
/// Planar types are counted per subject/eye; a type that never occurs more
/// than once becomes `"cSLO <type>"`, otherwise one ordinal request per
/// position (`"cSLO <type> (1st)"`, ...) plus `"cSLO <type> [select]"`.
pub fn available_requests(directories: &[SourceDirectory]) -> Result<Vec<String>, CompileError> {
    let mut requests = BTreeSet::new();
    // (subject, eye) -> type -> count
    let mut planar_counts: BTreeMap<(String, Eye), BTreeMap<String, usize>> = BTreeMap::new();

    for dir in directories {
        match dir.imager {
            Imager::CrossSectional => {
                for path in list_dir_sorted(&dir.path)? {
                    if !path.is_file() || !is_image_file(&path) {
                        continue;
                    }
                    if let Ok(asset) = ImageAsset::from_path(&path, Imager::CrossSectional) {
                        requests.insert(format!("{} {}", Imager::CrossSectional, asset.type_name));
                    }
                }
            }
            Imager::Planar => {
                let mut paths = Vec::new();
                for subject_dir in list_dir_sorted(&dir.path)? {
                    if subject_dir.is_dir() {
                        collect_eye_folder_images(&subject_dir, &mut paths);
                    }
                }
                for path in paths {
                    if let Ok(asset) = ImageAsset::from_path(&path, Imager::Planar) {
                        *planar_counts
                            .entry((asset.subject_id, asset.eye))
                            .or_default()
                            .entry(asset.type_name)
                            .or_default() += 1;
                    }
                }
            }
        }
    }

    let mut max_counts: BTreeMap<String, usize> = BTreeMap::new();
    for counts in planar_counts.values() {
        for (type_name, &count) in counts {
            let entry = max_counts.entry(type_name.clone()).or_default();
            *entry = (*entry).max(count);
        }
    }

    for (type_name, count) in max_counts {
        let base = format!("{} {}", Imager::Planar, type_name);
        if count == 1 {
            requests.insert(base);
        } else {
            for n in 1..=count {
                requests.insert(format!("{base} ({})", ordinal(n)));
            }
            requests.insert(format!("{base} [select]"));
        }
    }

    Ok(requests.into_iter().collect())
}

/// English ordinal: 1st, 2nd, 3rd, 4th, ..., 11th, 12th, 13th, 21st.
pub fn ordinal(n: usize) -> String {
    let suffix = if (10..=20).contains(&(n % 100)) {
        "th"
    } else {
        match n % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        }
    };
    format!("{n}{suffix}")
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// List a configured root directory; failure here is fatal.
fn list_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, CompileError> {
    let entries = std::fs::read_dir(dir).map_err(|e| CompileError::DirectoryUnreadable {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    paths.sort();
    Ok(paths)
}

/// Collect images at any depth below `dir` whose parent folder is named
/// `OD` or `OS`. Unreadable entries are logged and skipped.
fn collect_eye_folder_images(dir: &Path, out: &mut Vec<PathBuf>) {
    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cannot read {}: {}", e.path().unwrap_or(dir).display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let in_eye_folder = path
            .parent()
            .is_some_and(|parent| matches!(file_name(parent).as_str(), "OD" | "OS"));
        if in_eye_folder && is_image_file(path) {
            out.push(path.to_path_buf());
        }
    }
}
