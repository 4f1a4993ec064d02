//! Compilation entry points.
//!
//! [`compile`] is synchronous and CPU-bound: it decodes, resamples and
//! composes images on the calling thread. [`compile_async`] and
//! [`compile_to_file`] move that work onto tokio's blocking pool so an async
//! caller's executor stays responsive.

use crate::config::{CompilationConfig, Imager, SourceDirectory, SubjectRecord, SubjectTable};
use crate::error::CompileError;
use crate::output::{CompilationOutput, CompilationStats, SourceInventory};
use crate::pipeline::bounds::suggest_target_height;
use crate::pipeline::canvas::{AssetBuckets, CanvasGeometry, SubjectCanvasAssembler};
use crate::pipeline::discover::{available_requests, discover_assets, discover_subjects};
use crate::pipeline::layout::{grid_size, DocumentLayout};
use crate::pipeline::modality::ModalitySpec;
use crate::pipeline::text::{locate_system_font, GlyphTypesetter, Typesetter};
use crate::selection::{ImageSelector, NoSelection};
use image::{ImageFormat, RgbImage};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Environment variable naming a font file, consulted when the config has none.
pub const FONT_ENV_VAR: &str = "EYEGRID_FONT";

/// Compose the document described by `config`.
///
/// # Returns
/// `Ok(CompilationOutput)` even when some files were unusable; they are
/// listed in `output.stats.asset_errors` and their slots hold placeholders.
///
/// # Errors
/// Only fatal conditions:
/// - no modality request could be parsed
/// - no usable font
/// - a source directory cannot be listed
/// - no image file of any included subject exists
pub fn compile(config: &CompilationConfig) -> Result<CompilationOutput, CompileError> {
    let start = Instant::now();
    info!(
        "Starting compilation: {} directories, {} subjects, {} slots",
        config.directories.len(),
        config.subjects.active().count(),
        config.images_to_use.len()
    );

    // ── Step 1: Parse modality requests ──────────────────────────────────
    let specs = ModalitySpec::parse_all(&config.images_to_use)?;
    debug!("Slots: {:?}", specs.iter().map(ToString::to_string).collect::<Vec<_>>());

    // ── Step 2: Resolve the typesetter ───────────────────────────────────
    let typesetter = resolve_typesetter(config)?;

    // ── Step 3: Discover source files ────────────────────────────────────
    let discovered = discover_assets(&config.directories, &config.subjects)?;
    if discovered.is_empty() {
        return Err(CompileError::NoImagesFound {
            directories: config.directories.iter().map(|d| d.path.clone()).collect(),
        });
    }
    info!(
        "Found {} image files ({} with unusable names)",
        discovered.assets.len(),
        discovered.skipped.len()
    );

    // ── Step 4: Fix the subject canvas geometry ──────────────────────────
    let geometry = CanvasGeometry::measure(config, &specs, &discovered, typesetter.as_ref());
    let buckets = AssetBuckets::build(&discovered.assets, &config.subjects, &specs);

    // ── Step 5: Plan the document ────────────────────────────────────────
    let layout = DocumentLayout::plan(config, &specs, &geometry, typesetter.as_ref());
    let total = layout.subject_count();
    info!(
        "Document {}x{}: {} subjects in {} columns",
        layout.width, layout.height, total, layout.columns
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_compilation_start(total);
    }

    // ── Step 6: Assemble subjects and draw ───────────────────────────────
    let selector: Arc<dyn ImageSelector> = config
        .selector
        .clone()
        .unwrap_or_else(|| Arc::new(NoSelection));
    let assembler = SubjectCanvasAssembler::new(
        config,
        &geometry,
        &buckets,
        &specs,
        typesetter.as_ref(),
        selector.as_ref(),
    );

    let mut stats = CompilationStats {
        files_discovered: discovered.assets.len(),
        asset_errors: discovered.skipped.clone(),
        columns: layout.columns,
        subject_canvas_width: geometry.width(),
        subject_canvas_height: geometry.height(),
        width: layout.width,
        height: layout.height,
        ..Default::default()
    };

    let mut index = 0;
    let image = layout.render(&config.style, typesetter.as_ref(), |subject_id| {
        if let Some(ref cb) = config.progress_callback {
            cb.on_subject_start(subject_id, index, total);
        }

        let canvas = match config.subjects.get(subject_id) {
            Some(record) => assembler.assemble(record),
            None => assembler.assemble(&SubjectRecord::new(subject_id, "", "")),
        };
        debug!(
            "Subject {}: {} placed, {} placeholders",
            subject_id, canvas.placed, canvas.placeholders
        );

        if let Some(ref cb) = config.progress_callback {
            for e in &canvas.errors {
                cb.on_asset_error(subject_id, &e.to_string());
            }
            cb.on_subject_complete(subject_id, index, total, canvas.placed);
        }

        stats.subjects_placed += 1;
        stats.images_placed += canvas.placed;
        stats.placeholders += canvas.placeholders;
        stats.asset_errors.extend(canvas.errors);
        index += 1;
        canvas.image
    });

    stats.total_duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Compilation complete: {} subjects, {} images, {} placeholders, {}ms",
        stats.subjects_placed, stats.images_placed, stats.placeholders, stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_compilation_complete(stats.subjects_placed, image.width(), image.height());
    }

    Ok(CompilationOutput { image, stats })
}

/// [`compile`] on tokio's blocking pool.
pub async fn compile_async(config: &CompilationConfig) -> Result<CompilationOutput, CompileError> {
    let config = config.clone();
    tokio::task::spawn_blocking(move || compile(&config))
        .await
        .map_err(|e| CompileError::Internal(format!("compile task panicked: {e}")))?
}

/// Compose the document and write it to `output_path`.
///
/// The format follows the extension (`.jpg`, `.png`, `.tif`, `.bmp`). The
/// image is written to a temporary file in the destination directory and
/// renamed into place, so a reader never sees a partial file.
pub async fn compile_to_file(
    output_path: impl AsRef<Path>,
    config: &CompilationConfig,
) -> Result<CompilationStats, CompileError> {
    let path = output_path.as_ref().to_path_buf();
    let format = ImageFormat::from_path(&path).map_err(|e| CompileError::EncodeFailed {
        path: path.clone(),
        detail: e.to_string(),
    })?;

    let output = compile_async(config).await?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CompileError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;
    }

    let CompilationOutput { image, stats } = output;
    let target = path.clone();
    tokio::task::spawn_blocking(move || write_atomically(&image, &target, format))
        .await
        .map_err(|e| CompileError::Internal(format!("write task panicked: {e}")))??;

    info!("Wrote {}", path.display());
    Ok(stats)
}

/// Gather what the directories offer without composing anything.
///
/// When `subjects` is empty every subject found on disk is considered.
pub fn inspect(
    directories: &[SourceDirectory],
    subjects: &SubjectTable,
) -> Result<SourceInventory, CompileError> {
    let found = discover_subjects(directories)?;
    let requests = available_requests(directories)?;

    let table: SubjectTable = if subjects.is_empty() {
        found
            .iter()
            .map(|id| SubjectRecord::new(id.as_str(), "", ""))
            .collect()
    } else {
        subjects.clone()
    };
    let considered = found.iter().filter(|id| table.contains(id)).count();

    let cross_paths: Vec<PathBuf> = discover_assets(directories, &table)?
        .assets
        .into_iter()
        .filter(|a| a.imager == Imager::CrossSectional)
        .map(|a| a.path)
        .collect();

    Ok(SourceInventory {
        subjects: found,
        available_requests: requests,
        suggested_grid: grid_size(considered),
        suggested_cross_sectional_height: suggest_target_height(&cross_paths),
    })
}

/// Pick the typesetter, from most to least specific:
///
/// 1. `config.typesetter`, used as-is;
/// 2. `config.font_path`;
/// 3. the `EYEGRID_FONT` environment variable;
/// 4. the first well-known system font that exists.
pub fn resolve_typesetter(config: &CompilationConfig) -> Result<Arc<dyn Typesetter>, CompileError> {
    if let Some(ref ts) = config.typesetter {
        return Ok(Arc::clone(ts));
    }

    if let Some(ref path) = config.font_path {
        return Ok(Arc::new(GlyphTypesetter::from_file(path)?));
    }

    if let Ok(path) = std::env::var(FONT_ENV_VAR) {
        if !path.is_empty() {
            return Ok(Arc::new(GlyphTypesetter::from_file(Path::new(&path))?));
        }
    }

    let path = locate_system_font().ok_or(CompileError::FontNotFound)?;
    debug!("Using system font {}", path.display());
    Ok(Arc::new(GlyphTypesetter::from_file(&path)?))
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn write_atomically(image: &RgbImage, path: &Path, format: ImageFormat) -> Result<(), CompileError> {
    let write_err = |e: std::io::Error| CompileError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".eyegrid-")
        .tempfile_in(&dir)
        .map_err(write_err)?;

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        image
            .write_to(&mut writer, format)
            .map_err(|e| CompileError::EncodeFailed {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
        writer.flush().map_err(write_err)?;
    }

    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::text::BlockTypesetter;
    use tempfile::TempDir;

    fn base() -> crate::config::CompilationConfigBuilder {
        CompilationConfig::builder()
            .directory("/unused", Imager::Planar)
            .subject(SubjectRecord::new("1", "", ""))
            .modality("cSLO BAF", "BAF")
    }

    #[test]
    fn configured_typesetter_wins() {
        let ts: Arc<dyn Typesetter> = Arc::new(BlockTypesetter);
        let config = base()
            .typesetter(Arc::clone(&ts))
            .font_path("/no/such/font.ttf")
            .build()
            .unwrap();
        let resolved = resolve_typesetter(&config).unwrap();
        assert_eq!(resolved.measure("ab", 10.0).width, 10);
    }

    #[test]
    fn bad_font_path_is_fatal() {
        let config = base().font_path("/no/such/font.ttf").build().unwrap();
        let Err(err) = resolve_typesetter(&config) else {
            panic!("missing font file should not load");
        };
        assert!(matches!(err, CompileError::FontLoadFailed { .. }));
    }

    #[test]
    fn unparseable_requests_are_fatal_when_none_survive() {
        let config = CompilationConfig::builder()
            .directory("/unused", Imager::Planar)
            .subject(SubjectRecord::new("1", "", ""))
            .modality("BAF", "BAF")
            .typesetter(Arc::new(BlockTypesetter))
            .build()
            .unwrap();
        assert!(matches!(compile(&config), Err(CompileError::NoModalities)));
    }

    #[test]
    fn empty_directories_report_no_images() {
        let tmp = TempDir::new().unwrap();
        let config = CompilationConfig::builder()
            .directory(tmp.path(), Imager::CrossSectional)
            .subject(SubjectRecord::new("1", "", ""))
            .modality("OCT horizontal", "H")
            .typesetter(Arc::new(BlockTypesetter))
            .build()
            .unwrap();
        match compile(&config) {
            Err(CompileError::NoImagesFound { directories }) => {
                assert_eq!(directories, vec![tmp.path().to_path_buf()]);
            }
            other => panic!("expected NoImagesFound, got {other:?}"),
        }
    }

    #[test]
    fn atomic_write_leaves_only_the_target() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("doc.png");
        let image = RgbImage::from_pixel(4, 3, image::Rgb([9, 9, 9]));
        write_atomically(&image, &target, ImageFormat::Png).unwrap();

        let names: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("doc.png")]);
        assert_eq!(image::open(&target).unwrap().to_rgb8(), image);
    }
}
