//! CLI binary for eyegrid.
//!
//! A thin shim over the library crate that maps a JSON settings file and
//! CLI flags to `CompilationConfig` and writes the document.

use anyhow::{bail, Context, Result};
use clap::Parser;
use eyegrid::selection::Selector;
use eyegrid::{
    compile_to_file, inspect, CompilationConfig, CompilationProgressCallback, FirstCandidate,
    ImageAsset, ImageSelector, Imager, LayoutStyle, ModalityRequest, NoSelection,
    ProgressCallback, RenderMode, SourceDirectory, SubjectRecord, SubjectTable,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per subject.
struct CliProgressCallback {
    bar: ProgressBar,
    subject_started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_compilation_start` reports the subject count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Scanning directories…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            subject_started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} subjects  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Compiling");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self) -> f64 {
        self.subject_started
            .lock()
            .ok()
            .and_then(|mut started| started.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl CompilationProgressCallback for CliProgressCallback {
    fn on_compilation_start(&self, total_subjects: usize) {
        self.activate_bar(total_subjects);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Compiling {total_subjects} subjects…"))
        ));
    }

    fn on_subject_start(&self, subject_id: &str, _index: usize, _total: usize) {
        if let Ok(mut started) = self.subject_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(format!("subject {subject_id}"));
    }

    fn on_subject_complete(&self, subject_id: &str, index: usize, total: usize, placed: usize) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<12}  {}  {}",
            green("✓"),
            index + 1,
            total,
            subject_id,
            dim(&format!("{placed:>3} images")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_asset_error(&self, subject_id: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 100 {
            format!("{}\u{2026}", error.chars().take(99).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {:<12}  {}", red("✗"), subject_id, red(&msg)));
    }

    fn on_compilation_complete(&self, total_subjects: usize, width: u32, height: u32) {
        self.bar.finish_and_clear();
        let errors = self.errors.load(Ordering::SeqCst);
        if errors == 0 {
            eprintln!(
                "{} {} subjects compiled  {}",
                green("✔"),
                bold(&total_subjects.to_string()),
                dim(&format!("{width}x{height}")),
            );
        } else {
            eprintln!(
                "{} {} subjects compiled  ({} unusable files)  {}",
                cyan("⚠"),
                bold(&total_subjects.to_string()),
                red(&errors.to_string()),
                dim(&format!("{width}x{height}")),
            );
        }
    }
}

// ── Interactive selector ─────────────────────────────────────────────────────

/// Asks on the terminal which candidate fills a `[select]` slot.
///
/// The candidate list goes to stderr, the answer is read from stdin;
/// `0` or an empty line means "no image". The progress bar, if any, is
/// hidden while the question is open.
struct PromptSelector {
    bar: Option<ProgressBar>,
}

impl PromptSelector {
    fn ask(candidates: &[ImageAsset], title: &str) -> Option<PathBuf> {
        let stdin = io::stdin();
        let mut stderr = io::stderr();
        let _ = writeln!(stderr, "\n{} {}", cyan("?"), bold(title));
        for (i, c) in candidates.iter().enumerate() {
            let name = c
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| c.path.display().to_string());
            let _ = writeln!(stderr, "  {:>2}) {}", i + 1, name);
        }
        let _ = writeln!(stderr, "  {:>2}) {}", 0, dim("no image"));

        loop {
            let _ = write!(stderr, "  choice [0-{}]: ", candidates.len());
            let _ = stderr.flush();

            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => return None,
                Ok(_) => {}
            }
            let answer = line.trim();
            if answer.is_empty() {
                return None;
            }
            match answer.parse::<usize>() {
                Ok(0) => return None,
                Ok(n) if n <= candidates.len() => return Some(candidates[n - 1].path.clone()),
                _ => {
                    let _ = writeln!(stderr, "  {}", red("not a listed number"));
                }
            }
        }
    }
}

impl ImageSelector for PromptSelector {
    fn request_disambiguation(&self, candidates: &[ImageAsset], title: &str) -> Option<PathBuf> {
        match self.bar {
            Some(ref bar) => bar.suspend(|| Self::ask(candidates, title)),
            None => Self::ask(candidates, title),
        }
    }
}

// ── Settings file ────────────────────────────────────────────────────────────

/// JSON settings as written by the lab's configuration step. Keys follow
/// the historical option names; the snake_case field names are accepted too.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    directories: Vec<SourceDirectory>,
    #[serde(alias = "mouse_info_dic")]
    subjects: SubjectsSetting,
    group_order: Vec<String>,
    images_to_use: Vec<ImageSetting>,
    #[serde(alias = "number_of_rows")]
    rows: Option<usize>,
    #[serde(alias = "number_of_columns")]
    columns: Option<usize>,
    #[serde(alias = "crop_cslo_text_bool")]
    crop_planar_text: Option<bool>,
    #[serde(alias = "oct_crop_bool")]
    crop_cross_sectional: Option<bool>,
    #[serde(alias = "oct_height")]
    cross_sectional_height: Option<u32>,
    #[serde(alias = "cslo_number_bool")]
    show_subject_id: Option<bool>,
    #[serde(alias = "labID_bool")]
    show_lab_id: Option<bool>,
    #[serde(alias = "document_title")]
    title: Option<String>,
    subtitle: Option<String>,
    output: Option<PathBuf>,
    font: Option<PathBuf>,
    mode: Option<RenderMode>,
    style: Option<LayoutStyle>,
}

/// Either an ordered list of records or an `id → info` map (sorted by id).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SubjectsSetting {
    List(Vec<SubjectRecord>),
    Map(BTreeMap<String, SubjectInfo>),
}

impl Default for SubjectsSetting {
    fn default() -> Self {
        SubjectsSetting::List(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SubjectInfo {
    /// `["M-17", "Control"]`
    Pair(String, String),
    Fields {
        #[serde(default)]
        lab_id: String,
        #[serde(default)]
        group: String,
        #[serde(default)]
        excluded: bool,
    },
}

impl SubjectsSetting {
    fn into_table(self) -> SubjectTable {
        match self {
            SubjectsSetting::List(records) => records.into_iter().collect(),
            SubjectsSetting::Map(map) => map
                .into_iter()
                .map(|(id, info)| match info {
                    SubjectInfo::Pair(lab, group) => SubjectRecord::new(id, lab, group),
                    SubjectInfo::Fields {
                        lab_id,
                        group,
                        excluded,
                    } => SubjectRecord::new(id, lab_id, group).excluded(excluded),
                })
                .collect(),
        }
    }
}

/// `["cSLO BAF", "BAF"]`, `{"request": …, "display_name": …}` or a bare request.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImageSetting {
    Pair(String, String),
    Record(ModalityRequest),
    Bare(String),
}

impl From<ImageSetting> for ModalityRequest {
    fn from(v: ImageSetting) -> Self {
        match v {
            ImageSetting::Pair(request, display_name) => ModalityRequest {
                request,
                display_name,
            },
            ImageSetting::Record(r) => r,
            ImageSetting::Bare(request) => ModalityRequest {
                request,
                display_name: String::new(),
            },
        }
    }
}

// ── CLI ──────────────────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Everything from a settings file
  eyegrid --settings week4.json -o week4.jpg

  # Flags only
  eyegrid --cslo /data/week4/cslo --oct /data/week4/oct \
          --subject 1204:M-17:Control --subject 1205:M-18:Treated \
          --group Control --group Treated \
          --image "cSLO BAF=BAF" --image "cSLO IRAF [select]=IRAF" \
          --image "OCT horizontal=Horizontal" -o week4.jpg

  # What can be compiled from these folders?
  eyegrid --cslo /data/week4/cslo --oct /data/week4/oct --inspect-only

  # Check the arrangement before committing to a long run
  eyegrid --settings week4.json --mode layout -o preview.jpg

INPUT LAYOUT:
  cSLO   <dir>/<subject>/OD/<seq>_<subject>_OD_<type>.<ext>   (and OS)
  OCT    <dir>/<subject>_<eye>_<type>.<ext>
  Extensions: jpg jpeg png tif tiff bmp

IMAGE REQUESTS:
  "cSLO BAF"            the single BAF image of each eye
  "cSLO BAF (2nd)"      the second BAF image by sequence number
  "cSLO IRAF [select]"  ask which IRAF image to use when there are several
  "OCT horizontal"      the horizontal cross-section

SETTINGS FILE KEYS:
  directories          [{"path": "...", "imager": "cslo" | "oct"}]
  mouse_info_dic       {"1204": ["M-17", "Control"], ...}  or a list of records
  group_order          ["Control", "Treated"]
  images_to_use        [["cSLO BAF", "BAF"], ...]
  number_of_rows, number_of_columns, crop_cslo_text_bool, oct_crop_bool,
  oct_height, cslo_number_bool, labID_bool, document_title, subtitle,
  output, font, mode, style

ENVIRONMENT VARIABLES:
  EYEGRID_FONT         TrueType/OpenType font used for all text
  RUST_LOG             Log filter (overrides --verbose / --quiet)
"#;

/// Compile per-subject cSLO and OCT images into one document.
#[derive(Parser, Debug)]
#[command(
    name = "eyegrid",
    version,
    about = "Compile per-subject cSLO and OCT eye images into one labelled grid",
    long_about = "Reads en-face (cSLO) and cross-sectional (OCT) exports from their folder \
conventions and composes a single raster: one canvas per subject with OD and OS side by side \
and one row per requested image type, arranged in a grid and optionally grouped by cohort.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// JSON settings file; flags override its values.
    #[arg(short, long, env = "EYEGRID_SETTINGS")]
    settings: Option<PathBuf>,

    /// Write the document to this file (.jpg, .png, .tif, .bmp).
    #[arg(short, long, env = "EYEGRID_OUTPUT")]
    output: Option<PathBuf>,

    /// cSLO export directory (repeatable).
    #[arg(long = "cslo", value_name = "DIR")]
    cslo_dirs: Vec<PathBuf>,

    /// OCT export directory (repeatable).
    #[arg(long = "oct", value_name = "DIR")]
    oct_dirs: Vec<PathBuf>,

    /// Subject as ID[:LAB_ID[:GROUP]] (repeatable, in display order).
    #[arg(long = "subject", value_name = "SPEC")]
    subjects: Vec<String>,

    /// Group name in display order (repeatable). None means one grid.
    #[arg(long = "group", value_name = "NAME")]
    groups: Vec<String>,

    /// Image request as REQUEST[=DISPLAY_NAME] (repeatable, in row order).
    #[arg(short, long = "image", value_name = "REQUEST")]
    images: Vec<String>,

    /// Grid rows.
    #[arg(long, env = "EYEGRID_ROWS")]
    rows: Option<usize>,

    /// Grid columns.
    #[arg(long, env = "EYEGRID_COLUMNS")]
    columns: Option<usize>,

    /// Keep the cSLO info text instead of square-cropping it away.
    #[arg(long)]
    no_crop_cslo: bool,

    /// Normalise OCT scans to this height around the detected retina.
    #[arg(long, env = "EYEGRID_OCT_HEIGHT")]
    oct_height: Option<u32>,

    /// Normalise OCT scans to the suggested height (see --inspect-only).
    #[arg(long, conflicts_with = "oct_height")]
    oct_auto_height: bool,

    /// Show the lab id under the subject id.
    #[arg(long)]
    lab_id: bool,

    /// Hide the subject id in subject headings.
    #[arg(long)]
    no_subject_id: bool,

    /// Document title.
    #[arg(long)]
    title: Option<String>,

    /// Line under the title.
    #[arg(long)]
    subtitle: Option<String>,

    /// What to render.
    #[arg(long, value_enum, default_value = "full")]
    mode: ModeArg,

    /// How `[select]` slots with several candidates are resolved.
    #[arg(long, value_enum, env = "EYEGRID_SELECT", default_value = "prompt")]
    select: SelectArg,

    /// Font file for all text (default: EYEGRID_FONT, then a system font).
    #[arg(long)]
    font: Option<PathBuf>,

    /// Print JSON (inventory or run statistics) on stdout.
    #[arg(long, env = "EYEGRID_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "EYEGRID_NO_PROGRESS")]
    no_progress: bool,

    /// List subjects and available image requests, compile nothing.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "EYEGRID_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "EYEGRID_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    /// Everything.
    Full,
    /// Text and layout only, black image areas.
    Layout,
    /// Images, but `[select]` slots are left as placeholders.
    Images,
}

impl From<ModeArg> for RenderMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Full => RenderMode::Full,
            ModeArg::Layout => RenderMode::PreviewLayout,
            ModeArg::Images => RenderMode::PreviewLayoutAndImages,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SelectArg {
    /// Ask on the terminal.
    Prompt,
    /// Take the lowest sequence number.
    First,
    /// Leave the slot empty.
    Skip,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Settings file ────────────────────────────────────────────────────
    let mut settings = match cli.settings {
        Some(ref path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str::<SettingsFile>(&text)
                .with_context(|| format!("Invalid settings file {}", path.display()))?
        }
        None => SettingsFile::default(),
    };

    let directories = merge_directories(&cli, &settings.directories);
    if directories.is_empty() {
        bail!("No source directories: pass --cslo / --oct or a settings file");
    }
    let subjects = if cli.subjects.is_empty() {
        std::mem::take(&mut settings.subjects).into_table()
    } else {
        parse_subjects(&cli.subjects)?
    };

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let dirs = directories.clone();
        let inventory = tokio::task::spawn_blocking(move || inspect(&dirs, &subjects))
            .await
            .context("Inspection task failed")?
            .context("Failed to inspect source directories")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&inventory)
                    .context("Failed to serialise inventory")?
            );
        } else {
            for d in &directories {
                println!("{:<6}        {}", d.imager.token(), d.path.display());
            }
            println!("Subjects:     {}", inventory.subjects.len());
            if !inventory.subjects.is_empty() {
                println!("              {}", inventory.subjects.join(" "));
            }
            let (rows, cols) = inventory.suggested_grid;
            println!("Grid:         {rows} x {cols}");
            match inventory.suggested_cross_sectional_height {
                Some(h) => println!("OCT height:   {h} px"),
                None => println!("OCT height:   -"),
            }
            println!("Images:");
            for r in &inventory.available_requests {
                println!("  {r}");
            }
        }
        return Ok(());
    }

    let Some(output_path) = cli.output.clone().or_else(|| settings.output.clone()) else {
        bail!("No output file: pass -o/--output or set \"output\" in the settings file");
    };

    // ── Build config ─────────────────────────────────────────────────────
    let progress = show_progress.then(CliProgressCallback::new_dynamic);
    let selector: Selector = match cli.select {
        SelectArg::Prompt => Arc::new(PromptSelector {
            bar: progress.as_ref().map(|p| p.bar.clone()),
        }),
        SelectArg::First => Arc::new(FirstCandidate),
        SelectArg::Skip => Arc::new(NoSelection),
    };

    let mut subjects = subjects;
    if subjects.is_empty() {
        let dirs = directories.clone();
        let inventory = tokio::task::spawn_blocking(move || inspect(&dirs, &SubjectTable::default()))
            .await
            .context("Inspection task failed")?
            .context("Failed to discover subjects")?;
        subjects = inventory
            .subjects
            .iter()
            .map(|id| SubjectRecord::new(id.as_str(), "", ""))
            .collect();
    }

    let config = build_config(
        &cli,
        settings_overrides(settings),
        directories,
        subjects,
        progress.map(|p| p as Arc<dyn CompilationProgressCallback>),
        selector,
    )
    .await?;

    // ── Run compilation ──────────────────────────────────────────────────
    let stats = compile_to_file(&output_path, &config)
        .await
        .context("Compilation failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialise statistics")?
        );
    }

    if !cli.quiet {
        eprintln!(
            "{}  {} subjects  {} images  {} placeholders  {}ms  →  {}",
            if stats.asset_errors.is_empty() {
                green("✔")
            } else {
                cyan("⚠")
            },
            stats.subjects_placed,
            stats.images_placed,
            stats.placeholders,
            stats.total_duration_ms,
            bold(&output_path.display().to_string()),
        );
        if !show_progress {
            for e in &stats.asset_errors {
                eprintln!("   {} {}", red("✗"), e);
            }
        }
    }

    Ok(())
}

/// The parts of the settings file that the flags may override.
struct Overrides {
    group_order: Vec<String>,
    images: Vec<ModalityRequest>,
    rows: Option<usize>,
    columns: Option<usize>,
    crop_planar_text: Option<bool>,
    crop_cross_sectional: Option<bool>,
    cross_sectional_height: Option<u32>,
    show_subject_id: Option<bool>,
    show_lab_id: Option<bool>,
    title: Option<String>,
    subtitle: Option<String>,
    font: Option<PathBuf>,
    mode: Option<RenderMode>,
    style: Option<LayoutStyle>,
}

fn settings_overrides(s: SettingsFile) -> Overrides {
    Overrides {
        group_order: s.group_order,
        images: s.images_to_use.into_iter().map(Into::into).collect(),
        rows: s.rows,
        columns: s.columns,
        crop_planar_text: s.crop_planar_text,
        crop_cross_sectional: s.crop_cross_sectional,
        cross_sectional_height: s.cross_sectional_height,
        show_subject_id: s.show_subject_id,
        show_lab_id: s.show_lab_id,
        title: s.title,
        subtitle: s.subtitle,
        font: s.font,
        mode: s.mode,
        style: s.style,
    }
}

/// Map settings + CLI args to `CompilationConfig`.
async fn build_config(
    cli: &Cli,
    file: Overrides,
    directories: Vec<SourceDirectory>,
    subjects: SubjectTable,
    progress: Option<ProgressCallback>,
    selector: Selector,
) -> Result<CompilationConfig> {
    let images = if cli.images.is_empty() {
        file.images
    } else {
        cli.images.iter().map(|s| parse_image(s)).collect()
    };
    let groups = if cli.groups.is_empty() {
        file.group_order
    } else {
        cli.groups.clone()
    };

    let mode = match cli.mode {
        ModeArg::Full => file.mode.unwrap_or(RenderMode::Full),
        m => m.into(),
    };

    let mut builder = CompilationConfig::builder()
        .directories(directories.clone())
        .subjects(subjects.clone())
        .group_order(groups)
        .images_to_use(images)
        .crop_planar_text(!cli.no_crop_cslo && file.crop_planar_text.unwrap_or(true))
        .show_subject_id(!cli.no_subject_id && file.show_subject_id.unwrap_or(true))
        .show_lab_id(cli.lab_id || file.show_lab_id.unwrap_or(false))
        .mode(mode)
        .selector(selector);

    if let Some(rows) = cli.rows.or(file.rows) {
        builder = builder.rows(rows);
    }
    if let Some(columns) = cli.columns.or(file.columns) {
        builder = builder.columns(columns);
    }
    if let Some(title) = cli.title.clone().or(file.title) {
        builder = builder.title(title);
    }
    if let Some(subtitle) = cli.subtitle.clone().or(file.subtitle) {
        builder = builder.subtitle(subtitle);
    }
    if let Some(font) = cli.font.clone().or(file.font) {
        builder = builder.font_path(font);
    }
    if let Some(style) = file.style {
        builder = builder.style(style);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    // OCT normalisation: an explicit height wins; otherwise the suggestion
    // when only the switch is set.
    let height = if cli.oct_height.is_some() {
        cli.oct_height
    } else if cli.oct_auto_height {
        suggested_height(directories, subjects).await?
    } else {
        match (file.crop_cross_sectional, file.cross_sectional_height) {
            (Some(false), _) => None,
            (_, Some(h)) => Some(h),
            (Some(true), None) => suggested_height(directories, subjects).await?,
            (None, None) => None,
        }
    };
    if let Some(h) = height {
        builder = builder.cross_sectional_height(h);
    }

    builder.build().context("Invalid configuration")
}

async fn suggested_height(
    directories: Vec<SourceDirectory>,
    subjects: SubjectTable,
) -> Result<Option<u32>> {
    let inventory = tokio::task::spawn_blocking(move || inspect(&directories, &subjects))
        .await
        .context("Inspection task failed")?
        .context("Failed to measure OCT scans")?;
    tracing::info!(
        "Suggested OCT height: {:?}",
        inventory.suggested_cross_sectional_height
    );
    Ok(inventory.suggested_cross_sectional_height)
}

/// CLI directories replace the settings file's list when any are given.
fn merge_directories(cli: &Cli, file: &[SourceDirectory]) -> Vec<SourceDirectory> {
    if cli.cslo_dirs.is_empty() && cli.oct_dirs.is_empty() {
        return file.to_vec();
    }
    let planar = cli.cslo_dirs.iter().map(|p| SourceDirectory {
        path: p.clone(),
        imager: Imager::Planar,
    });
    let cross = cli.oct_dirs.iter().map(|p| SourceDirectory {
        path: p.clone(),
        imager: Imager::CrossSectional,
    });
    planar.chain(cross).collect()
}

/// Parse `--subject ID[:LAB_ID[:GROUP]]` values.
fn parse_subjects(specs: &[String]) -> Result<SubjectTable> {
    let mut table = SubjectTable::default();
    for spec in specs {
        let mut parts = spec.splitn(3, ':');
        let id = parts.next().unwrap_or("").trim();
        if id.is_empty() {
            bail!("Invalid --subject '{spec}': missing subject id");
        }
        let lab = parts.next().unwrap_or("").trim();
        let group = parts.next().unwrap_or("").trim();
        table.push(SubjectRecord::new(id, lab, group));
    }
    Ok(table)
}

/// Parse `--image REQUEST[=DISPLAY_NAME]`.
fn parse_image(s: &str) -> ModalityRequest {
    match s.split_once('=') {
        Some((request, name)) => ModalityRequest {
            request: request.trim().to_string(),
            display_name: name.trim().to_string(),
        },
        None => ModalityRequest {
            request: s.trim().to_string(),
            display_name: String::new(),
        },
    }
}
