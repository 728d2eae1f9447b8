//! Generation requests: validation, template choice, output packaging.

use crate::compose::{compose, compose_document, RenderConfig};
use crate::error::AppError;
use crate::fonts::FontRegistry;
use crate::limiter::{SlidingWindowLimiter, DEFAULT_GENERATE_PER_MINUTE, DEFAULT_VALIDATE_PER_MINUTE};
use crate::record::{normalize_rows, parse_csv, validate, Record, ValidationReport, Workflow};
use crate::template::{FieldCache, ResolvedTemplate};
use log::{info, warn};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

// ============================================================================
// Constants
// ============================================================================

pub const DEFAULT_OUTPUT_PDF: &str = "filled_awards.pdf";
pub const DEFAULT_OUTPUT_ZIP: &str = "filled_awards.zip";
pub const DEFAULT_AWARD_TEMPLATE: &str = "assets/templates/cub_scout_award_certificate.pdf";
pub const DEFAULT_TEMPLATES_DIR: &str = "assets/templates";
pub const DEFAULT_FONTS_DIR: &str = "assets/fonts";

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Rank {
    Lion,
    Tiger,
    #[default]
    Wolf,
    Bear,
    Webelos,
    ArrowOfLight,
}

impl Rank {
    pub fn label(&self) -> &'static str {
        match self {
            Rank::Lion => "Lion",
            Rank::Tiger => "Tiger",
            Rank::Wolf => "Wolf",
            Rank::Bear => "Bear",
            Rank::Webelos => "Webelos",
            Rank::ArrowOfLight => "Arrow of Light",
        }
    }

    /// Card-sheet template file shipped for this rank, if any.
    pub fn card_template(&self) -> Option<&'static str> {
        match self {
            Rank::Wolf => Some("wolf_rank_cards.pdf"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputMode {
    /// One multi-page PDF
    #[default]
    CombinedPdf,
    /// One PDF per scout, packaged as a ZIP archive
    PerScoutZip,
}

/// Where templates and fonts live, and how often clients may call.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub award_template: PathBuf,
    pub templates_dir: PathBuf,
    pub fonts_dir: PathBuf,
    pub generate_per_minute: usize,
    pub validate_per_minute: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            award_template: PathBuf::from(DEFAULT_AWARD_TEMPLATE),
            templates_dir: PathBuf::from(DEFAULT_TEMPLATES_DIR),
            fonts_dir: PathBuf::from(DEFAULT_FONTS_DIR),
            generate_per_minute: DEFAULT_GENERATE_PER_MINUTE,
            validate_per_minute: DEFAULT_VALIDATE_PER_MINUTE,
        }
    }
}

/// One generation call.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Raw CSV bytes.
    pub csv: Vec<u8>,
    pub workflow: Workflow,
    pub rank: Rank,
    pub output_mode: OutputMode,
    /// Requested file name; sanitized before use.
    pub output_name: Option<String>,
    /// Overrides the template the workflow would pick.
    pub template: Option<PathBuf>,
    pub config: RenderConfig,
}

/// What a successful generation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    pub path: PathBuf,
    /// Number of scouts rendered.
    pub records: usize,
    /// Pages in the combined PDF, or PDFs in the archive.
    pub parts: usize,
}

// ============================================================================
// Engine
// ============================================================================

/// Long-lived generation service: template cache, fonts and rate limits.
#[derive(Debug)]
pub struct Engine {
    settings: EngineSettings,
    cache: FieldCache,
    fonts: FontRegistry,
    generate_limiter: SlidingWindowLimiter,
    validate_limiter: SlidingWindowLimiter,
}

impl Engine {
    pub fn new(settings: EngineSettings) -> Self {
        Engine {
            fonts: FontRegistry::new(&settings.fonts_dir),
            cache: FieldCache::new(),
            generate_limiter: SlidingWindowLimiter::per_minute(settings.generate_per_minute),
            validate_limiter: SlidingWindowLimiter::per_minute(settings.validate_per_minute),
            settings,
        }
    }

    pub fn cache(&self) -> &FieldCache {
        &self.cache
    }

    /// Check a roster without generating anything.
    pub fn validate_csv(
        &self,
        client: &str,
        csv: &[u8],
        workflow: Workflow,
    ) -> Result<ValidationReport, AppError> {
        if !self.validate_limiter.allow(client) {
            return Err(AppError::RateLimited(client.to_string()));
        }
        let table = parse_csv(csv)?;
        Ok(validate(&table, workflow))
    }

    /// Validate, compose and write the requested artifact into `out_dir`.
    pub fn generate(
        &self,
        client: &str,
        request: &GenerateRequest,
        out_dir: &Path,
    ) -> Result<GeneratedArtifact, AppError> {
        if !self.generate_limiter.allow(client) {
            return Err(AppError::RateLimited(client.to_string()));
        }

        let records = self.checked_records(request)?;
        let template = self.resolve_template(request)?;

        // Scratch space is removed when `workdir` drops, on every path.
        let workdir = tempfile::tempdir()?;
        let (scratch, parts) = match request.output_mode {
            OutputMode::CombinedPdf => {
                let name = safe_output_name(request.output_name.as_deref().unwrap_or(""));
                let scratch = workdir.path().join(&name);
                let pages = compose(&template, &records, &request.config, &self.fonts, &scratch)?;
                (scratch, pages)
            }
            OutputMode::PerScoutZip => {
                let name = safe_zip_name(request.output_name.as_deref().unwrap_or(""));
                let scratch = workdir.path().join(&name);
                let entries = self.write_archive(&template, &records, &request.config, &scratch)?;
                (scratch, entries)
            }
        };

        std::fs::create_dir_all(out_dir)?;
        let file_name = scratch
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PDF));
        let path = out_dir.join(file_name);
        std::fs::copy(&scratch, &path)?;
        info!("Generated {} for {} scout(s)", path.display(), records.len());

        Ok(GeneratedArtifact {
            path,
            records: records.len(),
            parts,
        })
    }

    fn checked_records(&self, request: &GenerateRequest) -> Result<Vec<Record>, AppError> {
        let table = parse_csv(&request.csv)?;
        let report = validate(&table, request.workflow);
        if !report.ok {
            // A complete header row with nothing under it.
            if table.rows.is_empty() && report.errors.len() == 1 {
                return Err(AppError::EmptyInput);
            }
            return Err(AppError::MalformedCsv(report.errors.join("; ")));
        }
        for warning in &report.warnings {
            warn!("{}", warning);
        }
        Ok(normalize_rows(&table.rows, request.workflow))
    }

    fn resolve_template(&self, request: &GenerateRequest) -> Result<ResolvedTemplate, AppError> {
        match request.workflow {
            Workflow::Award => {
                let path = request
                    .template
                    .as_deref()
                    .unwrap_or(&self.settings.award_template);
                self.cache.resolve(path)
            }
            Workflow::Rank => {
                let path = match &request.template {
                    Some(path) => path.clone(),
                    None => {
                        let file = request
                            .rank
                            .card_template()
                            .ok_or_else(|| AppError::RankUnavailable(request.rank.label().to_string()))?;
                        self.settings.templates_dir.join(file)
                    }
                };
                self.cache.resolve_with_grid(&path)
            }
        }
    }

    /// One single-scout PDF per record, deflated into a ZIP at `path`.
    fn write_archive(
        &self,
        template: &ResolvedTemplate,
        records: &[Record],
        config: &RenderConfig,
        path: &Path,
    ) -> Result<usize, AppError> {
        let mut zip = ZipWriter::new(File::create(path)?);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default());

        for (i, record) in records.iter().enumerate() {
            let document = compose_document(template, std::slice::from_ref(record), config, &self.fonts)?;
            zip.start_file(archive_entry_name(i + 1, record), options)?;
            zip.write_all(&document.bytes)?;
        }
        zip.finish()?;
        Ok(records.len())
    }
}

// ============================================================================
// Safe Names
// ============================================================================

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn base_file_name(value: &str) -> String {
    Path::new(value)
        .file_name()
        .map(|n| sanitize(&n.to_string_lossy()))
        .unwrap_or_default()
}

/// Basename only, unsafe characters replaced, always ending in `.pdf`.
pub fn safe_output_name(value: &str) -> String {
    let name = base_file_name(value);
    if name.is_empty() {
        return DEFAULT_OUTPUT_PDF.to_string();
    }
    if name.to_ascii_lowercase().ends_with(".pdf") {
        name
    } else {
        format!("{}.pdf", name)
    }
}

/// Basename only, unsafe characters replaced, extension forced to `.zip`.
pub fn safe_zip_name(value: &str) -> String {
    let name = base_file_name(value);
    if name.is_empty() {
        return DEFAULT_OUTPUT_ZIP.to_string();
    }
    if name.to_ascii_lowercase().ends_with(".zip") {
        return name;
    }
    let stem = Path::new(&name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or(name);
    format!("{}.zip", stem)
}

/// A name fragment safe for archive entries; never empty.
pub fn safe_base_name(value: &str) -> String {
    let name = sanitize(value.trim());
    let trimmed = name.trim_matches(|c| matches!(c, '.' | '_' | '-'));
    if trimmed.is_empty() {
        "item".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `NNN_<scout>_<award>.pdf`, 1-based.
pub fn archive_entry_name(index: usize, record: &Record) -> String {
    format!(
        "{:03}_{}_{}.pdf",
        index,
        safe_base_name(&record.scout_name),
        safe_base_name(&record.award)
    )
}
