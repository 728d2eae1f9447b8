// cubscout-certs: Fill Cub Scout award certificates and rank cards from a CSV roster

use clap::{Args, Parser, Subcommand};
use cubscout_certs::compose::RenderConfig;
use cubscout_certs::error::AppError;
use cubscout_certs::generate::{
    Engine, EngineSettings, GenerateRequest, OutputMode, Rank, DEFAULT_AWARD_TEMPLATE,
    DEFAULT_FONTS_DIR, DEFAULT_TEMPLATES_DIR,
};
use cubscout_certs::limiter::{DEFAULT_GENERATE_PER_MINUTE, DEFAULT_VALIDATE_PER_MINUTE};
use cubscout_certs::record::Workflow;
use std::path::{Path, PathBuf};

// ============================================================================
// Constants
// ============================================================================

/// Rate-limit key for requests issued from this command line.
const LOCAL_CLIENT: &str = "local";

// ============================================================================
// Data Structures
// ============================================================================

/// CLI Arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Fill Cub Scout award certificates and rank cards from a CSV roster")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Generation requests allowed per minute
    #[arg(long, global = true, env = "RATE_LIMIT_GENERATE_PER_MINUTE", default_value_t = DEFAULT_GENERATE_PER_MINUTE)]
    generate_per_minute: usize,

    /// Validation requests allowed per minute
    #[arg(long, global = true, env = "RATE_LIMIT_VALIDATE_PER_MINUTE", default_value_t = DEFAULT_VALIDATE_PER_MINUTE)]
    validate_per_minute: usize,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fill certificates or rank cards from a CSV roster
    Generate(GenerateArgs),
    /// Check a CSV roster and print the report as JSON
    Validate(ValidateArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// CSV roster (Date, Pack Number, Scout Name, Award Name, Den Leader, Cubmaster)
    #[arg(long)]
    csv: PathBuf,

    /// Output file (defaults to filled_awards.pdf or filled_awards.zip)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Template PDF to use instead of the workflow's default
    #[arg(short, long)]
    template: Option<PathBuf>,

    /// Award certificate template
    #[arg(long, env = "CERT_TEMPLATE_PATH", default_value = DEFAULT_AWARD_TEMPLATE)]
    award_template: PathBuf,

    /// Directory holding rank-card templates
    #[arg(long, env = "CERT_TEMPLATES_DIR", default_value = DEFAULT_TEMPLATES_DIR)]
    templates_dir: PathBuf,

    /// Directory holding bundled font files
    #[arg(long, env = "CERT_FONTS_DIR", default_value = DEFAULT_FONTS_DIR)]
    fonts_dir: PathBuf,

    /// Base font
    #[arg(short, long, default_value = "Helvetica")]
    font: String,

    /// Font for Den Leader and Cubmaster signatures ("None" for the base font)
    #[arg(long, default_value = "PatrickHand")]
    script_font: String,

    /// Base font size in points
    #[arg(long, default_value = "14")]
    font_size: f32,

    /// Signature font size in points
    #[arg(long, default_value = "24")]
    script_font_size: f32,

    /// Move everything left on the printed page, in inches
    #[arg(long, default_value = "0.5", allow_negative_numbers = true)]
    shift_left: f32,

    /// Move everything down on the printed page, in inches
    #[arg(long, default_value = "0.5", allow_negative_numbers = true)]
    shift_down: f32,

    /// Page rotation used to interpret the shift (0, 90, 180 or 270)
    #[arg(long, value_parser = parse_rotation)]
    rotation: Option<i64>,

    /// Single combined PDF or one PDF per scout in a ZIP
    #[arg(long, value_enum, default_value_t = OutputMode::CombinedPdf)]
    output_mode: OutputMode,

    /// Award certificates or rank cards
    #[arg(short, long, value_enum, default_value_t = Workflow::Award)]
    workflow: Workflow,

    /// Rank for the rank workflow
    #[arg(short, long, value_enum, default_value_t = Rank::Wolf)]
    rank: Rank,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// CSV roster to check
    #[arg(long)]
    csv: PathBuf,

    /// Which required headers apply
    #[arg(short, long, value_enum, default_value_t = Workflow::Award)]
    workflow: Workflow,
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let settings = EngineSettings {
        generate_per_minute: cli.generate_per_minute,
        validate_per_minute: cli.validate_per_minute,
        ..EngineSettings::default()
    };

    match cli.command {
        Command::Generate(args) => generate(args, settings),
        Command::Validate(args) => validate(args, settings),
    }
}

fn generate(args: GenerateArgs, settings: EngineSettings) -> Result<(), AppError> {
    let engine = Engine::new(EngineSettings {
        award_template: args.award_template,
        templates_dir: args.templates_dir,
        fonts_dir: args.fonts_dir,
        ..settings
    });

    let (out_dir, output_name) = split_output(args.output.as_deref());
    let request = GenerateRequest {
        csv: read_roster(&args.csv)?,
        workflow: args.workflow,
        rank: args.rank,
        output_mode: args.output_mode,
        output_name,
        template: args.template,
        config: RenderConfig {
            font: args.font,
            script_font: Some(args.script_font),
            font_size: args.font_size,
            script_font_size: Some(args.script_font_size),
            shift_left: args.shift_left,
            shift_down: args.shift_down,
            rotation: args.rotation,
        },
    };

    let artifact = engine.generate(LOCAL_CLIENT, &request, &out_dir)?;

    println!("✓ Generated: {}", artifact.path.display());
    println!("  Scouts: {}", artifact.records);
    match request.output_mode {
        OutputMode::CombinedPdf => println!("  Pages: {}", artifact.parts),
        OutputMode::PerScoutZip => println!("  Files: {}", artifact.parts),
    }

    Ok(())
}

fn validate(args: ValidateArgs, settings: EngineSettings) -> Result<(), AppError> {
    let engine = Engine::new(settings);
    let csv = read_roster(&args.csv)?;
    let report = engine.validate_csv(LOCAL_CLIENT, &csv, args.workflow)?;

    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| AppError::MalformedCsv(e.to_string()))?;
    println!("{}", json);

    if report.ok {
        Ok(())
    } else {
        Err(AppError::MalformedCsv(report.errors.join("; ")))
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn read_roster(path: &Path) -> Result<Vec<u8>, AppError> {
    std::fs::read(path).map_err(|e| AppError::MalformedCsv(format!("{}: {}", path.display(), e)))
}

/// Directory to write into and the requested file name.
fn split_output(output: Option<&Path>) -> (PathBuf, Option<String>) {
    let Some(output) = output else {
        return (PathBuf::from("."), None);
    };
    let dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let name = output.file_name().map(|n| n.to_string_lossy().into_owned());
    (dir, name)
}

fn parse_rotation(value: &str) -> Result<i64, String> {
    let degrees: i64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    match degrees.rem_euclid(360) {
        0 | 90 | 180 | 270 => Ok(degrees),
        _ => Err(format!("rotation must be a multiple of 90, got {}", degrees)),
    }
}
