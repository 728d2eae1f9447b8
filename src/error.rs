use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Template PDF not found: {}", .0.display())]
    TemplateMissing(PathBuf),
    #[error("CSV has no data rows.")]
    EmptyInput,
    #[error("Malformed CSV: {0}")]
    MalformedCsv(String),
    #[error("Template PDF has no detectable field positions: {}", .0.display())]
    LayoutUnresolvable(PathBuf),
    #[error("No card template is available for rank: {0}")]
    RankUnavailable(String),
    #[error("Rate limit exceeded for {0}. Please wait and try again.")]
    RateLimited(String),
    #[error("Failed to create PDF: {0}")]
    PdfError(String),
    #[error("Failed to load font: {0}")]
    FontError(String),
    #[error("Failed to write archive: {0}")]
    ArchiveError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AppError {
    /// Process exit code reported by the command line for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::TemplateMissing(_) => 3,
            AppError::EmptyInput => 4,
            AppError::MalformedCsv(_) => 5,
            AppError::LayoutUnresolvable(_) => 6,
            AppError::RankUnavailable(_) => 7,
            AppError::RateLimited(_) => 8,
            AppError::PdfError(_)
            | AppError::FontError(_)
            | AppError::ArchiveError(_)
            | AppError::IoError(_) => 1,
        }
    }
}

impl From<lopdf::Error> for AppError {
    fn from(e: lopdf::Error) -> Self {
        AppError::PdfError(e.to_string())
    }
}

impl From<printpdf::Error> for AppError {
    fn from(e: printpdf::Error) -> Self {
        AppError::PdfError(e.to_string())
    }
}

impl From<csv::Error> for AppError {
    fn from(e: csv::Error) -> Self {
        AppError::MalformedCsv(e.to_string())
    }
}

impl From<zip::result::ZipError> for AppError {
    fn from(e: zip::result::ZipError) -> Self {
        AppError::ArchiveError(e.to_string())
    }
}
