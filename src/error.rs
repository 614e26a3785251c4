//! Error taxonomy for the extraction pipeline.

use thiserror::Error;

use crate::validator::ValidationErrors;

/// A time string that cannot be read as a clock time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeFormatError {
    #[error("Invalid time format: {0:?}")]
    InvalidFormat(String),

    #[error("Invalid time values: {hours}:{minutes}")]
    OutOfRange { hours: i64, minutes: i64 },
}

/// Chat completions call failure. The transport or decode cause is kept as the source.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Failed to send request: {0}")]
    Send(#[source] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Failed to parse response: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Vision model extraction failure.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Failed to read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("Vision model request failed: {0}")]
    Request(#[from] ChatError),

    #[error("No content in LLM response")]
    EmptyResponse,

    #[error("No JSON found in LLM response")]
    NoJson,

    #[error("Could not parse LLM response: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum RepairError {
    #[error("Repair request failed: {0}")]
    Request(#[from] ChatError),

    #[error("No JSON found in repair response")]
    NoJson,

    #[error("Could not parse repaired JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("OCR engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("OCR engine has been released")]
    Released,

    #[error("OCR extraction failed: {0}")]
    Recognition(String),

    #[error("OCR request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Could not parse OCR response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("OCR I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Failed to load PDF: {0}")]
    Pdf(String),

    #[error("Failed to read DOCX: {0}")]
    Docx(String),

    #[error("Image preprocessing failed: {0}")]
    Image(String),

    #[error("Document I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid timetable id: {0:?}")]
    InvalidId(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored timetable is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Where a pipeline run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    SampleShortCircuit,
    Extracting,
    Normalizing,
    Validating,
    Repairing,
    Storing,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::SampleShortCircuit => "sample-short-circuit",
            Stage::Extracting => "extracting",
            Stage::Normalizing => "normalizing",
            Stage::Validating => "validating",
            Stage::Repairing => "repairing",
            Stage::Storing => "storing",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal pipeline failure.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unable to extract timetable data from file")]
    ExtractionUnavailable,

    #[error(transparent)]
    Ocr(#[from] OcrError),

    /// Carries the errors from the first validation, never the repair failure.
    #[error("Extracted data does not match required schema")]
    Validation(ValidationErrors),

    #[error("Failed to save timetable: {0}")]
    Storage(#[from] StorageError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::ExtractionUnavailable | PipelineError::Ocr(_) => Stage::Extracting,
            PipelineError::Validation(_) => Stage::Validating,
            PipelineError::Storage(_) => Stage::Storing,
        }
    }
}
