//! Error handling for Somnia
//!
//! Every error carries enough context (category, phase, constraint) to be
//! actionable by the caller without inspecting engine internals.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for Somnia operations
pub type Result<T> = std::result::Result<T, SomniaError>;

/// A single violated profile constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileViolation {
    /// Dotted path of the offending field (e.g. `category_weights.rain`)
    pub field: String,
    /// Human-readable description of the broken constraint
    pub message: String,
}

impl ProfileViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ProfileViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_violations(violations: &[ProfileViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Main error type for Somnia operations
#[derive(Error, Debug)]
pub enum SomniaError {
    // Profile Errors
    #[error("Invalid profile '{mix_type}': {}", join_violations(.violations))]
    InvalidProfile {
        mix_type: String,
        violations: Vec<ProfileViolation>,
    },

    // Numeric Errors
    #[error("Empty buffer in {context}")]
    EmptyBuffer { context: String },

    #[error(
        "Mix would be silent: no usable audio in categories [{}] and no synthesized layer",
        .categories.join(", ")
    )]
    EmptyMix { categories: Vec<String> },

    #[error("Filter instability: {stage} produced NaN/Inf samples")]
    FilterInstability { stage: String },

    #[error("Mix creation cancelled during {stage}")]
    Cancelled { stage: String },

    // File Errors
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid audio file: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SomniaError {
    /// Shorthand for an `EmptyBuffer` error
    pub fn empty_buffer(context: impl Into<String>) -> Self {
        SomniaError::EmptyBuffer {
            context: context.into(),
        }
    }

    /// Shorthand for a `FilterInstability` error
    pub fn filter_instability(stage: impl Into<String>) -> Self {
        SomniaError::FilterInstability {
            stage: stage.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            SomniaError::InvalidProfile { .. } => "INVALID_PROFILE",
            SomniaError::EmptyBuffer { .. } => "EMPTY_BUFFER",
            SomniaError::EmptyMix { .. } => "EMPTY_MIX",
            SomniaError::FilterInstability { .. } => "FILTER_INSTABILITY",
            SomniaError::Cancelled { .. } => "CANCELLED",
            SomniaError::FileNotFound { .. } => "FILE_NOT_FOUND",
            SomniaError::InvalidAudio { .. } => "INVALID_AUDIO",
            SomniaError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            SomniaError::Io(_) => "IO_ERROR",
            SomniaError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if the caller can recover by changing its inputs
    ///
    /// Nothing is retried internally: the same inputs always fail the same way.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SomniaError::InvalidProfile { .. }
                | SomniaError::EmptyMix { .. }
                | SomniaError::FileNotFound { .. }
                | SomniaError::InvalidAudio { .. }
                | SomniaError::UnsupportedFormat { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            SomniaError::InvalidProfile { .. } => vec![
                "Fix every listed field in the overrides and resolve again",
                "Crossfade must be shorter than the target duration",
                "Beat frequencies must lie between 0 and 40 Hz",
            ],
            SomniaError::EmptyBuffer { .. } => vec![
                "A zero-length clip reached the engine - check the decoder output",
                "Remove empty files from the category folders",
            ],
            SomniaError::EmptyMix { .. } => vec![
                "Provide at least one non-empty clip category",
                "Or request a binaural/noise schedule to synthesize a layer",
            ],
            SomniaError::FilterInstability { .. } => vec![
                "Move the filter cutoff further from Nyquist",
                "Lower the layer gain before filtering",
            ],
            SomniaError::FileNotFound { .. } => vec![
                "Check the file path is correct",
                "Verify the file hasn't been moved or deleted",
            ],
            SomniaError::InvalidAudio { .. } | SomniaError::UnsupportedFormat { .. } => vec![
                "Convert the clip to 16/24-bit or float WAV",
                "Only mono and stereo clips are supported",
            ],
            _ => vec![],
        }
    }
}
