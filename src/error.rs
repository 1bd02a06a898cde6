//! Error types for the recognition pipeline
//!
//! `OcrError` is what a recognition call can report; `InitError` is what
//! pipeline construction can report. Both are plain data so results can
//! cross thread boundaries and be compared in tests.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single recognition call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OcrError {
    /// Pipeline used before init or after shutdown
    #[error("OCR pipeline is not initialized")]
    Uninitialized,

    /// Raw buffer is shorter than its declared stride arithmetic requires
    #[error("truncated frame: expected at least {expected} bytes, got {actual}")]
    TruncatedFrame { expected: usize, actual: usize },

    /// Declared frame layout is self-inconsistent
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// A tensor's length or dimensions disagree with what a stage expects
    #[error("shape mismatch in {stage}: expected {expected}, got {actual}")]
    ShapeMismatch {
        stage: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Opaque failure reported by the inference backend
    #[error("inference backend failure: {0}")]
    BackendFailure(String),
}

impl OcrError {
    /// Convenience constructor for a shape mismatch
    pub fn shape(stage: &'static str, expected: usize, actual: usize) -> Self {
        OcrError::ShapeMismatch {
            stage,
            expected,
            actual,
        }
    }

    /// Wrap any error chain as a backend failure, keeping its context
    pub fn backend(err: impl std::fmt::Display) -> Self {
        OcrError::BackendFailure(err.to_string())
    }
}

/// Failure while constructing a pipeline
#[derive(Debug, Error)]
pub enum InitError {
    /// Configuration is incomplete or unreadable
    #[error("configuration error: {0}")]
    Config(String),

    /// Dictionary could not be read or is unusable
    #[error("failed to load dictionary from {path:?}: {message}")]
    Dictionary { path: PathBuf, message: String },

    /// Model could not be loaded by the backend
    #[error("failed to load model from {path:?}: {message}")]
    ModelLoad { path: PathBuf, message: String },

    /// Model, dictionary and configured shapes do not agree
    #[error("tensor shape contract violated: {0}")]
    ShapeContract(String),
}
