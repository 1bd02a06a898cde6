//! ScreenshotOcr - On-device text recognition for captured screen frames
//!
//! Takes a raw RGBA frame from a capture source and returns the text in it:
//! stride-safe pixel extraction, fixed-size tensor preprocessing, a pluggable
//! inference backend and greedy CTC decoding.

pub mod capture;
pub mod config;
pub mod error;
pub mod storage;
pub mod vision;

pub use capture::{extract, FrameSource, ImageFileSource, PixelBuffer, PixelFormat, RawFrame};
pub use config::OcrConfig;
pub use error::{InitError, OcrError};
pub use vision::{
    global, Dictionary, InferenceBackend, OcrHandle, OcrPipeline, OnnxBackend, Recognition,
    RecognitionWorker,
};
