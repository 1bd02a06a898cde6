//! Vision/OCR Layer
//!
//! Turns a captured frame into text:
//! raw frame -> packed RGB -> input tensor -> backend -> score matrix -> text.
//!
//! [`OcrPipeline`] owns the backend behind a mutex so two recognitions never
//! touch it at once. [`OcrHandle`] adds once-only construction for callers
//! that share one pipeline process-wide.

pub mod backend;
pub mod decode;
pub mod dictionary;
pub mod onnx;
pub mod preprocess;
pub mod worker;

pub use backend::{InferenceBackend, ModelContract, OutputTensor};
pub use decode::{decode, decode_with_confidence, Decoded};
pub use dictionary::Dictionary;
pub use onnx::OnnxBackend;
pub use preprocess::{InputTensor, Resample, TensorLayout, TensorPreprocessor};
pub use worker::RecognitionWorker;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::capture::{extract, RawFrame};
use crate::config::OcrConfig;
use crate::error::{InitError, OcrError};

/// Result of recognizing one frame
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    /// Recognized text, empty if nothing was emitted
    pub text: String,
    /// Mean score of the emitted glyphs (0.0 - 1.0 for softmax models)
    pub confidence: f32,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

/// Frame-to-text recognition pipeline
pub struct OcrPipeline {
    preprocessor: TensorPreprocessor,
    dictionary: Arc<Dictionary>,
    time_steps: Option<usize>,
    backend: Mutex<Option<Box<dyn InferenceBackend>>>,
    active: AtomicBool,
}

impl OcrPipeline {
    /// Load the configured dictionary and ONNX model
    pub fn init(config: &OcrConfig) -> Result<Self, InitError> {
        let dictionary = Dictionary::from_config(&config.dictionary)?;
        let backend = OnnxBackend::new(config.backend.clone());
        Self::init_with(config, dictionary, Box::new(backend))
    }

    /// Build a pipeline around an already loaded dictionary and any backend
    pub fn init_with(
        config: &OcrConfig,
        dictionary: Dictionary,
        mut backend: Box<dyn InferenceBackend>,
    ) -> Result<Self, InitError> {
        let model = &config.model;
        let preprocessor = TensorPreprocessor::new(
            model.input_width,
            model.input_height,
            model.layout,
            config.preprocess.resample,
        )?;

        let contract = ModelContract {
            model_path: model.path.clone(),
            input_width: model.input_width,
            input_height: model.input_height,
            layout: model.layout,
            num_classes: dictionary.num_classes(),
            time_steps: model.time_steps,
        };

        info!(
            "Initializing OCR pipeline: {} backend, input {:?}, {} classes",
            backend.name(),
            contract.input_shape(),
            contract.num_classes
        );
        backend.init(&contract)?;
        info!("OCR pipeline initialized successfully");

        Ok(Self {
            preprocessor,
            dictionary: Arc::new(dictionary),
            time_steps: model.time_steps,
            backend: Mutex::new(Some(backend)),
            active: AtomicBool::new(true),
        })
    }

    /// Whether `recognize` may still do work
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Shared read-only glyph table
    pub fn dictionary(&self) -> Arc<Dictionary> {
        Arc::clone(&self.dictionary)
    }

    /// Recognize the text in a frame
    pub fn recognize(&self, frame: RawFrame) -> Result<String, OcrError> {
        self.recognize_detailed(frame).map(|r| r.text)
    }

    /// Recognize the text in a frame, with confidence and timing
    pub fn recognize_detailed(&self, frame: RawFrame) -> Result<Recognition, OcrError> {
        if !self.is_active() {
            return Err(OcrError::Uninitialized);
        }

        let start = Instant::now();
        debug!("Recognizing {}x{} frame", frame.width, frame.height);

        let pixels = extract(&frame)?;
        drop(frame);
        let input = self.preprocessor.preprocess(&pixels)?;
        drop(pixels);

        let output = {
            let mut guard = self.backend.lock();
            let backend = guard.as_mut().ok_or(OcrError::Uninitialized)?;
            backend.run(&input)?
        };

        if output.num_classes() != self.dictionary.num_classes() {
            warn!(
                "Backend emitted {} classes, dictionary has {}",
                output.num_classes(),
                self.dictionary.num_classes()
            );
            return Err(OcrError::shape(
                "dictionary",
                self.dictionary.num_classes(),
                output.num_classes(),
            ));
        }
        if let Some(expected) = self.time_steps {
            if output.time_steps() != expected {
                return Err(OcrError::shape("output time steps", expected, output.time_steps()));
            }
        }

        let decoded = decode_with_confidence(
            output.as_slice(),
            output.time_steps(),
            output.num_classes(),
            &self.dictionary,
        )?;

        let processing_time = start.elapsed();
        debug!(
            "Recognition complete in {:?}: {} chars",
            processing_time,
            decoded.text.chars().count()
        );

        Ok(Recognition {
            text: decoded.text,
            confidence: decoded.confidence,
            processing_time_ms: processing_time.as_millis() as u64,
        })
    }

    /// Release the backend. Later calls to `recognize` return `Uninitialized`.
    pub fn shutdown(&self) {
        self.active.store(false, Ordering::Release);

        let backend = self.backend.lock().take();
        match backend {
            Some(mut backend) => {
                backend.release();
                info!("OCR pipeline shut down");
            }
            None => warn!("OCR pipeline already shut down"),
        }
    }
}

impl Drop for OcrPipeline {
    fn drop(&mut self) {
        if let Some(mut backend) = self.backend.get_mut().take() {
            backend.release();
        }
    }
}

/// Lazily initialized pipeline shared by many callers
///
/// Concurrent first use constructs the pipeline exactly once; every caller
/// then sees the same fully built instance. A handle is not re-armed by
/// `shutdown`.
pub struct OcrHandle {
    cell: OnceCell<OcrPipeline>,
}

impl OcrHandle {
    /// Create an empty handle
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Initialize with `init` unless a pipeline already exists
    pub fn init_with<F>(&self, init: F) -> Result<&OcrPipeline, InitError>
    where
        F: FnOnce() -> Result<OcrPipeline, InitError>,
    {
        self.cell.get_or_try_init(init)
    }

    /// Initialize from configuration unless a pipeline already exists
    pub fn init(&self, config: &OcrConfig) -> Result<&OcrPipeline, InitError> {
        self.init_with(|| OcrPipeline::init(config))
    }

    /// The pipeline, if initialized
    pub fn get(&self) -> Option<&OcrPipeline> {
        self.cell.get()
    }

    pub fn recognize(&self, frame: RawFrame) -> Result<String, OcrError> {
        self.get().ok_or(OcrError::Uninitialized)?.recognize(frame)
    }

    pub fn recognize_detailed(&self, frame: RawFrame) -> Result<Recognition, OcrError> {
        self.get()
            .ok_or(OcrError::Uninitialized)?
            .recognize_detailed(frame)
    }

    /// Shut the pipeline down; a no-op before init
    pub fn shutdown(&self) {
        if let Some(pipeline) = self.get() {
            pipeline.shutdown();
        }
    }
}

impl Default for OcrHandle {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: OcrHandle = OcrHandle::new();

/// Process-wide pipeline handle
pub fn global() -> &'static OcrHandle {
    &GLOBAL
}
