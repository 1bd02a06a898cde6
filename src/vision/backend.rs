//! Inference backend interface
//!
//! The pipeline only sees this trait: a backend is initialized once against
//! a [`ModelContract`], runs one input tensor at a time and is released on
//! shutdown. [`super::onnx::OnnxBackend`] is the bundled implementation.

use std::path::PathBuf;

use super::preprocess::{InputTensor, TensorLayout};
use crate::error::{InitError, OcrError};

/// Shapes agreed between pipeline and backend at init time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelContract {
    /// Model file to load
    pub model_path: PathBuf,
    /// Input width in pixels
    pub input_width: u32,
    /// Input height in pixels
    pub input_height: u32,
    /// Input value order
    pub layout: TensorLayout,
    /// Output classes per time step, blank included
    pub num_classes: usize,
    /// Output time steps, when pinned by configuration
    pub time_steps: Option<usize>,
}

impl ModelContract {
    /// 4-D input shape including the batch dimension
    pub fn input_shape(&self) -> [usize; 4] {
        self.layout.shape(self.input_width, self.input_height)
    }
}

/// Time-major `[time_steps, num_classes]` score matrix
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    data: Vec<f32>,
    time_steps: usize,
    num_classes: usize,
}

impl OutputTensor {
    /// Wrap flat row-major scores, checking the length against the dimensions
    pub fn new(data: Vec<f32>, time_steps: usize, num_classes: usize) -> Result<Self, OcrError> {
        let expected = time_steps * num_classes;
        if data.len() != expected {
            return Err(OcrError::shape("output tensor", expected, data.len()));
        }
        Ok(Self {
            data,
            time_steps,
            num_classes,
        })
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn time_steps(&self) -> usize {
        self.time_steps
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

/// A black-box tensor-in/tensor-out recognition model
///
/// `run` takes `&mut self`: backends may advance internal state per call, so
/// callers must serialize access. The pipeline does that with a mutex.
pub trait InferenceBackend: Send {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Load the model and check it honours the contract
    fn init(&mut self, contract: &ModelContract) -> Result<(), InitError>;

    /// Run one input through the model
    fn run(&mut self, input: &InputTensor) -> Result<OutputTensor, OcrError>;

    /// Free the model; later `run` calls must fail rather than crash
    fn release(&mut self);
}
