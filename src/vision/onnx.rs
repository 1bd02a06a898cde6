//! ONNX Runtime backend
//!
//! Loads a PaddleOCR-style recognition model and runs it on the CPU.

use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::{TensorRef, ValueType};
use std::path::Path;
use tracing::{debug, info};

use super::backend::{InferenceBackend, ModelContract, OutputTensor};
use super::preprocess::InputTensor;
use crate::config::BackendConfig;
use crate::error::{InitError, OcrError};

/// Recognition backend backed by an ONNX Runtime session
pub struct OnnxBackend {
    config: BackendConfig,
    session: Option<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxBackend {
    /// Create an unloaded backend; the model is loaded by `init`
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            session: None,
            input_name: String::new(),
            output_name: String::new(),
        }
    }

    /// Whether a session is currently loaded
    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    fn load_session(&self, model_path: &Path) -> Result<Session> {
        info!("Loading ONNX model from {:?}", model_path);

        let session = Session::builder()?
            .with_optimization_level(optimization_level(self.config.optimization_level))?
            .with_intra_threads(self.config.intra_threads)?
            .commit_from_file(model_path)
            .context("Failed to load ONNX model")?;

        Ok(session)
    }

    fn infer(&mut self, input: &InputTensor) -> Result<OutputTensor> {
        let session = self
            .session
            .as_mut()
            .context("ONNX session is not loaded")?;

        let view = input.view()?;
        let tensor = TensorRef::from_array_view(view).context("Failed to create input tensor")?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .context("ONNX Runtime inference failed")?;

        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .with_context(|| format!("Failed to extract output '{}' as f32", self.output_name))?;

        let (time_steps, num_classes) = output_dims(shape)?;
        debug!("ONNX output shape {:?}", &shape[..]);

        Ok(OutputTensor::new(data.to_vec(), time_steps, num_classes)?)
    }
}

impl InferenceBackend for OnnxBackend {
    fn name(&self) -> &str {
        "onnx"
    }

    fn init(&mut self, contract: &ModelContract) -> Result<(), InitError> {
        let session = self
            .load_session(&contract.model_path)
            .map_err(|e| InitError::ModelLoad {
                path: contract.model_path.clone(),
                message: format!("{:#}", e),
            })?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| InitError::ShapeContract("model declares no inputs".to_string()))?;
        let output = session
            .outputs
            .first()
            .ok_or_else(|| InitError::ShapeContract("model declares no outputs".to_string()))?;

        let input_shape = extract_shape(&input.input_type);
        let output_shape = extract_shape(&output.output_type);
        check_input_dims(&input_shape, &contract.input_shape()).map_err(InitError::ShapeContract)?;
        check_output_dims(&output_shape, contract.num_classes, contract.time_steps)
            .map_err(InitError::ShapeContract)?;

        info!(
            "Model loaded. Input: {} {:?}, Output: {} {:?}",
            input.name, input_shape, output.name, output_shape
        );

        self.input_name = input.name.clone();
        self.output_name = output.name.clone();
        self.session = Some(session);
        Ok(())
    }

    fn run(&mut self, input: &InputTensor) -> Result<OutputTensor, OcrError> {
        self.infer(input).map_err(|e| OcrError::backend(format!("{:#}", e)))
    }

    fn release(&mut self) {
        if self.session.take().is_some() {
            info!("ONNX session released");
        }
    }
}

fn optimization_level(level: u8) -> GraphOptimizationLevel {
    match level {
        0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    }
}

/// Extract shape from ONNX value type; dynamic dims are negative
fn extract_shape(value_type: &ValueType) -> Vec<i64> {
    match value_type {
        ValueType::Tensor { shape, .. } => shape.iter().copied().collect(),
        _ => vec![],
    }
}

/// Compare a declared input shape with the pinned one, ignoring dynamic dims
fn check_input_dims(declared: &[i64], expected: &[usize; 4]) -> Result<(), String> {
    if declared.is_empty() {
        return Ok(());
    }
    if declared.len() != expected.len() {
        return Err(format!(
            "model input has rank {}, expected {:?}",
            declared.len(),
            expected
        ));
    }
    for (axis, (&d, &e)) in declared.iter().zip(expected).enumerate() {
        if d >= 0 && d as usize != e {
            return Err(format!(
                "model input {:?} disagrees with configured {:?} on axis {}",
                declared, expected, axis
            ));
        }
    }
    Ok(())
}

/// Check a declared `[batch, T, C]` or `[T, C]` output against the contract
fn check_output_dims(declared: &[i64], num_classes: usize, time_steps: Option<usize>) -> Result<(), String> {
    if declared.is_empty() {
        return Ok(());
    }
    if !(2..=3).contains(&declared.len()) {
        return Err(format!("model output {:?} is not a [T, C] score matrix", declared));
    }

    let classes = declared[declared.len() - 1];
    if classes >= 0 && classes as usize != num_classes {
        return Err(format!(
            "model emits {} classes but the dictionary has {}",
            classes, num_classes
        ));
    }

    let steps = declared[declared.len() - 2];
    if let Some(expected) = time_steps {
        if steps >= 0 && steps as usize != expected {
            return Err(format!(
                "model emits {} time steps, configured {}",
                steps, expected
            ));
        }
    }
    Ok(())
}

/// Time steps and classes of a runtime output shape
fn output_dims(shape: &[i64]) -> Result<(usize, usize)> {
    let dims: Vec<usize> = shape
        .iter()
        .map(|&d| usize::try_from(d))
        .collect::<Result<_, _>>()
        .with_context(|| format!("Negative dimension in output shape {:?}", shape))?;

    match dims.as_slice() {
        [t, c] | [1, t, c] => Ok((*t, *c)),
        _ => anyhow::bail!("Unexpected output shape {:?}, expected [1, T, C] or [T, C]", shape),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::preprocess::TensorLayout;
    use std::path::PathBuf;

    #[test]
    fn test_input_dims_allow_dynamic() {
        assert!(check_input_dims(&[-1, 3, 48, -1], &[1, 3, 48, 320]).is_ok());
        assert!(check_input_dims(&[1, 3, 48, 320], &[1, 3, 48, 320]).is_ok());
        assert!(check_input_dims(&[], &[1, 3, 48, 320]).is_ok());
    }

    #[test]
    fn test_input_dims_mismatch() {
        assert!(check_input_dims(&[-1, 3, 32, -1], &[1, 3, 48, 320]).is_err());
        assert!(check_input_dims(&[-1, 3, 48], &[1, 3, 48, 320]).is_err());
    }

    #[test]
    fn test_output_dims_check() {
        assert!(check_output_dims(&[-1, -1, 97], 97, None).is_ok());
        assert!(check_output_dims(&[40, 97], 97, Some(40)).is_ok());
        assert!(check_output_dims(&[-1, 40, 96], 97, None).is_err());
        assert!(check_output_dims(&[-1, 40, 97], 97, Some(80)).is_err());
        assert!(check_output_dims(&[-1, 97], 97, None).is_ok());
        assert!(check_output_dims(&[97], 97, None).is_err());
    }

    #[test]
    fn test_runtime_output_dims() {
        assert_eq!(output_dims(&[1, 40, 97]).unwrap(), (40, 97));
        assert_eq!(output_dims(&[40, 97]).unwrap(), (40, 97));
        assert!(output_dims(&[2, 40, 97]).is_err());
        assert!(output_dims(&[-1, 97]).is_err());
    }

    #[test]
    fn test_optimization_levels() {
        assert!(matches!(optimization_level(0), GraphOptimizationLevel::Disable));
        assert!(matches!(optimization_level(9), GraphOptimizationLevel::Level3));
    }

    #[test]
    fn test_run_before_init_fails() {
        let mut backend = OnnxBackend::new(BackendConfig::default());
        let input = InputTensor::new(vec![0.0; 12], 2, 2, TensorLayout::Interleaved).unwrap();

        assert!(!backend.is_loaded());
        assert!(matches!(backend.run(&input), Err(OcrError::BackendFailure(_))));

        // Releasing an unloaded backend is a no-op
        backend.release();
        backend.release();
    }

    #[test]
    fn test_init_missing_model() {
        let mut backend = OnnxBackend::new(BackendConfig::default());
        let contract = ModelContract {
            model_path: PathBuf::from("/nonexistent/rec.onnx"),
            input_width: 320,
            input_height: 48,
            layout: TensorLayout::Planar,
            num_classes: 97,
            time_steps: None,
        };

        assert!(matches!(
            backend.init(&contract),
            Err(InitError::ModelLoad { .. })
        ));
        assert!(!backend.is_loaded());
    }
}
