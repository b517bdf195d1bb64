//! ONNX Runtime backend for exported classifiers

use super::Classifier;
use crate::error::InferenceError;
use ort::memory::Allocator;
use ort::session::Session;
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, Tensor};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Classifier backed by an ONNX Runtime session.
///
/// `Session::run` needs exclusive access, so concurrent predictions are
/// serialized on the session lock.
pub struct OnnxClassifier {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxClassifier {
    pub fn new(session: Session) -> Self {
        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob") || o.name.contains("output"))
            .map(|o| o.name.clone())
            .unwrap_or_else(|| {
                session
                    .outputs
                    .last()
                    .map(|o| o.name.clone())
                    .unwrap_or_else(|| "probabilities".to_string())
            });

        Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        }
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    fn extract_probability(
        &self,
        outputs: &ort::session::SessionOutputs,
    ) -> Result<f64, InferenceError> {
        if let Some(output) = outputs.get(&self.output_name) {
            if let Some(prob) = probability_from_value(&output) {
                return Ok(prob);
            }
        }

        // Fallback: first non-label output that yields a probability
        for (name, output) in outputs.iter() {
            if name.contains("label") {
                continue;
            }
            if let Some(prob) = probability_from_value(&output) {
                debug!(output = %name, prob = prob, "Extracted probability from fallback output");
                return Ok(prob);
            }
        }

        warn!(output = %self.output_name, "No probability output found");
        Err(InferenceError::Backend(
            "model produced no probability output".to_string(),
        ))
    }
}

impl Classifier for OnnxClassifier {
    fn predict_proba(&self, features: &[f32]) -> Result<f64, InferenceError> {
        // shape [1, num_features]
        let shape = vec![1_i64, features.len() as i64];
        let input_tensor = Tensor::from_array((shape, features.to_vec()))
            .map_err(|e| InferenceError::Backend(format!("failed to create input tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| InferenceError::Backend(format!("session lock poisoned: {}", e)))?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input_tensor])
            .map_err(|e| InferenceError::Backend(e.to_string()))?;

        self.extract_probability(&outputs)
    }

    fn backend(&self) -> &'static str {
        "onnx"
    }
}

/// Tensor outputs (`[batch, classes]` or `[classes]`) and `seq(map(int64, float))`
/// outputs are both produced by common exporters.
fn probability_from_value(output: &ort::value::DynValue) -> Option<f64> {
    if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
        let dims: Vec<i64> = shape.iter().copied().collect();
        return positive_class_from_tensor(&dims, data);
    }

    let dtype = output.dtype();
    if DynSequenceValueType::can_downcast(&dtype) {
        return positive_class_from_sequence_map(output).ok();
    }

    None
}

fn positive_class_from_tensor(dims: &[i64], data: &[f32]) -> Option<f64> {
    let classes = match dims {
        [_, classes] => *classes,
        [classes] => *classes,
        _ => return data.last().map(|&v| v as f64),
    };

    match classes {
        c if c >= 2 => data.get(1).map(|&v| v as f64),
        1 => data.first().map(|&v| v as f64),
        _ => None,
    }
}

fn positive_class_from_sequence_map(output: &ort::value::DynValue) -> Result<f64, InferenceError> {
    let allocator = Allocator::default();

    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| InferenceError::Backend(format!("not a sequence: {}", e)))?;

    let maps = sequence
        .try_extract_sequence::<DynMapValueType>(&allocator)
        .map_err(|e| InferenceError::Backend(e.to_string()))?;

    let map_value = maps
        .first()
        .ok_or_else(|| InferenceError::Backend("empty output sequence".to_string()))?;

    let kv_pairs = map_value
        .try_extract_key_values::<i64, f32>()
        .map_err(|e| InferenceError::Backend(e.to_string()))?;

    if let Some((_, prob)) = kv_pairs.iter().find(|(class, _)| *class == 1) {
        return Ok(*prob as f64);
    }
    if let Some((_, prob)) = kv_pairs.iter().find(|(class, _)| *class == 0) {
        return Ok(1.0 - *prob as f64);
    }

    Err(InferenceError::Backend("no class probability in output map".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_class_from_tensor_shapes() {
        assert_eq!(positive_class_from_tensor(&[1, 2], &[0.25, 0.75]), Some(0.75));
        assert_eq!(positive_class_from_tensor(&[2], &[0.4, 0.6]), Some(0.6000000238418579));
        assert_eq!(positive_class_from_tensor(&[1, 1], &[0.5]), Some(0.5));
        assert_eq!(positive_class_from_tensor(&[1, 0], &[]), None);
    }
}
