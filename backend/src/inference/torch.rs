use std::path::Path;
use std::sync::Mutex;

use ndarray::Array4;
use tch::{CModule, Device, Kind, Tensor};

use super::classifier::{Classifier, InferenceError};

impl From<tch::TchError> for InferenceError {
    fn from(err: tch::TchError) -> Self {
        InferenceError::Model(err.to_string())
    }
}

/// TorchScript model exported from the trained BIRADS network.
///
/// libtorch modules are not safe to run concurrently from several threads,
/// so forward passes are serialized behind a mutex.
pub struct TorchClassifier {
    model: Mutex<CModule>,
    device: Device,
    softmax: bool,
}

impl TorchClassifier {
    pub fn load(model_path: &Path, softmax: bool) -> Result<Self, InferenceError> {
        let device = Device::cuda_if_available();
        let mut model = CModule::load_on_device(model_path, device)?;
        model.set_eval();
        log::info!("Loaded TorchScript model {} on {:?}", model_path.display(), device);
        Ok(Self {
            model: Mutex::new(model),
            device,
            softmax,
        })
    }
}

impl Classifier for TorchClassifier {
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        let tensor = to_tensor(input).to_device(self.device);
        let output = {
            let model = self
                .model
                .lock()
                .map_err(|_| InferenceError::Model("model lock poisoned".into()))?;
            tch::no_grad(|| model.forward_ts(&[tensor]))?
        };
        to_probabilities(output, self.softmax)
    }
}

fn to_tensor(input: &Array4<f32>) -> Tensor {
    let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
    let data: Vec<f32> = input.iter().copied().collect();
    Tensor::from_slice(&data).view(shape.as_slice())
}

/// Flattens the model output to one score per class, applying softmax when asked.
fn to_probabilities(output: Tensor, softmax: bool) -> Result<Vec<f32>, InferenceError> {
    let output = if softmax {
        output.softmax(-1, Kind::Float)
    } else {
        output
    };
    let output_vec: Vec<f32> = output
        .to_kind(Kind::Float)
        .to_device(Device::Cpu)
        .view([-1])
        .try_into()?;
    Ok(output_vec)
}
