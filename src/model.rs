use anyhow::Context;
use opencv::core::{self, Scalar};
use opencv::dnn;
use opencv::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::config::{InputLayout, ModelConfig};
use crate::emotion::EmotionDistribution;
use crate::vision::prepare_model_input;
use crate::ErrorWrapper;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionStatus {
    Detected,
    Simulated,
    ModelError,
}

impl PredictionStatus {
    pub fn overlay_text(&self) -> &'static str {
        match self {
            PredictionStatus::Detected => "Emotion detected",
            PredictionStatus::Simulated => "Simulation mode",
            PredictionStatus::ModelError => "Model error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Prediction {
    pub status: PredictionStatus,
    /// Missing when the model failed on this frame.
    pub distribution: Option<EmotionDistribution>,
}

impl Prediction {
    fn failed() -> Self {
        Self {
            status: PredictionStatus::ModelError,
            distribution: None,
        }
    }
}

pub fn input_shape(layout: InputLayout, size: i32) -> [i32; 4] {
    match layout {
        InputLayout::Nhwc => [1, size, size, 1],
        InputLayout::Nchw => [1, 1, size, size],
    }
}

/// Pretrained classifier read through OpenCV's dnn module.
pub struct EmotionNetwork {
    net: dnn::Net,
    labels: Vec<String>,
    input_size: i32,
    layout: InputLayout,
}

impl EmotionNetwork {
    pub fn load(config: &ModelConfig) -> anyhow::Result<Self> {
        if !config.path.exists() {
            return Err(ErrorWrapper::ModelNotFound(config.path.clone()).into());
        }
        let path = config
            .path
            .to_str()
            .with_context(|| format!("Model path is not valid UTF-8: {:?}", config.path))?;
        let net = dnn::read_net(path, "", "")?;
        if net.empty()? {
            anyhow::bail!("Model {:?} contains no layers", config.path);
        }
        info!("Loaded emotion model from {:?}", config.path);
        Ok(Self {
            net,
            labels: config.labels.clone(),
            input_size: config.input_size,
            layout: config.layout,
        })
    }

    pub fn infer(&mut self, gray: &Mat) -> anyhow::Result<EmotionDistribution> {
        let pixels = prepare_model_input(gray, self.input_size)?;
        let shape = input_shape(self.layout, self.input_size);
        let mut blob = Mat::new_nd_with_default(&shape, core::CV_32F, Scalar::all(0.0))?;
        blob.data_typed_mut::<f32>()?.copy_from_slice(&pixels);

        self.net.set_input(&blob, "", 1.0, Scalar::default())?;
        let output = self.net.forward_single("")?;
        let scores = output.data_typed::<f32>()?.to_vec();
        if scores.len() != self.labels.len() {
            return Err(ErrorWrapper::UnexpectedModelOutput {
                expected: self.labels.len(),
                actual: scores.len(),
            }
            .into());
        }
        Ok(EmotionDistribution::from_scores(self.labels.clone(), scores)?)
    }
}

pub enum EmotionModel {
    Network(EmotionNetwork),
    /// No model available, predictions are random.
    Simulated { labels: Vec<String>, rng: StdRng },
}

impl EmotionModel {
    pub fn load(config: &ModelConfig) -> anyhow::Result<Self> {
        Ok(Self::Network(EmotionNetwork::load(config)?))
    }

    pub fn simulated(labels: Vec<String>) -> Self {
        Self::Simulated {
            labels,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, Self::Simulated { .. })
    }

    /// Classify a grayscale face or frame. Failures are reported through
    /// the prediction status, the camera loop keeps running.
    pub fn predict(&mut self, gray: &Mat) -> Prediction {
        match self {
            Self::Network(network) => match network.infer(gray) {
                Ok(distribution) => Prediction {
                    status: PredictionStatus::Detected,
                    distribution: Some(distribution),
                },
                Err(err) => {
                    warn!("Prediction failed: {err:#}");
                    Prediction::failed()
                }
            },
            Self::Simulated { labels, rng } => {
                match EmotionDistribution::dirichlet(labels.clone(), rng) {
                    Ok(distribution) => Prediction {
                        status: PredictionStatus::Simulated,
                        distribution: Some(distribution),
                    },
                    Err(err) => {
                        warn!("Simulated prediction failed: {err}");
                        Prediction::failed()
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::camera_labels;
    use std::path::PathBuf;

    #[test]
    fn shapes_follow_layout() {
        assert_eq!(input_shape(InputLayout::Nhwc, 48), [1, 48, 48, 1]);
        assert_eq!(input_shape(InputLayout::Nchw, 48), [1, 1, 48, 48]);
    }

    #[test]
    fn missing_model_is_reported() {
        let config = ModelConfig {
            path: PathBuf::from("no/such/model.onnx"),
            ..Default::default()
        };
        let err = EmotionModel::load(&config).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<ErrorWrapper>(),
            Some(ErrorWrapper::ModelNotFound(_))
        ));
    }

    #[test]
    fn simulated_model_predicts_over_camera_labels() {
        let mut model = EmotionModel::simulated(camera_labels());
        assert!(model.is_simulated());
        let gray = Mat::new_rows_cols_with_default(48, 48, core::CV_8UC1, Scalar::all(0.0))
            .unwrap();
        let prediction = model.predict(&gray);
        assert_eq!(prediction.status, PredictionStatus::Simulated);
        let distribution = prediction.distribution.unwrap();
        assert_eq!(distribution.len(), 7);
        let sum: f32 = distribution.values().iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
    }

    #[test]
    fn overlay_texts() {
        assert_eq!(PredictionStatus::Detected.overlay_text(), "Emotion detected");
        assert_eq!(PredictionStatus::Simulated.overlay_text(), "Simulation mode");
        assert_eq!(PredictionStatus::ModelError.overlay_text(), "Model error");
    }
}
