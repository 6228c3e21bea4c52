use std::path::PathBuf;

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

pub mod camera;
pub mod chart;
pub mod chat;
pub mod config;
pub mod emotion;
pub mod model;
pub mod telemetry;
pub mod ui;
pub mod vision;

pub use camera::{CameraSource, CameraWorker, FramePipeline, FrameSource};
pub use chat::ChatSession;
pub use config::AppConfig;
pub use emotion::EmotionDistribution;
pub use model::{EmotionModel, Prediction, PredictionStatus};
pub use vision::{jpeg_to_mat, mat_to_jpeg};

#[derive(Error, Debug)]
pub enum ErrorWrapper {
    #[error("Zenoh error {0:?}")]
    ZenohError(#[from] zenoh::Error),
    #[error("Model file not found at {0:?}")]
    ModelNotFound(PathBuf),
    #[error("Model returned {actual} scores, expected {expected}")]
    UnexpectedModelOutput { expected: usize, actual: usize },
    #[error("Unable to open camera {0:?}")]
    CameraUnavailable(String),
    #[error("Got {values} values for {labels} labels")]
    LabelMismatch { labels: usize, values: usize },
    #[error("Emotion distribution has no labels")]
    EmptyDistribution,
    #[error("Emotion values {0:?} are not probabilities")]
    InvalidDistribution(Vec<f32>),
    #[error("Model returned non-finite score {0}")]
    NonFiniteScore(f32),
    #[error("Unable to sample emotions: {0}")]
    SamplingFailed(String),
    #[error("Camera worker panicked")]
    CameraWorkerPanicked,
}

pub fn setup_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .init();
}
