use rand::Rng;
use rand_distr::{Dirichlet, Distribution};

use crate::ErrorWrapper;

/// Labels used by the chat analyzers.
pub const CHAT_LABELS: [&str; 4] = ["Happy", "Sad", "Angry", "Neutral"];

/// Output order of FER-2013 style classifiers.
pub const CAMERA_LABELS: [&str; 7] = [
    "Angry", "Disgust", "Fear", "Happy", "Sad", "Surprise", "Neutral",
];

pub fn chat_labels() -> Vec<String> {
    CHAT_LABELS.iter().map(|label| label.to_string()).collect()
}

pub fn camera_labels() -> Vec<String> {
    CAMERA_LABELS.iter().map(|label| label.to_string()).collect()
}

/// Probabilities over a set of named emotions.
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionDistribution {
    labels: Vec<String>,
    values: Vec<f32>,
}

impl EmotionDistribution {
    pub fn new(labels: Vec<String>, values: Vec<f32>) -> Result<Self, ErrorWrapper> {
        if labels.is_empty() {
            return Err(ErrorWrapper::EmptyDistribution);
        }
        if labels.len() != values.len() {
            return Err(ErrorWrapper::LabelMismatch {
                labels: labels.len(),
                values: values.len(),
            });
        }
        if !is_probability_vector(&values) || values.iter().any(|v| *v > 1.0) {
            return Err(ErrorWrapper::InvalidDistribution(values));
        }
        Ok(Self { labels, values })
    }

    pub fn uniform(labels: Vec<String>) -> Result<Self, ErrorWrapper> {
        let share = 1.0 / labels.len().max(1) as f32;
        let values = vec![share; labels.len()];
        Self::new(labels, values)
    }

    /// Sample from a flat Dirichlet over `labels`.
    pub fn dirichlet<R: Rng + ?Sized>(labels: Vec<String>, rng: &mut R) -> Result<Self, ErrorWrapper> {
        Self::dirichlet_with_concentration(labels, 1.0, rng)
    }

    /// Symmetric Dirichlet. Small `concentration` favours one dominant
    /// emotion, large values stay close to uniform.
    pub fn dirichlet_with_concentration<R: Rng + ?Sized>(
        labels: Vec<String>,
        concentration: f32,
        rng: &mut R,
    ) -> Result<Self, ErrorWrapper> {
        // Dirichlet needs at least two categories
        if labels.len() < 2 {
            return Self::uniform(labels);
        }
        let alpha = vec![concentration; labels.len()];
        let dirichlet = Dirichlet::new(&alpha)
            .map_err(|err| ErrorWrapper::SamplingFailed(err.to_string()))?;
        let values = dirichlet.sample(rng);
        Self::new(labels, values)
    }

    /// Accepts either probabilities or raw logits.
    pub fn from_scores(labels: Vec<String>, scores: Vec<f32>) -> Result<Self, ErrorWrapper> {
        if let Some(score) = scores.iter().find(|score| !score.is_finite()) {
            return Err(ErrorWrapper::NonFiniteScore(*score));
        }
        let values = if is_probability_vector(&scores) {
            scores
        } else {
            softmax(&scores)
        };
        Self::new(labels, values)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// Most likely emotion.
    pub fn top(&self) -> Option<(&str, f32)> {
        self.iter()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
    }
}

pub fn is_probability_vector(values: &[f32]) -> bool {
    if values.is_empty() || values.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return false;
    }
    let sum: f32 = values.iter().sum();
    (sum - 1.0).abs() < 1e-3
}

pub fn softmax(values: &[f32]) -> Vec<f32> {
    let max_val = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp_vals: Vec<f32> = values.iter().map(|v| (v - max_val).exp()).collect();
    let sum: f32 = exp_vals.iter().sum();
    exp_vals.iter().map(|v| v / sum).collect()
}

/// Format a probability as a whole percentage, `0.256` -> `26%`.
pub fn format_percent(value: f32) -> String {
    format!("{:.0}%", value * 100.0)
}
