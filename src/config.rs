//! File based configuration.
//!
//! Every field has a default so an empty or missing `mindcare.toml` is valid.
//! Binaries layer their command line flags on top of the loaded file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::emotion::camera_labels;

pub const DEFAULT_CONFIG_PATH: &str = "mindcare.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub camera: CameraConfig,
    pub ui: UiConfig,
    pub chat: ChatConfig,
    pub zenoh: ZenohConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    /// `[1, size, size, 1]`
    Nhwc,
    /// `[1, 1, size, size]`
    Nchw,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub input_size: i32,
    pub layout: InputLayout,
    pub labels: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("modelo/modelo_emociones.onnx"),
            input_size: 48,
            layout: InputLayout::Nhwc,
            labels: camera_labels(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraKind {
    Local,
    Remote,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub source: CameraKind,
    /// Device index, `/dev/videoN` or a stream URI.
    pub device: String,
    pub width: i32,
    pub height: i32,
    pub poll_interval_ms: u64,
    pub max_missed_frames: u32,
    pub detect_face: bool,
    pub cascade: String,
    pub remote_key: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: CameraKind::Local,
            device: "0".to_string(),
            width: 640,
            height: 480,
            poll_interval_ms: 10,
            max_missed_frames: 50,
            detect_face: false,
            cascade: "haarcascades/haarcascade_frontalface_alt.xml".to_string(),
            remote_key: "mindcare/camera/image".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub window_width: i32,
    pub window_height: i32,
    pub logo_path: Option<PathBuf>,
    pub logo_height: i32,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            window_width: 1200,
            window_height: 800,
            logo_path: None,
            logo_height: 48,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerKind {
    Random,
    Lexicon,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub analyzer: AnalyzerKind,
    pub lexicon_path: Option<PathBuf>,
    pub max_messages: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            analyzer: AnalyzerKind::Random,
            lexicon_path: None,
            max_messages: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ZenohConfig {
    pub publish_readings: bool,
    pub readings_key: String,
}

impl Default for ZenohConfig {
    fn default() -> Self {
        Self {
            publish_readings: false,
            readings_key: "mindcare/emotions".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load an explicit path, or the default path if it exists, or defaults.
    pub fn resolve(explicit: Option<&Path>) -> anyhow::Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.model.input_size, 48);
        assert_eq!(config.model.layout, InputLayout::Nhwc);
        assert_eq!(config.model.labels.len(), 7);
        assert_eq!(config.camera.device, "0");
        assert_eq!(config.camera.poll_interval_ms, 10);
        assert_eq!(config.ui.window_width, 1200);
        assert_eq!(config.chat.analyzer, AnalyzerKind::Random);
        assert!(!config.zenoh.publish_readings);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [model]
            path = "models/fer.onnx"
            layout = "nchw"

            [camera]
            source = "remote"
            detect_face = true

            [chat]
            analyzer = "lexicon"
            "#,
        )
        .unwrap();
        assert_eq!(config.model.path, PathBuf::from("models/fer.onnx"));
        assert_eq!(config.model.layout, InputLayout::Nchw);
        assert_eq!(config.model.input_size, 48);
        assert_eq!(config.camera.source, CameraKind::Remote);
        assert!(config.camera.detect_face);
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.chat.analyzer, AnalyzerKind::Lexicon);
    }

    #[test]
    fn unknown_layout_is_an_error() {
        assert!(AppConfig::from_toml("[model]\nlayout = \"hwcn\"").is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(AppConfig::resolve(Some(Path::new("does/not/exist.toml"))).is_err());
    }
}
