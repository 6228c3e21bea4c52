//! Zenoh session setup and emotion reading publishing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};
use zenoh::prelude::r#async::*;

use crate::emotion::EmotionDistribution;
use crate::ErrorWrapper;

#[derive(Debug, Clone, Default)]
pub struct ZenohSettings {
    pub connect: Vec<zenoh_config::EndPoint>,
    pub listen: Vec<zenoh_config::EndPoint>,
}

pub async fn open_session(settings: &ZenohSettings) -> anyhow::Result<Arc<zenoh::Session>> {
    let mut zenoh_config = Config::default();
    if !settings.listen.is_empty() {
        zenoh_config.listen.endpoints = settings.listen.clone();
        info!(
            "Configured listening endpoints {:?}",
            zenoh_config.listen.endpoints
        );
    }
    if !settings.connect.is_empty() {
        zenoh_config.connect.endpoints = settings.connect.clone();
        info!(
            "Configured connect endpoints {:?}",
            zenoh_config.connect.endpoints
        );
    }

    let zenoh_session = zenoh::open(zenoh_config)
        .res()
        .await
        .map_err(ErrorWrapper::ZenohError)?;
    Ok(zenoh_session.into_arc())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingSource {
    Camera,
    Chat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionReading {
    pub source: ReadingSource,
    pub timestamp_ms: i64,
    pub labels: Vec<String>,
    pub values: Vec<f32>,
}

impl EmotionReading {
    pub fn new(source: ReadingSource, distribution: &EmotionDistribution) -> Self {
        Self {
            source,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            labels: distribution.labels().to_vec(),
            values: distribution.values().to_vec(),
        }
    }

    pub fn distribution(&self) -> Result<EmotionDistribution, ErrorWrapper> {
        EmotionDistribution::new(self.labels.clone(), self.values.clone())
    }

    pub fn to_json(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(data: &[u8]) -> anyhow::Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

const READING_QUEUE: usize = 16;

/// Forwards readings to a zenoh publisher running on the tokio runtime.
pub struct ReadingPublisher {
    tx: mpsc::Sender<EmotionReading>,
    closed: AtomicBool,
}

impl ReadingPublisher {
    pub fn spawn(runtime: &Handle, settings: ZenohSettings, key: String) -> Self {
        let (tx, rx) = mpsc::channel(READING_QUEUE);
        runtime.spawn(async move {
            if let Err(err) = publish_readings(settings, &key, rx).await {
                error!("Reading publisher on {} stopped: {err:#}", key);
            }
        });
        Self::new(tx)
    }

    fn new(tx: mpsc::Sender<EmotionReading>) -> Self {
        Self {
            tx,
            closed: AtomicBool::new(false),
        }
    }

    /// Never blocks. Returns false when the reading was dropped, either
    /// because the queue is full or the publisher task is gone.
    pub fn publish(&self, reading: EmotionReading) -> bool {
        match self.tx.try_send(reading) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Reading queue full, dropping reading");
                false
            }
            Err(TrySendError::Closed(_)) => {
                if !self.closed.swap(true, Ordering::Relaxed) {
                    warn!("Reading publisher is not running, readings will be dropped");
                }
                false
            }
        }
    }
}

async fn publish_readings(
    settings: ZenohSettings,
    key: &str,
    mut rx: mpsc::Receiver<EmotionReading>,
) -> anyhow::Result<()> {
    let zenoh_session = open_session(&settings).await?;

    let publisher = zenoh_session
        .declare_publisher(key)
        .congestion_control(CongestionControl::Drop)
        .res()
        .await
        .map_err(ErrorWrapper::ZenohError)?;
    info!("Publishing emotion readings on {}", key);

    while let Some(reading) = rx.recv().await {
        publisher
            .put(reading.to_json()?)
            .res()
            .await
            .map_err(ErrorWrapper::ZenohError)?;
    }
    Ok(())
}
