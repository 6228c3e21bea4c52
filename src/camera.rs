//! Frame sources and the background camera loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use opencv::prelude::*;
use opencv::videoio;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use zenoh::prelude::r#async::*;

use crate::config::CameraConfig;
use crate::model::{EmotionModel, Prediction};
use crate::telemetry::{open_session, ZenohSettings};
use crate::vision::{convert_to_grayscale, crop, jpeg_to_mat, FaceDetector, FrameOverlay};
use crate::ErrorWrapper;

const REMOTE_FRAME_TIMEOUT: Duration = Duration::from_millis(500);

pub trait FrameSource: Send {
    /// `Ok(None)` means no frame was available this time.
    fn next_frame(&mut self) -> anyhow::Result<Option<Mat>>;
}

pub struct CameraSource {
    capture: videoio::VideoCapture,
}

impl CameraSource {
    pub fn open(device: &str, width: i32, height: i32) -> anyhow::Result<Self> {
        let mut capture = match parse_device_index(device) {
            Some(index) => videoio::VideoCapture::new(index, videoio::CAP_ANY)?,
            None => videoio::VideoCapture::from_file(device, videoio::CAP_ANY)?,
        };
        let opened = videoio::VideoCapture::is_opened(&capture)?;
        if !opened {
            return Err(ErrorWrapper::CameraUnavailable(device.to_string()).into());
        }
        for (property, name, value) in [
            (videoio::CAP_PROP_FRAME_WIDTH, "width", width),
            (videoio::CAP_PROP_FRAME_HEIGHT, "height", height),
        ] {
            match capture.set(property, value as f64) {
                Ok(true) => {}
                Ok(false) => warn!("Camera {} did not accept frame {} {}", device, name, value),
                Err(err) => warn!("Failed to set frame {} on camera {}: {err}", name, device),
            }
        }
        info!("Opened camera {}", device);
        Ok(Self { capture })
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> anyhow::Result<Option<Mat>> {
        let mut frame = Mat::default();
        self.capture.read(&mut frame)?;
        if frame.size()?.width == 0 {
            return Ok(None);
        }
        Ok(Some(frame))
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Err(err) = self.capture.release() {
            warn!("Failed to release camera: {err}");
        }
    }
}

/// Accepts `"0"` or `/dev/video0` style device names.
pub fn parse_device_index(device: &str) -> Option<i32> {
    if let Ok(index) = device.parse::<i32>() {
        return Some(index);
    }
    device
        .strip_prefix("/dev/video")
        .filter(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
        .and_then(|digits| digits.parse::<i32>().ok())
}

/// JPEG frames published by `camera_driver`.
pub struct RemoteCameraSource {
    frames: Receiver<Vec<u8>>,
    timeout: Duration,
    subscription: Option<JoinHandle<()>>,
}

impl RemoteCameraSource {
    pub fn subscribe(runtime: &Handle, settings: ZenohSettings, key: String) -> Self {
        let (tx, rx) = bounded(2);
        let subscription = runtime.spawn(async move {
            if let Err(err) = forward_remote_frames(settings, &key, tx).await {
                error!("Remote camera subscription on {} failed: {err:#}", key);
            }
        });
        let mut source = Self::from_receiver(rx, REMOTE_FRAME_TIMEOUT);
        source.subscription = Some(subscription);
        source
    }

    /// Reads JPEG payloads pushed by some other producer.
    pub fn from_receiver(frames: Receiver<Vec<u8>>, timeout: Duration) -> Self {
        Self {
            frames,
            timeout,
            subscription: None,
        }
    }
}

impl Drop for RemoteCameraSource {
    fn drop(&mut self) {
        // the subscriber can sit in recv_async forever when nothing publishes
        if let Some(subscription) = self.subscription.take() {
            subscription.abort();
        }
    }
}

impl FrameSource for RemoteCameraSource {
    fn next_frame(&mut self) -> anyhow::Result<Option<Mat>> {
        match self.frames.recv_timeout(self.timeout) {
            Ok(payload) => Ok(Some(jpeg_to_mat(&payload)?)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                anyhow::bail!("Remote camera subscription closed")
            }
        }
    }
}

async fn forward_remote_frames(
    settings: ZenohSettings,
    key: &str,
    tx: Sender<Vec<u8>>,
) -> anyhow::Result<()> {
    let zenoh_session = open_session(&settings).await?;

    let subscriber = zenoh_session
        .declare_subscriber(key)
        .best_effort()
        .res()
        .await
        .map_err(ErrorWrapper::ZenohError)?;

    loop {
        let msg = subscriber.recv_async().await?;
        let payload: Vec<u8> = msg.value.try_into()?;

        match tx.try_send(payload) {
            // stale frames are dropped
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => break,
        }
    }
    Ok(())
}

pub struct CameraUpdate {
    /// Annotated BGR frame ready to show.
    pub frame: Mat,
    pub prediction: Prediction,
}

/// Per-frame processing: locate face, classify, annotate.
pub struct FramePipeline {
    model: EmotionModel,
    face_detector: Option<FaceDetector>,
    overlay: FrameOverlay,
}

impl FramePipeline {
    pub fn new(
        model: EmotionModel,
        face_detector: Option<FaceDetector>,
        overlay: FrameOverlay,
    ) -> Self {
        Self {
            model,
            face_detector,
            overlay,
        }
    }

    pub fn model(&self) -> &EmotionModel {
        &self.model
    }

    pub fn process(&mut self, mut frame: Mat) -> anyhow::Result<CameraUpdate> {
        let gray = convert_to_grayscale(&frame)?;
        let face = match &mut self.face_detector {
            Some(detector) => detector.locate(&gray)?,
            None => None,
        };
        let subject = match face {
            Some(area) => crop(&gray, area)?,
            None => gray,
        };

        let prediction = self.model.predict(&subject);
        let top = prediction
            .distribution
            .as_ref()
            .and_then(|distribution| distribution.top());
        self.overlay
            .draw(&mut frame, prediction.status.overlay_text(), top, face)?;

        Ok(CameraUpdate { frame, prediction })
    }
}

pub enum CameraEvent {
    Frame(CameraUpdate),
    Failed(String),
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub poll_interval: Duration,
    pub max_missed_frames: u32,
}

impl From<&CameraConfig> for WorkerSettings {
    fn from(config: &CameraConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_missed_frames: config.max_missed_frames.max(1),
        }
    }
}

/// Camera loop running on its own thread. The UI thread polls it for
/// annotated frames and takes the pipeline back when stopping.
pub struct CameraWorker {
    running: Arc<AtomicBool>,
    handle: thread::JoinHandle<FramePipeline>,
    events: Receiver<CameraEvent>,
}

impl CameraWorker {
    pub fn spawn(
        source: Box<dyn FrameSource>,
        mut pipeline: FramePipeline,
        settings: WorkerSettings,
    ) -> Self {
        let (tx, rx) = bounded(2);
        let running = Arc::new(AtomicBool::new(true));
        let loop_running = running.clone();

        let handle = thread::spawn(move || {
            let mut source = source;
            capture_loop(source.as_mut(), &mut pipeline, settings, &loop_running, &tx);
            // dropping the source releases the device
            drop(source);
            pipeline
        });

        Self {
            running,
            handle,
            events: rx,
        }
    }

    /// Most recent event. A failure is returned ahead of any frame.
    pub fn poll(&self) -> Option<CameraEvent> {
        let mut latest = None;
        for event in self.events.try_iter() {
            match event {
                CameraEvent::Failed(_) => return Some(event),
                frame => latest = Some(frame),
            }
        }
        latest
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<CameraEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    pub fn stop(self) -> Result<FramePipeline, ErrorWrapper> {
        let CameraWorker {
            running,
            handle,
            events,
        } = self;
        running.store(false, Ordering::Relaxed);
        // unblocks a worker waiting on a full channel
        drop(events);
        handle.join().map_err(|_| ErrorWrapper::CameraWorkerPanicked)
    }
}

fn capture_loop(
    source: &mut dyn FrameSource,
    pipeline: &mut FramePipeline,
    settings: WorkerSettings,
    running: &AtomicBool,
    tx: &Sender<CameraEvent>,
) {
    let mut missed_frames = 0;
    while running.load(Ordering::Relaxed) {
        match source.next_frame() {
            Ok(Some(frame)) => {
                missed_frames = 0;
                match pipeline.process(frame) {
                    Ok(update) => {
                        if tx.send(CameraEvent::Frame(update)).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        error!("Error in camera feed: {err:#}");
                        let _ = tx.send(CameraEvent::Failed(format!("Camera feed error: {err}")));
                        break;
                    }
                }
            }
            Ok(None) => {
                missed_frames += 1;
                if missed_frames >= settings.max_missed_frames {
                    warn!("Error capturing frame");
                    let _ = tx.send(CameraEvent::Failed("Error capturing frame".to_string()));
                    break;
                }
            }
            Err(err) => {
                error!("Camera read failed: {err:#}");
                let _ = tx.send(CameraEvent::Failed(format!("Camera read failed: {err}")));
                break;
            }
        }
        thread::sleep(settings.poll_interval);
    }
    debug!("Camera loop finished");
}
