use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use mindcare::emotion::format_percent;
use mindcare::vision::{FaceDetector, FrameOverlay};
use mindcare::{setup_tracing, AppConfig, EmotionModel, FramePipeline};
use opencv::prelude::*;
use opencv::{highgui, imgcodecs};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// Image to classify.
    image: PathBuf,

    /// Configuration file, defaults to mindcare.toml when present.
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Emotion model file.
    #[clap(long)]
    model: Option<PathBuf>,

    /// Classify only the largest detected face.
    #[clap(long)]
    detect_face: bool,

    /// Only log the result.
    #[clap(long)]
    no_window: bool,

    /// Debug logging.
    #[clap(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args: Args = Args::parse();
    setup_tracing(args.verbose);

    let mut config = AppConfig::resolve(args.config.as_deref())?;
    if let Some(model) = args.model {
        config.model.path = model;
    }

    let model = EmotionModel::load(&config.model)?;
    let face_detector = if args.detect_face || config.camera.detect_face {
        Some(FaceDetector::new(&config.camera.cascade)?)
    } else {
        None
    };
    let mut pipeline = FramePipeline::new(model, face_detector, FrameOverlay::default());

    let path = args
        .image
        .to_str()
        .with_context(|| format!("Image path is not valid UTF-8: {:?}", args.image))?;
    let frame = imgcodecs::imread(path, imgcodecs::IMREAD_COLOR)?;
    if frame.empty() {
        anyhow::bail!("Failed to read image {:?}", args.image);
    }

    let update = pipeline.process(frame)?;
    match &update.prediction.distribution {
        Some(distribution) => {
            for (label, value) in distribution.iter() {
                info!("{:>10} {}", label, format_percent(value));
            }
        }
        None => warn!("{}", update.prediction.status.overlay_text()),
    }

    if !args.no_window {
        let window = "classify";
        highgui::named_window_def(window)?;
        highgui::imshow(window, &update.frame)?;
        highgui::wait_key(0)?;
    }

    Ok(())
}
