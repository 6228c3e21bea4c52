use std::path::PathBuf;

use clap::Parser;
use mindcare::chat::build_analyzer;
use mindcare::config::CameraKind;
use mindcare::telemetry::ZenohSettings;
use mindcare::ui::{confirm_simulation_mode, MindCareApp};
use mindcare::vision::{FaceDetector, FrameOverlay, Logo};
use mindcare::{setup_tracing, AppConfig, ChatSession, EmotionModel, FramePipeline};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// Configuration file, defaults to mindcare.toml when present.
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Emotion model file.
    #[clap(long)]
    model: Option<PathBuf>,

    /// Camera device index or stream URI.
    #[clap(long)]
    camera: Option<String>,

    /// Use frames published by camera_driver instead of a local camera.
    #[clap(long)]
    remote_camera: bool,

    /// Classify only the largest detected face.
    #[clap(long)]
    detect_face: bool,

    /// Run without a model and skip the confirmation prompt.
    #[clap(long)]
    simulate: bool,

    /// Publish emotion readings over zenoh.
    #[clap(long)]
    publish: bool,

    /// Debug logging.
    #[clap(short, long)]
    verbose: bool,

    /// Endpoints to connect to.
    #[clap(short = 'e', long)]
    connect: Vec<zenoh_config::EndPoint>,

    /// Endpoints to listen on.
    #[clap(long)]
    listen: Vec<zenoh_config::EndPoint>,
}

fn main() -> anyhow::Result<()> {
    let args: Args = Args::parse();
    setup_tracing(args.verbose);

    let mut config = AppConfig::resolve(args.config.as_deref())?;
    if let Some(model) = args.model {
        config.model.path = model;
    }
    if let Some(camera) = args.camera {
        config.camera.device = camera;
    }
    if args.remote_camera {
        config.camera.source = CameraKind::Remote;
    }
    config.camera.detect_face |= args.detect_face;
    config.zenoh.publish_readings |= args.publish;

    info!("Looking for model at {:?}", config.model.path);
    let model = if args.simulate {
        info!("Simulation mode requested");
        EmotionModel::simulated(config.model.labels.clone())
    } else {
        match EmotionModel::load(&config.model) {
            Ok(model) => model,
            Err(err) => {
                warn!("Error loading model: {err:#}");
                if !confirm_simulation_mode(&config.model.path)? {
                    info!("Model unavailable, exiting");
                    return Ok(());
                }
                EmotionModel::simulated(config.model.labels.clone())
            }
        }
    };

    let face_detector = if config.camera.detect_face {
        Some(FaceDetector::new(&config.camera.cascade)?)
    } else {
        None
    };
    let logo = match &config.ui.logo_path {
        Some(path) => match Logo::load(path, config.ui.logo_height) {
            Ok(logo) => Some(logo),
            Err(err) => {
                warn!("Ignoring logo: {err:#}");
                None
            }
        },
        None => None,
    };
    let pipeline = FramePipeline::new(model, face_detector, FrameOverlay::new(logo));

    let analyzer = build_analyzer(config.chat.analyzer, config.chat.lexicon_path.as_deref());
    let chat = ChatSession::new(analyzer, config.chat.max_messages);

    let runtime = tokio::runtime::Runtime::new()?;
    let zenoh = ZenohSettings {
        connect: args.connect,
        listen: args.listen,
    };

    let mut app = MindCareApp::new(config, chat, pipeline, runtime.handle().clone(), zenoh)?;
    app.run()
}
