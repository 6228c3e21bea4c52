use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mindcare::telemetry::{open_session, ZenohSettings};
use mindcare::{mat_to_jpeg, setup_tracing, AppConfig, CameraSource, ErrorWrapper, FrameSource};
use opencv::highgui;
use tracing::info;
use zenoh::prelude::r#async::*;

#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// Configuration file, defaults to mindcare.toml when present.
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Camera device index or stream URI.
    #[clap(long)]
    camera: Option<String>,

    /// Key expression frames are published on.
    #[clap(long)]
    key: Option<String>,

    /// Show the captured frames.
    #[clap(long)]
    preview: bool,

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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = Args::parse();
    setup_tracing(args.verbose);

    let config = AppConfig::resolve(args.config.as_deref())?;
    let device = args.camera.unwrap_or(config.camera.device);
    let key = args.key.unwrap_or(config.camera.remote_key);

    let zenoh_session = open_session(&ZenohSettings {
        connect: args.connect,
        listen: args.listen,
    })
    .await?;

    let publisher = zenoh_session
        .declare_publisher(key.as_str())
        .congestion_control(CongestionControl::Drop)
        .priority(Priority::InteractiveHigh)
        .res()
        .await
        .map_err(ErrorWrapper::ZenohError)?;

    let window = "camera driver";
    if args.preview {
        highgui::named_window_def(window)?;
    }

    let mut camera = CameraSource::open(&device, config.camera.width, config.camera.height)?;
    info!("Publishing frames from {} on {}", device, key);

    loop {
        let Some(frame) = camera.next_frame()? else {
            tokio::time::sleep(Duration::from_millis(50)).await;
            continue;
        };

        let data = mat_to_jpeg(&frame)?;

        publisher
            .put(data)
            .res()
            .await
            .map_err(ErrorWrapper::ZenohError)?;

        if args.preview {
            highgui::imshow(window, &frame)?;
            _ = highgui::poll_key()?;
        }
    }
}
