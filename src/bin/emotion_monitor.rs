use std::path::PathBuf;

use clap::Parser;
use mindcare::emotion::format_percent;
use mindcare::telemetry::{open_session, EmotionReading, ZenohSettings};
use mindcare::{setup_tracing, AppConfig, ErrorWrapper};
use tracing::{info, warn};
use zenoh::prelude::r#async::*;

#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// Configuration file, defaults to mindcare.toml when present.
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Key expression readings are published on.
    #[clap(long)]
    key: Option<String>,

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
    let key = args.key.unwrap_or(config.zenoh.readings_key);

    let zenoh_session = open_session(&ZenohSettings {
        connect: args.connect,
        listen: args.listen,
    })
    .await?;

    let subscriber = zenoh_session
        .declare_subscriber(key.as_str())
        .res()
        .await
        .map_err(ErrorWrapper::ZenohError)?;
    info!("Listening for readings on {}", key);

    loop {
        let msg = subscriber.recv_async().await?;
        let payload: Vec<u8> = msg.value.try_into()?;

        let reading = match EmotionReading::from_json(&payload) {
            Ok(reading) => reading,
            Err(err) => {
                warn!("Ignoring malformed reading: {err:#}");
                continue;
            }
        };
        match reading.distribution() {
            Ok(distribution) => {
                if let Some((label, value)) = distribution.top() {
                    info!(
                        "{:?} at {}: {} {}",
                        reading.source,
                        reading.timestamp_ms,
                        label,
                        format_percent(value)
                    );
                }
            }
            Err(err) => warn!("Ignoring inconsistent reading: {err}"),
        }
    }
}
