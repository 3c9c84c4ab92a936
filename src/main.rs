//! `meterwire` binary: wires the serial device, splitter, field table and
//! sink together and runs the dispatch loop until the stream ends.

mod cli;

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use meterwire::{
    DEFAULT_FIELDS,
    DispatchConfig,
    Dispatcher,
    FrameSplitter,
    MeterError,
    SinkConfig,
    TimedReader,
    UdpLineSink,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, category = err.error_type(), "fatal error, terminating");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: cli::Cli) -> Result<(), MeterError> {
    #[cfg(feature = "metrics-exporter")]
    if let Some(addr) = cli.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .map_err(std::io::Error::other)?;
        info!(%addr, "metrics exporter listening");
    }

    let sink = UdpLineSink::connect(&SinkConfig {
        uri: cli.sink_uri,
        database: cli.database,
        measurement: cli.measurement,
        meter: cli.meter,
    })
    .await?;

    let device = tokio::fs::File::open(&cli.device).await?;
    info!(device = %cli.device.display(), "reading meter stream");
    let read_timeout = (cli.read_timeout_secs > 0).then(|| Duration::from_secs(cli.read_timeout_secs));
    let source = TimedReader::new(device, read_timeout);

    let dispatcher = Dispatcher::new(
        sink,
        DEFAULT_FIELDS,
        FrameSplitter::new(cli.max_frame_length),
        DispatchConfig {
            max_in_flight: cli.max_in_flight,
        },
    );
    dispatcher.run(source).await
}
