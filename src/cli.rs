//! Command line interface for the `meterwire` binary.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Command line arguments for the `meterwire` binary.
#[derive(Debug, Parser)]
#[command(
    name = "meterwire",
    version,
    about = "Read power-meter telemetry from a serial device and forward it to a measurement sink"
)]
pub struct Cli {
    /// Serial device to read from.
    #[arg(short, long, env = "METERWIRE_DEVICE", default_value = "/dev/ttyUSB0")]
    pub device: PathBuf,

    /// Sink endpoint receiving line protocol.
    #[arg(long, env = "METERWIRE_SINK_URI", default_value = "udp://influxdb:8089")]
    pub sink_uri: String,

    /// Database the sink endpoint writes into.
    #[arg(long, env = "METERWIRE_SINK_DB", default_value = "home")]
    pub database: String,

    /// Measurement name written per forwarded frame.
    #[arg(long, env = "METERWIRE_MEASUREMENT", default_value = "electric_meter")]
    pub measurement: String,

    /// Value of the meter tag attached to every point.
    #[arg(long, env = "METERWIRE_METER", default_value = "main")]
    pub meter: String,

    /// Per-read timeout in seconds; 0 disables the timeout.
    #[arg(long, env = "METERWIRE_READ_TIMEOUT", default_value_t = 3)]
    pub read_timeout_secs: u64,

    /// Maximum frame length in bytes.
    #[arg(long, default_value_t = 4096)]
    pub max_frame_length: usize,

    /// Maximum number of concurrently processed frames.
    #[arg(long, default_value_t = 8)]
    pub max_in_flight: usize,

    /// Listen address for the Prometheus metrics exporter, if any.
    #[arg(long, env = "METERWIRE_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}
