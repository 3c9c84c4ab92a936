//! Measurement sink interface and the shipped line-protocol transport.
//!
//! The sink is an external collaborator: the core hands it a decoded
//! [`FieldMap`] plus a capture timestamp and moves on. [`MeasurementSink`] is
//! the seam; [`UdpLineSink`] is the thin shipped implementation, writing one
//! InfluxDB line-protocol point per forward over UDP. Batching, HTTP
//! transport and retry policies belong behind the seam, not in this crate.

use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::info;

use crate::fields::FieldMap;

/// Immutable sink configuration, supplied once at startup.
#[derive(Clone, Debug)]
pub struct SinkConfig {
    /// Endpoint receiving line protocol, e.g. `udp://influxdb:8089`.
    pub uri: String,
    /// Database the endpoint writes into.
    pub database: String,
    /// Measurement name written per forwarded frame.
    pub measurement: String,
    /// Value of the `meter` tag attached to every point.
    pub meter: String,
}

/// Errors reported by a sink forward.
///
/// Forward failures are logged by the dispatch loop and never abort it.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink transport failed to send.
    #[error("sink transport error: {0}")]
    Io(#[from] io::Error),
}

/// Receiver of decoded measurements.
#[async_trait]
pub trait MeasurementSink: Send + Sync {
    /// Persist one measurement captured at `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] if the measurement could not be handed to the
    /// backing store.
    async fn forward(&self, fields: &FieldMap, timestamp: SystemTime) -> Result<(), SinkError>;
}

/// Encode one line-protocol point.
///
/// `tags` are appended to the measurement in the given order; `fields`
/// become the point's field set and `timestamp` its nanosecond timestamp.
#[must_use]
pub fn encode_line(
    measurement: &str,
    tags: &[(&str, &str)],
    fields: &FieldMap,
    timestamp: SystemTime,
) -> String {
    let mut line = String::from(measurement);
    for (key, value) in tags {
        line.push(',');
        line.push_str(key);
        line.push('=');
        line.push_str(value);
    }
    line.push(' ');
    let mut first = true;
    for (name, value) in fields {
        if !first {
            line.push(',');
        }
        first = false;
        line.push_str(name);
        line.push('=');
        line.push_str(&value.to_string());
    }
    let nanos = timestamp
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    line.push(' ');
    line.push_str(&nanos.to_string());
    line
}

/// Line-protocol sink writing one datagram per measurement.
#[derive(Debug)]
pub struct UdpLineSink {
    socket: UdpSocket,
    measurement: String,
    meter: String,
}

impl UdpLineSink {
    /// Bind a local socket and connect it to the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] if the endpoint cannot be resolved or the
    /// socket cannot be bound or connected.
    pub async fn connect(config: &SinkConfig) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(endpoint_authority(&config.uri)).await?;
        info!(
            uri = %config.uri,
            database = %config.database,
            measurement = %config.measurement,
            "measurement sink connected"
        );
        Ok(Self {
            socket,
            measurement: config.measurement.clone(),
            meter: config.meter.clone(),
        })
    }
}

#[async_trait]
impl MeasurementSink for UdpLineSink {
    async fn forward(&self, fields: &FieldMap, timestamp: SystemTime) -> Result<(), SinkError> {
        let line = encode_line(
            &self.measurement,
            &[("meter", self.meter.as_str())],
            fields,
            timestamp,
        );
        self.socket.send(line.as_bytes()).await?;
        Ok(())
    }
}

/// Strip a scheme prefix, leaving the `host:port` authority.
fn endpoint_authority(uri: &str) -> &str {
    uri.split_once("://").map_or(uri, |(_, rest)| rest)
}
