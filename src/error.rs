//! Error types shared across the simulator.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Failure converting between a typed profile and its wire bytes.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to decode profile: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to encode profile: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Failure handing an outbound message to the transport.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("bus closed while publishing to {topic}")]
    ChannelClosed { topic: String },
}

/// Failure loading an external daily output curve.
#[derive(Debug, Error)]
pub enum CurveError {
    #[error("cannot read curve data \"{path}\": {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("curve data \"{path}\" line {line}: \"{value}\" is not a number")]
    Parse {
        path: PathBuf,
        line: usize,
        value: String,
    },
    #[error("curve data \"{path}\" contains no samples")]
    Empty { path: PathBuf },
}

/// Anything that stops the simulator from starting. Always fatal.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{} configuration error(s): {}", .0.len(), join_errors(.0))]
    Config(Vec<ConfigError>),
    #[error(transparent)]
    Curve(#[from] CurveError),
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
