use thiserror::Error;

/// A host query that could not be evaluated.
///
/// The classifier treats every probe error as `false`.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("environment variable {name} has invalid value {value:?}")]
    InvalidVar { name: &'static str, value: String },

    #[error("host query unavailable: {0}")]
    Unavailable(String),

    #[cfg(unix)]
    #[error("Nix system error: {0}")]
    Nix(#[from] nix::Error),
}

/// Failure to append to an operator fault sink.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}
