use thiserror::Error;

/// Top-level error type shared by iotag components.
#[derive(Error, Debug)]
pub enum IotagError {
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
}
