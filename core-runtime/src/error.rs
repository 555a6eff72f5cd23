use thiserror::Error;

/// Errors raised while bootstrapping the runtime layer.
#[derive(Error, Debug)]
pub enum Error {
    /// A logging format or filter string could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The global tracing subscriber could not be installed.
    #[error("Logging initialization failed: {0}")]
    Subscriber(String),
}

pub type Result<T> = std::result::Result<T, Error>;
