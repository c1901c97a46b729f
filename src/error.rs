// Errors

use thiserror::Error;

/// Everything the substrate can report.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("no service registered for capability `{0}`")]
    MissingDependency(&'static str),

    #[error("transition target {0} is not attached to the transition engine")]
    InvalidTransitionTarget(String),

    #[error("capability `{0}` registered twice; the newer instance replaces the older one")]
    DuplicateRegistration(&'static str),

    #[error("node `{node}` has been running for {elapsed:.1}s without an exit condition")]
    UnreachableState {
        node: String,
        elapsed: f64,
    },

    #[error("level `{0}` has no registered experience")]
    UnknownLevel(String),

    #[error("flag store i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("flag store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

pub type FlowResult<T> = Result<T, FlowError>;
