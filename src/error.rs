//! Error types for the vidbatch library.

use thiserror::Error;

use crate::batch::ItemStatus;

/// A single rule broken by a set of download parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParameterViolation {
    /// The trim end lies before the trim start.
    #[error("trim end {end} is before trim start {start}")]
    TrimEndBeforeStart {
        /// Rendered start timecode.
        start: String,
        /// Rendered end timecode.
        end: String,
    },

    /// A timecode string could not be parsed.
    #[error("malformed timecode: {0:?}")]
    MalformedTimecode(String),

    /// The preferred video container is not one of the known containers.
    #[error("unknown video container: {0:?}")]
    UnknownVideoContainer(String),

    /// The audio container is not one of the known audio formats.
    #[error("unknown audio container: {0:?}")]
    UnknownAudioContainer(String),
}

/// Errors that can occur while resolving, compiling or running downloads.
#[derive(Error, Debug)]
pub enum Error {
    /// The metadata carried no format descriptors at all.
    #[error("no formats were reported for this video")]
    EmptyCatalog,

    /// Nothing in the catalog resembles the requested media type.
    #[error("no suitable format matches the requested parameters")]
    NoFormatAvailable,

    /// The download parameters contradict themselves.
    #[error("invalid parameters: {}", join_violations(.0))]
    InvalidParameters(Vec<ParameterViolation>),

    /// `download` was called with nothing ready to download.
    #[error("no analyzed items are ready to download")]
    NoReadyItems,

    /// A batch item was driven through a transition its state machine forbids.
    #[error("item {index} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        /// Index of the item in the batch.
        index: usize,
        /// Current status.
        from: ItemStatus,
        /// Requested status.
        to: ItemStatus,
    },

    /// The external engine reported a failure.
    #[error("engine error: {0}")]
    Engine(String),

    /// The external engine executable could not be started.
    #[error("external tool is missing: {tool}")]
    ToolNotFound {
        /// Name or path of the missing executable.
        tool: String,
    },

    /// The external engine did not answer in time.
    #[error("timed out after {0}s")]
    Timeout(u64),

    /// The job was cancelled through its cancellation token.
    #[error("download cancelled")]
    Cancelled,

    /// I/O error while talking to the engine or reading files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine produced JSON we could not read.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration file could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
}

fn join_violations(violations: &[ParameterViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A specialized `Result` type for vidbatch operations.
pub type Result<T> = std::result::Result<T, Error>;
