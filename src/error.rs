//! Error taxonomy for the harness.

use std::time::Duration;

use thiserror::Error;

/// Failures of the line-delimited exchange with the child.
///
/// Every variant is fatal for the session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("server closed its output while a response was pending")]
    Closed,

    #[error("malformed response line `{line}`: {source}")]
    Decode {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("response line is not valid UTF-8 `{line}`: {source}")]
    InvalidUtf8 {
        line: String,
        #[source]
        source: std::str::Utf8Error,
    },

    #[error("response carries neither a result nor an error")]
    MissingOutcome,

    #[error("encoded message contains an embedded newline")]
    EmbeddedNewline,

    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("pipe i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("no response within {0:?}")]
    Timeout(Duration),
}

impl ProtocolError {
    /// True when a line arrived but could not be understood
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. } | Self::InvalidUtf8 { .. } | Self::MissingOutcome
        )
    }
}

#[derive(Debug, Error)]
pub enum FuzzError {
    #[error("failed to start `{program}`: {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The server answered with an error member
    #[error("server error {code}: {message}")]
    Rpc { code: i32, message: String },
}

/// Why a session ended in `Aborted`.
#[derive(Debug, Error)]
pub enum AbortReason {
    #[error("initialization failed: {0}")]
    InitializationFailed(#[source] FuzzError),

    #[error("schema fetch failed: {0}")]
    SchemaFetchFailed(#[source] FuzzError),

    #[error("query {iteration} failed: {error}")]
    IterationFailed {
        iteration: u64,
        #[source]
        error: FuzzError,
    },

    #[error("interrupted by operator")]
    Interrupted,
}
