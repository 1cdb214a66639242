use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LivecodeError {
    #[error("could not connect to the livecode sandbox")]
    ConnectionFailed,

    #[error("livecode connection failed mid-exchange")]
    ConnectionReset,

    #[error("sandbox exited abnormally (exit status: {exit_status:?})")]
    NonZeroOrMissingExit { exit_status: Option<i64> },

    #[error("failed to render shapes: {0}")]
    RenderFailure(String),

    #[error("traceback found but the last output line has no `kind: message` form")]
    ClassificationAmbiguous,

    #[error("invalid livecode endpoint {0}")]
    InvalidEndpoint(String),
}
