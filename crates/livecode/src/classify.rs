use crate::error::LivecodeError;
use crate::result::ExecutionStatus;
use serde::Serialize;

pub const TRACEBACK_MARKER: &str = "Traceback (most recent call last):";

/// Exception type and message pulled out of a failed run's output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExceptionDetails {
    pub kind: Option<String>,
    pub message: Option<String>,
}

impl ExceptionDetails {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.message.is_none()
    }
}

pub fn classify(status: ExecutionStatus, output: &[String]) -> ExceptionDetails {
    if status != ExecutionStatus::Failed {
        return ExceptionDetails::default();
    }
    let Some(last) = output.last() else {
        return ExceptionDetails::default();
    };
    if !output.concat().contains(TRACEBACK_MARKER) {
        return ExceptionDetails::default();
    }
    match split_exception_line(last) {
        Ok((kind, message)) => ExceptionDetails {
            kind: Some(kind),
            message: Some(message),
        },
        Err(err) => {
            tracing::debug!(error = %err, line = %last.trim(), "unclassified traceback");
            ExceptionDetails::default()
        }
    }
}

fn split_exception_line(line: &str) -> Result<(String, String), LivecodeError> {
    let (kind, message) = line
        .split_once(':')
        .ok_or(LivecodeError::ClassificationAmbiguous)?;
    Ok((kind.trim().to_string(), message.trim().to_string()))
}
