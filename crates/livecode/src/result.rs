use crate::classify::{classify, ExceptionDetails};
use crate::error::LivecodeError;
use protocol::Shape;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failed,
}

impl ExecutionStatus {
    /// Capitalized form used in run records.
    pub fn title(self) -> &'static str {
        match self {
            ExecutionStatus::Success => "Success",
            ExecutionStatus::Failed => "Failed",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    ConnectionFailed,
    ConnectionReset,
    NonzeroExit,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub error_code: Option<FailureReason>,
    pub exit_status: Option<i64>,
    pub output: Vec<String>,
    pub shapes: Vec<Shape>,
}

impl Default for ExecutionResult {
    fn default() -> Self {
        Self {
            status: ExecutionStatus::Success,
            error_code: None,
            exit_status: None,
            output: Vec::new(),
            shapes: Vec::new(),
        }
    }
}

impl ExecutionResult {
    pub fn connection_failed() -> Self {
        let mut result = Self::default();
        result.mark_failed(FailureReason::ConnectionFailed);
        result
    }

    pub fn mark_failed(&mut self, reason: FailureReason) {
        self.status = ExecutionStatus::Failed;
        self.error_code = Some(reason);
    }

    pub fn add_output(&mut self, data: String) {
        self.output.push(data);
    }

    pub fn add_shape(&mut self, shape: Shape) {
        self.shapes.push(shape);
    }

    /// Applies the terminal exit status. A missing status counts as a failure.
    pub fn finish(&mut self, exit_status: Option<i64>) {
        self.exit_status = exit_status;
        if exit_status != Some(0) {
            self.status = ExecutionStatus::Failed;
            self.error_code.get_or_insert(FailureReason::NonzeroExit);
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    pub fn failure(&self) -> Option<LivecodeError> {
        if self.is_success() {
            return None;
        }
        Some(match self.error_code {
            Some(FailureReason::ConnectionFailed) => LivecodeError::ConnectionFailed,
            Some(FailureReason::ConnectionReset) => LivecodeError::ConnectionReset,
            Some(FailureReason::NonzeroExit) | None => LivecodeError::NonZeroOrMissingExit {
                exit_status: self.exit_status,
            },
        })
    }

    pub fn exception_details(&self) -> ExceptionDetails {
        classify(self.status, &self.output)
    }
}
