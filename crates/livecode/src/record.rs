use crate::client::Executor;
use crate::result::{ExecutionResult, FailureReason};
use anyhow::Context;
use async_trait::async_trait;
use protocol::RuntimeVariant;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

/// Where a run came from. All fields are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunContext {
    pub course: Option<String>,
    pub lesson: Option<String>,
    pub batch: Option<String>,
    pub sketch: Option<String>,
    pub exercise: Option<String>,
    pub example: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceType {
    Sketch,
    Exercise,
    Example,
}

impl RunContext {
    pub fn source_type(&self) -> SourceType {
        if self.sketch.is_some() {
            SourceType::Sketch
        } else if self.exercise.is_some() {
            SourceType::Exercise
        } else {
            SourceType::Example
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeRun {
    pub id: String,
    pub code: String,
    pub result: ExecutionResult,
    pub status: &'static str,
    pub error: Option<FailureReason>,
    pub source_type: SourceType,
    #[serde(flatten)]
    pub context: RunContext,
    pub failure_type: Option<String>,
    pub failure_message: Option<String>,
    pub recorded_at: String,
}

impl CodeRun {
    pub fn new(code: &str, result: &ExecutionResult, context: RunContext) -> Self {
        let details = result.exception_details();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            code: code.to_string(),
            result: result.clone(),
            status: result.status.title(),
            error: result.error_code,
            source_type: context.source_type(),
            context,
            failure_type: details.kind,
            failure_message: details.message,
            recorded_at: humantime::format_rfc3339(SystemTime::now()).to_string(),
        }
    }
}

/// Receives run records. Failures here must never affect the caller.
#[async_trait]
pub trait Recorder: Send + Sync {
    async fn record(&self, run: &CodeRun) -> anyhow::Result<()>;
}

/// Writes each run as `<id>.json` under a directory.
#[derive(Debug, Clone)]
pub struct FileRecorder {
    dir: PathBuf,
}

impl FileRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Recorder for FileRecorder {
    async fn record(&self, run: &CodeRun) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create record dir {}", self.dir.display()))?;
        let path = self.dir.join(format!("{}.json", run.id));
        let payload = serde_json::to_vec_pretty(run)?;
        tokio::fs::write(&path, payload)
            .await
            .with_context(|| format!("write run record {}", path.display()))?;
        Ok(())
    }
}

/// Fire-and-forget: the record is written on a background task.
pub fn spawn_record(
    recorder: Arc<dyn Recorder>,
    run: CodeRun,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match recorder.record(&run).await {
            Ok(()) => tracing::info!(event = "code_run_recorded", id = %run.id, status = run.status),
            Err(err) => tracing::warn!(event = "code_run_record_failed", id = %run.id, error = %err),
        }
    })
}

/// Executes code, hands the outcome to the recorder, and returns the result.
pub async fn execute_recorded(
    executor: &dyn Executor,
    recorder: Arc<dyn Recorder>,
    code: &str,
    variant: RuntimeVariant,
    context: RunContext,
) -> anyhow::Result<ExecutionResult> {
    let result = executor.execute(code, variant).await?;
    spawn_record(recorder, CodeRun::new(code, &result, context));
    Ok(result)
}
