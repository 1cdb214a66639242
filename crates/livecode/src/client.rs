use crate::error::LivecodeError;
use crate::result::{ExecutionResult, FailureReason};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use protocol::endpoint::livecode_ws_url;
use protocol::{ExecutionRequest, FileEntry, InboundMessage, RuntimeVariant};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Runs code somewhere and reports the aggregated outcome.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, code: &str, variant: RuntimeVariant)
        -> anyhow::Result<ExecutionResult>;
}

/// Client for the livecode sandbox. Every call opens a fresh connection.
#[derive(Debug, Clone)]
pub struct LiveCode {
    endpoint: String,
    timeout: Duration,
    files: Vec<FileEntry>,
    command: Vec<String>,
}

impl LiveCode {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
            files: Vec::new(),
            command: protocol::default_command(),
        }
    }

    pub fn from_base_url(base: &str, timeout: Duration) -> Result<Self, LivecodeError> {
        let endpoint = livecode_ws_url(base)
            .map_err(|err| LivecodeError::InvalidEndpoint(format!("{base}: {err}")))?;
        Ok(Self::new(endpoint, timeout))
    }

    pub fn with_files(mut self, files: Vec<FileEntry>) -> Self {
        self.files = files;
        self
    }

    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn request(&self, code: &str, variant: RuntimeVariant) -> ExecutionRequest {
        ExecutionRequest::new(code, variant)
            .with_files(self.files.clone())
            .with_command(self.command.clone())
    }

    pub async fn run(&self, request: &ExecutionRequest) -> ExecutionResult {
        execute(request, &self.endpoint, self.timeout).await
    }
}

#[async_trait]
impl Executor for LiveCode {
    async fn execute(
        &self,
        code: &str,
        variant: RuntimeVariant,
    ) -> anyhow::Result<ExecutionResult> {
        Ok(self.run(&self.request(code, variant)).await)
    }
}

/// Sends one exec request to `endpoint` and aggregates the reply stream.
///
/// Connect and send failures (including timeouts) are failures; a read that
/// times out just ends the exchange with whatever arrived so far.
pub async fn execute(
    request: &ExecutionRequest,
    endpoint: &str,
    limit: Duration,
) -> ExecutionResult {
    let mut socket = match timeout(limit, tokio_tungstenite::connect_async(endpoint)).await {
        Ok(Ok((socket, _))) => socket,
        Ok(Err(err)) => {
            tracing::warn!(event = "livecode_connect_failed", endpoint, error = %err);
            return ExecutionResult::connection_failed();
        }
        Err(_) => {
            tracing::warn!(
                event = "livecode_connect_failed",
                endpoint,
                error = "connect timed out"
            );
            return ExecutionResult::connection_failed();
        }
    };

    let mut result = ExecutionResult::default();
    let mut exit_status = None;
    if let Err(err) = exchange(&mut socket, request, limit, &mut result, &mut exit_status).await {
        tracing::warn!(event = "livecode_connection_reset", endpoint, error = %err);
        result.mark_failed(FailureReason::ConnectionReset);
    }
    result.finish(exit_status);

    tracing::info!(
        event = "livecode_executed",
        endpoint,
        status = ?result.status,
        exit_status = ?result.exit_status,
        output_chunks = result.output.len(),
        shapes = result.shapes.len(),
    );
    result
}

async fn exchange(
    socket: &mut Socket,
    request: &ExecutionRequest,
    limit: Duration,
    result: &mut ExecutionResult,
    exit_status: &mut Option<i64>,
) -> anyhow::Result<()> {
    let payload = serde_json::to_string(&request.to_message())?;
    timeout(limit, socket.send(Message::Text(payload)))
        .await
        .map_err(|_| anyhow::anyhow!("send timed out"))??;

    loop {
        let next = match timeout(limit, socket.next()).await {
            Ok(next) => next,
            Err(_) => {
                tracing::debug!(event = "livecode_read_timeout", "no message within timeout");
                break;
            }
        };
        let message = match next {
            None => break,
            Some(Ok(message)) => message,
            Some(Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed)) => {
                break
            }
            Some(Err(err)) => return Err(err.into()),
        };
        let text = match message {
            Message::Text(text) => text,
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => continue,
            },
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
        };
        if text.is_empty() {
            break;
        }
        dispatch(&text, result, exit_status);
    }
    Ok(())
}

fn dispatch(text: &str, result: &mut ExecutionResult, exit_status: &mut Option<i64>) {
    match serde_json::from_str::<InboundMessage>(text) {
        Ok(InboundMessage::Write { data }) => result.add_output(data),
        Ok(InboundMessage::Shape { shape }) => result.add_shape(shape),
        Ok(InboundMessage::ExitStatus { exitstatus }) => *exit_status = Some(exitstatus),
        Ok(InboundMessage::Unknown) => {}
        Err(err) => {
            tracing::debug!(event = "livecode_message_skipped", error = %err);
        }
    }
}
