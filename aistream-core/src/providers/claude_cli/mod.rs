use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{AiStreamError, CoreResult};
use crate::model::{ChatRequest, Role};
use crate::provider::StreamProvider;
use crate::stream::Dialect;
use crate::transport::{self, ByteStream};

pub const DEFAULT_COMMAND: &str = "claude";

/// Coding-agent CLI run as a subprocess; its `stream-json` stdout is the stream.
#[derive(Debug, Clone)]
pub struct ClaudeCli {
    command: String,
    args: Vec<String>,
    name: String,
}

impl ClaudeCli {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            name: "claude_cli".into(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Configured arguments first, then the prompt and output-format flags.
    fn build_args(&self, req: &ChatRequest) -> CoreResult<Vec<String>> {
        let prompt = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .ok_or_else(|| AiStreamError::Validation("claude cli request has no user message".into()))?;

        let mut args = self.args.clone();
        args.extend([
            "-p".to_string(),
            prompt,
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--include-partial-messages".to_string(),
        ]);
        if !req.model.is_empty() {
            args.extend(["--model".to_string(), req.model.clone()]);
        }
        if let Some(system) = req.joined_system() {
            args.extend(["--append-system-prompt".to_string(), system]);
        }
        Ok(args)
    }
}

#[async_trait]
impl StreamProvider for ClaudeCli {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> Dialect {
        Dialect::CliNdjson
    }

    async fn open(&self, req: &ChatRequest, cancel: &CancellationToken) -> CoreResult<ByteStream> {
        if cancel.is_cancelled() {
            return Err(AiStreamError::Cancelled);
        }
        let args = self.build_args(req)?;
        tracing::debug!(provider = %self.name, command = %self.command, "spawning cli");
        let mut command = Command::new(&self.command);
        command.args(&args);
        transport::spawn_stdout(command)
    }
}
