//! Message handler adapters.
//!
//! `SubprocessHandler` pipes each message body to a configured command in an
//! isolated child process with environment allowlisting; `SleepHandler`
//! simulates fixed-duration work for local runs and demos.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use siphon_core::port::message_handler::{HandlerError, MessageHandler};
use siphon_core::port::queue_service::ReceivedMessage;

/// Subprocess handler configuration
#[derive(Debug, Clone)]
pub struct SubprocessHandlerConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Allowed environment variables (everything else is stripped)
    pub env_allowlist: Vec<String>,
    pub timeout: Option<Duration>,
}

impl SubprocessHandlerConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env_allowlist: vec![
                "PATH".to_string(),
                "HOME".to_string(),
                "USER".to_string(),
            ],
            timeout: None,
        }
    }
}

/// Spawns an isolated child process per message, body on stdin
pub struct SubprocessHandler {
    config: SubprocessHandlerConfig,
}

impl SubprocessHandler {
    pub fn new(config: SubprocessHandlerConfig) -> Self {
        Self { config }
    }

    fn filtered_env(&self) -> HashMap<String, String> {
        std::env::vars()
            .filter(|(k, _)| self.config.env_allowlist.contains(k))
            .collect()
    }

    async fn spawn_and_wait(&self, body: &str) -> Result<std::process::Output, HandlerError> {
        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .env_clear()
            .envs(self.filtered_env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A timed-out child must not outlive its dropped wait future
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HandlerError::SpawnFailed(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(body.as_bytes())
                .await
                .map_err(|e| HandlerError::Failed(format!("stdin write failed: {}", e)))?;
            // Dropping stdin closes the pipe so the child sees EOF
        }

        match self.config.timeout {
            Some(limit) => match timeout(limit, child.wait_with_output()).await {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(e)) => Err(HandlerError::Failed(e.to_string())),
                Err(_) => Err(HandlerError::Timeout(limit.as_millis() as i64)),
            },
            None => child
                .wait_with_output()
                .await
                .map_err(|e| HandlerError::Failed(e.to_string())),
        }
    }
}

#[async_trait]
impl MessageHandler for SubprocessHandler {
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), HandlerError> {
        debug!(
            message_id = %message.message_id,
            command = %self.config.command,
            "Handing message to subprocess"
        );

        let output = self.spawn_and_wait(&message.body).await?;

        if !output.status.success() {
            return Err(HandlerError::Failed(format!(
                "command exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        debug!(
            message_id = %message.message_id,
            "Subprocess handled message"
        );
        Ok(())
    }
}

/// Fixed-delay handler standing in for real work in local runs
pub struct SleepHandler {
    delay: Duration,
}

impl SleepHandler {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl MessageHandler for SleepHandler {
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), HandlerError> {
        info!(
            message_id = %message.message_id,
            body = %message.body,
            "Processing message"
        );
        sleep(self.delay).await;
        Ok(())
    }
}
