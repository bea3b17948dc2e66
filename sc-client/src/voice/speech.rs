use std::process::Stdio;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Notify;

/// Text to speech. `speak` returns once the text has been said or cancelled.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn speak(&self, text: &str) -> Result<()>;

    /// Stop whatever is being said right now.
    fn cancel(&self);
}

/// Speaks into the log. Used when no speech program is configured.
pub struct LogSynthesizer;

#[async_trait]
impl SpeechSynthesizer for LogSynthesizer {
    async fn speak(&self, text: &str) -> Result<()> {
        tracing::info!("Speaking: {}", text);
        Ok(())
    }

    fn cancel(&self) {}
}

/// Runs an external speech program such as `espeak`, once per utterance.
pub struct CommandSynthesizer {
    program: String,
    args: Vec<String>,
    cancelled: Notify,
}

impl CommandSynthesizer {
    /// `command` is the program followed by its arguments. The text is appended.
    pub fn new(command: &[String]) -> Result<Self> {
        let Some((program, args)) = command.split_first() else {
            bail!("Speech command is empty");
        };
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            cancelled: Notify::new(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSynthesizer {
    async fn speak(&self, text: &str) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", self.program))?;

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                if !status.success() {
                    tracing::warn!("{} exited with {}", self.program, status);
                }
            }
            _ = self.cancelled.notified() => {
                tracing::debug!("Speech cancelled");
                child.kill().await?;
            }
        }
        Ok(())
    }

    fn cancel(&self) {
        self.cancelled.notify_waiters();
    }
}
