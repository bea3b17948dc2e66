use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sc::basic_models::Instruction;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::grammar::{classify, Utterance, VoiceCommand};
use super::speech::SpeechSynthesizer;
use crate::config::VoiceConfig;
use crate::errors::SessionResult;
use crate::session::notify::{Notice, Notifier};
use crate::session::RecipeSession;

/// What a spoken command can do to the recipe on screen.
#[async_trait]
pub trait VoiceActions: Send + Sync {
    /// Bring a step into view. Nothing to do without a view.
    fn scroll_to(&self, _step: usize) {}

    fn step(&self, step: usize) -> Option<Instruction>;

    fn mark_complete(&self, step: usize) -> SessionResult<()>;

    async fn ask_question(&self, step: usize, question: &str) -> SessionResult<String>;
}

#[async_trait]
impl VoiceActions for RecipeSession {
    fn step(&self, step: usize) -> Option<Instruction> {
        self.instruction(step)
    }

    fn mark_complete(&self, step: usize) -> SessionResult<()> {
        self.mark_step_complete(step)
    }

    async fn ask_question(&self, step: usize, question: &str) -> SessionResult<String> {
        RecipeSession::ask_question(self, step, question).await
    }
}

/// Turns utterances into actions and spoken replies.
#[derive(Clone)]
pub struct Interpreter {
    actions: Arc<dyn VoiceActions>,
    synth: Arc<dyn SpeechSynthesizer>,
    wake_word: String,
    answer_delay: Duration,
}

impl Interpreter {
    pub fn new(
        actions: Arc<dyn VoiceActions>,
        synth: Arc<dyn SpeechSynthesizer>,
        config: &VoiceConfig,
    ) -> Self {
        Self {
            actions,
            synth,
            wake_word: config.wake_word.clone(),
            answer_delay: Duration::from_millis(config.answer_delay_ms),
        }
    }

    async fn say(&self, text: &str) {
        if let Err(e) = self.synth.speak(text).await {
            tracing::warn!("Could not speak: {:#}", e);
        }
    }

    async fn no_such_step(&self, step: usize) {
        self.say(&format!("There is no step {} in this recipe.", step + 1))
            .await
    }

    /// Act on one finalized utterance. Speech that is not a command is ignored.
    pub async fn handle_utterance(&self, text: &str) -> Utterance {
        let utterance = classify(text, &self.wake_word);
        tracing::debug!("Heard {:?}: {:?}", text, utterance);
        if utterance.wake {
            self.say("Yes, I'm listening").await;
        }

        match &utterance.command {
            None => {}
            Some(VoiceCommand::ReadStep(step)) => match self.actions.step(*step) {
                Some(instruction) => {
                    self.actions.scroll_to(*step);
                    self.say(&format!("{}, {}.", instruction.step, instruction.description))
                        .await;
                }
                None => self.no_such_step(*step).await,
            },
            Some(VoiceCommand::MarkComplete(step)) => match self.actions.mark_complete(*step) {
                Ok(()) => {
                    self.actions.scroll_to(*step);
                    self.say(&format!("Marked step {} as complete", step + 1))
                        .await;
                }
                Err(e) => {
                    tracing::debug!("Could not mark step {}: {}", step + 1, e);
                    self.no_such_step(*step).await;
                }
            },
            Some(VoiceCommand::AskQuestion { step, question }) => {
                if self.actions.step(*step).is_none() {
                    self.no_such_step(*step).await;
                } else {
                    self.actions.scroll_to(*step);
                    self.say(question).await;
                    match self.actions.ask_question(*step, question).await {
                        Ok(answer) => {
                            tokio::time::sleep(self.answer_delay).await;
                            self.say(&answer).await;
                        }
                        // Already reported by the session.
                        Err(_) => self.say("Sorry, I couldn't answer that.").await,
                    }
                }
            }
            Some(VoiceCommand::Unrecognized(kind)) => self.say(kind.retry_hint()).await,
        }
        utterance
    }
}

/// The user-facing voice switch.
pub struct VoiceControl {
    interpreter: Interpreter,
    notifier: Arc<dyn Notifier>,
    listener: Option<JoinHandle<()>>,
}

impl VoiceControl {
    pub fn new(interpreter: Interpreter, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            interpreter,
            notifier,
            listener: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.listener
            .as_ref()
            .is_some_and(|listener| !listener.is_finished())
    }

    /// Start acting on finalized utterances from `transcripts`, one at a time.
    pub fn activate(&mut self, mut transcripts: mpsc::UnboundedReceiver<String>) {
        self.stop_listening();
        let interpreter = self.interpreter.clone();
        self.listener = Some(tokio::spawn(async move {
            while let Some(text) = transcripts.recv().await {
                interpreter.handle_utterance(&text).await;
            }
            tracing::debug!("Transcript stream ended");
        }));
        self.notifier.notify(Notice::info(
            "Speech Commands Activated",
            format!(
                "Say '{}' followed by your command.",
                self.interpreter.wake_word
            ),
        ));
    }

    /// Stop listening and cut off anything being said.
    pub fn deactivate(&mut self) {
        if self.stop_listening() {
            self.notifier.notify(Notice::info(
                "Speech Commands Deactivated",
                "Voice control is now turned off.",
            ));
        }
    }

    /// Wait until the transcript stream has ended and every utterance in it
    /// has been handled.
    pub async fn finish(&mut self) {
        if let Some(listener) = self.listener.take() {
            if let Err(e) = listener.await {
                tracing::warn!("Voice listener stopped abnormally: {}", e);
            }
        }
    }

    fn stop_listening(&mut self) -> bool {
        let Some(listener) = self.listener.take() else {
            return false;
        };
        listener.abort();
        self.interpreter.synth.cancel();
        true
    }
}

impl Drop for VoiceControl {
    fn drop(&mut self) {
        self.stop_listening();
    }
}
