//! The language model the session talks to. Only the contract lives here;
//! the model itself is an external collaborator.

pub mod openai;
pub mod scripted;

use async_trait::async_trait;
use strum::{Display, EnumString};

use crate::errors::{SessionError, SessionResult};

pub use openai::OpenAiModel;
pub use scripted::ScriptedModel;

/// What the model reports about its own readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Availability {
    Available,
    Downloadable,
    Downloading,
    Unavailable,
}

/// Input to a single prompt call.
#[derive(Clone, PartialEq)]
pub enum PromptInput {
    Text(String),
    /// Instructions with an attached photo (WebP bytes).
    WithImage { text: String, image: Vec<u8> },
}

impl PromptInput {
    pub fn text(&self) -> &str {
        match self {
            PromptInput::Text(text) | PromptInput::WithImage { text, .. } => text,
        }
    }
}

impl std::fmt::Debug for PromptInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromptInput::Text(text) => f.debug_tuple("Text").field(text).finish(),
            PromptInput::WithImage { text, image } => f
                .debug_struct("WithImage")
                .field("text", text)
                .field("image", &image.len())
                .finish(),
        }
    }
}

/// One conversation with the model.
#[async_trait]
pub trait ModelSession: Send {
    async fn prompt(&mut self, input: PromptInput) -> anyhow::Result<String>;
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn availability(&self) -> anyhow::Result<Availability>;

    async fn create(&self) -> anyhow::Result<Box<dyn ModelSession>>;
}

/// Open a fresh session, refusing anything that is not ready right now.
pub async fn open_session(model: &dyn LanguageModel) -> SessionResult<Box<dyn ModelSession>> {
    match model.availability().await? {
        Availability::Available => Ok(model.create().await?),
        other => Err(SessionError::ModelUnavailable(other.to_string())),
    }
}

/// Send one prompt on a session of its own and return the raw reply.
pub async fn prompt_once(model: &dyn LanguageModel, input: PromptInput) -> SessionResult<String> {
    let mut session = open_session(model).await?;
    tracing::debug!("Prompt: {}", input.text());
    Ok(session.prompt(input).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_availability_parses_reported_status() {
        assert_eq!(Availability::from_str("available").unwrap(), Availability::Available);
        assert_eq!(
            Availability::from_str("downloadable").unwrap(),
            Availability::Downloadable
        );
        assert!(Availability::from_str("maybe").is_err());
        assert_eq!(Availability::Unavailable.to_string(), "unavailable");
    }

    #[tokio::test]
    async fn test_unavailable_model_is_refused() {
        let model = ScriptedModel::new(["never sent"]);
        model.set_availability(Availability::Unavailable);
        let err = prompt_once(&model, PromptInput::Text("hi".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::ModelUnavailable(status) if status == "unavailable"));
        assert!(model.prompts().is_empty());
    }
}
