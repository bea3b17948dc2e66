use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::anyhow;
use async_trait::async_trait;
use serde::Deserialize;

use super::{Availability, LanguageModel, ModelSession, PromptInput};

/// A canned reply, used for the first prompt containing `when`.
/// An empty `when` matches any prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptEntry {
    #[serde(default)]
    pub when: String,
    pub reply: String,
}

#[derive(Debug)]
struct Script {
    availability: Availability,
    entries: Vec<ScriptEntry>,
    prompts: Vec<PromptInput>,
}

/// A model that answers from a script and remembers every prompt it was sent.
///
/// Useful for demos without network access and for exercising the session
/// without a real model.
#[derive(Debug, Clone)]
pub struct ScriptedModel {
    script: Arc<Mutex<Script>>,
}

impl ScriptedModel {
    /// Replies handed out in order, whatever the prompt.
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_entries(replies.into_iter().map(|reply| ScriptEntry {
            when: String::new(),
            reply: reply.into(),
        }))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = ScriptEntry>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                availability: Availability::Available,
                entries: entries.into_iter().collect(),
                prompts: vec![],
            })),
        }
    }

    /// Load a YAML list of `{when, reply}` entries.
    pub fn load(yml_path: &str) -> anyhow::Result<Self> {
        let yml = std::fs::read_to_string(yml_path)?;
        let entries: Vec<ScriptEntry> = serde_yaml::from_str(&yml)?;
        Ok(Self::from_entries(entries))
    }

    /// Add a reply reserved for prompts containing `when`.
    pub fn on(self, when: impl Into<String>, reply: impl Into<String>) -> Self {
        self.lock().entries.push(ScriptEntry {
            when: when.into(),
            reply: reply.into(),
        });
        self
    }

    pub fn set_availability(&self, availability: Availability) {
        self.lock().availability = availability;
    }

    /// Every prompt received so far, oldest first.
    pub fn prompts(&self) -> Vec<PromptInput> {
        self.lock().prompts.clone()
    }

    /// How many prompts contained `needle`.
    pub fn prompt_count(&self, needle: &str) -> usize {
        self.lock()
            .prompts
            .iter()
            .filter(|p| p.text().contains(needle))
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::from_entries([])
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn availability(&self) -> anyhow::Result<Availability> {
        Ok(self.lock().availability)
    }

    async fn create(&self) -> anyhow::Result<Box<dyn ModelSession>> {
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl ModelSession for ScriptedModel {
    async fn prompt(&mut self, input: PromptInput) -> anyhow::Result<String> {
        let mut script = self.lock();
        let text = input.text().to_string();
        script.prompts.push(input);
        let position = script
            .entries
            .iter()
            .position(|entry| text.contains(&entry.when))
            .ok_or_else(|| anyhow!("No scripted reply for prompt"))?;
        Ok(script.entries.remove(position).reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_routed_replies() {
        let model = ScriptedModel::new(["fallback"]).on("tools", "tool reply");
        let mut session = model.create().await.unwrap();
        // Entries are tried in order and an empty `when` matches anything.
        assert_eq!(
            session.prompt(PromptInput::Text("list tools".into())).await.unwrap(),
            "fallback"
        );
        assert_eq!(
            session.prompt(PromptInput::Text("list tools".into())).await.unwrap(),
            "tool reply"
        );
        assert!(session.prompt(PromptInput::Text("more".into())).await.is_err());
        assert_eq!(model.prompt_count("tools"), 2);
    }
}
