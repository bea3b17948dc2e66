use std::collections::BTreeMap;

use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A recognized dish and everything generated for it.
///
/// The record is created as soon as the dish is identified; the optional
/// lists stay absent until their generation step succeeds and are then
/// replaced wholesale. `questions` only ever grows.
#[derive(Deserialize, Serialize, Clone, PartialEq)]
pub struct RecipeRecord {
    pub id: String,
    pub name: String,
    #[serde(deserialize_with = "percentage::deserialize")]
    pub confidence: f64,
    #[serde(with = "base64_bytes", default)]
    pub image: Vec<u8>,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredients: Option<Vec<Ingredient>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<Vec<Instruction>>,
    #[serde(default)]
    pub questions: BTreeMap<usize, Vec<Question>>,
}

impl std::fmt::Debug for RecipeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipeRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("confidence", &self.confidence)
            .field("image", &self.image.len())
            .field("timestamp", &self.timestamp)
            .field("ingredients", &self.ingredients)
            .field("tools", &self.tools)
            .field("instructions", &self.instructions)
            .field("questions", &self.questions)
            .finish()
    }
}

impl RecipeRecord {
    /// A freshly identified recipe with nothing generated yet.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        confidence: f64,
        image: Vec<u8>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            confidence,
            image,
            timestamp: timestamp.into(),
            ingredients: None,
            tools: None,
            instructions: None,
            questions: BTreeMap::new(),
        }
    }
}

/// Something measured: an ingredient or a piece of kitchen equipment.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Unit {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    #[serde(deserialize_with = "percentage::deserialize")]
    pub confidence: f64,
}

impl Unit {
    /// The same unit with its quantity multiplied for `servings` portions.
    pub fn scaled(&self, servings: u32) -> Self {
        Self {
            quantity: self.quantity * f64::from(servings),
            ..self.clone()
        }
    }
}

pub type Ingredient = Unit;
pub type Tool = Unit;

/// One cooking step. Its position in the list is its identity.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Instruction {
    pub step: String,
    pub description: String,
    /// Minutes
    pub time: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Question {
    pub text: String,
    pub answer: String,
}

/// The part of a record shown in the history list.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RecipeSummary {
    pub id: String,
    pub name: String,
    pub timestamp: String,
}

/// Percentages arrive as `92`, `92.5`, `"92"` or `"92%"` depending on the model.
pub mod percentage {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Loose::deserialize(deserializer)? {
            Loose::Number(n) => Ok(n),
            Loose::Text(s) => s
                .trim()
                .trim_end_matches('%')
                .trim()
                .parse::<f64>()
                .map_err(|_| serde::de::Error::custom(format!("not a percentage: {s:?}"))),
        }
    }
}

/// Blobs are kept as standard base64 text inside JSON documents.
mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(text)
            .map_err(serde::de::Error::custom)
    }
}
