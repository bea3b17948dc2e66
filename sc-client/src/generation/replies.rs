//! Shapes the model is asked to reply with.

use sc::basic_models::{percentage, Instruction, Unit};
use serde::Deserialize;

use super::sanitize::parse_reply;

/// One guess at what the photographed dish is.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DishGuess {
    pub dish_name: String,
    #[serde(deserialize_with = "percentage::deserialize")]
    pub match_percentage: f64,
}

/// The identification reply: one confident answer, or a ranked list of candidates.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Identification {
    Single(DishGuess),
    Candidates(Vec<DishGuess>),
    Wrapped {
        #[serde(alias = "possible_dishes", alias = "dishes")]
        candidates: Vec<DishGuess>,
    },
}

impl Identification {
    /// The most likely dish, ignoring nameless guesses.
    pub fn best(self) -> Option<DishGuess> {
        let guesses = match self {
            Identification::Single(guess) => vec![guess],
            Identification::Candidates(candidates) | Identification::Wrapped { candidates } => {
                candidates
            }
        };
        guesses
            .into_iter()
            .filter(|guess| !guess.dish_name.trim().is_empty())
            .max_by(|a, b| a.match_percentage.total_cmp(&b.match_percentage))
            .map(|guess| DishGuess {
                dish_name: guess.dish_name.trim().to_string(),
                match_percentage: guess.match_percentage.clamp(0.0, 100.0),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum InstructionsReply {
    List(Vec<Instruction>),
    Wrapped { instructions: Vec<Instruction> },
}

pub fn parse_identification(raw: &str) -> Option<DishGuess> {
    parse_reply::<Identification>(raw)?.best()
}

/// Ingredient and tool lists share one shape. An empty list is not a usable reply.
pub fn parse_units(raw: &str) -> Option<Vec<Unit>> {
    parse_reply::<Vec<Unit>>(raw).filter(|units| !units.is_empty())
}

pub fn parse_instructions(raw: &str) -> Option<Vec<Instruction>> {
    let steps = match parse_reply::<InstructionsReply>(raw)? {
        InstructionsReply::List(steps) => steps,
        InstructionsReply::Wrapped { instructions } => instructions,
    };
    Some(steps).filter(|steps| !steps.is_empty())
}

/// Answers are free text; only an empty reply is unusable.
pub fn parse_answer(raw: &str) -> Option<String> {
    let answer = raw.trim();
    (!answer.is_empty()).then(|| answer.to_string())
}
