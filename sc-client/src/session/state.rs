use std::collections::{BTreeMap, BTreeSet};

use sc::basic_models::{Ingredient, Instruction, Question, RecipeRecord, Tool};
use serde::Serialize;
use strum::{Display, EnumIter, IntoStaticStr};

pub const MIN_SERVINGS: u32 = 1;
pub const MAX_SERVINGS: u32 = 10;

/// A model-backed population of one record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumIter, IntoStaticStr)]
pub enum GenerationStep {
    #[strum(serialize = "dish identification")]
    Identify,
    #[strum(serialize = "ingredient list")]
    Ingredients,
    #[strum(serialize = "tool list")]
    Tools,
    #[strum(serialize = "cooking instructions")]
    Instructions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepStatus {
    #[default]
    NotStarted,
    InFlight,
    Done,
    Failed,
}

/// Whether a request to run a step actually ran it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Generated,
    AlreadyTriggered,
    /// The reply arrived after the session moved on and was dropped.
    Superseded,
}

/// Per-step trigger bookkeeping. A step may only be claimed when it is not
/// running and not done, so however often its condition is re-evaluated it
/// reaches the model at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepGuards {
    statuses: BTreeMap<GenerationStep, StepStatus>,
}

impl StepGuards {
    /// Guards with every step already satisfied (replaying a stored recipe).
    pub fn satisfied() -> Self {
        use strum::IntoEnumIterator;
        Self {
            statuses: GenerationStep::iter()
                .map(|step| (step, StepStatus::Done))
                .collect(),
        }
    }

    pub fn status(&self, step: GenerationStep) -> StepStatus {
        self.statuses.get(&step).copied().unwrap_or_default()
    }

    /// Whether a step may be claimed now. Failed steps only with `allow_retry`.
    pub fn can_claim(&self, step: GenerationStep, allow_retry: bool) -> bool {
        match self.status(step) {
            StepStatus::NotStarted => true,
            StepStatus::Failed => allow_retry,
            StepStatus::InFlight | StepStatus::Done => false,
        }
    }

    /// Claim a step that has never been attempted.
    pub fn claim_fresh(&mut self, step: GenerationStep) -> bool {
        self.claim_if(step, false)
    }

    /// Claim a step that has never been attempted or that failed before.
    pub fn claim(&mut self, step: GenerationStep) -> bool {
        self.claim_if(step, true)
    }

    fn claim_if(&mut self, step: GenerationStep, allow_retry: bool) -> bool {
        if self.can_claim(step, allow_retry) {
            self.statuses.insert(step, StepStatus::InFlight);
            true
        } else {
            false
        }
    }

    pub fn finish(&mut self, step: GenerationStep, succeeded: bool) {
        let status = if succeeded {
            StepStatus::Done
        } else {
            StepStatus::Failed
        };
        self.statuses.insert(step, status);
    }
}

/// Where the session is, derived from what it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum SessionStage {
    Idle,
    Identifying,
    GeneratingIngredients,
    GeneratingTools,
    GeneratingInstructions,
    Ready,
    PrefillLoading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Hydration {
    /// Not a replay.
    #[default]
    NotNeeded,
    Pending,
    Loading,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dish {
    pub name: String,
    pub confidence: f64,
}

/// Everything the session knows about the current recipe.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub recipe_id: Option<String>,
    pub dish: Option<Dish>,
    pub image: Vec<u8>,
    pub timestamp: Option<String>,
    pub ingredients: Option<Vec<Ingredient>>,
    pub tools: Option<Vec<Tool>>,
    pub instructions: Option<Vec<Instruction>>,
    pub questions: BTreeMap<usize, Vec<Question>>,
    pub servings: u32,
    pub completed_steps: BTreeSet<usize>,
    pub guards: StepGuards,
    pub hydration: Hydration,
    /// Bumped whenever the session starts over, so late replies for an
    /// abandoned recipe can be recognised and dropped.
    pub epoch: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            recipe_id: None,
            dish: None,
            image: vec![],
            timestamp: None,
            ingredients: None,
            tools: None,
            instructions: None,
            questions: BTreeMap::new(),
            servings: MIN_SERVINGS,
            completed_steps: BTreeSet::new(),
            guards: StepGuards::default(),
            hydration: Hydration::default(),
            epoch: 0,
        }
    }
}

impl SessionState {
    /// An empty session that supersedes this one.
    pub fn next(&self) -> Self {
        Self {
            epoch: self.epoch + 1,
            ..Self::default()
        }
    }

    /// A replay session: nothing may be generated, one hydration is owed.
    pub fn for_replay(recipe_id: String) -> Self {
        Self {
            recipe_id: Some(recipe_id),
            guards: StepGuards::satisfied(),
            hydration: Hydration::Pending,
            ..Self::default()
        }
    }

    pub fn stage(&self) -> SessionStage {
        if matches!(
            self.hydration,
            Hydration::Pending | Hydration::Loading | Hydration::Failed
        ) {
            return SessionStage::PrefillLoading;
        }
        if self.dish.is_none() {
            return match self.guards.status(GenerationStep::Identify) {
                StepStatus::InFlight => SessionStage::Identifying,
                _ => SessionStage::Idle,
            };
        }
        if self.ingredients.is_none() {
            SessionStage::GeneratingIngredients
        } else if self.tools.is_none() {
            SessionStage::GeneratingTools
        } else if self.instructions.is_none() {
            SessionStage::GeneratingInstructions
        } else {
            SessionStage::Ready
        }
    }

    /// Populate every field from a stored record.
    pub fn hydrate_from(&mut self, record: RecipeRecord) {
        self.recipe_id = Some(record.id);
        self.dish = Some(Dish {
            name: record.name,
            confidence: record.confidence,
        });
        self.image = record.image;
        self.timestamp = Some(record.timestamp);
        self.ingredients = record.ingredients;
        self.tools = record.tools;
        self.instructions = record.instructions;
        self.questions = record.questions;
    }

    /// Ingredients as shown for the current number of servings.
    pub fn displayed_ingredients(&self) -> Vec<Ingredient> {
        self.ingredients
            .iter()
            .flatten()
            .map(|ingredient| ingredient.scaled(self.servings))
            .collect()
    }
}
