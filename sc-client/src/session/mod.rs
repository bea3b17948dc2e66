//! The recipe session: one photo, one dish, and everything generated for it.

pub mod navigation;
pub mod notify;
pub mod state;
pub mod timer;

use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use sc::basic_models::{Ingredient, Instruction, Question, RecipeRecord, RecipeSummary};
use sc_store::{RecipePatch, RecipeRepository};
use uuid::Uuid;

use crate::errors::{SessionError, SessionResult};
use crate::generation::prompts::{
    identify_dish_prompt, ingredient_list_prompt, instructions_prompt, step_question_prompt,
    tool_list_prompt, StepQuestion,
};
use crate::generation::replies::{
    parse_answer, parse_identification, parse_instructions, parse_units,
};
use crate::model::{prompt_once, LanguageModel, PromptInput};
use crate::photo::prepare_photo;

use navigation::NavigationState;
use notify::{Notice, Notifier};
use state::{
    Dish, GenerationStep, Hydration, Outcome, SessionStage, SessionState, StepGuards,
    StepStatus, MAX_SERVINGS, MIN_SERVINGS,
};
use timer::CountdownTimer;

/// Who asked for a generation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// Re-evaluation of the session's own conditions. Never retries.
    Automatic,
    /// The user asked. A failed step may run again.
    Requested,
}

impl Trigger {
    fn allows_retry(self) -> bool {
        self == Trigger::Requested
    }

    fn claim(self, guards: &mut StepGuards, step: GenerationStep) -> bool {
        match self {
            Trigger::Automatic => guards.claim_fresh(step),
            Trigger::Requested => guards.claim(step),
        }
    }
}

pub struct RecipeSession {
    model: Arc<dyn LanguageModel>,
    repository: RecipeRepository,
    notifier: Arc<dyn Notifier>,
    state: Mutex<SessionState>,
    navigation: Mutex<NavigationState>,
    // Serialises question writes so each persists the latest map.
    question_writes: tokio::sync::Mutex<()>,
}

impl RecipeSession {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        repository: RecipeRepository,
        notifier: Arc<dyn Notifier>,
        navigation: NavigationState,
    ) -> Self {
        let state = match (&navigation.recipe_id, navigation.is_prefill) {
            (Some(id), true) => SessionState::for_replay(id.clone()),
            (None, true) => {
                tracing::warn!("Replay requested without a recipe id, starting empty");
                SessionState::default()
            }
            _ => SessionState::default(),
        };
        Self {
            model,
            repository,
            notifier,
            state: Mutex::new(state),
            navigation: Mutex::new(navigation),
            question_writes: tokio::sync::Mutex::new(()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_navigation(&self) -> MutexGuard<'_, NavigationState> {
        self.navigation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log a failure, tell the user about it, and hand it back.
    fn report(&self, action: impl Display, err: SessionError) -> SessionError {
        tracing::warn!("{} failed: {}", action, err);
        self.notifier.notify(Notice::error(
            err.title(),
            format!("{action} failed: {err}"),
        ));
        err
    }

    pub fn stage(&self) -> SessionStage {
        self.lock_state().stage()
    }

    pub fn snapshot(&self) -> SessionState {
        self.lock_state().clone()
    }

    pub fn navigation(&self) -> NavigationState {
        self.lock_navigation().clone()
    }

    /// Start a new recipe from a photo: identify the dish and store the record.
    pub async fn submit_photo(&self, photo: &[u8]) -> SessionResult<Outcome> {
        let step = GenerationStep::Identify;
        let image = prepare_photo(photo)
            .map_err(|e| self.report("Reading the photo", SessionError::InvalidPhoto(e)))?;

        let epoch = {
            let mut state = self.lock_state();
            if state.guards.status(step) == StepStatus::InFlight {
                return Ok(Outcome::AlreadyTriggered);
            }
            *state = state.next();
            state.guards.claim(step);
            state.epoch
        };
        *self.lock_navigation() = NavigationState::default();

        tracing::info!("Identifying dish from a {} byte photo", image.len());
        let input = PromptInput::WithImage {
            text: identify_dish_prompt(),
            image: image.clone(),
        };
        let reply = prompt_once(self.model.as_ref(), input)
            .await
            .and_then(|raw| {
                parse_identification(&raw).ok_or(SessionError::MalformedResponse(step.into()))
            });
        let guess = match reply {
            Ok(guess) => guess,
            Err(e) => {
                self.settle_failure(step, epoch);
                return Err(self.report(format!("The {step}"), e));
            }
        };

        let record = RecipeRecord::new(
            Uuid::new_v4().to_string(),
            guess.dish_name,
            guess.match_percentage,
            image,
            Utc::now().to_rfc3339(),
        );
        if self.lock_state().epoch != epoch {
            tracing::debug!("Dropping identification for an abandoned session");
            return Ok(Outcome::Superseded);
        }

        // The record must exist before any generated field can be merged into it,
        // so the dish only becomes visible to the other steps once it is stored.
        let saved = self.repository.create_recipe(&record).await;
        {
            let mut state = self.lock_state();
            if state.epoch != epoch {
                tracing::debug!("Dropping identification for an abandoned session");
                return Ok(Outcome::Superseded);
            }
            state.recipe_id = saved.is_ok().then(|| record.id.clone());
            state.dish = Some(Dish {
                name: record.name.clone(),
                confidence: record.confidence,
            });
            state.image = record.image.clone();
            state.timestamp = Some(record.timestamp.clone());
            state.guards.finish(step, true);
        }
        tracing::info!(
            "Identified {} ({}% match) as recipe {}",
            record.name,
            record.confidence,
            record.id
        );
        match saved {
            Ok(_) => {
                *self.lock_navigation() = NavigationState::fresh(record.id);
                Ok(Outcome::Generated)
            }
            Err(e) => Err(self.report("Saving the recipe", e.into())),
        }
    }

    /// Generate the ingredient list for `dish_name`, which must be the
    /// identified dish.
    pub async fn request_ingredients(&self, dish_name: &str) -> SessionResult<Outcome> {
        self.generate_ingredients(Some(dish_name), Trigger::Requested).await
    }

    pub async fn request_tools(&self, dish_name: &str) -> SessionResult<Outcome> {
        self.generate_tools(Some(dish_name), Trigger::Requested).await
    }

    pub async fn request_instructions(&self, dish_name: &str) -> SessionResult<Outcome> {
        self.generate_instructions(Some(dish_name), Trigger::Requested).await
    }

    async fn generate_ingredients(&self, requested: Option<&str>, trigger: Trigger) -> SessionResult<Outcome> {
        let step = GenerationStep::Ingredients;
        self.generate(
            step,
            trigger,
            |state| Ok(ingredient_list_prompt(&require_dish(state, step, requested)?.name)),
            parse_units,
            |state, items| {
                state.ingredients = Some(items.clone());
                RecipePatch::Ingredients(items)
            },
        )
        .await
    }

    async fn generate_tools(&self, requested: Option<&str>, trigger: Trigger) -> SessionResult<Outcome> {
        let step = GenerationStep::Tools;
        self.generate(
            step,
            trigger,
            |state| Ok(tool_list_prompt(&require_dish(state, step, requested)?.name)),
            parse_units,
            |state, items| {
                state.tools = Some(items.clone());
                RecipePatch::Tools(items)
            },
        )
        .await
    }

    async fn generate_instructions(&self, requested: Option<&str>, trigger: Trigger) -> SessionResult<Outcome> {
        let step = GenerationStep::Instructions;
        self.generate(
            step,
            trigger,
            |state| {
                let dish = require_dish(state, step, requested)?;
                let names: Vec<String> = state
                    .ingredients
                    .as_ref()
                    .ok_or(SessionError::MissingPrerequisite(step.into(), "the ingredient list"))?
                    .iter()
                    .map(|ingredient| ingredient.name.clone())
                    .collect();
                Ok(instructions_prompt(&dish.name, &names))
            },
            parse_instructions,
            |state, steps| {
                state.instructions = Some(steps.clone());
                RecipePatch::Instructions(steps)
            },
        )
        .await
    }

    /// Run one generation step at most once per claim: build its prompt from
    /// the current state, ask the model, apply the parsed reply in memory and
    /// then persist just that field.
    async fn generate<T, P, A>(
        &self,
        step: GenerationStep,
        trigger: Trigger,
        prepare: P,
        parse: fn(&str) -> Option<T>,
        apply: A,
    ) -> SessionResult<Outcome>
    where
        T: Send,
        P: FnOnce(&SessionState) -> SessionResult<String> + Send,
        A: FnOnce(&mut SessionState, T) -> RecipePatch + Send,
    {
        let claimed = {
            let mut state = self.lock_state();
            if !state.guards.can_claim(step, trigger.allows_retry()) {
                None
            } else {
                let prompt = prepare(&*state);
                if prompt.is_ok() {
                    trigger.claim(&mut state.guards, step);
                }
                Some((prompt, state.epoch))
            }
        };
        let (prompt, epoch) = match claimed {
            None => {
                tracing::debug!("The {} was already triggered", step);
                return Ok(Outcome::AlreadyTriggered);
            }
            Some((Err(e), _)) => return Err(self.report(format!("The {step}"), e)),
            Some((Ok(prompt), epoch)) => (prompt, epoch),
        };

        tracing::info!("Generating the {}", step);
        let reply = prompt_once(self.model.as_ref(), PromptInput::Text(prompt))
            .await
            .and_then(|raw| parse(&raw).ok_or(SessionError::MalformedResponse(step.into())));
        let value = match reply {
            Ok(value) => value,
            Err(e) => {
                self.settle_failure(step, epoch);
                return Err(self.report(format!("The {step}"), e));
            }
        };

        let (recipe_id, patch) = {
            let mut state = self.lock_state();
            if state.epoch != epoch {
                tracing::debug!("Dropping the {} for an abandoned session", step);
                return Ok(Outcome::Superseded);
            }
            let patch = apply(&mut *state, value);
            state.guards.finish(step, true);
            (state.recipe_id.clone(), patch)
        };

        match recipe_id {
            Some(id) => self
                .repository
                .patch(&id, patch)
                .await
                .map_err(|e| self.report(format!("Saving the {step}"), e.into()))?,
            None => tracing::warn!("The {} has no recipe to be saved to", step),
        }
        Ok(Outcome::Generated)
    }

    fn settle_failure(&self, step: GenerationStep, epoch: u64) {
        let mut state = self.lock_state();
        if state.epoch == epoch {
            state.guards.finish(step, false);
        }
    }

    /// Re-evaluate every trigger against the current state and run whatever
    /// is due. Safe to call as often as the state changes: each step reaches
    /// the model at most once, and a failed step waits for an explicit request.
    /// Failures are reported through the notifier.
    pub async fn drive(&self) -> SessionStage {
        let (hydration, has_dish) = {
            let state = self.lock_state();
            (state.hydration, state.dish.is_some())
        };
        if hydration == Hydration::Pending {
            let _ = self.hydrate().await;
            return self.stage();
        }
        if !has_dish {
            return self.stage();
        }

        let _ = self.generate_ingredients(None, Trigger::Automatic).await;
        let has_ingredients = self.lock_state().ingredients.is_some();
        if has_ingredients {
            let _ = tokio::join!(
                self.generate_tools(None, Trigger::Automatic),
                self.generate_instructions(None, Trigger::Automatic),
            );
        }
        self.stage()
    }

    /// Populate the session from the stored record being replayed. Runs once.
    pub async fn hydrate(&self) -> SessionResult<Outcome> {
        let (id, epoch) = {
            let mut state = self.lock_state();
            if state.hydration != Hydration::Pending {
                return Ok(Outcome::AlreadyTriggered);
            }
            state.hydration = Hydration::Loading;
            (state.recipe_id.clone().unwrap_or_default(), state.epoch)
        };

        let loaded = match self.repository.get_recipe(&id).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(SessionError::NotFound(id.clone())),
            Err(e) => Err(e.into()),
        };

        let mut state = self.lock_state();
        if state.epoch != epoch {
            return Ok(Outcome::Superseded);
        }
        match loaded {
            Ok(record) => {
                tracing::info!("Loaded {} from history", record.name);
                state.hydrate_from(record);
                state.hydration = Hydration::Done;
                Ok(Outcome::Generated)
            }
            Err(e) => {
                state.hydration = Hydration::Failed;
                drop(state);
                Err(self.report("Loading the recipe", e))
            }
        }
    }

    /// Ask the model about one step (0-based) and keep the answer with the recipe.
    pub async fn ask_question(&self, step: usize, question: &str) -> SessionResult<String> {
        let (dish_name, instruction, epoch) = {
            let state = self.lock_state();
            (
                state.dish.as_ref().map(|dish| dish.name.clone()),
                state
                    .instructions
                    .as_ref()
                    .and_then(|steps| steps.get(step).cloned()),
                state.epoch,
            )
        };
        let Some(instruction) = instruction else {
            return Err(self.report("Asking a question", SessionError::NoSuchStep(step + 1)));
        };
        let dish_name = dish_name.unwrap_or_default();

        let prompt = step_question_prompt(&StepQuestion {
            dish_name: &dish_name,
            step_title: &instruction.step,
            step_description: &instruction.description,
            question,
        });
        let answer = prompt_once(self.model.as_ref(), PromptInput::Text(prompt))
            .await
            .and_then(|raw| parse_answer(&raw).ok_or(SessionError::MalformedResponse("step question")))
            .map_err(|e| self.report("Asking a question", e))?;

        let _write = self.question_writes.lock().await;
        let (recipe_id, questions) = {
            let mut state = self.lock_state();
            if state.epoch != epoch {
                return Ok(answer);
            }
            state.questions.entry(step).or_default().push(Question {
                text: question.to_string(),
                answer: answer.clone(),
            });
            (state.recipe_id.clone(), state.questions.clone())
        };
        if let Some(id) = recipe_id {
            self.repository
                .patch(&id, RecipePatch::Questions(questions))
                .await
                .map_err(|e| self.report("Saving the question", e.into()))?;
        }
        Ok(answer)
    }

    /// Set the number of servings, clamped to what the page offers. Returns
    /// the value applied.
    pub fn adjust_servings(&self, servings: i64) -> u32 {
        let clamped = servings.clamp(i64::from(MIN_SERVINGS), i64::from(MAX_SERVINGS)) as u32;
        self.lock_state().servings = clamped;
        clamped
    }

    pub fn displayed_ingredients(&self) -> Vec<Ingredient> {
        self.lock_state().displayed_ingredients()
    }

    pub fn instruction(&self, step: usize) -> Option<Instruction> {
        self.lock_state()
            .instructions
            .as_ref()
            .and_then(|steps| steps.get(step).cloned())
    }

    fn check_step(state: &SessionState, step: usize) -> SessionResult<()> {
        let count = state.instructions.as_ref().map_or(0, Vec::len);
        if step < count {
            Ok(())
        } else {
            Err(SessionError::NoSuchStep(step + 1))
        }
    }

    /// Flip a step's completion. Returns whether it is now complete.
    pub fn toggle_step_complete(&self, step: usize) -> SessionResult<bool> {
        let mut state = self.lock_state();
        Self::check_step(&state, step)?;
        if !state.completed_steps.remove(&step) {
            state.completed_steps.insert(step);
        }
        Ok(state.completed_steps.contains(&step))
    }

    pub fn mark_step_complete(&self, step: usize) -> SessionResult<()> {
        let mut state = self.lock_state();
        Self::check_step(&state, step)?;
        state.completed_steps.insert(step);
        Ok(())
    }

    pub fn is_step_complete(&self, step: usize) -> bool {
        self.lock_state().completed_steps.contains(&step)
    }

    /// A fresh countdown for a step, sized by its cooking time.
    pub fn timer_for(&self, step: usize) -> SessionResult<CountdownTimer> {
        let instruction = self.instruction(step).ok_or(SessionError::NoSuchStep(step + 1))?;
        Ok(CountdownTimer::new(step + 1, instruction.time))
    }

    /// Stored recipes, newest first, optionally filtered by name.
    pub async fn history(&self, search: Option<&str>) -> SessionResult<Vec<RecipeSummary>> {
        let entries = self
            .repository
            .list_history()
            .await
            .map_err(|e| self.report("Loading history", e.into()))?;
        let needle = search.map(str::trim).unwrap_or_default().to_lowercase();
        Ok(entries
            .into_iter()
            .filter(|entry| needle.is_empty() || entry.name.to_lowercase().contains(&needle))
            .collect())
    }

    pub async fn clear_history(&self) -> SessionResult<()> {
        self.repository
            .erase_history()
            .await
            .map_err(|e| self.report("Clearing history", e.into()))?;
        tracing::info!("History cleared");
        self.notifier
            .notify(Notice::info("History cleared", "All saved recipes were removed."));
        Ok(())
    }

    /// Point navigation at a stored recipe for replay. A session opened with
    /// the returned state hydrates it instead of generating.
    pub fn select_history_entry(&self, id: &str) -> NavigationState {
        let navigation = NavigationState::replay(id);
        *self.lock_navigation() = navigation.clone();
        navigation
    }

    /// Forget the current recipe. Replies still in flight for it are dropped.
    pub fn reset(&self) {
        {
            let mut state = self.lock_state();
            *state = state.next();
        }
        *self.lock_navigation() = NavigationState::default();
    }
}

/// The identified dish, which a caller naming a dish must agree with.
fn require_dish<'a>(
    state: &'a SessionState,
    step: GenerationStep,
    requested: Option<&str>,
) -> SessionResult<&'a Dish> {
    let dish = state.dish.as_ref().ok_or(SessionError::MissingPrerequisite(
        step.into(),
        "an identified dish",
    ))?;
    match requested {
        Some(name) if !name.trim().eq_ignore_ascii_case(&dish.name) => {
            Err(SessionError::DishMismatch {
                requested: name.trim().to_string(),
                identified: dish.name.clone(),
            })
        }
        _ => Ok(dish),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScriptedModel;
    use super::notify::{ChannelNotifier, NoticeLevel};
    use sc_store::MemoryStore;

    const INGREDIENTS: &str = r#"[{"name":"Chicken","quantity":0.5,"unit":"kilogram","confidence":95}]"#;
    const TOOLS: &str = r#"[{"name":"Pot","quantity":1,"unit":"piece","confidence":"90%"}]"#;
    const STEPS: &str = r#"[{"step":"Boil","description":"Boil the chicken.","time":20}]"#;

    fn photo() -> Vec<u8> {
        let img = image::DynamicImage::new_rgb8(8, 8);
        let mut bytes = std::io::Cursor::new(vec![]);
        img.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    fn session(model: &ScriptedModel) -> (RecipeSession, tokio::sync::mpsc::UnboundedReceiver<Notice>) {
        let (notifier, notices) = ChannelNotifier::new();
        let repository = RecipeRepository::new(Arc::new(MemoryStore::new()));
        let session = RecipeSession::new(
            Arc::new(model.clone()),
            repository,
            Arc::new(notifier),
            NavigationState::default(),
        );
        (session, notices)
    }

    #[tokio::test]
    async fn test_servings_are_clamped() {
        let (session, _) = session(&ScriptedModel::default());
        assert_eq!(session.adjust_servings(0), 1);
        assert_eq!(session.adjust_servings(-3), 1);
        assert_eq!(session.adjust_servings(4), 4);
        assert_eq!(session.adjust_servings(11), 10);
        assert_eq!(session.snapshot().servings, 10);
    }

    #[tokio::test]
    async fn test_ingredients_need_a_dish() {
        let model = ScriptedModel::new([INGREDIENTS]);
        let (session, mut notices) = session(&model);
        let err = session.request_ingredients("Soto Ayam").await.unwrap_err();
        assert!(matches!(err, SessionError::MissingPrerequisite(..)));
        assert!(model.prompts().is_empty());
        assert_eq!(notices.try_recv().unwrap().level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn test_requests_name_the_identified_dish() {
        let model = ScriptedModel::default()
            .on("photo of a single prepared dish", r#"{"dish_name":"Soto Ayam","match_percentage":92}"#)
            .on("core ingredients", INGREDIENTS);
        let (session, mut notices) = session(&model);
        session.submit_photo(&photo()).await.unwrap();

        let err = session.request_ingredients("Rendang").await.unwrap_err();
        assert!(matches!(
            &err,
            SessionError::DishMismatch { requested, identified }
                if requested == "Rendang" && identified == "Soto Ayam"
        ));
        assert_eq!(notices.try_recv().unwrap().title, "Different dish");
        assert_eq!(model.prompt_count("core ingredients"), 0);

        assert_eq!(
            session.request_ingredients("soto ayam").await.unwrap(),
            Outcome::Generated
        );
        let prompt = model.prompts().pop().unwrap();
        assert!(prompt.text().contains("\"Soto Ayam\""));
    }

    #[tokio::test]
    async fn test_failed_step_waits_for_explicit_retry() {
        let model = ScriptedModel::default()
            .on("photo of a single prepared dish", r#"{"dish_name":"Soto Ayam","match_percentage":92}"#)
            .on("core ingredients", "I am not sure")
            .on("core ingredients", INGREDIENTS);
        let (session, mut notices) = session(&model);
        session.submit_photo(&photo()).await.unwrap();

        assert_eq!(session.drive().await, SessionStage::GeneratingIngredients);
        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.title, "Unexpected answer");
        assert!(notice.description.contains("ingredient list"));

        // Re-evaluation alone does not retry.
        session.drive().await;
        assert_eq!(model.prompt_count("core ingredients"), 1);

        assert_eq!(
            session.request_ingredients("Soto Ayam").await.unwrap(),
            Outcome::Generated
        );
        assert_eq!(model.prompt_count("core ingredients"), 2);
        assert_eq!(session.displayed_ingredients()[0].name, "Chicken");
    }

    #[tokio::test]
    async fn test_step_completion_and_timers() {
        let model = ScriptedModel::default()
            .on("photo of a single prepared dish", r#"{"dish_name":"Soto Ayam","match_percentage":92}"#)
            .on("core ingredients", INGREDIENTS)
            .on("cooking and serving tools", TOOLS)
            .on("step-by-step cooking guide", STEPS);
        let (session, _) = session(&model);
        session.submit_photo(&photo()).await.unwrap();
        assert_eq!(session.drive().await, SessionStage::Ready);

        assert!(session.toggle_step_complete(0).unwrap());
        assert!(!session.toggle_step_complete(0).unwrap());
        session.mark_step_complete(0).unwrap();
        session.mark_step_complete(0).unwrap();
        assert!(session.is_step_complete(0));
        assert!(matches!(
            session.toggle_step_complete(1),
            Err(SessionError::NoSuchStep(2))
        ));

        let timer = session.timer_for(0).unwrap();
        assert_eq!(timer.format_remaining(), "20:00");
    }

    #[tokio::test]
    async fn test_reset_forgets_the_recipe() {
        let model = ScriptedModel::default()
            .on("photo of a single prepared dish", r#"{"dish_name":"Soto Ayam","match_percentage":92}"#)
            .on("core ingredients", INGREDIENTS);
        let (session, _) = session(&model);
        session.submit_photo(&photo()).await.unwrap();
        let before = session.snapshot().epoch;

        session.reset();
        assert_eq!(session.stage(), SessionStage::Idle);
        assert_eq!(session.navigation(), NavigationState::default());
        assert_eq!(session.snapshot().epoch, before + 1);
        assert!(matches!(
            session.request_ingredients("Soto Ayam").await,
            Err(SessionError::MissingPrerequisite(..))
        ));
        assert_eq!(model.prompt_count("core ingredients"), 0);
    }

    #[tokio::test]
    async fn test_history_search_is_case_insensitive() {
        let model = ScriptedModel::default()
            .on("photo of a single prepared dish", r#"{"dish_name":"Soto Ayam","match_percentage":92}"#);
        let (session, _) = session(&model);
        session.submit_photo(&photo()).await.unwrap();

        assert_eq!(session.history(Some("soto")).await.unwrap().len(), 1);
        assert!(session.history(Some("rendang")).await.unwrap().is_empty());
        session.clear_history().await.unwrap();
        assert!(session.history(None).await.unwrap().is_empty());
    }
}
