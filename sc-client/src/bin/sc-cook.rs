use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sc::basic_models::{Instruction, Unit};
use sc_client::config::Config;
use sc_client::errors::SessionResult;
use sc_client::model::{LanguageModel, OpenAiModel, ScriptedModel};
use sc_client::session::navigation::NavigationState;
use sc_client::session::notify::LogNotifier;
use sc_client::session::state::SessionStage;
use sc_client::session::timer::run_timer;
use sc_client::session::RecipeSession;
use sc_client::voice::{
    CommandSynthesizer, Interpreter, LogSynthesizer, SpeechSynthesizer, VoiceActions,
    VoiceControl,
};
use sc_store::{Database, MemoryStore, RecipeRepository, RecordStore};
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;

/// Photograph a dish, get a recipe, cook along
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<String>,
    /// Keep recipes in memory only
    #[arg(long)]
    ephemeral: bool,
    /// Answer prompts from a YAML script instead of a real model
    #[arg(long)]
    script: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Identify the dish in a photo and generate its recipe
    Identify { photo: String },
    /// Show a saved recipe, by id or by `recipe_id=..&is_prefill=1` query
    Show { recipe: String },
    /// List saved recipes, newest first
    History {
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Delete every saved recipe
    ClearHistory,
    /// Ask about one step of a saved recipe
    Ask {
        id: String,
        /// 1-based step number
        step: usize,
        question: Vec<String>,
    },
    /// Show ingredient amounts for a number of servings
    Servings { id: String, servings: i64 },
    /// Count down the cooking time of a step
    Timer {
        id: String,
        /// 1-based step number
        step: usize,
    },
    /// Voice control over a saved recipe; each line on stdin is one utterance
    Voice { id: String },
}

/// Voice actions for a terminal: scrolling prints the step.
struct TerminalActions(Arc<RecipeSession>);

#[async_trait::async_trait]
impl VoiceActions for TerminalActions {
    fn scroll_to(&self, step: usize) {
        if let Some(instruction) = self.0.instruction(step) {
            println!("-> {}", format_step(step, &instruction));
        }
    }

    fn step(&self, step: usize) -> Option<Instruction> {
        self.0.instruction(step)
    }

    fn mark_complete(&self, step: usize) -> SessionResult<()> {
        self.0.mark_step_complete(step)
    }

    async fn ask_question(&self, step: usize, question: &str) -> SessionResult<String> {
        self.0.ask_question(step, question).await
    }
}

fn format_step(index: usize, instruction: &Instruction) -> String {
    format!(
        "Step {}: {} ({} min)\n   {}",
        index + 1,
        instruction.step,
        instruction.time,
        instruction.description
    )
}

fn format_unit(unit: &Unit) -> String {
    format!("{} {} {}", unit.quantity, unit.unit, unit.name)
}

fn print_recipe(session: &RecipeSession) {
    let state = session.snapshot();
    let Some(dish) = &state.dish else {
        println!("No recipe.");
        return;
    };
    println!("{} ({}% match)", dish.name, dish.confidence);
    if let Some(id) = &state.recipe_id {
        println!("Recipe id: {}", id);
    }
    println!("\nIngredients for {} serving(s):", state.servings);
    for ingredient in state.displayed_ingredients() {
        println!("  - {}", format_unit(&ingredient));
    }
    println!("\nTools:");
    for tool in state.tools.iter().flatten() {
        println!("  - {}", format_unit(tool));
    }
    println!("\nInstructions:");
    for (index, instruction) in state.instructions.iter().flatten().enumerate() {
        println!("{}", format_step(index, instruction));
        for question in state.questions.get(&index).into_iter().flatten() {
            println!("   Q: {}\n   A: {}", question.text, question.answer);
        }
    }
}

/// A session replaying a saved recipe, already hydrated.
async fn replay(
    model: Arc<dyn LanguageModel>,
    repository: RecipeRepository,
    navigation: NavigationState,
) -> Result<Arc<RecipeSession>> {
    let session = Arc::new(RecipeSession::new(
        model,
        repository,
        Arc::new(LogNotifier),
        navigation,
    ));
    session.hydrate().await?;
    Ok(session)
}

fn step_index(step: usize) -> Result<usize> {
    if step == 0 {
        bail!("Steps are numbered from 1");
    }
    Ok(step - 1)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("Failed to read {}", path))?,
        None => Config::default(),
    };

    let model: Arc<dyn LanguageModel> = match &args.script {
        Some(path) => Arc::new(
            ScriptedModel::load(path).with_context(|| format!("Failed to read {}", path))?,
        ),
        None => Arc::new(OpenAiModel::from_config(&config.model)),
    };
    let store: Arc<dyn RecordStore> = if args.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(Database::connect(&config.store.path)?)
    };
    let repository = RecipeRepository::new(store);

    match args.command {
        Command::Identify { photo } => {
            let bytes = std::fs::read(&photo).with_context(|| format!("Failed to read {}", photo))?;
            let session = RecipeSession::new(
                model,
                repository,
                Arc::new(LogNotifier),
                NavigationState::default(),
            );
            session.submit_photo(&bytes).await?;
            let stage = session.drive().await;
            print_recipe(&session);
            if stage != SessionStage::Ready {
                bail!("Recipe is incomplete, stopped while {}", stage);
            }
            if let Some(id) = session.navigation().recipe_id {
                println!("\nReplay with: ?{}", NavigationState::replay(id).to_query());
            }
        }
        Command::Show { recipe } => {
            let navigation = if recipe.contains('=') {
                NavigationState::from_query(&recipe)
            } else {
                NavigationState::replay(recipe)
            };
            if !navigation.is_prefill {
                bail!("Only saved recipes can be shown; add is_prefill=1");
            }
            let session = replay(model, repository, navigation).await?;
            print_recipe(&session);
        }
        Command::History { search } => {
            let session = RecipeSession::new(
                model,
                repository,
                Arc::new(LogNotifier),
                NavigationState::default(),
            );
            for entry in session.history(search.as_deref()).await? {
                println!("{}  {}  {}", entry.timestamp, entry.id, entry.name);
            }
        }
        Command::ClearHistory => {
            let session = RecipeSession::new(
                model,
                repository,
                Arc::new(LogNotifier),
                NavigationState::default(),
            );
            session.clear_history().await?;
        }
        Command::Ask { id, step, question } => {
            let question = question.join(" ");
            if question.trim().is_empty() {
                bail!("Ask a question");
            }
            let session = replay(model, repository, NavigationState::replay(id)).await?;
            let answer = session.ask_question(step_index(step)?, &question).await?;
            println!("{}", answer);
        }
        Command::Servings { id, servings } => {
            let session = replay(model, repository, NavigationState::replay(id)).await?;
            let servings = session.adjust_servings(servings);
            println!("Ingredients for {} serving(s):", servings);
            for ingredient in session.displayed_ingredients() {
                println!("  - {}", format_unit(&ingredient));
            }
        }
        Command::Timer { id, step } => {
            let session = replay(model, repository, NavigationState::replay(id)).await?;
            let timer = session.timer_for(step_index(step)?)?;
            println!("Timer for step {}: {}", step, timer.format_remaining());
            run_timer(timer, &LogNotifier, |timer| {
                print!("\r{} ", timer.format_remaining());
                let _ = std::io::stdout().flush();
            })
            .await;
            println!();
        }
        Command::Voice { id } => {
            let session = replay(model, repository, NavigationState::replay(id)).await?;
            print_recipe(&session);
            let synth: Arc<dyn SpeechSynthesizer> = match &config.voice.tts_command {
                Some(command) => Arc::new(CommandSynthesizer::new(command)?),
                None => Arc::new(LogSynthesizer),
            };
            let interpreter = Interpreter::new(
                Arc::new(TerminalActions(session.clone())),
                synth,
                &config.voice,
            );
            let mut control = VoiceControl::new(interpreter, Arc::new(LogNotifier));
            let (transcripts, receiver) = tokio::sync::mpsc::unbounded_channel();
            control.activate(receiver);

            let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                if transcripts.send(line).is_err() {
                    break;
                }
            }
            // End of input: let the queued utterances play out.
            drop(transcripts);
            control.finish().await;
        }
    }

    Ok(())
}
