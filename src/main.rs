//! twenty-q CLI: seed the catalogue and play games in the terminal.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde::Deserialize;

use twenty_q::config::EngineConfig;
use twenty_q::engine::{AnswerOutcome, GameEngine};
use twenty_q::model::{Answer, AttributeValue, NewEntity, Question};
use twenty_q::paths::TqPaths;

#[derive(Parser)]
#[command(name = "twenty-q", version, about = "Adaptive twenty-questions engine")]
struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/twenty-q/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for the durable store (overrides the config file).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and create the database.
    Init,

    /// Load entities and questions from a JSON file.
    Import {
        /// Path to a JSON file with `entities` and `questions` arrays.
        #[arg(long)]
        file: PathBuf,
    },

    /// Play a game in the terminal.
    Play,

    /// Show learning statistics.
    Stats,

    /// List the question catalogue.
    Questions,

    /// List the entity catalogue.
    Entities,
}

/// Seed file layout.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ImportFile {
    entities: Vec<ImportEntity>,
    questions: Vec<ImportQuestion>,
}

#[derive(Debug, Deserialize)]
struct ImportEntity {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    attributes: BTreeMap<String, i8>,
}

#[derive(Debug, Deserialize)]
struct ImportQuestion {
    text: String,
    attribute_key: String,
}

impl ImportEntity {
    fn into_new_entity(self) -> NewEntity {
        let mut entity = NewEntity::named(self.name);
        entity.description = self.description;
        entity.image_url = self.image_url;
        for (key, value) in &self.attributes {
            if !(-2..=2).contains(value) {
                tracing::warn!(entity = %entity.name, key = %key, value, "attribute value out of range, skipped");
                continue;
            }
            entity = entity.with(key, *value);
        }
        entity
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let paths = TqPaths::resolve()?;
    let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file());
    let mut config = EngineConfig::load_or_default(&config_path)?;
    // The CLI always persists; fall back to the XDG data directory.
    config.data_dir = cli
        .data_dir
        .clone()
        .or(config.data_dir)
        .or_else(|| Some(paths.data_dir.clone()));

    match cli.command {
        Commands::Init => {
            if let Some(dir) = &config.data_dir {
                std::fs::create_dir_all(dir).into_diagnostic()?;
            }
            if !config_path.exists() {
                config.save(&config_path)?;
                println!("Wrote config to {}", config_path.display());
            }
            let engine = GameEngine::new(config)?;
            println!("{}", engine.info()?);
        }

        Commands::Import { file } => {
            let engine = GameEngine::new(config)?;
            import(&engine, &file)?;
            println!("{}", engine.info()?);
        }

        Commands::Play => {
            let engine = GameEngine::new(config)?;
            play(&engine)?;
        }

        Commands::Stats => {
            let engine = GameEngine::new(config)?;
            let stats = engine.stats()?;
            println!("Games played:    {}", stats.total_games);
            println!("Successful:      {}", stats.successful_games);
            println!("Success rate:    {:.2}%", stats.success_rate);
            println!("Avg questions:   {:.1}", stats.avg_questions);
            println!("Entities:        {}", stats.total_entities);
            println!("Questions:       {}", stats.total_questions);
            if !stats.top_entities.is_empty() {
                println!("\nMost played:");
                for e in &stats.top_entities {
                    println!(
                        "  {:<24} played {:>4}  guessed {:>5.1}%",
                        e.name, e.times_played, e.guess_rate
                    );
                }
            }
            if !stats.top_questions.is_empty() {
                println!("\nMost effective questions:");
                for q in &stats.top_questions {
                    println!("  {:>5.2}  {} (asked {})", q.effectiveness, q.text, q.times_asked);
                }
            }
        }

        Commands::Questions => {
            let engine = GameEngine::new(config)?;
            let questions = engine.store().questions()?;
            if questions.is_empty() {
                println!("No questions. Run `twenty-q import --file <json>` first.");
            }
            for q in &questions {
                println!(
                    "{:<6} {:<40} key={:<20} asked={:<4} eff={:.3}",
                    q.id.to_string(),
                    q.text,
                    q.attribute_key,
                    q.times_asked,
                    q.effectiveness_score
                );
            }
        }

        Commands::Entities => {
            let engine = GameEngine::new(config)?;
            let entities = engine.store().entities()?;
            if entities.is_empty() {
                println!("No entities. Run `twenty-q import --file <json>` first.");
            }
            for e in &entities {
                println!(
                    "{:<12} {:<24} played={:<4} guessed={}",
                    e.id.to_string(),
                    e.name,
                    e.times_played,
                    e.times_guessed
                );
            }
        }
    }

    Ok(())
}

fn import(engine: &GameEngine, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file).into_diagnostic()?;
    let seed: ImportFile = serde_json::from_str(&content).into_diagnostic()?;
    let store = engine.store();

    let (mut entities_new, mut entities_skipped) = (0, 0);
    for entity in seed.entities {
        let (_, created) = store.insert_entity(entity.into_new_entity())?;
        if created {
            entities_new += 1;
        } else {
            entities_skipped += 1;
        }
    }

    let (mut questions_new, mut questions_skipped) = (0, 0);
    for q in seed.questions {
        let (_, created) = store.insert_question(&q.text, &q.attribute_key)?;
        if created {
            questions_new += 1;
        } else {
            questions_skipped += 1;
        }
    }

    println!(
        "Imported {entities_new} entities ({entities_skipped} already present), \
         {questions_new} questions ({questions_skipped} already present) from {}",
        file.display()
    );
    Ok(())
}

fn parse_answer(input: &str) -> Option<Answer> {
    match input {
        "y" => Some(Answer::Yes),
        "py" => Some(Answer::ProbablyYes),
        "?" | "d" => Some(Answer::DontKnow),
        "pn" => Some(Answer::ProbablyNo),
        "n" => Some(Answer::No),
        other => other.parse().ok(),
    }
}

fn prompt(out: &mut impl Write, text: &str) -> Result<()> {
    write!(out, "{text}").into_diagnostic()?;
    out.flush().into_diagnostic()
}

/// Offer to add the entity the engine missed, described by the game's answers.
fn teach(
    engine: &GameEngine,
    lines: &mut impl Iterator<Item = std::io::Result<String>>,
    out: &mut impl Write,
    answers: &BTreeMap<String, AttributeValue>,
) -> Result<()> {
    prompt(out, "What were you thinking of? (leave empty to skip) ")?;
    let name = match lines.next() {
        Some(line) => line.into_diagnostic()?,
        None => return Ok(()),
    };
    let name = name.trim();
    if name.is_empty() {
        return Ok(());
    }
    prompt(out, "Describe it in a few words (optional): ")?;
    let description = match lines.next() {
        Some(line) => line.into_diagnostic()?.trim().to_string(),
        None => String::new(),
    };

    let mut entity = NewEntity::named(name).with_answers(answers);
    if !description.is_empty() {
        entity.description = Some(description);
    }
    let (_, created) = engine.add_entity(entity)?;
    if created {
        println!("Thanks! I'll remember {name} ({} attributes).", answers.len());
    } else {
        println!("I already know {name}; I'll ask better questions next time.");
    }
    Ok(())
}

fn play(engine: &GameEngine) -> Result<()> {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    let mut out = std::io::stdout();

    let start = engine.start()?;
    let session_id = start.session_id;
    let mut question: Question = start.question;
    println!("Think of something. Answer with y / py / ? / pn / n (or q to quit).\n");

    loop {
        prompt(&mut out, &format!("{} ", question.text))?;
        let Some(line) = lines.next() else {
            engine.abandon(&session_id)?;
            return Ok(());
        };
        let line = line.into_diagnostic()?;
        let input = line.trim().to_lowercase();
        if input == "q" {
            engine.abandon(&session_id)?;
            println!("Bye.");
            return Ok(());
        }
        let Some(answer) = parse_answer(&input) else {
            println!("  please answer y, py, ?, pn or n");
            continue;
        };

        match engine.answer(&session_id, question.id, answer)? {
            AnswerOutcome::Question {
                question: next,
                progress,
                ..
            } => {
                tracing::debug!(progress, "next question");
                question = next;
            }
            AnswerOutcome::Guess {
                entity,
                question_count,
                ..
            } => {
                prompt(
                    &mut out,
                    &format!("\nAfter {question_count} questions: is it {}? [y/n] ", entity.name),
                )?;
                let reply = match lines.next() {
                    Some(line) => line.into_diagnostic()?,
                    None => String::new(),
                };
                let correct = matches!(reply.trim().to_lowercase().as_str(), "y" | "yes");
                // Confirming closes the session, so keep the answers for teaching.
                let answers = engine
                    .session(&session_id)
                    .map(|session| session.answers)
                    .unwrap_or_default();
                let outcome = engine.confirm(&session_id, entity.id, correct)?;
                println!("{}", outcome.message);
                if !correct {
                    teach(engine, &mut lines, &mut out, &answers)?;
                }
                return Ok(());
            }
            AnswerOutcome::GiveUp { message, .. } => {
                println!("{message}");
                return Ok(());
            }
        }
    }
}
