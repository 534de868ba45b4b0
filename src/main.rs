use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use weave::character::{CharacterId, ConceptInput, DevelopmentMode};
use weave::config::Config;
use weave::pipeline::{ApprovalPolicy, NextWave, ProgressEvent, WavePlan};
use weave::tasks::TaskKind;
use weave::{wlog, wlog_error, Backends, CharacterService, Error, Result, StatusReport};

/// Weave - wave-scheduled character development
#[derive(Parser, Debug)]
#[command(name = "weave")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    WEAVE_DEBUG=1   Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.weave/weave.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Develop a character from a concept JSON file
    Run {
        /// Path to the concept input ({"characters": [...], "storyline": {...}})
        concept: PathBuf,

        /// Depth of analysis: fast, balanced or deep (defaults to config)
        #[arg(long)]
        mode: Option<DevelopmentMode>,

        /// Print progress events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Show the development status of a character
    Status {
        id: CharacterId,

        #[arg(long)]
        json: bool,
    },

    /// Print one checkpoint as JSON
    Checkpoint { id: CharacterId, number: u32 },

    /// Approve checkpoints up to and including NUMBER
    Approve { id: CharacterId, number: u32 },

    /// Request regeneration of one task's output
    Regenerate {
        id: CharacterId,

        /// Task name, e.g. voice_dialogue
        task: TaskKind,

        #[arg(long, default_value = "")]
        feedback: String,
    },

    /// Print the consolidated profile as JSON
    Final { id: CharacterId },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    weave::log::init_with_debug(cli.debug);

    let config = Config::load()?;
    let rt = tokio::runtime::Runtime::new()?;

    let result = rt.block_on(async {
        match cli.command {
            Command::Run {
                concept,
                mode,
                json,
            } => run_development(&config, concept, mode, json).await,
            Command::Status { id, json } => run_status(&config, id, json).await,
            Command::Checkpoint { id, number } => {
                let service = CharacterService::open(&config)?;
                let checkpoint = service.get_checkpoint(id, number).await?;
                println!("{}", serde_json::to_string_pretty(&checkpoint)?);
                Ok(())
            }
            Command::Approve { id, number } => {
                let service = CharacterService::open(&config)?;
                let approved = service.approve_checkpoint(id, number).await?;
                println!("Approved through checkpoint {}", approved);
                Ok(())
            }
            Command::Regenerate { id, task, feedback } => {
                let service = CharacterService::open(&config)?;
                let count = service.request_regeneration(id, task, &feedback).await?;
                println!(
                    "Regeneration of {} recorded ({} total). Outputs are unchanged.",
                    task, count
                );
                Ok(())
            }
            Command::Final { id } => {
                let service = CharacterService::open(&config)?;
                let profile = service.get_final_profile(id).await?;
                println!("{}", serde_json::to_string_pretty(&profile)?);
                Ok(())
            }
        }
    });

    if let Err(ref e) = result {
        wlog_error!("weave failed: {}", e);
    }
    result
}

async fn run_development(
    config: &Config,
    concept: PathBuf,
    mode: Option<DevelopmentMode>,
    json: bool,
) -> Result<()> {
    let input: ConceptInput = serde_json::from_str(&tokio::fs::read_to_string(&concept).await?)?;
    let mode = mode.unwrap_or(config.default_mode);
    wlog!(
        "Run command: concept={} mode={} approval={}",
        concept.display(),
        mode,
        config.approval
    );

    let service = CharacterService::open(config)?.with_backends(Backends::from_config(config)?);
    let plan = WavePlan::standard()?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (id, handle) = service.start_development(input, mode, Arc::new(tx)).await?;

    if !json {
        println!("Developing character {} ({} mode)", id.short(), mode);
        println!();
    }

    // The sender lives in the run task, so the stream ends when the run does.
    while let Some(event) = rx.recv().await {
        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            print_event(&event);
        }
        if service.policy() == ApprovalPolicy::Blocking {
            if let ProgressEvent::WaveComplete { wave, .. } = event {
                let last = plan.last_checkpoint_of_wave(wave);
                prompt_approval(last).await?;
                service.approve_checkpoint(id, last).await?;
            }
        }
    }

    let profile = handle.await.map_err(|e| Error::TaskJoin(e.to_string()))??;

    if json {
        return Ok(());
    }
    println!();
    println!("  Character ID: {}", id);
    println!("  Name:         {}", profile.name);
    println!("  Role:         {}", profile.overview.role);
    println!(
        "  Duration:     {:.1} min, ~{} tokens",
        profile.metadata.development_time_minutes, profile.metadata.total_tokens
    );
    println!();
    println!("Next steps:");
    println!("  1. Review checkpoints: weave checkpoint {} <n>", id);
    println!("  2. Approve:            weave approve {} <n>", id);
    println!("  3. Final profile:      weave final {}", id);
    Ok(())
}

async fn prompt_approval(checkpoint: u32) -> Result<()> {
    // stderr keeps a --json stdout stream clean.
    eprintln!(
        "Press Enter to approve checkpoints through {} and continue...",
        checkpoint
    );
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| ())
    })
    .await
    .map_err(|e| Error::TaskJoin(e.to_string()))??;
    Ok(())
}

fn print_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::WaveStarted { wave, agents } => {
            println!("Wave {} started: {}", wave, agents.join(", "));
        }
        ProgressEvent::CheckpointReady {
            checkpoint_number,
            agent,
            ..
        } => {
            println!("  [{}] {} ready", checkpoint_number, agent);
        }
        ProgressEvent::WaveComplete {
            wave, next_wave, ..
        } => match next_wave {
            NextWave::Wave(next) => println!("Wave {} complete, wave {} next", wave, next),
            NextWave::Final => println!("Wave {} complete, consolidating", wave),
        },
        ProgressEvent::CharacterComplete { message, .. } => println!("{}", message),
        ProgressEvent::Error { agent, message, .. } => match agent {
            Some(agent) => eprintln!("Error in {}: {}", agent, message),
            None => eprintln!("Error: {}", message),
        },
    }
}

async fn run_status(config: &Config, id: CharacterId, json: bool) -> Result<()> {
    let service = CharacterService::open(config)?;
    let status = service.get_status(id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_status(&status);
    }
    Ok(())
}

fn print_status(status: &StatusReport) {
    println!("  Character: {} ({})", status.name, status.character_id.short());
    println!("  Status:    {} ({})", status.status, status.phase);
    println!(
        "  Progress:  {}/{} checkpoints, {} approved",
        status.progress.current_checkpoint,
        status.progress.total_checkpoints,
        status.progress.completed_checkpoints
    );
    if let Some(error) = &status.error {
        println!("  Error:     {}", error);
    }
    println!();
    for (task, entry) in &status.agents {
        println!("  wave {}  {:<22} {:?}", entry.wave, task.name(), entry.status);
    }
}
