//! Stagehand CLI - validate and play scenarios from the terminal
//!
//! `run` plays a scenario against console actors that log what they do and
//! take simulated time, while stdin accepts commands that poke the register
//! and buses the way scene objects would.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;

use stagehand::interpreter::{MoveTarget, RunOutcome, Scenario, ScriptInterpreter, Step};
use stagehand::runtime::cancel::{CancelToken, seconds};
use stagehand::runtime::error::Cancelled;
use stagehand::runtime::{Runtime, RuntimeConfig};
use stagehand::world::{
    ActorDirectory, Anchor, Mover, Speaker, Utterance, Vec3, WaypointDirectory,
};

/// Walking speed of console actors, in metres per second
const WALK_SPEED: f32 = 1.5;

/// Length of a full console animation, in seconds
const ANIMATION_SECONDS: f32 = 1.0;

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(about = "Scenario player for interactive scenes", long_about = None)]
struct Cli {
    /// Runtime configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a scenario and print its validation warnings as JSON
    Check {
        /// Scenario file
        scenario: PathBuf,
    },

    /// Play a scenario against console actors
    Run {
        /// Scenario file
        scenario: PathBuf,

        /// Waypoint file (JSON list of {id, position})
        #[arg(long)]
        waypoints: Option<PathBuf>,

        /// Step index to start from
        #[arg(long)]
        start_step: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::default(),
    };

    let level = if config.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    match cli.command {
        Commands::Check { scenario } => {
            let scenario = load_scenario(&scenario)?;
            let warnings = scenario.validate();
            println!("{}", serde_json::to_string_pretty(&warnings)?);
        }

        Commands::Run {
            scenario,
            waypoints,
            start_step,
        } => {
            let mut config = config;
            if let Some(start_step) = start_step {
                config.start_step = start_step;
            }
            let scenario = load_scenario(&scenario)?;
            let waypoints = match waypoints {
                Some(path) => WaypointDirectory::load(&path)
                    .with_context(|| format!("loading waypoints {}", path.display()))?,
                None => WaypointDirectory::new(),
            };
            play(config, scenario, waypoints).await?;
        }
    }

    Ok(())
}

fn load_scenario(path: &Path) -> Result<Scenario> {
    Scenario::load(path).with_context(|| format!("loading scenario {}", path.display()))
}

async fn play(config: RuntimeConfig, scenario: Scenario, waypoints: WaypointDirectory) -> Result<()> {
    let actors = ActorDirectory::new();
    for id in actor_ids(&scenario) {
        let actor = Arc::new(ConsoleActor::new(&id));
        actors.register_mover(&id, actor.clone());
        actors.register_speaker(&id, actor.clone());
        actors.register_anchor(&id, actor);
    }

    let runtime = Runtime::with_world(config, Arc::new(actors), Arc::new(waypoints));
    let interpreter = runtime.interpreter(scenario);
    println!("commands: emit K | emit-all K | fire K | signal K | set K | unset K | stop | restart | status | quit");

    let mut runs = JoinSet::new();
    {
        let interpreter = Arc::clone(&interpreter);
        runs.spawn(async move { interpreter.run().await });
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match Command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => command.apply(&runtime, &interpreter, &mut runs),
                    Err(err) => eprintln!("{err}"),
                },
                None => stdin_open = false,
            },
            Some(joined) = runs.join_next(), if !runs.is_empty() => {
                match joined {
                    Ok(Ok(outcome)) => report(outcome, &interpreter),
                    Ok(Err(err)) => eprintln!("{err}"),
                    Err(err) => tracing::error!(error = %err, "run task failed"),
                }
                if !stdin_open && runs.is_empty() {
                    break;
                }
            },
            else => break,
        }
    }

    interpreter.stop();
    while runs.join_next().await.is_some() {}
    Ok(())
}

fn report(outcome: RunOutcome, interpreter: &ScriptInterpreter) {
    match outcome {
        RunOutcome::Completed => println!("scenario '{}' completed", interpreter.scenario().name),
        RunOutcome::Cancelled => println!(
            "scenario '{}' stopped at step {}",
            interpreter.scenario().name,
            interpreter.step_index()
        ),
    }
}

/// Every actor id a scenario refers to
fn actor_ids(scenario: &Scenario) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    for step in scenario.steps.iter().flatten() {
        match step {
            Step::Say(say) => {
                ids.insert(say.actor.trim().to_string());
            }
            Step::MoveTo(move_to) => {
                ids.insert(move_to.actor.trim().to_string());
                if let MoveTarget::Actor(target) = &move_to.target {
                    ids.insert(target.trim().to_string());
                }
            }
            Step::PlayAnimation(play) => {
                ids.insert(play.actor.trim().to_string());
            }
            _ => {}
        }
    }
    ids.remove("");
    ids
}

/// One stdin command
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Emit(String),
    EmitAll(String),
    Fire(String),
    Signal(String),
    Set(String),
    Unset(String),
    Stop,
    Restart,
    Status,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (verb, arg) = match line.split_once(char::is_whitespace) {
            Some((verb, arg)) => (verb, arg.trim()),
            None => (line, ""),
        };

        let keyed = |make: fn(String) -> Command| -> Result<Command> {
            if arg.is_empty() {
                bail!("'{verb}' needs a key");
            }
            Ok(make(arg.to_string()))
        };

        match verb {
            "emit" => keyed(Command::Emit),
            "emit-all" => keyed(Command::EmitAll),
            "fire" => keyed(Command::Fire),
            "signal" => keyed(Command::Signal),
            "set" => keyed(Command::Set),
            "unset" => keyed(Command::Unset),
            "stop" => Ok(Command::Stop),
            "restart" => Ok(Command::Restart),
            "status" => Ok(Command::Status),
            "quit" | "exit" => Ok(Command::Quit),
            other => bail!("unknown command '{other}'"),
        }
    }

    fn apply(
        self,
        runtime: &Runtime,
        interpreter: &Arc<ScriptInterpreter>,
        runs: &mut JoinSet<Result<RunOutcome, stagehand::interpreter::InterpreterError>>,
    ) {
        match self {
            Command::Emit(key) => {
                let delivery = runtime.broadcast().emit(&key);
                println!("emit {key}: {delivery:?}");
            }
            Command::EmitAll(key) => {
                let woken = runtime.broadcast().emit_all(&key);
                println!("emit-all {key}: woke {woken}");
            }
            Command::Fire(key) => runtime.emit_everywhere(&key),
            Command::Signal(key) => {
                let delivery = runtime.signals().emit(&key);
                println!("signal {key}: {delivery:?}");
            }
            Command::Set(key) => runtime.states().set_true(&key),
            Command::Unset(key) => runtime.states().set_false(&key),
            Command::Stop => {
                if !interpreter.stop() {
                    println!("nothing to stop");
                }
            }
            Command::Restart => {
                let interpreter = Arc::clone(interpreter);
                runs.spawn(async move { interpreter.restart().await });
            }
            Command::Status => {
                let status = interpreter.status();
                let states = runtime.states().snapshot();
                match serde_json::to_string_pretty(&status) {
                    Ok(json) => println!("{json}"),
                    Err(err) => eprintln!("{err}"),
                }
                println!("states: {states:?}");
            }
            Command::Quit => {}
        }
    }
}

/// Actor that logs its actions and simulates their duration
struct ConsoleActor {
    id: String,
    position: Mutex<Vec3>,
}

impl ConsoleActor {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            position: Mutex::new(Vec3::ZERO),
        }
    }
}

#[async_trait]
impl Mover for ConsoleActor {
    async fn move_to(
        &self,
        position: Vec3,
        stop_distance: f32,
        cancel: &CancelToken,
    ) -> Result<(), Cancelled> {
        let from = *self.position.lock();
        let distance = (from.distance(position) - stop_distance).max(0.0);
        println!("[{}] walking {:.2}m to {:?}", self.id, distance, position);
        cancel.sleep(seconds(distance / WALK_SPEED)).await?;
        *self.position.lock() = position;
        Ok(())
    }

    async fn play_animation(
        &self,
        name: &str,
        start_time: f32,
        wait_for_exit: bool,
        cancel: &CancelToken,
    ) -> Result<(), Cancelled> {
        println!("[{}] playing '{}' from {:.2}", self.id, name, start_time);
        if wait_for_exit {
            let remaining = ANIMATION_SECONDS * (1.0 - start_time.clamp(0.0, 1.0));
            cancel.sleep(seconds(remaining)).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Speaker for ConsoleActor {
    async fn speak(&self, line: &Utterance, cancel: &CancelToken) -> Result<(), Cancelled> {
        let name = if line.speaker.is_empty() {
            &self.id
        } else {
            &line.speaker
        };
        match &line.voice {
            Some(voice) => println!("{name}: {} ({voice})", line.text),
            None => println!("{name}: {}", line.text),
        }
        cancel.sleep(line.min_display).await
    }
}

impl Anchor for ConsoleActor {
    fn position(&self) -> Vec3 {
        *self.position.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("emit bell").unwrap(), Command::Emit("bell".into()));
        assert_eq!(
            Command::parse("  emit-all   case opened ").unwrap(),
            Command::EmitAll("case opened".into())
        );
        assert_eq!(Command::parse("status").unwrap(), Command::Status);
        assert_eq!(Command::parse("exit").unwrap(), Command::Quit);
        assert!(Command::parse("set").is_err());
        assert!(Command::parse("dance now").is_err());
    }

    #[test]
    fn test_actor_ids_cover_targets() {
        let scenario = Scenario::from_json_str(
            r#"{"steps": [
                {"kind": "say", "actor": "guide", "text": "hi"},
                {"kind": "move_to", "actor": " guide ", "target": {"actor": "visitor"}},
                {"kind": "emit_signal", "signal": "x"}
            ]}"#,
        )
        .unwrap();

        let ids: Vec<_> = actor_ids(&scenario).into_iter().collect();
        assert_eq!(ids, vec!["guide".to_string(), "visitor".to_string()]);
    }
}
