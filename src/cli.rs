use crate::channel::{RconChannel, RconConfig};
use crate::error::ValidationError;
use crate::model::{AffordanceRef, ChunkCoord, ChunkRegion, Dimension, SessionName};
use crate::orchestrator::{SessionController, StartRequest, TerminalHost};
use crate::render::{self, RenderDirective};
use crate::store::JsonFileStore;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "chunk-replay",
    version,
    about = "Start, stop and download chunk replay recordings on a remote server"
)]
pub struct Cli {
    /// RCON host of the game server
    #[arg(long, env = "RCON_HOST", default_value = "127.0.0.1", global = true)]
    pub rcon_host: String,

    /// RCON port of the game server
    #[arg(long, env = "RCON_PORT", default_value_t = 25575, global = true)]
    pub rcon_port: u16,

    /// RCON password
    #[arg(long, env = "RCON_PASSWORD", hide_env_values = true, global = true)]
    pub rcon_password: Option<String>,

    /// Upper bound for one remote command round trip
    #[arg(long, env = "RCON_TIMEOUT", default_value = "10s", global = true)]
    pub command_timeout: humantime::Duration,

    /// Session store file (defaults to the user data directory)
    #[arg(long, env = "REPLAY_STORE", global = true)]
    pub store: Option<PathBuf>,

    /// Surface this terminal binds new sessions to
    #[arg(long, env = "REPLAY_SURFACE_ID", default_value_t = 0, global = true)]
    pub surface_id: u64,

    /// Print render directives as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    #[command(flatten)]
    Intent(IntentCommand),
    /// Restore sessions, then read intents from stdin, one per line
    Interactive,
}

#[derive(Debug, Subcommand, Clone)]
pub enum IntentCommand {
    /// Start recording a chunk region
    Start {
        #[arg(long, value_enum)]
        dimension: Dimension,
        /// Starting chunk coordinates, e.g. "10 12"
        #[arg(long = "from", allow_hyphen_values = true)]
        start: String,
        /// End chunk coordinates, e.g. "20 -4"
        #[arg(long = "to", allow_hyphen_values = true)]
        end: String,
        /// 1-20 letters, digits, `_` or `-`
        #[arg(long)]
        name: String,
    },
    /// Stop the replay bound to an affordance (`<channel_id>:<message_id>`)
    Stop { affordance: String },
    /// Request a download link for a stopped replay
    Download { affordance: String },
    /// Show every known session
    List,
}

/// One line typed in interactive mode.
#[derive(Debug, Parser)]
#[command(no_binary_name = true, disable_help_flag = true, disable_version_flag = true)]
struct IntentLine {
    #[command(subcommand)]
    intent: IntentCommand,
}

enum Intent {
    Start(StartRequest),
    Stop(AffordanceRef),
    Download(AffordanceRef),
    List,
}

/// Boundary validation. Coordinates are checked before the name.
fn parse_intent(cmd: IntentCommand) -> Result<Intent, ValidationError> {
    match cmd {
        IntentCommand::Start {
            dimension,
            start,
            end,
            name,
        } => {
            let start: ChunkCoord = start.parse()?;
            let end: ChunkCoord = end.parse()?;
            let name = SessionName::parse(&name)?;
            Ok(Intent::Start(StartRequest {
                name,
                dimension,
                region: ChunkRegion { start, end },
            }))
        }
        IntentCommand::Stop { affordance } => Ok(Intent::Stop(affordance.parse()?)),
        IntentCommand::Download { affordance } => Ok(Intent::Download(affordance.parse()?)),
        IntentCommand::List => Ok(Intent::List),
    }
}

fn default_store_path() -> Result<PathBuf> {
    let base = dirs::data_dir().context("could not determine the user data directory")?;
    Ok(base.join("chunk-replay").join("sessions.json"))
}

/// Build the controller from CLI arguments.
fn build_controller(args: &Cli, needs_remote: bool) -> Result<SessionController> {
    let password = match args.rcon_password.clone() {
        Some(p) => p,
        None if needs_remote => {
            anyhow::bail!("RCON password not set; use --rcon-password or RCON_PASSWORD")
        }
        None => String::new(),
    };
    let store_path = match args.store.clone() {
        Some(p) => p,
        None => default_store_path()?,
    };
    let channel = RconChannel::new(RconConfig {
        host: args.rcon_host.clone(),
        port: args.rcon_port,
        password,
        timeout: args.command_timeout.into(),
    });
    let store = JsonFileStore::open(store_path);
    tracing::debug!(store = %store.path().display(), "opened session store");

    Ok(SessionController::new(
        Arc::new(channel),
        Arc::new(store),
        Arc::new(TerminalHost::new(args.surface_id)),
    ))
}

pub async fn run(args: Cli) -> Result<ExitCode> {
    let needs_remote = !matches!(args.command, Command::Intent(IntentCommand::List));
    let controller = Arc::new(build_controller(&args, needs_remote)?);
    controller.restore().await;

    match args.command.clone() {
        Command::Interactive => run_interactive(controller, args.json).await,
        Command::Intent(cmd) => {
            let (out_tx, out_handle) = spawn_output_writer();
            let ok = execute(&controller, cmd, args.json, &out_tx).await;
            drop(out_tx);
            let _ = out_handle.await;
            Ok(if ok {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

/// Run one intent and write its directives. Returns false if it failed.
async fn execute(
    ctl: &SessionController,
    cmd: IntentCommand,
    json: bool,
    out_tx: &mpsc::UnboundedSender<OutputLine>,
) -> bool {
    let result: Result<Vec<RenderDirective>, String> = match parse_intent(cmd) {
        Err(e) => Err(e.to_string()),
        Ok(Intent::Start(req)) => ctl
            .start(req)
            .await
            .map(|o| {
                tracing::info!(affordance = %o.session.affordance(), "replay session bound");
                vec![o.directive]
            })
            .map_err(|e| e.to_string()),
        Ok(Intent::Stop(affordance)) => ctl
            .stop(affordance)
            .await
            .map(|o| vec![o.directive])
            .map_err(|e| e.to_string()),
        Ok(Intent::Download(affordance)) => ctl
            .download(affordance)
            .await
            .map(|o| {
                tracing::debug!(command = %o.command, url = ?o.link.url(), "download requested");
                vec![o.directive]
            })
            .map_err(|e| e.to_string()),
        Ok(Intent::List) => Ok(ctl
            .sessions()
            .await
            .iter()
            .map(render::session_view)
            .collect()),
    };

    match result {
        Ok(directives) => {
            if directives.is_empty() && !json {
                let _ = out_tx.send(OutputLine::Stdout("No replay sessions.".into()));
            }
            for directive in &directives {
                emit(directive, json, out_tx);
            }
            true
        }
        Err(message) => {
            emit(&render::failure_view(message), json, out_tx);
            false
        }
    }
}

fn emit(directive: &RenderDirective, json: bool, out_tx: &mpsc::UnboundedSender<OutputLine>) {
    if json {
        match serde_json::to_string(directive) {
            Ok(line) => {
                let _ = out_tx.send(OutputLine::Stdout(line));
            }
            Err(e) => {
                let _ = out_tx.send(OutputLine::Stderr(format!("failed to encode output: {e}")));
            }
        }
    } else {
        for line in directive.text_lines() {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
}

/// Long-running front-end: every line is an intent, executed as its own task.
async fn run_interactive(ctl: Arc<SessionController>, json: bool) -> Result<ExitCode> {
    let (out_tx, out_handle) = spawn_output_writer();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = tokio::task::JoinSet::new();
    let _ = out_tx.send(OutputLine::Stderr(
        "Ready. Intents: start, stop, download, list. `quit` to exit.".into(),
    ));

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if matches!(line, "quit" | "exit") {
                    break;
                }
                match IntentLine::try_parse_from(split_words(line)) {
                    Ok(parsed) => {
                        let ctl = ctl.clone();
                        let out_tx = out_tx.clone();
                        tasks.spawn(async move {
                            execute(&ctl, parsed.intent, json, &out_tx).await;
                        });
                    }
                    Err(e) => {
                        let _ = out_tx.send(OutputLine::Stderr(e.render().to_string()));
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    // In-flight remote commands cannot be cancelled; let them finish.
    while tasks.join_next().await.is_some() {}
    drop(out_tx);
    let _ = out_handle.await;
    Ok(ExitCode::SUCCESS)
}

/// Whitespace split that keeps double-quoted runs together.
fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_word = false;
    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_word = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_word {
                    words.push(std::mem::take(&mut current));
                    has_word = false;
                }
            }
            c => {
                current.push(c);
                has_word = true;
            }
        }
    }
    if has_word {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_cmd(start: &str, end: &str, name: &str) -> IntentCommand {
        IntentCommand::Start {
            dimension: Dimension::Overworld,
            start: start.into(),
            end: end.into(),
            name: name.into(),
        }
    }

    #[test]
    fn start_intent_validates_coordinates_before_name() {
        let err = parse_intent(start_cmd("1,2", "3 4", "bad name")).err();
        assert_eq!(err, Some(ValidationError::Coordinates));
        let err = parse_intent(start_cmd("1 2", "3 4", "bad name")).err();
        assert_eq!(err, Some(ValidationError::Name));
        assert!(matches!(
            parse_intent(start_cmd("1 2", "-3 4", "run1")),
            Ok(Intent::Start(_))
        ));
    }

    #[test]
    fn name_boundaries_at_the_edge() {
        assert!(parse_intent(start_cmd("0 0", "1 1", "a")).is_ok());
        assert!(parse_intent(start_cmd("0 0", "1 1", &"b".repeat(20))).is_ok());
        assert_eq!(
            parse_intent(start_cmd("0 0", "1 1", &"b".repeat(21))).err(),
            Some(ValidationError::Name)
        );
    }

    #[test]
    fn interactive_lines_parse_into_intents() {
        let parsed = IntentLine::try_parse_from(split_words(
            r#"start --dimension nether --from "-1 2" --to "3 4" --name run1"#,
        ))
        .unwrap();
        match parsed.intent {
            IntentCommand::Start {
                dimension, start, ..
            } => {
                assert_eq!(dimension, Dimension::Nether);
                assert_eq!(start, "-1 2");
            }
            other => panic!("unexpected intent {other:?}"),
        }
        assert!(matches!(
            IntentLine::try_parse_from(split_words("stop 1:2")).unwrap().intent,
            IntentCommand::Stop { ref affordance } if affordance == "1:2"
        ));
        assert!(IntentLine::try_parse_from(split_words("interactive")).is_err());
    }

    #[test]
    fn split_words_honours_quotes() {
        assert_eq!(
            split_words(r#"a "b c"  d """#),
            vec!["a", "b c", "d", ""]
        );
    }

    #[test]
    fn cli_reads_flags() {
        let cli = Cli::try_parse_from([
            "chunk-replay",
            "--rcon-password",
            "pw",
            "--command-timeout",
            "3s",
            "download",
            "5:6",
        ])
        .unwrap();
        assert_eq!(cli.rcon_password.as_deref(), Some("pw"));
        assert_eq!(
            std::time::Duration::from(cli.command_timeout),
            std::time::Duration::from_secs(3)
        );
        assert!(matches!(
            cli.command,
            Command::Intent(IntentCommand::Download { .. })
        ));
    }
}
