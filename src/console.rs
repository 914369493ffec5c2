/// file: src/console.rs
/// description: Interactive stdin commands driving the connection manager
use crate::{
    collaborators::DataFetcher,
    error::DashboardError,
    manager::ConnectionManager,
    monitoring::health_json,
    types::SessionId,
};
use serde_json::{Map, Value};
use std::{
    io::BufRead,
    sync::Arc,
    thread,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

pub const HELP: &str = "\
commands:
  reconnect | r             reset the attempt count and reopen the realtime channel
  status | s                ask the server to push the bot status
  stats                     print connection statistics
  join <session>            bind to a session
  leave <session>           leave a session
  cmd <name> [json object]  send a bot command, e.g. cmd start {\"mode\":\"simulation\"}
  refresh                   pull a fresh dashboard snapshot
  help | ?                  show this help
  quit | q                  exit";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Reconnect,
    Status,
    Stats,
    Join(SessionId),
    Leave(SessionId),
    Command { name: String, data: Map<String, Value> },
    Refresh,
    Help,
    Quit,
}

/// Why the console stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    Quit,
    InputClosed,
}

/// Parses one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>, DashboardError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "" => return Ok(None),
        "reconnect" | "r" => ConsoleCommand::Reconnect,
        "status" | "s" => ConsoleCommand::Status,
        "stats" => ConsoleCommand::Stats,
        "join" => ConsoleCommand::Join(session_arg(rest)?),
        "leave" => ConsoleCommand::Leave(session_arg(rest)?),
        "cmd" => {
            let (name, data) = match rest.split_once(char::is_whitespace) {
                Some((name, data)) => (name, data.trim()),
                None => (rest, ""),
            };
            if name.is_empty() {
                return Err(DashboardError::InvalidCommand(
                    "cmd needs a command name".to_string(),
                ));
            }
            let data = if data.is_empty() {
                Map::new()
            } else {
                match serde_json::from_str::<Value>(data)? {
                    Value::Object(map) => map,
                    _ => {
                        return Err(DashboardError::InvalidCommand(
                            "command data must be a JSON object".to_string(),
                        ));
                    }
                }
            };
            ConsoleCommand::Command {
                name: name.to_string(),
                data,
            }
        }
        "refresh" => ConsoleCommand::Refresh,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "q" | "exit" => ConsoleCommand::Quit,
        other => {
            return Err(DashboardError::InvalidCommand(format!(
                "unknown command '{other}' (try 'help')"
            )));
        }
    };
    Ok(Some(command))
}

fn session_arg(arg: &str) -> Result<SessionId, DashboardError> {
    arg.parse()
        .map_err(|_| DashboardError::InvalidCommand(format!("'{arg}' is not a session id")))
}

/// Reads stdin on its own thread; a blocking read must not hold up runtime shutdown.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    let spawned = thread::Builder::new()
        .name("botdash-stdin".to_string())
        .spawn(move || {
            if let Err(e) = forward_lines(std::io::stdin().lock(), &tx) {
                error!("Console input failed: {}", e);
            }
        });
    if let Err(e) = spawned {
        error!("Failed to start console input thread: {}", e);
    }
    rx
}

fn forward_lines(input: impl BufRead, tx: &mpsc::Sender<String>) -> Result<(), DashboardError> {
    for line in input.lines() {
        if tx.blocking_send(line?).is_err() {
            break;
        }
    }
    Ok(())
}

pub struct Console {
    manager: Arc<ConnectionManager>,
    fetcher: Option<Arc<dyn DataFetcher>>,
    started: chrono::DateTime<chrono::Utc>,
}

impl Console {
    pub fn new(manager: Arc<ConnectionManager>, fetcher: Option<Arc<dyn DataFetcher>>) -> Self {
        Self {
            manager,
            fetcher,
            started: chrono::Utc::now(),
        }
    }

    pub async fn run(&self, mut lines: mpsc::Receiver<String>) -> ConsoleExit {
        while let Some(line) = lines.recv().await {
            let command = match parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    eprintln!("{e}");
                    continue;
                }
            };

            if command == ConsoleCommand::Quit {
                info!("Quit requested from the console");
                return ConsoleExit::Quit;
            }
            println!("{}", self.execute(command).await);
        }

        debug!("Console input closed");
        ConsoleExit::InputClosed
    }

    /// Runs `command` and returns the line to show the user.
    pub async fn execute(&self, command: ConsoleCommand) -> String {
        match command {
            ConsoleCommand::Reconnect => {
                if self.manager.is_connected().await {
                    "Already connected".to_string()
                } else {
                    self.manager.reconnect().await;
                    "Reconnecting...".to_string()
                }
            }
            ConsoleCommand::Status => sent(
                self.manager.request_status().await,
                "Status requested",
                "status_request",
            ),
            ConsoleCommand::Stats => {
                let stats = self.manager.connection_stats().await;
                health_json(&stats, chrono::Utc::now() - self.started).to_string()
            }
            ConsoleCommand::Join(session_id) => sent(
                self.manager.join_session(session_id).await,
                &format!("Joined session #{session_id}"),
                "join_session",
            ),
            ConsoleCommand::Leave(session_id) => sent(
                self.manager.leave_session(session_id).await,
                &format!("Left session #{session_id}"),
                "leave_session",
            ),
            ConsoleCommand::Command { name, data } => sent(
                self.manager.send_command(&name, data).await,
                &format!("Sent command '{name}'"),
                "bot_command",
            ),
            ConsoleCommand::Refresh => match &self.fetcher {
                Some(fetcher) => {
                    fetcher.refresh();
                    "Refreshing dashboard data".to_string()
                }
                None => "Snapshot refresh unavailable".to_string(),
            },
            ConsoleCommand::Help => HELP.to_string(),
            ConsoleCommand::Quit => "Bye".to_string(),
        }
    }
}

fn sent(ok: bool, done: &str, event: &str) -> String {
    if ok {
        done.to_string()
    } else {
        format!("Not connected; {event} dropped")
    }
}
