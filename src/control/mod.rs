/*!
Control command sources.

A running macro is steered from outside the worker thread with four commands:
pause, resume, toggle and stop. Sources read those commands from somewhere
(currently standard input) and push them into a channel; the binary applies
them to an `ExecutorHandle`.

- `stdin_source.rs` -> `StdinSource` (one command per line)

Accepted line formats:
- a bare word: `pause`, `resume`, `toggle`, `stop` (case-insensitive)
- a JSON object: `{"command": "pause"}`
*/

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow, bail};
use serde::Deserialize;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::info;

use crate::executor::ExecutorHandle;

pub mod stdin_source;

pub use stdin_source::StdinSource;

/// A request for the running macro.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Pause,
    Resume,
    Toggle,
    Stop,
}

impl FromStr for ControlCommand {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "toggle" => Ok(Self::Toggle),
            "stop" => Ok(Self::Stop),
            other => bail!("Unknown control command '{other}'"),
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Toggle => "toggle",
            Self::Stop => "stop",
        };
        f.write_str(s)
    }
}

#[derive(Deserialize)]
struct CommandEnvelope {
    command: String,
}

/// Parse one input line: a bare command word or `{"command": "..."}`.
pub fn parse_line(line: &str) -> Result<ControlCommand> {
    let raw = line.trim();
    if raw.starts_with('{') {
        let envelope: CommandEnvelope =
            serde_json::from_str(raw).map_err(|e| anyhow!("Invalid control JSON: {e}"))?;
        return envelope.command.parse();
    }
    raw.parse()
}

/// Forward a command to the executor.
pub fn apply(handle: &ExecutorHandle, command: ControlCommand) {
    info!(target: "macroflow::control", %command, "Applying control command");
    match command {
        ControlCommand::Pause => handle.pause(),
        ControlCommand::Resume => handle.resume(),
        ControlCommand::Toggle => handle.toggle_pause(),
        ControlCommand::Stop => handle.stop(),
    }
}

/// Implemented by every control command source.
///
/// A source spawns a task that sends commands into the channel and exits
/// when its input ends or the receiver is dropped. Tasks never panic.
pub trait ControlSource: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &'static str;

    fn start(&self, sender: Sender<ControlCommand>) -> JoinHandle<()>;
}
