//! Stdin control source.
//!
//! Reads one control command per line from standard input. Blank lines are
//! ignored, malformed lines are logged with `warn!` and skipped. EOF or a
//! closed channel ends the task.
//!
//! Example:
//!     macroflow --project projects/demo.json   # then type `pause`, `resume`, `stop`

use tokio::{
    io::{self, AsyncBufRead, AsyncBufReadExt, BufReader},
    sync::mpsc::Sender,
    task::JoinHandle,
};
use tracing::{error, info, trace, warn};

use super::{ControlCommand, ControlSource, parse_line};

#[derive(Debug, Clone, Default)]
pub struct StdinSource;

impl StdinSource {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ControlSource for StdinSource {
    fn name(&self) -> &'static str {
        "stdin"
    }

    fn start(&self, sender: Sender<ControlCommand>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(target: "macroflow::control", "Reading control commands from stdin");
            forward_lines(BufReader::new(io::stdin()), sender).await;
            trace!(target: "macroflow::control", "Stdin control task ended");
        })
    }
}

/// Parse lines from `reader` and send each command. Returns how many were sent.
pub(crate) async fn forward_lines<R>(mut reader: R, sender: Sender<ControlCommand>) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut sent = 0;
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                info!(target: "macroflow::control", "EOF on control input");
                break;
            }
            Ok(_) => {
                let raw = line.trim();
                if raw.is_empty() {
                    continue;
                }
                match parse_line(raw) {
                    Ok(command) => {
                        trace!(target: "macroflow::control", %command, "Parsed control command");
                        if let Err(e) = sender.send(command).await {
                            error!(
                                target: "macroflow::control",
                                error = %e,
                                "Control channel closed; terminating task"
                            );
                            break;
                        }
                        sent += 1;
                    }
                    Err(e) => {
                        warn!(target: "macroflow::control", error = %e, line = raw, "Ignoring control line");
                    }
                }
            }
            Err(e) => {
                warn!(
                    target: "macroflow::control",
                    error = %e,
                    "Error reading control input; terminating task"
                );
                break;
            }
        }
    }
    sent
}
