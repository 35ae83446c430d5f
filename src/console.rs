//! Console application — a line-driven stand-in for the embedded app.
//!
//! Reads commands from a line reader (stdin in the binary) and edits its own
//! copy of the identity. Every edit sends the complete record on the
//! write-back channel.
//!
//! ```text
//! name <text>     age <text>     gender <text>     country <text>
//! show            help           quit
//! ```

use tokio::io::{AsyncBufRead, Lines};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::launcher::{AppFuture, Application, WriteBack};
use crate::record::IdentityRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// The record was edited.
    Updated,
    Show,
    Help,
    Quit,
    Unknown(String),
}

/// Print `text` without a newline and flush so it shows before input.
pub(crate) fn prompt(text: &str) {
    use std::io::Write as _;
    print!("{text}");
    let _ = std::io::stdout().flush();
}

/// Apply one input line to `record`.
pub fn apply_command(record: &mut IdentityRecord, line: &str) -> Command {
    let line = line.trim();
    let (verb, arg) = match line.split_once(char::is_whitespace) {
        Some((verb, arg)) => (verb, arg.trim()),
        None => (line, ""),
    };

    match verb {
        "name" if !arg.is_empty() => record.name = arg.to_string(),
        "age" => record.age = Some(arg.to_string()),
        "gender" => record.gender = Some(arg.to_string()),
        "country" => record.country = Some(arg.to_string()),
        "show" => return Command::Show,
        "help" | "?" => return Command::Help,
        "quit" | "exit" => return Command::Quit,
        _ => return Command::Unknown(line.to_string()),
    }
    Command::Updated
}

pub struct ConsoleApp<R> {
    lines: Lines<R>,
}

impl<R> ConsoleApp<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(lines: Lines<R>) -> Self {
        Self { lines }
    }
}

impl<R> Application for ConsoleApp<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    fn name(&self) -> &str {
        "console"
    }

    fn launch(
        self: Box<Self>,
        flags: Option<String>,
        updates: WriteBack,
        shutdown: CancellationToken,
    ) -> AppFuture {
        Box::pin(run_console(self.lines, flags, updates, shutdown))
    }
}

async fn run_console<R>(
    mut lines: Lines<R>,
    flags: Option<String>,
    updates: WriteBack,
    shutdown: CancellationToken,
) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin + Send,
{
    let mut record = flags
        .as_deref()
        .and_then(IdentityRecord::parse)
        .ok_or_else(|| AppError::Identity("console launched without a valid identity".into()))?;

    println!("Welcome, {} (player {})", record.name, record.player_id);
    println!("Type `help` for commands.");

    loop {
        prompt("> ");

        let line = tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("console shutting down");
                break;
            }

            line = lines.next_line() => line,
        };

        let input = match line {
            Ok(Some(input)) => input,
            Ok(None) => {
                info!("console input closed");
                break;
            }
            Err(e) => {
                warn!("console read error: {e}");
                break;
            }
        };
        if input.trim().is_empty() {
            continue;
        }

        match apply_command(&mut record, &input) {
            Command::Updated => {
                debug!(input = %input, "identity edited");
                updates.send(record.clone()).await?;
                println!("saved.");
            }
            Command::Show => println!("{}", record.to_json()?),
            Command::Help => {
                println!("name <text> | age <text> | gender <text> | country <text> | show | quit")
            }
            Command::Quit => break,
            Command::Unknown(cmd) => println!("unknown command: {cmd} (try `help`)"),
        }
    }

    Ok(())
}
