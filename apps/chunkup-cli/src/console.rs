//! Interactive commands read from stdin while uploads run.

use std::path::Path;

use chunkup_uploader::{SessionId, SessionRegistry};

use crate::render;

/// One console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Pause(String),
    Resume(String),
    Cancel(String),
    Download(String),
    /// Status of one session, or of all of them.
    Status(Option<String>),
    Help,
    Quit,
}

/// Parses one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Option<Result<Command, String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let name = || {
        if rest.is_empty() {
            Err(format!("usage: {verb} <name>"))
        } else {
            Ok(rest.to_string())
        }
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "pause" | "p" => name().map(Command::Pause),
        "resume" | "r" => name().map(Command::Resume),
        "cancel" | "c" => name().map(Command::Cancel),
        "download" | "d" => name().map(Command::Download),
        "status" | "s" => Ok(Command::Status((!rest.is_empty()).then(|| rest.to_string()))),
        "help" | "?" => Ok(Command::Help),
        "quit" | "q" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command '{other}', type 'help'")),
    };
    Some(command)
}

pub const HELP: &str = "\
commands:
  pause <name>     stop after cancelling the chunk in flight
  resume <name>    continue from the last committed chunk
  cancel <name>    abort and forget the upload
  download <name>  fetch the stored object into the download directory
  status [name]    show progress
  quit             leave (running uploads are abandoned)";

/// Resolves a display name to exactly one session.
pub fn resolve(registry: &SessionRegistry, name: &str) -> Result<SessionId, String> {
    match registry.find_by_name(name).as_slice() {
        [] => Err(format!("no upload named '{name}'")),
        [id] => Ok(*id),
        ids => Err(format!(
            "'{name}' matches {} uploads, cancel or finish the others first",
            ids.len()
        )),
    }
}

/// Applies `command` and returns the lines to print.
pub async fn apply(registry: &SessionRegistry, command: Command, download_dir: &Path) -> String {
    match command {
        Command::Pause(name) => with_session(registry, &name, |id| {
            if registry.pause(id) {
                format!("{name}: pausing")
            } else {
                format!("{name}: nothing in flight")
            }
        }),
        Command::Resume(name) => with_session(registry, &name, |id| {
            registry.resume(id);
            format!("{name}: resumed")
        }),
        Command::Cancel(name) => with_session(registry, &name, |id| {
            registry.cancel(id);
            format!("{name}: cancelled")
        }),
        Command::Download(name) => match resolve(registry, &name) {
            Ok(id) => match registry.download(id, download_dir).await {
                Ok(path) => format!("{name}: saved to {}", path.display()),
                Err(e) => format!("{name}: download failed: {e}"),
            },
            Err(e) => e,
        },
        Command::Status(Some(name)) => with_session(registry, &name, |id| {
            registry
                .snapshot(id)
                .map(|s| render::status_line(&s))
                .unwrap_or_else(|| format!("no upload named '{name}'"))
        }),
        Command::Status(None) => {
            let sessions = registry.sessions();
            if sessions.is_empty() {
                "no uploads".to_string()
            } else {
                sessions
                    .iter()
                    .map(render::status_line)
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        Command::Help => HELP.to_string(),
        Command::Quit => String::new(),
    }
}

fn with_session(
    registry: &SessionRegistry,
    name: &str,
    f: impl FnOnce(SessionId) -> String,
) -> String {
    resolve(registry, name).map_or_else(|e| e, f)
}
