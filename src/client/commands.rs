// src/client/commands.rs
//
// Command grammar: the first token of a user line decides everything.
//
//   exit                 leave
//   /n <name>            register or rename
//   /w <name> <message>  whisper
//   /f <name> <path>     send a file
//   anything else        broadcast chat
//
// Validation here is local convenience only; the server is authoritative.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Exit,
    SetName { name: String },
    Whisper { target: String, message: String },
    SendFile { target: String, path: PathBuf },
    Chat { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("usage: /n <name> — one word, no spaces")]
    BadName,
    #[error("usage: /w <name> <message>")]
    BadWhisper,
    #[error("usage: /f <name> <path>")]
    BadFile,
}

/// Parse one input line. `None` for blank lines.
pub fn parse(line: &str) -> Option<Result<Command, CommandError>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (first, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim_start()),
        None => (trimmed, ""),
    };

    let parsed = match first {
        "exit" if rest.is_empty() => Ok(Command::Exit),
        "/n" => {
            // The server only rejects blank and duplicate names; interior
            // whitespace is screened out here, client-side.
            if rest.is_empty() || rest.contains(char::is_whitespace) {
                Err(CommandError::BadName)
            } else {
                Ok(Command::SetName { name: rest.to_string() })
            }
        }
        "/w" => match rest.split_once(char::is_whitespace) {
            Some((target, message)) if !message.trim().is_empty() => Ok(Command::Whisper {
                target: target.to_string(),
                message: message.trim_start().to_string(),
            }),
            _ => Err(CommandError::BadWhisper),
        },
        "/f" => match rest.split_once(char::is_whitespace) {
            Some((target, path)) if !path.trim().is_empty() => Ok(Command::SendFile {
                target: target.to_string(),
                path: PathBuf::from(path.trim()),
            }),
            _ => Err(CommandError::BadFile),
        },
        _ => Ok(Command::Chat {
            message: trimmed.to_string(),
        }),
    };

    Some(parsed)
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
