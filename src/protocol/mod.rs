//! Text wire protocol.
//!
//! One request per connection, terminated by the client closing its write
//! half. The verb and fixed arguments are whitespace separated:
//!
//! ```text
//! ADD <queue> <length> <data>   -> <id>
//! GET <queue>                   -> <id> <length> <data> | NONE
//! ACK <queue> <id>              -> YES | NO
//! IN <queue> <id>               -> YES | NO
//! SAVE                          -> OK
//! anything else                 -> ERROR
//! ```
//!
//! The `<data>` of `ADD` is everything after the length token, trimmed, so it
//! may itself contain spaces.

pub mod handler;

use thiserror::Error;

use crate::storage::{LeasedTask, TaskId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add {
        queue: String,
        length: u64,
        payload: String,
    },
    Get {
        queue: String,
    },
    Ack {
        queue: String,
        task_id: TaskId,
    },
    In {
        queue: String,
        task_id: TaskId,
    },
    Save,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("request is not valid UTF-8")]
    InvalidUtf8,

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("{verb} expects {expected}")]
    WrongArity {
        verb: &'static str,
        expected: &'static str,
    },

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("request exceeds {0} bytes")]
    TooLarge(usize),
}

/// Split off the first whitespace-delimited token.
fn next_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(end) => (&s[..end], s[end..].trim_start()),
        None => (s, ""),
    }
}

fn parse_number(token: &str) -> Result<u64, ProtocolError> {
    token
        .parse()
        .map_err(|_| ProtocolError::InvalidNumber(token.to_string()))
}

/// Task ids must be written the way the server prints them: no sign and no
/// leading zeros, so `00` or `+1` never name task `0` or `1`.
fn parse_task_id(token: &str) -> Result<TaskId, ProtocolError> {
    let canonical = token.bytes().all(|b| b.is_ascii_digit())
        && (token == "0" || !token.starts_with('0'));
    if !canonical {
        return Err(ProtocolError::InvalidNumber(token.to_string()));
    }
    parse_number(token)
}

/// Split `rest` into exactly `N` tokens.
fn exact_args<'a, const N: usize>(
    rest: &'a str,
    verb: &'static str,
    expected: &'static str,
) -> Result<[&'a str; N], ProtocolError> {
    let args: Vec<&str> = rest.split_whitespace().collect();
    args.try_into()
        .map_err(|_| ProtocolError::WrongArity { verb, expected })
}

impl Command {
    /// Decode a raw request. `Ok(None)` means the request was empty.
    pub fn decode(request: &[u8]) -> Result<Option<Command>, ProtocolError> {
        let text = std::str::from_utf8(request).map_err(|_| ProtocolError::InvalidUtf8)?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let (verb, rest) = next_token(text);
        let command = match verb {
            "ADD" => {
                let (queue, rest) = next_token(rest);
                let (length, payload) = next_token(rest);
                if queue.is_empty() || length.is_empty() || payload.is_empty() {
                    return Err(ProtocolError::WrongArity {
                        verb: "ADD",
                        expected: "<queue> <length> <data>",
                    });
                }
                Command::Add {
                    queue: queue.to_string(),
                    length: parse_number(length)?,
                    payload: payload.to_string(),
                }
            }
            "GET" => {
                let [queue] = exact_args::<1>(rest, "GET", "<queue>")?;
                Command::Get {
                    queue: queue.to_string(),
                }
            }
            "ACK" => {
                let [queue, id] = exact_args::<2>(rest, "ACK", "<queue> <id>")?;
                Command::Ack {
                    queue: queue.to_string(),
                    task_id: parse_task_id(id)?,
                }
            }
            "IN" => {
                let [queue, id] = exact_args::<2>(rest, "IN", "<queue> <id>")?;
                Command::In {
                    queue: queue.to_string(),
                    task_id: parse_task_id(id)?,
                }
            }
            "SAVE" => {
                let [] = exact_args::<0>(rest, "SAVE", "no arguments")?;
                Command::Save
            }
            other => return Err(ProtocolError::UnknownCommand(other.to_string())),
        };
        Ok(Some(command))
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Command::Add { .. } => "ADD",
            Command::Get { .. } => "GET",
            Command::Ack { .. } => "ACK",
            Command::In { .. } => "IN",
            Command::Save => "SAVE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    TaskId(TaskId),
    Task(LeasedTask),
    None,
    Yes,
    No,
    Ok,
    Error,
}

impl Reply {
    pub fn from_bool(value: bool) -> Self {
        if value { Reply::Yes } else { Reply::No }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Reply::TaskId(id) => id.to_string().into_bytes(),
            Reply::Task(task) => {
                format!("{} {} {}", task.id, task.length, task.payload).into_bytes()
            }
            Reply::None => b"NONE".to_vec(),
            Reply::Yes => b"YES".to_vec(),
            Reply::No => b"NO".to_vec(),
            Reply::Ok => b"OK".to_vec(),
            Reply::Error => b"ERROR".to_vec(),
        }
    }
}
