use std::fmt;

/// User-facing and internal error kinds surfaced by the shell.
///
/// Variants other than [`ShellError::Invariant`] render the exact `*** ... ***`
/// wire text the reference npshell prints on the offending session's stream;
/// the dispatch loop writes `Display` output directly and aborts the line
/// without mutating session state. `Invariant` denotes a parser state that
/// must be unreachable given the grammar and is never caught — it unwinds to
/// `main`, which logs it and terminates the server.
#[derive(Debug)]
pub enum ShellError {
    /// Referenced user id is not a live session.
    UnknownUser(u8),
    /// A `<N` source names a user pipe that has not been created yet.
    PipeMissing { from: u8, to: u8 },
    /// A `>N` disposition names a user pipe that is already pending.
    PipeExists { from: u8, to: u8 },
    /// `name` collided with another live session's nickname.
    DuplicateName(String),
    /// Tokenizer/parser rejected the line (bad integer, malformed sigil, …).
    Parse(String),
    /// A parser state that the grammar should make unreachable.
    Invariant(String),
}

impl fmt::Display for ShellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellError::UnknownUser(u) => {
                write!(f, "*** Error: user #{} does not exist yet. ***", u + 1)
            }
            ShellError::PipeMissing { from, to } => write!(
                f,
                "*** Error: the pipe #{}->#{} does not exist yet. ***",
                from + 1,
                to + 1
            ),
            ShellError::PipeExists { from, to } => write!(
                f,
                "*** Error: the pipe #{}->#{} already exists. ***",
                from + 1,
                to + 1
            ),
            ShellError::DuplicateName(name) => {
                write!(f, "*** User '{name}' already exists. ***")
            }
            ShellError::Parse(msg) => write!(f, "*** Error: {msg} ***"),
            ShellError::Invariant(msg) => write!(f, "npshelld: invariant violated: {msg}"),
        }
    }
}

impl std::error::Error for ShellError {}
