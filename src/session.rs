use std::collections::HashMap;
use std::io::Write;
use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, RawFd};

use crate::numbered_pipe::NumberedPipeTable;

/// Default nickname for a session that has never run `name`.
pub const DEFAULT_NICKNAME: &str = "(no name)";

/// One connected client's shell state: environment, line counter, and
/// numbered-pipe ring. Everything here is scoped to this session alone —
/// cross-session state (user pipes, liveness, broadcasts) is owned by the
/// multiplexer's `SessionTable` (spec §9: "raw fd arithmetic and shared
/// global arrays... become explicit structures owned by the multiplexer").
pub struct Session {
    pub user_id: u8,
    pub stream: TcpStream,
    pub peer_addr: String,
    pub nickname: String,
    pub env: HashMap<String, String>,
    pub line: u16,
    pub numbered_pipes: NumberedPipeTable,
    /// Bytes read from the socket but not yet split into a complete line.
    pub read_buf: Vec<u8>,
}

impl Session {
    /// A fresh session's env is cleared and seeded with just `PATH=bin:.`
    /// (spec §6) — `bin/` relative to the server's CWD, then the CWD
    /// itself, is the default program search path. `setenv`/`printenv`
    /// only ever touch this session's own copy.
    pub fn new(user_id: u8, stream: TcpStream, peer_addr: String) -> Self {
        let mut env = HashMap::new();
        env.insert("PATH".to_string(), "bin:.".to_string());

        Session {
            user_id,
            stream,
            peer_addr,
            nickname: DEFAULT_NICKNAME.to_string(),
            env,
            line: 0,
            numbered_pipes: NumberedPipeTable::new(),
            read_buf: Vec::new(),
        }
    }

    pub fn raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    /// Advance the ring counter. Only called for non-empty lines (spec §4.3:
    /// "empty lines are ignored and do not advance L").
    pub fn advance_line(&mut self) -> u16 {
        self.line = (self.line + 1) % crate::numbered_pipe::RING_SIZE as u16;
        self.line
    }

    pub fn write_line(&mut self, msg: &str) {
        let _ = self.stream.write_all(msg.as_bytes());
    }

    pub fn write_prompt(&mut self) {
        let _ = self.stream.write_all(b"% ");
    }

    /// Apply this session's environment to the real process environment.
    /// Must be called immediately before spawning this session's children
    /// and nowhere else (spec §9's stricter redesign of the reference
    /// implementation's inconsistent `unsetenv` cleanup path).
    pub fn apply_env(&self) {
        for (key, _) in std::env::vars() {
            // SAFETY: the server is single-threaded; no other code reads or
            // writes the process environment concurrently.
            unsafe { std::env::remove_var(key) };
        }
        for (key, value) in &self.env {
            unsafe { std::env::set_var(key, value) };
        }
    }
}
