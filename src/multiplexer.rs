use std::io::{self, Read};
use std::net::{TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};

use crate::builtins;
use crate::error::ShellError;
use crate::parser::{self, Disposition, Source};
use crate::reaper;
use crate::session::Session;
use crate::user_pipe::{MAX_USERS, UserPipeMatrix};

const WELCOME_BANNER: &str = "\
****************************************\r\n\
** Welcome to the information server. **\r\n\
****************************************\r\n";

/// Owns every live [`Session`] plus the cross-session [`UserPipeMatrix`].
/// Carved out of the per-session state (spec §9) precisely because Rust
/// won't let a `Session` hold references to its siblings — this is the
/// explicit structure the reference implementation's global arrays become.
pub struct SessionTable {
    sessions: [Option<Session>; MAX_USERS],
    pub user_pipes: UserPipeMatrix,
}

impl SessionTable {
    pub fn new() -> Self {
        SessionTable {
            sessions: std::array::from_fn(|_| None),
            user_pipes: UserPipeMatrix::new(),
        }
    }

    pub fn is_live(&self, uid: u8) -> bool {
        (uid as usize) < MAX_USERS && self.sessions[uid as usize].is_some()
    }

    pub fn get(&self, uid: u8) -> Option<&Session> {
        self.sessions.get(uid as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, uid: u8) -> Option<&mut Session> {
        self.sessions.get_mut(uid as usize)?.as_mut()
    }

    pub fn lowest_free(&self) -> Option<u8> {
        (0..MAX_USERS as u8).find(|&uid| !self.is_live(uid))
    }

    pub fn insert(&mut self, uid: u8, session: Session) {
        self.sessions[uid as usize] = Some(session);
    }

    /// Tear down a session: release (not await) its pending children, close
    /// every fd it owns, and drop the socket.
    pub fn remove(&mut self, uid: u8) {
        if let Some(mut session) = self.sessions[uid as usize].take() {
            session.numbered_pipes.close_all();
        }
        self.user_pipes.teardown_user(uid);
    }

    pub fn nickname_taken(&self, name: &str) -> bool {
        self.sessions.iter().flatten().any(|s| s.nickname == name)
    }

    pub fn live_ids(&self) -> impl Iterator<Item = u8> + '_ {
        (0..MAX_USERS as u8).filter(|&uid| self.is_live(uid))
    }

    /// Best-effort write to every live session; a write failure here just
    /// means that peer will be reaped on its own next EOF (spec §4.6).
    pub fn broadcast(&mut self, message: &str) {
        crate::broadcast::broadcast(&mut self.sessions, message);
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Bind a listening socket with `SO_REUSEADDR` set, matching the reference
/// implementation's `mysock()` — `std::net::TcpListener::bind` alone does
/// not request address reuse, so the socket is built from raw libc calls
/// and handed back as a standard `TcpListener`.
pub fn bind_listener(port: u16) -> io::Result<TcpListener> {
    unsafe {
        let fd = libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0);
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let on: libc::c_int = 1;
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &on as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );

        let mut addr: libc::sockaddr_in = std::mem::zeroed();
        addr.sin_family = libc::AF_INET as libc::sa_family_t;
        addr.sin_port = port.to_be();
        addr.sin_addr.s_addr = libc::INADDR_ANY.to_be();

        let bind_rc = libc::bind(
            fd,
            &addr as *const _ as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        );
        if bind_rc != 0 {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err);
        }

        if libc::listen(fd, 32) != 0 {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err);
        }

        Ok(TcpListener::from_raw_fd(fd))
    }
}

/// Accept-and-dispatch loop: polls the listener plus every live session fd
/// with `libc::poll` and services whichever is ready, one socket at a time
/// (spec §4.5 — cooperative single-threaded multiplexing, never more than
/// one client's line in flight at once).
pub fn run(listener: &TcpListener) {
    let mut table = SessionTable::new();

    loop {
        let mut pollfds = vec![libc::pollfd {
            fd: listener.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        }];
        let live: Vec<u8> = table.live_ids().collect();
        for &uid in &live {
            pollfds.push(libc::pollfd {
                fd: table.get(uid).unwrap().raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            });
        }

        let rc = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, -1) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            panic!("poll failed: {err}");
        }

        if pollfds[0].revents & libc::POLLIN != 0 {
            accept_one(listener, &mut table);
        }

        for (slot, &uid) in live.iter().enumerate() {
            let revents = pollfds[slot + 1].revents;
            if revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) == 0 {
                continue;
            }
            if !service_session(&mut table, uid) {
                table.broadcast(&format!(
                    "*** User '{}' left. ***\n",
                    table.get(uid).map(|s| s.nickname.clone()).unwrap_or_default()
                ));
                table.remove(uid);
            }
        }
    }
}

fn accept_one(listener: &TcpListener, table: &mut SessionTable) {
    let (stream, addr) = match listener.accept() {
        Ok(pair) => pair,
        Err(_) => return,
    };
    let Some(uid) = table.lowest_free() else {
        drop(stream);
        return;
    };

    let _ = stream.set_nonblocking(true);
    let peer_addr = format!("{}/{}", addr.ip(), addr.port());
    let mut session = Session::new(uid, stream, peer_addr);
    session.write_line(WELCOME_BANNER);
    table.insert(uid, session);

    table.broadcast(&format!(
        "*** User '(no name)' entered from {}. ***\n",
        table.get(uid).unwrap().peer_addr
    ));

    table.get_mut(uid).unwrap().write_prompt();
}

/// Drain whatever is available on `uid`'s socket and dispatch every
/// complete line found. Returns `false` if the session should be torn
/// down (EOF, a read error, or the `exit` builtin).
fn service_session(table: &mut SessionTable, uid: u8) -> bool {
    let mut chunk = [0u8; 4096];
    loop {
        let read_result = table.get_mut(uid).unwrap().stream.read(&mut chunk);
        match read_result {
            Ok(0) => return false,
            Ok(n) => {
                table.get_mut(uid).unwrap().read_buf.extend_from_slice(&chunk[..n]);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(_) => return false,
        }
    }

    loop {
        let line = {
            let session = table.get_mut(uid).unwrap();
            let Some(pos) = session.read_buf.iter().position(|&b| b == b'\n') else {
                break;
            };
            let raw: Vec<u8> = session.read_buf.drain(..=pos).collect();
            String::from_utf8_lossy(&raw).trim_end_matches(['\r', '\n']).to_string()
        };

        match dispatch_line(table, uid, &line) {
            builtins::Outcome::Exit => return false,
            builtins::Outcome::Continue => {
                if let Some(session) = table.get_mut(uid) {
                    session.write_prompt();
                } else {
                    return false;
                }
            }
        }
    }

    true
}

/// The full per-line dispatch state machine (spec §4.3). Runs a builtin
/// directly, or parses a pipeline and wires sources/dispositions through
/// the numbered-pipe ring and user-pipe matrix before handing the stages
/// to the executor.
fn dispatch_line(table: &mut SessionTable, uid: u8, line: &str) -> builtins::Outcome {
    let first_word = line.split_whitespace().next().unwrap_or("");
    if first_word.is_empty() {
        return builtins::Outcome::Continue;
    }

    let l = table.get_mut(uid).unwrap().advance_line();

    if builtins::is_builtin(first_word) {
        return builtins::dispatch(table, uid, line);
    }

    let pipeline = match parser::parse(line) {
        Ok(p) => p,
        Err(e) => {
            table.get_mut(uid).unwrap().write_line(&format!("{e}\n"));
            return builtins::Outcome::Continue;
        }
    };

    let offset = match pipeline.disposition {
        Disposition::NumberedOut(n) | Disposition::NumberedOutErr(n) => n,
        _ => 0,
    };
    let nline = l.wrapping_add(offset) % crate::numbered_pipe::RING_SIZE as u16;

    table
        .get_mut(uid)
        .unwrap()
        .numbered_pipes
        .carry_forward(l, nline);

    // --- source wiring ---
    let session_fd = table.get(uid).unwrap().raw_fd();
    let mut consumed_user_pipe: Option<u8> = None;
    let fin = match pipeline.source {
        Source::None => table
            .get(uid)
            .unwrap()
            .numbered_pipes
            .get(l)
            .read_fd()
            .unwrap_or(session_fd),
        Source::UserIn(producer) => {
            if !table.is_live(producer) {
                table
                    .get_mut(uid)
                    .unwrap()
                    .write_line(&format!("{}\n", ShellError::UnknownUser(producer)));
                return builtins::Outcome::Continue;
            }
            if !table.user_pipes.get(producer, uid).exists() {
                table.get_mut(uid).unwrap().write_line(&format!(
                    "{}\n",
                    ShellError::PipeMissing { from: producer, to: uid }
                ));
                return builtins::Outcome::Continue;
            }

            let my_name = table.get(uid).unwrap().nickname.clone();
            let their_name = table.get(producer).unwrap().nickname.clone();
            table.broadcast(&format!(
                "*** {my_name} (#{}) just received from {their_name} (#{}) by '{line}' ***\n",
                uid + 1,
                producer + 1
            ));

            let pids: Vec<_> = table.user_pipes.get_mut(producer, uid).pids.drain(..).collect();
            {
                let slot = table.get_mut(uid).unwrap().numbered_pipes.get_mut(nline);
                for pid in pids.into_iter().rev() {
                    slot.pids.push_front(pid);
                }
            }

            let slot = table.user_pipes.get_mut(producer, uid);
            let read_fd = slot.read_fd().unwrap();
            consumed_user_pipe = Some(producer);
            read_fd
        }
    };

    // --- disposition wiring ---
    let mut opened_file_fd: Option<RawFd> = None;
    let dup_stderr = matches!(pipeline.disposition, Disposition::NumberedOutErr(_));
    let fout = match &pipeline.disposition {
        // An ordinary pipeline has no numbered output; routing it through
        // NP[nline]'s write end would be self-referential whenever this
        // line drains that very slot (nline == l with the N=0 default),
        // handing the draining command its own pipe's write end as
        // stdout and deadlocking the Ordinary wait policy below.
        Disposition::Ordinary => session_fd,
        Disposition::ToFile(path) => match open_truncate(path) {
            Ok(fd) => {
                opened_file_fd = Some(fd);
                fd
            }
            Err(_) => {
                table
                    .get_mut(uid)
                    .unwrap()
                    .write_line(&format!("*** Error: cannot open {path} ***\n"));
                return builtins::Outcome::Continue;
            }
        },
        Disposition::NumberedOut(_) | Disposition::NumberedOutErr(_) => {
            let slot = table.get_mut(uid).unwrap().numbered_pipes.get_mut(nline);
            if !slot.is_latched() {
                let (read_fd, write_fd) = make_pipe();
                slot.latch(read_fd, write_fd);
            }
            slot.write_fd().unwrap()
        }
        Disposition::UserOut(consumer) => {
            let consumer = *consumer;
            if !table.is_live(consumer) {
                table
                    .get_mut(uid)
                    .unwrap()
                    .write_line(&format!("{}\n", ShellError::UnknownUser(consumer)));
                return builtins::Outcome::Continue;
            }
            if table.user_pipes.get(uid, consumer).exists() {
                table.get_mut(uid).unwrap().write_line(&format!(
                    "{}\n",
                    ShellError::PipeExists { from: uid, to: consumer }
                ));
                return builtins::Outcome::Continue;
            }
            let my_name = table.get(uid).unwrap().nickname.clone();
            let their_name = table.get(consumer).unwrap().nickname.clone();
            table.broadcast(&format!(
                "*** {my_name} (#{}) just piped '{line}' to {their_name} (#{}) ***\n",
                uid + 1,
                consumer + 1
            ));
            let (read_fd, write_fd) = make_pipe();
            table.user_pipes.get_mut(uid, consumer).create(read_fd, write_fd);
            write_fd
        }
    };

    table.get(uid).unwrap().apply_env();

    {
        let pidout = if let Disposition::UserOut(consumer) = pipeline.disposition {
            &mut table.user_pipes.get_mut(uid, consumer).pids
        } else {
            &mut table.get_mut(uid).unwrap().numbered_pipes.get_mut(nline).pids
        };
        crate::executor::spawn_pipeline(&pipeline.stages, fin, fout, dup_stderr, session_fd, pidout);
    }

    // Parent-side fd hygiene: close our own redundant copies now that the
    // children hold their own via fork. Order doesn't matter for safety
    // here since the children already forked with independent fd tables.
    {
        let l_slot = table.get_mut(uid).unwrap().numbered_pipes.get_mut(l);
        if l_slot.is_latched() {
            l_slot.close_and_reset();
        }
    }
    if let Some(producer) = consumed_user_pipe {
        table.user_pipes.get_mut(producer, uid).close_and_reset();
    }
    if let Some(fd) = opened_file_fd {
        unsafe { libc::close(fd) };
    }

    // --- wait policy ---
    if matches!(pipeline.disposition, Disposition::Ordinary | Disposition::ToFile(_)) {
        let pidout = &mut table.get_mut(uid).unwrap().numbered_pipes.get_mut(nline).pids;
        reaper::wait_all(pidout);
    }

    builtins::Outcome::Continue
}

fn make_pipe() -> (RawFd, RawFd) {
    let mut fds: [libc::c_int; 2] = [0; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(rc, 0, "pipe() exhaustion during dispatch is handled by the executor's own retry loop, not here");
    (fds[0], fds[1])
}

fn open_truncate(path: &str) -> io::Result<RawFd> {
    let cpath = std::ffi::CString::new(path).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    let fd = unsafe {
        libc::open(
            cpath.as_ptr(),
            libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
            0o666,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(fd)
}
