use std::collections::VecDeque;
use std::ffi::CString;
use std::os::unix::io::RawFd;

use libc::{c_int, pid_t};

use crate::parser::Stage;
use crate::reaper;

/// Spawn one child per stage, wiring stdin/stdout/stderr per spec §4.2:
/// stage 0 reads from `fin`, the last stage writes to `fout` (and also
/// duplicates its stderr there if `dup_stderr` is set), and intermediate
/// stages are connected by freshly created pipes. Every stage's stderr
/// defaults to `session_fd` unless overridden — there is no process-wide
/// fd hijack here, so "unchanged" stderr is wired explicitly rather than
/// inherited by coincidence. Spawned pids are pushed onto `pidout` as
/// they're forked, left to right.
///
/// `fin`/`fout`/`session_fd` are caller-owned — the executor never closes
/// them. Pipes created between stages are fully owned and closed here.
pub fn spawn_pipeline(
    stages: &[Stage],
    fin: RawFd,
    fout: RawFd,
    dup_stderr: bool,
    session_fd: RawFd,
    pidout: &mut VecDeque<pid_t>,
) {
    let n = stages.len();
    let mut created_prev: Option<(RawFd, RawFd)> = None;

    for (i, stage) in stages.iter().enumerate() {
        let is_last = i + 1 == n;
        let new_pipe = if is_last {
            None
        } else {
            Some(make_pipe_with_retry(pidout))
        };

        let this_stdin = if i == 0 { fin } else { created_prev.unwrap().0 };
        let this_stdout = if is_last { fout } else { new_pipe.unwrap().1 };
        let this_stderr = if is_last && dup_stderr { fout } else { session_fd };

        let pid = fork_with_retry(pidout);
        if pid == 0 {
            run_child(
                stage,
                this_stdin,
                this_stdout,
                this_stderr,
                new_pipe,
                created_prev,
            );
            unreachable!("run_child never returns");
        }

        pidout.push_back(pid);

        if let Some((read_fd, write_fd)) = created_prev.take() {
            close_fd(read_fd);
            close_fd(write_fd);
        }
        created_prev = new_pipe;
    }
}

/// Runs entirely in the forked child: wire fds, close everything not
/// needed, then `execvp`. Never returns — either `execvp` replaces the
/// image, or exec failed and the child reports and exits 0 (spec §4.2/§7).
fn run_child(
    stage: &Stage,
    this_stdin: RawFd,
    this_stdout: RawFd,
    this_stderr: RawFd,
    new_pipe: Option<(RawFd, RawFd)>,
    created_prev: Option<(RawFd, RawFd)>,
) -> ! {
    if this_stdin != 0 {
        unsafe { libc::dup2(this_stdin, 0) };
    }
    if this_stdout != 1 {
        unsafe { libc::dup2(this_stdout, 1) };
    }
    unsafe { libc::dup2(this_stderr, 2) };

    // Close every pipe fd this stage doesn't use as 0/1/2 — it inherited
    // the whole fd table across fork(), including ends meant for its
    // pipeline neighbors only. `this_stderr` is long-lived session/pipe
    // state owned by the caller and is never closed here.
    if this_stdin > 2 && this_stdin != 0 {
        close_fd(this_stdin);
    }
    if this_stdout > 2 && this_stdout != 1 && this_stdout != this_stdin {
        close_fd(this_stdout);
    }
    if let Some((read_fd, write_fd)) = new_pipe {
        if read_fd != this_stdin && read_fd != this_stdout {
            close_fd(read_fd);
        }
        if write_fd != this_stdout {
            close_fd(write_fd);
        }
    }
    if let Some((read_fd, write_fd)) = created_prev {
        if read_fd != this_stdin {
            close_fd(read_fd);
        }
        if write_fd != this_stdout {
            close_fd(write_fd);
        }
    }

    exec_argv(&stage.argv);
}

/// `execvp` the stage's argv; on failure, report and exit 0 per spec §4.2/§7.
fn exec_argv(argv: &[String]) -> ! {
    let cstrings: Vec<CString> = argv
        .iter()
        .map(|s| CString::new(s.as_str()).unwrap_or_else(|_| CString::new("?").unwrap()))
        .collect();
    let mut raw: Vec<*const libc::c_char> = cstrings.iter().map(|s| s.as_ptr()).collect();
    raw.push(std::ptr::null());

    unsafe { libc::execvp(raw[0], raw.as_ptr()) };

    eprintln!("Unknown command: [{}].", argv[0]);
    std::process::exit(0);
}

fn close_fd(fd: RawFd) {
    unsafe { libc::close(fd) };
}

/// Create a pipe, retrying via the reaper on transient exhaustion
/// (`pipe()` failing with EMFILE/ENFILE), matching the reference
/// implementation's unconditional pipe()-then-mywait retry loop.
fn make_pipe_with_retry(pidout: &mut VecDeque<pid_t>) -> (RawFd, RawFd) {
    loop {
        let mut fds: [c_int; 2] = [0; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if rc == 0 {
            return (fds[0], fds[1]);
        }
        reaper::reap_or_wait(pidout);
    }
}

/// Fork, retrying via the reaper on transient process exhaustion (EAGAIN).
fn fork_with_retry(pidout: &mut VecDeque<pid_t>) -> pid_t {
    loop {
        let pid = unsafe { libc::fork() };
        if pid != -1 {
            return pid;
        }
        reaper::reap_or_wait(pidout);
    }
}
