use std::collections::VecDeque;

use libc::pid_t;

use crate::status;

/// Non-blockingly reap every child that has already finished. If none had,
/// block on the pending queue's head instead and pop it once collected.
///
/// This is the allocator described in the resource model: `pipe()`/`fork()`
/// call sites retry in a loop whose body is exactly this function, giving
/// backpressure on fd/process exhaustion without deadlocking (mirrors the
/// reference implementation's `mywait`).
pub fn reap_or_wait(pending: &mut VecDeque<pid_t>) {
    let mut reaped_any = false;
    loop {
        let mut raw_status: libc::c_int = 0;
        let pid = unsafe { libc::waitpid(-1, &mut raw_status, libc::WNOHANG) };
        if pid <= 0 {
            break;
        }
        if let Some(pos) = pending.iter().position(|&p| p == pid) {
            pending.remove(pos);
        }
        reaped_any = true;
    }

    if reaped_any {
        return;
    }

    if let Some(front) = pending.pop_front() {
        let mut raw_status: libc::c_int = 0;
        unsafe { libc::waitpid(front, &mut raw_status, 0) };
        log_nonzero_exit(front, raw_status);
    }
}

/// Blockingly wait for every pid in `pending`, in queue order, draining it.
/// Used for the "Ordinary"/"ToFile" wait policy — await everything destined
/// for the current line before returning from dispatch.
pub fn wait_all(pending: &mut VecDeque<pid_t>) {
    while let Some(pid) = pending.pop_front() {
        let mut raw_status: libc::c_int = 0;
        unsafe { libc::waitpid(pid, &mut raw_status, 0) };
        log_nonzero_exit(pid, raw_status);
    }
}

fn log_nonzero_exit(pid: pid_t, raw_status: libc::c_int) {
    match status::exit_code_from_wait_status(raw_status) {
        Some(code) if code != 0 => eprintln!("npshelld: pid {pid} exited with status {code}"),
        _ => {}
    }
}
