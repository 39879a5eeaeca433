/// Interpret a raw `waitpid` status the way shell exit-code semantics expect:
/// normal exit keeps its code, termination by signal maps to `128 + signal`.
/// Returns `None` if the status reports neither (e.g. `WIFSTOPPED`).
pub fn exit_code_from_wait_status(raw_status: libc::c_int) -> Option<i32> {
    if unsafe { libc::WIFEXITED(raw_status) } {
        return Some(unsafe { libc::WEXITSTATUS(raw_status) });
    }

    if unsafe { libc::WIFSIGNALED(raw_status) } {
        let signal = unsafe { libc::WTERMSIG(raw_status) };
        return Some(128 + signal);
    }

    None
}
