use crate::error::ShellError;
use crate::multiplexer::SessionTable;

/// The list of all builtin command names, recognized on the first
/// whitespace-separated token of a line (spec §4.4).
const BUILTINS: &[&str] = &["setenv", "printenv", "exit", "name", "who", "tell", "yell"];

pub fn is_builtin(word: &str) -> bool {
    BUILTINS.contains(&word)
}

/// What the dispatcher should do after a builtin has run.
pub enum Outcome {
    Continue,
    Exit,
}

/// Run a builtin against `uid`'s session. `line` is the full, already
/// trimmed command line — builtins that take a free-text tail (`tell`,
/// `yell`) split it themselves rather than going through the tokenizer, so
/// internal whitespace in the message survives.
pub fn dispatch(table: &mut SessionTable, uid: u8, line: &str) -> Outcome {
    let mut split = line.splitn(2, char::is_whitespace);
    let cmd = split.next().unwrap_or("");
    let rest = split.next().unwrap_or("").trim_start();

    match cmd {
        "setenv" => {
            setenv(table, uid, rest);
            Outcome::Continue
        }
        "printenv" => {
            printenv(table, uid, rest);
            Outcome::Continue
        }
        "exit" => Outcome::Exit,
        "name" => {
            name(table, uid, rest);
            Outcome::Continue
        }
        "who" => {
            who(table, uid);
            Outcome::Continue
        }
        "tell" => {
            tell(table, uid, rest);
            Outcome::Continue
        }
        "yell" => {
            yell(table, uid, rest);
            Outcome::Continue
        }
        other => unreachable!("dispatch called for non-builtin word '{other}'"),
    }
}

fn setenv(table: &mut SessionTable, uid: u8, rest: &str) {
    let mut parts = rest.split_whitespace();
    let Some(key) = parts.next() else { return };
    let value = parts.next().unwrap_or("");
    table
        .get_mut(uid)
        .expect("dispatch only runs against a live session")
        .env
        .insert(key.to_string(), value.to_string());
}

fn printenv(table: &mut SessionTable, uid: u8, rest: &str) {
    let key = rest.split_whitespace().next().unwrap_or("");
    let session = table.get_mut(uid).expect("dispatch only runs against a live session");
    if let Some(value) = session.env.get(key).cloned() {
        session.write_line(&format!("{value}\n"));
    }
}

fn name(table: &mut SessionTable, uid: u8, rest: &str) {
    let Some(new_name) = rest.split_whitespace().next() else {
        return;
    };

    if table.nickname_taken(new_name) {
        let session = table.get_mut(uid).expect("dispatch only runs against a live session");
        session.write_line(&format!("{}\n", ShellError::DuplicateName(new_name.to_string())));
        return;
    }

    let addr = table
        .get(uid)
        .expect("dispatch only runs against a live session")
        .peer_addr
        .clone();
    table
        .get_mut(uid)
        .expect("dispatch only runs against a live session")
        .nickname = new_name.to_string();
    table.broadcast(&format!("*** User from {addr} is named '{new_name}'. ***\n"));
}

fn who(table: &mut SessionTable, uid: u8) {
    let mut out = String::from("<ID>\t<nickname>\t<IP/port>\t<indicate me>\n");
    for other in table.live_ids() {
        let session = table.get(other).expect("live_ids only yields live sessions");
        out.push_str(&format!("{}\t{}\t{}", other + 1, session.nickname, session.peer_addr));
        if other == uid {
            out.push_str("\t<-me");
        }
        out.push('\n');
    }
    table
        .get_mut(uid)
        .expect("dispatch only runs against a live session")
        .write_line(&out);
}

fn tell(table: &mut SessionTable, uid: u8, rest: &str) {
    let mut parts = rest.splitn(2, char::is_whitespace);
    let Some(target_str) = parts.next().filter(|s| !s.is_empty()) else {
        return;
    };
    let message = parts.next().unwrap_or("").trim_start();

    let Ok(target_number) = target_str.parse::<u32>() else {
        return;
    };
    if target_number == 0 {
        return;
    }
    let target = (target_number - 1) as u8;

    if target as usize >= crate::user_pipe::MAX_USERS || !table.is_live(target) {
        table
            .get_mut(uid)
            .expect("dispatch only runs against a live session")
            .write_line(&format!("{}\n", ShellError::UnknownUser(target)));
        return;
    }

    let my_name = table
        .get(uid)
        .expect("dispatch only runs against a live session")
        .nickname
        .clone();
    let text = format!("*** {my_name} told you ***: {message}\n");
    table
        .get_mut(target)
        .expect("checked live above")
        .write_line(&text);
}

fn yell(table: &mut SessionTable, uid: u8, message: &str) {
    let my_name = table
        .get(uid)
        .expect("dispatch only runs against a live session")
        .nickname
        .clone();
    table.broadcast(&format!("*** {my_name} yelled ***: {message}\n"));
}
