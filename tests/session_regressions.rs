mod common;

use std::time::Duration;

/// A fresh connection sees the banner, then the login broadcast naming it
/// "(no name)", then a prompt — in that order (spec §6).
#[test]
fn connect_sequence_is_banner_then_login_then_prompt() {
    let server = common::spawn_server();
    let mut client = common::connect(server.port);
    let out = common::read_settled(&mut client, Duration::from_millis(300));

    let banner_pos = out.find("Welcome").expect("banner missing");
    let login_pos = out.find("entered from").expect("login broadcast missing");
    let prompt_pos = out.rfind("% ").expect("prompt missing");
    assert!(banner_pos < login_pos, "banner should precede login broadcast: {out}");
    assert!(login_pos < prompt_pos, "login broadcast should precede prompt: {out}");
}

/// Scenario 6: two clients racing for the same nickname — the second one
/// loses and keeps its default name.
#[test]
fn duplicate_nickname_is_rejected() {
    let server = common::spawn_server();
    let mut first = common::connect(server.port);
    let _ = common::read_settled(&mut first, Duration::from_millis(200));
    let mut second = common::connect(server.port);
    let _ = common::read_settled(&mut second, Duration::from_millis(200));
    let _ = common::read_settled(&mut first, Duration::from_millis(100));

    common::send_line(&mut first, "name alice");
    let _ = common::read_settled(&mut first, Duration::from_millis(200));
    let _ = common::read_settled(&mut second, Duration::from_millis(100));

    common::send_line(&mut second, "name alice");
    let out = common::read_settled(&mut second, Duration::from_millis(300));
    assert!(out.contains("already exists"), "expected a duplicate-name error, got: {out}");
}

/// Scenario 7: closing the socket (EOF) tears the session down and frees
/// its slot without taking the server down with it.
#[test]
fn client_eof_frees_its_session_slot() {
    let server = common::spawn_server();
    let mut first = common::connect(server.port);
    let _ = common::read_settled(&mut first, Duration::from_millis(200));
    drop(first);

    std::thread::sleep(Duration::from_millis(200));

    let mut second = common::connect(server.port);
    let out = common::read_settled(&mut second, Duration::from_millis(300));
    assert!(out.contains("Welcome"), "server should still accept new clients: {out}");
}

/// `who` lists the caller with the `<-me` marker on their own row.
#[test]
fn who_marks_the_caller_row() {
    let server = common::spawn_server();
    let mut client = common::connect(server.port);
    let _ = common::read_settled(&mut client, Duration::from_millis(200));

    common::send_line(&mut client, "who");
    let out = common::read_settled(&mut client, Duration::from_millis(300));
    assert!(out.contains("<-me"), "expected the caller's row to be marked, got: {out}");
}

/// `printenv` on a key nobody ever `setenv`'d prints nothing and doesn't
/// error the session out.
#[test]
fn printenv_on_unset_key_is_idempotent_noop() {
    let server = common::spawn_server();
    let mut client = common::connect(server.port);
    let _ = common::read_settled(&mut client, Duration::from_millis(200));

    common::send_line(&mut client, "printenv NOPE_NOT_SET");
    let _ = common::read_settled(&mut client, Duration::from_millis(200));

    common::send_line(&mut client, "printenv NOPE_NOT_SET");
    let out = common::read_settled(&mut client, Duration::from_millis(200));
    assert!(!out.contains("NOPE_NOT_SET"), "unset key should print nothing, got: {out}");
}
