mod common;

use std::time::Duration;

/// Scenario 1: an ordinary two-stage pipeline's output comes back on the
/// client's own stream.
#[test]
fn ordinary_pipeline_echoes_to_client() {
    let server = common::spawn_server();
    let mut client = common::connect(server.port);
    let _ = common::read_settled(&mut client, Duration::from_millis(200)); // banner + prompt

    common::send_line(&mut client, "/bin/echo hi | /usr/bin/wc -l");
    let out = common::read_settled(&mut client, Duration::from_millis(300));
    assert!(out.contains('1'), "expected a line count in output, got: {out}");
}

/// A single-stage pipeline with no disposition just writes straight back.
#[test]
fn single_stage_ordinary_writes_back() {
    let server = common::spawn_server();
    let mut client = common::connect(server.port);
    let _ = common::read_settled(&mut client, Duration::from_millis(200));

    common::send_line(&mut client, "/bin/echo hello-pipeline");
    let out = common::read_settled(&mut client, Duration::from_millis(300));
    assert!(out.contains("hello-pipeline"), "output was: {out}");
}

/// Unknown commands report per stage and don't hang the session.
#[test]
fn unknown_command_reports_and_keeps_session_alive() {
    let server = common::spawn_server();
    let mut client = common::connect(server.port);
    let _ = common::read_settled(&mut client, Duration::from_millis(200));

    common::send_line(&mut client, "this-command-does-not-exist-anywhere");
    let out = common::read_settled(&mut client, Duration::from_millis(300));
    assert!(out.contains("Unknown command"), "output was: {out}");

    common::send_line(&mut client, "/bin/echo still-alive");
    let out = common::read_settled(&mut client, Duration::from_millis(300));
    assert!(out.contains("still-alive"), "output was: {out}");
}
