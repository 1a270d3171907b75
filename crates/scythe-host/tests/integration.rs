//! Integration tests for the host bridge
//!
//! These drive the Dispatcher and the file poller the way the transports do:
//! raw wire text in, encoded Response out.

mod common {
    use scythe_host::{Dispatcher, FilePoller};
    use scytheconf::PollingConfig;
    use scytheproto::{DecodeMode, Request, Response};

    /// Send one wire line through a fresh dispatcher and decode the answer
    pub fn roundtrip(dispatcher: &mut Dispatcher, line: &str) -> Response {
        let response = dispatcher.dispatch_line(line);
        // Whatever the host produces must survive the strict decoder
        Response::decode(&response.encode(), DecodeMode::Strict).expect("response re-decodes")
    }

    pub fn poller() -> (tempfile::TempDir, FilePoller, Dispatcher) {
        let dir = tempfile::tempdir().expect("tempdir");
        let poller = FilePoller::new(&PollingConfig::in_dir(dir.path()));
        (dir, poller, Dispatcher::with_builtin_commands())
    }

    pub fn write_command(poller: &FilePoller, request: &Request) {
        std::fs::write(poller.command_path(), request.encode()).expect("write command");
    }
}

use pretty_assertions::assert_eq;
use scythe_host::{Dispatcher, PollOutcome};
use scytheproto::{object, Request, Value};

// ============================================================================
// Dispatch scenarios
// ============================================================================

#[test]
fn test_set_tempo_scenario() {
    let mut d = Dispatcher::with_builtin_commands();

    let ok = common::roundtrip(&mut d, r#"{"command":"set_tempo","params":{"tempo":120}}"#);
    assert_eq!(String::from_utf8(ok.encode()).unwrap(), r#"{"success":true}"#);

    let bad = common::roundtrip(&mut d, r#"{"command":"set_tempo","params":{"tempo":5}}"#);
    assert_eq!(
        String::from_utf8(bad.encode()).unwrap(),
        r#"{"error":"Invalid tempo","success":false}"#
    );
}

#[test]
fn test_unknown_command_is_safe() {
    let mut d = Dispatcher::with_builtin_commands();
    let response = common::roundtrip(&mut d, r#"{"command":"nonexistent_xyz","params":{}}"#);
    assert!(!response.is_success());
    assert!(response.error().unwrap().contains("Unknown command"));

    // The dispatcher is still usable afterwards
    assert!(common::roundtrip(&mut d, r#"{"command":"play"}"#).is_success());
}

#[test]
fn test_every_command_answers_with_a_boolean_success() {
    let mut d = Dispatcher::with_builtin_commands();
    d.dispatch(&Request::new("create_track").with_param("name", "Seed"));

    let names: Vec<String> = d.registry().names().into_iter().map(String::from).collect();
    for name in names {
        // Empty params exercise every handler's validation path
        let response = d.dispatch(&Request::new(name.as_str()));
        let value = response.to_value();
        assert!(
            matches!(value.get("success"), Some(Value::Bool(_))),
            "{} produced {}",
            name,
            value
        );
        if !response.is_success() {
            assert!(response.data().is_none(), "{} failure carried data", name);
        }
    }
}

#[test]
fn test_build_a_clip_over_the_wire() {
    let mut d = Dispatcher::with_builtin_commands();
    let lines = [
        r#"{"command":"create_track","params":{"name":"Bass"}}"#,
        r#"{"command":"insert_midi_item","params":{"track_index":0,"position":0,"length":8}}"#,
        r#"{"command":"add_notes","params":{"track_index":0,"item_index":0,"notes":[{"pitch":36,"start":0,"duration":1},{"pitch":43,"start":1.5,"duration":0.5,"velocity":90}]}}"#,
        r#"{"command":"load_plugin","params":{"track_index":0,"plugin_name":"ReaSynth"}}"#,
    ];
    for line in lines {
        let response = common::roundtrip(&mut d, line);
        assert!(response.is_success(), "{} -> {:?}", line, response);
    }

    let response = common::roundtrip(&mut d, r#"{"command":"list_tracks"}"#);
    let tracks = response.data().unwrap().get("tracks").unwrap().as_array().unwrap();
    assert_eq!(tracks[0].get("item_count"), Some(&Value::Number(1.0)));
    assert_eq!(tracks[0].get("fx_count"), Some(&Value::Number(1.0)));

    let labels: Vec<&str> = d
        .session()
        .undo_history()
        .iter()
        .map(|e| e.label.as_str())
        .collect();
    assert_eq!(labels, vec!["create_track", "insert_midi_item", "add_notes", "load_plugin"]);
}

#[test]
fn test_lenient_host_accepts_raw_control_characters() {
    let mut d = Dispatcher::with_builtin_commands();
    let line = "{\"command\":\"create_track\",\"params\":{\"name\":\"Tab\there\"}}";
    assert!(common::roundtrip(&mut d, line).is_success());
    assert_eq!(d.session().track(0).unwrap().name, "Tab\there");
}

#[test]
fn test_execute_lua_over_the_wire() {
    let mut d = Dispatcher::with_builtin_commands();
    let response = common::roundtrip(
        &mut d,
        r#"{"command":"execute_lua","params":{"code":"reaper.InsertTrackAtIndex(0, true) return reaper.CountTracks(0)"}}"#,
    );
    assert_eq!(response.result.as_deref(), Some("1"));
    assert_eq!(d.session().track_count(), 1);
}

// ============================================================================
// File polling
// ============================================================================

#[test]
fn test_equal_and_lower_timestamps_are_skipped() {
    let (_dir, mut poller, mut d) = common::poller();
    let create = |ts: f64| Request::new("create_track").with_param("name", "T").with_timestamp(ts);

    common::write_command(&poller, &create(1000.0));
    assert!(matches!(
        poller.poll_once(&mut d).unwrap(),
        PollOutcome::Dispatched { timestamp, .. } if timestamp == 1000.0
    ));

    common::write_command(&poller, &create(1000.0));
    assert_eq!(
        poller.poll_once(&mut d).unwrap(),
        PollOutcome::Duplicate { timestamp: 1000.0 }
    );

    common::write_command(&poller, &create(999.0));
    assert_eq!(
        poller.poll_once(&mut d).unwrap(),
        PollOutcome::Duplicate { timestamp: 999.0 }
    );

    assert_eq!(d.session().track_count(), 1);
    assert_eq!(poller.last_seen(), 1000.0);
}

#[test]
fn test_watermark_never_decreases() {
    let (_dir, mut poller, mut d) = common::poller();
    let timestamps = [5.0, 3.0, 7.5, 7.5, 2.0, 8.0, 0.5];
    let mut previous = poller.last_seen();
    let mut executed = Vec::new();

    for ts in timestamps {
        common::write_command(&poller, &Request::new("play").with_timestamp(ts));
        if let PollOutcome::Dispatched { timestamp, .. } = poller.poll_once(&mut d).unwrap() {
            executed.push(timestamp);
        }
        assert!(poller.last_seen() >= previous);
        previous = poller.last_seen();
    }

    assert_eq!(executed, vec![5.0, 7.5, 8.0]);
}

#[test]
fn test_same_file_polled_repeatedly_runs_once() {
    let (_dir, mut poller, mut d) = common::poller();
    common::write_command(
        &poller,
        &Request::new("create_track").with_params(object! { "name" => "Once" }).with_timestamp(42.0),
    );
    for _ in 0..5 {
        poller.poll_once(&mut d).unwrap();
    }
    assert_eq!(d.session().track_count(), 1);
}
