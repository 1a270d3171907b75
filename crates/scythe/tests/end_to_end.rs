//! End-to-end tests: controller bridges against a real host dispatcher
//!
//! The host half runs the way the `scythe-host` binary runs it: socket link
//! and file poller as local tasks sharing one Dispatcher.

mod common {
    use scythe_host::{Dispatcher, FilePoller, SocketLink};
    use scytheconf::{PollingConfig, SocketConfig};
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;
    use tokio::sync::broadcast;
    use tokio::task::LocalSet;

    pub struct Host {
        pub local: LocalSet,
        pub dispatcher: Rc<RefCell<Dispatcher>>,
        pub shutdown: broadcast::Sender<()>,
    }

    impl Host {
        pub fn new() -> Self {
            let (shutdown, _) = broadcast::channel(1);
            Self {
                local: LocalSet::new(),
                dispatcher: Rc::new(RefCell::new(Dispatcher::with_builtin_commands())),
                shutdown,
            }
        }

        /// Dial the controller at `port` with short timers.
        pub fn spawn_link(&self, port: u16) {
            let config = SocketConfig {
                port,
                recv_timeout_ms: 20,
                reconnect_interval_ms: 50,
                ..SocketConfig::default()
            };
            let link = SocketLink::new(&config);
            self.local
                .spawn_local(link.run(self.dispatcher.clone(), self.shutdown.subscribe()));
        }

        pub fn spawn_poller(&self, config: &PollingConfig) {
            let poller = FilePoller::new(config);
            self.local
                .spawn_local(poller.run(self.dispatcher.clone(), self.shutdown.subscribe()));
        }
    }

    pub fn controller_socket() -> SocketConfig {
        SocketConfig {
            port: 0,
            request_timeout_ms: 2_000,
            ..SocketConfig::default()
        }
    }

    pub fn polling(dir: &Path) -> PollingConfig {
        PollingConfig {
            interval_ms: 10,
            response_poll_ms: 10,
            response_timeout_ms: 2_000,
            ..PollingConfig::in_dir(dir)
        }
    }
}

use pretty_assertions::assert_eq;
use scythe::{Bridge, BridgeClient, BridgeError, FileBridge, NoteSpec, SocketBridge, TransportKind};
use serde_json::json;
use std::time::Duration;

// ============================================================================
// Socket transport
// ============================================================================

#[tokio::test]
async fn test_socket_build_a_clip() {
    let host = common::Host::new();
    let bridge = SocketBridge::bind(&common::controller_socket()).await.unwrap();
    host.spawn_link(bridge.local_addr().port());

    host.local
        .run_until(async {
            bridge.wait_for_host(Duration::from_secs(2)).await.unwrap();
            let client = BridgeClient::new(&bridge);

            let track = client.create_track("Lead", None).await.unwrap();
            assert_eq!(track, 0);
            let item = client.insert_midi_item(track, 0.0, 4.0).await.unwrap();
            let notes = [NoteSpec::new(60, 0.0, 1.0), NoteSpec::new(64, 1.0, 1.0)];
            assert_eq!(client.add_notes(track, item, &notes).await.unwrap(), 2);
            client.load_plugin(track, "ReaSynth").await.unwrap();
            client.set_tempo(128.0).await.unwrap();
        })
        .await;

    let dispatcher = host.dispatcher.borrow();
    let session = dispatcher.session();
    assert_eq!(session.tempo(), 128.0);
    assert_eq!(session.track_count(), 1);
    let labels: Vec<&str> = session
        .undo_history()
        .iter()
        .map(|e| e.label.as_str())
        .collect();
    assert_eq!(
        labels,
        vec!["create_track", "insert_midi_item", "add_notes", "load_plugin", "set_tempo"]
    );
}

#[tokio::test]
async fn test_socket_failures_come_back_as_responses() {
    let host = common::Host::new();
    let bridge = SocketBridge::bind(&common::controller_socket()).await.unwrap();
    host.spawn_link(bridge.local_addr().port());

    host.local
        .run_until(async {
            bridge.wait_for_host(Duration::from_secs(2)).await.unwrap();
            let client = BridgeClient::new(&bridge);

            let response = client
                .call("set_tempo", json!({ "tempo": 5 }))
                .await
                .unwrap();
            assert_eq!(response.error(), Some("Invalid tempo"));

            let response = client.call("nonexistent_xyz", json!({})).await.unwrap();
            assert_eq!(response.error(), Some("Unknown command: nonexistent_xyz"));

            let err = client.set_track_volume(7, 1.0).await.unwrap_err();
            assert_eq!(err.to_string(), "set_track_volume failed: Track not found");

            // Still serving after all of that
            assert!(client.call("play", json!({})).await.unwrap().is_success());
        })
        .await;
}

#[tokio::test]
async fn test_socket_lua_round_trip() {
    let host = common::Host::new();
    let bridge = SocketBridge::bind(&common::controller_socket()).await.unwrap();
    host.spawn_link(bridge.local_addr().port());

    host.local
        .run_until(async {
            bridge.wait_for_host(Duration::from_secs(2)).await.unwrap();
            let client = BridgeClient::new(&bridge);
            client.create_track("Drums", None).await.unwrap();

            let output = client
                .execute_lua("print('tracks:', reaper.CountTracks())\nreturn reaper.CountTracks()")
                .await
                .unwrap();
            assert_eq!(output.result.as_deref(), Some("1"));
            assert!(output.console.unwrap_or_default().contains("tracks:"));
        })
        .await;
}

#[tokio::test]
async fn test_socket_host_reconnects_after_controller_restart() {
    let host = common::Host::new();
    let first = SocketBridge::bind(&common::controller_socket()).await.unwrap();
    let port = first.local_addr().port();
    host.spawn_link(port);

    host.local
        .run_until(async {
            first.wait_for_host(Duration::from_secs(2)).await.unwrap();
            first.shutdown().await;
            drop(first);

            // Same port, new listener; the link comes back after its interval
            let config = scytheconf::SocketConfig {
                port,
                ..common::controller_socket()
            };
            let second = SocketBridge::bind(&config).await.unwrap();
            second.wait_for_host(Duration::from_secs(2)).await.unwrap();
            assert!(second.send(scytheproto::Request::new("stop")).await.unwrap().is_success());
        })
        .await;
}

// ============================================================================
// File-polling transport
// ============================================================================

#[tokio::test]
async fn test_file_transport_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::polling(dir.path());
    let host = common::Host::new();
    host.spawn_poller(&config);
    let bridge = FileBridge::new(&config).unwrap();
    assert_eq!(bridge.kind(), TransportKind::File);

    host.local
        .run_until(async {
            let client = BridgeClient::new(&bridge);
            client.set_tempo(90.0).await.unwrap();
            let track = client.create_track("Pad", None).await.unwrap();
            client.mute_track(track, true).await.unwrap();

            let response = client
                .call("set_tempo", json!({ "tempo": 5 }))
                .await
                .unwrap();
            assert_eq!(response.error(), Some("Invalid tempo"));
        })
        .await;

    let dispatcher = host.dispatcher.borrow();
    assert_eq!(dispatcher.session().tempo(), 90.0);
    assert!(dispatcher.session().track(0).unwrap().muted);
}

#[tokio::test]
async fn test_file_transport_without_host_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let config = scytheconf::PollingConfig {
        response_timeout_ms: 100,
        ..common::polling(dir.path())
    };
    let bridge = FileBridge::new(&config).unwrap();

    let err = bridge.send(scytheproto::Request::new("play")).await.unwrap_err();
    assert!(matches!(err, BridgeError::Timeout(_)), "{err}");
    assert!(err.is_transient());
}
