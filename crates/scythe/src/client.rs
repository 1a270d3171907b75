//! Typed calls over any [`Bridge`].
//!
//! `call` is the raw path: JSON params in, Response out, host failures
//! included. The named helpers treat a failure Response as
//! [`BridgeError::Rejected`] and pull out the one value callers want.
//! Track and item indices are 0-based here, as on the wire.

use scytheproto::{Object, Request, Response, Value};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::bridge::Bridge;
use crate::error::BridgeError;

/// A note for [`BridgeClient::add_notes`]. Times are in beats from the item start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteSpec {
    pub pitch: u8,
    pub start: f64,
    pub duration: f64,
    pub velocity: u8,
    pub channel: u8,
}

impl NoteSpec {
    pub fn new(pitch: u8, start: f64, duration: f64) -> Self {
        Self {
            pitch,
            start,
            duration,
            velocity: 100,
            channel: 0,
        }
    }

    pub fn with_velocity(mut self, velocity: u8) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }
}

/// What a script returned and printed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptOutput {
    pub result: Option<String>,
    pub console: Option<String>,
}

pub struct BridgeClient<B> {
    bridge: B,
}

impl<B: Bridge> BridgeClient<B> {
    pub fn new(bridge: B) -> Self {
        Self { bridge }
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn into_inner(self) -> B {
        self.bridge
    }

    /// Send one command. `params` must be a JSON object or null.
    #[instrument(skip(self, params), fields(transport = %self.bridge.kind()))]
    pub async fn call(
        &self,
        command: &str,
        params: serde_json::Value,
    ) -> Result<Response, BridgeError> {
        let params = match Value::from(params) {
            Value::Null => Object::new(),
            Value::Object(map) => map,
            other => return Err(BridgeError::InvalidParams(other.type_name())),
        };
        let response = self
            .bridge
            .send(Request::new(command).with_params(params))
            .await?;
        debug!(success = response.is_success(), "response received");
        Ok(response)
    }

    async fn call_ok(
        &self,
        command: &str,
        params: serde_json::Value,
    ) -> Result<Response, BridgeError> {
        let response = self.call(command, params).await?;
        match response.error() {
            Some(error) => Err(BridgeError::Rejected {
                command: command.to_string(),
                error: error.to_string(),
            }),
            None => Ok(response),
        }
    }

    async fn call_for_index(
        &self,
        command: &str,
        params: serde_json::Value,
        field: &'static str,
    ) -> Result<usize, BridgeError> {
        let response = self.call_ok(command, params).await?;
        response
            .data()
            .and_then(|data| data.get(field))
            .and_then(Value::as_i64)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| BridgeError::MissingData {
                command: command.to_string(),
                field,
            })
    }

    /// Project snapshot as JSON (tempo, time signature, track count, ...).
    pub async fn session_info(&self) -> Result<serde_json::Value, BridgeError> {
        let response = self.call_ok("get_session_info", json!({})).await?;
        Ok(data_json(&response))
    }

    pub async fn set_tempo(&self, bpm: f64) -> Result<(), BridgeError> {
        self.call_ok("set_tempo", json!({ "tempo": bpm })).await?;
        Ok(())
    }

    pub async fn set_time_signature(
        &self,
        numerator: u32,
        denominator: u32,
    ) -> Result<(), BridgeError> {
        self.call_ok(
            "set_time_signature",
            json!({ "numerator": numerator, "denominator": denominator }),
        )
        .await?;
        Ok(())
    }

    pub async fn list_tracks(&self) -> Result<Vec<serde_json::Value>, BridgeError> {
        let response = self.call_ok("list_tracks", json!({})).await?;
        match data_json(&response).get_mut("tracks").map(serde_json::Value::take) {
            Some(serde_json::Value::Array(tracks)) => Ok(tracks),
            _ => Err(BridgeError::MissingData {
                command: "list_tracks".to_string(),
                field: "tracks",
            }),
        }
    }

    /// Returns the new track's index.
    pub async fn create_track(&self, name: &str, index: Option<usize>) -> Result<usize, BridgeError> {
        let params = match index {
            Some(index) => json!({ "name": name, "index": index }),
            None => json!({ "name": name }),
        };
        self.call_for_index("create_track", params, "track_index").await
    }

    pub async fn select_track(&self, track: usize) -> Result<(), BridgeError> {
        self.call_ok("select_track", json!({ "track_index": track })).await?;
        Ok(())
    }

    pub async fn set_track_volume(&self, track: usize, volume: f64) -> Result<(), BridgeError> {
        self.call_ok(
            "set_track_volume",
            json!({ "track_index": track, "volume": volume }),
        )
        .await?;
        Ok(())
    }

    pub async fn set_track_pan(&self, track: usize, pan: f64) -> Result<(), BridgeError> {
        self.call_ok("set_track_pan", json!({ "track_index": track, "pan": pan }))
            .await?;
        Ok(())
    }

    pub async fn mute_track(&self, track: usize, muted: bool) -> Result<(), BridgeError> {
        self.call_ok("mute_track", json!({ "track_index": track, "muted": muted }))
            .await?;
        Ok(())
    }

    /// Position and length in beats. Returns the item index on that track.
    pub async fn insert_midi_item(
        &self,
        track: usize,
        position: f64,
        length: f64,
    ) -> Result<usize, BridgeError> {
        self.call_for_index(
            "insert_midi_item",
            json!({ "track_index": track, "position": position, "length": length }),
            "item_index",
        )
        .await
    }

    /// Returns how many notes were added. The host rejects the whole batch
    /// if any note is invalid.
    pub async fn add_notes(
        &self,
        track: usize,
        item: usize,
        notes: &[NoteSpec],
    ) -> Result<usize, BridgeError> {
        self.call_for_index(
            "add_notes",
            json!({ "track_index": track, "item_index": item, "notes": notes }),
            "added",
        )
        .await
    }

    pub async fn play(&self) -> Result<(), BridgeError> {
        self.call_ok("play", json!({})).await?;
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), BridgeError> {
        self.call_ok("stop", json!({})).await?;
        Ok(())
    }

    pub async fn goto_position(&self, seconds: f64) -> Result<(), BridgeError> {
        self.call_ok("goto_position", json!({ "seconds": seconds }))
            .await?;
        Ok(())
    }

    pub async fn trigger_action(&self, action_name: &str) -> Result<(), BridgeError> {
        self.call_ok("trigger_action", json!({ "action_name": action_name }))
            .await?;
        Ok(())
    }

    /// Returns the plugin's slot in the track's FX chain.
    pub async fn load_plugin(&self, track: usize, plugin_name: &str) -> Result<usize, BridgeError> {
        self.call_for_index(
            "load_plugin",
            json!({ "track_index": track, "plugin_name": plugin_name }),
            "fx_index",
        )
        .await
    }

    pub async fn execute_lua(&self, code: &str) -> Result<ScriptOutput, BridgeError> {
        let response = self.call_ok("execute_lua", json!({ "code": code })).await?;
        Ok(ScriptOutput {
            result: response.result,
            console: response.message,
        })
    }
}

fn data_json(response: &Response) -> serde_json::Value {
    match response.data() {
        Some(data) => Value::Object(data.clone()).into(),
        None => json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::TransportKind;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use scytheproto::object;
    use std::sync::Mutex;

    /// Answers every request with a canned Response and records what it saw.
    struct Canned {
        response: Response,
        seen: Mutex<Vec<Request>>,
    }

    #[async_trait]
    impl Bridge for Canned {
        async fn send(&self, request: Request) -> Result<Response, BridgeError> {
            self.seen.lock().unwrap().push(request);
            Ok(self.response.clone())
        }

        fn kind(&self) -> TransportKind {
            TransportKind::Socket
        }
    }

    fn client(response: Response) -> BridgeClient<Canned> {
        BridgeClient::new(Canned {
            response,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_call_rejects_non_object_params() {
        let c = client(Response::ok());
        let err = c.call("play", json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidParams("array")), "{err}");
        assert!(c.call("play", serde_json::Value::Null).await.is_ok());
    }

    #[tokio::test]
    async fn test_failure_response_is_ok_from_call_but_rejected_from_helpers() {
        let c = client(Response::fail("Invalid tempo"));
        let response = c.call("set_tempo", json!({"tempo": 5})).await.unwrap();
        assert_eq!(response.error(), Some("Invalid tempo"));

        let err = c.set_tempo(5.0).await.unwrap_err();
        assert_eq!(err.to_string(), "set_tempo failed: Invalid tempo");
    }

    #[tokio::test]
    async fn test_index_helpers_read_data() {
        let c = client(Response::ok_with(object! { "track_index" => 3 }));
        assert_eq!(c.create_track("Bass", Some(3)).await.unwrap(), 3);

        let seen = c.bridge().seen.lock().unwrap();
        assert_eq!(
            seen[0].params,
            object! { "name" => "Bass", "index" => 3 }
        );
    }

    #[tokio::test]
    async fn test_missing_data_field() {
        let c = client(Response::ok());
        let err = c.insert_midi_item(0, 0.0, 4.0).await.unwrap_err();
        assert!(matches!(err, BridgeError::MissingData { field: "item_index", .. }), "{err}");
    }

    #[tokio::test]
    async fn test_notes_are_sent_as_objects() {
        let c = client(Response::ok_with(object! { "added" => 1 }));
        let notes = [NoteSpec::new(60, 0.0, 1.0).with_velocity(90)];
        assert_eq!(c.add_notes(0, 0, &notes).await.unwrap(), 1);

        let seen = c.bridge().seen.lock().unwrap();
        let sent = seen[0].params.get("notes").and_then(Value::as_array).unwrap();
        assert_eq!(sent[0].get("velocity").and_then(Value::as_i64), Some(90));
        assert_eq!(sent[0].get("channel").and_then(Value::as_i64), Some(0));
    }
}
