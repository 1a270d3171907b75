use scytheproto::{object, Object, Response, Value};

use crate::params;
use crate::registry::{HandlerError, HandlerResult};
use crate::session::{Note, Session, PPQ};

fn beats_to_ticks(beats: f64) -> i64 {
    (beats * PPQ as f64).round() as i64
}

pub fn insert_midi_item(session: &mut Session, params: &Object) -> HandlerResult {
    let track = params::track_index(session, params)?;
    let position = params::f64_opt(params, "position")?.unwrap_or(0.0);
    let length = params::f64_opt(params, "length")?.unwrap_or(4.0);
    if position < 0.0 {
        return Err(HandlerError::invalid("Invalid parameter: position"));
    }
    if length <= 0.0 {
        return Err(HandlerError::invalid("Invalid parameter: length"));
    }

    let start = session.beats_to_seconds(position);
    let duration = session.beats_to_seconds(length);
    let item_index = session
        .insert_midi_item(track, start, duration)
        .ok_or_else(|| HandlerError::invalid("Track not found"))?;

    Ok(Response::ok_with(object! {
        "track_index" => track,
        "item_index" => item_index,
        "position_seconds" => start,
        "length_seconds" => duration,
    }))
}

/// Validate one note. Times are in beats relative to the item start.
fn parse_note(i: usize, value: &Value) -> Result<Note, HandlerError> {
    let bad = |field: &str| HandlerError::invalid(format!("Invalid note {}: {}", i, field));
    let note = value.as_object().ok_or_else(|| bad("not an object"))?;

    let number = |key: &str| note.get(key).filter(|v| !v.is_null()).map(|v| v.as_f64());

    let pitch = match note.get("pitch").and_then(Value::as_i64) {
        Some(p @ 0..=127) => p as u8,
        _ => return Err(bad("pitch")),
    };
    let start = match number("start") {
        Some(Some(s)) if s >= 0.0 && s.is_finite() => s,
        _ => return Err(bad("start")),
    };
    let duration = match number("duration") {
        Some(Some(d)) if d > 0.0 && d.is_finite() => d,
        _ => return Err(bad("duration")),
    };
    let velocity = match note.get("velocity").filter(|v| !v.is_null()) {
        None => 100,
        Some(v) => match v.as_i64() {
            Some(v @ 1..=127) => v as u8,
            _ => return Err(bad("velocity")),
        },
    };
    let channel = match note.get("channel").filter(|v| !v.is_null()) {
        None => 0,
        Some(v) => match v.as_i64() {
            Some(c @ 0..=15) => c as u8,
            _ => return Err(bad("channel")),
        },
    };

    Ok(Note {
        pitch,
        velocity,
        channel,
        start_tick: beats_to_ticks(start),
        length_ticks: beats_to_ticks(duration).max(1),
    })
}

/// All notes are validated before any is inserted.
pub fn add_notes(session: &mut Session, params: &Object) -> HandlerResult {
    let track = params::track_index(session, params)?;
    let item = params::index_req(params, "item_index")?;
    let raw = params::array_req(params, "notes")?;

    if session.item(track, item).is_none() {
        return Err(HandlerError::invalid("Item not found"));
    }

    let notes = raw
        .iter()
        .enumerate()
        .map(|(i, v)| parse_note(i, v))
        .collect::<Result<Vec<_>, _>>()?;

    let added = session
        .add_notes(track, item, notes)
        .ok_or_else(|| HandlerError::invalid("Item not found"))?;

    Ok(Response::ok_with(object! { "added" => added })
        .with_message(format!("Added {} notes", added)))
}
