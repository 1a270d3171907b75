use scytheproto::{object, Object, Response, Value};

use crate::params;
use crate::registry::{HandlerError, HandlerResult};
use crate::session::{Session, Track};

fn volume_db(volume: f64) -> Option<f64> {
    (volume > 0.0).then(|| 20.0 * volume.log10())
}

fn describe(index: usize, track: &Track) -> Value {
    Value::Object(object! {
        "index" => index,
        "name" => track.name.as_str(),
        "volume" => track.volume,
        "volume_db" => volume_db(track.volume),
        "pan" => track.pan,
        "muted" => track.muted,
        "solo" => track.solo,
        "armed" => track.armed,
        "selected" => track.selected,
        "fx_count" => track.fx.len(),
        "item_count" => track.items.len(),
    })
}

pub fn list_tracks(session: &mut Session, _params: &Object) -> HandlerResult {
    let tracks: Vec<Value> = session
        .tracks()
        .iter()
        .enumerate()
        .map(|(i, t)| describe(i, t))
        .collect();
    Ok(Response::ok_with(object! {
        "count" => tracks.len(),
        "tracks" => tracks,
    }))
}

pub fn create_track(session: &mut Session, params: &Object) -> HandlerResult {
    let name = params::str_opt(params, "name")?.unwrap_or("New Track");
    let index = params::index_opt(params, "index")?;
    let track_index = session.insert_track(index, name);
    Ok(Response::ok_with(object! { "track_index" => track_index, "name" => name })
        .with_message(format!("Created track '{}'", name)))
}

pub fn name_selected_track(session: &mut Session, params: &Object) -> HandlerResult {
    let name = params::str_req(params, "name")?;
    let selected = session.selected_indices();
    if selected.is_empty() {
        return Err(HandlerError::invalid("No track selected"));
    }
    for &index in &selected {
        if let Some(track) = session.edit_track(index, "rename") {
            track.name = name.to_string();
        }
    }
    Ok(Response::ok_with(object! { "renamed" => selected.len() }))
}

pub fn select_track(session: &mut Session, params: &Object) -> HandlerResult {
    let index = params::track_index(session, params)?;
    session.select_only(index);
    Ok(Response::ok())
}

pub fn set_track_volume(session: &mut Session, params: &Object) -> HandlerResult {
    let index = params::track_index(session, params)?;
    let volume = params::f64_req(params, "volume")?;
    if !(0.0..=4.0).contains(&volume) {
        return Err(HandlerError::invalid("Invalid volume"));
    }
    if let Some(track) = session.edit_track(index, "volume") {
        track.volume = volume;
    }
    Ok(Response::ok_with(object! { "volume" => volume, "volume_db" => volume_db(volume) }))
}

pub fn set_track_pan(session: &mut Session, params: &Object) -> HandlerResult {
    let index = params::track_index(session, params)?;
    let pan = params::f64_req(params, "pan")?;
    if !(-1.0..=1.0).contains(&pan) {
        return Err(HandlerError::invalid("Invalid pan"));
    }
    if let Some(track) = session.edit_track(index, "pan") {
        track.pan = pan;
    }
    Ok(Response::ok())
}

/// Shared body for the three boolean track switches.
fn set_flag(
    session: &mut Session,
    params: &Object,
    key: &str,
    apply: fn(&mut Track, bool),
) -> HandlerResult {
    let index = params::track_index(session, params)?;
    let on = params::bool_or(params, key, true)?;
    if let Some(track) = session.edit_track(index, key) {
        apply(track, on);
    }
    Ok(Response::ok_with(object! { key => on }))
}

pub fn mute_track(session: &mut Session, params: &Object) -> HandlerResult {
    set_flag(session, params, "muted", |t, on| t.muted = on)
}

pub fn solo_track(session: &mut Session, params: &Object) -> HandlerResult {
    set_flag(session, params, "solo", |t, on| t.solo = on)
}

pub fn arm_track(session: &mut Session, params: &Object) -> HandlerResult {
    set_flag(session, params, "armed", |t, on| t.armed = on)
}
