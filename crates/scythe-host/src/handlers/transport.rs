use scytheproto::{object, Object, Response};

use crate::params;
use crate::registry::{HandlerError, HandlerResult};
use crate::session::{self, Session, ACTIONS};

fn run(session: &mut Session, name: &str) -> HandlerResult {
    let id = session::action_id(name)
        .ok_or_else(|| HandlerError::invalid(format!("Unknown action: {}", name)))?;
    session.run_action(id);
    Ok(Response::ok_with(object! { "play_state" => session.play_state().as_str() }))
}

pub fn play(session: &mut Session, _params: &Object) -> HandlerResult {
    run(session, "play")
}

pub fn stop(session: &mut Session, _params: &Object) -> HandlerResult {
    run(session, "stop")
}

/// Toggles, like the host's pause button.
pub fn pause(session: &mut Session, _params: &Object) -> HandlerResult {
    run(session, "pause")
}

pub fn record(session: &mut Session, _params: &Object) -> HandlerResult {
    run(session, "record")
}

pub fn goto_position(session: &mut Session, params: &Object) -> HandlerResult {
    let seconds = params::f64_req(params, "seconds")?;
    if seconds < 0.0 {
        return Err(HandlerError::invalid("Invalid position"));
    }
    session.set_cursor(seconds);
    Ok(Response::ok_with(object! { "cursor_position" => seconds }))
}

/// By name (`"goto_end"`), by id (`40043`), or by id given as a string.
pub fn trigger_action(session: &mut Session, params: &Object) -> HandlerResult {
    let id = match (
        params::str_opt(params, "action_name")?,
        params::i64_opt(params, "action_id")?,
    ) {
        (Some(name), _) => match name.trim().parse::<i64>() {
            Ok(id) => id,
            Err(_) => session::action_id(name)
                .map(i64::from)
                .ok_or_else(|| HandlerError::invalid(format!("Unknown action: {}", name)))?,
        },
        (None, Some(id)) => id,
        (None, None) => {
            return Err(HandlerError::invalid("Missing parameter: action_name"));
        }
    };

    let known = u32::try_from(id).ok().filter(|id| ACTIONS.iter().any(|(_, a)| a == id));
    let Some(id) = known else {
        return Err(HandlerError::invalid(format!("Unknown action: {}", id)));
    };
    session.run_action(id);
    Ok(Response::ok_with(object! { "action_id" => id }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PlayState;

    #[test]
    fn test_transport_states() {
        let mut session = Session::new();
        play(&mut session, &Object::new()).unwrap();
        assert_eq!(session.play_state(), PlayState::Playing);
        pause(&mut session, &Object::new()).unwrap();
        assert_eq!(session.play_state(), PlayState::Paused);
        pause(&mut session, &Object::new()).unwrap();
        assert_eq!(session.play_state(), PlayState::Playing);
        stop(&mut session, &Object::new()).unwrap();
        assert_eq!(session.play_state(), PlayState::Stopped);
    }

    #[test]
    fn test_trigger_action_by_name_and_id() {
        let mut session = Session::new();
        trigger_action(&mut session, &object! { "action_name" => "insert_track" }).unwrap();
        trigger_action(&mut session, &object! { "action_id" => 40001 }).unwrap();
        trigger_action(&mut session, &object! { "action_name" => "40001" }).unwrap();
        assert_eq!(session.track_count(), 3);

        let err = trigger_action(&mut session, &object! { "action_name" => "explode" }).unwrap_err();
        assert_eq!(err.to_string(), "Unknown action: explode");
        let err = trigger_action(&mut session, &object! { "action_id" => 99 }).unwrap_err();
        assert_eq!(err.to_string(), "Unknown action: 99");
    }

    #[test]
    fn test_goto_position_rejects_negative() {
        let mut session = Session::new();
        assert!(goto_position(&mut session, &object! { "seconds" => -1 }).is_err());
        goto_position(&mut session, &object! { "seconds" => 12.5 }).unwrap();
        assert_eq!(session.cursor(), 12.5);
    }
}
