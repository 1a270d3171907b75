use scytheproto::{object, Object, Response};

use crate::params;
use crate::registry::{HandlerError, HandlerResult};
use crate::session::Session;

pub fn get_session_info(session: &mut Session, _params: &Object) -> HandlerResult {
    let (numerator, denominator) = session.time_signature();
    Ok(Response::ok_with(object! {
        "tempo" => session.tempo(),
        "time_signature" => format!("{}/{}", numerator, denominator),
        "numerator" => numerator,
        "denominator" => denominator,
        "track_count" => session.track_count(),
        "play_state" => session.play_state().as_str(),
        "cursor_position" => session.cursor(),
        "project_length" => session.project_end(),
        "host" => "scythe-host",
        "version" => env!("CARGO_PKG_VERSION"),
    }))
}

pub fn set_tempo(session: &mut Session, params: &Object) -> HandlerResult {
    let tempo = params::f64_req(params, "tempo")?;
    if !(20.0..=999.0).contains(&tempo) {
        return Err(HandlerError::invalid("Invalid tempo"));
    }
    session.set_tempo(tempo);
    Ok(Response::ok())
}

pub fn set_time_signature(session: &mut Session, params: &Object) -> HandlerResult {
    let numerator = params::i64_req(params, "numerator")?;
    let denominator = params::i64_req(params, "denominator")?;

    let valid_numerator = (1..=32).contains(&numerator);
    let valid_denominator = (1..=64).contains(&denominator) && (denominator as u64).is_power_of_two();
    if !valid_numerator || !valid_denominator {
        return Err(HandlerError::invalid("Invalid time signature"));
    }

    session.set_time_signature(numerator as u32, denominator as u32);
    Ok(Response::ok().with_message(format!("Time signature set to {}/{}", numerator, denominator)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scytheproto::Value;

    #[test]
    fn test_set_tempo_range() {
        let mut session = Session::new();
        assert!(set_tempo(&mut session, &object! { "tempo" => 120 }).unwrap().is_success());
        assert!(set_tempo(&mut session, &object! { "tempo" => 999 }).is_ok());
        let err = set_tempo(&mut session, &object! { "tempo" => 5 }).unwrap_err();
        assert_eq!(err.to_string(), "Invalid tempo");
        assert_eq!(session.tempo(), 999.0);
    }

    #[test]
    fn test_time_signature_rejects_odd_denominators() {
        let mut session = Session::new();
        assert!(set_time_signature(&mut session, &object! { "numerator" => 7, "denominator" => 8 }).is_ok());
        assert!(set_time_signature(&mut session, &object! { "numerator" => 3, "denominator" => 6 }).is_err());
        assert!(set_time_signature(&mut session, &object! { "numerator" => 0, "denominator" => 4 }).is_err());
        assert_eq!(session.time_signature(), (7, 8));
    }

    #[test]
    fn test_session_info_fields() {
        let mut session = Session::new();
        let response = get_session_info(&mut session, &Object::new()).unwrap();
        let data = response.data().unwrap();
        assert_eq!(data.get("tempo"), Some(&Value::Number(120.0)));
        assert_eq!(data.get("time_signature"), Some(&Value::from("4/4")));
        assert_eq!(data.get("play_state"), Some(&Value::from("stopped")));
    }
}
