//! Framing and codec behaviour over whole message streams.
//!
//! These exercise the properties both transports rely on: chunk boundaries
//! never change what the host sees, and anything the controller encodes the
//! host decodes back to the same structure.

use pretty_assertions::assert_eq;
use scytheproto::{encode_line, object, DecodeMode, LineFramer, Request, Value};

fn sample_requests() -> Vec<Request> {
    vec![
        Request::new("get_session_info"),
        Request::new("set_tempo").with_param("tempo", 120),
        Request::new("create_track").with_param("name", "Bass (808)\n\"sub\""),
        Request::new("add_notes").with_params(object! {
            "track_index" => 0,
            "item_index" => 0,
            "notes" => Value::Array(vec![
                Value::Object(object! { "pitch" => 36, "start" => 0, "duration" => 0.5, "velocity" => 110 }),
                Value::Object(object! { "pitch" => 38, "start" => 1.25, "duration" => 0.25 }),
            ]),
        }),
        Request::new("execute_lua").with_param("code", "reaper.ShowConsoleMsg(\"héllo\\n\")"),
    ]
}

fn stream_bytes(requests: &[Request]) -> Vec<u8> {
    requests
        .iter()
        .flat_map(|r| encode_line(&r.to_value()))
        .collect()
}

fn decode_all(lines: Vec<String>) -> Vec<Request> {
    lines
        .into_iter()
        .map(|line| Request::decode(line.as_bytes(), DecodeMode::Lenient).unwrap())
        .collect()
}

#[test]
fn test_single_read_yields_every_request() {
    let requests = sample_requests();
    let mut framer = LineFramer::new();
    let decoded = decode_all(framer.push(&stream_bytes(&requests)).unwrap());
    assert_eq!(decoded, requests);
    assert_eq!(framer.pending(), 0);
}

#[test]
fn test_every_two_way_split_matches_single_read() {
    let requests = sample_requests();
    let bytes = stream_bytes(&requests);

    for split in 0..=bytes.len() {
        let (a, b) = bytes.split_at(split);
        let mut framer = LineFramer::new();
        let mut lines = framer.push(a).unwrap();
        lines.extend(framer.push(b).unwrap());
        assert_eq!(decode_all(lines), requests, "split at byte {}", split);
    }
}

#[test]
fn test_byte_at_a_time_matches_single_read() {
    let requests = sample_requests();
    let bytes = stream_bytes(&requests);

    let mut framer = LineFramer::new();
    let mut lines = Vec::new();
    for b in &bytes {
        lines.extend(framer.push(std::slice::from_ref(b)).unwrap());
    }
    assert_eq!(decode_all(lines), requests);
}

#[test]
fn test_irregular_chunks_match_single_read() {
    let requests = sample_requests();
    let bytes = stream_bytes(&requests);

    // Deterministic but uneven chunk sizes
    let sizes = [1usize, 7, 3, 64, 2, 19, 5, 128, 11];
    let mut framer = LineFramer::new();
    let mut lines = Vec::new();
    let mut offset = 0;
    let mut i = 0;
    while offset < bytes.len() {
        let end = (offset + sizes[i % sizes.len()]).min(bytes.len());
        lines.extend(framer.push(&bytes[offset..end]).unwrap());
        offset = end;
        i += 1;
    }
    assert_eq!(decode_all(lines), requests);
}

#[test]
fn test_strict_and_lenient_agree_on_encoder_output() {
    for request in sample_requests() {
        let bytes = request.encode();
        let strict = Request::decode(&bytes, DecodeMode::Strict).unwrap();
        let lenient = Request::decode(&bytes, DecodeMode::Lenient).unwrap();
        assert_eq!(strict, request);
        assert_eq!(lenient, request);
    }
}
