//! Text codec for [`Value`].
//!
//! Encoding always produces a single line: newlines and other control
//! characters inside strings are escaped, so the output can be framed with a
//! trailing `\n` without further quoting.
//!
//! Decoding comes in two flavours:
//!
//! - [`DecodeMode::Strict`] follows the JSON grammar: raw control characters,
//!   unknown escapes, lone surrogates and duplicate keys are errors.
//! - [`DecodeMode::Lenient`] mirrors the forgiving parser the host sandbox
//!   has always used: raw control characters pass through, an unknown escape
//!   yields the escaped character, lone surrogates become U+FFFD, duplicate
//!   keys keep the last value, and a trailing comma before `]`/`}` is ignored.
//!
//! Both modes fail closed: on any error no partial value is returned.
//! [`DecodeError::is_incomplete`] separates "the input stopped early" (a
//! reader caught a file mid-write) from genuinely malformed content.

use std::fmt::Write as _;

use crate::value::{Object, Value};

/// Maximum array/object nesting accepted by the decoder.
pub const MAX_DEPTH: usize = 128;

/// Largest magnitude for which integral numbers are rendered without a
/// fractional part.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Decoder strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeMode {
    #[default]
    Strict,
    Lenient,
}

/// Why decoding stopped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeErrorKind {
    #[error("empty input")]
    Empty,
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
    #[error("invalid number")]
    InvalidNumber,
    #[error("invalid escape sequence")]
    InvalidEscape,
    #[error("invalid unicode escape")]
    InvalidUnicode,
    #[error("control character in string")]
    ControlCharacter,
    #[error("duplicate key {0:?}")]
    DuplicateKey(String),
    #[error("trailing characters after value")]
    TrailingCharacters,
    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),
    #[error("invalid UTF-8")]
    InvalidUtf8,
}

/// Decoding failure with the byte offset where it was detected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at byte {offset}")]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub offset: usize,
}

impl DecodeError {
    fn new(kind: DecodeErrorKind, offset: usize) -> Self {
        Self { kind, offset }
    }

    /// True when the input ended before a complete value was read.
    ///
    /// A writer that has not finished (or a reader that raced it) produces
    /// this; retrying later may succeed. Anything else is malformed content.
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self.kind,
            DecodeErrorKind::Empty | DecodeErrorKind::UnexpectedEnd
        )
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a value as UTF-8 bytes (no trailing newline).
pub fn encode(value: &Value) -> Vec<u8> {
    encode_to_string(value).into_bytes()
}

/// Encode a value followed by a single `\n`, ready for a line-framed stream.
pub fn encode_line(value: &Value) -> Vec<u8> {
    let mut out = encode_to_string(value);
    out.push('\n');
    out.into_bytes()
}

pub(crate) fn encode_to_string(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(out, *n),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

fn write_number(out: &mut String, n: f64) {
    if !n.is_finite() {
        // No textual form survives a round trip; null is what JSON readers expect
        out.push_str("null");
    } else if n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER {
        let _ = write!(out, "{}", n as i64);
    } else {
        // f64's Display is the shortest text that parses back to the same bits
        let _ = write!(out, "{}", n);
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode with [`DecodeMode::Strict`].
pub fn decode(input: &[u8]) -> Result<Value, DecodeError> {
    decode_with(input, DecodeMode::Strict)
}

/// Decode with [`DecodeMode::Lenient`].
pub fn decode_lenient(input: &[u8]) -> Result<Value, DecodeError> {
    decode_with(input, DecodeMode::Lenient)
}

/// Decode a complete value; trailing whitespace is allowed, anything else
/// after the value is an error.
pub fn decode_with(input: &[u8], mode: DecodeMode) -> Result<Value, DecodeError> {
    let text = match std::str::from_utf8(input) {
        Ok(text) => std::borrow::Cow::Borrowed(text),
        // A multi-byte sequence cut off at the end is a truncated write
        Err(e) if e.error_len().is_none() => {
            return Err(DecodeError::new(DecodeErrorKind::UnexpectedEnd, e.valid_up_to()))
        }
        Err(_) if mode == DecodeMode::Lenient => String::from_utf8_lossy(input),
        Err(e) => return Err(DecodeError::new(DecodeErrorKind::InvalidUtf8, e.valid_up_to())),
    };

    let mut parser = Parser::new(&text, mode);
    parser.skip_whitespace();
    if parser.at_end() {
        return Err(DecodeError::new(DecodeErrorKind::Empty, 0));
    }
    let value = parser.parse_value()?;
    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(parser.error(DecodeErrorKind::TrailingCharacters));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
    mode: DecodeMode,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str, mode: DecodeMode) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            depth: 0,
            mode,
        }
    }

    fn lenient(&self) -> bool {
        self.mode == DecodeMode::Lenient
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn error(&self, kind: DecodeErrorKind) -> DecodeError {
        DecodeError::new(kind, self.pos)
    }

    fn unexpected_here(&self) -> DecodeError {
        match self.src.get(self.pos..).and_then(|rest| rest.chars().next()) {
            Some(c) => self.error(DecodeErrorKind::UnexpectedChar(c)),
            None => self.error(DecodeErrorKind::UnexpectedEnd),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(b' ' | b'\t' | b'\n' | b'\r') = self.peek() {
            self.pos += 1;
        }
    }

    fn parse_value(&mut self) -> Result<Value, DecodeError> {
        match self.peek() {
            None => Err(self.error(DecodeErrorKind::UnexpectedEnd)),
            Some(b'n') => self.parse_literal("null", Value::Null),
            Some(b't') => self.parse_literal("true", Value::Bool(true)),
            Some(b'f') => self.parse_literal("false", Value::Bool(false)),
            Some(b'"') => self.parse_string().map(Value::String),
            Some(b'[') => self.parse_array(),
            Some(b'{') => self.parse_object(),
            Some(b'-' | b'0'..=b'9') => self.parse_number(),
            Some(_) => Err(self.unexpected_here()),
        }
    }

    fn parse_literal(&mut self, word: &str, value: Value) -> Result<Value, DecodeError> {
        for expected in word.bytes() {
            match self.peek() {
                None => return Err(self.error(DecodeErrorKind::UnexpectedEnd)),
                Some(b) if b == expected => self.pos += 1,
                Some(_) => return Err(self.unexpected_here()),
            }
        }
        Ok(value)
    }

    fn eat_digits(&mut self) -> usize {
        let start = self.pos;
        while let Some(b'0'..=b'9') = self.peek() {
            self.pos += 1;
        }
        self.pos - start
    }

    /// Require at least one digit; running out of input is "incomplete".
    fn require_digits(&mut self) -> Result<(), DecodeError> {
        if self.eat_digits() > 0 {
            Ok(())
        } else if self.at_end() {
            Err(self.error(DecodeErrorKind::UnexpectedEnd))
        } else {
            Err(self.error(DecodeErrorKind::InvalidNumber))
        }
    }

    fn parse_number(&mut self) -> Result<Value, DecodeError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        match self.peek() {
            Some(b'0') => self.pos += 1,
            _ => self.require_digits()?,
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            self.require_digits()?;
        }
        if let Some(b'e' | b'E') = self.peek() {
            self.pos += 1;
            if let Some(b'+' | b'-') = self.peek() {
                self.pos += 1;
            }
            self.require_digits()?;
        }

        let text = &self.src[start..self.pos];
        match text.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(Value::Number(n)),
            _ => Err(DecodeError::new(DecodeErrorKind::InvalidNumber, start)),
        }
    }

    fn parse_string(&mut self) -> Result<String, DecodeError> {
        // Caller guarantees the opening quote
        self.pos += 1;
        let mut out = String::new();

        loop {
            let run_start = self.pos;
            while let Some(b) = self.peek() {
                if b == b'"' || b == b'\\' || b < 0x20 {
                    break;
                }
                self.pos += 1;
            }
            // Stop bytes are ASCII, so both ends sit on char boundaries
            out.push_str(&self.src[run_start..self.pos]);

            match self.peek() {
                None => return Err(self.error(DecodeErrorKind::UnexpectedEnd)),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'\\') => {
                    self.pos += 1;
                    self.parse_escape(&mut out)?;
                }
                Some(b) => {
                    if !self.lenient() {
                        return Err(self.error(DecodeErrorKind::ControlCharacter));
                    }
                    out.push(char::from(b));
                    self.pos += 1;
                }
            }
        }
    }

    fn parse_escape(&mut self, out: &mut String) -> Result<(), DecodeError> {
        let Some(b) = self.peek() else {
            return Err(self.error(DecodeErrorKind::UnexpectedEnd));
        };
        match b {
            b'"' => out.push('"'),
            b'\\' => out.push('\\'),
            b'/' => out.push('/'),
            b'n' => out.push('\n'),
            b'r' => out.push('\r'),
            b't' => out.push('\t'),
            b'b' => out.push('\u{8}'),
            b'f' => out.push('\u{c}'),
            b'u' => {
                self.pos += 1;
                let c = self.parse_unicode_escape()?;
                out.push(c);
                return Ok(());
            }
            _ => {
                if !self.lenient() {
                    return Err(self.error(DecodeErrorKind::InvalidEscape));
                }
                // Keep the escaped character itself (may be multi-byte)
                let c = self.src[self.pos..].chars().next().unwrap_or('\u{fffd}');
                out.push(c);
                self.pos += c.len_utf8();
                return Ok(());
            }
        }
        self.pos += 1;
        Ok(())
    }

    fn read_hex4(&mut self) -> Result<u32, DecodeError> {
        let mut code = 0u32;
        for _ in 0..4 {
            let Some(b) = self.peek() else {
                return Err(self.error(DecodeErrorKind::UnexpectedEnd));
            };
            let digit = char::from(b)
                .to_digit(16)
                .ok_or_else(|| self.error(DecodeErrorKind::InvalidUnicode))?;
            code = code * 16 + digit;
            self.pos += 1;
        }
        Ok(code)
    }

    /// Called with `pos` just past `\u`.
    fn parse_unicode_escape(&mut self) -> Result<char, DecodeError> {
        let first = self.read_hex4()?;

        if (0xDC00..0xE000).contains(&first) {
            return self.bad_surrogate();
        }
        if !(0xD800..0xDC00).contains(&first) {
            return char::from_u32(first).ok_or_else(|| self.error(DecodeErrorKind::InvalidUnicode));
        }

        // High surrogate: a `\uDC00`-`\uDFFF` partner must follow
        for expected in [b'\\', b'u'] {
            match self.peek() {
                None => return Err(self.error(DecodeErrorKind::UnexpectedEnd)),
                Some(b) if b == expected => self.pos += 1,
                Some(_) => return self.bad_surrogate(),
            }
        }
        let second = self.read_hex4()?;
        if !(0xDC00..0xE000).contains(&second) {
            return self.bad_surrogate();
        }
        let code = 0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00);
        char::from_u32(code).ok_or_else(|| self.error(DecodeErrorKind::InvalidUnicode))
    }

    fn bad_surrogate(&self) -> Result<char, DecodeError> {
        if self.lenient() {
            Ok('\u{fffd}')
        } else {
            Err(self.error(DecodeErrorKind::InvalidUnicode))
        }
    }

    fn enter(&mut self) -> Result<(), DecodeError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error(DecodeErrorKind::TooDeep(MAX_DEPTH)));
        }
        Ok(())
    }

    fn parse_array(&mut self) -> Result<Value, DecodeError> {
        self.enter()?;
        self.pos += 1;
        let mut items = Vec::new();

        self.skip_whitespace();
        if self.peek() == Some(b']') {
            self.pos += 1;
            self.depth -= 1;
            return Ok(Value::Array(items));
        }

        loop {
            self.skip_whitespace();
            items.push(self.parse_value()?);
            self.skip_whitespace();
            match self.peek() {
                None => return Err(self.error(DecodeErrorKind::UnexpectedEnd)),
                Some(b',') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    if self.lenient() && self.peek() == Some(b']') {
                        self.pos += 1;
                        break;
                    }
                }
                Some(b']') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => return Err(self.unexpected_here()),
            }
        }

        self.depth -= 1;
        Ok(Value::Array(items))
    }

    fn parse_object(&mut self) -> Result<Value, DecodeError> {
        self.enter()?;
        self.pos += 1;
        let mut map = Object::new();

        self.skip_whitespace();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            self.depth -= 1;
            return Ok(Value::Object(map));
        }

        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(self.error(DecodeErrorKind::UnexpectedEnd)),
                Some(b'"') => {}
                Some(_) => return Err(self.unexpected_here()),
            }
            let key_offset = self.pos;
            let key = self.parse_string()?;

            self.skip_whitespace();
            match self.peek() {
                None => return Err(self.error(DecodeErrorKind::UnexpectedEnd)),
                Some(b':') => self.pos += 1,
                Some(_) => return Err(self.unexpected_here()),
            }
            self.skip_whitespace();
            let value = self.parse_value()?;

            if map.contains_key(&key) && !self.lenient() {
                return Err(DecodeError::new(DecodeErrorKind::DuplicateKey(key), key_offset));
            }
            map.insert(key, value);

            self.skip_whitespace();
            match self.peek() {
                None => return Err(self.error(DecodeErrorKind::UnexpectedEnd)),
                Some(b',') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    if self.lenient() && self.peek() == Some(b'}') {
                        self.pos += 1;
                        break;
                    }
                }
                Some(b'}') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => return Err(self.unexpected_here()),
            }
        }

        self.depth -= 1;
        Ok(Value::Object(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object;
    use pretty_assertions::assert_eq;

    fn text(value: &Value) -> String {
        String::from_utf8(encode(value)).unwrap()
    }

    #[test]
    fn test_encode_request_shape() {
        let value = Value::Object(object! {
            "command" => "set_tempo",
            "params" => Value::Object(object! { "tempo" => 120 }),
        });
        assert_eq!(text(&value), r#"{"command":"set_tempo","params":{"tempo":120}}"#);
    }

    #[test]
    fn test_encode_numbers() {
        assert_eq!(text(&Value::Number(120.0)), "120");
        assert_eq!(text(&Value::Number(-3.0)), "-3");
        assert_eq!(text(&Value::Number(0.25)), "0.25");
        assert_eq!(text(&Value::Number(1000.5)), "1000.5");
        assert_eq!(text(&Value::Number(f64::NAN)), "null");
        assert_eq!(text(&Value::Number(f64::INFINITY)), "null");
    }

    #[test]
    fn test_encode_escapes_stay_on_one_line() {
        let value = Value::String("line1\nline2\t\"quoted\" back\\slash \u{1}".into());
        let encoded = text(&value);
        assert!(!encoded.contains('\n'));
        assert_eq!(
            encoded,
            r#""line1\nline2\t\"quoted\" back\\slash \u0001""#
        );
    }

    #[test]
    fn test_decode_whitespace_between_tokens() {
        let value = decode(b" {\n  \"a\" : [ 1 ,\t2 ] ,\r\n \"b\":null }  \n").unwrap();
        assert_eq!(
            value,
            Value::Object(object! {
                "a" => Value::Array(vec![Value::Number(1.0), Value::Number(2.0)]),
                "b" => Value::Null,
            })
        );
    }

    #[test]
    fn test_decode_standard_escapes() {
        let input = r#""q\" b\\ s\/ n\n r\r t\t b\b f\f ué 🎹""#;
        let value = decode(input.as_bytes()).unwrap();
        assert_eq!(
            value,
            Value::String("q\" b\\ s/ n\n r\r t\t b\u{8} f\u{c} u\u{e9} \u{1f3b9}".into())
        );
    }

    #[test]
    fn test_round_trip_nested() {
        let value = Value::Object(object! {
            "notes" => Value::Array(vec![
                Value::Object(object! { "pitch" => 60, "start" => 0.5, "velocity" => 100 }),
                Value::Null,
                Value::Bool(false),
                Value::String("multi\nline \u{e9}".into()),
            ]),
            "empty_array" => Value::Array(vec![]),
            "empty_object" => Value::Object(Object::new()),
            "tiny" => 1e-7,
            "big" => 1.5e300,
        });
        assert_eq!(decode(&encode(&value)).unwrap(), value);
        assert_eq!(decode_lenient(&encode(&value)).unwrap(), value);
    }

    #[test]
    fn test_strict_rejects_raw_control_characters() {
        let err = decode(b"\"a\nb\"").unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::ControlCharacter);
        assert!(!err.is_incomplete());
    }

    #[test]
    fn test_lenient_accepts_raw_control_characters() {
        let value = decode_lenient(b"\"local x = 1\nreturn x\"").unwrap();
        assert_eq!(value, Value::String("local x = 1\nreturn x".into()));
    }

    #[test]
    fn test_unknown_escape_by_mode() {
        assert_eq!(decode(br#""\q""#).unwrap_err().kind, DecodeErrorKind::InvalidEscape);
        assert_eq!(decode_lenient(br#""\q""#).unwrap(), Value::String("q".into()));
    }

    #[test]
    fn test_lone_surrogate_by_mode() {
        assert_eq!(
            decode(br#""\ud800x""#).unwrap_err().kind,
            DecodeErrorKind::InvalidUnicode
        );
        assert_eq!(
            decode_lenient(br#""\ud800x""#).unwrap(),
            Value::String("\u{fffd}x".into())
        );
    }

    #[test]
    fn test_duplicate_keys_by_mode() {
        let input = br#"{"a":1,"a":2}"#;
        assert_eq!(
            decode(input).unwrap_err().kind,
            DecodeErrorKind::DuplicateKey("a".into())
        );
        assert_eq!(decode_lenient(input).unwrap().get("a"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn test_trailing_comma_by_mode() {
        assert!(decode(b"[1,2,]").is_err());
        assert_eq!(
            decode_lenient(b"[1,2,]").unwrap(),
            Value::Array(vec![Value::Number(1.0), Value::Number(2.0)])
        );
        assert!(decode_lenient(br#"{"a":1,}"#).is_ok());
    }

    #[test]
    fn test_truncated_input_is_incomplete() {
        let full = br#"{"command":"add_notes","params":{"notes":[{"pitch":60,"start":1.5}]},"timestamp":1000.25}"#;
        for cut in 1..full.len() {
            let err = decode_lenient(&full[..cut]).unwrap_err();
            assert!(
                err.is_incomplete(),
                "prefix of length {} should be incomplete, got {:?}",
                cut,
                err
            );
        }
        assert!(decode_lenient(full).is_ok());
    }

    #[test]
    fn test_truncated_utf8_is_incomplete() {
        let full = "\"caf\u{e9}\"".as_bytes();
        let err = decode(&full[..full.len() - 2]).unwrap_err();
        assert!(err.is_incomplete());
    }

    #[test]
    fn test_empty_input_is_incomplete() {
        assert_eq!(decode(b"").unwrap_err().kind, DecodeErrorKind::Empty);
        assert!(decode(b"  \n ").unwrap_err().is_incomplete());
    }

    #[test]
    fn test_malformed_is_not_incomplete() {
        for input in [
            &b"{\"a\" 1}"[..],
            b"[1 2]",
            b"nul!",
            b"{\"a\":1}}",
            b"-x",
            b"01",
            b"{'a':1}",
        ] {
            let err = decode_lenient(input).unwrap_err();
            assert!(!err.is_incomplete(), "{:?} => {:?}", input, err);
        }
    }

    #[test]
    fn test_invalid_utf8_by_mode() {
        let input = b"\"a\xffb\"";
        assert_eq!(decode(input).unwrap_err().kind, DecodeErrorKind::InvalidUtf8);
        assert_eq!(
            decode_lenient(input).unwrap(),
            Value::String("a\u{fffd}b".into())
        );
    }

    #[test]
    fn test_depth_limit() {
        let deep = "[".repeat(MAX_DEPTH + 1) + &"]".repeat(MAX_DEPTH + 1);
        assert_eq!(
            decode(deep.as_bytes()).unwrap_err().kind,
            DecodeErrorKind::TooDeep(MAX_DEPTH)
        );
        let ok = "[".repeat(MAX_DEPTH) + &"]".repeat(MAX_DEPTH);
        assert!(decode(ok.as_bytes()).is_ok());
    }

    #[test]
    fn test_numbers_grammar() {
        assert_eq!(decode(b"-0.5e2").unwrap(), Value::Number(-50.0));
        assert_eq!(decode(b"1E+3").unwrap(), Value::Number(1000.0));
        assert_eq!(decode(b"1e999").unwrap_err().kind, DecodeErrorKind::InvalidNumber);
        assert!(decode(b"1.").unwrap_err().is_incomplete());
    }
}
