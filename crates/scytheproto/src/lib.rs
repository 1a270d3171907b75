//! scytheproto - Wire types for the Scythe host bridge
//!
//! This crate defines everything both ends of the bridge agree on: the value
//! model, the text codec, the Request/Response shapes, and newline framing.
//! It has no runtime dependencies beyond `thiserror` and `serde_json` (the
//! latter only for conversions at the tool-layer boundary).
//!
//! ## Wire Format
//!
//! Messages are JSON-like objects rendered on a single line:
//!
//! ```text
//! → {"command":"set_tempo","params":{"tempo":120}}
//! ← {"success":true}
//! → {"command":"set_tempo","params":{"tempo":5}}
//! ← {"error":"Invalid tempo","success":false}
//! ```
//!
//! The socket transport terminates each message with `\n`; the file-polling
//! transport stores exactly one message per file and adds a `timestamp`
//! field to requests.
//!
//! ## Decoding Modes
//!
//! The host side historically parsed with a hand-rolled, forgiving decoder
//! because its scripting sandbox had no JSON library. That behaviour survives
//! as [`DecodeMode::Lenient`]; the controller uses [`DecodeMode::Strict`].

pub mod codec;
pub mod frame;
pub mod message;
pub mod value;

pub use codec::{
    decode, decode_lenient, decode_with, encode, encode_line, DecodeError, DecodeErrorKind,
    DecodeMode, MAX_DEPTH,
};
pub use frame::{FrameError, LineFramer, DEFAULT_MAX_FRAME_LEN};
pub use message::{Outcome, ProtocolError, Request, Response};
pub use value::{Object, Value};
