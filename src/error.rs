//! wicket/src/error.rs
//! Session error taxonomy.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while decoding a length-prefixed frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Declared frame or field length exceeds the sanity bound.
    #[error("declared length {0} exceeds frame limit")]
    Oversize(usize),

    /// Declared frame or field length is negative.
    #[error("negative length {0}")]
    BadLength(i32),

    /// VarInt continuation ran past five bytes.
    #[error("VarInt exceeds five bytes")]
    VarIntTooBig,

    /// Frame body ended before the schema's last field.
    #[error("frame body ended before the last field")]
    Truncated,

    /// Bytes left over in the frame after the last field.
    #[error("{0} bytes left in frame after the last field")]
    TrailingBytes(usize),

    #[error("string field is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Stream closed or failed mid-frame.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Per-session failures. Every variant is terminal for the session and none
/// of them crosses the session boundary. An admission rejection is a policy
/// outcome, not an error, and deliberately has no variant here.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("malformed frame: {0}")]
    Framing(#[from] FrameError),

    /// First packet carried something other than the handshake tag.
    #[error("unexpected packet type {tag:#04x}")]
    Protocol { tag: i32 },

    #[error("upstream dial failed: {0}")]
    Dial(#[source] std::io::Error),

    #[error("upstream dial timed out after {0:?}")]
    DialTimeout(Duration),

    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),
}
