//! RESP (REdis Serialization Protocol) framing.
//!
//! Commands are written as arrays of bulk strings. Replies are decoded
//! incrementally from a byte buffer so the reader can keep appending
//! socket data until a full frame is available.

use thiserror::Error;

/// Upper bound on a single bulk string, matching the server-side default.
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Deepest array nesting accepted from the server.
pub const MAX_DEPTH: usize = 64;

/// Error type for malformed frames.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown frame type byte 0x{0:02x}")]
    UnknownType(u8),

    #[error("invalid length '{0}'")]
    InvalidLength(String),

    #[error("invalid integer '{0}'")]
    InvalidInteger(String),

    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("bulk string not terminated by CRLF")]
    MissingTerminator,

    #[error("arrays nested deeper than 64 levels")]
    TooDeep,

    #[error("unexpected data from server outside a reply")]
    Unsolicited,
}

/// A decoded server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Option<Vec<Reply>>),
}

impl Reply {
    /// Returns the simple or bulk string content as text, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Reply::Simple(s) => Some(s),
            Reply::Bulk(Some(b)) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }
}

/// Encode a command as a RESP array of bulk strings.
pub fn encode_command<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + args.iter().map(|a| a.as_ref().len() + 16).sum::<usize>());
    out.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        let arg = arg.as_ref();
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Try to decode one reply from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` holds an incomplete frame, otherwise the
/// reply and the number of bytes it occupied.
pub fn decode(buf: &[u8]) -> Result<Option<(Reply, usize)>, ProtocolError> {
    decode_at(buf, 0, 0)
}

fn decode_at(
    buf: &[u8],
    pos: usize,
    depth: usize,
) -> Result<Option<(Reply, usize)>, ProtocolError> {
    let Some(&kind) = buf.get(pos) else {
        return Ok(None);
    };
    let Some((line, after_line)) = read_line(buf, pos + 1) else {
        return Ok(None);
    };

    match kind {
        b'+' => Ok(Some((Reply::Simple(utf8(line)?), after_line))),
        b'-' => Ok(Some((Reply::Error(utf8(line)?), after_line))),
        b':' => Ok(Some((Reply::Integer(parse_integer(line)?), after_line))),
        b'$' => {
            let len = parse_length(line)?;
            if len < 0 {
                return Ok(Some((Reply::Bulk(None), after_line)));
            }
            let len = len as usize;
            let end = after_line + len;
            if buf.len() < end + 2 {
                return Ok(None);
            }
            if &buf[end..end + 2] != b"\r\n" {
                return Err(ProtocolError::MissingTerminator);
            }
            Ok(Some((Reply::Bulk(Some(buf[after_line..end].to_vec())), end + 2)))
        }
        b'*' => {
            let len = parse_length(line)?;
            if len < 0 {
                return Ok(Some((Reply::Array(None), after_line)));
            }
            if depth >= MAX_DEPTH {
                return Err(ProtocolError::TooDeep);
            }
            let mut items = Vec::with_capacity((len as usize).min(1024));
            let mut cursor = after_line;
            for _ in 0..len {
                match decode_at(buf, cursor, depth + 1)? {
                    Some((item, next)) => {
                        items.push(item);
                        cursor = next;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((Reply::Array(Some(items)), cursor)))
        }
        other => Err(ProtocolError::UnknownType(other)),
    }
}

/// Find the CRLF-terminated line starting at `start`.
fn read_line(buf: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(start..)?;
    let idx = rest.windows(2).position(|w| w == b"\r\n")?;
    Some((&rest[..idx], start + idx + 2))
}

fn utf8(line: &[u8]) -> Result<String, ProtocolError> {
    String::from_utf8(line.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
}

fn parse_integer(line: &[u8]) -> Result<i64, ProtocolError> {
    let text = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8)?;
    text.parse()
        .map_err(|_| ProtocolError::InvalidInteger(text.to_string()))
}

fn parse_length(line: &[u8]) -> Result<i64, ProtocolError> {
    let text = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8)?;
    match text.parse::<i64>() {
        Ok(n) if (-1..=MAX_BULK_LEN).contains(&n) => Ok(n),
        _ => Err(ProtocolError::InvalidLength(text.to_string())),
    }
}
