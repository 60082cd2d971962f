//! `RequestLineParser` (C3): parses `method SP target SP version CRLF`
//! with the tolerances RFC 7230 §3.5 asks servers to accept.
//!
//! The parser is a hand-written byte-at-a-time state machine rather than
//! a delegate to a generic HTTP parsing crate, because every failure
//! must carry the exact (previous byte, current byte, offset) triple the
//! rest of the crate's diagnostics rely on.

use std::time::Instant;

use crate::byteview::ByteIter;
use crate::error::{Error, ParsePosition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub target: String,
    pub http_version: String,
    pub parse_started_at: Instant,
    pub bytes_consumed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SkipLead,
    Method,
    TargetLead,
    Target,
    VersionLead,
    Version,
    CrSeen,
}

/// Parses a single request line from `source`, failing if more than
/// `max_bytes` are consumed before the terminating CRLF is seen.
pub fn parse<I: ByteIter>(source: &mut I, max_bytes: u64) -> Result<RequestLine, Error> {
    let parse_started_at = Instant::now();

    let mut state = State::SkipLead;
    let mut method = Vec::new();
    let mut target = Vec::new();
    let mut version = Vec::new();
    let mut offset: u64 = 0;
    let mut previous: Option<u8> = None;

    'outer: loop {
        let view = match source.next()? {
            Some(v) if !v.is_empty() => v,
            _ => {
                return Err(fail(
                    previous,
                    None,
                    offset,
                    "channel closed before the request line was complete",
                ));
            }
        };
        for &byte in view.as_slice() {
            if offset >= max_bytes {
                return Err(Error::MaxRequestHeadSizeExceeded(max_bytes));
            }
            // `offset` here is the 0-indexed position of `byte`, i.e. the
            // count of bytes already consumed before it; errors report
            // this value, while the running total used for `bytes_consumed`
            // is advanced right after the byte is accepted.
            let byte_offset = offset;
            offset += 1;

            match state {
                State::SkipLead => match byte {
                    b'\r' | b'\n' | b'\t' | b' ' => {}
                    _ => {
                        state = State::Method;
                        method.push(byte);
                    }
                },
                State::Method => match byte {
                    b'\t' | b' ' | b'\r' => {
                        state = State::TargetLead;
                        if byte == b'\r' {
                            // tolerated as method/target whitespace, per
                            // the observed (and preserved) source behavior
                        }
                    }
                    b'\n' => return Err(fail(previous, Some(byte), byte_offset, "Unexpected LF")),
                    _ => method.push(byte),
                },
                State::TargetLead => match byte {
                    b'\t' | b' ' | b'\r' => {}
                    b'\n' => return Err(fail(previous, Some(byte), byte_offset, "Unexpected LF")),
                    _ => {
                        state = State::Target;
                        target.push(byte);
                    }
                },
                State::Target => match byte {
                    b'\t' | b' ' | b'\r' => state = State::VersionLead,
                    b'\n' => return Err(fail(previous, Some(byte), byte_offset, "Unexpected LF")),
                    _ => target.push(byte),
                },
                State::VersionLead => match byte {
                    b'\t' | b' ' => {}
                    b'\n' => return Err(fail(previous, Some(byte), byte_offset, "Empty HTTP-version")),
                    _ => {
                        state = State::Version;
                        version.push(byte);
                    }
                },
                State::Version => match byte {
                    b'\t' | b' ' => {
                        return Err(fail(
                            previous,
                            Some(byte),
                            byte_offset,
                            "Whitespace in HTTP-version not accepted",
                        ));
                    }
                    b'\r' => state = State::CrSeen,
                    b'\n' => {
                        previous = Some(byte);
                        break 'outer;
                    }
                    _ => version.push(byte),
                },
                State::CrSeen => {
                    if byte == b'\n' {
                        previous = Some(byte);
                        break 'outer;
                    } else {
                        return Err(fail(
                            previous,
                            Some(byte),
                            byte_offset,
                            "CR followed by something other than LF",
                        ));
                    }
                }
            }
            previous = Some(byte);
        }
    }

    let method = String::from_utf8(method)
        .map_err(|_| fail(previous, None, offset, "method is not valid UTF-8"))?;
    let target = String::from_utf8(target)
        .map_err(|_| fail(previous, None, offset, "target is not valid UTF-8"))?;
    let http_version = String::from_utf8(version)
        .map_err(|_| fail(previous, None, offset, "HTTP-version is not valid UTF-8"))?;

    if method.is_empty() || target.is_empty() || http_version.is_empty() {
        return Err(fail(previous, None, offset, "empty request-line token"));
    }

    Ok(RequestLine {
        method,
        target,
        http_version,
        parse_started_at,
        bytes_consumed: offset,
    })
}

fn fail(previous: Option<u8>, current: Option<u8>, offset: u64, message: &str) -> Error {
    Error::RequestLineParse(ParsePosition::new(previous, current, offset), message.to_string())
}
