//! `HeaderParser` (C4): parses a CRLF-delimited header field section
//! terminated by an empty line. Used both for request-head headers and
//! for chunked trailers (§4.5), which is why it takes its byte cap as a
//! parameter rather than hard-coding "head" or "trailers".

use crate::byteview::ByteIter;
use crate::error::{Error, ParsePosition};

/// A single `name: value` pair as it arrived on the wire.
///
/// Casing of `name` is preserved as received; comparisons elsewhere are
/// case-insensitive (see [`crate::header_index::HeaderIndex`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    LineStart,
    Name,
    AfterName,
    Value,
    ValueCr,
    /// Seen CR at the very start of what might be the terminating blank
    /// line, or the CR ending a header line.
    LineStartCr,
}

/// Which byte cap error to raise when the running total exceeds `max_bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapKind {
    Head,
    Trailers,
}

impl CapKind {
    fn exceeded(self, limit: u64) -> Error {
        match self {
            CapKind::Head => Error::MaxRequestHeadSizeExceeded(limit),
            CapKind::Trailers => Error::MaxRequestTrailersSizeExceeded(limit),
        }
    }
}

/// Parses a header field section, returning the fields in arrival order
/// and the number of bytes consumed (including the terminating blank line).
pub fn parse<I: ByteIter>(
    source: &mut I,
    max_bytes: u64,
    cap_kind: CapKind,
) -> Result<(Vec<HeaderField>, u64), Error> {
    let mut fields: Vec<HeaderField> = Vec::new();
    let mut state = State::LineStart;
    let mut name = Vec::new();
    let mut value = Vec::new();
    let mut offset: u64 = 0;
    let mut previous: Option<u8> = None;

    loop {
        let view = match source.next()? {
            Some(v) if !v.is_empty() => v,
            _ => {
                return Err(fail(
                    previous,
                    None,
                    offset,
                    "channel closed before the header section was done",
                ));
            }
        };
        for &byte in view.as_slice() {
            if offset >= max_bytes {
                return Err(cap_kind.exceeded(max_bytes));
            }
            let byte_offset = offset;
            offset += 1;

            match state {
                State::LineStart => match byte {
                    b'\r' => state = State::LineStartCr,
                    b'\n' => return Ok((fields, offset)),
                    b' ' | b'\t' => {
                        if fields.is_empty() {
                            return Err(fail(
                                previous,
                                Some(byte),
                                byte_offset,
                                "Unexpected fold at start of header section",
                            ));
                        }
                        // Folded continuation of the previous field's value.
                        let last = fields.last_mut().unwrap();
                        value = last.value.clone().into_bytes();
                        value.push(b' ');
                        state = State::Value;
                        fields.pop();
                    }
                    b':' => {
                        return Err(fail(
                            previous,
                            Some(byte),
                            byte_offset,
                            "Header name must not be empty.",
                        ));
                    }
                    _ => {
                        name.clear();
                        name.push(byte);
                        state = State::Name;
                    }
                },
                State::LineStartCr => {
                    if byte == b'\n' {
                        return Ok((fields, offset));
                    } else {
                        return Err(fail(
                            previous,
                            Some(byte),
                            byte_offset,
                            "CR not followed by LF at end of header section",
                        ));
                    }
                }
                State::Name => match byte {
                    b':' => {
                        state = State::AfterName;
                    }
                    b' ' | b'\t' | b'\r' | b'\n' => {
                        return Err(fail(
                            previous,
                            Some(byte),
                            byte_offset,
                            "Whitespace in header name or before colon is not accepted.",
                        ));
                    }
                    _ => name.push(byte),
                },
                State::AfterName => match byte {
                    b' ' | b'\t' => {}
                    b'\r' => {
                        value.clear();
                        state = State::ValueCr;
                    }
                    b'\n' => {
                        value.clear();
                        push_field(&mut fields, &name, &value, previous, byte_offset)?;
                        state = State::LineStart;
                    }
                    _ => {
                        value.clear();
                        value.push(byte);
                        state = State::Value;
                    }
                },
                State::Value => match byte {
                    b'\r' => state = State::ValueCr,
                    b'\n' => {
                        push_field(&mut fields, &name, &value, previous, byte_offset)?;
                        state = State::LineStart;
                    }
                    _ => value.push(byte),
                },
                State::ValueCr => {
                    if byte == b'\n' {
                        push_field(&mut fields, &name, &value, previous, byte_offset)?;
                        state = State::LineStart;
                    } else {
                        return Err(fail(
                            previous,
                            Some(byte),
                            byte_offset,
                            "CR not followed by LF within header value",
                        ));
                    }
                }
            }
            previous = Some(byte);
        }
    }
}

fn push_field(
    fields: &mut Vec<HeaderField>,
    name: &[u8],
    value: &[u8],
    previous: Option<u8>,
    offset: u64,
) -> Result<(), Error> {
    if name.is_empty() {
        return Err(fail(previous, None, offset, "Header name must not be empty."));
    }
    let name = String::from_utf8(name.to_vec())
        .map_err(|_| fail(previous, None, offset, "Header name is not valid UTF-8"))?;
    let trimmed = trim_ascii_whitespace(value);
    let value = String::from_utf8(trimmed.to_vec())
        .map_err(|_| fail(previous, None, offset, "Header value is not valid UTF-8"))?;
    fields.push(HeaderField { name, value });
    Ok(())
}

fn trim_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let is_ws = |b: &u8| matches!(*b, b' ' | b'\t');
    let start = bytes.iter().position(|b| !is_ws(b)).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !is_ws(b)).map(|i| i + 1).unwrap_or(start);
    &bytes[start..end]
}

fn fail(previous: Option<u8>, current: Option<u8>, offset: u64, message: &str) -> Error {
    Error::HeaderParse(ParsePosition::new(previous, current, offset), message.to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::byteview::{Iterable, MemoryBody};
    use matches::assert_matches;

    fn parse_str(input: &str) -> Result<(Vec<HeaderField>, u64), Error> {
        let body = MemoryBody::new(input.as_bytes().to_vec());
        let mut iter = body.iterator().unwrap();
        parse(&mut iter, 8192, CapKind::Head)
    }

    #[test]
    fn scenario_1_host_header() {
        let (fields, _) = parse_str("Host: x\r\n\r\n").unwrap();
        assert_eq!(fields, vec![HeaderField { name: "Host".into(), value: "x".into() }]);
    }

    #[test]
    fn scenario_3_whitespace_in_name() {
        let err = parse_str("Has Space: v\r\n\r\n").unwrap_err();
        match err {
            Error::HeaderParse(pos, message) => {
                assert_eq!(pos.offset, 3);
                assert_eq!(message, "Whitespace in header name or before colon is not accepted.");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn duplicate_names_preserve_order() {
        let (fields, _) = parse_str("X-A: 1\r\nX-A: 2\r\n\r\n").unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].value, "1");
        assert_eq!(fields[1].value, "2");
    }

    #[test]
    fn folded_continuation_gets_one_intervening_space() {
        let (fields, _) = parse_str("X-A: first\r\n second\r\n\r\n").unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].value, "first second");
    }

    #[test]
    fn folded_continuation_across_multiple_lines() {
        let (fields, _) = parse_str("X-A: first\r\n second\r\n\tthird\r\n\r\n").unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].value, "first second third");
    }

    #[test]
    fn empty_value_is_legal() {
        let (fields, _) = parse_str("X-Empty:\r\n\r\n").unwrap();
        assert_eq!(fields[0].value, "");
    }

    #[test]
    fn interior_whitespace_preserved() {
        let (fields, _) = parse_str("X-A: a   b\r\n\r\n").unwrap();
        assert_eq!(fields[0].value, "a   b");
    }

    #[test]
    fn empty_name_is_fatal() {
        let err = parse_str(": v\r\n\r\n").unwrap_err();
        assert_matches!(err, Error::HeaderParse(..));
    }

    #[test]
    fn missing_terminator_fails() {
        let body = MemoryBody::new(b"Host: x\r\n".to_vec());
        let mut iter = body.iterator().unwrap();
        let err = parse(&mut iter, 8192, CapKind::Head).unwrap_err();
        match err {
            Error::HeaderParse(_, m) => assert!(m.contains("closed before")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn cap_exceeded_uses_trailers_variant() {
        let body = MemoryBody::new(b"X-A: aaaaaaaaaaaaaaaaaaaaaaaaaa\r\n\r\n".to_vec());
        let mut iter = body.iterator().unwrap();
        let err = parse(&mut iter, 8, CapKind::Trailers).unwrap_err();
        assert_matches!(err, Error::MaxRequestTrailersSizeExceeded(8));
    }

    #[test]
    fn immediate_blank_line_is_empty_section() {
        let (fields, consumed) = parse_str("\r\n").unwrap();
        assert!(fields.is_empty());
        assert_eq!(consumed, 2);
    }
}
