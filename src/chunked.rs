//! `ChunkedDecoder`/`ChunkedEncoder` (C5/C6): `Transfer-Encoding: chunked`
//! framing over the [`ByteIter`](crate::byteview::ByteIter) contract.
//!
//! The decoder reads size lines a byte at a time (sizes are short) but
//! hands back chunk data in bulk views, same trade-off `ChannelReader`
//! makes. `UnsupportedOperation`-class failures from the source material
//! (size overflow, quoted chunk-extensions) are folded into `Decoder`
//! since this crate keeps one error kind per concept.

use crate::byteview::{ByteIter, ByteView};
use crate::error::Error;
use crate::header_parse::{self, CapKind, HeaderField};

#[derive(Debug, Clone, Copy)]
enum State {
    SizeLine,
    SizeLineExt,
    SizeLineCr,
    Data(u64),
    DataCr,
    DataLf,
    Trailers,
    Done,
}

/// Decodes a chunked body from an underlying [`crate::byteview::ByteIter`].
pub struct ChunkedDecoder<I> {
    source: I,
    state: State,
    pending: Option<ByteView>,
    size_value: i64,
    size_digits: u32,
    trailers: Option<Vec<HeaderField>>,
    max_trailers_bytes: u64,
}

/// Forwards any byte already pulled out of `source` into `pending` before
/// falling through, so a second parser (the trailer header section) never
/// loses bytes the chunk decoder buffered ahead of it.
struct Residual<'a, I> {
    pending: &'a mut Option<ByteView>,
    source: &'a mut I,
}

impl<'a, I: ByteIter> ByteIter for Residual<'a, I> {
    fn next(&mut self) -> Result<Option<ByteView>, Error> {
        if let Some(v) = self.pending.take() {
            if !v.is_empty() {
                return Ok(Some(v));
            }
        }
        self.source.next()
    }

    fn close(&mut self) {
        self.source.close();
    }
}

impl<I: ByteIter> ChunkedDecoder<I> {
    pub fn new(source: I, max_trailers_bytes: u64) -> Self {
        ChunkedDecoder {
            source,
            state: State::SizeLine,
            pending: None,
            size_value: 0,
            size_digits: 0,
            trailers: None,
            max_trailers_bytes,
        }
    }

    /// Trailer fields, populated once the terminator chunk and the
    /// trailing header section have both been consumed.
    pub fn trailers(&self) -> Option<&[HeaderField]> {
        self.trailers.as_deref()
    }

    fn next_byte(&mut self) -> Result<Option<u8>, Error> {
        loop {
            if let Some(view) = self.pending.as_mut() {
                if !view.is_empty() {
                    let byte = view.as_slice()[0];
                    view.advance(1);
                    return Ok(Some(byte));
                }
                self.pending = None;
            }
            match self.source.next()? {
                None => return Ok(None),
                Some(v) if v.is_empty() => return Ok(None),
                Some(v) => self.pending = Some(v),
            }
        }
    }

    /// Hands back up to `remaining` bytes of chunk data in one view.
    fn take_data(&mut self, remaining: u64) -> Result<Option<ByteView>, Error> {
        if self.pending.as_ref().map_or(true, |v| v.is_empty()) {
            match self.source.next()? {
                None => return Ok(None),
                Some(v) if v.is_empty() => return Ok(None),
                Some(v) => self.pending = Some(v),
            }
        }
        let view = self.pending.as_mut().unwrap();
        let take = (view.len() as u64).min(remaining) as usize;
        let taken = view.split_to(take);
        Ok(Some(taken))
    }

    pub fn next(&mut self) -> Result<Option<ByteView>, Error> {
        loop {
            match self.state {
                State::Done => return Ok(None),
                State::Data(0) => {
                    self.state = State::DataCr;
                }
                State::Data(remaining) => match self.take_data(remaining)? {
                    Some(view) => {
                        let consumed = view.len() as u64;
                        self.state = State::Data(remaining - consumed);
                        return Ok(Some(view));
                    }
                    None => {
                        return Err(Error::Decoder("No chunk-size specified.".to_string()));
                    }
                },
                State::DataCr => {
                    self.expect(b'\r')?;
                    self.state = State::DataLf;
                }
                State::DataLf => {
                    self.expect(b'\n')?;
                    self.state = State::SizeLine;
                    self.size_value = 0;
                    self.size_digits = 0;
                }
                State::SizeLine => match self.next_byte()? {
                    None => return Err(Error::Decoder("No chunk-size specified.".to_string())),
                    Some(b'\r') => self.state = State::SizeLineCr,
                    Some(b'\n') => self.on_size_line_done()?,
                    Some(b';') => self.state = State::SizeLineExt,
                    Some(byte) => {
                        self.accumulate_size_digit(byte)?;
                    }
                },
                State::SizeLineExt => match self.next_byte()? {
                    None => return Err(Error::Decoder("No chunk-size specified.".to_string())),
                    Some(b'"') => {
                        return Err(Error::Decoder("Quoted chunk-extension value.".to_string()));
                    }
                    Some(b'\r') => self.state = State::SizeLineCr,
                    Some(b'\n') => self.on_size_line_done()?,
                    Some(_byte) => {}
                },
                State::SizeLineCr => match self.next_byte()? {
                    Some(b'\n') => self.on_size_line_done()?,
                    other => return Err(self.fail_terminator(other)),
                },
                State::Trailers => {
                    let (fields, _) = {
                        let mut residual = Residual { pending: &mut self.pending, source: &mut self.source };
                        header_parse::parse(&mut residual, self.max_trailers_bytes, CapKind::Trailers)?
                    };
                    self.trailers = Some(fields);
                    self.state = State::Done;
                    return Ok(None);
                }
            }
        }
    }

    fn on_size_line_done(&mut self) -> Result<(), Error> {
        let size = self.size_value as u64;
        self.size_value = 0;
        self.size_digits = 0;
        self.state = if size == 0 { State::Trailers } else { State::Data(size) };
        Ok(())
    }

    fn accumulate_size_digit(&mut self, byte: u8) -> Result<(), Error> {
        let digit = match byte {
            b'0'..=b'9' => (byte - b'0') as i64,
            b'a'..=b'f' => (byte - b'a' + 10) as i64,
            b'A'..=b'F' => (byte - b'A' + 10) as i64,
            _ => {
                return Err(Error::Decoder(format!(
                    "invalid chunk size digit: {}",
                    describe_byte(byte)
                )));
            }
        };
        self.size_digits += 1;
        if self.size_digits > 16 {
            return Err(Error::Decoder("Long overflow".to_string()));
        }
        let shifted = self
            .size_value
            .checked_shl(4)
            .and_then(|v| v.checked_add(digit))
            .ok_or_else(|| Error::Decoder("Long overflow".to_string()))?;
        if shifted < 0 {
            return Err(Error::Decoder("Long overflow".to_string()));
        }
        self.size_value = shifted;
        Ok(())
    }

    fn expect(&mut self, want: u8) -> Result<(), Error> {
        match self.next_byte()? {
            Some(b) if b == want => Ok(()),
            other => Err(self.fail_terminator(other)),
        }
    }

    fn fail_terminator(&self, got: Option<u8>) -> Error {
        Error::Decoder(format!(
            "Expected CR and/or LF after chunk. Received {}.",
            describe_byte_opt(got)
        ))
    }

    pub fn close(&mut self) {
        self.source.close();
        self.state = State::Done;
    }

    /// Reclaims the underlying source and whatever byte was already pulled
    /// out of it but not yet consumed, so a caller that owns the socket
    /// beneath `I` can keep reading past this body (pipelining/keep-alive).
    pub fn into_inner(self) -> (I, Option<ByteView>) {
        (self.source, self.pending)
    }
}

fn describe_byte(b: u8) -> String {
    format!("(hex:0x{:02x}, decimal:{}, char:{:?})", b, b, b as char)
}

fn describe_byte_opt(b: Option<u8>) -> String {
    match b {
        Some(b) => describe_byte(b),
        None => "end of stream".to_string(),
    }
}

/// Encodes a source of raw data views into `Transfer-Encoding: chunked`
/// framing. Every call to [`Self::next`] forwards exactly one unit of
/// protocol framing: a size line, a data view, or a trailing CRLF/terminator.
pub struct ChunkedEncoder<I> {
    source: I,
    state: EncodeState,
    pending_data: Option<ByteView>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncodeState {
    NeedChunk,
    SentSize(usize),
    SentData,
    SentTerminator,
    Done,
}

impl<I: ByteIter> ChunkedEncoder<I> {
    pub fn new(source: I) -> Self {
        ChunkedEncoder { source, state: EncodeState::NeedChunk, pending_data: None }
    }

    pub fn next(&mut self) -> Result<Option<ByteView>, Error> {
        loop {
            match self.state {
                EncodeState::Done => return Ok(None),
                EncodeState::NeedChunk => match self.source.next()? {
                    None => {
                        self.state = EncodeState::SentTerminator;
                        return Ok(Some(ByteView::from(b"0\r\n\r\n".to_vec())));
                    }
                    Some(view) if view.is_empty() => continue,
                    Some(view) => {
                        let size_line = format!("{:08X}\r\n", view.len());
                        self.state = EncodeState::SentSize(view.len());
                        self.pending_data = Some(view);
                        return Ok(Some(ByteView::from(size_line.into_bytes())));
                    }
                },
                EncodeState::SentSize(_) => {
                    self.state = EncodeState::SentData;
                    return Ok(self.pending_data.take());
                }
                EncodeState::SentData => {
                    self.state = EncodeState::NeedChunk;
                    return Ok(Some(ByteView::from(b"\r\n".to_vec())));
                }
                EncodeState::SentTerminator => {
                    self.state = EncodeState::Done;
                    return Ok(None);
                }
            }
        }
    }

    pub fn close(&mut self) {
        self.source.close();
        self.state = EncodeState::Done;
    }
}

impl<I: ByteIter> ByteIter for ChunkedDecoder<I> {
    fn next(&mut self) -> Result<Option<ByteView>, Error> {
        ChunkedDecoder::next(self)
    }

    fn close(&mut self) {
        ChunkedDecoder::close(self)
    }
}

impl<I: ByteIter> ByteIter for ChunkedEncoder<I> {
    fn next(&mut self) -> Result<Option<ByteView>, Error> {
        ChunkedEncoder::next(self)
    }

    fn close(&mut self) {
        ChunkedEncoder::close(self)
    }
}
