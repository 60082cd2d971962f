//! `ChannelReader` (C2): a socket-backed byte iterator with length
//! limiting, a resettable cursor and explicit end-of-stream discipline.
//!
//! This is the only component in the crate that touches a live `Read`
//! source. Everything above it (C3..C9) only ever consumes the
//! [`ByteIter`](crate::byteview::ByteIter) contract, so swapping the
//! transport (TCP socket, TLS stream, in-memory buffer for tests) never
//! touches the parser layer.

use std::io::{self, Read};

use bytes::{Bytes, BytesMut};

use crate::byteview::ByteView;
use crate::error::Error;

/// Default amount of the socket to try to read per `fill()`.
const READ_CHUNK: usize = 8 * 1024;

/// A sliding-buffer reader over a socket-like source, with an optional
/// remaining-byte limit for the current logical iteration.
pub struct ChannelReader<R> {
    source: R,
    buf: BytesMut,
    /// `None` == unbounded (read to EOS); `Some(n)` == `n` bytes left to
    /// deliver for the current `limit()`.
    limit: Option<u64>,
    /// The source has reported EOF at least once.
    eos: bool,
}

impl<R: Read> ChannelReader<R> {
    pub fn new(source: R) -> Self {
        ChannelReader {
            source,
            buf: BytesMut::new(),
            limit: None,
            eos: false,
        }
    }

    /// Set the remaining byte count for the next iteration.
    ///
    /// # Panics
    ///
    /// If a limit is already set (`UnsupportedState` in the distilled
    /// spec — this crate treats it as caller misuse, matching the
    /// encoder's own documented panic-on-misuse policy).
    pub fn limit(&mut self, n: u64) {
        assert!(self.limit.is_none(), "a limit is already set on this channel reader");
        self.limit = Some(n);
    }

    /// Clear the limit.
    ///
    /// # Panics
    ///
    /// If there is a nonzero limit still pending (`IllegalState`).
    pub fn reset(&mut self) {
        if let Some(n) = self.limit {
            assert_eq!(n, 0, "reset() called with {} bytes still pending", n);
        }
        self.limit = None;
    }

    /// Bytes the next iteration will yield, or `-1` if unbounded.
    pub fn length(&self) -> i64 {
        match self.limit {
            Some(n) => n as i64,
            None => -1,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self.limit {
            Some(0) => true,
            Some(_) => false,
            // Unbounded: peeking is allowed to discover EOS without it
            // being an error, per spec.
            None => self.eos && self.buf.is_empty(),
        }
    }

    fn fill(&mut self) -> io::Result<usize> {
        let mut chunk = vec![0u8; READ_CHUNK];
        let n = self.source.read(&mut chunk)?;
        if n == 0 {
            self.eos = true;
        } else {
            self.buf.extend_from_slice(&chunk[..n]);
        }
        Ok(n)
    }

    /// Pull the next view for the current iteration.
    ///
    /// Returns `Ok(None)` for the steady-state end of a bounded
    /// iteration, or the empty-view EOS sentinel for an unbounded one.
    pub fn next(&mut self) -> Result<Option<ByteView>, Error> {
        match self.limit {
            Some(0) => Ok(None),
            Some(remaining) => {
                while self.buf.is_empty() && !self.eos {
                    self.fill()?;
                }
                if self.buf.is_empty() {
                    // EOS reached before `remaining` bytes were produced.
                    self.shutdown_input();
                    return Err(Error::EndOfStream);
                }
                let take = (self.buf.len() as u64).min(remaining) as usize;
                let chunk = self.buf.split_to(take).freeze();
                self.limit = Some(remaining - take as u64);
                Ok(Some(ByteView::new(chunk)))
            }
            None => {
                while self.buf.is_empty() && !self.eos {
                    self.fill()?;
                }
                if self.buf.is_empty() {
                    self.shutdown_input();
                    return Ok(Some(ByteView::empty()));
                }
                let chunk = std::mem::replace(&mut self.buf, BytesMut::new()).freeze();
                Ok(Some(ByteView::new(chunk)))
            }
        }
    }

    fn shutdown_input(&mut self) {
        self.eos = true;
    }

    pub fn close(&mut self) {
        self.buf.clear();
    }

    /// Push back bytes that a downstream parser over-read from this
    /// reader's buffer (used when a fixed-size decode borrowed a view
    /// that straddled the boundary of what it actually needed).
    pub fn push_back(&mut self, bytes: Bytes) {
        let mut combined = BytesMut::with_capacity(bytes.len() + self.buf.len());
        combined.extend_from_slice(&bytes);
        combined.extend_from_slice(&self.buf);
        self.buf = combined;
    }
}
