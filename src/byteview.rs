//! The lazy, closeable byte-view iterator abstraction (C1) that every
//! body and codec layer in this crate is built on.
//!
//! A `ByteView` is a contiguous, already-in-memory range of bytes with a
//! movable cursor; a `ByteIter` yields a sequence of views whose aggregate
//! remaining length equals `Iterable::length()` when that length is known.
//! The contract mirrors a pull-based replacement for a reactive-streams
//! publisher/subscriber pair: the consumer drives progress by calling
//! `next()`, so there is no separate backpressure signal to manage.

use bytes::Bytes;

use crate::error::Error;

/// A contiguous range of readable bytes with a movable cursor.
///
/// Views are not retained past the call to `next()` that superseded them;
/// callers that need the bytes afterward must copy them out.
#[derive(Debug, Clone)]
pub struct ByteView {
    bytes: Bytes,
}

impl ByteView {
    pub fn new(bytes: Bytes) -> Self {
        ByteView { bytes }
    }

    pub fn empty() -> Self {
        ByteView { bytes: Bytes::new() }
    }

    /// Readable bytes remaining under the cursor.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Advance the cursor by `n` bytes, consuming them from the front.
    pub fn advance(&mut self, n: usize) {
        let _ = self.bytes.split_to(n.min(self.bytes.len()));
    }

    /// Splits off and returns the first `n` bytes (clamped to what's
    /// available), leaving the remainder in `self`.
    pub fn split_to(&mut self, n: usize) -> ByteView {
        let n = n.min(self.bytes.len());
        ByteView::new(self.bytes.split_to(n))
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

impl From<Bytes> for ByteView {
    fn from(bytes: Bytes) -> Self {
        ByteView::new(bytes)
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(v: Vec<u8>) -> Self {
        ByteView::new(Bytes::from(v))
    }
}

/// A single run over an `Iterable`'s byte sequence.
///
/// Single-threaded: an iterator is never shared across threads at the
/// same time, though it may be moved between them between `next()` calls.
pub trait ByteIter {
    /// Returns the next view, or `None` if the sequence is exhausted.
    ///
    /// A `None` return is the steady-state end of iteration (not an
    /// error); genuine I/O or framing failures are returned as `Err`.
    fn next(&mut self) -> Result<Option<ByteView>, Error>;

    /// Release any file descriptor or path lock held by this iterator.
    /// Idempotent.
    fn close(&mut self);

    /// Convenience: drain every remaining view into `action`, closing the
    /// iterator afterward whether or not `action` returns an error.
    fn for_each_remaining<F>(&mut self, mut action: F) -> Result<(), Error>
    where
        F: FnMut(ByteView) -> Result<(), Error>,
    {
        let result = (|| {
            while let Some(view) = self.next()? {
                action(view)?;
            }
            Ok(())
        })();
        self.close();
        result
    }

    /// Drain every remaining view into one contiguous buffer, closing the
    /// iterator afterward. Convenience for buffered consumption.
    fn collect_to_vec(&mut self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        self.for_each_remaining(|view| {
            out.extend_from_slice(view.as_slice());
            Ok(())
        })?;
        Ok(out)
    }

    /// Like [`collect_to_vec`](ByteIter::collect_to_vec), but fails with
    /// [`Error::MaxRequestBodyConversionSize`] as soon as the accumulated
    /// length would exceed `cap`, instead of materializing the whole body
    /// first. This is the bound `max_request_body_conversion_size` (§10.3)
    /// names: a body → bytes conversion a handler performs on its own,
    /// distinct from (and possibly stricter than) the wire-level
    /// `max_request_body_buffer_size` already enforced while reading the
    /// body off the connection.
    fn collect_to_vec_capped(&mut self, cap: u64) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        self.for_each_remaining(|view| {
            if out.len() as u64 + view.len() as u64 > cap {
                return Err(Error::MaxRequestBodyConversionSize(cap));
            }
            out.extend_from_slice(view.as_slice());
            Ok(())
        })?;
        Ok(out)
    }
}

/// A lazy, restartable-or-draining sequence of byte views.
///
/// See the module documentation and the `RequestBody`/`ResponseBody`
/// distinction between regenerative and non-regenerative bodies.
pub trait Iterable {
    type Iter: ByteIter;

    /// Start a new run over the sequence. May fail with an I/O error, an
    /// interrupt, or (for path-lock-backed sources) a lock timeout.
    fn iterator(&self) -> Result<Self::Iter, Error>;

    /// Bytes the next iteration will yield, or `-1` if unknown.
    fn length(&self) -> i64;

    fn is_empty(&self) -> bool {
        self.length() == 0
    }
}

/// An `Iterable` over a single, already fully materialized buffer.
///
/// Regenerative: `iterator()` may be called any number of times and every
/// run observes the same bytes. This is the simplest body kind and is
/// used for in-memory response bodies and the canonical empty body.
#[derive(Debug, Clone)]
pub struct MemoryBody {
    bytes: Bytes,
}

impl MemoryBody {
    pub fn new<B: Into<Bytes>>(bytes: B) -> Self {
        MemoryBody { bytes: bytes.into() }
    }

    pub fn empty() -> Self {
        MemoryBody { bytes: Bytes::new() }
    }
}

pub struct MemoryBodyIter {
    bytes: Option<Bytes>,
}

impl ByteIter for MemoryBodyIter {
    fn next(&mut self) -> Result<Option<ByteView>, Error> {
        Ok(self.bytes.take().map(ByteView::new))
    }

    fn close(&mut self) {
        self.bytes = None;
    }
}

impl Iterable for MemoryBody {
    type Iter = MemoryBodyIter;

    fn iterator(&self) -> Result<Self::Iter, Error> {
        let bytes = if self.bytes.is_empty() {
            None
        } else {
            Some(self.bytes.clone())
        };
        Ok(MemoryBodyIter { bytes })
    }

    fn length(&self) -> i64 {
        self.bytes.len() as i64
    }
}
