//! Concrete `Iterable` bodies: length-delimited and chunked request/response
//! bodies over a socket, and a regenerative file-backed body for static
//! content served under a [`crate::path_lock::PathLockRegistry`].
//!
//! [`crate::byteview::MemoryBody`] (the in-memory, regenerative case) lives
//! in `byteview.rs` alongside the `ByteView`/`ByteIter` contract it's built
//! directly on top of; this module holds the bodies that need a live
//! source.

use std::cell::RefCell;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use crate::byteview::{ByteIter, ByteView, Iterable};
use crate::channel::ChannelReader;
use crate::chunked::ChunkedDecoder;
use crate::error::Error;
use crate::header_parse::HeaderField;
use crate::path_lock::{PathLock, PathLockRegistry};

/// Translates a [`ChannelReader`]'s sticky empty-view EOS sentinel into the
/// `None` a generic [`ByteIter`] consumer expects, so the chunked decoder
/// (or any code written against `ByteIter`) can read straight off the wire
/// without knowing about the channel's lower-level peek behavior.
pub struct ChannelSource<R> {
    reader: ChannelReader<R>,
}

impl<R: Read> ChannelSource<R> {
    pub fn new(reader: ChannelReader<R>) -> Self {
        ChannelSource { reader }
    }

    pub fn into_inner(self) -> ChannelReader<R> {
        self.reader
    }
}

impl<R: Read> ByteIter for ChannelSource<R> {
    fn next(&mut self) -> Result<Option<ByteView>, Error> {
        match self.reader.next()? {
            Some(view) if view.is_empty() => Ok(None),
            other => Ok(other),
        }
    }

    fn close(&mut self) {
        self.reader.close();
    }
}

/// A `Content-Length`-framed body: exactly `length` bytes, then done.
///
/// Single-shot: the socket underneath can't be replayed, so a second call
/// to [`Iterable::iterator`] fails with [`Error::ClosedPublisher`].
pub struct LengthDelimitedBody<R> {
    reader: RefCell<Option<ChannelReader<R>>>,
    length: u64,
}

impl<R: Read> LengthDelimitedBody<R> {
    pub fn new(mut reader: ChannelReader<R>, length: u64) -> Self {
        reader.limit(length);
        LengthDelimitedBody { reader: RefCell::new(Some(reader)), length }
    }
}

pub struct LengthDelimitedIter<R> {
    reader: Option<ChannelReader<R>>,
}

impl<R: Read> ByteIter for LengthDelimitedIter<R> {
    fn next(&mut self) -> Result<Option<ByteView>, Error> {
        match &mut self.reader {
            Some(r) => r.next(),
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        if let Some(r) = &mut self.reader {
            r.close();
        }
        self.reader = None;
    }
}

impl<R: Read> Iterable for LengthDelimitedBody<R> {
    type Iter = LengthDelimitedIter<R>;

    fn iterator(&self) -> Result<Self::Iter, Error> {
        let reader = self.reader.borrow_mut().take().ok_or(Error::ClosedPublisher)?;
        Ok(LengthDelimitedIter { reader: Some(reader) })
    }

    fn length(&self) -> i64 {
        self.length as i64
    }
}

/// A `Transfer-Encoding: chunked` body. `I` is the raw byte source already
/// positioned right after the request headers (or, for a response body,
/// whatever sink-facing source is being re-decoded for a passthrough proxy).
///
/// Single-shot, like [`LengthDelimitedBody`]. Trailers become available
/// through [`Self::trailers`] only once the terminator chunk has been read.
pub struct ChunkedBody<I> {
    decoder: RefCell<Option<ChunkedDecoder<I>>>,
}

impl<I: ByteIter> ChunkedBody<I> {
    pub fn new(source: I, max_trailers_bytes: u64) -> Self {
        ChunkedBody { decoder: RefCell::new(Some(ChunkedDecoder::new(source, max_trailers_bytes))) }
    }
}

pub struct ChunkedBodyIter<I> {
    decoder: Option<ChunkedDecoder<I>>,
}

impl<I: ByteIter> ByteIter for ChunkedBodyIter<I> {
    fn next(&mut self) -> Result<Option<ByteView>, Error> {
        match &mut self.decoder {
            Some(d) => d.next(),
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        if let Some(d) = &mut self.decoder {
            d.close();
        }
    }
}

impl<I: ByteIter> ChunkedBodyIter<I> {
    /// Trailer fields, available once the decoder has consumed the
    /// terminator chunk (`None` before that, `Some(&[])` if there were none).
    pub fn trailers(&self) -> Option<&[HeaderField]> {
        self.decoder.as_ref().and_then(|d| d.trailers())
    }
}

impl<I: ByteIter> Iterable for ChunkedBody<I> {
    type Iter = ChunkedBodyIter<I>;

    fn iterator(&self) -> Result<Self::Iter, Error> {
        let decoder = self.decoder.borrow_mut().take().ok_or(Error::ClosedPublisher)?;
        Ok(ChunkedBodyIter { decoder: Some(decoder) })
    }

    /// Chunked bodies never know their length up front.
    fn length(&self) -> i64 {
        -1
    }
}

/// A regenerative, disk-backed body: every [`Iterable::iterator`] call
/// re-acquires a read lock on `path` and re-opens the file, so callers may
/// serve the same static resource to any number of concurrent exchanges.
pub struct FileBody {
    path: PathBuf,
    registry: PathLockRegistry,
    lock_timeout: Duration,
    length: u64,
}

impl FileBody {
    /// Opens `path` once up front to record its length (failing fast on a
    /// missing or unreadable file) and to establish the length every
    /// subsequent `iterator()` call will report.
    pub fn open(path: impl Into<PathBuf>, registry: PathLockRegistry, lock_timeout: Duration) -> Result<Self, Error> {
        let path = path.into();
        let metadata = std::fs::metadata(&path).map_err(Error::Io)?;
        Ok(FileBody { path, registry, lock_timeout, length: metadata.len() })
    }
}

pub struct FileBodyIter {
    // Held for the lifetime of the iteration so the lock outlives every
    // `next()` call; dropped (and released) when the iterator is dropped
    // or `close()`d.
    _lock: PathLock,
    reader: Option<ChannelReader<File>>,
}

impl ByteIter for FileBodyIter {
    fn next(&mut self) -> Result<Option<ByteView>, Error> {
        match &mut self.reader {
            Some(r) => r.next(),
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        if let Some(r) = &mut self.reader {
            r.close();
        }
        self.reader = None;
    }
}

impl Iterable for FileBody {
    type Iter = FileBodyIter;

    fn iterator(&self) -> Result<Self::Iter, Error> {
        let path_str = self.path.to_string_lossy().into_owned();
        let lock = self.registry.read_lock(&path_str, self.lock_timeout)?;
        let file = File::open(&self.path).map_err(Error::Io)?;
        let mut reader = ChannelReader::new(file);
        reader.limit(self.length);
        Ok(FileBodyIter { _lock: lock, reader: Some(reader) })
    }

    fn length(&self) -> i64 {
        self.length as i64
    }
}
