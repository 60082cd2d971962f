//! The error taxonomy for the whole crate.
//!
//! Every fallible operation in this crate returns `Result<T, Error>`. There
//! is no panicking entry point except documented programmer-error
//! invariants (misusing the response encoder out of order).

use std::fmt;
use std::io;

use quick_error::quick_error;

/// A single byte position inside a parse, used for diagnostics.
///
/// `previous` and `current` are the two bytes the parser was looking at
/// when it decided to fail; `offset` is the number of bytes consumed from
/// the start of the thing being parsed (request line, header section, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsePosition {
    pub previous: Option<u8>,
    pub current: Option<u8>,
    pub offset: u64,
}

impl ParsePosition {
    pub fn new(previous: Option<u8>, current: Option<u8>, offset: u64) -> Self {
        ParsePosition { previous, current, offset }
    }
}

/// Which kind of hold a path-lock acquisition or timeout was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Read,
    Write,
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LockKind::Read => write!(f, "read"),
            LockKind::Write => write!(f, "write"),
        }
    }
}

impl fmt::Display for ParsePosition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fn describe(b: Option<u8>) -> String {
            match b {
                None => "<none>".to_string(),
                Some(b) => format!(
                    "(hex:0x{:02x}, decimal:{}, char:{:?})",
                    b, b, b as char
                ),
            }
        }
        write!(
            f,
            "offset {}, previous byte {}, current byte {}",
            self.offset,
            describe(self.previous),
            describe(self.current)
        )
    }
}

quick_error! {
    /// Union of every typed failure the crate can produce.
    #[derive(Debug)]
    pub enum Error {
        /// Syntax error in the request line.
        RequestLineParse(pos: ParsePosition, message: String) {
            display("error parsing request line at {}: {}", pos, message)
        }
        /// Syntax error in a header field section (request headers or trailers).
        HeaderParse(pos: ParsePosition, message: String) {
            display("error parsing headers at {}: {}", pos, message)
        }
        /// The `HTTP-version` token could not be parsed at all.
        HttpVersionParse(token: String) {
            display("unparseable HTTP version: {:?}", token)
        }
        /// Request declared a version older than the configured floor.
        HttpVersionTooOld(proposed: &'static str) {
            display("HTTP version too old, suggesting {}", proposed)
        }
        /// Request declared HTTP/2 or newer.
        HttpVersionTooNew {
            display("HTTP version too new, only HTTP/1.0 and HTTP/1.1 are supported")
        }
        /// Content-Length and Transfer-Encoding both present, or similar
        /// framing conflicts.
        BadRequest(message: String) {
            display("bad request: {}", message)
        }
        /// A typed header accessor could not convert the header value(s).
        BadHeader(name: String, message: String) {
            display("bad header {:?}: {}", name, message)
        }
        /// Media-type / media-range grammar violation.
        MediaTypeParse(input: String, message: String) {
            display("error parsing media type {:?}: {}", input, message)
        }
        /// Chunked transfer-coding framing error.
        Decoder(message: String) {
            display("chunked decoder error: {}", message)
        }
        /// Channel reached end-of-stream while a byte limit was still open.
        EndOfStream {
            display("channel reached end of stream with bytes still expected")
        }
        /// A body was present where the protocol forbids one (e.g. TRACE).
        IllegalRequestBody(message: String) {
            display("illegal request body: {}", message)
        }
        /// A response tried to carry a body where the status forbids one.
        IllegalResponseBody(message: String) {
            display("illegal response body: {}", message)
        }
        /// Request head exceeded `max_request_head_size`.
        MaxRequestHeadSizeExceeded(limit: u64) {
            display("request head exceeded the {} byte limit", limit)
        }
        /// Trailers exceeded `max_request_trailers_size`.
        MaxRequestTrailersSizeExceeded(limit: u64) {
            display("request trailers exceeded the {} byte limit", limit)
        }
        /// In-memory body buffer exceeded `max_request_body_buffer_size`.
        MaxRequestBodyBufferSize(limit: u64) {
            display("buffered request body exceeded the {} byte limit", limit)
        }
        /// `body -> String`/`body -> Vec<u8>` conversion exceeded its cap.
        MaxRequestBodyConversionSize(limit: u64) {
            display("body conversion exceeded the {} byte limit", limit)
        }
        /// Idle timeout waiting for the request head.
        RequestHeadTimeout {
            display("timed out waiting for the request head")
        }
        /// Idle timeout waiting for request body bytes.
        RequestBodyTimeout {
            display("timed out waiting for request body data")
        }
        /// Idle timeout waiting for the handler to produce a response.
        ResponseTimeout {
            display("timed out waiting for the response")
        }
        /// A path-lock acquisition waited past its deadline.
        FileLockTimeout(kind: LockKind, path: String) {
            display("Wanted a {} lock for path: {}", kind, path)
        }
        /// A thread tried to upgrade a held read lock to a write lock.
        IllegalLockUpgrade(path: String) {
            display("cannot upgrade read lock to write lock for path: {}", path)
        }
        /// A body iterator was closed while a consumer was still draining it.
        ClosedPublisher {
            display("body iterator was closed while still being consumed")
        }
        /// The calling thread does not own the lock it tried to release.
        IllegalMonitorState(path: String) {
            display("thread does not own the lock for path: {}", path)
        }
        /// Task-level cancellation observed at a suspension point.
        Interrupted {
            display("operation was interrupted")
        }
        /// Underlying I/O failure from the socket.
        Io(err: io::Error) {
            display("I/O error: {}", err)
            from()
        }
    }
}

impl Error {
    /// The status code an error handler should default to when it has no
    /// more specific policy, per the crate's documented mapping.
    pub fn default_status(&self) -> u16 {
        use Error::*;
        match self {
            RequestLineParse(..) => 400,
            HeaderParse(..) => 400,
            HttpVersionParse(..) => 400,
            HttpVersionTooOld(..) => 426,
            HttpVersionTooNew => 505,
            BadRequest(..) => 400,
            BadHeader(..) => 400,
            MediaTypeParse(..) => 400,
            Decoder(..) => 400,
            EndOfStream => 0, // fatal, connection closes
            IllegalRequestBody(..) => 400,
            IllegalResponseBody(..) => 0, // programming bug
            MaxRequestHeadSizeExceeded(..) => 413,
            MaxRequestTrailersSizeExceeded(..) => 413,
            MaxRequestBodyBufferSize(..) => 413,
            MaxRequestBodyConversionSize(..) => 413,
            RequestHeadTimeout => 408,
            RequestBodyTimeout => 408,
            ResponseTimeout => 503,
            FileLockTimeout(..) => 503,
            IllegalLockUpgrade(..) => 0, // fatal to exchange
            ClosedPublisher => 0, // fatal to exchange
            IllegalMonitorState(..) => 0,
            Interrupted => 0,
            Io(..) => 0,
        }
    }

    /// True for errors that must never reach the wire and indicate a bug
    /// in this crate or its caller rather than a malformed request.
    pub fn is_fatal_bug(&self) -> bool {
        matches!(self, Error::IllegalResponseBody(..))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_status_mapping() {
        assert_eq!(Error::HttpVersionTooOld("HTTP/1.0").default_status(), 426);
        assert_eq!(Error::HttpVersionTooNew.default_status(), 505);
        assert_eq!(Error::RequestHeadTimeout.default_status(), 408);
        assert_eq!(Error::MaxRequestHeadSizeExceeded(100).default_status(), 413);
    }

    #[test]
    fn parse_position_display() {
        let pos = ParsePosition::new(Some(b' '), Some(b'\n'), 4);
        assert_eq!(
            format!("{}", pos),
            "offset 4, previous byte (hex:0x20, decimal:32, char:' '), \
             current byte (hex:0x0a, decimal:10, char:'\\n')"
        );
    }

    #[test]
    fn fatal_bug_flag() {
        assert!(Error::IllegalResponseBody("x".into()).is_fatal_bug());
        assert!(!Error::BadRequest("x".into()).is_fatal_bug());
    }
}
