//! `ExchangeDriver` (C11): sequences request/response exchanges over one
//! connection (§4.11, §5): `IDLE -> READING_HEAD -> READING_BODY ->
//! DISPATCHING -> WRITING_HEAD -> WRITING_BODY -> DONE`, looping back to
//! `IDLE` for the next pipelined request until either side asks to close.
//!
//! Request-line and header parsing pull one byte at a time off the wire
//! (`ByteAtATime`) so a parser can never over-read into the section that
//! follows it; once framing is known, the body is drained at the
//! channel's native bulk-view granularity into a buffer capped by
//! `max_request_body_buffer_size`, matching the reference engine's own
//! distinction between its line-oriented head parser and its buffered
//! body codec. A handler that wants true streaming talks to
//! [`crate::body`]'s `Iterable` bodies directly instead of going through
//! this driver.
//!
//! There's no socket-level read timeout here, so timeouts are checked at
//! phase boundaries against the wall-clock elapsed since the phase
//! started, rather than preempting a blocking read mid-flight.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Instant;

use crate::byteview::{ByteIter, ByteView, Iterable, MemoryBody};
use crate::channel::ChannelReader;
use crate::chunked::ChunkedDecoder;
use crate::config::Config;
use crate::error::Error;
use crate::handler::{select_handler, ActionChain, Handler, RouteRegistry};
use crate::header_index::HeaderIndex;
use crate::header_parse::{self, CapKind};
use crate::media_type::MediaType;
use crate::request::{Request, RequestHead};
use crate::request_line;
use crate::response::{write_head, Builder, ResponseModel};
use crate::status;
use crate::version::Version;

/// Bodies this driver hands to handlers: always a fully buffered,
/// regenerative in-memory body (§10.1's ambient-stack simplification over
/// the lower-level streaming bodies in `body.rs`).
pub type RequestBody = MemoryBody;

/// Adapts any [`ByteIter`] to yield one byte per view, so a line-oriented
/// parser can never consume bytes belonging to the section that follows it.
struct ByteAtATime<I> {
    inner: I,
    pending: Option<ByteView>,
}

impl<I: ByteIter> ByteAtATime<I> {
    fn new(inner: I) -> Self {
        ByteAtATime { inner, pending: None }
    }

    /// Hands back the wrapped iterator and whatever single buffered byte
    /// (if any) is still unread, so the caller can splice it back ahead of
    /// the next, bulk-granularity stage.
    fn into_parts(self) -> (I, Option<ByteView>) {
        (self.inner, self.pending)
    }
}

impl<I: ByteIter> ByteIter for ByteAtATime<I> {
    fn next(&mut self) -> Result<Option<ByteView>, Error> {
        loop {
            if let Some(view) = &mut self.pending {
                if !view.is_empty() {
                    return Ok(Some(view.split_to(1)));
                }
                self.pending = None;
            }
            match self.inner.next()? {
                None => return Ok(None),
                Some(v) if v.is_empty() => return Ok(None),
                Some(v) => self.pending = Some(v),
            }
        }
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

/// Translates a [`ChannelReader`]'s sticky empty-view EOS sentinel into
/// the `None` a generic [`ByteIter`] consumer expects (mirrors `body.rs`'s
/// `ChannelSource`, kept as a small private twin here so the driver can
/// feed a `ChannelReader` to the chunked decoder without handing the
/// decoder a type it would need to reach back into `body.rs` for).
struct HeadSource<R> {
    reader: ChannelReader<R>,
}

impl<R: Read> ByteIter for HeadSource<R> {
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

/// What to do with the connection once the current exchange is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NextStep {
    KeepAlive,
    Close,
}

pub struct ExchangeDriver<Reg, Chain> {
    config: Arc<Config>,
    routes: Reg,
    actions: Option<Chain>,
}

impl<Reg, Chain> ExchangeDriver<Reg, Chain>
where
    Reg: RouteRegistry<RequestBody>,
    Chain: ActionChain<RequestBody>,
{
    pub fn new(config: Arc<Config>, routes: Reg, actions: Option<Chain>) -> Self {
        ExchangeDriver { config, routes, actions }
    }

    /// Drives exchanges on one connection until either side asks to close
    /// or a fatal (channel-level) error occurs.
    pub fn run<R: Read, W: Write>(&mut self, reader: R, mut writer: W) -> Result<(), Error> {
        let mut channel = ChannelReader::new(reader);
        loop {
            match self.run_one(channel, &mut writer) {
                Ok((next_channel, NextStep::KeepAlive)) => {
                    channel = next_channel;
                }
                Ok((_, NextStep::Close)) => return Ok(()),
                Err(err) => {
                    log::error!("closing connection after exchange error: {}", err);
                    return Err(err);
                }
            }
        }
    }

    fn run_one<R: Read, W: Write>(
        &mut self,
        channel: ChannelReader<R>,
        writer: &mut W,
    ) -> Result<(ChannelReader<R>, NextStep), Error> {
        let head_started_at = Instant::now();
        log::debug!("reading request head");

        let mut head_source = ByteAtATime::new(HeadSource { reader: channel });
        let line = request_line::parse(&mut head_source, self.config.head_cap())?;
        let (fields, _) = header_parse::parse(&mut head_source, self.config.head_cap(), CapKind::Head)?;
        let headers = HeaderIndex::new(fields);

        let (head_source_inner, leftover) = head_source.into_parts();
        let mut reader = head_source_inner.reader;
        if let Some(view) = leftover {
            if !view.is_empty() {
                reader.push_back(view.into_bytes());
            }
        }

        if head_started_at.elapsed() > self.config.idle_timeout() {
            return Err(Error::RequestHeadTimeout);
        }

        let version = Version::parse(&line.http_version)?;
        version.require_at_least(self.config.floor_version())?;

        let is_chunked = headers.is_chunked();
        let content_length = headers.content_length()?;
        if is_chunked && content_length.is_some() {
            return Err(Error::BadRequest("Content-Length and Transfer-Encoding both present".to_string()));
        }

        let is_trace = line.method.eq_ignore_ascii_case("TRACE");
        let has_declared_body = is_chunked || content_length.unwrap_or(0) > 0;
        if is_trace && has_declared_body {
            return Err(Error::IllegalRequestBody("TRACE requests must not carry a body".to_string()));
        }

        let connection_tokens = headers.all_tokens("Connection");
        let close_requested = match version {
            Version::Http10 => !connection_tokens.iter().any(|t| t.eq_ignore_ascii_case("keep-alive")),
            Version::Http11 => connection_tokens.iter().any(|t| t.eq_ignore_ascii_case("close")),
        };

        log::debug!("dispatching {} {}", line.method, line.target);
        let body_started_at = Instant::now();
        let (body_bytes, reader) = self.read_body(reader, is_chunked, content_length)?;
        if body_started_at.elapsed() > self.config.idle_timeout() {
            return Err(Error::RequestBodyTimeout);
        }

        let content_type = headers.content_type()?;
        let accept: Vec<MediaType> = headers
            .all_tokens_keep_quotes("Accept")
            .iter()
            .filter_map(|t| MediaType::parse(t).ok())
            .collect();

        let is_head_request = line.method.eq_ignore_ascii_case("HEAD");
        let method = line.method.clone();
        let target = line.target.clone();
        let request_head = RequestHead::new(line, headers);

        let response_started_at = Instant::now();
        let mut request =
            Request::with_conversion_cap(request_head, MemoryBody::new(body_bytes), self.config.body_conversion_cap());
        if let Some(actions) = &self.actions {
            actions.before(&target, &mut request)?;
        }

        let candidates = self.routes.lookup(&method, &target);
        let chosen = select_handler(&candidates, content_type.as_ref(), &accept).cloned();

        let mut response = match chosen {
            Some(handler) => match handler.handle(request) {
                Ok(response) => response,
                Err(err) if !err.is_fatal_bug() => {
                    log::warn!("handler error, falling back to a {} response: {}", err.default_status(), err);
                    error_response(&err)?
                }
                Err(err) => return Err(err),
            },
            None => {
                let mut b: Builder<MemoryBody> = Builder::new();
                b.status(404);
                b.build()?
            }
        };

        if let Some(actions) = &self.actions {
            actions.after(&target, &mut response)?;
        }
        if response_started_at.elapsed() > self.config.response_timeout() {
            return Err(Error::ResponseTimeout);
        }

        let connection_close = close_requested || response_says_close(&response);
        write_response(writer, version, &mut response, is_head_request)?;

        let next_step = if connection_close { NextStep::Close } else { NextStep::KeepAlive };
        Ok((reader, next_step))
    }

    /// Drains the request body (if any) into a buffer capped by
    /// `max_request_body_buffer_size`, returning the byte buffer and the
    /// reclaimed channel reader so the connection can keep going.
    fn read_body<R: Read>(
        &self,
        mut reader: ChannelReader<R>,
        is_chunked: bool,
        content_length: Option<u64>,
    ) -> Result<(Vec<u8>, ChannelReader<R>), Error> {
        let cap = self.config.body_buffer_cap();

        if is_chunked {
            let mut decoder = ChunkedDecoder::new(HeadSource { reader }, self.config.trailers_cap());
            let mut buf = Vec::new();
            while let Some(view) = decoder.next()? {
                buf.extend_from_slice(view.as_slice());
                if buf.len() as u64 > cap {
                    return Err(Error::MaxRequestBodyBufferSize(cap));
                }
            }
            let (source, leftover) = decoder.into_inner();
            let mut reader = source.reader;
            if let Some(view) = leftover {
                if !view.is_empty() {
                    reader.push_back(view.into_bytes());
                }
            }
            Ok((buf, reader))
        } else if let Some(length) = content_length {
            if length > cap {
                return Err(Error::MaxRequestBodyBufferSize(cap));
            }
            reader.limit(length);
            let mut buf = Vec::with_capacity(length as usize);
            while let Some(view) = reader.next()? {
                buf.extend_from_slice(view.as_slice());
            }
            reader.reset();
            Ok((buf, reader))
        } else {
            Ok((Vec::new(), reader))
        }
    }
}

fn response_says_close(response: &ResponseModel<MemoryBody>) -> bool {
    response.headers().iter().any(|f| f.name.eq_ignore_ascii_case("Connection") && f.value.eq_ignore_ascii_case("close"))
}

fn error_response(err: &Error) -> Result<ResponseModel<MemoryBody>, Error> {
    let status = err.default_status();
    let status = if status == 0 { 500 } else { status };
    let mut b: Builder<MemoryBody> = Builder::new();
    b.status(status);
    b.build()
}

/// Writes the response head, then the body, unless this is a `HEAD`
/// request: body bytes are drained (in case producing them has a side
/// effect worth letting run) but never put on the wire. A non-empty body
/// drained for a `HEAD` response is `IllegalResponseBody`, caught only
/// once the bytes have already been produced (§4.11).
fn write_response<W: Write>(
    writer: &mut W,
    version: Version,
    response: &mut ResponseModel<MemoryBody>,
    is_head_request: bool,
) -> Result<(), Error> {
    if !status::forbids_body(response.status_code) {
        let length = response.body.length().max(0) as u64;
        response.ensure_content_length(length);
    }

    let mut head = Vec::new();
    write_head(response, version.as_str(), &mut head);
    writer.write_all(&head).map_err(Error::Io)?;

    let mut iter = response.body.iterator()?;
    let mut saw_bytes = false;
    let result = iter.for_each_remaining(|view| {
        if !view.is_empty() {
            saw_bytes = true;
            if !is_head_request {
                writer.write_all(view.as_slice()).map_err(Error::Io)?;
            }
        }
        Ok(())
    });
    writer.flush().map_err(Error::Io)?;
    result?;

    if is_head_request && saw_bytes {
        return Err(Error::IllegalResponseBody("HEAD response produced body bytes".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::media_type::MediaMatcher;
    use crate::response::BodyBinding;
    use std::io::Cursor;

    struct EchoHandler;
    impl Handler<RequestBody> for EchoHandler {
        fn handle(&self, request: Request<RequestBody>) -> Result<ResponseModel<RequestBody>, Error> {
            let body = request.materialize_body()?;
            let mut b: Builder<RequestBody> = Builder::new();
            b.status(200).reason("OK");
            let len = body.len() as u64;
            b.body(BodyBinding::Sized(len, MemoryBody::new(body)));
            b.build()
        }
    }

    struct NeverCalledHandler;
    impl Handler<RequestBody> for NeverCalledHandler {
        fn consumes(&self) -> MediaMatcher {
            MediaMatcher::Concrete(MediaType::parse("application/json").unwrap())
        }
        fn handle(&self, _request: Request<RequestBody>) -> Result<ResponseModel<RequestBody>, Error> {
            panic!("should not be dispatched to")
        }
    }

    struct SingleRoute;
    impl RouteRegistry<RequestBody> for SingleRoute {
        fn lookup(&self, _method: &str, _path: &str) -> Vec<Arc<dyn Handler<RequestBody>>> {
            vec![Arc::new(EchoHandler)]
        }
    }

    struct SingleHandlerRoute(Arc<dyn Handler<RequestBody>>);
    impl RouteRegistry<RequestBody> for SingleHandlerRoute {
        fn lookup(&self, _method: &str, _path: &str) -> Vec<Arc<dyn Handler<RequestBody>>> {
            vec![self.0.clone()]
        }
    }

    struct NoRoute;
    impl RouteRegistry<RequestBody> for NoRoute {
        fn lookup(&self, _method: &str, _path: &str) -> Vec<Arc<dyn Handler<RequestBody>>> {
            Vec::new()
        }
    }

    struct NoHooks;
    impl ActionChain<RequestBody> for NoHooks {
        fn before(&self, _path: &str, _request: &mut Request<RequestBody>) -> Result<(), Error> {
            Ok(())
        }
        fn after(&self, _path: &str, _response: &mut ResponseModel<RequestBody>) -> Result<(), Error> {
            Ok(())
        }
    }

    fn run(input: &[u8], routes: impl RouteRegistry<RequestBody>) -> (Result<(), Error>, Vec<u8>) {
        run_with_config(input, routes, Config::new().done())
    }

    fn run_with_config(
        input: &[u8],
        routes: impl RouteRegistry<RequestBody>,
        config: Arc<Config>,
    ) -> (Result<(), Error>, Vec<u8>) {
        let mut driver = ExchangeDriver::new(config, routes, Some(NoHooks));
        let mut out = Vec::new();
        let result = driver.run(Cursor::new(input.to_vec()), &mut out);
        (result, out)
    }

    #[test]
    fn simple_get_round_trip() {
        let (result, out) = run(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n", SingleRoute);
        result.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    }

    #[test]
    fn post_body_is_echoed_back() {
        let (result, out) = run(
            b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
            SingleRoute,
        );
        result.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.ends_with("hello"));
    }

    #[test]
    fn body_over_conversion_cap_yields_413_even_under_buffer_cap() {
        let config = Config::new().max_request_body_conversion_size(3).done();
        let (result, out) = run_with_config(
            b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
            SingleRoute,
            config,
        );
        result.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 413"));
    }

    #[test]
    fn chunked_request_body_is_decoded_before_dispatch() {
        let (result, out) = run(
            b"POST / HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n2\r\nhi\r\n0\r\n\r\n",
            SingleRoute,
        );
        result.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with("hi"));
    }

    #[test]
    fn no_matching_route_yields_404() {
        let (result, out) = run(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n", NoRoute);
        result.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 404"));
    }

    #[test]
    fn trace_with_body_is_rejected() {
        let (result, _out) = run(b"TRACE / HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc", SingleRoute);
        assert!(matches!(result.unwrap_err(), Error::IllegalRequestBody(_)));
    }

    #[test]
    fn conflicting_framing_headers_is_bad_request() {
        let (result, _out) = run(
            b"GET / HTTP/1.1\r\nContent-Length: 3\r\nTransfer-Encoding: chunked\r\n\r\nabc",
            SingleRoute,
        );
        assert!(matches!(result.unwrap_err(), Error::BadRequest(_)));
    }

    #[test]
    fn incompatible_content_type_falls_through_to_404() {
        let (result, out) = run(
            b"POST / HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: 1\r\nConnection: close\r\n\r\nx",
            SingleHandlerRoute(Arc::new(NeverCalledHandler)),
        );
        result.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 404"));
    }

    #[test]
    fn keeps_connection_alive_across_pipelined_requests() {
        let (result, out) = run(
            b"GET /a HTTP/1.1\r\nHost: x\r\n\r\nGET /b HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
            SingleRoute,
        );
        result.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("HTTP/1.1 200 OK").count(), 2);
    }
}
