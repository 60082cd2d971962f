//! `ResponseModel` & its `Builder` (C9): the value a handler hands back to
//! the exchange driver, and the staged construction that matches the
//! reference engine's own status/add_header/done_headers progression
//! (`server/response_writer.rs`) — but as an immutable value plus a build
//! step, rather than an in-place socket writer, since wire serialization is
//! the exchange driver's job (§4.11), not the model's.

use crate::error::Error;
use crate::header_parse::HeaderField;
use crate::status;

/// A complete, validated response: status, reason phrase, headers, and a
/// body whose framing has already been reconciled with `Content-Length` /
/// `Transfer-Encoding`.
#[derive(Debug, Clone)]
pub struct ResponseModel<B> {
    pub status_code: u16,
    pub reason_phrase: String,
    headers: Vec<HeaderField>,
    pub body: B,
}

impl<B> ResponseModel<B> {
    pub fn headers(&self) -> &[HeaderField] {
        &self.headers
    }

    /// Inserts `Content-Length: length` if the response carries neither
    /// framing header yet. Used by the exchange driver right before
    /// writing the head, so a handler that built an entity-less response
    /// without calling `.body(...)` still gets unambiguous framing on a
    /// persistent connection.
    pub(crate) fn ensure_content_length(&mut self, length: u64) {
        let has_framing = self
            .headers
            .iter()
            .any(|f| f.name.eq_ignore_ascii_case("Content-Length") || f.name.eq_ignore_ascii_case("Transfer-Encoding"));
        if !has_framing {
            self.headers.push(HeaderField { name: "Content-Length".to_string(), value: length.to_string() });
        }
    }
}

/// Declares how the body builder step affects framing headers.
pub enum BodyBinding<B> {
    /// No entity body at all; any `Content-Length` is removed.
    Empty,
    /// A body whose exact byte length is known up front; `Content-Length`
    /// is set to that value, overwriting whatever was there before.
    Sized(u64, B),
    /// A body whose length is not known ahead of time; `Content-Length` is
    /// removed and the driver is responsible for chunked framing or a
    /// close-terminated transfer.
    Unsized(B),
}

/// Builds a [`ResponseModel`] the way the reference engine's
/// `ResponseWriter` stages a response: status first, then headers, then
/// the body, with state-ordering bugs caught by panics (programmer error,
/// not a request-driven failure) exactly as the reference engine's own
/// `add_header`/`add_length`/`done_headers` do.
pub struct Builder<B> {
    status_code: Option<u16>,
    reason_phrase: Option<String>,
    headers: Vec<HeaderField>,
    body: Option<BodyBinding<B>>,
}

impl<B> Default for Builder<B> {
    fn default() -> Self {
        Builder { status_code: None, reason_phrase: None, headers: Vec::new(), body: None }
    }
}

impl<B> Builder<B> {
    pub fn new() -> Self {
        Builder::default()
    }

    /// # Panics
    ///
    /// If the status code was already set — mirrors the reference writer's
    /// "status line already written" panic.
    pub fn status(&mut self, code: u16) -> &mut Self {
        assert!(self.status_code.is_none(), "response status already set");
        self.status_code = Some(code);
        self
    }

    pub fn reason(&mut self, reason: impl Into<String>) -> &mut Self {
        self.reason_phrase = Some(reason.into());
        self
    }

    /// Appends a header; duplicate names are legal and preserved in
    /// first-occurrence position on the wire (§4.9).
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push(HeaderField { name: name.into(), value: value.into() });
        self
    }

    /// Removes every header stored under `name` (case-insensitive).
    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        self.headers.retain(|f| !f.name.eq_ignore_ascii_case(name));
        self
    }

    /// # Panics
    ///
    /// If the body was already set.
    pub fn body(&mut self, binding: BodyBinding<B>) -> &mut Self {
        assert!(self.body.is_none(), "response body already set");
        self.body = Some(binding);
        self
    }

    /// Validates and assembles the final, immutable response.
    ///
    /// # Errors
    ///
    /// [`Error::IllegalResponseBody`] if a non-empty body accompanies a
    /// status that forbids one (1xx, 204, 304). Multiple `Content-Length`
    /// headers, or `Connection: close` on a 1xx response, are programmer
    /// bugs in the handler and are reported the same way (never surfaced
    /// to the wire, per §7).
    pub fn build(&mut self) -> Result<ResponseModel<B>, Error>
    where
        B: DefaultBody,
    {
        let status_code = self.status_code.expect("response status was never set");
        let reason_phrase = self.reason_phrase.clone().unwrap_or_else(|| "Unknown".to_string());
        let mut headers = std::mem::take(&mut self.headers);

        let manual_content_length_count =
            headers.iter().filter(|f| f.name.eq_ignore_ascii_case("Content-Length")).count();
        if manual_content_length_count > 1 {
            return Err(Error::IllegalResponseBody("multiple Content-Length headers".to_string()));
        }
        headers.retain(|f| !f.name.eq_ignore_ascii_case("Content-Length"));

        let binding = self.body.take().unwrap_or(BodyBinding::Empty);
        let (body, has_entity) = match binding {
            BodyBinding::Empty => (B::empty_body(), false),
            BodyBinding::Sized(len, body) => {
                if len > 0 {
                    headers.push(HeaderField { name: "Content-Length".to_string(), value: len.to_string() });
                }
                (body, len > 0)
            }
            BodyBinding::Unsized(body) => (body, true),
        };

        if has_entity && status::forbids_body(status_code) {
            return Err(Error::IllegalResponseBody(format!(
                "status {} must not carry a response body",
                status_code
            )));
        }

        if status::is_informational(status_code)
            && headers.iter().any(|f| f.name.eq_ignore_ascii_case("Connection") && f.value.eq_ignore_ascii_case("close"))
        {
            return Err(Error::IllegalResponseBody("Connection: close is not valid on a 1xx response".to_string()));
        }

        Ok(ResponseModel { status_code, reason_phrase, headers, body })
    }
}

/// Lets the builder materialize the "no body" case without the caller
/// having to supply a sentinel value for every concrete body type.
pub trait DefaultBody {
    fn empty_body() -> Self;
}

impl DefaultBody for crate::byteview::MemoryBody {
    fn empty_body() -> Self {
        crate::byteview::MemoryBody::empty()
    }
}

/// Serializes the response head exactly as the reference engine writes it:
/// strict `\r\n` line endings, `name ": " value` per header, insertion
/// order preserved, ASCII-7 only.
pub fn write_head<B>(response: &ResponseModel<B>, version: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(version.as_bytes());
    out.push(b' ');
    out.extend_from_slice(response.status_code.to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(response.reason_phrase.as_bytes());
    out.extend_from_slice(b"\r\n");
    for field in &response.headers {
        out.extend_from_slice(field.name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(field.value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::byteview::MemoryBody;

    #[test]
    fn default_reason_phrase_is_unknown() {
        let mut b: Builder<MemoryBody> = Builder::new();
        b.status(200);
        let r = b.build().unwrap();
        assert_eq!(r.reason_phrase, "Unknown");
        assert_eq!(r.headers().len(), 0);
    }

    #[test]
    fn sized_body_sets_content_length_overwriting_previous() {
        let mut b: Builder<MemoryBody> = Builder::new();
        b.status(200).header("Content-Length", "999");
        b.body(BodyBinding::Sized(5, MemoryBody::new(&b"hello"[..])));
        let r = b.build().unwrap();
        let values: Vec<_> = r.headers().iter().filter(|f| f.name == "Content-Length").collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, "5");
    }

    #[test]
    fn empty_body_removes_content_length() {
        let mut b: Builder<MemoryBody> = Builder::new();
        b.status(204).header("Content-Length", "10");
        let r = b.build().unwrap();
        assert!(r.headers().iter().all(|f| f.name != "Content-Length"));
    }

    #[test]
    fn nonempty_body_on_204_is_illegal() {
        let mut b: Builder<MemoryBody> = Builder::new();
        b.status(204);
        b.body(BodyBinding::Sized(3, MemoryBody::new(&b"abc"[..])));
        assert!(matches!(b.build(), Err(Error::IllegalResponseBody(_))));
    }

    #[test]
    fn unsized_body_on_304_is_illegal_even_without_known_length() {
        let mut b: Builder<MemoryBody> = Builder::new();
        b.status(304);
        b.body(BodyBinding::Unsized(MemoryBody::new(&b"x"[..])));
        assert!(matches!(b.build(), Err(Error::IllegalResponseBody(_))));
    }

    #[test]
    fn multiple_content_length_headers_is_illegal() {
        let mut b: Builder<MemoryBody> = Builder::new();
        b.status(200).header("Content-Length", "1").header("Content-Length", "2");
        assert!(matches!(b.build(), Err(Error::IllegalResponseBody(_))));
    }

    #[test]
    fn connection_close_on_1xx_is_illegal() {
        let mut b: Builder<MemoryBody> = Builder::new();
        b.status(101).header("Connection", "close");
        assert!(matches!(b.build(), Err(Error::IllegalResponseBody(_))));
    }

    #[test]
    #[should_panic(expected = "response status already set")]
    fn setting_status_twice_panics() {
        let mut b: Builder<MemoryBody> = Builder::new();
        b.status(200);
        b.status(201);
    }

    #[test]
    fn write_head_uses_strict_crlf_and_preserves_header_order() {
        let mut b: Builder<MemoryBody> = Builder::new();
        b.status(200).reason("OK").header("X-A", "1").header("X-B", "2");
        let response = b.build().unwrap();
        let mut out = Vec::new();
        write_head(&response, "HTTP/1.1", &mut out);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "HTTP/1.1 200 OK\r\nX-A: 1\r\nX-B: 2\r\n\r\n"
        );
    }
}
