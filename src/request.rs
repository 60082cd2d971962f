//! `RequestHead` & `Attributes` (C12), and the `Request` value they sit
//! inside (§3 data model).

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::byteview::{ByteIter, Iterable};
use crate::error::Error;
use crate::header_index::HeaderIndex;
use crate::request_line::RequestLine;

/// `(RequestLine, HeaderIndex)` — everything parsed before the body.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub line: RequestLine,
    pub headers: HeaderIndex,
}

impl RequestHead {
    pub fn new(line: RequestLine, headers: HeaderIndex) -> Self {
        RequestHead { line, headers }
    }

    pub fn method(&self) -> &str {
        &self.line.method
    }

    pub fn target(&self) -> &str {
        &self.line.target
    }
}

/// A per-request name → value scratch map, shared by the handler and any
/// action-chain hooks that run around it.
///
/// Process-safe: cloning an `Attributes` clones the handle, not the map.
#[derive(Clone, Default)]
pub struct Attributes {
    values: Arc<Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>>,
}

impl Attributes {
    pub fn new() -> Self {
        Attributes::default()
    }

    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.values.lock().unwrap().insert(key.into(), Arc::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let guard = self.values.lock().unwrap();
        let value = guard.get(key)?;
        value.clone().downcast::<T>().ok()
    }

    pub fn remove(&self, key: &str) {
        self.values.lock().unwrap().remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.lock().unwrap().contains_key(key)
    }
}

/// A complete request: head, body, and the mutable attribute scratch map.
///
/// `Body` is generic so both the streaming (`ChannelReader`-backed) and
/// in-memory (`MemoryBody`) cases can be carried without an extra layer
/// of dynamic dispatch at the hot path.
pub struct Request<B> {
    pub head: RequestHead,
    pub body: B,
    pub attributes: Attributes,
    conversion_cap: Option<u64>,
}

impl<B> Request<B> {
    pub fn new(head: RequestHead, body: B) -> Self {
        Request { head, body, attributes: Attributes::new(), conversion_cap: None }
    }

    /// Like [`new`](Request::new), but records the cap a body→bytes
    /// conversion should respect (`max_request_body_conversion_size`,
    /// §10.3), so [`materialize_body`](Request::materialize_body) can
    /// enforce it without the handler needing its own access to `Config`.
    pub fn with_conversion_cap(head: RequestHead, body: B, cap: u64) -> Self {
        Request { head, body, attributes: Attributes::new(), conversion_cap: Some(cap) }
    }
}

impl<B: Iterable> Request<B> {
    /// Converts the whole body into one buffer, failing with
    /// `Error::MaxRequestBodyConversionSize` if a conversion cap was set
    /// and the body exceeds it.
    pub fn materialize_body(&self) -> Result<Vec<u8>, Error> {
        let mut iter = self.body.iterator()?;
        match self.conversion_cap {
            Some(cap) => iter.collect_to_vec_capped(cap),
            None => iter.collect_to_vec(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::header_parse::HeaderField;
    use std::time::Instant;

    fn sample_head() -> RequestHead {
        RequestHead::new(
            RequestLine {
                method: "GET".into(),
                target: "/x".into(),
                http_version: "HTTP/1.1".into(),
                parse_started_at: Instant::now(),
                bytes_consumed: 10,
            },
            HeaderIndex::new(vec![HeaderField { name: "Host".into(), value: "x".into() }]),
        )
    }

    #[test]
    fn request_head_accessors() {
        let head = sample_head();
        assert_eq!(head.method(), "GET");
        assert_eq!(head.target(), "/x");
    }

    #[test]
    fn attributes_roundtrip_typed_value() {
        let attrs = Attributes::new();
        attrs.set("count", 42u32);
        assert_eq!(*attrs.get::<u32>("count").unwrap(), 42);
        assert!(attrs.contains("count"));
        attrs.remove("count");
        assert!(!attrs.contains("count"));
    }

    #[test]
    fn attributes_wrong_type_is_none() {
        let attrs = Attributes::new();
        attrs.set("count", 42u32);
        assert!(attrs.get::<String>("count").is_none());
    }

    #[test]
    fn attributes_clone_shares_the_same_map() {
        let attrs = Attributes::new();
        let clone = attrs.clone();
        clone.set("shared", "value".to_string());
        assert_eq!(*attrs.get::<String>("shared").unwrap(), "value");
    }

    #[test]
    fn request_has_no_back_reference_needed_to_construct() {
        let head = sample_head();
        let request = Request::new(head, ());
        assert!(!request.attributes.contains("anything"));
    }
}
