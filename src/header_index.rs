//! `HeaderIndex` (C8): a case-insensitive, ordered multi-map of header
//! fields with cached typed accessors for the handful of headers the
//! exchange engine itself needs to reason about (`Content-Length`,
//! `Transfer-Encoding`, `Content-Type`).
//!
//! Lookup is case-insensitive; original casing is retained for write-out.
//! Insertion order of distinct names is preserved, and duplicate names
//! are legal: their values are ordered by arrival.

use std::cell::RefCell;
use std::fmt;

use crate::error::Error;
use crate::header_parse::HeaderField;
use crate::media_type::MediaType;

/// An immutable, ordered multi-map of header fields.
///
/// Built once by the header parser and then published read-only to the
/// rest of the exchange; mutation after publication is forbidden by the
/// API (there is no `insert`/`remove` on this type once constructed).
#[derive(Debug, Clone)]
pub struct HeaderIndex {
    fields: Vec<HeaderField>,
    cache: RefCell<Cache>,
}

#[derive(Debug, Clone, Default)]
struct Cache {
    content_type: Option<Option<MediaType>>,
    content_length: Option<Option<u64>>,
}

impl HeaderIndex {
    pub fn new(fields: Vec<HeaderField>) -> Self {
        HeaderIndex { fields, cache: RefCell::new(Cache::default()) }
    }

    pub fn empty() -> Self {
        HeaderIndex::new(Vec::new())
    }

    pub fn fields(&self) -> &[HeaderField] {
        &self.fields
    }

    pub fn for_each<F: FnMut(&HeaderField)>(&self, mut action: F) {
        for field in &self.fields {
            action(field);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Case-insensitive substring scan of every value stored under `name`.
    pub fn contains_value(&self, name: &str, value_substring: &str) -> bool {
        let needle = value_substring.to_ascii_lowercase();
        self.fields
            .iter()
            .filter(|f| f.name.eq_ignore_ascii_case(name))
            .any(|f| f.value.to_ascii_lowercase().contains(&needle))
    }

    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value.as_str())
    }

    pub fn first_value_as_u64(&self, name: &str) -> Result<Option<u64>, Error> {
        match self.first_value(name) {
            None => Ok(None),
            Some(v) => v
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|_| Error::BadHeader(name.to_string(), format!("not a valid number: {:?}", v))),
        }
    }

    pub fn is_missing_or_empty(&self, name: &str) -> bool {
        match self.first_value(name) {
            None => true,
            Some(v) => v.is_empty(),
        }
    }

    /// All values under `name`, in arrival order.
    pub fn all_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value.as_str())
    }

    /// Every value under `name`, split on commas, trimmed, with empty
    /// tokens dropped.
    pub fn all_tokens(&self, name: &str) -> Vec<String> {
        self.all_values(name)
            .flat_map(|v| v.split(','))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Same as [`Self::all_tokens`] but does not split inside a
    /// double-quoted span.
    pub fn all_tokens_keep_quotes(&self, name: &str) -> Vec<String> {
        let mut result = Vec::new();
        for value in self.all_values(name) {
            result.extend(split_keep_quotes(value));
        }
        result
    }

    pub fn content_type(&self) -> Result<Option<MediaType>, Error> {
        if let Some(cached) = self.cache.borrow().content_type.clone() {
            return Ok(cached);
        }
        let mut values = self.all_values("Content-Type");
        let first = values.next();
        if values.next().is_some() {
            return Err(Error::BadHeader(
                "Content-Type".to_string(),
                "multiple Content-Type headers present".to_string(),
            ));
        }
        let parsed = match first {
            None => None,
            Some(v) => Some(MediaType::parse(v)?),
        };
        self.cache.borrow_mut().content_type = Some(parsed.clone());
        Ok(parsed)
    }

    pub fn content_length(&self) -> Result<Option<u64>, Error> {
        if let Some(cached) = self.cache.borrow().content_length {
            return Ok(cached);
        }
        let mut values = self.all_values("Content-Length");
        let first = values.next();
        if values.next().is_some() {
            return Err(Error::BadHeader(
                "Content-Length".to_string(),
                "multiple Content-Length headers present".to_string(),
            ));
        }
        let parsed = match first {
            None => None,
            Some(v) => {
                let n: i64 = v
                    .trim()
                    .parse()
                    .map_err(|_| Error::BadHeader("Content-Length".to_string(), format!("not numeric: {:?}", v)))?;
                if n < 0 {
                    return Err(Error::BadHeader(
                        "Content-Length".to_string(),
                        format!("negative length: {}", n),
                    ));
                }
                Some(n as u64)
            }
        };
        self.cache.borrow_mut().content_length = Some(parsed);
        Ok(parsed)
    }

    /// Ordered, comma-split tokens of every `Transfer-Encoding` header.
    /// Fails if the last token isn't `chunked`.
    pub fn transfer_encoding(&self) -> Result<Vec<String>, Error> {
        let tokens = self.all_tokens("Transfer-Encoding");
        if tokens.is_empty() {
            return Ok(tokens);
        }
        let last = tokens.last().unwrap();
        if !last.eq_ignore_ascii_case("chunked") {
            return Err(Error::BadHeader(
                "Transfer-Encoding".to_string(),
                format!("last coding must be chunked, got {:?}", last),
            ));
        }
        Ok(tokens)
    }

    pub fn is_chunked(&self) -> bool {
        self.contains_value("Transfer-Encoding", "chunked")
    }
}

fn split_keep_quotes(value: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in value.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => {
                let trimmed = current.trim().to_string();
                if !trimmed.is_empty() {
                    out.push(trimmed);
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    let trimmed = current.trim().to_string();
    if !trimmed.is_empty() {
        out.push(trimmed);
    }
    out
}

impl fmt::Display for HeaderIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for field in &self.fields {
            writeln!(f, "{}: {}", field.name, field.value)?;
        }
        Ok(())
    }
}
