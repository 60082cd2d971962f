//! `MediaType`/`MediaRange` (C7): the `type/subtype;param=value` grammar
//! used by `Content-Type` and `Accept`, plus the compatibility and
//! specificity rules a dispatcher needs to pick a handler.
//!
//! The wire grammar does not distinguish a concrete type from a range:
//! whichever tokens carry a `*` or a `q` parameter make a `MediaType`
//! behave like a range for matching purposes. This mirrors the source
//! grammar rather than splitting into two wire formats.

use std::fmt;

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Star,
    Named(String),
}

/// A media type or media range: `type "/" subtype *(";" parameter)`.
///
/// Type, subtype and parameter names are lower-cased on parse; parameter
/// values are not, except `charset` on a `text/*` type, which is
/// lower-cased like the rest of the essence. A trailing `q` parameter is
/// split out into `q` rather than kept among `params`; parameters after
/// `q` are preserved as extension parameters but play no role in matching.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaType {
    type_: Part,
    subtype: Part,
    params: Vec<(String, String)>,
    q: Option<f64>,
}

/// Result of matching one `MediaType` against another via [`MediaType::compatibility`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Compatibility {
    Nope,
    Works,
    Perfect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Score {
    Nope,
    Works,
    Perfect,
}

fn score_part(a: &Part, b: &Part) -> Score {
    match (a, b) {
        (Part::Star, _) | (_, Part::Star) => Score::Works,
        (Part::Named(x), Part::Named(y)) if x == y => Score::Perfect,
        _ => Score::Nope,
    }
}

impl MediaType {
    pub fn new(type_: impl Into<String>, subtype: impl Into<String>, params: Vec<(String, String)>) -> Self {
        MediaType {
            type_: Part::Named(type_.into()),
            subtype: Part::Named(subtype.into()),
            params,
            q: None,
        }
    }

    pub fn type_(&self) -> &str {
        match &self.type_ {
            Part::Star => "*",
            Part::Named(s) => s,
        }
    }

    pub fn subtype(&self) -> &str {
        match &self.subtype {
            Part::Star => "*",
            Part::Named(s) => s,
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn q(&self) -> f64 {
        self.q.unwrap_or(1.0)
    }

    /// A `*` in either position, or an explicit `q` parameter, makes this
    /// behave as a media range rather than a concrete type.
    pub fn is_range(&self) -> bool {
        self.type_ == Part::Star || self.subtype == Part::Star || self.q.is_some()
    }

    /// Parses `type/subtype` optionally followed by `;name=value` pairs.
    /// Values may be quoted; quotes are stripped (escapes not interpreted).
    pub fn parse(input: &str) -> Result<MediaType, Error> {
        let mut halves = input.splitn(2, ';');
        let essence = halves.next().unwrap_or("").trim();
        let (type_, subtype) = split_essence(essence, input)?;

        let type_str = match &type_ {
            Part::Star => "*",
            Part::Named(s) => s.as_str(),
        };

        let mut params = Vec::new();
        let mut q = None;
        if let Some(rest) = halves.next() {
            for (name, value) in parse_params(rest, input, type_str)? {
                if name.eq_ignore_ascii_case("q") && q.is_none() && params.is_empty() {
                    q = Some(parse_q(&value, input)?);
                } else {
                    params.push((name, value));
                }
            }
        }

        if type_ == Part::Star && subtype != Part::Star {
            return Err(Error::MediaTypeParse(
                input.to_string(),
                "a wildcard type cannot pair with a concrete subtype".to_string(),
            ));
        }

        Ok(MediaType { type_, subtype, params, q })
    }

    /// Compares this value (typically a handler's declared acceptance) to
    /// `other` (typically the request's actual `Content-Type`).
    pub fn compatibility(&self, other: &MediaType) -> Compatibility {
        let t = score_part(&self.type_, &other.type_);
        if t == Score::Nope {
            return Compatibility::Nope;
        }
        let s = score_part(&self.subtype, &other.subtype);
        if s == Score::Nope {
            return Compatibility::Nope;
        }
        if let Some(q) = other.q {
            if q <= 0.0 {
                return Compatibility::Nope;
            }
        }
        let exact = t == Score::Perfect && s == Score::Perfect;
        if self.params.is_empty() {
            return if self.q() >= 1.0 && other.params.is_empty() && exact {
                Compatibility::Perfect
            } else {
                Compatibility::Works
            };
        }
        if self.params == other.params {
            return if self.q() >= 1.0 { Compatibility::Perfect } else { Compatibility::Works };
        }
        Compatibility::Nope
    }

    /// Rank used to order candidates from most to least specific; lower
    /// is more specific. See [`MediaMatcher::specificity_rank`] for the
    /// full order including the sentinel values.
    fn specificity_rank(&self) -> u8 {
        match (&self.type_, &self.subtype, self.params.is_empty()) {
            (Part::Named(_), Part::Named(_), false) => 0,
            (Part::Named(_), Part::Named(_), true) => 1,
            (Part::Named(_), Part::Star, false) => 2,
            (Part::Named(_), Part::Star, true) => 3,
            (Part::Star, Part::Star, false) => 4,
            (Part::Star, Part::Star, true) => 5,
            (Part::Star, Part::Named(_), _) => unreachable!("rejected by parse"),
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.type_(), self.subtype())?;
        for (name, value) in &self.params {
            write!(f, "; {}={}", name, value)?;
        }
        if let Some(q) = self.q {
            write!(f, "; q={}", format_q(q))?;
        }
        Ok(())
    }
}

impl Eq for MediaType {}

/// A handler's declared acceptance, including the two identity-compared
/// sentinels from the glossary: `NOTHING` (no `Content-Type` required)
/// and `NOTHING_AND_ALL` (indifferent to `Content-Type`).
#[derive(Debug, Clone)]
pub enum MediaMatcher {
    Concrete(MediaType),
    Nothing,
    NothingAndAll,
}

impl MediaMatcher {
    /// Ascending = more specific: `has-params < no-params <
    /// subtype-wildcard+params < subtype-wildcard+no-params <
    /// full-wildcard+params < full-wildcard+no-params < NOTHING <
    /// NOTHING_AND_ALL`.
    pub fn specificity_rank(&self) -> u8 {
        match self {
            MediaMatcher::Concrete(mt) => mt.specificity_rank(),
            MediaMatcher::Nothing => 6,
            MediaMatcher::NothingAndAll => 7,
            // `Nothing`/`NothingAndAll` kept at 6/7 above; Concrete tiers
            // now span 0..=5, matching the doc comment's six-tier order.
        }
    }
}

impl PartialEq for MediaMatcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MediaMatcher::Concrete(a), MediaMatcher::Concrete(b)) => a == b,
            (MediaMatcher::Nothing, MediaMatcher::Nothing) => true,
            (MediaMatcher::NothingAndAll, MediaMatcher::NothingAndAll) => true,
            _ => false,
        }
    }
}

fn split_essence(essence: &str, original: &str) -> Result<(Part, Part), Error> {
    let mut halves = essence.splitn(2, '/');
    let type_ = halves.next().unwrap_or("").trim();
    let subtype = halves
        .next()
        .ok_or_else(|| Error::MediaTypeParse(original.to_string(), "missing '/' between type and subtype".to_string()))?
        .trim();
    if type_.is_empty() || subtype.is_empty() {
        return Err(Error::MediaTypeParse(
            original.to_string(),
            "type and subtype must not be empty".to_string(),
        ));
    }
    let to_part = |s: &str| {
        if s == "*" {
            Part::Star
        } else {
            Part::Named(s.to_ascii_lowercase())
        }
    };
    Ok((to_part(type_), to_part(subtype)))
}

fn parse_params(rest: &str, original: &str, type_: &str) -> Result<Vec<(String, String)>, Error> {
    let mut params = Vec::new();
    for segment in rest.split(';') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let mut kv = segment.splitn(2, '=');
        let name = kv.next().unwrap_or("").trim();
        let value = kv
            .next()
            .ok_or_else(|| Error::MediaTypeParse(original.to_string(), format!("parameter {:?} has no value", name)))?;
        let mut value = unquote(value.trim());
        if name.is_empty() {
            return Err(Error::MediaTypeParse(original.to_string(), "empty parameter name".to_string()));
        }
        let name = name.to_ascii_lowercase();
        // §3: `charset` on a `text/*` type is lower-cased like the rest of
        // the essence; every other parameter value preserves case.
        if name == "charset" && type_.eq_ignore_ascii_case("text") {
            value = value.to_ascii_lowercase();
        }
        params.push((name, value));
    }
    Ok(params)
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}

fn parse_q(value: &str, original: &str) -> Result<f64, Error> {
    let f: f64 = value
        .parse()
        .map_err(|_| Error::MediaTypeParse(original.to_string(), format!("invalid q value: {:?}", value)))?;
    if !(0.0..=1.0).contains(&f) {
        return Err(Error::MediaTypeParse(original.to_string(), format!("q out of range: {:?}", value)));
    }
    Ok(f)
}

fn format_q(q: f64) -> String {
    let s = format!("{:.3}", q);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_bare_essence() {
        let mt = MediaType::parse("text/html").unwrap();
        assert_eq!(mt.type_(), "text");
        assert_eq!(mt.subtype(), "html");
        assert!(!mt.is_range());
    }

    #[test]
    fn scenario_6_case_and_quoting_insensitive_equality() {
        let a = MediaType::parse("text/html; charset=UTF-8").unwrap();
        let b = MediaType::parse("Text/HTML;Charset=\"utf-8\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.type_(), "text");
        assert_eq!(a.subtype(), "html");
        assert_eq!(a.param("charset"), Some("utf-8"));
    }

    #[test]
    fn charset_is_lower_cased_only_for_text_types() {
        let text = MediaType::parse("text/html; charset=UTF-8").unwrap();
        assert_eq!(text.param("charset"), Some("utf-8"));

        let other = MediaType::parse("application/json; charset=UTF-8").unwrap();
        assert_eq!(other.param("charset"), Some("UTF-8"));
    }

    #[test]
    fn rejects_missing_slash() {
        assert!(MediaType::parse("text").is_err());
    }

    #[test]
    fn wildcard_type_with_concrete_subtype_is_rejected() {
        assert!(MediaType::parse("*/html").is_err());
    }

    #[test]
    fn q_parameter_marks_it_a_range() {
        let mt = MediaType::parse("text/html; q=0.5").unwrap();
        assert!(mt.is_range());
        assert_eq!(mt.q(), 0.5);
    }

    #[test]
    fn full_wildcard_is_works_against_any_concrete_type() {
        let range = MediaType::parse("*/*").unwrap();
        let concrete = MediaType::parse("application/json").unwrap();
        assert_eq!(range.compatibility(&concrete), Compatibility::Works);
    }

    #[test]
    fn exact_match_with_no_params_either_side_is_perfect() {
        let a = MediaType::parse("text/html").unwrap();
        let b = MediaType::parse("text/html").unwrap();
        assert_eq!(a.compatibility(&b), Compatibility::Perfect);
    }

    #[test]
    fn mismatched_type_is_nope() {
        let a = MediaType::parse("text/html").unwrap();
        let b = MediaType::parse("application/json").unwrap();
        assert_eq!(a.compatibility(&b), Compatibility::Nope);
    }

    #[test]
    fn zero_q_on_other_is_nope() {
        let a = MediaType::parse("text/html").unwrap();
        let b = MediaType::parse("text/html; q=0").unwrap();
        assert_eq!(a.compatibility(&b), Compatibility::Nope);
    }

    #[test]
    fn matching_params_with_q_below_one_is_works_not_perfect() {
        let a = MediaType::parse("text/html; charset=utf-8; q=0.5").unwrap();
        let b = MediaType::parse("text/html; charset=utf-8").unwrap();
        assert_eq!(a.compatibility(&b), Compatibility::Works);
    }

    #[test]
    fn mismatched_params_is_nope() {
        let a = MediaType::parse("text/html; charset=utf-8").unwrap();
        let b = MediaType::parse("text/html; charset=ascii").unwrap();
        assert_eq!(a.compatibility(&b), Compatibility::Nope);
    }

    #[test]
    fn specificity_orders_params_before_bare_before_wildcards_before_sentinels() {
        let with_params = MediaMatcher::Concrete(MediaType::parse("text/html; charset=utf-8").unwrap());
        let bare = MediaMatcher::Concrete(MediaType::parse("text/html").unwrap());
        let sub_wild = MediaMatcher::Concrete(MediaType::parse("text/*").unwrap());
        let full_wild = MediaMatcher::Concrete(MediaType::parse("*/*").unwrap());
        let nothing = MediaMatcher::Nothing;
        let nothing_and_all = MediaMatcher::NothingAndAll;

        let mut ranks: Vec<u8> = vec![
            with_params.specificity_rank(),
            bare.specificity_rank(),
            sub_wild.specificity_rank(),
            full_wild.specificity_rank(),
            nothing.specificity_rank(),
            nothing_and_all.specificity_rank(),
        ];
        let sorted = {
            let mut s = ranks.clone();
            s.sort_unstable();
            s
        };
        assert_eq!(ranks, sorted, "already in ascending/most-specific-first order");
        ranks.dedup();
        assert_eq!(ranks.len(), 6, "each tier must have a distinct rank");
    }

    #[test]
    fn sentinels_compare_by_identity_only() {
        assert_eq!(MediaMatcher::Nothing, MediaMatcher::Nothing);
        assert_ne!(MediaMatcher::Nothing, MediaMatcher::NothingAndAll);
    }
}
