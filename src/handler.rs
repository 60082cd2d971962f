//! External collaborator interfaces the exchange driver consumes: route
//! lookup, pre/post-handler hooks, and handler dispatch scoring (§6, §4.11).
//!
//! Grounded in the reference engine's own `Dispatcher`/`Codec` split
//! (`server/codec.rs`): there, `headers_received` hands the driver a
//! per-request `Codec` chosen from the parsed head. Here the same shape is
//! synchronous and returns a concrete [`ResponseModel`] rather than driving
//! further async callbacks, since this crate has no reactor to hand control
//! back to.
//!
//! The logger collaborator named in §6 is not a trait in this crate: per
//! the ambient-stack decision in `SPEC_FULL.md` §10.1, the exchange driver
//! logs directly through the `log` facade, the same way the reference
//! engine does, rather than through an indirection layer.

use std::sync::Arc;

use crate::error::Error;
use crate::media_type::{Compatibility, MediaMatcher};
use crate::request::Request;
use crate::response::ResponseModel;

/// A single route's handler: the unit the route registry hands back from
/// `lookup`, and the unit the driver ultimately invokes.
pub trait Handler<B>: Send + Sync {
    /// Media types this handler can read as a request body. Defaults to
    /// indifferent, matching the common case of a handler with no
    /// particular opinion on `Content-Type`.
    fn consumes(&self) -> MediaMatcher {
        MediaMatcher::NothingAndAll
    }

    /// Media types this handler can produce, for `Accept` negotiation.
    fn produces(&self) -> MediaMatcher {
        MediaMatcher::NothingAndAll
    }

    fn handle(&self, request: Request<B>) -> Result<ResponseModel<B>, Error>;
}

/// Looks up the candidate handlers for a method + path, before
/// content/accept negotiation narrows them to one (§4.11).
pub trait RouteRegistry<B> {
    fn lookup(&self, method: &str, path: &str) -> Vec<Arc<dyn Handler<B>>>;
}

/// Pre- and post-handler hooks registered by path pattern (§6).
pub trait ActionChain<B> {
    fn before(&self, path: &str, request: &mut Request<B>) -> Result<(), Error>;
    fn after(&self, path: &str, response: &mut ResponseModel<B>) -> Result<(), Error>;
}

/// A candidate's dispatch score: consumes-compatibility, produces-
/// compatibility, then the two specificity ranks, all as the driver
/// compares them (lower specificity rank = more specific = preferred).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Score {
    consumes: Compatibility,
    produces: Compatibility,
    produced_specificity: u8,
    consumed_specificity: u8,
}

impl Score {
    /// Higher is better. `Compatibility`'s derived `Ord` already ranks
    /// `Perfect > Works > Nope`; `produced_specificity`/`consumed_specificity`
    /// are already inverted at construction (higher = more specific), so
    /// they compare directly here.
    fn rank_key(&self) -> (Compatibility, Compatibility, i16, i16) {
        (
            self.consumes,
            self.produces,
            self.produced_specificity as i16,
            self.consumed_specificity as i16,
        )
    }
}

/// Picks the best-scoring handler for a request's declared `Content-Type`
/// and `Accept`, per §4.11's ordering. Ties go to the first-registered
/// candidate (stable sort preserves `candidates`' incoming order).
///
/// Returns `None` if every candidate is `Nope`-incompatible on either axis.
pub fn select_handler<'a, B>(
    candidates: &'a [Arc<dyn Handler<B>>],
    request_content_type: Option<&crate::media_type::MediaType>,
    request_accept: &[crate::media_type::MediaType],
) -> Option<&'a Arc<dyn Handler<B>>> {
    let mut best: Option<(Score, &Arc<dyn Handler<B>>)> = None;

    for candidate in candidates {
        let consumes = candidate.consumes();
        let produces = candidate.produces();

        let consumes_score = score_consumes(&consumes, request_content_type);
        let produces_score = score_produces(&produces, request_accept);

        if consumes_score == Compatibility::Nope || produces_score == Compatibility::Nope {
            continue;
        }

        let score = Score {
            consumes: consumes_score,
            produces: produces_score,
            produced_specificity: 7u8.saturating_sub(produces.specificity_rank()),
            consumed_specificity: 7u8.saturating_sub(consumes.specificity_rank()),
        };

        match &best {
            None => best = Some((score, candidate)),
            Some((best_score, _)) if score.rank_key() > best_score.rank_key() => {
                best = Some((score, candidate));
            }
            _ => {}
        }
    }

    best.map(|(_, handler)| handler)
}

fn score_consumes(matcher: &MediaMatcher, content_type: Option<&crate::media_type::MediaType>) -> Compatibility {
    match (matcher, content_type) {
        (MediaMatcher::NothingAndAll, _) => Compatibility::Perfect,
        (MediaMatcher::Nothing, None) => Compatibility::Perfect,
        (MediaMatcher::Nothing, Some(_)) => Compatibility::Nope,
        (MediaMatcher::Concrete(_), None) => Compatibility::Nope,
        (MediaMatcher::Concrete(accepted), Some(actual)) => accepted.compatibility(actual),
    }
}

fn score_produces(matcher: &MediaMatcher, accept: &[crate::media_type::MediaType]) -> Compatibility {
    if accept.is_empty() {
        return Compatibility::Works;
    }
    match matcher {
        MediaMatcher::NothingAndAll => Compatibility::Perfect,
        MediaMatcher::Nothing => Compatibility::Nope,
        MediaMatcher::Concrete(produced) => accept
            .iter()
            .map(|wanted| wanted.compatibility(produced))
            .max()
            .unwrap_or(Compatibility::Nope),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::byteview::MemoryBody;
    use crate::media_type::MediaType;
    use crate::request::{Attributes, RequestHead};

    struct StubHandler {
        consumes: MediaMatcher,
        produces: MediaMatcher,
        name: &'static str,
    }

    impl Handler<MemoryBody> for StubHandler {
        fn consumes(&self) -> MediaMatcher {
            self.consumes.clone()
        }

        fn produces(&self) -> MediaMatcher {
            self.produces.clone()
        }

        fn handle(&self, _request: Request<MemoryBody>) -> Result<ResponseModel<MemoryBody>, Error> {
            let mut b = crate::response::Builder::new();
            b.status(200).header("X-Handler", self.name);
            b.build()
        }
    }

    #[test]
    fn most_specific_consumer_wins_over_wildcard() {
        let wildcard: Arc<dyn Handler<MemoryBody>> = Arc::new(StubHandler {
            consumes: MediaMatcher::Concrete(MediaType::parse("*/*").unwrap()),
            produces: MediaMatcher::NothingAndAll,
            name: "wildcard",
        });
        let specific: Arc<dyn Handler<MemoryBody>> = Arc::new(StubHandler {
            consumes: MediaMatcher::Concrete(MediaType::parse("application/json").unwrap()),
            produces: MediaMatcher::NothingAndAll,
            name: "specific",
        });
        let candidates = vec![wildcard, specific];
        let content_type = MediaType::parse("application/json").unwrap();
        let chosen = select_handler(&candidates, Some(&content_type), &[]).unwrap();
        let resp = chosen
            .handle(Request::new(
                RequestHead::new(dummy_line(), crate::header_index::HeaderIndex::empty()),
                MemoryBody::empty(),
            ))
            .unwrap();
        assert_eq!(resp.headers()[0].value, "specific");
    }

    #[test]
    fn incompatible_content_type_excludes_candidate() {
        let only_json: Arc<dyn Handler<MemoryBody>> = Arc::new(StubHandler {
            consumes: MediaMatcher::Concrete(MediaType::parse("application/json").unwrap()),
            produces: MediaMatcher::NothingAndAll,
            name: "json",
        });
        let candidates = vec![only_json];
        let content_type = MediaType::parse("text/plain").unwrap();
        assert!(select_handler(&candidates, Some(&content_type), &[]).is_none());
    }

    #[test]
    fn first_registered_wins_a_tie() {
        let a: Arc<dyn Handler<MemoryBody>> =
            Arc::new(StubHandler { consumes: MediaMatcher::NothingAndAll, produces: MediaMatcher::NothingAndAll, name: "a" });
        let b: Arc<dyn Handler<MemoryBody>> =
            Arc::new(StubHandler { consumes: MediaMatcher::NothingAndAll, produces: MediaMatcher::NothingAndAll, name: "b" });
        let candidates = vec![a, b];
        let chosen = select_handler(&candidates, None, &[]).unwrap();
        let resp = chosen
            .handle(Request::new(
                RequestHead::new(dummy_line(), crate::header_index::HeaderIndex::empty()),
                MemoryBody::empty(),
            ))
            .unwrap();
        assert_eq!(resp.headers()[0].value, "a");
    }

    #[test]
    fn most_specific_producer_wins_a_compatibility_tie() {
        // No `Accept` header means `score_produces` returns `Works` for
        // every matcher (handler.rs's own rule), so these two tie on both
        // compatibility axes and the choice falls entirely to specificity.
        let wildcard_subtype: Arc<dyn Handler<MemoryBody>> = Arc::new(StubHandler {
            consumes: MediaMatcher::NothingAndAll,
            produces: MediaMatcher::Concrete(MediaType::parse("text/*").unwrap()),
            name: "wildcard-subtype",
        });
        let concrete: Arc<dyn Handler<MemoryBody>> = Arc::new(StubHandler {
            consumes: MediaMatcher::NothingAndAll,
            produces: MediaMatcher::Concrete(MediaType::parse("text/html").unwrap()),
            name: "concrete",
        });
        let candidates = vec![wildcard_subtype, concrete];
        let chosen = select_handler(&candidates, None, &[]).unwrap();
        let resp = chosen
            .handle(Request::new(
                RequestHead::new(dummy_line(), crate::header_index::HeaderIndex::empty()),
                MemoryBody::empty(),
            ))
            .unwrap();
        assert_eq!(resp.headers()[0].value, "concrete");
    }

    fn dummy_line() -> crate::request_line::RequestLine {
        crate::request_line::RequestLine {
            method: "GET".into(),
            target: "/".into(),
            http_version: "HTTP/1.1".into(),
            parse_started_at: std::time::Instant::now(),
            bytes_consumed: 16,
        }
    }

    #[test]
    fn attributes_are_independent_of_route_registry() {
        let attrs = Attributes::new();
        attrs.set("k", 1u8);
        assert!(attrs.contains("k"));
    }
}
