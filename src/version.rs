//! HTTP version parsing and the minimum-version floor check used by the
//! exchange driver (`HttpVersionTooOld`/`HttpVersionTooNew`).

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    pub fn as_str(self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }

    /// Parses the `HTTP-version` token from a request line.
    pub fn parse(token: &str) -> Result<Version, Error> {
        match token {
            "HTTP/1.0" => Ok(Version::Http10),
            "HTTP/1.1" => Ok(Version::Http11),
            _ => {
                if let Some(rest) = token.strip_prefix("HTTP/") {
                    if let Some((major, _minor)) = rest.split_once('.') {
                        if major.parse::<u32>().map(|m| m >= 2).unwrap_or(false) {
                            return Err(Error::HttpVersionTooNew);
                        }
                    }
                }
                Err(Error::HttpVersionParse(token.to_string()))
            }
        }
    }

    /// Fails with `HttpVersionTooOld` if `self` is older than `floor`.
    pub fn require_at_least(self, floor: Version) -> Result<(), Error> {
        if self < floor {
            Err(Error::HttpVersionTooOld(floor.as_str()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_known_versions() {
        assert_eq!(Version::parse("HTTP/1.0").unwrap(), Version::Http10);
        assert_eq!(Version::parse("HTTP/1.1").unwrap(), Version::Http11);
    }

    #[test]
    fn http_2_and_above_is_too_new() {
        assert!(matches!(Version::parse("HTTP/2.0"), Err(Error::HttpVersionTooNew)));
        assert!(matches!(Version::parse("HTTP/3.0"), Err(Error::HttpVersionTooNew)));
    }

    #[test]
    fn garbage_is_unparseable() {
        assert!(matches!(Version::parse("bogus"), Err(Error::HttpVersionParse(_))));
    }

    #[test]
    fn floor_rejects_older_version() {
        let err = Version::Http10.require_at_least(Version::Http11).unwrap_err();
        assert!(matches!(err, Error::HttpVersionTooOld("HTTP/1.1")));
    }

    #[test]
    fn floor_accepts_equal_or_newer() {
        assert!(Version::Http11.require_at_least(Version::Http11).is_ok());
    }
}
