// src/issuer.rs

use crate::error::GateError;
use std::fmt;
use url::Url;

const DISCOVERY_PATH: &str = ".well-known/openid-configuration";

/// A trusted OIDC issuer identity.
///
/// The issuer URL is normalized on construction: scheme and host are lower-cased
/// (by `url`) and trailing slashes are dropped. Two issuers compare equal when
/// their normalized forms do, so `https://IdP.example.com/` and
/// `https://idp.example.com` name the same issuer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Issuer(String);

impl Issuer {
    /// Parses and normalizes an issuer URL.
    pub fn parse(raw: &str) -> Result<Self, GateError> {
        let trimmed = raw.trim();
        let url = Url::parse(trimmed).map_err(|e| GateError::InvalidUrl(format!("{trimmed}: {e}")))?;
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(GateError::InvalidUrl(format!("{trimmed}: issuer must be an absolute http(s) URL")));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(GateError::InvalidUrl(format!("{trimmed}: issuer must not carry a query or fragment")));
        }
        Ok(Self(url.as_str().trim_end_matches('/').to_string()))
    }

    /// The normalized issuer URL, without a trailing slash.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The issuer's discovery document URL, with exactly one slash before `.well-known`.
    pub fn discovery_url(&self) -> Result<Url, GateError> {
        Url::parse(&format!("{}/{}", self.0, DISCOVERY_PATH)).map_err(|e| GateError::InvalidUrl(e.to_string()))
    }
}

impl fmt::Display for Issuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parses a comma-separated issuer list, skipping empty entries.
pub fn parse_issuer_list(input: &str) -> Result<Vec<Issuer>, GateError> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Issuer::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_trailing_slash() {
        let a = Issuer::parse("https://IdP.Example.com/").unwrap();
        let b = Issuer::parse("https://idp.example.com").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "https://idp.example.com");
    }

    #[test]
    fn keeps_path_segments() {
        let issuer = Issuer::parse("https://login.example.com/realms/bank/").unwrap();
        assert_eq!(issuer.as_str(), "https://login.example.com/realms/bank");
    }

    #[test]
    fn discovery_url_has_single_slash() {
        for raw in ["https://idp.example.com", "https://idp.example.com/", "https://idp.example.com//"] {
            let issuer = Issuer::parse(raw).unwrap();
            assert_eq!(
                issuer.discovery_url().unwrap().as_str(),
                "https://idp.example.com/.well-known/openid-configuration"
            );
        }
        let nested = Issuer::parse("http://localhost:8080/oidc").unwrap();
        assert_eq!(
            nested.discovery_url().unwrap().as_str(),
            "http://localhost:8080/oidc/.well-known/openid-configuration"
        );
    }

    #[test]
    fn rejects_non_urls() {
        assert!(Issuer::parse("not a url").is_err());
        assert!(Issuer::parse("mailto:someone@example.com").is_err());
        assert!(Issuer::parse("https://idp.example.com/?tenant=1").is_err());
    }

    #[test]
    fn parses_comma_separated_list() {
        let issuers = parse_issuer_list(" https://a.example.com, ,https://b.example.com/ ").unwrap();
        assert_eq!(issuers.len(), 2);
        assert_eq!(issuers[1].as_str(), "https://b.example.com");
    }
}
