// src/token.rs

use crate::error::ValidationFailure;
use base64::engine::{general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Compact tokens above this size are rejected before any decoding.
pub const MAX_TOKEN_SIZE_BYTES: usize = 8192;

/// The JOSE header of a token, read before the signature is checked.
///
/// `alg` is kept as the raw string so that values `jsonwebtoken` has no
/// variant for (such as `none`) can still be reported and rejected.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenHeader {
    pub alg: String,
    #[serde(default)]
    pub kid: Option<String>,
}

/// A structurally valid but not yet verified compact JWT.
#[derive(Debug, Clone)]
pub struct UnverifiedToken {
    raw: String,
    header: TokenHeader,
    claims: Map<String, Value>,
}

impl UnverifiedToken {
    /// Splits and decodes a compact JWT.
    ///
    /// Fails with a `MalformedTokenError` when the token is oversized, does not
    /// have exactly three segments, or when the header or payload is not
    /// base64url-encoded JSON objects.
    pub fn parse(token: &str) -> Result<Self, ValidationFailure> {
        if token.len() > MAX_TOKEN_SIZE_BYTES {
            return Err(ValidationFailure::malformed(format!(
                "Token exceeds the maximum size of {MAX_TOKEN_SIZE_BYTES} bytes"
            )));
        }

        let mut segments = token.split('.');
        let (header_segment, payload_segment, signature_segment) =
            match (segments.next(), segments.next(), segments.next(), segments.next()) {
                (Some(h), Some(p), Some(s), None) => (h, p, s),
                _ => return Err(ValidationFailure::malformed("Token must have exactly three segments")),
            };

        if header_segment.is_empty() || payload_segment.is_empty() {
            return Err(ValidationFailure::malformed("Token header or payload is empty"));
        }
        URL_SAFE_NO_PAD
            .decode(signature_segment)
            .map_err(|_| ValidationFailure::malformed("Token signature is not base64url"))?;

        let header: TokenHeader = decode_segment(header_segment, "header")?;
        let claims: Map<String, Value> = decode_segment(payload_segment, "payload")?;

        Ok(Self {
            raw: token.to_string(),
            header,
            claims,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn header(&self) -> &TokenHeader {
        &self.header
    }

    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// The unverified `iss` claim, used only to pick which issuer's keys to fetch.
    pub fn unverified_issuer(&self) -> Option<&str> {
        self.claims.get("iss").and_then(Value::as_str)
    }

    pub(crate) fn into_parts(self) -> (String, Map<String, Value>) {
        (self.raw, self.claims)
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str, name: &str) -> Result<T, ValidationFailure> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| ValidationFailure::malformed(format!("Token {name} is not base64url")))?;
    serde_json::from_slice(&bytes)
        .map_err(|_| ValidationFailure::malformed(format!("Token {name} is not a JSON object")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureCategory;

    fn segment(json: &str) -> String {
        URL_SAFE_NO_PAD.encode(json.as_bytes())
    }

    fn assert_malformed(token: &str) {
        let failure = UnverifiedToken::parse(token).unwrap_err();
        assert_eq!(failure.category, FailureCategory::MalformedToken, "{token}");
    }

    #[test]
    fn parses_header_and_claims() {
        let token = format!(
            "{}.{}.c2ln",
            segment(r#"{"alg":"RS256","kid":"k1","typ":"JWT"}"#),
            segment(r#"{"iss":"https://idp.example.com","sub":"alice"}"#)
        );
        let parsed = UnverifiedToken::parse(&token).unwrap();
        assert_eq!(parsed.header().alg, "RS256");
        assert_eq!(parsed.header().kid.as_deref(), Some("k1"));
        assert_eq!(parsed.unverified_issuer(), Some("https://idp.example.com"));
        assert_eq!(parsed.raw(), token);
    }

    #[test]
    fn keeps_unknown_algorithms_verbatim() {
        let token = format!("{}.{}.", segment(r#"{"alg":"none"}"#), segment(r#"{"sub":"x"}"#));
        let parsed = UnverifiedToken::parse(&token).unwrap();
        assert_eq!(parsed.header().alg, "none");
        assert!(parsed.header().kid.is_none());
    }

    #[test]
    fn rejects_wrong_segment_counts() {
        assert_malformed("");
        assert_malformed("single");
        assert_malformed("only.two");
        assert_malformed("a.b.c.d");
    }

    #[test]
    fn rejects_bad_encodings() {
        assert_malformed("!!!.payload.sig");
        let header = segment(r#"{"alg":"RS256"}"#);
        assert_malformed(&format!("{header}.{}.sig", segment("not json")));
        assert_malformed(&format!("{header}.{}.sig", segment("[1,2,3]")));
        assert_malformed(&format!("{header}.{}.$$$", segment("{}")));
        assert_malformed(&format!("{}.{}.sig", segment(r#"{"kid":"k1"}"#), segment("{}")));
    }

    #[test]
    fn rejects_oversized_tokens() {
        let padding = "a".repeat(MAX_TOKEN_SIZE_BYTES);
        assert_malformed(&format!("{padding}.b.c"));
    }
}
