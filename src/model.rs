// src/model.rs

use serde::Deserialize;

/// Represents the data structure of an OIDC provider's discovery document.
/// Found at the `.well-known/openid-configuration` endpoint.
///
/// Only `jwks_uri` is required; everything else an issuer advertises is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct OidcDiscoveryDocument {
    /// Compared against the issuer the document was fetched for, when present.
    #[serde(default)]
    pub issuer: Option<String>,
    pub jwks_uri: String,
}

/// Represents a single JSON Web Key (JWK) as defined in RFC 7517.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonWebKey {
    #[serde(default)]
    pub kid: Option<String>,
    pub kty: String,
    #[serde(rename = "use", default)]
    pub use_purpose: Option<String>,
    #[serde(default)]
    pub alg: Option<String>,
    // RSA
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
    // EC
    #[serde(default)]
    pub crv: Option<String>,
    #[serde(default)]
    pub x: Option<String>,
    #[serde(default)]
    pub y: Option<String>,
}

/// Represents a JSON Web Key Set (JWKS), which is a collection of JWKs.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<JsonWebKey>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_document_needs_only_jwks_uri() {
        let doc: OidcDiscoveryDocument =
            serde_json::from_str(r#"{"jwks_uri":"https://idp.example.com/jwks","token_endpoint":"x"}"#).unwrap();
        assert_eq!(doc.jwks_uri, "https://idp.example.com/jwks");
        assert!(doc.issuer.is_none());

        assert!(serde_json::from_str::<OidcDiscoveryDocument>(r#"{"issuer":"https://idp.example.com"}"#).is_err());
    }

    #[test]
    fn key_set_accepts_mixed_key_types() {
        let json = r#"{"keys":[
            {"kty":"RSA","kid":"r1","use":"sig","alg":"RS256","n":"AQAB","e":"AQAB"},
            {"kty":"EC","kid":"e1","crv":"P-256","x":"AA","y":"AA"},
            {"kty":"oct","k":"c2VjcmV0"}
        ]}"#;
        let set: JsonWebKeySet = serde_json::from_str(json).unwrap();
        assert_eq!(set.keys.len(), 3);
        assert_eq!(set.keys[0].use_purpose.as_deref(), Some("sig"));
        assert_eq!(set.keys[1].crv.as_deref(), Some("P-256"));
        assert!(set.keys[2].kid.is_none());
    }
}
