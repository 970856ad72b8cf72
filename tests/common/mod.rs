#![allow(dead_code)]

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use nila_oidc_gate::prelude::*;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{pkcs8::DecodePrivateKey, RsaPrivateKey};
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const AUDIENCE: &str = "svc";

const SIGNING_KEY_PEM: &str = include_str!("../fixtures/signing_key.pem");
const ROGUE_KEY_PEM: &str = include_str!("../fixtures/rogue_key.pem");
const EC_SIGNING_KEY_PEM: &str = include_str!("../fixtures/ec_signing_key.pem");
// Public point of ec_signing_key.pem.
const EC_X: &str = "P3R4bupnqZptATbhr8KLlaQBB8rpe4Fg0-lc92xv1kc";
const EC_Y: &str = "v0hWbLB6VtL9LwlgI4K48Rs2LYziqwAnkOElby7Sfzw";

/// A private signing key together with the public JWK an issuer would publish for it.
pub struct TestKey {
    pub kid: String,
    pub algorithm: Algorithm,
    encoding_key: EncodingKey,
    pub jwk: Value,
}

fn rsa_key(kid: &str, pem: &str) -> TestKey {
    let private_key = RsaPrivateKey::from_pkcs8_pem(pem).unwrap();
    let pkcs1_der = private_key.to_pkcs1_der().unwrap();
    let public_key = private_key.to_public_key();
    TestKey {
        kid: kid.to_string(),
        algorithm: Algorithm::RS256,
        encoding_key: EncodingKey::from_rsa_der(pkcs1_der.as_bytes()),
        jwk: json!({
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": kid,
            "n": base64_url::encode(&public_key.n().to_bytes_be()),
            "e": base64_url::encode(&public_key.e().to_bytes_be()),
        }),
    }
}

/// The key the test issuer really signs with.
pub fn signing_key(kid: &str) -> TestKey {
    rsa_key(kid, SIGNING_KEY_PEM)
}

/// A key the issuer never published.
pub fn rogue_key(kid: &str) -> TestKey {
    rsa_key(kid, ROGUE_KEY_PEM)
}

pub fn ec_key(kid: &str) -> TestKey {
    TestKey {
        kid: kid.to_string(),
        algorithm: Algorithm::ES256,
        encoding_key: EncodingKey::from_ec_pem(EC_SIGNING_KEY_PEM.as_bytes()).unwrap(),
        jwk: json!({
            "kty": "EC",
            "use": "sig",
            "crv": "P-256",
            "kid": kid,
            "x": EC_X,
            "y": EC_Y,
        }),
    }
}

pub fn now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
}

/// Claims that pass every check for `issuer` and `aud`.
pub fn valid_claims(issuer: &str, aud: &[&str]) -> Value {
    let now = now();
    json!({
        "iss": issuer,
        "sub": "subject",
        "aud": aud,
        "exp": now + 600,
        "nbf": now - 60,
        "iat": now,
        "jti": Uuid::new_v4().to_string(),
    })
}

pub fn mint(key: &TestKey, claims: &Value) -> String {
    let mut header = Header::new(key.algorithm);
    header.kid = Some(key.kid.clone());
    encode(&header, claims, &key.encoding_key).unwrap()
}

/// An unsigned token declaring `alg: none`.
pub fn unsigned_token(kid: &str, claims: &Value) -> String {
    let header = json!({"alg": "none", "typ": "JWT", "kid": kid});
    format!(
        "{}.{}.",
        base64_url::encode(&header.to_string()),
        base64_url::encode(&claims.to_string())
    )
}

/// A mock OIDC issuer serving discovery under `/oidc` and its key set under `/jwks`.
pub struct MockIssuer {
    pub server: MockServer,
    pub issuer: String,
}

impl MockIssuer {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let issuer = format!("{}/oidc", server.uri());
        Self { server, issuer }
    }

    pub fn jwks_uri(&self) -> String {
        format!("{}/jwks", self.server.uri())
    }

    /// Serves the discovery document; the server verifies the call count on drop.
    pub async fn expect_discovery(&self, times: u64) {
        Mock::given(method("GET"))
            .and(path("/oidc/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": self.issuer,
                "jwks_uri": self.jwks_uri(),
            })))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    pub async fn expect_jwks(&self, keys: &[&TestKey], times: u64) {
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks(keys)))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Serves the published keys (discovery + JWKS) without call-count expectations.
    pub async fn publish(&self, keys: &[&TestKey]) {
        Mock::given(method("GET"))
            .and(path("/oidc/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jwks_uri": self.jwks_uri()})))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks(keys)))
            .mount(&self.server)
            .await;
    }
}

pub fn jwks(keys: &[&TestKey]) -> Value {
    json!({ "keys": keys.iter().map(|k| k.jwk.clone()).collect::<Vec<_>>() })
}

pub fn builder(issuer: &str) -> ConfigBuilder {
    ConfigBuilder::new().issuer_url(issuer).unwrap().audience(AUDIENCE)
}

pub fn gate(config: ConfigBuilder) -> AuthenticationGate {
    AuthenticationGate::from_config(&config.build().unwrap()).unwrap()
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// The failure category of a rejected outcome; panics if the request was allowed.
pub fn rejection(outcome: &Outcome) -> FailureCategory {
    match outcome {
        Outcome::Rejected(failure) => failure.category,
        other => panic!("expected a rejection, got {other:?}"),
    }
}
