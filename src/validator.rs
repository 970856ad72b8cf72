// src/validator.rs

use crate::cache::KeySetCache;
use crate::client::OutboundClients;
use crate::config::Config;
use crate::error::{FailureCategory, GateError, ValidationFailure};
use crate::issuer::Issuer;
use crate::resolver::{KeyResolver, ResolvedKey};
use crate::token::UnverifiedToken;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Validation};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};

/// The outcome of a successful validation: the verified claims and the
/// compact token they came from, kept for propagation to downstream services.
#[derive(Clone, PartialEq)]
pub struct ValidatedIdentity {
    claims: Map<String, Value>,
    raw_token: String,
}

impl ValidatedIdentity {
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    pub fn raw_token(&self) -> &str {
        &self.raw_token
    }

    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    pub fn issuer(&self) -> Option<&str> {
        self.claims.get("iss").and_then(Value::as_str)
    }

    pub fn subject(&self) -> Option<&str> {
        self.claims.get("sub").and_then(Value::as_str)
    }

    /// The `aud` claim, whether it was sent as a string or an array.
    pub fn audiences(&self) -> Vec<&str> {
        audiences_of(&self.claims)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims
            .get("exp")
            .and_then(Value::as_f64)
            .and_then(|exp| DateTime::from_timestamp(exp as i64, 0))
    }

    /// The `Authorization` header value that forwards this token to another service.
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.raw_token)
    }
}

impl fmt::Debug for ValidatedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedIdentity")
            .field("claims", &self.claims)
            .field("raw_token", &"<redacted>")
            .finish()
    }
}

/// The bearer token validator.
///
/// This struct should be created once and shared by all requests. It owns the
/// key resolver (and, through it, the process-wide key-set cache) and runs the
/// validation steps in a fixed order, stopping at the first failure:
///
/// 1. parse the compact token,
/// 2. resolve the verification key,
/// 3. verify the signature,
/// 4. check `exp`/`nbf` and the claims required by policy,
/// 5. check the audience,
/// 6. check the issuer.
#[derive(Clone)]
pub struct TokenValidator {
    resolver: KeyResolver,
    audiences: Arc<HashSet<String>>,
    leeway: u64,
    required_claims: Arc<Vec<String>>,
}

impl TokenValidator {
    /// Creates a validator with its own key-set cache and outbound HTTP clients.
    pub fn from_config(config: &Config) -> Result<Self, GateError> {
        let clients = OutboundClients::new(&config.http)?;
        let cache = KeySetCache::new(clients, config.cache.clone(), config.trusted_issuers.len());
        let resolver = KeyResolver::new(
            config.trusted_issuers.iter().cloned(),
            config.validation.algorithms.clone(),
            cache,
        );
        Ok(Self::new(config, resolver))
    }

    /// Creates a validator around an existing resolver, e.g. to share one cache.
    pub fn new(config: &Config, resolver: KeyResolver) -> Self {
        Self {
            resolver,
            audiences: Arc::new(config.audiences.iter().cloned().collect()),
            leeway: config.validation.leeway.as_secs(),
            required_claims: Arc::new(config.validation.required_claims.clone()),
        }
    }

    pub fn resolver(&self) -> &KeyResolver {
        &self.resolver
    }

    /// Validates a compact bearer token against the configured audiences.
    pub async fn validate(&self, token: &str) -> Result<ValidatedIdentity, ValidationFailure> {
        self.validate_for(token, &self.audiences).await
    }

    /// Validates a compact bearer token against `expected_audiences`.
    #[instrument(skip(self, token, expected_audiences), err)]
    pub async fn validate_for(
        &self,
        token: &str,
        expected_audiences: &HashSet<String>,
    ) -> Result<ValidatedIdentity, ValidationFailure> {
        // 1. Parse without verifying anything.
        let token = UnverifiedToken::parse(token)?;

        // 2. Resolve the key from the issuer's published key set.
        let resolved = self.resolver.resolve(&token).await?;

        // 3. Verify the signature with the resolved key and the header's algorithm.
        verify_signature(&token, &resolved)?;

        // 4. Time-based and required claims.
        check_required_claims(token.claims(), &self.required_claims)?;
        check_time_claims(token.claims(), unix_now(), self.leeway)?;

        // 5. Audience.
        check_audience(token.claims(), expected_audiences)?;

        // 6. Issuer must be the one whose key verified the signature.
        check_issuer(token.claims(), &resolved.issuer, |issuer| self.resolver.is_trusted(issuer))?;

        debug!("Token from {} validated", resolved.issuer);
        let (raw_token, claims) = token.into_parts();
        Ok(ValidatedIdentity { claims, raw_token })
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn verify_signature(token: &UnverifiedToken, resolved: &ResolvedKey) -> Result<(), ValidationFailure> {
    if !resolved.key.supports(resolved.algorithm) {
        return Err(ValidationFailure::invalid_signature(format!(
            "Key '{}' cannot verify {:?} signatures",
            resolved.key.kid(),
            resolved.algorithm
        )));
    }

    // Claims are checked separately so each failure keeps its own category.
    let mut validation = Validation::new(resolved.algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<Value>(token.raw(), resolved.key.decoding_key(), &validation)
        .map(|_| ())
        .map_err(|e| match e.kind() {
            ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) | ErrorKind::InvalidToken => {
                ValidationFailure::malformed("Token could not be decoded")
            }
            _ => {
                debug!("Signature verification failed: {:?}", e);
                ValidationFailure::invalid_signature("Invalid signature!")
            }
        })
}

fn check_required_claims(claims: &Map<String, Value>, required: &[String]) -> Result<(), ValidationFailure> {
    for name in required {
        if claims.get(name).map_or(true, Value::is_null) {
            return Err(ValidationFailure::new(
                FailureCategory::MissingClaim,
                format!("Missing required claim '{name}'"),
            ));
        }
    }
    Ok(())
}

fn numeric_date(claims: &Map<String, Value>, name: &str) -> Result<Option<i64>, ValidationFailure> {
    match claims.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(|secs| Some(secs.floor() as i64))
            .ok_or_else(|| ValidationFailure::malformed(format!("Claim '{name}' is not a NumericDate"))),
    }
}

fn format_time(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

/// `exp` must be later than `now - leeway`; `nbf` must not be later than `now + leeway`.
fn check_time_claims(claims: &Map<String, Value>, now: i64, leeway: u64) -> Result<(), ValidationFailure> {
    let leeway = i64::try_from(leeway).unwrap_or(i64::MAX);

    // Out-of-range dates saturate rather than overflow.
    if let Some(exp) = numeric_date(claims, "exp")? {
        if now >= exp.saturating_add(leeway) {
            return Err(ValidationFailure::new(
                FailureCategory::ExpiredToken,
                format!("JWT expired at {}", format_time(exp)),
            ));
        }
    }
    if let Some(nbf) = numeric_date(claims, "nbf")? {
        if nbf > now.saturating_add(leeway) {
            return Err(ValidationFailure::new(
                FailureCategory::NotYetValid,
                format!("JWT not valid before {}", format_time(nbf)),
            ));
        }
    }
    Ok(())
}

fn audiences_of(claims: &Map<String, Value>) -> Vec<&str> {
    match claims.get("aud") {
        Some(Value::String(aud)) => vec![aud.as_str()],
        Some(Value::Array(auds)) => auds.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn check_audience(claims: &Map<String, Value>, expected: &HashSet<String>) -> Result<(), ValidationFailure> {
    let audiences = audiences_of(claims);
    if audiences.iter().any(|aud| expected.contains(*aud)) {
        return Ok(());
    }
    let shown = if audiences.is_empty() {
        "none".to_string()
    } else {
        audiences.join(", ")
    };
    Err(ValidationFailure::new(
        FailureCategory::InvalidAudience,
        format!("Invalid audience(s) - {shown}"),
    ))
}

fn check_issuer<F>(claims: &Map<String, Value>, resolved: &Issuer, is_trusted: F) -> Result<(), ValidationFailure>
where
    F: Fn(&Issuer) -> bool,
{
    let claimed = claims.get("iss").and_then(Value::as_str).unwrap_or("none");
    match Issuer::parse(claimed) {
        Ok(issuer) if issuer == *resolved && is_trusted(&issuer) => Ok(()),
        _ => Err(ValidationFailure::new(
            FailureCategory::InvalidIssuer,
            format!("Invalid issuer {claimed}"),
        )),
    }
}
