// src/cache.rs

use crate::client::OutboundClients;
use crate::config::CacheSettings;
use crate::discovery::OidcDiscoveryClient;
use crate::error::ValidationFailure;
use crate::issuer::Issuer;
use crate::model::{JsonWebKey, JsonWebKeySet};
use jsonwebtoken::{Algorithm, DecodingKey};
use moka::future::Cache;
use moka::Expiry;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// The kind of public key material a JWK carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    /// EC key on the named curve.
    Ec(Curve),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    P256,
    P384,
}

/// A single public verification key from an issuer's JWKS.
#[derive(Clone)]
pub struct VerificationKey {
    kid: String,
    family: KeyFamily,
    /// The `alg` the issuer pinned this key to, if any.
    algorithm: Option<Algorithm>,
    decoding_key: DecodingKey,
}

impl VerificationKey {
    /// Converts a JWK into a verification key.
    ///
    /// Returns `Ok(None)` for keys that are not usable for signature
    /// verification here (no `kid`, `use` other than `sig`, unsupported `kty`).
    pub fn from_jwk(jwk: &JsonWebKey) -> Result<Option<Self>, String> {
        let Some(kid) = jwk.kid.clone() else {
            return Ok(None);
        };
        if jwk.use_purpose.as_deref().is_some_and(|u| u != "sig") {
            return Ok(None);
        }
        let algorithm = match jwk.alg.as_deref() {
            Some(alg) => Some(Algorithm::from_str(alg).map_err(|_| format!("unsupported alg '{alg}'"))?),
            None => None,
        };

        let (family, decoding_key) = match jwk.kty.as_str() {
            "RSA" => {
                let n = jwk.n.as_deref().ok_or("RSA key missing 'n' component")?;
                let e = jwk.e.as_deref().ok_or("RSA key missing 'e' component")?;
                let key = DecodingKey::from_rsa_components(n, e).map_err(|e| e.to_string())?;
                (KeyFamily::Rsa, key)
            }
            "EC" => {
                let curve = match jwk.crv.as_deref() {
                    Some("P-256") => Curve::P256,
                    Some("P-384") => Curve::P384,
                    other => return Err(format!("unsupported EC curve {other:?}")),
                };
                let x = jwk.x.as_deref().ok_or("EC key missing 'x' coordinate")?;
                let y = jwk.y.as_deref().ok_or("EC key missing 'y' coordinate")?;
                let key = DecodingKey::from_ec_components(x, y).map_err(|e| e.to_string())?;
                (KeyFamily::Ec(curve), key)
            }
            _ => return Ok(None),
        };

        Ok(Some(Self {
            kid,
            family,
            algorithm,
            decoding_key,
        }))
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn family(&self) -> KeyFamily {
        self.family
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Whether a signature made with `alg` can be checked with this key.
    pub fn supports(&self, alg: Algorithm) -> bool {
        if self.algorithm.is_some_and(|pinned| pinned != alg) {
            return false;
        }
        match self.family {
            KeyFamily::Rsa => matches!(
                alg,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            ),
            KeyFamily::Ec(Curve::P256) => alg == Algorithm::ES256,
            KeyFamily::Ec(Curve::P384) => alg == Algorithm::ES384,
        }
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("family", &self.family)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// The keys one issuer advertised at one point in time, keyed by `kid`.
///
/// A key set is never modified after it is built; a refresh installs a new one.
#[derive(Debug)]
pub struct KeySet {
    keys: HashMap<String, Arc<VerificationKey>>,
    fetched_at: Instant,
    ttl: Duration,
}

impl KeySet {
    /// Builds a key set from a JWKS document, skipping keys that cannot be used.
    pub fn from_jwks(jwks: JsonWebKeySet, ttl: Duration) -> Self {
        let mut keys = HashMap::with_capacity(jwks.keys.len());
        for jwk in &jwks.keys {
            match VerificationKey::from_jwk(jwk) {
                Ok(Some(key)) => {
                    keys.insert(key.kid.clone(), Arc::new(key));
                }
                Ok(None) => debug!("Skipping JWK kid={:?} kty={}", jwk.kid, jwk.kty),
                Err(reason) => warn!("Ignoring malformed JWK kid={:?}: {}", jwk.kid, reason),
            }
        }
        Self {
            keys,
            fetched_at: Instant::now(),
            ttl,
        }
    }

    pub fn get(&self, kid: &str) -> Option<Arc<VerificationKey>> {
        self.keys.get(kid).cloned()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// Expires each key set after its own TTL.
struct KeySetExpiry;

impl Expiry<Issuer, Arc<KeySet>> for KeySetExpiry {
    fn expire_after_create(&self, _issuer: &Issuer, key_set: &Arc<KeySet>, _created_at: Instant) -> Option<Duration> {
        Some(key_set.ttl)
    }
}

/// A per-issuer cache of verification keys.
///
/// Hits are served from memory without touching the network. On a miss the
/// issuer's discovery document and JWKS are fetched; concurrent misses for the
/// same issuer share a single fetch. Failed fetches are not cached, so the next
/// call simply tries again.
#[derive(Clone)]
pub struct KeySetCache {
    // The cache is internally ref-counted to allow for cheap cloning.
    inner: Arc<Inner>,
}

struct Inner {
    discovery: OidcDiscoveryClient,
    clients: OutboundClients,
    settings: CacheSettings,
    // Cache stores `issuer` -> `KeySet`.
    key_sets: Cache<Issuer, Arc<KeySet>>,
}

impl KeySetCache {
    /// Creates an empty cache sized for `issuer_capacity` issuers.
    pub fn new(clients: OutboundClients, settings: CacheSettings, issuer_capacity: usize) -> Self {
        let key_sets = Cache::builder()
            .max_capacity(issuer_capacity.max(1) as u64)
            .expire_after(KeySetExpiry)
            .build();

        Self {
            inner: Arc::new(Inner {
                discovery: OidcDiscoveryClient::new(clients.clone()),
                clients,
                settings,
                key_sets,
            }),
        }
    }

    /// Returns the issuer's key set, fetching it on a miss.
    ///
    /// Fails with a `KeyFetchError` if discovery or the JWKS fetch fails.
    #[instrument(skip(self, issuer), fields(issuer = %issuer), err)]
    pub async fn get_or_fetch(&self, issuer: &Issuer) -> Result<Arc<KeySet>, ValidationFailure> {
        if let Some(key_set) = self.inner.key_sets.get(issuer).await {
            debug!("Key set cache hit for {}", issuer);
            return Ok(key_set);
        }

        debug!("Key set cache miss for {}. Fetching from provider.", issuer);
        self.inner
            .key_sets
            .try_get_with(issuer.clone(), self.fetch(issuer))
            .await
            .map_err(|e: Arc<ValidationFailure>| (*e).clone())
    }

    /// Drops the issuer's key set if it is older than the refresh cooldown,
    /// so that the next call fetches a fresh one. Returns whether it was dropped.
    pub async fn invalidate_if_stale(&self, issuer: &Issuer) -> bool {
        let Some(key_set) = self.inner.key_sets.get(issuer).await else {
            return false;
        };
        if key_set.age() < self.inner.settings.refresh_cooldown {
            debug!("Key set for {} is {:?} old, within refresh cooldown", issuer, key_set.age());
            return false;
        }
        self.inner.key_sets.invalidate(issuer).await;
        info!("Key set for {} invalidated; next request refetches", issuer);
        true
    }

    /// Drops the issuer's key set unconditionally.
    pub async fn invalidate(&self, issuer: &Issuer) {
        self.inner.key_sets.invalidate(issuer).await;
    }

    /// Whether a key set for `issuer` is currently cached.
    pub fn contains(&self, issuer: &Issuer) -> bool {
        self.inner.key_sets.contains_key(issuer)
    }

    /// Fetches the issuer's JWKS via discovery and builds a fresh key set.
    async fn fetch(&self, issuer: &Issuer) -> Result<Arc<KeySet>, ValidationFailure> {
        let jwks_uri = self
            .inner
            .discovery
            .discover(issuer)
            .await
            .map_err(|f| ValidationFailure::key_fetch(format!("OIDC discovery failed: {}", f.detail)))?;

        let response = self
            .inner
            .clients
            .for_issuer(issuer)
            .get(jwks_uri.clone())
            .send()
            .await
            .map_err(|e| {
                error!("JWKS request to {} failed: {:?}", jwks_uri, e);
                ValidationFailure::key_fetch(format!("Unable to reach {jwks_uri}"))
            })?;

        if !response.status().is_success() {
            error!("JWKS endpoint {} returned {}", jwks_uri, response.status());
            return Err(ValidationFailure::key_fetch(format!(
                "JWKS at {jwks_uri} returned status {}",
                response.status().as_u16()
            )));
        }

        let ttl = response
            .headers()
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|value| value.to_str().ok())
            .and_then(max_age)
            .map(|ttl| ttl.max(self.inner.settings.refresh_cooldown))
            .unwrap_or(self.inner.settings.default_ttl);

        let jwks: JsonWebKeySet = response.json().await.map_err(|e| {
            error!("Malformed JWKS from {}: {:?}", jwks_uri, e);
            ValidationFailure::key_fetch(format!("Malformed JWKS from {jwks_uri}"))
        })?;

        let key_set = KeySet::from_jwks(jwks, ttl);
        info!(
            "Fetched {} usable keys for {}. Caching with TTL: {:?}",
            key_set.len(),
            issuer,
            ttl
        );
        Ok(Arc::new(key_set))
    }
}

/// Parses the `max-age` directive of a `Cache-Control` header value.
fn max_age(cache_control: &str) -> Option<Duration> {
    cache_control.split(',').find_map(|part| {
        part.trim()
            .strip_prefix("max-age=")?
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwk(json: serde_json::Value) -> JsonWebKey {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn parses_max_age_directive() {
        assert_eq!(max_age("public, max-age=300"), Some(Duration::from_secs(300)));
        assert_eq!(max_age("max-age=60,must-revalidate"), Some(Duration::from_secs(60)));
        assert_eq!(max_age("no-cache"), None);
        assert_eq!(max_age("max-age=soon"), None);
    }

    #[test]
    fn rsa_keys_support_only_rsa_algorithms() {
        let key = VerificationKey::from_jwk(&jwk(serde_json::json!({
            "kty": "RSA", "kid": "k1", "n": "AQAB", "e": "AQAB"
        })))
        .unwrap()
        .unwrap();
        assert_eq!(key.family(), KeyFamily::Rsa);
        assert!(key.supports(Algorithm::RS256));
        assert!(key.supports(Algorithm::PS512));
        assert!(!key.supports(Algorithm::ES256));
        assert!(!key.supports(Algorithm::HS256));
    }

    #[test]
    fn pinned_alg_restricts_key() {
        let key = VerificationKey::from_jwk(&jwk(serde_json::json!({
            "kty": "RSA", "kid": "k1", "alg": "RS384", "n": "AQAB", "e": "AQAB"
        })))
        .unwrap()
        .unwrap();
        assert!(key.supports(Algorithm::RS384));
        assert!(!key.supports(Algorithm::RS256));
    }

    #[test]
    fn ec_keys_are_bound_to_their_curve() {
        let key = VerificationKey::from_jwk(&jwk(serde_json::json!({
            "kty": "EC", "kid": "e1", "crv": "P-256", "x": "AAAA", "y": "AAAA"
        })))
        .unwrap()
        .unwrap();
        assert_eq!(key.family(), KeyFamily::Ec(Curve::P256));
        assert!(key.supports(Algorithm::ES256));
        assert!(!key.supports(Algorithm::ES384));
    }

    #[test]
    fn key_set_skips_unusable_keys() {
        let jwks: JsonWebKeySet = serde_json::from_value(serde_json::json!({"keys": [
            {"kty": "RSA", "kid": "good", "use": "sig", "n": "AQAB", "e": "AQAB"},
            {"kty": "RSA", "kid": "enc", "use": "enc", "n": "AQAB", "e": "AQAB"},
            {"kty": "RSA", "n": "AQAB", "e": "AQAB"},
            {"kty": "RSA", "kid": "broken", "n": "AQAB"},
            {"kty": "oct", "kid": "secret", "k": "c2VjcmV0"},
            {"kty": "EC", "kid": "odd-curve", "crv": "P-521", "x": "AA", "y": "AA"}
        ]}))
        .unwrap();
        let key_set = KeySet::from_jwks(jwks, Duration::from_secs(60));
        assert_eq!(key_set.len(), 1);
        assert!(key_set.get("good").is_some());
        assert!(key_set.get("enc").is_none());
        assert!(key_set.get("broken").is_none());
        assert_eq!(key_set.ttl(), Duration::from_secs(60));
    }
}
