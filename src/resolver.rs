// src/resolver.rs

use crate::cache::{KeySetCache, VerificationKey};
use crate::error::ValidationFailure;
use crate::issuer::Issuer;
use crate::token::UnverifiedToken;
use jsonwebtoken::Algorithm;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// The key a token claims to be signed with, together with the issuer it belongs to.
#[derive(Debug, Clone)]
pub struct ResolvedKey {
    pub issuer: Issuer,
    pub algorithm: Algorithm,
    pub key: Arc<VerificationKey>,
}

/// Resolves the verification key for a token from its issuer's published keys.
///
/// The issuer is read from the unverified payload only to decide whose keys to
/// fetch; the key, not the claim, is what ends up trusted. Issuers outside the
/// allow-list are rejected before any network call.
#[derive(Clone)]
pub struct KeyResolver {
    trusted_issuers: Arc<HashSet<Issuer>>,
    algorithms: Arc<Vec<Algorithm>>,
    cache: KeySetCache,
}

impl KeyResolver {
    pub fn new(trusted_issuers: impl IntoIterator<Item = Issuer>, algorithms: Vec<Algorithm>, cache: KeySetCache) -> Self {
        Self {
            trusted_issuers: Arc::new(trusted_issuers.into_iter().collect()),
            algorithms: Arc::new(algorithms),
            cache,
        }
    }

    pub fn is_trusted(&self, issuer: &Issuer) -> bool {
        self.trusted_issuers.contains(issuer)
    }

    pub fn cache(&self) -> &KeySetCache {
        &self.cache
    }

    /// Resolves the key for `token`.
    ///
    /// Every check that does not need the issuer's keys runs first: the
    /// algorithm must be on the allow-list (which never holds `none` or HMAC
    /// algorithms), the issuer must be trusted and the header must name a `kid`.
    /// A `kid` missing from the issuer's key set fails immediately; the stale
    /// key set is dropped so that a later request picks up rotated keys.
    ///
    /// A disallowed algorithm (`none`, `HS256` and any other algorithm not
    /// configured) is reported as `UnresolvableKeyError`, not
    /// `InvalidSignatureError`: no key is ever resolved for it.
    #[instrument(skip(self, token), err)]
    pub async fn resolve(&self, token: &UnverifiedToken) -> Result<ResolvedKey, ValidationFailure> {
        let header = token.header();

        let algorithm = Algorithm::from_str(&header.alg)
            .ok()
            .filter(|alg| self.algorithms.contains(alg))
            .ok_or_else(|| {
                warn!("Rejecting token signed with disallowed algorithm '{}'", header.alg);
                ValidationFailure::unresolvable(format!(
                    "Algorithm '{}' is not accepted; no key is resolved for it",
                    header.alg
                ))
            })?;

        let claimed_issuer = token
            .unverified_issuer()
            .ok_or_else(|| ValidationFailure::unresolvable("Token does not name an issuer"))?;
        let issuer = Issuer::parse(claimed_issuer)
            .ok()
            .filter(|issuer| self.is_trusted(issuer))
            .ok_or_else(|| {
                warn!("Rejecting token from untrusted issuer '{}'", claimed_issuer);
                ValidationFailure::unresolvable(format!("Issuer {claimed_issuer} is not trusted"))
            })?;

        let kid = header
            .kid
            .as_deref()
            .ok_or_else(|| ValidationFailure::unresolvable("Token header does not name a key id"))?;

        let key_set = self.cache.get_or_fetch(&issuer).await?;

        let Some(key) = key_set.get(kid) else {
            debug!("Key id '{}' not published by {}", kid, issuer);
            self.cache.invalidate_if_stale(&issuer).await;
            return Err(ValidationFailure::unresolvable(format!(
                "Unable to find key '{kid}' in the key set of {issuer}"
            )));
        };

        Ok(ResolvedKey {
            issuer,
            algorithm,
            key,
        })
    }
}
