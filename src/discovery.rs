// src/discovery.rs

use crate::client::OutboundClients;
use crate::error::ValidationFailure;
use crate::issuer::Issuer;
use crate::model::OidcDiscoveryDocument;
use tracing::{debug, error, instrument};
use url::Url;

/// Resolves an issuer's `jwks_uri` through OpenID Connect Discovery.
///
/// The client does not cache anything; the key-set cache sits above it.
#[derive(Clone)]
pub struct OidcDiscoveryClient {
    clients: OutboundClients,
}

impl OidcDiscoveryClient {
    pub fn new(clients: OutboundClients) -> Self {
        Self { clients }
    }

    /// Fetches `<issuer>/.well-known/openid-configuration` and returns the advertised `jwks_uri`.
    ///
    /// Fails with a `DiscoveryError` on network failure, a non-200 response,
    /// a malformed document, a document naming another issuer or an
    /// unparsable `jwks_uri`.
    #[instrument(skip(self, issuer), fields(issuer = %issuer), err)]
    pub async fn discover(&self, issuer: &Issuer) -> Result<Url, ValidationFailure> {
        let discovery_url = issuer
            .discovery_url()
            .map_err(|e| ValidationFailure::discovery(e.to_string()))?;

        debug!("Performing OIDC discovery at: {}", discovery_url);
        let response = self
            .clients
            .for_issuer(issuer)
            .get(discovery_url.clone())
            .send()
            .await
            .map_err(|e| {
                error!("OIDC discovery request to {} failed: {:?}", discovery_url, e);
                ValidationFailure::discovery(format!("Unable to reach {discovery_url}"))
            })?;

        if response.status() != reqwest::StatusCode::OK {
            error!("OIDC discovery at {} returned {}", discovery_url, response.status());
            return Err(ValidationFailure::discovery(format!(
                "Discovery at {discovery_url} returned status {}",
                response.status().as_u16()
            )));
        }

        let document: OidcDiscoveryDocument = response.json().await.map_err(|e| {
            error!("Malformed discovery document from {}: {:?}", discovery_url, e);
            ValidationFailure::discovery(format!("Malformed discovery document from {discovery_url}"))
        })?;

        // An advertised issuer must be the one the document was fetched for.
        if let Some(advertised) = document.issuer.as_deref() {
            if Issuer::parse(advertised).ok().as_ref() != Some(issuer) {
                error!("Discovery document at {} advertises issuer {}", discovery_url, advertised);
                return Err(ValidationFailure::discovery(format!(
                    "Discovery document of {issuer} names a different issuer {advertised}"
                )));
            }
        }

        let jwks_uri = Url::parse(&document.jwks_uri)
            .map_err(|_| ValidationFailure::discovery(format!("Invalid jwks_uri advertised by {issuer}")))?;
        debug!("Discovered JWKS URI: {}", jwks_uri);
        Ok(jwks_uri)
    }
}
