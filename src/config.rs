// src/config.rs

use crate::error::GateError;
use crate::issuer::{parse_issuer_list, Issuer};
use jsonwebtoken::Algorithm;
use std::time::Duration;
use url::Url;

pub const ENV_ISSUER_URLS: &str = "OIDC_ISSUER_URLS";
pub const ENV_AUDIENCES: &str = "OIDC_AUDIENCES";
pub const ENV_PROXY_URL: &str = "OIDC_PROXY_URL";
pub const ENV_PROXY_EXEMPT_ISSUERS: &str = "OIDC_PROXY_EXEMPT_ISSUERS";
pub const ENV_LEEWAY_SECONDS: &str = "OIDC_LEEWAY_SECONDS";
pub const ENV_CIPHER_KEY: &str = "CIPHER_KEY";

/// Contains the validation settings applied to every bearer token.
///
/// This struct is used to configure the specific checks that will be performed
/// on the token's claims, such as allowed algorithms and clock skew tolerance.
#[derive(Debug, Clone)]
pub struct ValidationDetails {
    /// The signing algorithms that are permitted. Only asymmetric algorithms
    /// are accepted here; `ConfigBuilder::build` rejects the HMAC family.
    pub algorithms: Vec<Algorithm>,
    /// The tolerance for clock skew when validating `exp` and `nbf`.
    /// Defaults to 30 seconds.
    pub leeway: Duration,
    /// Claims that must be present. Defaults to `exp`, `nbf` and `sub`.
    pub required_claims: Vec<String>,
}

impl Default for ValidationDetails {
    fn default() -> Self {
        Self {
            algorithms: vec![Algorithm::RS256],
            leeway: Duration::from_secs(30),
            required_claims: vec!["exp".to_string(), "nbf".to_string(), "sub".to_string()],
        }
    }
}

/// Outbound HTTP settings for discovery and JWKS calls.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Proxy used for every issuer not listed in `proxy_exempt_issuers`.
    pub proxy_url: Option<Url>,
    pub proxy_exempt_issuers: Vec<Issuer>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            proxy_url: None,
            proxy_exempt_issuers: Vec::new(),
        }
    }
}

/// Key-set cache settings.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Lifetime of a fetched key set when the JWKS response has no `Cache-Control: max-age`.
    pub default_ttl: Duration,
    /// Minimum age of a key set before an unknown `kid` may invalidate it.
    /// Also the floor for any `max-age` advertised by the issuer.
    pub refresh_cooldown: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(60 * 60),
            refresh_cooldown: Duration::from_secs(30),
        }
    }
}

/// The main configuration for the authentication gate.
///
/// It should be constructed using the `ConfigBuilder` or `Config::from_env`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Issuers whose tokens are accepted. Tokens naming any other issuer are
    /// rejected before a single network call is made.
    pub trusted_issuers: Vec<Issuer>,
    /// A token is accepted when at least one of its audiences is in this list.
    pub audiences: Vec<String>,
    pub validation: ValidationDetails,
    pub http: HttpSettings,
    pub cache: CacheSettings,
    /// Key for the field obfuscation helper, if the service uses it.
    pub cipher_key: Option<String>,
}

impl Config {
    /// Loads the configuration from process environment variables.
    ///
    /// `OIDC_ISSUER_URLS` and `OIDC_AUDIENCES` are required comma-separated lists;
    /// `OIDC_PROXY_URL`, `OIDC_PROXY_EXEMPT_ISSUERS`, `OIDC_LEEWAY_SECONDS` and
    /// `CIPHER_KEY` are optional.
    pub fn from_env() -> Result<Self, GateError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let issuers = read(ENV_ISSUER_URLS).ok_or_else(|| GateError::MissingConfiguration(ENV_ISSUER_URLS.to_string()))?;
        let audiences = read(ENV_AUDIENCES).ok_or_else(|| GateError::MissingConfiguration(ENV_AUDIENCES.to_string()))?;

        let mut builder = ConfigBuilder::new()
            .issuer_urls(&issuers)?
            .audiences(split_list(&audiences));

        if let Some(proxy) = read(ENV_PROXY_URL) {
            builder = builder.proxy_url(&proxy)?;
        }
        if let Some(exempt) = read(ENV_PROXY_EXEMPT_ISSUERS) {
            for issuer in parse_issuer_list(&exempt)? {
                builder.http.proxy_exempt_issuers.push(issuer);
            }
        }
        if let Some(leeway) = read(ENV_LEEWAY_SECONDS) {
            let seconds = leeway
                .parse::<u64>()
                .map_err(|e| GateError::InvalidConfiguration(format!("{ENV_LEEWAY_SECONDS}: {e}")))?;
            builder = builder.leeway(Duration::from_secs(seconds));
        }
        if let Some(key) = read(ENV_CIPHER_KEY) {
            builder = builder.cipher_key(key);
        }

        builder.build()
    }

    /// Whether outbound calls for `issuer` bypass the configured proxy.
    pub fn is_proxy_exempt(&self, issuer: &Issuer) -> bool {
        self.http.proxy_exempt_issuers.contains(issuer)
    }
}

fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn is_symmetric(algorithm: Algorithm) -> bool {
    matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

/// A builder for creating a `Config` instance.
///
/// This builder provides a fluent API to ensure that the configuration is
/// constructed correctly and with all required fields.
#[derive(Default)]
pub struct ConfigBuilder {
    trusted_issuers: Vec<Issuer>,
    audiences: Vec<String>,
    validation: ValidationDetails,
    http: HttpSettings,
    cache: CacheSettings,
    cipher_key: Option<String>,
}

impl ConfigBuilder {
    /// Creates a new `ConfigBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a trusted issuer URL. At least one is required.
    ///
    /// # Arguments
    ///
    /// * `url` - The issuer URL, e.g., "https://idp.example.com".
    pub fn issuer_url(mut self, url: &str) -> Result<Self, GateError> {
        let issuer = Issuer::parse(url)?;
        if !self.trusted_issuers.contains(&issuer) {
            self.trusted_issuers.push(issuer);
        }
        Ok(self)
    }

    /// Adds every issuer of a comma-separated list.
    pub fn issuer_urls(mut self, urls: &str) -> Result<Self, GateError> {
        for issuer in parse_issuer_list(urls)? {
            if !self.trusted_issuers.contains(&issuer) {
                self.trusted_issuers.push(issuer);
            }
        }
        Ok(self)
    }

    /// Adds an expected audience. At least one is required.
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audiences.push(audience.into());
        self
    }

    pub fn audiences(mut self, audiences: Vec<String>) -> Self {
        self.audiences.extend(audiences);
        self
    }

    /// Sets the allowed signing algorithms.
    /// Defaults to `[Algorithm::RS256]` if not set.
    pub fn algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.validation.algorithms = algorithms;
        self
    }

    /// Sets the clock skew tolerance. Defaults to 30 seconds.
    pub fn leeway(mut self, leeway: Duration) -> Self {
        self.validation.leeway = leeway;
        self
    }

    /// Replaces the set of claims that must be present.
    pub fn required_claims(mut self, claims: Vec<String>) -> Self {
        self.validation.required_claims = claims;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.http.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.http.request_timeout = timeout;
        self
    }

    /// Routes discovery and JWKS calls through an HTTP proxy.
    pub fn proxy_url(mut self, url: &str) -> Result<Self, GateError> {
        let parsed = Url::parse(url.trim()).map_err(|e| GateError::InvalidUrl(format!("{url}: {e}")))?;
        self.http.proxy_url = Some(parsed);
        Ok(self)
    }

    /// Lets calls for `issuer` bypass the proxy.
    pub fn proxy_exempt_issuer(mut self, issuer: &str) -> Result<Self, GateError> {
        self.http.proxy_exempt_issuers.push(Issuer::parse(issuer)?);
        Ok(self)
    }

    /// Sets the fallback key-set TTL. Defaults to one hour.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.default_ttl = ttl;
        self
    }

    /// Sets the minimum key-set age before an unknown `kid` triggers a refetch.
    pub fn refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.cache.refresh_cooldown = cooldown;
        self
    }

    pub fn cipher_key(mut self, key: impl Into<String>) -> Self {
        self.cipher_key = Some(key.into());
        self
    }

    /// Consumes the builder and returns a `Config` object.
    ///
    /// # Errors
    ///
    /// Returns an error if no issuer or audience is configured, if the
    /// algorithm list is empty or contains an HMAC algorithm, or if a timeout is zero.
    pub fn build(self) -> Result<Config, GateError> {
        if self.trusted_issuers.is_empty() {
            return Err(GateError::MissingConfiguration("trusted_issuers".to_string()));
        }
        let audiences: Vec<String> = self
            .audiences
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        if audiences.is_empty() {
            return Err(GateError::MissingConfiguration("audiences".to_string()));
        }
        if self.validation.algorithms.is_empty() {
            return Err(GateError::MissingConfiguration("algorithms".to_string()));
        }
        if let Some(alg) = self.validation.algorithms.iter().find(|a| is_symmetric(**a)) {
            return Err(GateError::InvalidConfiguration(format!(
                "symmetric algorithm {alg:?} cannot be verified with published keys"
            )));
        }
        if self.http.connect_timeout.is_zero() || self.http.request_timeout.is_zero() {
            return Err(GateError::InvalidConfiguration("timeouts must be greater than zero".to_string()));
        }

        Ok(Config {
            trusted_issuers: self.trusted_issuers,
            audiences,
            validation: self.validation,
            http: self.http,
            cache: self.cache,
            cipher_key: self.cipher_key,
        })
    }
}
