// src/error.rs

use std::fmt;
use thiserror::Error;

/// HTTP status surfaced for every authentication failure.
pub const UNAUTHORIZED: u16 = 401;

/// The category of a failed authentication attempt.
///
/// The category is retained for logs and metrics; callers only ever see a 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    /// No `Authorization` header was sent.
    MissingCredentials,
    /// The token could not be split and decoded into header, payload and signature.
    MalformedToken,
    /// The issuer's `.well-known/openid-configuration` could not be fetched or parsed.
    Discovery,
    /// The issuer's key set could not be fetched or parsed.
    KeyFetch,
    /// The issuer is not trusted, or it publishes no key matching the token.
    UnresolvableKey,
    /// The signature does not verify against the resolved key.
    InvalidSignature,
    /// `exp` lies in the past beyond the clock-skew tolerance.
    ExpiredToken,
    /// `nbf` lies in the future beyond the clock-skew tolerance.
    NotYetValid,
    /// A claim required by policy is absent.
    MissingClaim,
    /// None of the token's audiences is expected.
    InvalidAudience,
    /// The `iss` claim does not match the issuer the key was resolved for.
    InvalidIssuer,
}

impl FailureCategory {
    /// The machine-readable title used in problem responses.
    pub fn title(&self) -> &'static str {
        match self {
            FailureCategory::MissingCredentials => "MissingCredentialsError",
            FailureCategory::MalformedToken => "MalformedTokenError",
            FailureCategory::Discovery => "DiscoveryError",
            FailureCategory::KeyFetch => "KeyFetchError",
            FailureCategory::UnresolvableKey => "UnresolvableKeyError",
            FailureCategory::InvalidSignature => "InvalidSignatureError",
            FailureCategory::ExpiredToken => "ExpiredTokenError",
            FailureCategory::NotYetValid => "NotYetValidError",
            FailureCategory::MissingClaim => "MissingClaimError",
            FailureCategory::InvalidAudience => "InvalidAudienceError",
            FailureCategory::InvalidIssuer => "InvalidIssuerError",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// A structured validation failure: what went wrong and a diagnostic detail.
///
/// The detail is meant for operators. It never contains stack traces or the raw token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{category}: {detail}")]
pub struct ValidationFailure {
    pub category: FailureCategory,
    pub detail: String,
}

impl ValidationFailure {
    pub fn new(category: FailureCategory, detail: impl Into<String>) -> Self {
        Self {
            category,
            detail: detail.into(),
        }
    }

    pub fn missing_credentials(detail: impl Into<String>) -> Self {
        Self::new(FailureCategory::MissingCredentials, detail)
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(FailureCategory::MalformedToken, detail)
    }

    pub fn discovery(detail: impl Into<String>) -> Self {
        Self::new(FailureCategory::Discovery, detail)
    }

    pub fn key_fetch(detail: impl Into<String>) -> Self {
        Self::new(FailureCategory::KeyFetch, detail)
    }

    pub fn unresolvable(detail: impl Into<String>) -> Self {
        Self::new(FailureCategory::UnresolvableKey, detail)
    }

    pub fn invalid_signature(detail: impl Into<String>) -> Self {
        Self::new(FailureCategory::InvalidSignature, detail)
    }

    /// Every failure is surfaced as 401 Unauthorized.
    pub fn status(&self) -> u16 {
        UNAUTHORIZED
    }
}

/// Errors raised while setting up the gate (configuration, HTTP clients).
#[derive(Debug, Error)]
pub enum GateError {
    /// A provided URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A required configuration field is missing.
    #[error("A required configuration field is missing: {0}")]
    MissingConfiguration(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The outbound HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Errors raised by the field obfuscation helper.
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("Error while creating cipher: {0}")]
    Cipher(String),

    #[error("Error while encrypting string")]
    Encrypt,

    #[error("Error while decrypting string: {0}")]
    Decrypt(String),
}
