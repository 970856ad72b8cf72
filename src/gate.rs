// src/gate.rs

use crate::config::Config;
use crate::error::{GateError, ValidationFailure};
use crate::validator::{TokenValidator, ValidatedIdentity};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Content type of rejection bodies.
pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

const BEARER_PREFIX: &str = "Bearer ";

/// The problem-details body returned with a rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDetails {
    pub status: u16,
    pub title: String,
    pub detail: String,
}

impl From<&ValidationFailure> for ProblemDetails {
    fn from(failure: &ValidationFailure) -> Self {
        Self {
            status: failure.status(),
            title: failure.category.title().to_string(),
            detail: failure.detail.clone(),
        }
    }
}

impl ProblemDetails {
    /// Serializes the body for an `application/problem+json` response.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| format!(r#"{{"status":{},"title":"{}"}}"#, self.status, self.title))
    }
}

/// What the host framework should do with a request.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The route is public; the request proceeds without an identity.
    Anonymous,
    /// The token was valid; the request proceeds as this identity.
    Authenticated(ValidatedIdentity),
    /// The request must be answered with the failure's 401 response.
    Rejected(ValidationFailure),
}

impl Outcome {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Outcome::Rejected(_))
    }

    pub fn identity(&self) -> Option<&ValidatedIdentity> {
        match self {
            Outcome::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&ValidationFailure> {
        match self {
            Outcome::Rejected(failure) => Some(failure),
            _ => None,
        }
    }

    /// The problem body to send for a rejected request.
    pub fn problem(&self) -> Option<ProblemDetails> {
        self.failure().map(ProblemDetails::from)
    }
}

/// The entry point for the host framework's request filter.
///
/// Whether a route is public is decided by the routing layer and passed in;
/// the gate never inspects framework metadata.
#[derive(Clone)]
pub struct AuthenticationGate {
    validator: TokenValidator,
}

impl AuthenticationGate {
    pub fn new(validator: TokenValidator) -> Self {
        Self { validator }
    }

    pub fn from_config(config: &Config) -> Result<Self, GateError> {
        Ok(Self::new(TokenValidator::from_config(config)?))
    }

    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Authenticates a request from its raw `Authorization` header value.
    ///
    /// Exempt routes are allowed without looking at the header. Every failure
    /// becomes `Outcome::Rejected`; nothing escapes as an error.
    pub async fn authenticate(&self, authorization: Option<&str>, is_exempt: bool) -> Outcome {
        if is_exempt {
            return Outcome::Anonymous;
        }

        let Some(header) = authorization else {
            debug!("Missing Authorization header");
            return Outcome::Rejected(ValidationFailure::missing_credentials("Jwt not found"));
        };

        let token = match bearer_token(header) {
            Ok(token) => token,
            Err(failure) => {
                debug!("Unusable Authorization header: {}", failure);
                return Outcome::Rejected(failure);
            }
        };

        match self.validator.validate(token).await {
            Ok(identity) => Outcome::Authenticated(identity),
            Err(failure) => {
                warn!(category = %failure.category, "Unable to authenticate request: {}", failure.detail);
                Outcome::Rejected(failure)
            }
        }
    }
}

/// Extracts the token from a `Bearer <token>` header value.
fn bearer_token(header: &str) -> Result<&str, ValidationFailure> {
    let header = header.trim();
    let prefix = header
        .get(..BEARER_PREFIX.len())
        .filter(|p| p.eq_ignore_ascii_case(BEARER_PREFIX))
        .ok_or_else(|| ValidationFailure::malformed("Authorization header is not a Bearer credential"))?;
    // The trimmed header ends in a non-space, so the token is never empty here.
    Ok(header[prefix.len()..].trim_start())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureCategory;

    #[test]
    fn extracts_bearer_tokens_case_insensitively() {
        assert_eq!(bearer_token("Bearer abc.def.ghi").unwrap(), "abc.def.ghi");
        assert_eq!(bearer_token("bearer   abc.def.ghi ").unwrap(), "abc.def.ghi");
    }

    #[test]
    fn rejects_other_schemes() {
        let failure = bearer_token("Basic dXNlcjpwYXNz").unwrap_err();
        assert_eq!(failure.category, FailureCategory::MalformedToken);
        assert_eq!(bearer_token("Bearer").unwrap_err().category, FailureCategory::MalformedToken);
        assert_eq!(bearer_token("Bearer   ").unwrap_err().category, FailureCategory::MalformedToken);
        assert_eq!(bearer_token("Bearer \u{e9}").unwrap(), "\u{e9}");
    }

    #[test]
    fn problem_body_has_status_title_and_detail() {
        let failure = ValidationFailure::new(FailureCategory::InvalidAudience, "Invalid audience(s) - other-svc");
        let problem = ProblemDetails::from(&failure);
        let body: serde_json::Value = serde_json::from_str(&problem.to_json()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "status": 401,
                "title": "InvalidAudienceError",
                "detail": "Invalid audience(s) - other-svc"
            })
        );
    }

    #[test]
    fn outcome_accessors() {
        let rejected = Outcome::Rejected(ValidationFailure::missing_credentials("Jwt not found"));
        assert!(!rejected.is_allowed());
        assert_eq!(rejected.problem().map(|p| p.title), Some("MissingCredentialsError".to_string()));
        assert!(Outcome::Anonymous.is_allowed());
        assert!(Outcome::Anonymous.identity().is_none());
    }
}
