// src/lib.rs

//! Bearer-token authentication against a set of trusted OpenID Connect issuers.
//!
//! The [`gate::AuthenticationGate`] takes a raw `Authorization` header and a
//! public-route flag from the host framework and answers with an identity or
//! a 401 problem body. Signing keys are discovered per issuer through
//! `.well-known/openid-configuration` and cached for reuse across requests.

pub mod cache;
pub mod client;
pub mod config;
pub mod discovery;
pub mod encryption;
pub mod error;
pub mod gate;
pub mod issuer;
pub mod model;
pub mod resolver;
pub mod token;
pub mod validator;

/// The public prelude for the `nila-oidc-gate` crate.
///
/// This module re-exports the most commonly used types for convenience.
pub mod prelude {
    pub use crate::config::{Config, ConfigBuilder};
    pub use crate::encryption::{EncodingType, Encryption};
    pub use crate::error::{FailureCategory, GateError, ValidationFailure};
    pub use crate::gate::{AuthenticationGate, Outcome, ProblemDetails, PROBLEM_CONTENT_TYPE};
    pub use crate::issuer::Issuer;
    pub use crate::validator::{TokenValidator, ValidatedIdentity};
    pub use jsonwebtoken::Algorithm;
}
