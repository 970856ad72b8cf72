//! Authenticates one bearer token against the issuers configured in the environment.
//!
//! ```text
//! OIDC_ISSUER_URLS=https://idp.example.com OIDC_AUDIENCES=svc \
//!     cargo run --example gate_demo -- "Bearer eyJ..."
//! ```
//!
//! The header may also be passed through `AUTHORIZATION`. Set `RUST_LOG=debug`
//! to watch discovery and key-set caching.

use nila_oidc_gate::prelude::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };
    info!(
        "Trusting {} issuer(s) for audiences {:?}",
        config.trusted_issuers.len(),
        config.audiences
    );

    let gate = match AuthenticationGate::from_config(&config) {
        Ok(gate) => gate,
        Err(e) => {
            error!("Unable to build the gate: {}", e);
            std::process::exit(2);
        }
    };

    let header = std::env::args().nth(1).or_else(|| std::env::var("AUTHORIZATION").ok());

    match gate.authenticate(header.as_deref(), false).await {
        Outcome::Authenticated(identity) => {
            println!("200 OK");
            println!("subject: {}", identity.subject().unwrap_or("-"));
            println!("issuer:  {}", identity.issuer().unwrap_or("-"));
            println!("{}", serde_json::to_string_pretty(identity.claims()).unwrap_or_default());
        }
        Outcome::Anonymous => println!("200 OK (anonymous)"),
        Outcome::Rejected(failure) => {
            let problem = ProblemDetails::from(&failure);
            println!("{} Unauthorized", problem.status);
            println!("Content-Type: {}", PROBLEM_CONTENT_TYPE);
            println!();
            println!("{}", problem.to_json());
        }
    }
}
