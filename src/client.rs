// src/client.rs

use crate::config::HttpSettings;
use crate::error::GateError;
use crate::issuer::Issuer;
use std::collections::HashSet;
use tracing::debug;

/// The outbound HTTP clients used for discovery and JWKS calls.
///
/// Two clients are built up front: one routed through the configured proxy and
/// one that connects directly. Issuers on the exemption list use the direct
/// client. Both carry the configured connect and request timeouts.
#[derive(Clone)]
pub struct OutboundClients {
    direct: reqwest::Client,
    proxied: Option<reqwest::Client>,
    proxy_exempt: HashSet<Issuer>,
}

impl OutboundClients {
    pub fn new(settings: &HttpSettings) -> Result<Self, GateError> {
        // The direct client ignores HTTP(S)_PROXY so exemptions really bypass proxies.
        let direct = base_builder(settings).no_proxy().build()?;

        let proxied = match &settings.proxy_url {
            Some(url) => {
                debug!("Routing outbound OIDC calls through proxy {}", url);
                let proxy = reqwest::Proxy::all(url.as_str())?;
                Some(base_builder(settings).proxy(proxy).build()?)
            }
            None => None,
        };

        Ok(Self {
            direct,
            proxied,
            proxy_exempt: settings.proxy_exempt_issuers.iter().cloned().collect(),
        })
    }

    /// The client to use for calls on behalf of `issuer`.
    pub fn for_issuer(&self, issuer: &Issuer) -> &reqwest::Client {
        match &self.proxied {
            Some(proxied) if !self.proxy_exempt.contains(issuer) => proxied,
            _ => &self.direct,
        }
    }

    pub fn is_proxied(&self, issuer: &Issuer) -> bool {
        self.proxied.is_some() && !self.proxy_exempt.contains(issuer)
    }
}

fn base_builder(settings: &HttpSettings) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.request_timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn exempt_issuers_bypass_the_proxy() {
        let exempt = Issuer::parse("https://internal.example.com").unwrap();
        let external = Issuer::parse("https://idp.example.com").unwrap();
        let settings = HttpSettings {
            proxy_url: Some(Url::parse("http://proxy.internal:3128").unwrap()),
            proxy_exempt_issuers: vec![exempt.clone()],
            ..HttpSettings::default()
        };
        let clients = OutboundClients::new(&settings).unwrap();
        assert!(clients.is_proxied(&external));
        assert!(!clients.is_proxied(&exempt));
    }

    #[test]
    fn no_proxy_means_direct_for_everyone() {
        let clients = OutboundClients::new(&HttpSettings::default()).unwrap();
        assert!(!clients.is_proxied(&Issuer::parse("https://idp.example.com").unwrap()));
    }
}
