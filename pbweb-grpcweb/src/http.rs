//! TLS connector setup for the hyper client.

use std::sync::Arc;

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::ClientConfig;

/// Default client TLS configuration: ring crypto, bundled Mozilla roots.
pub fn default_tls_config() -> ClientConfig {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .expect("safe default protocol versions should be valid")
        .with_root_certificates(roots)
        .with_no_client_auth()
}

/// Connector that serves `https://` with the given TLS configuration and
/// still accepts plain `http://` URIs for local development.
pub fn build_https_connector(tls_config: Option<ClientConfig>) -> HttpsConnector<HttpConnector> {
    let config = tls_config.unwrap_or_else(default_tls_config);
    HttpsConnectorBuilder::new()
        .with_tls_config(config)
        .https_or_http()
        .enable_all_versions()
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tls_config() {
        let config = default_tls_config();
        assert!(config.alpn_protocols.is_empty());
    }

    #[test]
    fn test_build_https_connector() {
        let _ = build_https_connector(None);
        let _ = build_https_connector(Some(default_tls_config()));
    }
}
