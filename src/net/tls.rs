//! Shared rustls client configuration for https check targets

use std::sync::Arc;

use lazy_static::lazy_static;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore, ServerName};
use tokio_rustls::TlsConnector;

use super::transport::ProxyStream;
use crate::check::CheckError;

lazy_static! {
    static ref CLIENT_CONFIG: Arc<ClientConfig> = Arc::new(build_client_config());
}

fn build_client_config() -> ClientConfig {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));
    ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth()
}

/// Run a TLS handshake over `stream`, verifying against `host`
pub async fn connect(
    host: &str,
    stream: Box<dyn ProxyStream>,
) -> Result<Box<dyn ProxyStream>, CheckError> {
    let server_name = ServerName::try_from(host)
        .map_err(|e| CheckError::Tls(format!("invalid server name {}: {}", host, e)))?;
    let connector = TlsConnector::from(CLIENT_CONFIG.clone());
    let tls = connector.connect(server_name, stream).await?;
    Ok(Box::new(tls))
}
