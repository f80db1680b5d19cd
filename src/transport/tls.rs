//! TLS client configuration.

use std::sync::{Arc, OnceLock};

use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::{debug, warn};

static PLATFORM_CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();

/// Client config trusting the platform's root certificates.
///
/// Built once per process; certificates that fail to load are logged and
/// skipped.
pub fn default_client_config() -> Arc<ClientConfig> {
    PLATFORM_CONFIG
        .get_or_init(|| {
            let mut roots = RootCertStore::empty();
            let certs = rustls_native_certs::load_native_certs();
            for cert in certs.certs {
                if let Err(e) = roots.add(cert) {
                    warn!(error = %e, "failed to add root certificate");
                }
            }
            for e in &certs.errors {
                warn!(error = %e, "error loading native certificates");
            }
            debug!(roots = roots.len(), "loaded platform trust store");

            Arc::new(
                ClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_no_client_auth(),
            )
        })
        .clone()
}
