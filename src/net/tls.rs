//! TLS configuration and certificate loading.

use axum_server::tls_rustls::RustlsConfig;
use std::io;
use std::path::Path;

use crate::config::TlsConfig;

/// Load the PEM certificate chain and private key named in `config`.
pub async fn load_tls_config(config: &TlsConfig) -> io::Result<RustlsConfig> {
    let cert = Path::new(&config.cert_path);
    let key = Path::new(&config.key_path);
    for (what, path) in [("certificate", cert), ("private key", key)] {
        if !path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{what} file not found: {}", path.display()),
            ));
        }
    }
    let tls = RustlsConfig::from_pem_file(cert, key).await?;
    tracing::info!(cert = %cert.display(), "TLS enabled");
    Ok(tls)
}
