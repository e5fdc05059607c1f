//! Trusted root material for secure match function connections

use crate::config::TlsSettings;
use crate::error::{FetchError, FetchResult};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// PEM-encoded root certificate(s) used to verify match functions
#[derive(Debug, Clone)]
pub struct TrustMaterial {
    path: PathBuf,
    pem: Vec<u8>,
}

impl TrustMaterial {
    /// Load trust material when TLS is enabled.
    ///
    /// Returns `Ok(None)` for insecure configurations. A secure configuration
    /// without a readable, non-empty certificate fails with the
    /// "failed to connect" error.
    pub fn load(settings: &TlsSettings) -> FetchResult<Option<Self>> {
        if !settings.enabled {
            return Ok(None);
        }

        let path = settings.trusted_certificate_path.as_ref().ok_or_else(|| {
            error!("TLS is enabled but no trusted certificate path is configured");
            FetchError::failed_to_connect()
        })?;

        let pem = std::fs::read(path).map_err(|e| {
            error!(
                "Failed to read trusted certificate {}: {}",
                path.display(),
                e
            );
            FetchError::failed_to_connect()
        })?;

        if pem.is_empty() {
            error!("Trusted certificate {} is empty", path.display());
            return Err(FetchError::failed_to_connect());
        }

        debug!(
            "Loaded {} bytes of trust material from {}",
            pem.len(),
            path.display()
        );
        Ok(Some(Self {
            path: path.clone(),
            pem,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pem(&self) -> &[u8] {
        &self.pem
    }
}
