//! The `credentials` module gathers the mutual-TLS material for the
//! destination broker.
//!
//! The client certificate is looked up by identifier from a secrets service
//! at startup; the private key comes from configuration and the root CA from
//! a file. The material is immutable once acquired and only handed to the
//! destination connection.

mod iot;

use std::fmt;

use async_trait::async_trait;
use tracing::debug;

use crate::config::DestinationSettings;
use crate::utils::{BridgeError, Result};

pub use iot::IotCertificateStore;

/// Resolves a certificate identifier to PEM certificate bytes.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    async fn fetch_certificate(&self, cert_id: &str) -> Result<Vec<u8>>;
}

/// Certificate, key and CA used for the destination's mutual TLS.
#[derive(Clone)]
pub struct CredentialMaterial {
    pub certificate_pem: Vec<u8>,
    pub private_key_pem: Vec<u8>,
    pub ca_pem: Vec<u8>,
}

impl fmt::Debug for CredentialMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialMaterial")
            .field("certificate_pem", &format!("{} bytes", self.certificate_pem.len()))
            .field("private_key_pem", &"<redacted>")
            .field("ca_pem", &format!("{} bytes", self.ca_pem.len()))
            .finish()
    }
}

/// Fetches the certificate and assembles the full credential material.
pub async fn acquire<S: CertificateStore + ?Sized>(
    store: &S,
    settings: &DestinationSettings,
) -> Result<CredentialMaterial> {
    let certificate_pem = store.fetch_certificate(&settings.cert_id).await?;
    if certificate_pem.is_empty() {
        return Err(BridgeError::Credentials(format!(
            "certificate {} has no PEM content",
            settings.cert_id
        )));
    }
    debug!(
        "obtained certificate {} ({} bytes)",
        settings.cert_id,
        certificate_pem.len()
    );

    let ca_pem = std::fs::read(&settings.ca_file).map_err(|e| {
        BridgeError::Credentials(format!(
            "cannot read CA file {}: {}",
            settings.ca_file.display(),
            e
        ))
    })?;

    Ok(CredentialMaterial {
        certificate_pem,
        private_key_pem: normalize_pem(&settings.private_key).into_bytes(),
        ca_pem,
    })
}

/// Keys injected through environment variables often carry literal `\n`
/// sequences instead of line breaks.
pub fn normalize_pem(pem: &str) -> String {
    let pem = pem.trim();
    if pem.contains('\n') {
        pem.to_string()
    } else {
        pem.replace("\\n", "\n")
    }
}

#[cfg(test)]
mod tests;
