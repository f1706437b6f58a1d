use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_iot::Client;
use aws_sdk_iot::error::DisplayErrorContext;

use super::CertificateStore;
use crate::utils::{BridgeError, Result};

/// Certificate lookup against the AWS IoT registry (`DescribeCertificate`).
#[derive(Debug, Clone)]
pub struct IotCertificateStore {
    client: Client,
}

impl IotCertificateStore {
    /// Builds a client from the ambient AWS configuration (environment,
    /// profile or instance role), optionally pinned to `region`.
    pub async fn from_env(region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let shared_config = loader.load().await;
        Self {
            client: Client::new(&shared_config),
        }
    }
}

#[async_trait]
impl CertificateStore for IotCertificateStore {
    async fn fetch_certificate(&self, cert_id: &str) -> Result<Vec<u8>> {
        let output = self
            .client
            .describe_certificate()
            .certificate_id(cert_id)
            .send()
            .await
            .map_err(|e| {
                BridgeError::Credentials(format!(
                    "describe certificate {}: {}",
                    cert_id,
                    DisplayErrorContext(&e)
                ))
            })?;

        output
            .certificate_description()
            .and_then(|description| description.certificate_pem())
            .map(|pem| pem.as_bytes().to_vec())
            .ok_or_else(|| {
                BridgeError::Credentials(format!("certificate {cert_id} has no PEM content"))
            })
    }
}
