//! HTTP client for the blind relay.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::package::EncryptedSyncPackage;
use crate::transport::{PendingInit, PulledPackage, RelayTransport};
use async_trait::async_trait;
use ledgerlink_crypto::encoding::base64_bytes;
use ledgerlink_types::{Clock, InstallationId};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Connection settings for [`HttpRelay`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Base URL without a trailing slash.
    pub base_url: String,
    /// Default per-call timeout.
    pub timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for RelayConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            base_url: config.relay_url.trim_end_matches('/').to_string(),
            timeout: config.request_timeout(),
        }
    }
}

#[derive(Deserialize)]
struct PullResponse {
    #[serde(default)]
    packages: Vec<PulledPackage>,
}

#[derive(Serialize)]
struct AckRequest<'a> {
    package_ids: &'a [String],
}

#[derive(Serialize)]
struct InitRequest<'a> {
    target_id: InstallationId,
    #[serde(with = "base64_bytes")]
    payload: &'a [u8],
}

#[derive(Deserialize)]
struct InitResponse {
    #[serde(default)]
    inits: Vec<PendingInit>,
}

#[derive(Serialize)]
struct DeleteInitRequest<'a> {
    init_ids: &'a [String],
}

/// [`RelayTransport`] over HTTPS with bearer-token authentication.
pub struct HttpRelay {
    client: Client,
    config: RelayConfig,
}

impl HttpRelay {
    pub fn new(config: RelayConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SyncError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn send(&self, request: RequestBuilder, token: &str) -> SyncResult<Response> {
        let response = request.bearer_auth(token).send().await?;
        check_status(response).await
    }
}

async fn check_status(response: Response) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SyncError::Auth(body)),
        _ => Err(SyncError::Relay {
            status: status.as_u16(),
            body,
        }),
    }
}

#[async_trait]
impl RelayTransport for HttpRelay {
    async fn push(
        &self,
        package: &EncryptedSyncPackage,
        token: &str,
        timeout: Option<Duration>,
    ) -> SyncResult<()> {
        let mut request = self.client.post(self.url("/packages")).json(package);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        self.send(request, token).await?;
        debug!(recipients = package.envelope.recipient_keys.len(), "pushed package");
        Ok(())
    }

    async fn pull(
        &self,
        installation_id: InstallationId,
        since: Clock,
        token: &str,
    ) -> SyncResult<Vec<PulledPackage>> {
        let request = self.client.get(self.url("/packages")).query(&[
            ("installation_id", installation_id.to_string()),
            ("since", since.as_secs().to_string()),
        ]);
        let response: PullResponse = self.send(request, token).await?.json().await?;
        Ok(response.packages)
    }

    async fn ack(&self, package_ids: &[String], token: &str) -> SyncResult<()> {
        if package_ids.is_empty() {
            return Ok(());
        }
        let request = self
            .client
            .post(self.url("/packages/ack"))
            .json(&AckRequest { package_ids });
        self.send(request, token).await?;
        Ok(())
    }

    async fn post_init(&self, target: InstallationId, payload: &[u8], token: &str) -> SyncResult<()> {
        let request = self.client.post(self.url("/init")).json(&InitRequest {
            target_id: target,
            payload,
        });
        self.send(request, token).await?;
        Ok(())
    }

    async fn get_init(&self, installation_id: InstallationId, token: &str) -> SyncResult<Vec<PendingInit>> {
        let request = self
            .client
            .get(self.url("/init"))
            .query(&[("installation_id", installation_id.to_string())]);
        let response: InitResponse = self.send(request, token).await?.json().await?;
        Ok(response.inits)
    }

    async fn delete_init(&self, init_ids: &[String], token: &str) -> SyncResult<()> {
        if init_ids.is_empty() {
            return Ok(());
        }
        let request = self
            .client
            .post(self.url("/init/delete"))
            .json(&DeleteInitRequest { init_ids });
        self.send(request, token).await?;
        Ok(())
    }
}
