use crate::buffer::BulkSnapshot;
use crate::config::{Credentials, SinkConfig};
use crate::error::{ConfigError, TransportError};
use crate::transport::BulkTransport;
use async_trait::async_trait;
use reqwest::{header, Client, Url};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Elasticsearch / OpenSearch transport using the HTTP `_bulk` API.
///
/// Requests rotate round-robin over the configured nodes. Each call makes
/// exactly one request; failover to the next node happens on the next
/// flush, not within a call.
pub struct ElasticsearchTransport {
    client: Client,
    /// `<address>/_bulk` for every configured node.
    endpoints: Vec<Url>,
    credentials: Credentials,
    next: AtomicUsize,
}

impl ElasticsearchTransport {
    /// Build a transport for the given node addresses.
    ///
    /// **Parameters**
    /// - `addresses`: base URLs such as `http://localhost:9200`.
    /// - `credentials`: see [`Credentials::resolve`].
    /// - `timeout`: per-request timeout of the HTTP client.
    ///
    /// **Returns**
    /// - `Err(ConfigError::NoAddresses)` for an empty list.
    /// - `Err(ConfigError::InvalidAddress)` for anything that is not an
    ///   `http`/`https` URL.
    pub fn new(
        addresses: &[String],
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        if addresses.is_empty() {
            return Err(ConfigError::NoAddresses);
        }

        let endpoints = addresses
            .iter()
            .map(|address| bulk_endpoint(address))
            .collect::<Result<Vec<_>, _>>()?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ConfigError::Client)?;

        Ok(ElasticsearchTransport {
            client,
            endpoints,
            credentials,
            next: AtomicUsize::new(0),
        })
    }

    pub fn from_config(config: &SinkConfig) -> Result<Self, ConfigError> {
        Self::new(
            &config.addresses,
            config.credentials.clone(),
            config.request_timeout,
        )
    }

    fn next_endpoint(&self) -> &Url {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        &self.endpoints[i]
    }
}

fn bulk_endpoint(address: &str) -> Result<Url, ConfigError> {
    let invalid = || ConfigError::InvalidAddress(address.to_string());
    let url = Url::parse(&format!("{}/_bulk", address.trim_end_matches('/')))
        .map_err(|_| invalid())?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err(invalid()),
    }
}

#[derive(Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Deserialize)]
struct BulkItem {
    #[serde(default)]
    status: u16,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl BulkItem {
    fn failed(&self) -> bool {
        self.error.is_some() || self.status >= 300
    }
}

#[async_trait]
impl BulkTransport for ElasticsearchTransport {
    async fn send(&self, snapshot: &BulkSnapshot) -> Result<(), TransportError> {
        let request = self
            .client
            .post(self.next_endpoint().clone())
            .header(header::CONTENT_TYPE, "application/x-ndjson")
            .body(snapshot.body().to_vec());

        let request = match &self.credentials {
            Credentials::None => request,
            Credentials::ApiKey(key) => request.header(header::AUTHORIZATION, format!("ApiKey {key}")),
            Credentials::Basic { username, password } => request.basic_auth(username, Some(password)),
        };

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let bytes = resp.bytes().await?;
        let parsed: BulkResponse = serde_json::from_slice(&bytes)?;
        if parsed.errors {
            let failed = parsed
                .items
                .iter()
                .filter(|item| item.values().any(BulkItem::failed))
                .count();
            return Err(TransportError::Rejected {
                failed,
                total: snapshot.documents(),
            });
        }
        Ok(())
    }
}
