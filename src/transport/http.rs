//! HTTP transport backed by reqwest

use super::{Transport, TransportConfig, TransportFactory, WireRequest, WireResponse};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Transport handle for one server base URL
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    base: Url,
    request_timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn new(endpoint: &str, config: &TransportConfig) -> Result<Self> {
        let base = Url::parse(endpoint).map_err(|e| {
            ClientError::Configuration(format!("Invalid server URL '{}': {}", endpoint, e))
        })?;

        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(ClientError::Configuration(format!(
                "HTTP transport only supports http:// and https:// URLs, got: {}",
                base.scheme()
            )));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = limit(config.connect_timeout()) {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = limit(config.read_timeout()) {
            builder = builder.timeout(timeout);
        }

        if let Some(proxy_url) = &config.proxy_url {
            let mut proxy = reqwest::Proxy::all(proxy_url.as_str()).map_err(|e| {
                ClientError::Configuration(format!("Invalid proxy URL '{}': {}", proxy_url, e))
            })?;
            if let Some((username, password)) = config.proxy_credentials() {
                proxy = proxy.basic_auth(username, password);
            }
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| {
            ClientError::Configuration(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            base,
            request_timeout: limit(config.request_timeout()),
        })
    }

    fn url_for(&self, request: &WireRequest) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                ClientError::Configuration(format!(
                    "Server URL cannot be used as a base: {}",
                    self.endpoint
                ))
            })?;
            segments.pop_if_empty().extend(&request.path_segments);
        }

        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }

        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, request: WireRequest) -> Result<WireResponse> {
        let url = self.url_for(&request)?;
        debug!("Sending HTTP request: {} {}", request.method, url);

        let mut builder = self.client.request(request.method.clone(), url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let exchange = async {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = response.bytes().await?.to_vec();
            Ok::<_, ClientError>(WireResponse {
                status,
                headers,
                body,
            })
        };

        let Some(request_timeout) = self.request_timeout else {
            return exchange.await;
        };

        match tokio::time::timeout(request_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::connection(format!(
                "Request to {} timed out after {} ms",
                url,
                request_timeout.as_millis()
            ))),
        }
    }
}

/// A zero timeout means no limit
fn limit(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}

/// Default [`TransportFactory`]: one reqwest client per handle
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpTransportFactory;

impl TransportFactory for HttpTransportFactory {
    fn build(&self, endpoint: &str, config: &TransportConfig) -> Result<Arc<dyn Transport>> {
        debug!("Building HTTP transport for {} with {:?}", endpoint, config);
        Ok(Arc::new(HttpTransport::new(endpoint, config)?))
    }
}
