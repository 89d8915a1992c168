use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

use super::{DeliveryClient, DeliveryReceipt, Endpoint};
use crate::error::{AgentError, Result};
use crate::measurement::{Measurement, encode_batch};

/// Build the HTTP client shared by delivery and configuration calls
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(format!("hostpulse/{}", crate::VERSION))
        .build()
        .map_err(|e| AgentError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Posts batches as a JSON array to `/client/packet/{client_id}/{secret}`
pub struct HttpDeliveryClient {
    client: reqwest::Client,
    endpoint: Endpoint,
}

impl HttpDeliveryClient {
    /// Create a client whose requests give up after `timeout`
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Result<Self> {
        Ok(Self::with_client(endpoint, build_client(timeout)?))
    }

    /// Use a preconfigured `reqwest` client
    pub fn with_client(endpoint: Endpoint, client: reqwest::Client) -> Self {
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[async_trait]
impl DeliveryClient for HttpDeliveryClient {
    async fn deliver(&self, batch: &[Measurement]) -> Result<DeliveryReceipt> {
        let body = encode_batch(batch)?;
        let response = self
            .client
            .post(self.endpoint.packet_url())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        Ok(DeliveryReceipt {
            status: response.status().as_u16(),
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}
