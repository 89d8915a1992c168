//! Transport boundary between the dispatcher and the collection server
mod http;

pub use http::HttpDeliveryClient;
pub(crate) use http::build_client;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::measurement::Measurement;

/// What the server answered to a delivered batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// HTTP status code of the response
    pub status: u16,
}

impl DeliveryReceipt {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one batch to the server in a single call.
///
/// An `Err` means the batch did not reach the server (connection refused,
/// timeout, transport failure). Any answer from the server, whatever its
/// status, is an `Ok`.
#[async_trait]
pub trait DeliveryClient: Send + Sync + 'static {
    async fn deliver(&self, batch: &[Measurement]) -> Result<DeliveryReceipt>;

    /// Name used in log lines
    fn name(&self) -> &str {
        "delivery"
    }
}

#[async_trait]
impl<D: DeliveryClient + ?Sized> DeliveryClient for Arc<D> {
    async fn deliver(&self, batch: &[Measurement]) -> Result<DeliveryReceipt> {
        (**self).deliver(batch).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Addresses of the server endpoints for one client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: String,
    client_id: String,
    secret: String,
}

impl Endpoint {
    /// `server` is either `host[:port]` (plain HTTP is assumed) or a base URL
    pub fn new(server: &str, client_id: impl Into<String>, secret: impl Into<String>) -> Self {
        let server = server.trim().trim_end_matches('/');
        let base = if server.contains("://") {
            server.to_string()
        } else {
            format!("http://{}", server)
        };
        Self {
            base,
            client_id: client_id.into(),
            secret: secret.into(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Where measurement batches are posted
    pub fn packet_url(&self) -> String {
        format!("{}/client/packet/{}/{}", self.base, self.client_id, self.secret)
    }

    /// Where the client configuration is fetched from
    pub fn config_url(&self) -> String {
        format!("{}/client/config/{}/{}", self.base, self.client_id, self.secret)
    }

    /// The packet URL with the secret masked, for logging
    pub fn redacted_packet_url(&self) -> String {
        format!("{}/client/packet/{}/***", self.base, self.client_id)
    }
}
