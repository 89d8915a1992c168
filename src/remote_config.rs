//! Client configuration served by the collection server
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use sysinfo::System;

use crate::collector::CollectorRegistry;
use crate::delivery::{Endpoint, build_client};
use crate::error::{AgentError, Result};
use crate::retry::{RetryConfig, execute_with_retry};
use crate::shutdown::ShutdownListener;
use crate::util::logging::Logger;

/// What the server tells this client to do
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Minutes to wait before asking again while disabled
    #[serde(default = "default_polling_time")]
    pub polling_time: u64,
    /// Seconds between two dispatcher cycles
    #[serde(default = "default_send_throttle")]
    pub send_throttle: u64,
    /// Per-collector switches, collectors not listed stay enabled
    #[serde(default)]
    pub monitor_enabled: HashMap<String, bool>,
}

fn default_enabled() -> bool {
    true
}

fn default_polling_time() -> u64 {
    5
}

fn default_send_throttle() -> u64 {
    120
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            polling_time: default_polling_time(),
            send_throttle: default_send_throttle(),
            monitor_enabled: HashMap::new(),
        }
    }
}

impl RemoteConfig {
    /// Wait before asking again while disabled, never under a minute
    pub fn poll_delay(&self) -> Duration {
        Duration::from_secs(self.polling_time.max(1).saturating_mul(60))
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_secs(self.send_throttle)
    }

    pub fn registry(&self) -> CollectorRegistry {
        CollectorRegistry::from_map(self.monitor_enabled.clone())
    }
}

/// Host description sent along with the configuration request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostInfo {
    pub arch: String,
    pub dist: String,
    pub cpu: String,
}

impl HostInfo {
    pub fn detect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();

        Self {
            arch: std::env::consts::ARCH.to_string(),
            dist: System::long_os_version().unwrap_or_else(|| "unknown".to_string()),
            cpu: sys
                .cpus()
                .first()
                .map(|cpu| cpu.brand().trim().to_string())
                .filter(|brand| !brand.is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

/// Fetches [`RemoteConfig`] from `/client/config/{client_id}/{secret}`
pub struct ConfigClient {
    client: reqwest::Client,
    endpoint: Endpoint,
    host: HostInfo,
}

impl ConfigClient {
    pub fn new(endpoint: Endpoint, host: HostInfo, timeout: Duration) -> Result<Self> {
        Ok(Self::with_client(endpoint, host, build_client(timeout)?))
    }

    pub fn with_client(endpoint: Endpoint, host: HostInfo, client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint,
            host,
        }
    }

    /// One request, no retry.
    ///
    /// A 4xx answer is a rejection of this client. Server errors and
    /// transport failures come back as transient errors.
    pub async fn fetch(&self) -> Result<RemoteConfig> {
        let response = self
            .client
            .get(self.endpoint.config_url())
            .query(&self.host)
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            return Err(AgentError::Rejected {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(AgentError::Delivery(format!(
                "configuration request answered with HTTP {}",
                status.as_u16()
            )));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Fetch the configuration until the server enables this client.
///
/// Returns `Ok(None)` when shutdown is requested while waiting.
pub async fn await_enabled(
    client: &ConfigClient,
    retry: &RetryConfig,
    logger: &Logger,
    shutdown: &mut ShutdownListener,
) -> Result<Option<RemoteConfig>> {
    loop {
        logger.debug(format_args!(
            "Fetching configuration for {}",
            client.endpoint.client_id()
        ));

        let fetch = execute_with_retry(|| client.fetch(), retry, "Fetching configuration", logger);
        let config = tokio::select! {
            fetched = fetch => fetched?,
            _ = shutdown.triggered() => return Ok(None),
        };

        if config.enabled {
            logger.info(format_args!(
                "Configuration received: send every {}s, {} collector switches",
                config.send_throttle,
                config.monitor_enabled.len()
            ));
            return Ok(Some(config));
        }

        let delay = config.poll_delay();
        logger.warn(format_args!(
            "Client disabled by server, asking again in {} minutes",
            delay.as_secs() / 60
        ));

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.triggered() => return Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::Shutdown;
    use crate::test_support::{StubResponse, StubServer};
    use crate::util::logging::MemorySink;
    use log::Level;

    fn host() -> HostInfo {
        HostInfo {
            arch: "x86_64".to_string(),
            dist: "Debian GNU/Linux 12".to_string(),
            cpu: "Test CPU".to_string(),
        }
    }

    fn client(server: &StubServer) -> ConfigClient {
        let http = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        ConfigClient::with_client(Endpoint::new(&server.address(), "web01", "s3cret"), host(), http)
    }

    fn quick_retry() -> RetryConfig {
        crate::retry::RetryBuilder::new()
            .max_attempts(4)
            .initial_delay(1)
            .with_jitter(false)
            .build()
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: RemoteConfig = serde_json::from_str(r#"{"enabled": true}"#).unwrap();
        assert_eq!(config, RemoteConfig::default());
        assert_eq!(config.send_interval(), Duration::from_secs(120));
    }

    #[test]
    fn test_poll_delay_is_at_least_one_minute() {
        let config: RemoteConfig =
            serde_json::from_str(r#"{"enabled": false, "polling_time": 0}"#).unwrap();
        assert_eq!(config.poll_delay(), Duration::from_secs(60));
    }

    #[test]
    fn test_huge_poll_delay_saturates() {
        let config = RemoteConfig {
            enabled: false,
            polling_time: u64::MAX,
            ..RemoteConfig::default()
        };
        assert_eq!(config.poll_delay(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_registry_follows_monitor_switches() {
        let config: RemoteConfig =
            serde_json::from_str(r#"{"monitor_enabled": {"processes": false}}"#).unwrap();
        let registry = config.registry();
        assert!(!registry.is_enabled("processes"));
        assert!(registry.is_enabled("cpu"));
    }

    #[test]
    fn test_detect_fills_every_field() {
        let info = HostInfo::detect();
        assert_eq!(info.arch, std::env::consts::ARCH);
        assert!(!info.dist.is_empty());
        assert!(!info.cpu.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_sends_host_info_and_parses_body() {
        let server = StubServer::start(StubResponse::json(
            200,
            r#"{"enabled": true, "polling_time": 2, "send_throttle": 30, "monitor_enabled": {"ip": false}}"#,
        ))
        .await;

        let config = client(&server).fetch().await.unwrap();
        assert_eq!(config.send_throttle, 30);
        assert_eq!(config.monitor_enabled.get("ip"), Some(&false));

        let requests = server.requests();
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].path, "/client/config/web01/s3cret");
        let query = requests[0].query.clone().unwrap();
        assert!(query.contains("arch=x86_64"));
        assert!(query.contains("cpu=Test+CPU"));
    }

    #[tokio::test]
    async fn test_client_error_is_a_rejection() {
        let server = StubServer::start(StubResponse::status(403)).await;
        let err = client(&server).fetch().await.unwrap_err();
        assert!(matches!(err, AgentError::Rejected { status: 403 }));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = StubServer::start_sequence(vec![
            StubResponse::status(503),
            StubResponse::status(502),
            StubResponse::json(200, r#"{"send_throttle": 10}"#),
        ])
        .await;
        let sink = MemorySink::new();
        let logger = Logger::with_sink(sink.clone(), "config");

        let config = await_enabled(
            &client(&server),
            &quick_retry(),
            &logger,
            &mut ShutdownListener::never(),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(config.send_throttle, 10);
        assert_eq!(server.requests().len(), 3);
        assert_eq!(sink.matching(Level::Warn, "HTTP 503").len(), 1);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let server = StubServer::start(StubResponse::status(401)).await;
        let logger = Logger::with_sink(MemorySink::new(), "config");

        let err = await_enabled(
            &client(&server),
            &quick_retry(),
            &logger,
            &mut ShutdownListener::never(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AgentError::Rejected { status: 401 }));
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_client_waits_until_shutdown() {
        let server = StubServer::start(StubResponse::json(200, r#"{"enabled": false}"#)).await;
        let sink = MemorySink::new();
        let logger = Logger::with_sink(sink.clone(), "config");
        let shutdown = Shutdown::new();
        let mut listener = shutdown.listener();
        let client = client(&server);

        let retry = quick_retry();
        let waiting = await_enabled(&client, &retry, &logger, &mut listener);
        let trigger = async {
            while sink.matching(Level::Warn, "disabled by server").is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            shutdown.trigger();
        };

        let (outcome, _) = tokio::join!(waiting, trigger);
        assert_eq!(outcome.unwrap(), None);
        assert_eq!(server.requests().len(), 1);
        assert_eq!(sink.matching(Level::Warn, "disabled by server").len(), 1);
    }
}
