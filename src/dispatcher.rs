//! Periodic drain-and-send loop
use std::time::Duration;

use crate::delivery::DeliveryClient;
use crate::error::{AgentError, Result};
use crate::queue::MeasurementQueue;
use crate::shutdown::ShutdownListener;
use crate::util::logging::Logger;

/// Pause between send cycles when the server does not say otherwise
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Sleep between the end of one cycle and the start of the next
    pub send_interval: Duration,
    /// Run one last cycle when shutdown is requested
    pub flush_on_shutdown: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            send_interval: DEFAULT_SEND_INTERVAL,
            flush_on_shutdown: true,
        }
    }
}

impl DispatcherConfig {
    pub fn new(send_interval: Duration) -> Result<Self> {
        if send_interval.is_zero() {
            return Err(AgentError::Config(
                "send interval must be positive".to_string(),
            ));
        }
        Ok(Self {
            send_interval,
            ..Self::default()
        })
    }

    /// From the server's `send_throttle`, in seconds
    pub fn from_send_throttle(seconds: u64) -> Result<Self> {
        Self::new(Duration::from_secs(seconds))
    }

    pub fn flush_on_shutdown(mut self, flush: bool) -> Self {
        self.flush_on_shutdown = flush;
        self
    }
}

/// Result of a single drain-and-send cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing was queued, no call was made
    Idle,
    /// The server answered; any status counts
    Delivered { count: usize, status: u16 },
    /// The batch could not be delivered and was dropped
    Discarded { count: usize, reason: String },
}

/// Totals accumulated by [`Dispatcher::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub cycles: u64,
    pub delivered: u64,
    pub discarded: u64,
    /// Measurements in delivered batches
    pub sent: u64,
    /// Measurements in discarded batches
    pub lost: u64,
}

impl DispatchReport {
    fn record(&mut self, outcome: &CycleOutcome) {
        self.cycles += 1;
        match outcome {
            CycleOutcome::Idle => {}
            CycleOutcome::Delivered { count, .. } => {
                self.delivered += 1;
                self.sent += *count as u64;
            }
            CycleOutcome::Discarded { count, .. } => {
                self.discarded += 1;
                self.lost += *count as u64;
            }
        }
    }
}

/// Single consumer of the measurement queue.
///
/// Each cycle drains everything queued at that moment and hands it to the
/// delivery client in one call. A batch that fails to go out is dropped; it
/// is never put back in the queue.
pub struct Dispatcher<D: DeliveryClient> {
    queue: MeasurementQueue,
    client: D,
    config: DispatcherConfig,
    logger: Logger,
    report: DispatchReport,
}

impl<D: DeliveryClient> Dispatcher<D> {
    pub fn new(
        queue: MeasurementQueue,
        client: D,
        config: DispatcherConfig,
        logger: Logger,
    ) -> Self {
        Self {
            queue,
            client,
            config,
            logger,
            report: DispatchReport::default(),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn report(&self) -> DispatchReport {
        self.report
    }

    /// Drain the queue and send whatever was there
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let batch = self.queue.drain();
        let outcome = if batch.is_empty() {
            self.logger.trace(format_args!("Nothing to send"));
            CycleOutcome::Idle
        } else {
            let count = batch.len();
            self.logger.debug(format_args!(
                "Sending {} measurements via {}",
                count,
                self.client.name()
            ));

            match self.client.deliver(&batch).await {
                Ok(receipt) => {
                    if receipt.is_success() {
                        self.logger.info(format_args!(
                            "Delivered {} measurements (HTTP {})",
                            count, receipt.status
                        ));
                    } else {
                        self.logger.warn(format_args!(
                            "Server answered HTTP {} for {} measurements",
                            receipt.status, count
                        ));
                    }
                    CycleOutcome::Delivered {
                        count,
                        status: receipt.status,
                    }
                }
                Err(e) => {
                    self.logger.error(format_args!(
                        "Failed to send {} measurements, discarding batch: {}",
                        count, e
                    ));
                    CycleOutcome::Discarded {
                        count,
                        reason: e.to_string(),
                    }
                }
            }
        };

        self.report.record(&outcome);
        outcome
    }

    /// Cycle until `shutdown` fires, then optionally flush once more
    pub async fn run(mut self, mut shutdown: ShutdownListener) -> DispatchReport {
        self.logger.info(format_args!(
            "Dispatcher started, sending every {:?}",
            self.config.send_interval
        ));

        loop {
            if shutdown.is_triggered() {
                break;
            }

            self.run_cycle().await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.send_interval) => {}
                _ = shutdown.triggered() => break,
            }
        }

        if self.config.flush_on_shutdown {
            self.logger.debug(format_args!("Final flush before shutdown"));
            self.run_cycle().await;
        }

        let report = self.report;
        self.logger.info(format_args!(
            "Dispatcher stopped after {} cycles: {} sent, {} lost",
            report.cycles, report.sent, report.lost
        ));
        report
    }
}

/// Drive a dispatcher over `queue` until `shutdown` fires
pub async fn run_dispatcher<D: DeliveryClient>(
    queue: MeasurementQueue,
    send_interval: Duration,
    client: D,
    logger: Logger,
    shutdown: ShutdownListener,
) -> Result<DispatchReport> {
    let config = DispatcherConfig::new(send_interval)?;
    Ok(Dispatcher::new(queue, client, config, logger)
        .run(shutdown)
        .await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::DeliveryReceipt;
    use crate::measurement::{Measurement, MeasurementKind};
    use crate::shutdown::Shutdown;
    use crate::util::logging::MemorySink;
    use async_trait::async_trait;
    use log::Level;
    use std::sync::{Arc, Mutex};

    /// Records every batch and answers with a fixed result
    struct Recording {
        batches: Mutex<Vec<Vec<Measurement>>>,
        status: Option<u16>,
    }

    impl Recording {
        fn answering(status: u16) -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(Vec::new()),
                status: Some(status),
            })
        }

        fn refusing() -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(Vec::new()),
                status: None,
            })
        }

        fn calls(&self) -> usize {
            self.batches.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DeliveryClient for Recording {
        async fn deliver(&self, batch: &[Measurement]) -> Result<DeliveryReceipt> {
            self.batches.lock().unwrap().push(batch.to_vec());
            match self.status {
                Some(status) => Ok(DeliveryReceipt { status }),
                None => Err(AgentError::Connection("connection refused".into())),
            }
        }
    }

    fn measurement(value: u32) -> Measurement {
        Measurement::capture("load", MeasurementKind::Point, &value).unwrap()
    }

    fn dispatcher(
        queue: &MeasurementQueue,
        client: Arc<Recording>,
        sink: &Arc<MemorySink>,
    ) -> Dispatcher<Arc<Recording>> {
        Dispatcher::new(
            queue.clone(),
            client,
            DispatcherConfig::new(Duration::from_millis(10)).unwrap(),
            Logger::with_sink(sink.clone(), "dispatcher"),
        )
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        assert!(matches!(
            DispatcherConfig::new(Duration::ZERO),
            Err(AgentError::Config(_))
        ));
        assert_eq!(
            DispatcherConfig::from_send_throttle(30).unwrap().send_interval,
            Duration::from_secs(30)
        );
    }

    #[tokio::test]
    async fn test_empty_queue_makes_no_call() {
        let queue = MeasurementQueue::new();
        let client = Recording::answering(200);
        let sink = MemorySink::new();
        let mut dispatcher = dispatcher(&queue, client.clone(), &sink);

        for _ in 0..3 {
            assert_eq!(dispatcher.run_cycle().await, CycleOutcome::Idle);
        }
        assert_eq!(client.calls(), 0);
        assert_eq!(dispatcher.report().cycles, 3);
    }

    #[tokio::test]
    async fn test_cycle_sends_everything_queued_in_one_call() {
        let queue = MeasurementQueue::new();
        let client = Recording::answering(200);
        let sink = MemorySink::new();
        let mut dispatcher = dispatcher(&queue, client.clone(), &sink);

        for value in 0..4 {
            queue.push(measurement(value));
        }

        assert_eq!(
            dispatcher.run_cycle().await,
            CycleOutcome::Delivered {
                count: 4,
                status: 200
            }
        );
        assert!(queue.is_empty());
        assert_eq!(client.calls(), 1);
        assert_eq!(client.batches.lock().unwrap()[0].len(), 4);
    }

    #[tokio::test]
    async fn test_failed_batch_is_discarded_not_replayed() {
        let queue = MeasurementQueue::new();
        let client = Recording::refusing();
        let sink = MemorySink::new();
        let mut dispatcher = dispatcher(&queue, client.clone(), &sink);

        queue.push(measurement(1));
        assert!(matches!(
            dispatcher.run_cycle().await,
            CycleOutcome::Discarded { count: 1, .. }
        ));

        queue.push(measurement(2));
        dispatcher.run_cycle().await;
        queue.push(measurement(3));
        dispatcher.run_cycle().await;

        let batches = client.batches.lock().unwrap().clone();
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|batch| batch.len() == 1));
        assert_eq!(batches[2][0].payload(), "3");
        assert_eq!(dispatcher.report().lost, 3);
        assert_eq!(sink.matching(Level::Error, "discarding batch").len(), 3);
    }

    #[tokio::test]
    async fn test_error_status_counts_as_delivered() {
        let queue = MeasurementQueue::new();
        let client = Recording::answering(503);
        let sink = MemorySink::new();
        let mut dispatcher = dispatcher(&queue, client.clone(), &sink);

        queue.push(measurement(1));
        assert_eq!(
            dispatcher.run_cycle().await,
            CycleOutcome::Delivered {
                count: 1,
                status: 503
            }
        );
        assert_eq!(sink.matching(Level::Warn, "HTTP 503").len(), 1);

        dispatcher.run_cycle().await;
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_run_keeps_cycling_and_flushes_on_shutdown() {
        let queue = MeasurementQueue::new();
        let client = Recording::refusing();
        let sink = MemorySink::new();
        let shutdown = Shutdown::new();

        let task = tokio::spawn(
            dispatcher(&queue, client.clone(), &sink).run(shutdown.listener()),
        );

        while client.calls() < 3 {
            queue.push(measurement(0));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        queue.push(measurement(99));
        shutdown.trigger();
        let report = task.await.unwrap();

        assert!(report.cycles >= 3);
        assert!(report.discarded >= 3);
        assert!(queue.is_empty());
        assert_eq!(report.sent, 0);
    }
}
