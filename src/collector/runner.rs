//! Thread-per-collector execution harness
use std::any::Any;
use std::collections::HashSet;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use super::core::Collector;
use crate::error::{AgentError, Result};
use crate::measurement::{Measurement, MeasurementKind};
use crate::queue::{MeasurementQueue, Pushed, QueueConfig};
use crate::shutdown::ShutdownListener;
use crate::util::logging::Logger;

/// How a runner's loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerOutcome {
    /// The collector's sequence finished
    Exhausted { produced: u64 },
    /// The collector failed, panicked or yielded an unserializable value
    Faulted { produced: u64, error: String },
    /// Shutdown was requested
    Cancelled { produced: u64 },
}

impl RunnerOutcome {
    /// Measurements handed to the queue before the runner stopped
    pub fn produced(&self) -> u64 {
        match self {
            RunnerOutcome::Exhausted { produced }
            | RunnerOutcome::Faulted { produced, .. }
            | RunnerOutcome::Cancelled { produced } => *produced,
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, RunnerOutcome::Faulted { .. })
    }
}

/// Drives one collector and feeds the shared queue
pub struct CollectorRunner<C: Collector> {
    collector: C,
    queue: MeasurementQueue,
    logger: Logger,
    shutdown: ShutdownListener,
}

impl<C: Collector> CollectorRunner<C> {
    pub fn new(collector: C, queue: MeasurementQueue, logger: Logger) -> Self {
        Self {
            collector,
            queue,
            logger,
            shutdown: ShutdownListener::never(),
        }
    }

    /// Stop at the next iteration boundary once `shutdown` fires
    pub fn with_shutdown(mut self, shutdown: ShutdownListener) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Consume the collector's sequence until it ends, fails or is cancelled.
    ///
    /// For a well-behaved collector this never returns on its own.
    pub fn run(mut self) -> RunnerOutcome {
        let name = Collector::name(&self.collector).to_string();
        let kind = Collector::kind(&self.collector);
        let mut produced = 0u64;

        self.logger
            .info(format_args!("Collector {} ({}) started", name, kind));

        let outcome = loop {
            if self.shutdown.is_triggered() {
                break RunnerOutcome::Cancelled { produced };
            }

            let collector = &mut self.collector;
            let point = match panic::catch_unwind(AssertUnwindSafe(|| collector.next_point())) {
                Ok(Ok(Some(point))) => point,
                Ok(Ok(None)) => break RunnerOutcome::Exhausted { produced },
                Ok(Err(e)) => {
                    break RunnerOutcome::Faulted {
                        produced,
                        error: e.to_string(),
                    };
                }
                Err(payload) => {
                    break RunnerOutcome::Faulted {
                        produced,
                        error: format!("collector panicked: {}", panic_message(payload.as_ref())),
                    };
                }
            };

            let measurement = match Measurement::capture(&name, kind, &point) {
                Ok(measurement) => measurement,
                Err(e) => {
                    break RunnerOutcome::Faulted {
                        produced,
                        error: e.to_string(),
                    };
                }
            };

            match self.queue.push(measurement) {
                Pushed::Enqueued => {}
                Pushed::DisplacedOldest(evicted) => self.logger.warn(format_args!(
                    "Queue full, dropped oldest measurement from {} taken at {}",
                    evicted.name(),
                    evicted.timestamp()
                )),
                Pushed::Rejected(rejected) => self.logger.warn(format_args!(
                    "Queue full, rejected measurement from {} taken at {}",
                    rejected.name(),
                    rejected.timestamp()
                )),
            }
            produced += 1;
            self.logger
                .trace(format_args!("Collector {} queued measurement #{}", name, produced));
        };

        match &outcome {
            RunnerOutcome::Faulted { produced, error } => self.logger.error(format_args!(
                "Collector {} stopped after {} measurements: {}",
                name, produced, error
            )),
            RunnerOutcome::Exhausted { produced } => self.logger.warn(format_args!(
                "Collector {} finished after {} measurements",
                name, produced
            )),
            RunnerOutcome::Cancelled { produced } => self.logger.info(format_args!(
                "Collector {} cancelled after {} measurements",
                name, produced
            )),
        }

        outcome
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Object-safe view of any [`Collector`], so collectors with different
/// payload types can be started together
pub trait RunnableCollector: Send {
    fn name(&self) -> &str;

    fn kind(&self) -> MeasurementKind;

    /// Run the collector to completion on the current thread
    fn run_boxed(
        self: Box<Self>,
        queue: MeasurementQueue,
        logger: Logger,
        shutdown: ShutdownListener,
    ) -> RunnerOutcome;
}

impl<C: Collector> RunnableCollector for C {
    fn name(&self) -> &str {
        Collector::name(self)
    }

    fn kind(&self) -> MeasurementKind {
        Collector::kind(self)
    }

    fn run_boxed(
        self: Box<Self>,
        queue: MeasurementQueue,
        logger: Logger,
        shutdown: ShutdownListener,
    ) -> RunnerOutcome {
        CollectorRunner::new(*self, queue, logger)
            .with_shutdown(shutdown)
            .run()
    }
}

/// A type-erased collector ready to be started
pub type BoxedCollector = Box<dyn RunnableCollector>;

/// Box a collector for [`start_all_collectors`]
pub fn boxed<C: Collector>(collector: C) -> BoxedCollector {
    Box::new(collector)
}

/// Join handle of one runner thread
pub struct RunnerHandle {
    name: String,
    handle: JoinHandle<RunnerOutcome>,
}

impl RunnerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the runner thread to end
    pub fn join(self) -> RunnerOutcome {
        self.handle
            .join()
            .unwrap_or_else(|payload| RunnerOutcome::Faulted {
                produced: 0,
                error: format!("runner thread panicked: {}", panic_message(payload.as_ref())),
            })
    }
}

/// The set of running collectors and the queue they feed
pub struct CollectorHarness {
    queue: MeasurementQueue,
    runners: Vec<RunnerHandle>,
}

impl CollectorHarness {
    /// Spawn one named thread per collector, all feeding `queue`.
    ///
    /// Either every runner starts or none does: if a thread cannot be
    /// spawned, the runners already spawned exit before collecting and are
    /// joined before the error is returned.
    pub fn start(
        queue: MeasurementQueue,
        collectors: Vec<BoxedCollector>,
        logger: &Logger,
        shutdown: ShutdownListener,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        for collector in &collectors {
            if !seen.insert(collector.name().to_string()) {
                return Err(AgentError::Config(format!(
                    "Duplicate collector name: {}",
                    collector.name()
                )));
            }
        }

        let runners = spawn_runners(&queue, collectors, logger, &shutdown, |name, job| {
            thread::Builder::new()
                .name(format!("collector-{}", name))
                .spawn(job)
        })?;

        logger.info(format_args!(
            "Started {} collector threads: {}",
            runners.len(),
            runners
                .iter()
                .map(|r| r.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));

        Ok(Self { queue, runners })
    }

    /// Another handle to the shared queue
    pub fn queue(&self) -> MeasurementQueue {
        self.queue.clone()
    }

    pub fn names(&self) -> Vec<&str> {
        self.runners.iter().map(RunnerHandle::name).collect()
    }

    /// Runners whose thread is still alive
    pub fn active_count(&self) -> usize {
        self.runners.iter().filter(|r| !r.is_finished()).count()
    }

    /// Reap runners that have already ended
    pub fn join_finished(&mut self) -> Vec<(String, RunnerOutcome)> {
        let (finished, running): (Vec<_>, Vec<_>) = self
            .runners
            .drain(..)
            .partition(RunnerHandle::is_finished);
        self.runners = running;
        finished
            .into_iter()
            .map(|r| (r.name.clone(), r.join()))
            .collect()
    }

    /// Block until every runner has ended
    pub fn join_all(self) -> Vec<(String, RunnerOutcome)> {
        self.runners
            .into_iter()
            .map(|r| (r.name.clone(), r.join()))
            .collect()
    }
}

type RunnerJob = Box<dyn FnOnce() -> RunnerOutcome + Send>;

/// Spawn a thread per collector with `spawn`. Each thread waits at a gate
/// that opens only once all of them exist.
fn spawn_runners<S>(
    queue: &MeasurementQueue,
    collectors: Vec<BoxedCollector>,
    logger: &Logger,
    shutdown: &ShutdownListener,
    mut spawn: S,
) -> Result<Vec<RunnerHandle>>
where
    S: FnMut(&str, RunnerJob) -> io::Result<JoinHandle<RunnerOutcome>>,
{
    let runner_logger = logger.scoped("runner");
    let mut runners = Vec::with_capacity(collectors.len());
    let mut gates = Vec::with_capacity(collectors.len());

    for collector in collectors {
        let name = collector.name().to_string();
        let queue = queue.clone();
        let scoped = runner_logger.scoped(&name);
        let shutdown = shutdown.clone();
        let (gate, opened) = mpsc::channel::<()>();

        let job: RunnerJob = Box::new(move || {
            if opened.recv().is_err() {
                return RunnerOutcome::Cancelled { produced: 0 };
            }
            collector.run_boxed(queue, scoped, shutdown)
        });

        match spawn(&name, job) {
            Ok(handle) => {
                runners.push(RunnerHandle { name, handle });
                gates.push(gate);
            }
            Err(e) => {
                logger.error(format_args!(
                    "Failed to spawn collector {}: {}; stopping {} already spawned",
                    name,
                    e,
                    runners.len()
                ));
                drop(gates);
                for runner in runners {
                    runner.join();
                }
                return Err(e.into());
            }
        }
    }

    for gate in gates {
        // A closed gate means the thread already ended; its join reports it
        gate.send(()).ok();
    }
    Ok(runners)
}

/// Start every collector on its own thread and return the harness holding
/// the shared queue they all feed
pub fn start_all_collectors(
    collectors: Vec<BoxedCollector>,
    queue_config: QueueConfig,
    logger: &Logger,
    shutdown: ShutdownListener,
) -> Result<CollectorHarness> {
    CollectorHarness::start(
        MeasurementQueue::with_config(queue_config),
        collectors,
        logger,
        shutdown,
    )
}
