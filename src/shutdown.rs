//! Cooperative cancellation shared by runners and the dispatcher
use std::sync::Arc;
use tokio::sync::watch;

/// Owner side of the shutdown signal
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown; idempotent
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// A listener that observes this signal
    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of the shutdown signal.
///
/// `is_triggered` is a plain read usable from runner threads; `triggered`
/// is for async code.
#[derive(Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// A listener that is never triggered
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested.
    ///
    /// Never resolves when the owning [`Shutdown`] is gone without triggering.
    pub async fn triggered(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_listener_sees_trigger() {
        let shutdown = Shutdown::new();
        let listener = shutdown.listener();
        assert!(!listener.is_triggered());

        shutdown.trigger();
        assert!(listener.is_triggered());
        assert!(shutdown.listener().is_triggered());
    }

    #[tokio::test]
    async fn test_triggered_resolves_after_trigger() {
        let shutdown = Shutdown::new();
        let mut listener = shutdown.listener();

        let signal = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            signal.trigger();
        });

        tokio::time::timeout(Duration::from_secs(5), listener.triggered())
            .await
            .expect("listener should resolve once triggered");
    }

    #[tokio::test]
    async fn test_never_listener_stays_pending() {
        let mut listener = ShutdownListener::never();
        let result = tokio::time::timeout(Duration::from_millis(30), listener.triggered()).await;
        assert!(result.is_err());
        assert!(!listener.is_triggered());
    }
}
