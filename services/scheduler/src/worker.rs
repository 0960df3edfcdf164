//! Scheduler event worker.
//!
//! Every offer batch, status update and spec change goes through one
//! channel, so the scheduler only ever sees one event at a time. A periodic
//! tick refreshes the decommission plan and the offer interest between
//! batches.

use std::sync::Arc;
use std::time::Duration;

use keel_cluster::{Offer, TaskStatus};
use keel_id::FrameworkId;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, instrument, warn};

use crate::error::SchedulerError;
use crate::scheduler::Scheduler;
use crate::spec::ServiceSpec;

/// Capacity of the event channel.
pub const EVENT_BUFFER: usize = 256;

/// Input from the cluster manager or an operator.
#[derive(Debug)]
pub enum SchedulerEvent {
    Registered(FrameworkId),
    Offers(Vec<Offer>),
    Status(TaskStatus),
    SpecUpdated(Box<ServiceSpec>),
}

impl SchedulerEvent {
    fn kind(&self) -> &'static str {
        match self {
            Self::Registered(_) => "registered",
            Self::Offers(_) => "offers",
            Self::Status(_) => "status",
            Self::SpecUpdated(_) => "spec_updated",
        }
    }
}

/// Drains scheduler events until shutdown is signaled.
pub struct SchedulerWorker {
    scheduler: Arc<Mutex<Scheduler>>,
    events: mpsc::Receiver<SchedulerEvent>,
    interval: Duration,
}

impl SchedulerWorker {
    pub fn new(
        scheduler: Arc<Mutex<Scheduler>>,
        events: mpsc::Receiver<SchedulerEvent>,
        interval: Duration,
    ) -> Self {
        Self {
            scheduler,
            events,
            interval,
        }
    }

    /// Run the worker until shutdown is signaled or the event channel closes.
    ///
    /// Returns an error only when the scheduler hit a fatal condition.
    #[instrument(skip(self, shutdown))]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), SchedulerError> {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting scheduler worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                event = self.events.recv() => {
                    let Some(event) = event else {
                        info!("Event channel closed, scheduler worker stopping");
                        break;
                    };
                    self.handle(event).await?;
                }
                _ = interval.tick() => {
                    self.scheduler.lock().await.tick();
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Scheduler worker shutting down");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle(&self, event: SchedulerEvent) -> Result<(), SchedulerError> {
        debug!(event = event.kind(), "Handling scheduler event");
        let mut scheduler = self.scheduler.lock().await;

        let result = match event {
            SchedulerEvent::Registered(id) => scheduler.register(id),
            SchedulerEvent::Offers(offers) => {
                let total = offers.len();
                let used = scheduler.process_offers(offers);
                if !used.is_empty() {
                    info!(offers = total, used = used.len(), "Offer batch processed");
                }
                Ok(())
            }
            SchedulerEvent::Status(status) => scheduler.process_status(status),
            SchedulerEvent::SpecUpdated(spec) => scheduler.update_service_spec(*spec),
        };

        match result {
            Err(e) if e.is_fatal() => {
                error!(error = %e, "Fatal scheduler error");
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "Scheduler event failed");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverCall, RecordingDriver};
    use crate::scheduler::SchedulerOptions;
    use crate::spec::fixtures;
    use crate::store::MemoryStateStore;

    fn scheduler(driver: Arc<RecordingDriver>) -> Arc<Mutex<Scheduler>> {
        let scheduler = Scheduler::new(
            fixtures::service(vec![fixtures::pod("node", 1)]),
            Arc::new(MemoryStateStore::new()),
            driver,
            SchedulerOptions::default(),
        )
        .unwrap();
        Arc::new(Mutex::new(scheduler))
    }

    #[tokio::test]
    async fn test_worker_handles_registration() {
        let driver = Arc::new(RecordingDriver::new());
        let scheduler = scheduler(driver.clone());
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = SchedulerWorker::new(scheduler.clone(), rx, Duration::from_secs(60));
        let handle = tokio::spawn(worker.run(shutdown_rx));

        let id = FrameworkId::new();
        tx.send(SchedulerEvent::Registered(id)).await.unwrap();
        drop(tx);
        handle.await.unwrap().unwrap();

        assert_eq!(scheduler.lock().await.framework_id(), Some(id));
        assert_eq!(driver.calls(), vec![DriverCall::Revive]);
    }

    #[tokio::test]
    async fn test_worker_stops_on_shutdown() {
        let driver = Arc::new(RecordingDriver::new());
        let (_tx, rx) = mpsc::channel(EVENT_BUFFER);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = SchedulerWorker::new(scheduler(driver), rx, Duration::from_secs(60));
        let handle = tokio::spawn(worker.run(shutdown_rx));
        shutdown_tx.send(true).unwrap();

        assert!(handle.await.unwrap().is_ok());
    }
}
