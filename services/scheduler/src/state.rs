//! Application state shared across request handlers.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::scheduler::Scheduler;
use crate::worker::SchedulerEvent;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    scheduler: Arc<Mutex<Scheduler>>,
    events: mpsc::Sender<SchedulerEvent>,
    dev_mode: bool,
}

impl AppState {
    pub fn new(
        scheduler: Arc<Mutex<Scheduler>>,
        events: mpsc::Sender<SchedulerEvent>,
        dev_mode: bool,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                scheduler,
                events,
                dev_mode,
            }),
        }
    }

    pub fn scheduler(&self) -> &Arc<Mutex<Scheduler>> {
        &self.inner.scheduler
    }

    /// Sender feeding the scheduler worker.
    pub fn events(&self) -> &mpsc::Sender<SchedulerEvent> {
        &self.inner.events
    }

    /// Whether the ingestion endpoints are mounted.
    pub fn dev_mode(&self) -> bool {
        self.inner.dev_mode
    }
}
