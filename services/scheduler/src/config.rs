use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::scheduler::SchedulerOptions;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub dev_mode: bool,
    /// Directory holding the sqlite state file; in-memory state when unset.
    pub data_dir: Option<PathBuf>,
    pub service_spec: Option<PathBuf>,
    pub framework_name: String,
    pub tick_interval: Duration,
    pub permanent_launch_delay: Duration,
    pub permanent_failure_timeout: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("KEEL_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()?;

        let log_level = std::env::var("KEEL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let dev_mode = std::env::var("KEEL_DEV")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let data_dir = std::env::var("KEEL_DATA_DIR").ok().map(PathBuf::from);
        let service_spec = std::env::var("KEEL_SERVICE_SPEC").ok().map(PathBuf::from);

        let framework_name =
            std::env::var("KEEL_FRAMEWORK_NAME").unwrap_or_else(|_| "keel".to_string());

        let tick_interval = secs_var("KEEL_TICK_INTERVAL_SECS")?.unwrap_or(Duration::from_secs(5));
        let permanent_launch_delay = secs_var("KEEL_PERMANENT_LAUNCH_DELAY_SECS")?
            .unwrap_or(Duration::from_secs(600));
        let permanent_failure_timeout = secs_var("KEEL_PERMANENT_FAILURE_TIMEOUT_SECS")?;

        Ok(Self {
            listen_addr,
            log_level,
            dev_mode,
            data_dir,
            service_spec,
            framework_name,
            tick_interval,
            permanent_launch_delay,
            permanent_failure_timeout,
        })
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            permanent_launch_delay: self.permanent_launch_delay,
            permanent_failure_timeout: self.permanent_failure_timeout,
        }
    }
}

fn secs_var(name: &str) -> Result<Option<Duration>> {
    match std::env::var(name) {
        Ok(raw) => {
            let secs: u64 = raw
                .parse()
                .with_context(|| format!("{name} must be a number of seconds"))?;
            Ok(Some(Duration::from_secs(secs)))
        }
        Err(_) => Ok(None),
    }
}
