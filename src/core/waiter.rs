use crate::config::env::Settings;
use crate::domain::model::ServiceEndpoint;
use crate::domain::ports::{Probe, Sleeper};
use chrono::{DateTime, Local};
use std::time::Duration;

const DATE_FORMAT: &str = "%a %b %e %H:%M:%S %Z %Y";

#[derive(Debug, Clone)]
pub struct WaitReport {
    pub endpoint: ServiceEndpoint,
    pub failed_attempts: u64,
    pub started_at: DateTime<Local>,
    pub connected_at: DateTime<Local>,
}

impl WaitReport {
    pub fn waited(&self) -> chrono::Duration {
        self.connected_at - self.started_at
    }
}

/// Blocks until endpoints accept TCP connections. There is no retry limit:
/// an endpoint that never comes up keeps the caller waiting forever.
pub struct ReadinessWaiter<P: Probe, S: Sleeper> {
    probe: P,
    sleeper: S,
    interval: Duration,
}

impl<P: Probe, S: Sleeper> ReadinessWaiter<P, S> {
    pub fn new(probe: P, sleeper: S, interval: Duration) -> Self {
        Self {
            probe,
            sleeper,
            interval,
        }
    }

    pub async fn wait(&self, endpoint: &ServiceEndpoint) -> WaitReport {
        let started_at = Local::now();
        let mut failed_attempts = 0;

        loop {
            match self.probe.connect(endpoint).await {
                Ok(()) => {
                    let connected_at = Local::now();
                    tracing::info!(
                        "{} - connected to {} {}",
                        connected_at.format(DATE_FORMAT),
                        endpoint.host,
                        endpoint.port
                    );
                    return WaitReport {
                        endpoint: endpoint.clone(),
                        failed_attempts,
                        started_at,
                        connected_at,
                    };
                }
                Err(e) => {
                    failed_attempts += 1;
                    tracing::info!(
                        "{} - waiting to connect {} {}",
                        Local::now().format(DATE_FORMAT),
                        endpoint.host,
                        endpoint.port
                    );
                    tracing::debug!("{} probe failed: {}", endpoint.service, e);
                    self.sleeper.sleep(self.interval).await;
                }
            }
        }
    }

    /// Waits for every enabled service, one after the other, in wait order.
    pub async fn wait_for_services(&self, settings: &Settings) -> Vec<WaitReport> {
        let mut reports = Vec::new();
        for endpoint in settings.wait_targets() {
            let report = self.wait(&endpoint).await;
            tracing::debug!(
                "{} ready after {} failed attempts ({}s)",
                endpoint.service,
                report.failed_attempts,
                report.waited().num_seconds()
            );
            reports.push(report);
        }
        reports
    }
}
