//! Reconciliation loop
//!
//! The driver repeats [`Deployer::apply`] until the deploy converges,
//! backing off exponentially with jitter between unsuccessful passes. With a
//! resync interval it keeps running after convergence so drift is corrected.

use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vdeploy_core::DesiredState;
use vdeploy_engine::TemplateEngine;

use crate::cluster::ClusterClient;
use crate::deployer::Deployer;
use crate::helm::HelmClient;

/// Loop timing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Delay after the first unsuccessful pass
    pub initial_delay: Duration,
    /// Upper bound for the backoff delay
    pub max_delay: Duration,
    /// Re-run converged deploys this often; `None` stops after convergence
    pub resync_interval: Option<Duration>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            resync_interval: None,
        }
    }
}

/// Exponential backoff, doubled per step and capped
#[derive(Debug, Clone)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    const MULTIPLIER: u32 = 2;

    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial.min(max),
        }
    }

    /// Delay for this attempt with 0.5x to 1.5x jitter, then advance
    fn next_delay(&mut self) -> Duration {
        let jitter = rand::rng().random_range(0.5..1.5);
        let delay = Duration::from_secs_f64(self.current.as_secs_f64() * jitter).min(self.max);
        self.current = self
            .current
            .saturating_mul(Self::MULTIPLIER)
            .min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial.min(self.max);
    }
}

/// How a driver run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverOutcome {
    /// The deploy converged and no resync was configured
    Converged,
    /// The cancellation token fired
    Cancelled,
}

/// Drives a [`Deployer`] towards the desired state
pub struct Driver<H, C, E> {
    deployer: Deployer<H, C, E>,
    desired: DesiredState,
    config: DriverConfig,
}

impl<H, C, E> Driver<H, C, E>
where
    H: HelmClient,
    C: ClusterClient + Clone,
    E: TemplateEngine,
{
    pub fn new(deployer: Deployer<H, C, E>, desired: DesiredState, config: DriverConfig) -> Self {
        Self {
            deployer,
            desired,
            config,
        }
    }

    pub fn deployer(&self) -> &Deployer<H, C, E> {
        &self.deployer
    }

    /// Run passes until convergence (or forever with a resync interval)
    pub async fn run(&self, cancel: CancellationToken) -> DriverOutcome {
        let mut backoff = Backoff::new(self.config.initial_delay, self.config.max_delay);
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return DriverOutcome::Cancelled;
            }
            attempt += 1;

            let requeue = match self.deployer.apply(&self.desired, &cancel).await {
                Ok(requeue) => requeue,
                Err(e) => {
                    warn!(attempt, error = %e, "deploy pass failed");
                    true
                }
            };

            let wait = if requeue {
                let delay = backoff.next_delay();
                debug!(attempt, delay_ms = delay.as_millis(), "requeueing deploy");
                delay
            } else {
                backoff.reset();
                attempt = 0;
                match self.config.resync_interval {
                    Some(interval) => {
                        debug!(interval_secs = interval.as_secs(), "deploy converged, waiting for resync");
                        interval
                    }
                    None => {
                        info!("deploy converged");
                        return DriverOutcome::Converged;
                    }
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => return DriverOutcome::Cancelled,
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}
