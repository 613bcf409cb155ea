//! Settling: the pause between starting the coordinator and starting the
//! workers.
//!
//! The plain policy is a fixed delay. The probe policy polls the
//! coordinator's listening endpoint with TCP connects until one succeeds or
//! a deadline passes, then falls back to the fixed delay.

use std::fmt;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

/// Default fixed settle delay.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(2);

/// How to wait for the coordinator before starting workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlePolicy {
    /// Sleep for a fixed interval and assume the coordinator is ready.
    Delay(Duration),
    /// Poll `address` until a TCP connect succeeds.
    Probe {
        /// `host:port` of the coordinator's listening endpoint.
        address: String,
        /// Pause between connect attempts.
        interval: Duration,
        /// Give up probing after this long.
        timeout: Duration,
        /// Fixed delay used when the probe gives up.
        fallback: Duration,
    },
}

impl Default for SettlePolicy {
    fn default() -> Self {
        SettlePolicy::Delay(DEFAULT_DELAY)
    }
}

impl fmt::Display for SettlePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlePolicy::Delay(delay) => write!(f, "fixed delay of {}ms", delay.as_millis()),
            SettlePolicy::Probe {
                address,
                timeout,
                ..
            } => write!(
                f,
                "probe {address} for up to {}ms",
                timeout.as_millis()
            ),
        }
    }
}

/// How settling ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The fixed delay elapsed; readiness is assumed.
    Assumed,
    /// A probe connect succeeded.
    Confirmed,
    /// The probe timed out and the fallback delay elapsed.
    TimedOut,
}

/// Wait according to `policy`.
pub async fn settle(policy: &SettlePolicy) -> Readiness {
    match policy {
        SettlePolicy::Delay(delay) => {
            debug!(delay_ms = delay.as_millis() as u64, "settling");
            sleep(*delay).await;
            Readiness::Assumed
        }
        SettlePolicy::Probe {
            address,
            interval,
            timeout: limit,
            fallback,
        } => {
            if probe(address, *interval, *limit).await {
                info!(address = %address, "coordinator is accepting connections");
                Readiness::Confirmed
            } else {
                warn!(
                    address = %address,
                    timeout_ms = limit.as_millis() as u64,
                    fallback_ms = fallback.as_millis() as u64,
                    "coordinator readiness probe timed out; falling back to fixed delay"
                );
                sleep(*fallback).await;
                Readiness::TimedOut
            }
        }
    }
}

/// Try to connect to `address` every `interval` until `limit` has elapsed.
async fn probe(address: &str, interval: Duration, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        match timeout(remaining, TcpStream::connect(address)).await {
            Ok(Ok(_stream)) => return true,
            Ok(Err(e)) => debug!(address, error = %e, "probe connect failed"),
            Err(_elapsed) => return false,
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        sleep(interval.min(remaining)).await;
    }
}
