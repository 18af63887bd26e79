// src/health.rs
//! Periodic liveness probing and the show/hide state machine built on it.

use async_trait::async_trait;
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use crate::storage::memory::{ProbeOutcome, ProbeTarget, ServerDirectory};
use crate::utils::format_address_for_probe;

pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);
/// Hide servers after being down 15 minutes.
pub const FAILED_CHECK_THRESHOLD: u32 = 15;
/// Show hidden servers again after 2 passing checks in a row.
pub const PASSED_CHECK_THRESHOLD: u32 = 2;
/// Prune servers entirely after being down 7 days.
pub const MAX_FAILED_CHECKS: u32 = 10080;
/// Health traffic goes to the game port plus this offset.
pub const PROBE_PORT_OFFSET: u16 = 1000;
/// Probes in flight at once during a sweep; each one holds a UDP socket.
pub const MAX_CONCURRENT_PROBES: usize = 64;

const REPORT_QUERY: &[u8] = b"REPORT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthState {
    healthy: bool,
    passed_checks: u32,
    failed_checks: u32,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            healthy: true,
            passed_checks: 0,
            failed_checks: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    Unchanged,
    Hidden,
    Shown,
}

impl HealthState {
    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    pub fn passed_checks(&self) -> u32 {
        self.passed_checks
    }

    pub fn failed_checks(&self) -> u32 {
        self.failed_checks
    }

    pub fn record_failure(&mut self) -> HealthTransition {
        self.passed_checks = 0;
        self.failed_checks = self.failed_checks.saturating_add(1);
        if self.healthy && self.failed_checks >= FAILED_CHECK_THRESHOLD {
            self.healthy = false;
            return HealthTransition::Hidden;
        }
        HealthTransition::Unchanged
    }

    pub fn record_pass(&mut self) -> HealthTransition {
        self.failed_checks = 0;
        self.passed_checks = self.passed_checks.saturating_add(1);
        if !self.healthy && self.passed_checks >= PASSED_CHECK_THRESHOLD {
            self.healthy = true;
            return HealthTransition::Shown;
        }
        HealthTransition::Unchanged
    }

    pub fn is_prunable(&self) -> bool {
        self.failed_checks >= MAX_FAILED_CHECKS
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("health port for game port {0} is out of range")]
    PortOutOfRange(u16),
    #[error("invalid probe address: {0}")]
    InvalidAddress(String),
    #[error("probe I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no probe response within {0:?}")]
    Timeout(Duration),
    #[error("empty probe response")]
    EmptyResponse,
}

/// Sends one liveness request. Only success or failure matters to the registry.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, ip: &str, port: u16) -> Result<(), ProbeError>;
}

/// Queries a server's beacon port with `REPORT` and accepts any non-empty
/// reply sent from that address. Datagrams from anyone else are ignored.
pub struct UdpProber {
    timeout: Duration,
}

impl UdpProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Prober for UdpProber {
    async fn probe(&self, ip: &str, port: u16) -> Result<(), ProbeError> {
        let server_addr = format_address_for_probe(ip, port).map_err(ProbeError::InvalidAddress)?;
        let bind_addr = if server_addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.send_to(REPORT_QUERY, server_addr).await?;

        let mut buffer = [0u8; 4096];
        let reply = async {
            loop {
                let (len, from) = socket.recv_from(&mut buffer).await?;
                if from == server_addr {
                    return Ok::<usize, std::io::Error>(len);
                }
                debug!("Ignoring datagram from {} while waiting on {}", from, server_addr);
            }
        };
        match tokio::time::timeout(self.timeout, reply).await {
            Ok(Ok(0)) => Err(ProbeError::EmptyResponse),
            Ok(Ok(len)) => {
                debug!("Probe of {} answered with {} bytes", server_addr, len);
                Ok(())
            }
            Ok(Err(e)) => Err(ProbeError::Io(e)),
            Err(_) => Err(ProbeError::Timeout(self.timeout)),
        }
    }
}

pub fn probe_port(game_port: u16) -> Result<u16, ProbeError> {
    game_port
        .checked_add(PROBE_PORT_OFFSET)
        .ok_or(ProbeError::PortOutOfRange(game_port))
}

/// Probes the health port of `target`. Any error counts as a failed check.
pub async fn healthcheck(prober: &dyn Prober, target: &ProbeTarget) -> bool {
    let result = match probe_port(target.port) {
        Ok(port) => prober.probe(&target.ip, port).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => true,
        Err(e) => {
            debug!("Healthcheck failed for {}: {}", target.key, e);
            false
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub passed: usize,
    pub hidden: usize,
    pub shown: usize,
    pub pruned: usize,
    pub stale: usize,
}

pub struct HealthTracker {
    directory: Arc<ServerDirectory>,
    prober: Arc<dyn Prober>,
    probe_slots: Arc<Semaphore>,
}

impl HealthTracker {
    pub fn new(directory: Arc<ServerDirectory>, prober: Arc<dyn Prober>) -> Self {
        Self {
            directory,
            prober,
            probe_slots: Arc::new(Semaphore::new(MAX_CONCURRENT_PROBES)),
        }
    }

    pub fn with_max_concurrent_probes(mut self, limit: usize) -> Self {
        self.probe_slots = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    /// Probes every entry once. Probes run concurrently, at most
    /// `MAX_CONCURRENT_PROBES` at a time, and outside the directory locks;
    /// each result is applied as it arrives.
    pub async fn sweep(&self) -> SweepReport {
        let mut probes = JoinSet::new();
        for target in self.directory.probe_targets() {
            let prober = Arc::clone(&self.prober);
            let probe_slots = Arc::clone(&self.probe_slots);
            probes.spawn(async move {
                // The semaphore is never closed.
                let passed = match probe_slots.acquire_owned().await {
                    Ok(_slot) => healthcheck(prober.as_ref(), &target).await,
                    Err(_) => false,
                };
                (target, passed)
            });
        }

        let mut report = SweepReport::default();
        while let Some(joined) = probes.join_next().await {
            let (target, passed) = match joined {
                Ok(result) => result,
                Err(e) => {
                    error!("Health probe task failed: {}", e);
                    continue;
                }
            };
            report.probed += 1;
            if passed {
                report.passed += 1;
            }

            match self.directory.record_probe(&target, passed) {
                ProbeOutcome::Applied(HealthTransition::Hidden) => {
                    info!("Hiding {} after {} failed checks", target.key, FAILED_CHECK_THRESHOLD);
                    report.hidden += 1;
                }
                ProbeOutcome::Applied(HealthTransition::Shown) => {
                    info!("Showing {} again after {} passed checks", target.key, PASSED_CHECK_THRESHOLD);
                    report.shown += 1;
                }
                ProbeOutcome::Applied(HealthTransition::Unchanged) => {}
                ProbeOutcome::Pruned => {
                    info!("Pruned {} after {} failed checks", target.key, MAX_FAILED_CHECKS);
                    report.pruned += 1;
                }
                ProbeOutcome::Stale => {
                    debug!("Discarding stale probe result for {}", target.key);
                    report.stale += 1;
                }
                ProbeOutcome::Missing => {}
            }
        }
        report
    }

    pub async fn run(self) {
        let mut ticker = interval_at(Instant::now() + HEALTH_CHECK_INTERVAL, HEALTH_CHECK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Health tracker started, checking every {:?}", HEALTH_CHECK_INTERVAL);
        loop {
            ticker.tick().await;
            let report = self.sweep().await;
            debug!("Health sweep finished: {:?}", report);
        }
    }
}
