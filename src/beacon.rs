// src/beacon.rs
//! Beacon ingestion: UDP datagrams from game servers become directory entries.

use log::{debug, error, info, warn};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use crate::codec::sanitize_field;
use crate::models::game_mode::GameMode;
use crate::models::server::{BeaconReport, ServerEntry};
use crate::storage::memory::ServerDirectory;
use crate::utils::KeyedLimiter;

const MAX_BEACON_SIZE: usize = 4096;

#[derive(Debug, Error)]
pub enum BeaconError {
    #[error("beacon is missing the {0} field")]
    MissingField(&'static str),
    #[error("beacon has invalid port {0:?}")]
    InvalidPort(String),
    #[error("malformed beacon: {0}")]
    Malformed(String),
    #[error("beacon rate limit exceeded for {0}")]
    RateLimited(IpAddr),
}

/// Turns one beacon payload into a report.
pub trait BeaconParser: Send + Sync {
    fn parse(&self, source_ip: &str, payload: &[u8]) -> Result<BeaconReport, BeaconError>;
}

/// Raven Shield beacon text: fields introduced by a `¶` marker, each `KEY value`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RavenShieldParser;

impl RavenShieldParser {
    const FIELD_MARKER: char = '\u{b6}';
    const SERVER_NAME: &'static str = "I1";
    const PORT: &'static str = "P1";
    const CURRENT_MODE: &'static str = "F1";

    /// Splits the payload into marker-delimited fields. UTF-8 payloads are
    /// split on the `¶` character; anything else is read as Latin-1, where
    /// the marker is the single byte 0xB6.
    fn fields(payload: &[u8]) -> Vec<String> {
        match std::str::from_utf8(payload) {
            Ok(text) => text.split(Self::FIELD_MARKER).map(str::to_string).collect(),
            Err(_) => payload
                .split(|b| *b == Self::FIELD_MARKER as u8)
                .map(|field| field.iter().map(|&b| b as char).collect::<String>())
                .collect(),
        }
    }
}

impl BeaconParser for RavenShieldParser {
    fn parse(&self, source_ip: &str, payload: &[u8]) -> Result<BeaconReport, BeaconError> {
        let mut server_name = None;
        let mut port = None;
        let mut current_mode = None;

        for field in Self::fields(payload) {
            let text = field.trim_matches(|c: char| c.is_whitespace() || c == '\0');
            let (key, value) = text.split_once(' ').unwrap_or((text, ""));
            let value = value.trim().to_string();
            match key {
                Self::SERVER_NAME => server_name = Some(value),
                Self::PORT => port = Some(value),
                Self::CURRENT_MODE => current_mode = Some(value),
                _ => {}
            }
        }

        let server_name = server_name
            .filter(|name| !name.is_empty())
            .ok_or(BeaconError::MissingField("server name"))?;
        let port_text = port.ok_or(BeaconError::MissingField("port"))?;
        let port = match port_text.parse::<u16>() {
            Ok(p) if p != 0 => p,
            _ => return Err(BeaconError::InvalidPort(port_text)),
        };

        Ok(BeaconReport {
            server_name,
            ip_address: source_ip.to_string(),
            port,
            current_mode: current_mode.unwrap_or_default(),
        })
    }
}

fn normalize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        IpAddr::V4(_) => ip,
    }
}

pub struct BeaconIngestor<P = RavenShieldParser> {
    directory: Arc<ServerDirectory>,
    parser: P,
    rate_limiter: Option<Arc<KeyedLimiter>>,
}

impl<P: BeaconParser> BeaconIngestor<P> {
    pub fn new(directory: Arc<ServerDirectory>, parser: P) -> Self {
        Self {
            directory,
            parser,
            rate_limiter: None,
        }
    }

    pub fn with_rate_limit(mut self, rate_limiter: Arc<KeyedLimiter>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    /// Parses one beacon and upserts the server it describes, returning its
    /// directory key. Rejected beacons leave the directory untouched.
    pub fn ingest(&self, source_ip: IpAddr, payload: &[u8]) -> Result<String, BeaconError> {
        let source_ip = normalize_ip(source_ip);

        if let Some(rate_limiter) = &self.rate_limiter {
            if rate_limiter.check_key(&source_ip).is_err() {
                debug!("Dropping beacon from {}: rate limit exceeded", source_ip);
                return Err(BeaconError::RateLimited(source_ip));
            }
        }

        let report = match self.parser.parse(&source_ip.to_string(), payload) {
            Ok(report) => report,
            Err(e) => {
                warn!("Failed to parse beacon for server {}: {}", source_ip, e);
                return Err(e);
            }
        };

        let name = sanitize_field(&report.server_name);
        let ip = sanitize_field(&report.ip_address);
        let key = ServerDirectory::derive_key(&ip, report.port, &name);
        let entry = ServerEntry::new(name, ip, report.port, GameMode::classify(&report.current_mode));
        self.directory.upsert(key.clone(), entry);

        debug!("There are now {} registered servers", self.directory.count());
        Ok(key)
    }
}

/// Receives beacons on `socket` forever.
pub async fn serve_beacons<P: BeaconParser>(socket: UdpSocket, ingestor: Arc<BeaconIngestor<P>>) {
    let mut buffer = [0u8; MAX_BEACON_SIZE];
    loop {
        match socket.recv_from(&mut buffer).await {
            Ok((len, addr)) => {
                // Failures are logged by the ingestor.
                let _ = ingestor.ingest(addr.ip(), &buffer[..len]);
            }
            Err(e) => {
                error!("UDP error: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

pub async fn listen_udp<P: BeaconParser>(bind: &str, ingestor: Arc<BeaconIngestor<P>>) -> std::io::Result<()> {
    let socket = UdpSocket::bind(bind).await?;
    info!("Beacon listener started on {}", socket.local_addr()?);
    serve_beacons(socket, ingestor).await;
    Ok(())
}
