// src/utils.rs
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use governor::{RateLimiter, clock::DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use ipnetwork::IpNetwork;
use log::{debug, warn};
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use thiserror::Error;

pub type KeyedLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Failed to extract client IP")]
    MissingPeerIP,
    #[error("Rate limit exceeded")]
    RateLimitExceeded,
}

impl ResponseError for RequestError {
    fn error_response(&self) -> HttpResponse {
        match self {
            Self::RateLimitExceeded => HttpResponse::TooManyRequests().body(self.to_string()),
            Self::MissingPeerIP => HttpResponse::BadRequest().body(self.to_string()),
        }
    }
}

/// Reverse proxies whose `X-Forwarded-For` header is believed.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies {
    networks: Vec<IpNetwork>,
}

impl TrustedProxies {
    /// Comma separated addresses or CIDR ranges. Invalid entries are logged and skipped.
    pub fn parse_list(list: &str) -> Self {
        let mut networks = Vec::new();
        for item in list.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            match IpNetwork::from_str(item) {
                Ok(network) => networks.push(network),
                Err(e) => warn!("Ignoring invalid trusted proxy {:?}: {}", item, e),
            }
        }
        Self { networks }
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.networks.iter().any(|network| network.contains(ip))
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

/// The socket peer, unless the peer is a trusted proxy that supplied an
/// `X-Forwarded-For` address, in which case the first forwarded address.
pub fn extract_client_ip(req: &HttpRequest, trusted: &TrustedProxies) -> Result<IpAddr, RequestError> {
    let peer_ip = req.peer_addr()
        .map(|addr| addr.ip())
        .ok_or(RequestError::MissingPeerIP)?;
    if !trusted.contains(peer_ip) {
        return Ok(peer_ip);
    }

    if let Some(forwarded_for) = req.headers().get("X-Forwarded-For") {
        if let Ok(ip_str) = forwarded_for.to_str() {
            if let Some(first_ip) = ip_str.split(',').next() {
                if let Ok(ip) = first_ip.trim().parse::<IpAddr>() {
                    debug!("Using X-Forwarded-For address {}", ip);
                    return Ok(ip);
                }
            }
        }
    }

    Ok(peer_ip)
}

pub fn format_address_for_probe(ip: &str, port: u16) -> Result<SocketAddr, String> {
    ip.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, port))
        .map_err(|e| format!("{}: {}", ip, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_trusted_proxies_parse_list() {
        let trusted = TrustedProxies::parse_list("10.0.0.0/8, 192.168.1.5,bogus,");
        assert!(trusted.contains(ip("10.20.30.40")));
        assert!(trusted.contains(ip("192.168.1.5")));
        assert!(!trusted.contains(ip("192.168.1.6")));
        assert!(!trusted.contains(ip("::1")));
        assert!(TrustedProxies::parse_list("").is_empty());
    }

    #[test]
    fn test_forwarded_header_used_behind_trusted_proxy() {
        let trusted = TrustedProxies::parse_list("10.0.0.1");
        let req = TestRequest::default()
            .peer_addr("10.0.0.1:5000".parse().unwrap())
            .insert_header(("X-Forwarded-For", "203.0.113.9, 10.0.0.1"))
            .to_http_request();
        assert_eq!(extract_client_ip(&req, &trusted).unwrap(), ip("203.0.113.9"));

        let req = TestRequest::default()
            .peer_addr("10.0.0.1:5000".parse().unwrap())
            .insert_header(("X-Forwarded-For", "not an ip"))
            .to_http_request();
        assert_eq!(extract_client_ip(&req, &trusted).unwrap(), ip("10.0.0.1"));
    }

    #[test]
    fn test_forwarded_header_ignored_from_untrusted_peer() {
        let req = TestRequest::default()
            .peer_addr("10.1.1.1:5000".parse().unwrap())
            .insert_header(("X-Forwarded-For", "1.2.3.4"))
            .to_http_request();
        assert_eq!(extract_client_ip(&req, &TrustedProxies::default()).unwrap(), ip("10.1.1.1"));
        let trusted = TrustedProxies::parse_list("10.0.0.1");
        assert_eq!(extract_client_ip(&req, &trusted).unwrap(), ip("10.1.1.1"));
    }

    #[test]
    fn test_extract_client_ip_without_peer() {
        let req = TestRequest::default().to_http_request();
        assert!(matches!(
            extract_client_ip(&req, &TrustedProxies::default()),
            Err(RequestError::MissingPeerIP)
        ));
    }

    #[test]
    fn test_format_address_for_probe() {
        assert_eq!(
            format_address_for_probe("10.0.0.1", 8777).unwrap(),
            "10.0.0.1:8777".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            format_address_for_probe("::1", 8777).unwrap(),
            "[::1]:8777".parse::<SocketAddr>().unwrap()
        );
        assert!(format_address_for_probe("localhost", 8777).is_err());
    }
}
