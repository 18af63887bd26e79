//! Integration tests for the registry: ingestion, health sweeps and the published list.

use openrvs_registry::beacon::{BeaconIngestor, RavenShieldParser};
use openrvs_registry::codec::{decode, encode};
use openrvs_registry::health::{HealthTracker, UdpProber, FAILED_CHECK_THRESHOLD, PROBE_PORT_OFFSET};
use openrvs_registry::models::game_mode::GameMode;
use openrvs_registry::storage::memory::ServerDirectory;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

fn beacon(name: &str, port: u16, mode: &str) -> Vec<u8> {
    let mut payload = Vec::new();
    for field in [format!("I1 {}", name), format!("P1 {}", port), format!("F1 {}", mode)] {
        payload.push(0xB6);
        payload.extend_from_slice(field.as_bytes());
        payload.push(b' ');
    }
    payload
}

fn source_ip(i: usize) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, (i / 256) as u8, (i % 256) as u8))
}

mod concurrency_tests {
    use super::*;

    /// Concurrent ingests never lose an update and readers never see a torn entry.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_ingest_with_snapshots() {
        let directory = Arc::new(ServerDirectory::new());
        let ingestor = Arc::new(BeaconIngestor::new(directory.clone(), RavenShieldParser));

        let reader = {
            let directory = directory.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    for entry in directory.snapshot() {
                        let i: usize = entry.name.trim_start_matches("server-").parse().unwrap();
                        assert_eq!(entry.ip, source_ip(i).to_string());
                        assert_eq!(entry.port, 7000 + i as u16);
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut writers = Vec::new();
        for i in 0..1000 {
            let ingestor = ingestor.clone();
            writers.push(tokio::spawn(async move {
                let payload = beacon(&format!("server-{}", i), 7000 + i as u16, "RGM_BombAdvMode");
                ingestor.ingest(source_ip(i), &payload).unwrap()
            }));
        }
        for writer in writers {
            writer.await.unwrap();
        }
        reader.await.unwrap();

        assert_eq!(directory.count(), 1000);
        assert_eq!(directory.snapshot().len(), 1000);
    }
}

mod publish_tests {
    use super::*;

    #[test]
    fn published_list_round_trips_healthy_servers() {
        let directory = Arc::new(ServerDirectory::new());
        let ingestor = BeaconIngestor::new(directory.clone(), RavenShieldParser);
        ingestor.ingest(source_ip(1), &beacon("Zeta", 7777, "RGM_BombAdvMode")).unwrap();
        ingestor.ingest(source_ip(2), &beacon("apple", 7777, "RGM_MissionMode")).unwrap();
        ingestor.ingest(source_ip(3), &beacon("1337", 7777, "RGM_Unreleased")).unwrap();

        let published = encode(&directory.snapshot());
        assert_eq!(
            published,
            "name,ip,port,mode\n\
             Zeta,10.0.0.1,7777,adv\n\
             apple,10.0.0.2,7777,coop\n\
             1337,10.0.0.3,7777,"
        );

        let restored = decode(&published).unwrap();
        assert_eq!(restored.len(), 3);
        for entry in directory.snapshot() {
            let key = ServerDirectory::endpoint_key(&entry.ip, entry.port);
            let other = &restored[&key];
            assert_eq!(other.name, entry.name);
            assert_eq!(other.ip, entry.ip);
            assert_eq!(other.port, entry.port);
            assert_eq!(other.game_mode, entry.game_mode);
        }
        assert_eq!(restored["10.0.0.3:7777"].game_mode, GameMode::Unknown);
    }

    #[test]
    fn decode_rejects_truncated_line() {
        assert!(decode("name,ip,port,mode\nOnlyOneField").is_err());
    }
}

mod health_tests {
    use super::*;

    /// A beacon registers a loopback server, whose health port then answers probes.
    #[tokio::test]
    async fn loopback_server_passes_udp_probe() {
        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let health_port = responder.local_addr().unwrap().port();
        let game_port = health_port - PROBE_PORT_OFFSET;
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            while let Ok((_, from)) = responder.recv_from(&mut buf).await {
                let _ = responder.send_to(&beacon("Local", game_port, "RGM_MissionMode"), from).await;
            }
        });

        let directory = Arc::new(ServerDirectory::new());
        let ingestor = BeaconIngestor::new(directory.clone(), RavenShieldParser);
        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let key = ingestor.ingest(loopback, &beacon("Local", game_port, "RGM_MissionMode")).unwrap();
        assert_eq!(key, "Local");

        let tracker = HealthTracker::new(directory.clone(), Arc::new(UdpProber::new(Duration::from_secs(2))));
        let report = tracker.sweep().await;
        assert_eq!(report.probed, 1);
        assert_eq!(report.passed, 1);

        let stored = directory.get("Local").unwrap();
        assert_eq!(stored.health().passed_checks(), 1);
        assert_eq!(stored.health().failed_checks(), 0);
    }

    /// A silent server stays listed until the failure threshold, then disappears
    /// from the published list without leaving the directory.
    #[tokio::test]
    async fn silent_server_hidden_after_threshold() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let game_port = silent.local_addr().unwrap().port() - PROBE_PORT_OFFSET;

        let directory = Arc::new(ServerDirectory::new());
        let ingestor = BeaconIngestor::new(directory.clone(), RavenShieldParser);
        ingestor
            .ingest(IpAddr::V4(Ipv4Addr::LOCALHOST), &beacon("Silent", game_port, ""))
            .unwrap();

        let tracker = HealthTracker::new(directory.clone(), Arc::new(UdpProber::new(Duration::from_millis(20))));
        for _ in 1..FAILED_CHECK_THRESHOLD {
            tracker.sweep().await;
        }
        assert_eq!(directory.snapshot().len(), 1);

        let report = tracker.sweep().await;
        assert_eq!(report.hidden, 1);
        assert!(directory.snapshot().is_empty());
        assert_eq!(directory.count(), 1);
        assert_eq!(encode(&directory.snapshot()), "name,ip,port,mode\n");

        // A new beacon updates the listing but not the health history.
        ingestor
            .ingest(IpAddr::V4(Ipv4Addr::LOCALHOST), &beacon("Silent", game_port, "RGM_BombAdvMode"))
            .unwrap();
        let stored = directory.get("Silent").unwrap();
        assert!(!stored.is_healthy());
        assert_eq!(stored.game_mode, GameMode::Adversarial);
        drop(silent);
    }
}
