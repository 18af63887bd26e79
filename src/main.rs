// src/main.rs
use actix_web::{web, App, HttpServer};
use env_logger::Env;
use governor::RateLimiter;
use log::{error, info, warn};
use std::sync::Arc;
use openrvs_registry::beacon::{self, BeaconIngestor, RavenShieldParser};
use openrvs_registry::config::Config;
use openrvs_registry::handlers;
use openrvs_registry::health::{HealthTracker, UdpProber};
use openrvs_registry::storage::memory::ServerDirectory;
use openrvs_registry::utils::KeyedLimiter;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = Config::from_env();

    let directory = Arc::new(ServerDirectory::new());

    if let Some(path) = &config.seed_file {
        match directory.restore_from_file(path) {
            Ok(count) => info!("Restored {} servers from {}", count, path.display()),
            Err(e) => warn!("Starting with an empty server list: {}", e),
        }
    }

    let beacon_rate_limiter: Arc<KeyedLimiter> = Arc::new(RateLimiter::keyed(config.beacon_quota()));
    let ingestor = Arc::new(
        BeaconIngestor::new(directory.clone(), RavenShieldParser).with_rate_limit(beacon_rate_limiter),
    );
    let beacon_bind = config.beacon_bind();
    tokio::spawn(async move {
        if let Err(e) = beacon::listen_udp(&beacon_bind, ingestor).await {
            error!("Beacon listener on {} failed: {}", beacon_bind, e);
        }
    });

    let tracker = HealthTracker::new(directory.clone(), Arc::new(UdpProber::new(config.probe_timeout())));
    tokio::spawn(tracker.run());

    let storage = web::Data::from(directory);
    let server_list_rate_limiter: web::Data<KeyedLimiter> =
        web::Data::new(RateLimiter::keyed(config.server_list_quota()));

    let trusted_proxies = web::Data::new(config.trusted_proxies.clone());
    if trusted_proxies.is_empty() {
        info!("No trusted proxies configured, rate limiting by peer address");
    }

    let bind = config.http_bind();
    info!("Starting server on {}", bind);
    HttpServer::new(move || {
        App::new()
            .app_data(storage.clone())
            .app_data(server_list_rate_limiter.clone())
            .app_data(trusted_proxies.clone())
            .route("/", web::get().to(handlers::index::index))
            .route("/servers", web::get().to(handlers::servers::get_servers))
    })
        .bind(&bind)?
        .run().await
}
