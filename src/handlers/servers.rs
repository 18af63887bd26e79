// src/handlers/servers.rs
use actix_web::{web, HttpRequest, HttpResponse};
use log::{debug, error};
use crate::codec::encode;
use crate::storage::memory::ServerDirectory;
use crate::utils::{extract_client_ip, KeyedLimiter, RequestError, TrustedProxies};

/// The published server list in the client text format.
pub async fn get_servers(
    storage: web::Data<ServerDirectory>,
    rate_limiter: web::Data<KeyedLimiter>,
    trusted_proxies: web::Data<TrustedProxies>,
    req: HttpRequest,
) -> Result<HttpResponse, RequestError> {
    let client_ip = extract_client_ip(&req, &trusted_proxies)?;

    if rate_limiter.check_key(&client_ip).is_err() {
        error!("Rate limit exceeded for server list for ip: {}", client_ip);
        return Err(RequestError::RateLimitExceeded);
    }

    let servers = storage.snapshot();
    debug!("Building server list response with {} servers", servers.len());

    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(encode(&servers)))
}
