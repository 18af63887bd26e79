// src/handlers/index.rs
use actix_web::{web, HttpResponse};
use serde::Serialize;
use crate::storage::memory::{DirectorySummary, ServerDirectory};

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    #[serde(flatten)]
    summary: DirectorySummary,
}

pub async fn index(storage: web::Data<ServerDirectory>) -> HttpResponse {
    HttpResponse::Ok().json(StatusResponse {
        status: "ok",
        summary: storage.summary(),
    })
}
