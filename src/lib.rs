//! Server discovery registry for OpenRVS game servers.
//!
//! Game servers announce themselves with UDP beacons, the registry probes
//! them periodically, and clients fetch the healthy list over HTTP.

pub mod beacon;
pub mod codec;
pub mod config;
pub mod handlers;
pub mod health;
pub mod models;
pub mod storage;
pub mod utils;
