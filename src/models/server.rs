// src/models/server.rs
use crate::health::HealthState;
use crate::models::game_mode::GameMode;

/// One known game server, as the registry tracks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub game_mode: GameMode,
    pub(crate) health: HealthState,
}

impl ServerEntry {
    /// A freshly registered server: shown to clients, no probe history.
    pub fn new(name: impl Into<String>, ip: impl Into<String>, port: u16, game_mode: GameMode) -> Self {
        Self {
            name: name.into(),
            ip: ip.into(),
            port,
            game_mode,
            health: HealthState::default(),
        }
    }

    pub fn health(&self) -> &HealthState {
        &self.health
    }

    pub fn is_healthy(&self) -> bool {
        self.health.is_healthy()
    }

    /// Takes every public field from `other`, keeping this entry's health history.
    pub fn merge_public_fields(&mut self, other: ServerEntry) {
        self.name = other.name;
        self.ip = other.ip;
        self.port = other.port;
        self.game_mode = other.game_mode;
    }
}

/// What a beacon parser extracts from one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconReport {
    pub server_name: String,
    pub ip_address: String,
    pub port: u16,
    pub current_mode: String,
}
