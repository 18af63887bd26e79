// src/models/game_mode.rs
use std::collections::HashMap;
use std::fmt;
use lazy_static::lazy_static;

/// Category label published to clients for a server's current game mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GameMode {
    Adversarial,
    Cooperative,
    #[default]
    Unknown,
}

lazy_static! {
    static ref MODE_TABLE: HashMap<&'static str, GameMode> = {
        use GameMode::*;
        let mut m = HashMap::new();
        // Raven Shield
        m.insert("RGM_BombAdvMode", Adversarial);
        m.insert("RGM_DeathmatchMode", Adversarial);
        m.insert("RGM_EscortAdvMode", Adversarial);
        m.insert("RGM_HostageRescueAdvMode", Adversarial);
        m.insert("RGM_HostageRescueCoopMode", Cooperative);
        m.insert("RGM_HostageRescueMode", Cooperative);
        m.insert("RGM_MissionMode", Cooperative);
        m.insert("RGM_SquadDeathmatch", Adversarial);
        m.insert("RGM_SquadTeamDeathmatch", Adversarial);
        m.insert("RGM_TeamDeathmatchMode", Adversarial);
        m.insert("RGM_TerroristHuntCoopMode", Cooperative);
        m.insert("RGM_TerroristHuntMode", Cooperative);
        // Athena Sword
        m.insert("RGM_CaptureTheEnemyAdvMode", Adversarial);
        m.insert("RGM_CountDownMode", Cooperative);
        m.insert("RGM_KamikazeMode", Adversarial);
        m.insert("RGM_ScatteredHuntAdvMode", Adversarial);
        m.insert("RGM_TerroristHuntAdvMode", Adversarial);
        m
    };
}

impl GameMode {
    /// Maps a raw mode identifier from a beacon to its category.
    /// Identifiers missing from the table are `Unknown`.
    pub fn classify(raw_mode: &str) -> GameMode {
        MODE_TABLE.get(raw_mode).copied().unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Adversarial => "adv",
            GameMode::Cooperative => "coop",
            GameMode::Unknown => "",
        }
    }

    /// Inverse of `as_str`, used when reading a published list back in.
    pub fn from_label(label: &str) -> Option<GameMode> {
        match label {
            "adv" => Some(GameMode::Adversarial),
            "coop" => Some(GameMode::Cooperative),
            "" => Some(GameMode::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
