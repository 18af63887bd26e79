pub mod game_mode;
pub mod server;
