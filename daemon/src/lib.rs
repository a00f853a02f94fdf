//! Lobby server: a live directory of game servers and the profiles of the players using them

pub mod config;
pub mod directory;
pub mod dispatch;
pub mod http;
pub mod identity;
pub mod net;
pub mod players;
pub mod session;

use std::time::Duration;

use tracing::warn;

pub use config::Config;
pub use directory::{DirectoryEntry, GameServerStore, Registration, ServerDirectory, ServerKey};
pub use net::Server;
pub use players::{MemoryPlayerStore, PlayerStore, StoreError};
pub use session::{Role, Session};

/// State shared by every connection
pub struct Lobby<S, P> {
    pub servers: S,
    pub players: P,
    /// How long a server stays listed after its last heartbeat
    pub liveness_window: Duration,
}

impl<S: GameServerStore, P: PlayerStore> Lobby<S, P> {
    pub fn new(servers: S, players: P, liveness_window: Duration) -> Self {
        Self {
            servers,
            players,
            liveness_window,
        }
    }

    /// Servers that have sent a heartbeat recently enough to be shown
    pub fn live_servers(&self) -> Vec<DirectoryEntry> {
        self.servers.list_active(self.liveness_window)
    }

    /// Persist profiles and forget every server
    pub async fn close(&self) {
        if let Err(e) = self.players.flush().await {
            warn!("failed to save player profiles: {}", e);
        }
        self.servers.clear();
    }
}
