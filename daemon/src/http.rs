//! Read-only JSON view of the directory for web front-ends

use std::{io, sync::Arc};

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tokio::{net::TcpListener, sync::watch};
use tracing::info;

use crate::{directory::GameServerStore, players::PlayerStore, Lobby};

#[derive(Debug, Serialize)]
pub struct Listing {
    pub data: Vec<ListedServer>,
}

#[derive(Debug, Serialize)]
pub struct ListedServer {
    pub ip_address: String,
    pub port: i32,
}

/// Live servers in registration order
pub fn listing<S, P>(lobby: &Lobby<S, P>) -> Listing
where
    S: GameServerStore,
    P: PlayerStore,
{
    Listing {
        data: lobby
            .live_servers()
            .into_iter()
            .map(|entry| ListedServer {
                ip_address: entry.ip.to_string(),
                port: entry.port,
            })
            .collect(),
    }
}

async fn server_list<S, P>(State(lobby): State<Arc<Lobby<S, P>>>) -> Json<Listing>
where
    S: GameServerStore,
    P: PlayerStore,
{
    Json(listing(&lobby))
}

pub fn router<S, P>(lobby: Arc<Lobby<S, P>>) -> Router
where
    S: GameServerStore,
    P: PlayerStore,
{
    Router::new()
        .route("/game/server/list", get(server_list::<S, P>))
        .route("/healthz", get(|| async { "ok\n" }))
        .with_state(lobby)
}

/// Serve [`router`] until `shutdown` flips to true
pub async fn serve<S, P>(
    listener: TcpListener,
    lobby: Arc<Lobby<S, P>>,
    mut shutdown: watch::Receiver<bool>,
) -> io::Result<()>
where
    S: GameServerStore,
    P: PlayerStore,
{
    info!(addr = %listener.local_addr()?, "serving http");
    axum::serve(listener, router(lobby))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|&stop| stop).await;
        })
        .await
}

#[cfg(test)]
mod tests {
    use std::{net::IpAddr, time::Duration};

    use lobby_proto::game;

    use super::*;
    use crate::{directory::DirectoryEntry, identity::Offline, MemoryPlayerStore, ServerDirectory};

    fn hello(name: &str, port: i32) -> game::Hello {
        game::Hello {
            region: 0,
            name: name.into(),
            port,
            map: "Valley".into(),
            mode: "TDM".into(),
            extra_info: String::new(),
            max_players: 16,
            is_protected: false,
        }
    }

    #[test]
    fn lists_live_servers() {
        let lobby = Lobby::new(
            ServerDirectory::new(),
            MemoryPlayerStore::new(Offline, String::new()),
            Duration::from_secs(300),
        );
        let ip: IpAddr = "10.0.0.5".parse().unwrap();
        lobby
            .servers
            .register_or_refresh(DirectoryEntry::from_hello(ip, hello("Alpha", 1000)));
        lobby
            .servers
            .register_or_refresh(DirectoryEntry::from_hello(ip, hello("Beta", 1001)));

        let json = serde_json::to_value(listing(&lobby)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "data": [
                    { "ip_address": "10.0.0.5", "port": 1000 },
                    { "ip_address": "10.0.0.5", "port": 1001 },
                ]
            })
        );
    }

    #[test]
    fn empty_listing() {
        let lobby = Lobby::new(
            ServerDirectory::new(),
            MemoryPlayerStore::new(Offline, String::new()),
            Duration::from_secs(300),
        );
        let json = serde_json::to_value(listing(&lobby)).unwrap();
        assert_eq!(json, serde_json::json!({ "data": [] }));
    }
}
