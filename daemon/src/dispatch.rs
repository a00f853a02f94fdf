//! Handshakes and per-role request handling
//!
//! Handlers run one payload at a time per connection. Malformed requests and collaborator failures are logged and
//! answered with nothing. A connection ends on a failed handshake, or when a game server's directory entry is gone
//! so that it reconnects and registers again.

use bytes::Bytes;
use lobby_proto::{
    client, from_payload, game, to_payload, Ack, Decode, DecodeError, Encode, StatReport,
};
use tracing::{debug, info, trace, warn};

use crate::{
    directory::{DirectoryEntry, GameServerStore, Registration},
    players::PlayerStore,
    session::{Peer, Role, Session},
    Lobby,
};

/// What the connection should do after a payload was handled
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Step {
    pub reply: Option<Bytes>,
    pub close: bool,
}

impl Step {
    fn reply(payload: Option<Bytes>) -> Self {
        Self {
            reply: payload,
            close: false,
        }
    }

    /// Negative acknowledgement, then hang up
    fn reject() -> Self {
        Self {
            reply: encode(&Ack(false)),
            close: true,
        }
    }
}

fn encode<T: Encode + ?Sized>(x: &T) -> Option<Bytes> {
    match to_payload(x) {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!("failed to encode reply: {}", e);
            None
        }
    }
}

fn decode<T: Decode>(payload: Bytes) -> Option<T> {
    match from_payload(payload) {
        Ok(x) => Some(x),
        Err(DecodeError::UnknownRequest(code)) => {
            warn!(code, "unknown request type");
            None
        }
        Err(e) => {
            warn!("malformed request: {}", e);
            None
        }
    }
}

/// Handle one payload received on `session`
pub async fn handle<S, P>(lobby: &Lobby<S, P>, session: &mut Session, payload: Bytes) -> Step
where
    S: GameServerStore,
    P: PlayerStore,
{
    if let Some(registration) = session.registration().cloned() {
        return handle_server(lobby, &registration, payload).await;
    }
    if let Some(steam_id) = session.steam_id() {
        return Step::reply(handle_client(lobby, steam_id, payload).await);
    }
    handshake(lobby, session, payload).await
}

/// Interpret the first payload on a connection
pub async fn handshake<S, P>(lobby: &Lobby<S, P>, session: &mut Session, payload: Bytes) -> Step
where
    S: GameServerStore,
    P: PlayerStore,
{
    match session.role() {
        Role::GameServer => server_handshake(lobby, session, payload),
        Role::Client => client_handshake(lobby, session, payload).await,
    }
}

fn server_handshake<S, P>(lobby: &Lobby<S, P>, session: &mut Session, payload: Bytes) -> Step
where
    S: GameServerStore,
    P: PlayerStore,
{
    let hello = match from_payload::<game::Hello>(payload) {
        Ok(x) => x,
        Err(e) => {
            warn!("malformed server handshake: {}", e);
            return Step::reject();
        }
    };
    let registration = lobby
        .servers
        .register_or_refresh(DirectoryEntry::from_hello(session.remote().ip(), hello));
    if let Err(e) = session.bind(Peer::Server(registration.clone())) {
        warn!("{}", e);
        lobby.servers.remove(&registration);
        return Step::reject();
    }
    info!(key = %registration.key(), "server registered");
    Step::reply(encode(&Ack(true)))
}

async fn client_handshake<S, P>(lobby: &Lobby<S, P>, session: &mut Session, payload: Bytes) -> Step
where
    S: GameServerStore,
    P: PlayerStore,
{
    let hello = match from_payload::<client::Hello>(payload) {
        Ok(x) => x,
        Err(e) => {
            warn!("malformed client handshake: {}", e);
            return Step::reject();
        }
    };
    let record = match lobby.players.get_or_create(hello.steam_id).await {
        Ok(x) => x,
        Err(e) => {
            warn!(steam_id = hello.steam_id, "failed to resolve player: {}", e);
            return Step::reject();
        }
    };
    let reply = match encode(&client::Welcome(Some(record))) {
        Some(x) => x,
        None => return Step::reject(),
    };
    if let Err(e) = session.bind(Peer::Player(hello.steam_id)) {
        warn!("{}", e);
        return Step::reject();
    }
    info!(steam_id = hello.steam_id, "client connected");
    Step::reply(Some(reply))
}

async fn merge<P: PlayerStore>(players: &P, report: &StatReport) {
    match players.merge_stats(report.steam_id, &report.block).await {
        Ok(()) => debug!(steam_id = report.steam_id, "merged stats"),
        Err(e) => warn!(steam_id = report.steam_id, "dropping stats: {}", e),
    }
}

async fn handle_server<S, P>(lobby: &Lobby<S, P>, registration: &Registration, payload: Bytes) -> Step
where
    S: GameServerStore,
    P: PlayerStore,
{
    use game::Request::*;
    let request = match decode::<game::Request>(payload) {
        Some(x) => x,
        None => return Step::default(),
    };
    trace!(kind = ?request.kind(), "request");
    // Any request counts as a heartbeat. An entry that was evicted or taken over can't be revived from here.
    let listed = lobby.servers.touch(registration);
    if !listed {
        info!(key = %registration.key(), "server no longer listed; closing");
    }
    let reply = match request {
        Keepalive => None,
        ValidateAccount { steam_id } => match lobby.players.get_or_create(steam_id).await {
            Ok(record) => encode(&record),
            Err(e) => {
                warn!(steam_id, "account validation failed: {}", e);
                None
            }
        },
        PlayerDisconnected(report) => {
            merge(&lobby.players, &report).await;
            None
        }
        UpdateStats(report) => {
            merge(&lobby.players, &report).await;
            None
        }
        Closing(reports) => {
            for report in &reports {
                merge(&lobby.players, report).await;
            }
            lobby.servers.remove(registration);
            info!(players = reports.len(), "server closing");
            None
        }
        PlayerCount(count) => {
            lobby.servers.set_player_count(registration, count);
            None
        }
        SetExternalId(id) => {
            debug!(%id, "external id set");
            lobby.servers.set_external_id(registration, id);
            None
        }
    };
    Step { reply, close: !listed }
}

async fn handle_client<S, P>(lobby: &Lobby<S, P>, steam_id: u64, payload: Bytes) -> Option<Bytes>
where
    S: GameServerStore,
    P: PlayerStore,
{
    let request = decode::<client::Request>(payload)?;
    trace!(kind = ?request.kind(), "request");
    match request {
        client::Request::Keepalive => {
            if let Err(e) = lobby.players.touch_last_seen(steam_id).await {
                warn!("failed to refresh player: {}", e);
            }
            None
        }
        client::Request::ServerList => {
            let servers = lobby
                .live_servers()
                .iter()
                .map(DirectoryEntry::to_server_info)
                .collect();
            encode(&client::ServerList(servers))
        }
        client::Request::Population => {
            let servers = lobby.live_servers();
            let population = client::Population {
                players: servers
                    .iter()
                    .map(|e| e.current_players.max(0))
                    .fold(0i32, i32::saturating_add),
                servers: i32::try_from(servers.len()).unwrap_or(i32::MAX),
            };
            encode(&population)
        }
    }
}
