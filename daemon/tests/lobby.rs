use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::Bytes;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

use lobby_client::Client;
use lobby_daemon::{identity::Offline, Config, Lobby, MemoryPlayerStore, Role, Server, ServerDirectory};
use lobby_heartbeat::Heartbeat;
use lobby_proto::{
    client, from_payload, game, to_payload, FrameConfig, FrameStream, Profile, StatBlock, StatReport, WeaponKills,
};

type TestServer = Server<ServerDirectory, MemoryPlayerStore<Offline>>;

struct Harness {
    server: Arc<TestServer>,
    game_addr: SocketAddr,
    client_addr: SocketAddr,
}

impl Harness {
    async fn start(config: Config) -> Self {
        let lobby = Arc::new(Lobby::new(
            ServerDirectory::new(),
            MemoryPlayerStore::new(Offline, "http://cdn.example/default.png".into()),
            config.liveness_window,
        ));
        let server = Arc::new(Server::new(lobby, &config));
        let game_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let game_addr = game_listener.local_addr().unwrap();
        let client_addr = client_listener.local_addr().unwrap();
        for (listener, role) in [(game_listener, Role::GameServer), (client_listener, Role::Client)] {
            let server = server.clone();
            tokio::spawn(async move { server.run(listener, role).await.unwrap() });
        }
        Self {
            server,
            game_addr,
            client_addr,
        }
    }

    async fn new() -> Self {
        Self::start(Config::default()).await
    }

    fn lobby(&self) -> &Lobby<ServerDirectory, MemoryPlayerStore<Offline>> {
        self.server.lobby()
    }

    /// Wait for the server to process something we can't observe directly
    async fn until(&self, mut cond: impl FnMut(&Self) -> bool) {
        for _ in 0..200 {
            if cond(self) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }
}

fn alpha() -> game::Hello {
    game::Hello {
        region: 1,
        name: "Alpha".into(),
        port: 1000,
        map: "Valley".into(),
        mode: "TDM".into(),
        extra_info: String::new(),
        max_players: 64,
        is_protected: false,
    }
}

fn report(steam_id: u64, kills: i32) -> StatReport {
    let mut profile = Profile::new(steam_id, "Reported".into(), String::new());
    profile.stats.kills = kills;
    profile.xp = 250;
    let mut weapon_kills = WeaponKills::new();
    weapon_kills.insert(3, kills);
    StatReport {
        steam_id,
        block: StatBlock {
            profile,
            prefs: Bytes::new(),
            weapon_kills,
        },
    }
}

async fn raw(addr: SocketAddr) -> FrameStream<TcpStream> {
    FrameStream::new(TcpStream::connect(addr).await.unwrap(), FrameConfig::default())
}

#[tokio::test]
async fn registered_server_is_listed() {
    let harness = Harness::new().await;
    let _heartbeat = Heartbeat::connect(harness.game_addr, &alpha()).await.unwrap();
    let (mut client, _) = Client::connect(harness.client_addr, 76561198000000000).await.unwrap();

    let servers = client.server_list().await.unwrap();
    assert_eq!(servers.len(), 1);
    let info = &servers[0];
    assert_eq!(info.name, "Alpha");
    assert_eq!(info.ip, "127.0.0.1");
    assert_eq!(info.port, 1000);
    assert_eq!(info.map, "Valley");
    assert_eq!(info.mode, "TDM");
    assert_eq!(info.max_players, 64);
    assert_eq!(info.current_players, 0);
    assert!(!info.is_protected);

    let population = client.population().await.unwrap();
    assert_eq!(population.servers, 1);
}

#[tokio::test]
async fn new_client_gets_clean_profile() {
    let harness = Harness::new().await;
    let (_client, record) = Client::connect(harness.client_addr, 76561198000000000).await.unwrap();
    assert_eq!(record.profile.steam_id, 76561198000000000);
    assert_eq!(record.profile.name, "Player_0000");
    assert_eq!(record.profile.avatar_url, "http://cdn.example/default.png");
    assert_eq!(record.profile.rank, 1);
    assert_eq!(record.profile.stats, Default::default());
    assert!(record.weapon_kills.is_empty());
    assert_eq!(harness.lobby().players.len(), 1);
}

#[tokio::test]
async fn unknown_request_keeps_client_connected() {
    let harness = Harness::new().await;
    let mut stream = raw(harness.client_addr).await;
    stream
        .send(&to_payload(&client::Hello { steam_id: 5 }).unwrap())
        .await
        .unwrap();
    let client::Welcome(record) = from_payload(stream.recv().await.unwrap().unwrap()).unwrap();
    assert!(record.is_some());

    stream.send(&[255]).await.unwrap();
    stream.send(&[0]).await.unwrap();
    stream.send(&[2]).await.unwrap();
    // The first reply must belong to the population request
    let population: client::Population = from_payload(stream.recv().await.unwrap().unwrap()).unwrap();
    assert_eq!(population, client::Population { players: 0, servers: 0 });
}

#[tokio::test]
async fn keepalive_gets_no_reply() {
    let harness = Harness::new().await;
    let mut heartbeat = Heartbeat::connect(harness.game_addr, &alpha()).await.unwrap();
    heartbeat.keepalive().await.unwrap();
    // A reply to the keepalive would be mistaken for the account record
    let record = heartbeat.validate_account(31).await.unwrap();
    assert_eq!(record.profile.steam_id, 31);
    assert_eq!(record.profile.name, "Player_31");
}

#[tokio::test]
async fn disconnect_deregisters() {
    let harness = Harness::new().await;
    let heartbeat = Heartbeat::connect(harness.game_addr, &alpha()).await.unwrap();
    assert_eq!(harness.lobby().live_servers().len(), 1);
    drop(heartbeat);
    harness.until(|h| h.lobby().servers.is_empty()).await;
}

#[tokio::test]
async fn closing_merges_stats_and_deregisters() {
    let harness = Harness::new().await;
    let mut heartbeat = Heartbeat::connect(harness.game_addr, &alpha()).await.unwrap();
    heartbeat.set_player_count(2).await.unwrap();
    heartbeat.set_external_id("90001".into()).await.unwrap();
    heartbeat.update_stats(report(7, 1)).await.unwrap();
    heartbeat
        .close(vec![report(7, 4), report(8, 2)])
        .await
        .unwrap();
    harness.until(|h| h.lobby().servers.is_empty()).await;

    let players = &harness.lobby().players;
    let first = players.get(7).unwrap();
    assert_eq!(first.profile.stats.kills, 4);
    assert_eq!(first.profile.xp, 250);
    assert_eq!(first.weapon_kills.get(&3), Some(&4));
    assert_eq!(players.get(8).unwrap().profile.stats.kills, 2);
}

#[tokio::test]
async fn status_updates_are_listed() {
    let harness = Harness::new().await;
    let mut heartbeat = Heartbeat::connect(harness.game_addr, &alpha()).await.unwrap();
    heartbeat.set_player_count(12).await.unwrap();
    heartbeat.set_external_id("90001".into()).await.unwrap();
    let (mut client, _) = Client::connect(harness.client_addr, 1).await.unwrap();
    harness
        .until(|h| {
            h.lobby()
                .live_servers()
                .first()
                .map_or(false, |e| e.external_id.is_some())
        })
        .await;
    let servers = client.server_list().await.unwrap();
    assert_eq!(servers[0].current_players, 12);
    assert_eq!(servers[0].external_id, "90001");
    let population = client.population().await.unwrap();
    assert_eq!(population, client::Population { players: 12, servers: 1 });
}

#[tokio::test]
async fn malformed_handshake_is_refused() {
    let harness = Harness::new().await;
    let mut stream = raw(harness.game_addr).await;
    stream.send(&[1, 9, 0, b'A']).await.unwrap();
    let reply = stream.recv().await.unwrap().unwrap();
    assert_eq!(&reply[..], &[0]);
    assert!(stream.recv().await.unwrap().is_none());
    assert!(harness.lobby().servers.is_empty());
}

#[tokio::test]
async fn oversized_frame_disconnects() {
    let harness = Harness::start(Config {
        frame: FrameConfig {
            max_message_size: 1024,
            max_buffered: 4096,
        },
        ..Config::default()
    })
    .await;
    let mut stream = TcpStream::connect(harness.client_addr).await.unwrap();
    stream.write_all(&2000u32.to_le_bytes()).await.unwrap();
    let mut buf = [0; 16];
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .unwrap();
    // Either a clean close or a reset, but never data
    assert!(matches!(read, Ok(0) | Err(_)));
}

#[tokio::test]
async fn idle_connection_is_dropped() {
    let harness = Harness::start(Config {
        idle_timeout: Duration::from_millis(200),
        ..Config::default()
    })
    .await;
    let _heartbeat = Heartbeat::connect(harness.game_addr, &alpha()).await.unwrap();
    assert_eq!(harness.lobby().servers.len(), 1);
    harness.until(|h| h.lobby().servers.is_empty()).await;

    let mut stream = raw(harness.client_addr).await;
    let closed = tokio::time::timeout(Duration::from_secs(5), stream.recv())
        .await
        .unwrap();
    assert!(matches!(closed, Ok(None) | Err(_)));
}

#[tokio::test]
async fn shutdown_closes_connections() {
    let harness = Harness::new().await;
    let (mut client, _) = Client::connect(harness.client_addr, 1).await.unwrap();
    let _heartbeat = Heartbeat::connect(harness.game_addr, &alpha()).await.unwrap();
    harness.until(|h| h.server.connection_count() == 2).await;

    harness.server.shutdown();
    harness.until(|h| h.server.connection_count() == 0).await;
    assert!(harness.lobby().servers.is_empty());
    assert!(client.server_list().await.is_err());
}

#[tokio::test]
async fn replaced_registration_survives_old_connection() {
    let harness = Harness::new().await;
    let old = Heartbeat::connect(
        harness.game_addr,
        &game::Hello {
            name: "Old".into(),
            ..alpha()
        },
    )
    .await
    .unwrap();
    let mut new = Heartbeat::connect(
        harness.game_addr,
        &game::Hello {
            name: "New".into(),
            ..alpha()
        },
    )
    .await
    .unwrap();
    harness.until(|h| h.server.connection_count() == 2).await;
    drop(old);
    harness.until(|h| h.server.connection_count() == 1).await;

    new.keepalive().await.unwrap();
    new.set_player_count(3).await.unwrap();
    let (mut client, _) = Client::connect(harness.client_addr, 1).await.unwrap();
    let servers = client.server_list().await.unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].name, "New");
    assert_eq!(servers[0].current_players, 3);
}

#[tokio::test]
async fn peer_that_stops_reading_is_dropped() {
    let harness = Harness::start(Config {
        idle_timeout: Duration::from_millis(300),
        ..Config::default()
    })
    .await;
    let mut heartbeat = Heartbeat::connect(
        harness.game_addr,
        &game::Hello {
            name: "x".repeat(60_000),
            ..alpha()
        },
    )
    .await
    .unwrap();
    tokio::spawn(async move {
        let _ = heartbeat.run(Duration::from_millis(50)).await;
    });

    let mut stream = raw(harness.client_addr).await;
    stream
        .send(&to_payload(&client::Hello { steam_id: 5 }).unwrap())
        .await
        .unwrap();
    stream.recv().await.unwrap().unwrap();
    harness.until(|h| h.server.connection_count() == 2).await;
    // Ask for far more listing data than the socket buffers hold, and never read it
    for _ in 0..2000 {
        stream.send(&[1]).await.unwrap();
    }
    harness.until(|h| h.server.connection_count() == 1).await;
    assert_eq!(harness.lobby().live_servers().len(), 1);
}
