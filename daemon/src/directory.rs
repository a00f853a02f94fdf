//! Live index of registered game servers

use std::{
    fmt,
    net::IpAddr,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use indexmap::IndexMap;
use lobby_proto::{game, ServerInfo};
use parking_lot::RwLock;

/// `ip:port` of a game server, as clients should reach it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerKey(String);

impl ServerKey {
    /// IPv4-mapped IPv6 addresses are unmapped so dual-stack listeners agree with IPv4 ones
    pub fn new(ip: IpAddr, port: i32) -> Self {
        ServerKey(format!("{}:{}", ip.to_canonical(), port))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A connection's claim on a directory key
///
/// Registering an address again hands out a new generation, so the connection that held the previous one can no
/// longer touch, update or remove the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    key: ServerKey,
    generation: u64,
}

impl Registration {
    pub fn new(key: ServerKey, generation: u64) -> Self {
        Self { key, generation }
    }

    pub fn key(&self) -> &ServerKey {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for Registration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", self.key, self.generation)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    pub key: ServerKey,
    pub ip: IpAddr,
    pub port: i32,
    pub region: u8,
    pub name: String,
    pub map: String,
    pub mode: String,
    pub extra_info: String,
    pub max_players: u8,
    pub current_players: i32,
    pub is_protected: bool,
    pub external_id: Option<String>,
    pub last_seen: Instant,
    /// Set by the directory on registration
    pub generation: u64,
}

impl DirectoryEntry {
    pub fn from_hello(ip: IpAddr, hello: game::Hello) -> Self {
        let ip = ip.to_canonical();
        Self {
            key: ServerKey::new(ip, hello.port),
            ip,
            port: hello.port,
            region: hello.region,
            name: hello.name,
            map: hello.map,
            mode: hello.mode,
            extra_info: hello.extra_info,
            max_players: hello.max_players,
            current_players: 0,
            is_protected: hello.is_protected,
            external_id: None,
            last_seen: Instant::now(),
            generation: 0,
        }
    }

    /// Whether a heartbeat arrived within `window` of `now`
    pub fn is_live(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) <= window
    }

    pub fn to_server_info(&self) -> ServerInfo {
        ServerInfo {
            name: self.name.clone(),
            ip: self.ip.to_string(),
            port: self.port,
            map: self.map.clone(),
            mode: self.mode.clone(),
            extra_info: self.extra_info.clone(),
            max_players: self.max_players.into(),
            current_players: self.current_players,
            is_protected: self.is_protected,
            external_id: self.external_id.clone().unwrap_or_default(),
            region: self.region,
        }
    }
}

/// Storage backing the server directory
///
/// Only the newest [`Registration`] for a key may change its entry; methods given a superseded one do nothing.
/// Methods returning `bool` report whether the registration still owned its entry.
pub trait GameServerStore: Send + Sync + 'static {
    /// Insert or replace the entry for `entry.key`, marking it seen now
    fn register_or_refresh(&self, entry: DirectoryEntry) -> Registration;
    /// Entries seen within `max_age`, in registration order
    fn list_active(&self, max_age: Duration) -> Vec<DirectoryEntry>;
    fn remove(&self, registration: &Registration) -> bool;
    fn touch(&self, registration: &Registration) -> bool;
    fn set_player_count(&self, registration: &Registration, count: i32) -> bool;
    fn set_external_id(&self, registration: &Registration, id: String) -> bool;
    /// Drop entries older than `max_age`, returning how many were dropped
    fn evict_stale(&self, max_age: Duration) -> usize;
    fn clear(&self);
}

/// In-memory [`GameServerStore`]
#[derive(Default)]
pub struct ServerDirectory {
    entries: RwLock<IndexMap<ServerKey, DirectoryEntry>>,
    next_generation: AtomicU64,
}

impl ServerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &ServerKey) -> Option<DirectoryEntry> {
        self.entries.read().get(key).cloned()
    }

    pub fn list_active_at(&self, now: Instant, max_age: Duration) -> Vec<DirectoryEntry> {
        self.entries
            .read()
            .values()
            .filter(|e| e.is_live(now, max_age))
            .cloned()
            .collect()
    }

    pub fn evict_stale_at(&self, now: Instant, max_age: Duration) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now, max_age));
        before - entries.len()
    }

    fn update(&self, registration: &Registration, f: impl FnOnce(&mut DirectoryEntry)) -> bool {
        match self.entries.write().get_mut(&registration.key) {
            Some(entry) if entry.generation == registration.generation => {
                f(entry);
                true
            }
            _ => false,
        }
    }
}

impl GameServerStore for ServerDirectory {
    fn register_or_refresh(&self, mut entry: DirectoryEntry) -> Registration {
        entry.last_seen = Instant::now();
        entry.generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let registration = Registration::new(entry.key.clone(), entry.generation);
        self.entries.write().insert(entry.key.clone(), entry);
        registration
    }

    fn list_active(&self, max_age: Duration) -> Vec<DirectoryEntry> {
        self.list_active_at(Instant::now(), max_age)
    }

    fn remove(&self, registration: &Registration) -> bool {
        let mut entries = self.entries.write();
        let owned = entries
            .get(&registration.key)
            .map_or(false, |e| e.generation == registration.generation);
        if owned {
            // shift_remove keeps listing order stable for everyone else
            entries.shift_remove(&registration.key);
        }
        owned
    }

    fn touch(&self, registration: &Registration) -> bool {
        self.update(registration, |e| e.last_seen = Instant::now())
    }

    fn set_player_count(&self, registration: &Registration, count: i32) -> bool {
        self.update(registration, |e| {
            e.current_players = count;
            e.last_seen = Instant::now();
        })
    }

    fn set_external_id(&self, registration: &Registration, id: String) -> bool {
        self.update(registration, |e| {
            e.external_id = Some(id);
            e.last_seen = Instant::now();
        })
    }

    fn evict_stale(&self, max_age: Duration) -> usize {
        self.evict_stale_at(Instant::now(), max_age)
    }

    fn clear(&self) {
        self.entries.write().clear();
    }
}
