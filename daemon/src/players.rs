//! Player profiles

use std::{
    collections::HashMap,
    future::Future,
    io,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use lobby_proto::{PlayerRecord, Profile, StatBlock};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::identity::{Identity, IdentityLookup};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistent player profiles
pub trait PlayerStore: Send + Sync + 'static {
    /// Fetch a profile, creating it on first contact
    ///
    /// New profiles are named through the identity lookup, or a placeholder if that fails.
    fn get_or_create(&self, steam_id: u64) -> impl Future<Output = Result<PlayerRecord, StoreError>> + Send;
    /// Overwrite stats and weapon kills from `block`, creating the profile if needed
    fn merge_stats(&self, steam_id: u64, block: &StatBlock) -> impl Future<Output = Result<(), StoreError>> + Send;
    fn touch_last_seen(&self, steam_id: u64) -> impl Future<Output = Result<(), StoreError>> + Send;
    /// Persist anything held in memory
    fn flush(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct StoredPlayer {
    record: PlayerRecord,
    /// Seconds since the Unix epoch
    last_seen: u64,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Profiles held in memory, optionally snapshotted to a JSON file
pub struct MemoryPlayerStore<I> {
    players: RwLock<HashMap<u64, StoredPlayer>>,
    identity: I,
    default_avatar: String,
    snapshot: Option<PathBuf>,
}

impl<I: IdentityLookup> MemoryPlayerStore<I> {
    pub fn new(identity: I, default_avatar: String) -> Self {
        Self {
            players: RwLock::new(HashMap::new()),
            identity,
            default_avatar,
            snapshot: None,
        }
    }

    /// Load profiles from `path` if it exists, and write them back there on [`PlayerStore::flush`]
    pub async fn open(identity: I, default_avatar: String, path: PathBuf) -> Result<Self, StoreError> {
        let players = match tokio::fs::read(&path).await {
            Ok(data) => {
                let list: Vec<StoredPlayer> = serde_json::from_slice(&data)?;
                list.into_iter().map(|p| (p.record.profile.steam_id, p)).collect()
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        info!(path = %path.display(), count = players.len(), "loaded player profiles");
        Ok(Self {
            players: RwLock::new(players),
            identity,
            default_avatar,
            snapshot: Some(path),
        })
    }

    pub fn len(&self) -> usize {
        self.players.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, steam_id: u64) -> Option<PlayerRecord> {
        self.players.read().get(&steam_id).map(|p| p.record.clone())
    }

    pub fn last_seen(&self, steam_id: u64) -> Option<u64> {
        self.players.read().get(&steam_id).map(|p| p.last_seen)
    }

    async fn resolve(&self, steam_id: u64) -> Identity {
        match self.identity.lookup(steam_id).await {
            Ok(x) => x,
            Err(e) => {
                debug!(steam_id, "identity lookup failed: {}", e);
                Identity::placeholder(steam_id, &self.default_avatar)
            }
        }
    }
}

impl<I: IdentityLookup> PlayerStore for MemoryPlayerStore<I> {
    async fn get_or_create(&self, steam_id: u64) -> Result<PlayerRecord, StoreError> {
        let existing = self.players.read().get(&steam_id).map(|p| p.record.clone());
        if let Some(record) = existing {
            return Ok(record);
        }
        // No lock is held across the lookup; a concurrent creation wins
        let identity = self.resolve(steam_id).await;
        let mut players = self.players.write();
        let player = players.entry(steam_id).or_insert_with(|| {
            info!(steam_id, name = %identity.name, "created player");
            StoredPlayer {
                record: PlayerRecord::new(Profile::new(steam_id, identity.name, identity.avatar_url)),
                last_seen: unix_now(),
            }
        });
        Ok(player.record.clone())
    }

    async fn merge_stats(&self, steam_id: u64, block: &StatBlock) -> Result<(), StoreError> {
        let mut players = self.players.write();
        let player = players.entry(steam_id).or_insert_with(|| {
            let mut profile = block.profile.clone();
            profile.steam_id = steam_id;
            StoredPlayer {
                record: PlayerRecord::new(profile),
                last_seen: 0,
            }
        });
        player.record.profile.stats = block.profile.stats.clone();
        player.record.weapon_kills = block.weapon_kills.clone();
        player.last_seen = unix_now();
        Ok(())
    }

    async fn touch_last_seen(&self, steam_id: u64) -> Result<(), StoreError> {
        match self.players.write().get_mut(&steam_id) {
            Some(player) => player.last_seen = unix_now(),
            None => warn!(steam_id, "keepalive for unknown player"),
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let path = match self.snapshot {
            Some(ref path) => path,
            None => return Ok(()),
        };
        let data = {
            let players = self.players.read();
            let mut list: Vec<&StoredPlayer> = players.values().collect();
            list.sort_by_key(|p| p.record.profile.steam_id);
            serde_json::to_vec_pretty(&list)?
        };
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, path).await?;
        info!(path = %path.display(), "saved player profiles");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{LookupError, Offline};
    use bytes::Bytes;
    use lobby_proto::WeaponKills;

    struct Named(&'static str);

    impl IdentityLookup for Named {
        async fn lookup(&self, _: u64) -> Result<Identity, LookupError> {
            Ok(Identity {
                name: self.0.into(),
                avatar_url: "http://avatars/1.png".into(),
            })
        }
    }

    fn block(steam_id: u64, kills: i32) -> StatBlock {
        let mut profile = Profile::new(steam_id, "Reported".into(), "http://r.png".into());
        profile.stats.kills = kills;
        profile.xp = 99;
        let mut weapon_kills = WeaponKills::new();
        weapon_kills.insert(4, kills);
        StatBlock {
            profile,
            prefs: Bytes::new(),
            weapon_kills,
        }
    }

    #[tokio::test]
    async fn new_player_has_clean_record() {
        let store = MemoryPlayerStore::new(Offline, "http://default.png".into());
        let record = store.get_or_create(76561198000000000).await.unwrap();
        assert_eq!(record.profile.steam_id, 76561198000000000);
        assert_eq!(record.profile.name, "Player_0000");
        assert_eq!(record.profile.avatar_url, "http://default.png");
        assert_eq!(record.profile.stats, Default::default());
        assert_eq!(record.profile.rank, 1);
        assert!(record.weapon_kills.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn lookup_names_new_players_once() {
        let store = MemoryPlayerStore::new(Named("Ann"), String::new());
        assert_eq!(store.get_or_create(5).await.unwrap().profile.name, "Ann");
        store.merge_stats(5, &block(5, 3)).await.unwrap();
        let record = store.get_or_create(5).await.unwrap();
        assert_eq!(record.profile.name, "Ann");
        assert_eq!(record.profile.stats.kills, 3);
    }

    #[tokio::test]
    async fn merge_overwrites_stats_only() {
        let store = MemoryPlayerStore::new(Named("Ann"), String::new());
        store.get_or_create(5).await.unwrap();
        store.merge_stats(5, &block(5, 10)).await.unwrap();
        store.merge_stats(5, &block(5, 4)).await.unwrap();
        let record = store.get(5).unwrap();
        assert_eq!(record.profile.stats.kills, 4);
        assert_eq!(record.weapon_kills.get(&4), Some(&4));
        assert_eq!(record.profile.xp, 0);
        assert_eq!(record.profile.name, "Ann");
    }

    #[tokio::test]
    async fn merge_creates_unknown_players() {
        let store = MemoryPlayerStore::new(Offline, String::new());
        store.merge_stats(8, &block(9, 2)).await.unwrap();
        let record = store.get(8).unwrap();
        assert_eq!(record.profile.steam_id, 8);
        assert_eq!(record.profile.name, "Reported");
        assert_eq!(record.profile.xp, 99);
        assert!(store.get(9).is_none());
    }

    #[tokio::test]
    async fn touch_updates_last_seen() {
        let store = MemoryPlayerStore::new(Offline, String::new());
        store.merge_stats(8, &block(8, 2)).await.unwrap();
        store.players.write().get_mut(&8).unwrap().last_seen = 0;
        store.touch_last_seen(8).await.unwrap();
        assert!(store.last_seen(8).unwrap() > 0);
        store.touch_last_seen(1234).await.unwrap();
    }

    #[tokio::test]
    async fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("players.json");

        let store = MemoryPlayerStore::open(Offline, String::new(), path.clone()).await.unwrap();
        assert!(store.is_empty());
        store.get_or_create(1).await.unwrap();
        store.merge_stats(2, &block(2, 7)).await.unwrap();
        store.flush().await.unwrap();

        let reopened = MemoryPlayerStore::open(Offline, String::new(), path).await.unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get(2).unwrap().weapon_kills.get(&4), Some(&7));
        assert_eq!(reopened.get(1), store.get(1));
    }
}
