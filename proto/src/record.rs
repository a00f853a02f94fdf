//! Records shared by both roles

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::{Decode, DecodeError, Encode, EncodeError, Reader, Writer};

/// Kill counts keyed by weapon ID
pub type WeaponKills = BTreeMap<i16, i32>;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub kills: i32,
    pub deaths: i32,
    pub wins: i32,
    pub losses: i32,
    pub friendly_shots: i32,
    pub friendly_kills: i32,
}

impl Encode for Stats {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.put_i32(self.kills);
        w.put_i32(self.deaths);
        w.put_i32(self.wins);
        w.put_i32(self.losses);
        w.put_i32(self.friendly_shots);
        w.put_i32(self.friendly_kills);
        Ok(())
    }
}

impl Decode for Stats {
    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        Ok(Self {
            kills: r.get_i32()?,
            deaths: r.get_i32()?,
            wins: r.get_i32()?,
            losses: r.get_i32()?,
            friendly_shots: r.get_i32()?,
            friendly_kills: r.get_i32()?,
        })
    }
}

/// Identity, progression and standing of a player
///
/// Shared prefix of [`PlayerRecord`] and [`StatBlock`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub steam_id: u64,
    pub name: String,
    pub avatar_url: String,
    pub permission_level: u8,
    pub rank: u8,
    pub xp: i32,
    pub stats: Stats,
    pub is_patreon_backer: bool,
    pub is_clan_owner: bool,
    pub is_banned: bool,
    pub clan: String,
}

impl Profile {
    /// A fresh profile with no progress
    pub fn new(steam_id: u64, name: String, avatar_url: String) -> Self {
        Self {
            steam_id,
            name,
            avatar_url,
            permission_level: 0,
            rank: 1,
            xp: 0,
            stats: Stats::default(),
            is_patreon_backer: false,
            is_clan_owner: false,
            is_banned: false,
            clan: String::new(),
        }
    }
}

impl Encode for Profile {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.put_u64(self.steam_id);
        w.put_str(&self.name)?;
        w.put_str(&self.avatar_url)?;
        w.put_u8(self.permission_level);
        w.put_u8(self.rank);
        w.put_i32(self.xp);
        w.put(&self.stats)?;
        w.put_bool(self.is_patreon_backer);
        w.put_bool(self.is_clan_owner);
        w.put_bool(self.is_banned);
        w.put_str(&self.clan)
    }
}

impl Decode for Profile {
    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        Ok(Self {
            steam_id: r.get_u64()?,
            name: r.get_string()?,
            avatar_url: r.get_string()?,
            permission_level: r.get_u8()?,
            rank: r.get_u8()?,
            xp: r.get_i32()?,
            stats: r.get()?,
            is_patreon_backer: r.get_bool()?,
            is_clan_owner: r.get_bool()?,
            is_banned: r.get_bool()?,
            clan: r.get_string()?,
        })
    }
}

fn put_weapon_kills(w: &mut Writer, kills: &WeaponKills) -> Result<(), EncodeError> {
    let count = i16::try_from(kills.len()).map_err(|_| EncodeError::TooManyItems {
        count: kills.len(),
    })?;
    w.put_i16(count);
    for (&weapon, &n) in kills {
        w.put_i16(weapon);
        w.put_i32(n);
    }
    Ok(())
}

fn get_weapon_kills(r: &mut Reader) -> Result<WeaponKills, DecodeError> {
    let count = r.get_i16()?;
    let mut kills = WeaponKills::new();
    for _ in 0..count {
        let weapon = r.get_i16()?;
        kills.insert(weapon, r.get_i32()?);
    }
    Ok(kills)
}

/// A player's profile as sent to peers
///
/// Weapon kills are written inline, after an always-empty preferences count.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    pub profile: Profile,
    pub weapon_kills: WeaponKills,
}

impl PlayerRecord {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            weapon_kills: WeaponKills::new(),
        }
    }
}

impl Encode for PlayerRecord {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.put(&self.profile)?;
        // Preferences aren't stored; peers expect the field regardless
        w.put_i16(0);
        put_weapon_kills(w, &self.weapon_kills)
    }
}

impl Decode for PlayerRecord {
    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        let profile = r.get()?;
        // preferences count, always zero
        r.get_i16()?;
        Ok(Self {
            profile,
            weapon_kills: get_weapon_kills(r)?,
        })
    }
}

/// A player's full statistics as reported by a game server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatBlock {
    pub profile: Profile,
    /// Opaque client preferences
    pub prefs: Bytes,
    pub weapon_kills: WeaponKills,
}

impl Encode for StatBlock {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.put(&self.profile)?;
        w.put_bytes(&self.prefs)?;
        w.put_nested(|w| put_weapon_kills(w, &self.weapon_kills))
    }
}

impl Decode for StatBlock {
    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        let profile = r.get()?;
        let prefs = r.get_bytes()?;
        let mut kills = r.get_nested()?;
        let weapon_kills = if kills.is_empty() {
            WeaponKills::new()
        } else {
            get_weapon_kills(&mut kills)?
        };
        Ok(Self {
            profile,
            prefs,
            weapon_kills,
        })
    }
}

/// A [`StatBlock`] addressed to the player it should be merged into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatReport {
    pub steam_id: u64,
    pub block: StatBlock,
}

impl Encode for StatReport {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.put_u64(self.steam_id);
        w.put(&self.block)
    }
}

impl Decode for StatReport {
    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        Ok(Self {
            steam_id: r.get_u64()?,
            block: r.get()?,
        })
    }
}

/// A live game server as listed to clients
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub ip: String,
    pub port: i32,
    pub map: String,
    pub mode: String,
    pub extra_info: String,
    pub max_players: i32,
    pub current_players: i32,
    pub is_protected: bool,
    /// Empty when the server never reported one
    pub external_id: String,
    pub region: u8,
}

impl Encode for ServerInfo {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.put_str(&self.name)?;
        w.put_str(&self.ip)?;
        w.put_i32(self.port);
        w.put_str(&self.map)?;
        w.put_str(&self.mode)?;
        w.put_str(&self.extra_info)?;
        w.put_i32(self.max_players);
        w.put_i32(self.current_players);
        w.put_bool(self.is_protected);
        w.put_str(&self.external_id)?;
        w.put_u8(self.region);
        Ok(())
    }
}

impl Decode for ServerInfo {
    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        Ok(Self {
            name: r.get_string()?,
            ip: r.get_string()?,
            port: r.get_i32()?,
            map: r.get_string()?,
            mode: r.get_string()?,
            extra_info: r.get_string()?,
            max_players: r.get_i32()?,
            current_players: r.get_i32()?,
            is_protected: r.get_bool()?,
            external_id: r.get_string()?,
            region: r.get_u8()?,
        })
    }
}
