//! Display names and avatars for new players

use std::{future::Future, time::Duration};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub avatar_url: String,
}

impl Identity {
    /// Stand-in used when no lookup service answers
    pub fn placeholder(steam_id: u64, avatar_url: &str) -> Self {
        let digits = steam_id.to_string();
        let tail = &digits[digits.len().saturating_sub(4)..];
        Self {
            name: format!("Player_{}", tail),
            avatar_url: avatar_url.to_owned(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("identity lookup disabled")]
    Disabled,
    #[error("no such player")]
    NotFound,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub trait IdentityLookup: Send + Sync + 'static {
    fn lookup(&self, steam_id: u64) -> impl Future<Output = Result<Identity, LookupError>> + Send;
}

/// Never resolves anything; every player gets a placeholder
#[derive(Debug, Default, Copy, Clone)]
pub struct Offline;

impl IdentityLookup for Offline {
    async fn lookup(&self, _: u64) -> Result<Identity, LookupError> {
        Err(LookupError::Disabled)
    }
}

pub const STEAM_API: &str = "https://api.steampowered.com";

/// `ISteamUser/GetPlayerSummaries` from the Steam Web API
pub struct SteamWebApi {
    http: reqwest::Client,
    base: String,
    key: String,
}

impl SteamWebApi {
    pub fn new(key: String, timeout: Duration) -> Result<Self, LookupError> {
        Self::with_base(STEAM_API.into(), key, timeout)
    }

    pub fn with_base(base: String, key: String, timeout: Duration) -> Result<Self, LookupError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base, key })
    }
}

#[derive(Deserialize)]
struct Summaries {
    response: SummaryList,
}

#[derive(Deserialize)]
struct SummaryList {
    #[serde(default)]
    players: Vec<Summary>,
}

#[derive(Deserialize)]
struct Summary {
    personaname: String,
    avatarfull: String,
}

impl Summaries {
    fn into_identity(self) -> Result<Identity, LookupError> {
        let player = self
            .response
            .players
            .into_iter()
            .next()
            .ok_or(LookupError::NotFound)?;
        Ok(Identity {
            name: player.personaname,
            avatar_url: player.avatarfull,
        })
    }
}

impl IdentityLookup for SteamWebApi {
    async fn lookup(&self, steam_id: u64) -> Result<Identity, LookupError> {
        let url = format!("{}/ISteamUser/GetPlayerSummaries/v2/", self.base);
        let steam_id = steam_id.to_string();
        let summaries: Summaries = self
            .http
            .get(url)
            .query(&[("key", self.key.as_str()), ("steamids", steam_id.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        summaries.into_identity()
    }
}

/// The lookup chosen at startup
pub enum IdentityService {
    Offline(Offline),
    Steam(SteamWebApi),
}

impl IdentityLookup for IdentityService {
    async fn lookup(&self, steam_id: u64) -> Result<Identity, LookupError> {
        match self {
            IdentityService::Offline(x) => x.lookup(steam_id).await,
            IdentityService::Steam(x) => x.lookup(steam_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_uses_last_digits() {
        let id = Identity::placeholder(76561198000001234, "http://x/a.png");
        assert_eq!(id.name, "Player_1234");
        assert_eq!(id.avatar_url, "http://x/a.png");
        assert_eq!(Identity::placeholder(42, "").name, "Player_42");
    }

    #[test]
    fn parse_summaries() {
        let json = r#"{"response":{"players":[{"steamid":"1","personaname":"Ann","avatarfull":"http://a/full.jpg","avatar":"x"}]}}"#;
        let summaries: Summaries = serde_json::from_str(json).unwrap();
        assert_eq!(
            summaries.into_identity().unwrap(),
            Identity {
                name: "Ann".into(),
                avatar_url: "http://a/full.jpg".into()
            }
        );

        let empty: Summaries = serde_json::from_str(r#"{"response":{}}"#).unwrap();
        assert!(matches!(empty.into_identity(), Err(LookupError::NotFound)));
    }

    #[tokio::test]
    async fn offline_never_resolves() {
        assert!(matches!(Offline.lookup(1).await, Err(LookupError::Disabled)));
    }
}
