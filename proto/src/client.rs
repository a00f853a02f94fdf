//! Protocol for communication between game clients and the lobby server

use crate::codec::{Decode, DecodeError, Encode, EncodeError, Reader, Writer};
use crate::record::{PlayerRecord, ServerInfo};

/// Message sent by the game client on connect
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Hello {
    pub steam_id: u64,
}

impl Encode for Hello {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.put_u64(self.steam_id);
        Ok(())
    }
}

impl Decode for Hello {
    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        Ok(Self {
            steam_id: r.get_u64()?,
        })
    }
}

/// Reply to [`Hello`]: the player's record on success
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Welcome(pub Option<PlayerRecord>);

impl Encode for Welcome {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.put_bool(self.0.is_some());
        match self.0 {
            Some(ref record) => w.put(record),
            None => Ok(()),
        }
    }
}

impl Decode for Welcome {
    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        Ok(Welcome(if r.get_bool()? { Some(r.get()?) } else { None }))
    }
}

request_kinds! {
    /// Request types a game client may send after its handshake
    pub enum RequestKind {
        Keepalive = 0,
        ServerList = 1,
        /// Total players and servers across the directory
        Population = 2,
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Request {
    Keepalive,
    ServerList,
    Population,
}

impl Request {
    pub fn kind(self) -> RequestKind {
        match self {
            Request::Keepalive => RequestKind::Keepalive,
            Request::ServerList => RequestKind::ServerList,
            Request::Population => RequestKind::Population,
        }
    }
}

impl Encode for Request {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.put_u8(self.kind().code());
        Ok(())
    }
}

impl Decode for Request {
    /// An empty payload is a keepalive
    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        if r.is_empty() {
            return Ok(Request::Keepalive);
        }
        let code = r.get_u8()?;
        let kind = RequestKind::from_code(code).ok_or(DecodeError::UnknownRequest(code))?;
        Ok(match kind {
            RequestKind::Keepalive => Request::Keepalive,
            RequestKind::ServerList => Request::ServerList,
            RequestKind::Population => Request::Population,
        })
    }
}

/// Leading byte of a [`Population`] reply, which doesn't echo its request code
const POPULATION_TAG: u8 = 0;

fn expect_tag(r: &mut Reader, expected: u8) -> Result<(), DecodeError> {
    let tag = r.get_u8()?;
    if tag != expected {
        return Err(DecodeError::UnexpectedTag(tag));
    }
    Ok(())
}

/// Reply to [`Request::ServerList`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerList(pub Vec<ServerInfo>);

impl Encode for ServerList {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        let count = u16::try_from(self.0.len()).map_err(|_| EncodeError::TooManyItems {
            count: self.0.len(),
        })?;
        w.put_u8(RequestKind::ServerList.code());
        w.put_u16(count);
        for server in &self.0 {
            w.put(server)?;
        }
        Ok(())
    }
}

impl Decode for ServerList {
    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        expect_tag(r, RequestKind::ServerList.code())?;
        let count = r.get_u16()?;
        let mut servers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            servers.push(r.get()?);
        }
        Ok(ServerList(servers))
    }
}

/// Reply to [`Request::Population`]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Population {
    pub players: i32,
    pub servers: i32,
}

impl Encode for Population {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.put_u8(POPULATION_TAG);
        w.put_i32(self.players);
        w.put_i32(self.servers);
        Ok(())
    }
}

impl Decode for Population {
    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        expect_tag(r, POPULATION_TAG)?;
        Ok(Self {
            players: r.get_i32()?,
            servers: r.get_i32()?,
        })
    }
}
