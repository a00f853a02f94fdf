//! Protocol for communication between game servers and the lobby server

use crate::codec::{Decode, DecodeError, Encode, EncodeError, Reader, Writer};
use crate::record::StatReport;

/// Message sent by the game server on connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub region: u8,
    pub name: String,
    /// The port game clients should connect to
    pub port: i32,
    pub map: String,
    pub mode: String,
    pub extra_info: String,
    pub max_players: u8,
    pub is_protected: bool,
}

impl Encode for Hello {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.put_u8(self.region);
        w.put_str(&self.name)?;
        w.put_i32(self.port);
        w.put_str(&self.map)?;
        w.put_str(&self.mode)?;
        w.put_str(&self.extra_info)?;
        w.put_u8(self.max_players);
        w.put_bool(self.is_protected);
        Ok(())
    }
}

impl Decode for Hello {
    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        Ok(Self {
            region: r.get_u8()?,
            name: r.get_string()?,
            port: r.get_i32()?,
            map: r.get_string()?,
            mode: r.get_string()?,
            extra_info: r.get_string()?,
            max_players: r.get_u8()?,
            is_protected: r.get_bool()?,
        })
    }
}

request_kinds! {
    /// Request types a game server may send after its handshake
    pub enum RequestKind {
        Keepalive = 0,
        /// Look up a joining player; answered with a [`PlayerRecord`](crate::PlayerRecord)
        ValidateAccount = 1,
        PlayerDisconnected = 2,
        /// Final stats for everyone still connected, then deregistration
        Closing = 3,
        UpdateStats = 4,
        PlayerCount = 5,
        SetExternalId = 12,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Keepalive,
    ValidateAccount { steam_id: u64 },
    PlayerDisconnected(StatReport),
    Closing(Vec<StatReport>),
    UpdateStats(StatReport),
    PlayerCount(i32),
    SetExternalId(String),
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        use Request::*;
        match *self {
            Keepalive => RequestKind::Keepalive,
            ValidateAccount { .. } => RequestKind::ValidateAccount,
            PlayerDisconnected(_) => RequestKind::PlayerDisconnected,
            Closing(_) => RequestKind::Closing,
            UpdateStats(_) => RequestKind::UpdateStats,
            PlayerCount(_) => RequestKind::PlayerCount,
            SetExternalId(_) => RequestKind::SetExternalId,
        }
    }
}

impl Encode for Request {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.put_u8(self.kind().code());
        match *self {
            Request::Keepalive => {}
            Request::ValidateAccount { steam_id } => w.put_u64(steam_id),
            Request::PlayerDisconnected(ref report) | Request::UpdateStats(ref report) => {
                w.put(report)?
            }
            Request::Closing(ref reports) => {
                let count = u8::try_from(reports.len()).map_err(|_| EncodeError::TooManyItems {
                    count: reports.len(),
                })?;
                w.put_u8(count);
                for report in reports {
                    w.put(report)?;
                }
            }
            Request::PlayerCount(n) => w.put_i32(n),
            Request::SetExternalId(ref id) => w.put_str(id)?,
        }
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
            RequestKind::ValidateAccount => Request::ValidateAccount {
                steam_id: r.get_u64()?,
            },
            RequestKind::PlayerDisconnected => Request::PlayerDisconnected(r.get()?),
            RequestKind::Closing => {
                let count = r.get_u8()?;
                let mut reports = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    reports.push(r.get()?);
                }
                Request::Closing(reports)
            }
            RequestKind::UpdateStats => Request::UpdateStats(r.get()?),
            RequestKind::PlayerCount => Request::PlayerCount(r.get_i32()?),
            RequestKind::SetExternalId => Request::SetExternalId(r.get_string()?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{from_payload, to_payload};

    #[test]
    fn table_is_consistent() {
        for &kind in RequestKind::ALL {
            assert_eq!(RequestKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(RequestKind::from_code(6), None);
        assert_eq!(RequestKind::from_code(255), None);
    }

    #[test]
    fn hello_layout() {
        let hello = Hello {
            region: 1,
            name: "Alpha".into(),
            port: 1000,
            map: "Valley".into(),
            mode: "TDM".into(),
            extra_info: String::new(),
            max_players: 64,
            is_protected: false,
        };
        let bytes = to_payload(&hello).unwrap();
        assert_eq!(&bytes[..8], &[1, 5, 0, b'A', b'l', b'p', b'h', b'a']);
        assert_eq!(&bytes[8..12], &1000i32.to_le_bytes());
        assert_eq!(&bytes[bytes.len() - 2..], &[64, 0]);
        assert_eq!(from_payload::<Hello>(bytes).unwrap(), hello);
    }

    #[test]
    fn unknown_request() {
        assert_eq!(
            from_payload::<Request>(vec![200, 1, 2]).unwrap_err(),
            DecodeError::UnknownRequest(200)
        );
    }

    #[test]
    fn keepalive_forms() {
        assert_eq!(from_payload::<Request>(vec![0]).unwrap(), Request::Keepalive);
        assert_eq!(from_payload::<Request>(Vec::new()).unwrap(), Request::Keepalive);
        assert_eq!(&to_payload(&Request::Keepalive).unwrap()[..], &[0]);
    }

    #[test]
    fn validate_account_carries_full_id() {
        let bytes = to_payload(&Request::ValidateAccount {
            steam_id: 76561198000000000,
        })
        .unwrap();
        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[1..], &76561198000000000u64.to_le_bytes());
    }

    #[test]
    fn closing_with_no_players() {
        let bytes = to_payload(&Request::Closing(Vec::new())).unwrap();
        assert_eq!(&bytes[..], &[3, 0]);
        assert_eq!(
            from_payload::<Request>(bytes).unwrap(),
            Request::Closing(Vec::new())
        );
    }

    #[test]
    fn truncated_body_is_an_error() {
        assert!(matches!(
            from_payload::<Request>(vec![5, 1, 0]),
            Err(DecodeError::BufferUnderrun { .. })
        ));
    }
}
