//! Protocol for communication between game servers, game clients and the lobby server
//!
//! Every connection carries length-prefixed frames (see [`frame`]). The first payload in each direction is a
//! handshake; every later payload from a peer starts with a request type byte, looked up in the table for the
//! peer's role ([`game::RequestKind`], [`client::RequestKind`]).

/// Declare a request type table: one variant per wire code
macro_rules! request_kinds {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $code:literal,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $code,)*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)*];

            pub fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some($name::$variant),)*
                    _ => None,
                }
            }

            pub fn code(self) -> u8 {
                self as u8
            }
        }
    };
}

pub mod client;
pub mod codec;
pub mod frame;
pub mod game;
pub mod record;

pub use codec::{Decode, DecodeError, Encode, EncodeError, Reader, Writer};
pub use frame::{encode_frame, FrameConfig, FrameError, FrameReader, FrameStream};
pub use record::{PlayerRecord, Profile, ServerInfo, StatBlock, StatReport, Stats, WeaponKills};

/// Encode `x` as a complete payload
pub fn to_payload<T: Encode + ?Sized>(x: &T) -> Result<bytes::Bytes, EncodeError> {
    let mut w = Writer::new();
    w.put(x)?;
    Ok(w.finish())
}

/// Decode a complete payload as `T`
///
/// Trailing bytes are ignored, matching peers that append fields this side doesn't know about.
pub fn from_payload<T: Decode>(payload: impl Into<bytes::Bytes>) -> Result<T, DecodeError> {
    Reader::new(payload).get()
}

/// Acknowledgement sent in reply to a handshake
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Ack(pub bool);

impl Encode for Ack {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.put_bool(self.0);
        Ok(())
    }
}

impl Decode for Ack {
    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        r.get_bool().map(Ack)
    }
}
