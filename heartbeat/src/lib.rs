//! Game server side of the lobby protocol
//!
//! A game server registers itself with [`Heartbeat::connect`], then keeps the connection open for as long as it
//! should stay listed, sending a keepalive at least once per liveness window (see [`Heartbeat::run`]).

use std::{io, time::Duration};

use tokio::net::{TcpStream, ToSocketAddrs};

pub use lobby_proto as proto;
use lobby_proto::{
    from_payload, game, to_payload, Ack, DecodeError, EncodeError, FrameConfig, FrameError, FrameStream, PlayerRecord,
    StatReport,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Frame(#[from] FrameError),
    #[error("{0}")]
    Encode(#[from] EncodeError),
    #[error("malformed reply: {0}")]
    Decode(#[from] DecodeError),
    #[error("registration rejected")]
    Rejected,
    #[error("connection closed by lobby server")]
    Closed,
}

/// A registered game server's connection to the lobby
pub struct Heartbeat {
    stream: FrameStream<TcpStream>,
}

impl Heartbeat {
    /// Connect and register, failing if the lobby refuses `hello`
    pub async fn connect(addr: impl ToSocketAddrs, hello: &game::Hello) -> Result<Self, Error> {
        let io = TcpStream::connect(addr).await?;
        io.set_nodelay(true)?;
        let mut stream = FrameStream::new(io, FrameConfig::default());
        stream.send(&to_payload(hello)?).await?;
        let reply = stream.recv().await?.ok_or(Error::Closed)?;
        let Ack(accepted) = from_payload(reply)?;
        if !accepted {
            return Err(Error::Rejected);
        }
        Ok(Self { stream })
    }

    async fn send(&mut self, request: &game::Request) -> Result<(), Error> {
        self.stream.send(&to_payload(request)?).await?;
        Ok(())
    }

    pub async fn keepalive(&mut self) -> Result<(), Error> {
        self.send(&game::Request::Keepalive).await
    }

    /// Fetch the profile of a player joining this server, creating it if necessary
    ///
    /// The lobby sends nothing back if it can't produce the profile, so callers may want a timeout.
    pub async fn validate_account(&mut self, steam_id: u64) -> Result<PlayerRecord, Error> {
        self.send(&game::Request::ValidateAccount { steam_id }).await?;
        let reply = self.stream.recv().await?.ok_or(Error::Closed)?;
        Ok(from_payload(reply)?)
    }

    pub async fn player_disconnected(&mut self, report: StatReport) -> Result<(), Error> {
        self.send(&game::Request::PlayerDisconnected(report)).await
    }

    pub async fn update_stats(&mut self, report: StatReport) -> Result<(), Error> {
        self.send(&game::Request::UpdateStats(report)).await
    }

    pub async fn set_player_count(&mut self, count: i32) -> Result<(), Error> {
        self.send(&game::Request::PlayerCount(count)).await
    }

    pub async fn set_external_id(&mut self, id: String) -> Result<(), Error> {
        self.send(&game::Request::SetExternalId(id)).await
    }

    /// Report the stats of everyone still playing and deregister
    pub async fn close(mut self, reports: Vec<StatReport>) -> Result<(), Error> {
        self.send(&game::Request::Closing(reports)).await?;
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Send a keepalive every `interval` until the connection fails
    pub async fn run(&mut self, interval: Duration) -> Result<(), Error> {
        let mut ticks = tokio::time::interval(interval);
        ticks.tick().await;
        loop {
            ticks.tick().await;
            self.keepalive().await?;
        }
    }
}
