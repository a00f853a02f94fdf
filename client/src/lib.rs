//! Game client side of the lobby protocol

use std::io;

use tokio::net::{TcpStream, ToSocketAddrs};

pub use lobby_proto as proto;
use lobby_proto::{
    client::{self, Population, Request},
    from_payload, to_payload, DecodeError, EncodeError, FrameConfig, FrameError, FrameStream, PlayerRecord, ServerInfo,
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
    #[error("login rejected")]
    Rejected,
    #[error("connection closed by lobby server")]
    Closed,
}

/// A logged-in player's connection to the lobby
pub struct Client {
    stream: FrameStream<TcpStream>,
}

impl Client {
    /// Log in as `steam_id`, returning the player's profile
    pub async fn connect(addr: impl ToSocketAddrs, steam_id: u64) -> Result<(Self, PlayerRecord), Error> {
        let io = TcpStream::connect(addr).await?;
        io.set_nodelay(true)?;
        let mut client = Self {
            stream: FrameStream::new(io, FrameConfig::default()),
        };
        client.stream.send(&to_payload(&client::Hello { steam_id })?).await?;
        let client::Welcome(record) = client.recv().await?;
        let record = record.ok_or(Error::Rejected)?;
        Ok((client, record))
    }

    async fn recv<T: lobby_proto::Decode>(&mut self) -> Result<T, Error> {
        let payload = self.stream.recv().await?.ok_or(Error::Closed)?;
        Ok(from_payload(payload)?)
    }

    async fn send(&mut self, request: Request) -> Result<(), Error> {
        self.stream.send(&to_payload(&request)?).await?;
        Ok(())
    }

    pub async fn keepalive(&mut self) -> Result<(), Error> {
        self.send(Request::Keepalive).await
    }

    /// Servers currently listed, in registration order
    pub async fn server_list(&mut self) -> Result<Vec<ServerInfo>, Error> {
        self.send(Request::ServerList).await?;
        let client::ServerList(servers) = self.recv().await?;
        Ok(servers)
    }

    pub async fn population(&mut self) -> Result<Population, Error> {
        self.send(Request::Population).await?;
        self.recv().await
    }
}
