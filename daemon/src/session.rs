//! Per-connection handshake state
//!
//! A session starts `Undetermined` and becomes `Initialized` once its handshake succeeds. There is no way back.

use std::{fmt, net::SocketAddr};

use thiserror::Error;

use crate::directory::{Registration, ServerKey};

/// Which listener accepted the connection
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    GameServer,
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Role::GameServer => "server",
            Role::Client => "client",
        })
    }
}

/// Identity bound by a successful handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peer {
    Server(Registration),
    Player(u64),
}

impl Peer {
    fn role(&self) -> Role {
        match *self {
            Peer::Server(_) => Role::GameServer,
            Peer::Player(_) => Role::Client,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Undetermined,
    Initialized(Peer),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindError {
    #[error("session already initialized")]
    AlreadyInitialized,
    #[error("{0} identity on a {1} connection")]
    RoleMismatch(Role, Role),
}

#[derive(Debug)]
pub struct Session {
    role: Role,
    remote: SocketAddr,
    state: State,
}

impl Session {
    pub fn new(role: Role, remote: SocketAddr) -> Self {
        Self {
            role,
            remote,
            state: State::Undetermined,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, State::Initialized(_))
    }

    /// Complete the handshake
    pub fn bind(&mut self, peer: Peer) -> Result<(), BindError> {
        if self.is_initialized() {
            return Err(BindError::AlreadyInitialized);
        }
        if peer.role() != self.role {
            return Err(BindError::RoleMismatch(peer.role(), self.role));
        }
        self.state = State::Initialized(peer);
        Ok(())
    }

    pub fn registration(&self) -> Option<&Registration> {
        match self.state {
            State::Initialized(Peer::Server(ref registration)) => Some(registration),
            _ => None,
        }
    }

    pub fn server_key(&self) -> Option<&ServerKey> {
        self.registration().map(Registration::key)
    }

    pub fn steam_id(&self) -> Option<u64> {
        match self.state {
            State::Initialized(Peer::Player(id)) => Some(id),
            _ => None,
        }
    }
}
