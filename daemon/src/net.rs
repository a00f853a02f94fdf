//! Listeners and per-connection workers

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use lobby_proto::{FrameConfig, FrameError, FrameStream};
use parking_lot::Mutex;
use slab::Slab;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::watch,
    task::AbortHandle,
};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    config::Config,
    directory::GameServerStore,
    dispatch,
    players::PlayerStore,
    session::{Role, Session},
    Lobby,
};

/// Accepts game servers and clients and runs one worker task per connection
pub struct Server<S, P> {
    lobby: Arc<Lobby<S, P>>,
    frame: FrameConfig,
    idle_timeout: Duration,
    sweep_interval: Duration,
    connections: Arc<Mutex<Slab<AbortHandle>>>,
    shutdown: watch::Sender<bool>,
}

impl<S: GameServerStore, P: PlayerStore> Server<S, P> {
    pub fn new(lobby: Arc<Lobby<S, P>>, config: &Config) -> Self {
        Self {
            lobby,
            frame: config.frame.clone(),
            idle_timeout: config.idle_timeout,
            sweep_interval: config.sweep_interval,
            connections: Arc::new(Mutex::new(Slab::new())),
            shutdown: watch::channel(false).0,
        }
    }

    pub fn lobby(&self) -> &Arc<Lobby<S, P>> {
        &self.lobby
    }

    /// Number of live connection workers
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Accept connections for `role` until [`shutdown`](Self::shutdown)
    pub async fn run(&self, listener: TcpListener, role: Role) -> io::Result<()> {
        let mut shutdown = self.shutdown.subscribe();
        info!(addr = %listener.local_addr()?, %role, "listening");
        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, remote)) => self.spawn(stream, remote, role),
                    Err(e) => warn!(%role, "accept failed: {}", e),
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(%role, "stopped listening");
        Ok(())
    }

    /// Periodically drop directory entries that stopped sending heartbeats
    pub async fn sweep(&self) {
        let mut shutdown = self.shutdown.subscribe();
        let mut interval = tokio::time::interval(self.sweep_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let evicted = self.lobby.servers.evict_stale(self.lobby.liveness_window);
                    if evicted > 0 {
                        info!(evicted, "evicted stale servers");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// Stop accepting and ask every connection to close
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// A receiver that observes [`shutdown`](Self::shutdown)
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Kill any connection still running, returning how many there were
    pub fn abort_all(&self) -> usize {
        let mut connections = self.connections.lock();
        let n = connections.len();
        for handle in connections.drain() {
            handle.abort();
        }
        n
    }

    fn spawn(&self, stream: TcpStream, remote: SocketAddr, role: Role) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%remote, "failed to set TCP_NODELAY: {}", e);
        }
        let lobby = self.lobby.clone();
        let stream = FrameStream::new(stream, self.frame.clone()).with_idle_timeout(self.idle_timeout);
        let shutdown = self.shutdown.subscribe();
        let connections = self.connections.clone();

        // Hold the lock until the handle is stored so the task can't free its slot first
        let mut slots = self.connections.lock();
        let slot = slots.vacant_entry();
        let key = slot.key();
        let span = info_span!("conn", peer = %remote, %role);
        let task = tokio::spawn(
            async move {
                serve_connection(&lobby, stream, Session::new(role, remote), shutdown).await;
                connections.lock().try_remove(key);
            }
            .instrument(span),
        );
        slot.insert(task.abort_handle());
    }
}

async fn serve_connection<S, P>(
    lobby: &Lobby<S, P>,
    mut stream: FrameStream<TcpStream>,
    mut session: Session,
    mut shutdown: watch::Receiver<bool>,
) where
    S: GameServerStore,
    P: PlayerStore,
{
    debug!("connected");
    match drive(lobby, &mut session, &mut stream, &mut shutdown).await {
        Ok(()) => debug!("disconnected"),
        Err(ref e) if e.is_protocol_violation() => {
            warn!("dropping connection: {}", e)
        }
        Err(e) => info!("connection lost: {}", e),
    }
    if let Some(registration) = session.registration() {
        if lobby.servers.remove(registration) {
            info!(key = %registration.key(), "server deregistered");
        }
    }
}

async fn drive<S, P>(
    lobby: &Lobby<S, P>,
    session: &mut Session,
    stream: &mut FrameStream<TcpStream>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), FrameError>
where
    S: GameServerStore,
    P: PlayerStore,
{
    loop {
        let payload = tokio::select! {
            received = stream.recv() => match received? {
                Some(payload) => payload,
                None => return Ok(()),
            },
            _ = shutdown.changed() => return Ok(()),
        };
        let step = dispatch::handle(lobby, session, payload).await;
        if let Some(reply) = step.reply {
            stream.send(&reply).await?;
        }
        if step.close {
            return Ok(());
        }
    }
}
