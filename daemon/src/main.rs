use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lobby_daemon::{
    http,
    identity::{IdentityService, Offline, SteamWebApi},
    Config, Lobby, MemoryPlayerStore, Role, Server, ServerDirectory,
};
use lobby_proto::FrameConfig;

#[derive(Parser, Debug)]
#[clap(name = "lobbyd")]
struct Opt {
    /// Address game servers connect to
    #[clap(long = "server-listen", default_value = "0.0.0.0:27900")]
    server_listen: SocketAddr,
    /// Address game clients connect to
    #[clap(long = "client-listen", default_value = "0.0.0.0:27901")]
    client_listen: SocketAddr,
    /// Address for the JSON server listing
    #[clap(long = "http-listen", default_value = "0.0.0.0:8080")]
    http_listen: SocketAddr,
    /// Don't serve the JSON server listing
    #[clap(long = "no-http")]
    no_http: bool,

    /// Seconds a server stays listed after its last heartbeat
    #[clap(long = "liveness-window-secs", default_value = "300")]
    liveness_window_secs: u64,
    /// Seconds of silence after which a connection is dropped
    #[clap(long = "idle-timeout-secs", default_value = "120")]
    idle_timeout_secs: u64,
    /// Seconds between sweeps for stale servers
    #[clap(long = "sweep-interval-secs", default_value = "60")]
    sweep_interval_secs: u64,
    /// Largest accepted message, excluding its length prefix
    #[clap(long = "max-message-size", default_value = "1048576")]
    max_message_size: u32,
    /// Most unprocessed bytes held for one connection
    #[clap(long = "max-buffered", default_value = "4194304")]
    max_buffered: usize,

    /// JSON file player profiles are loaded from and saved to
    #[clap(long = "profiles", parse(from_os_str))]
    profiles: Option<PathBuf>,
    /// Steam Web API key used to look up player names and avatars
    #[clap(long = "steam-api-key", env = "STEAM_API_KEY", hide_env_values = true)]
    steam_api_key: Option<String>,
    /// Avatar given to players whose profile can't be looked up
    #[clap(long = "default-avatar-url", env = "DEFAULT_AVATAR_URL", default_value = "")]
    default_avatar_url: String,

    /// Also write logs to daily files in this directory
    #[clap(long = "log-dir", parse(from_os_str))]
    log_dir: Option<PathBuf>,
    /// Also send logs to systemd-journald
    #[clap(long = "journald")]
    journald: bool,
}

impl Opt {
    fn config(&self) -> Config {
        Config {
            server_listen: self.server_listen,
            client_listen: self.client_listen,
            http_listen: if self.no_http { None } else { Some(self.http_listen) },
            liveness_window: Duration::from_secs(self.liveness_window_secs),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            frame: FrameConfig {
                max_message_size: self.max_message_size,
                max_buffered: self.max_buffered,
            },
        }
    }
}

fn main() {
    let opt = Opt::parse();
    let code = {
        if let Err(e) = run(opt) {
            eprintln!("ERROR: {:#}", e);
            1
        } else {
            0
        }
    };
    ::std::process::exit(code);
}

fn init_logging(opt: &Opt) -> Result<Option<WorkerGuard>> {
    let (file, guard) = match opt.log_dir {
        Some(ref dir) => {
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "lobbyd.log"));
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    let journald = if opt.journald {
        Some(tracing_journald::layer().context("failed to connect to journald")?)
    } else {
        None
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(file)
        .with(journald)
        .try_init()
        .context("failed to initialize logging")?;
    Ok(guard)
}

fn run(opt: Opt) -> Result<()> {
    let _guard = init_logging(&opt)?;
    let config = opt.config();
    config.validate().context("invalid configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    runtime.block_on(serve(opt, config))
}

async fn serve(opt: Opt, config: Config) -> Result<()> {
    let identity = match opt.steam_api_key {
        Some(key) => IdentityService::Steam(
            SteamWebApi::new(key, Duration::from_secs(5)).context("failed to build Steam API client")?,
        ),
        None => {
            warn!("no Steam API key; players will get placeholder names");
            IdentityService::Offline(Offline)
        }
    };
    let players = match opt.profiles {
        Some(path) => MemoryPlayerStore::open(identity, opt.default_avatar_url, path)
            .await
            .context("failed to load player profiles")?,
        None => MemoryPlayerStore::new(identity, opt.default_avatar_url),
    };
    let lobby = Arc::new(Lobby::new(ServerDirectory::new(), players, config.liveness_window));
    let server = Arc::new(Server::new(lobby.clone(), &config));

    let server_listener = TcpListener::bind(config.server_listen)
        .await
        .with_context(|| format!("failed to bind {}", config.server_listen))?;
    let client_listener = TcpListener::bind(config.client_listen)
        .await
        .with_context(|| format!("failed to bind {}", config.client_listen))?;
    let http_listener = match config.http_listen {
        Some(addr) => Some(
            TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind {}", addr))?,
        ),
        None => None,
    };

    let mut tasks = Vec::new();
    for (listener, role) in [(server_listener, Role::GameServer), (client_listener, Role::Client)] {
        let server = server.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = server.run(listener, role).await {
                warn!(%role, "listener failed: {}", e);
            }
        }));
    }
    tasks.push(tokio::spawn({
        let server = server.clone();
        async move { server.sweep().await }
    }));
    if let Some(listener) = http_listener {
        let lobby = lobby.clone();
        let shutdown = server.shutdown_signal();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = http::serve(listener, lobby, shutdown).await {
                warn!("http server failed: {}", e);
            }
        }));
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");
    server.shutdown();
    for task in tasks {
        let _ = task.await;
    }
    let aborted = server.abort_all();
    if aborted > 0 {
        info!(aborted, "aborted remaining connections");
    }
    lobby.close().await;
    Ok(())
}
