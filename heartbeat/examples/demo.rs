use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use lobby_heartbeat::{proto::game, Heartbeat};

#[derive(Parser, Debug)]
#[clap(name = "demo")]
struct Opt {
    /// Lobby server to register with
    #[clap(default_value = "localhost:27900")]
    lobby: String,
    /// Name to list the server under
    #[clap(long = "name", default_value = "Demo")]
    name: String,
    /// Game port advertised to players
    #[clap(long = "port", default_value = "7777")]
    port: i32,
    #[clap(long = "map", default_value = "Valley")]
    map: String,
    #[clap(long = "mode", default_value = "TDM")]
    mode: String,
    #[clap(long = "max-players", default_value = "16")]
    max_players: u8,
    /// Seconds between keepalives
    #[clap(long = "interval", default_value = "30")]
    interval: u64,
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

#[tokio::main(flavor = "current_thread")]
async fn run(options: Opt) -> Result<()> {
    let hello = game::Hello {
        region: 0,
        name: options.name,
        port: options.port,
        map: options.map,
        mode: options.mode,
        extra_info: String::new(),
        max_players: options.max_players,
        is_protected: false,
    };
    let mut heartbeat = Heartbeat::connect(&options.lobby[..], &hello)
        .await
        .with_context(|| format!("failed to register with {}", options.lobby))?;
    println!("registered as {:?}", hello.name);
    heartbeat.set_player_count(0).await?;
    heartbeat.run(Duration::from_secs(options.interval)).await?;
    Ok(())
}
