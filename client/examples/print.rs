use anyhow::{Context, Result};
use clap::Parser;
use lobby_client::Client;

#[derive(Parser, Debug)]
#[clap(name = "print")]
struct Opt {
    /// Lobby server to connect to
    #[clap(default_value = "localhost:27901")]
    lobby: String,
    /// Steam ID to log in as
    #[clap(long = "steam-id", default_value = "76561198000000000")]
    steam_id: u64,
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
    let (mut client, record) = Client::connect(&options.lobby[..], options.steam_id)
        .await
        .with_context(|| format!("failed to connect to {}", options.lobby))?;
    let profile = &record.profile;
    println!(
        "logged in as {} (rank {}, {} kills, {} deaths)",
        profile.name, profile.rank, profile.stats.kills, profile.stats.deaths
    );

    let population = client.population().await?;
    println!("{} players on {} servers", population.players, population.servers);
    for server in client.server_list().await? {
        println!(
            "\t{}:{}\t{}\t{} {}\t{}/{}",
            server.ip, server.port, server.name, server.map, server.mode, server.current_players, server.max_players
        );
    }
    Ok(())
}
