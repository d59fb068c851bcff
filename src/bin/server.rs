// src/bin/server.rs

use std::net::{IpAddr, SocketAddr};

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use hubbub::server::ChatServer;
use hubbub::DEFAULT_PORT;

#[derive(Parser, Debug)]
#[command(name = "hubbub-server")]
#[command(about = "Chat + file relay server")]
struct Cli {
    /// TCP port to listen on
    #[arg(long, short, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hubbub=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let addr = SocketAddr::new(cli.bind, cli.port);

    let server = ChatServer::bind(addr).await?;
    println!(
        "{}",
        format!("🚀 hubbub server listening on {}", server.local_addr()?).green()
    );
    println!("{}", "   (ctrl-c to stop)".dimmed());

    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => {
            println!("\n{}", "👋 shutting down".yellow());
        }
    }

    Ok(())
}
