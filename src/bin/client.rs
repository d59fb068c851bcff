// src/bin/client.rs

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};

use hubbub::client::{commands, console, ClientSession};
use hubbub::{DEFAULT_PORT, DOWNLOADS_DIR};

#[derive(Parser, Debug)]
#[command(name = "hubbub-client")]
#[command(about = "Chat + file relay client")]
struct Cli {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(long, short, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Where received files are written
    #[arg(long, default_value = DOWNLOADS_DIR)]
    downloads: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hubbub=warn".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    println!(
        "{}",
        format!("🔌 connecting to {}:{}…", cli.host, cli.port).cyan()
    );
    let session = ClientSession::connect(&cli.host, cli.port, cli.downloads).await?;
    println!("{}", "connected. commands:".dimmed());
    println!("{}", "  /n <name>            register or rename".dimmed());
    println!("{}", "  /w <name> <message>  whisper".dimmed());
    println!("{}", "  /f <name> <path>     send a file".dimmed());
    println!("{}", "  exit                 leave".dimmed());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            maybe_line = lines.next_line() => match maybe_line? {
                Some(line) => match commands::parse(&line) {
                    None => {}
                    Some(Ok(command)) => {
                        match session.handle_command(command).await {
                            Ok(true) => {}
                            Ok(false) => break,
                            Err(e) => console::error(&format!("{e:#}")),
                        }
                    }
                    Some(Err(e)) => console::error(&e.to_string()),
                },
                // stdin closed: treat like exit
                None => {
                    let _ = session.handle_command(commands::Command::Exit).await;
                    break;
                }
            },
            _ = session.closed() => break,
        }
    }

    Ok(())
}
