mod client;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::DaemonClient;
use shared::ipc::{Command, Response};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hisho")]
#[command(about = "CLI tool for the hishod voice secretary daemon")]
struct Cli {
    /// Control socket of the daemon
    #[arg(long)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether a conversation session is active
    Status,
    /// Stop the daemon after its current cycle
    Shutdown,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = DaemonClient::new(cli.socket);

    let command = match cli.command {
        Commands::Status => Command::Status,
        Commands::Shutdown => Command::Shutdown,
    };

    match client.send_command(command).await {
        Ok(Response::Ok) => {
            println!("Success");
        }
        Ok(Response::Status(info)) => {
            println!("Status:");
            println!("  Running: {}", info.is_running);
            println!("  Session: {}", info.state);
            println!("  History: {} turn(s)", info.history_len);
            println!("  Language: {}", info.language);
        }
        Ok(Response::Error(msg)) => {
            eprintln!("Error: {}", msg);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to connect to hishod: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
