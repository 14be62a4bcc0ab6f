use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod client;
mod output;

use client::SupervisorClient;

#[derive(Parser, Debug)]
#[command(name = "warden", author, version, about = "Operator CLI for the Warden service supervisor", long_about = None)]
struct Cli {
    /// Supervisor base URL
    #[arg(
        long,
        env = "WARDEN_URL",
        default_value = "http://127.0.0.1:9600",
        global = true
    )]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show fleet status
    Status {
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
        /// Include per-service history aggregates
        #[arg(short, long)]
        detailed: bool,
        /// Continuous monitoring mode
        #[arg(short, long)]
        watch: bool,
        /// Watch interval in seconds
        #[arg(short, long, default_value = "5")]
        interval: u64,
    },
    /// Show one service's status
    Service {
        name: String,
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },
    /// Restart every currently-unhealthy service
    Repair,
    /// Show recent alerts
    Alerts {
        /// Number of alerts to show
        #[arg(short, long, default_value = "20")]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let client = SupervisorClient::new(&cli.url)?;

    match cli.command {
        Commands::Status {
            format,
            detailed,
            watch,
            interval,
        } => {
            if watch {
                watch_status(&client, &format, detailed, interval).await
            } else {
                show_status(&client, &format, detailed).await
            }
        }
        Commands::Service { name, format } => {
            let service = client.service(&name).await?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&service)?);
            } else {
                output::print_service(&name, &service);
            }
            Ok(())
        }
        Commands::Repair => {
            let response = client.repair().await?;
            output::print_repair(&response);
            Ok(())
        }
        Commands::Alerts { count } => {
            let alerts = client.alerts(count).await?;
            output::print_alerts(&alerts);
            Ok(())
        }
    }
}

async fn show_status(client: &SupervisorClient, format: &str, detailed: bool) -> Result<()> {
    let report = client.status().await?;
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output::print_status(&report, detailed);
    }
    Ok(())
}

async fn watch_status(
    client: &SupervisorClient,
    format: &str,
    detailed: bool,
    interval: u64,
) -> Result<()> {
    println!(
        "Watching fleet status (interval: {}s, press Ctrl+C to stop)",
        interval
    );
    loop {
        // Clear screen and home the cursor.
        print!("\x1B[2J\x1B[1;1H");
        if let Err(e) = show_status(client, format, detailed).await {
            eprintln!("status fetch failed: {}", e);
        }
        tokio::time::sleep(Duration::from_secs(interval)).await;
    }
}
