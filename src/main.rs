//! apns-h2 CLI - send a notification or mint a provider token.
//!
//! Configuration comes from the config file and `APNS_*` environment
//! variables (see `apns_h2::config`).

use anyhow::{Context, Result};
use apns_h2::{Config, Notification, PushClient, TokenSigner};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "apns-h2")]
#[command(about = "Send push notifications over a single HTTP/2 session", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a notification to one or more devices
    Send {
        /// Device token (repeat for several devices)
        #[arg(long = "device", required = true)]
        devices: Vec<String>,
        /// JSON payload, or @path to read it from a file
        #[arg(long)]
        payload: String,
        /// Topic, overriding the configured default
        #[arg(long)]
        topic: Option<String>,
        /// Push type (alert, background, voip, ...)
        #[arg(long, default_value = "alert")]
        push_type: String,
        /// Delivery priority
        #[arg(long)]
        priority: Option<u8>,
        /// Expiration as epoch seconds
        #[arg(long)]
        expiration: Option<i64>,
        /// Collapse identifier
        #[arg(long)]
        collapse_id: Option<String>,
    },
    /// Print a freshly signed provider token
    Token,
}

fn read_payload(arg: &str) -> Result<serde_json::Value> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read payload file {path}"))?,
        None => arg.to_string(),
    };
    serde_json::from_str(&text).context("Payload is not valid JSON")
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Send {
            devices,
            payload,
            topic,
            push_type,
            priority,
            expiration,
            collapse_id,
        } => {
            let payload = read_payload(&payload)?;
            let notifications: Vec<Notification> = devices
                .into_iter()
                .map(|device| {
                    let mut n = Notification::new(device, payload.clone()).with_push_type(&push_type);
                    if let Some(topic) = &topic {
                        n = n.with_topic(topic);
                    }
                    if let Some(priority) = priority {
                        n = n.with_priority(priority);
                    }
                    if let Some(expiration) = expiration {
                        n = n.with_expiration(expiration);
                    }
                    if let Some(collapse_id) = &collapse_id {
                        n = n.with_collapse_id(collapse_id);
                    }
                    n
                })
                .collect();

            let client = PushClient::connect(&config)
                .await
                .context("Failed to connect to push gateway")?;

            let mut failures = 0;
            for (notification, result) in notifications.iter().zip(client.send_many(&notifications).await) {
                match result {
                    Ok(response) => {
                        println!(
                            "{} {} {}{}",
                            notification.device_token,
                            response.status,
                            response.status_text,
                            response.reason().map(|r| format!(" ({r})")).unwrap_or_default()
                        );
                        if !response.is_success() {
                            failures += 1;
                        }
                    }
                    Err(e) => {
                        println!("{} error: {}", notification.device_token, e);
                        failures += 1;
                    }
                }
            }

            if failures > 0 {
                anyhow::bail!("{failures} of {} notifications failed", notifications.len());
            }
        }
        Commands::Token => {
            let pem = config.read_signing_key()?;
            let signer = TokenSigner::from_pkcs8_pem(
                &config.team_id,
                &config.key_id,
                &pem,
                config.token_rotation(),
            )?;
            println!("{}", signer.token()?);
        }
    }

    Ok(())
}
