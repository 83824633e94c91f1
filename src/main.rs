use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;

use envelope_client::config::{Command, Config};
use envelope_client::{ApiClient, MemoryCredentialStore, ResultEnvelope};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level; stdout is reserved for output
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!(
        server = %config.server_address,
        port = ?config.server_port,
        command = ?config.command,
        "Configuration loaded"
    );

    let store = Arc::new(MemoryCredentialStore::from_config(&config));
    let client = ApiClient::new(store, config.client_options())?;

    let success = match config.command.clone() {
        Command::Get { target, query } => {
            let query = borrow_pairs(&query);
            let envelope: ResultEnvelope<serde_json::Value> = client.get(&target, &query).await;
            print_envelope(&envelope)?
        }
        Command::Post {
            target,
            body,
            query,
        } => {
            let body: serde_json::Value =
                serde_json::from_str(&body).context("--body is not valid JSON")?;
            let query = borrow_pairs(&query);
            let envelope: ResultEnvelope<serde_json::Value> =
                client.post(&target, &body, &query).await;
            print_envelope(&envelope)?
        }
        Command::Login => print_envelope(&client.login().await)?,
        Command::Download { url, destination } => {
            let envelope = client
                .download_file(&url, &destination, None, |fraction, throughput, eta| {
                    eprintln!("{:>6.1}%  {:>12}  ETA {}", fraction * 100.0, throughput, eta);
                })
                .await;
            print_envelope(&envelope)?
        }
        Command::Upload { file, content_type } => {
            print_envelope(&client.upload_file_as(&file, &content_type).await)?
        }
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

/// Print an envelope as pretty JSON; returns whether it reports success
fn print_envelope<T: Serialize>(envelope: &ResultEnvelope<T>) -> Result<bool> {
    let json = serde_json::to_string_pretty(envelope).context("Failed to render response")?;
    println!("{}", json);
    Ok(envelope.is_success())
}

fn borrow_pairs(pairs: &[(String, String)]) -> Vec<(&str, &str)> {
    pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
}
