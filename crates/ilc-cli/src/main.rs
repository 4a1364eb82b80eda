//! Thin HTTP client for `ilc-node`'s explorer admin surface (§1 "`ilc-cli`
//! ... mirroring `ilp-cli`"): health checks and read-only peer/route/event
//! listing. Carries no settlement or key-management commands — those stay
//! out of scope per spec.md's Non-goals.

use clap::{Parser, Subcommand};
use thiserror::Error;

#[derive(Parser)]
#[command(name = "ilc-cli", version, about = "Query a running ilc-node's explorer API")]
struct Cli {
    /// Base URL of the node's explorer server.
    #[arg(short, long, default_value = "http://127.0.0.1:7770", global = true)]
    url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// `GET /api/health`
    Health,
    /// `GET /api/peers`
    Accounts,
    /// `GET /api/routes`
    Routes,
    /// `GET /api/events`, optionally filtered by type/peer.
    Events {
        /// Comma-separated event type names.
        #[arg(long)]
        types: Option<String>,
        #[arg(long)]
        peer: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("request to {url} failed: {source}")]
    Request { url: String, source: reqwest::Error },
    #[error("node returned {status} for {url}: {body}")]
    Status { url: String, status: reqwest::StatusCode, body: String },
}

fn get(client: &reqwest::blocking::Client, url: &str) -> Result<serde_json::Value, CliError> {
    let response = client.get(url).send().map_err(|source| CliError::Request {
        url: url.to_string(),
        source,
    })?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(CliError::Status {
            url: url.to_string(),
            status,
            body,
        });
    }
    response.json().map_err(|source| CliError::Request {
        url: url.to_string(),
        source,
    })
}

fn main() {
    let cli = Cli::parse();
    let client = reqwest::blocking::Client::new();
    let base = cli.url.trim_end_matches('/');

    let result = match &cli.command {
        Command::Health => get(&client, &format!("{}/api/health", base)),
        Command::Accounts => get(&client, &format!("{}/api/peers", base)),
        Command::Routes => get(&client, &format!("{}/api/routes", base)),
        Command::Events { types, peer, limit } => {
            let mut url = format!("{}/api/events?limit={}", base, limit);
            if let Some(types) = types {
                url.push_str(&format!("&types={}", types));
            }
            if let Some(peer) = peer {
                url.push_str(&format!("&peerId={}", peer));
            }
            get(&client, &url)
        }
    };

    match result {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default()),
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    }
}
