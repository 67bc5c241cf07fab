//! Thin demo client for `cipher-app`'s HTTP surface. Talks JSON over HTTP
//! only — it shares no Rust types with the server crates, the way a real
//! integration partner (an SMS gateway, a chat connector) would.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cipher", version, about = "Demo client for the Cipher engagement engine")]
struct Cli {
    /// Base URL of a running `cipher-app` instance.
    #[arg(long, global = true, default_value = "http://localhost:8080")]
    server: String,

    /// Bearer token matching the server's `CIPHER_API_KEY`, if configured.
    #[arg(long, global = true, env = "CIPHER_API_KEY")]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Send a single message and print the engine's response.
    Engage {
        #[arg(long)]
        session_id: String,
        #[arg(long, default_value = "+919876543210")]
        sender: String,
        text: String,
    },
    /// Run a canned multi-turn scam conversation against the server.
    Demo {
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Fetch a single sender's profile.
    Profile { sender: String },
    /// List known sender profiles.
    Profiles {
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long)]
        status: Option<String>,
    },
}

#[derive(Debug, Serialize, Clone)]
struct WireMessage {
    sender: String,
    text: String,
    timestamp: i64,
}

#[derive(Debug, Serialize)]
struct EngageRequest {
    #[serde(rename = "sessionId")]
    session_id: String,
    message: WireMessage,
    #[serde(rename = "conversationHistory")]
    conversation_history: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct EngageResponse {
    status: String,
    reply: Option<String>,
    session_state: String,
    turn_number: u64,
    scam_detected: bool,
    confidence_score: f64,
}

const DEMO_SCRIPT: &[&str] = &[
    "Hello, this is calling from your bank's security department.",
    "URGENT: your account has been blocked due to suspicious activity. Share your OTP immediately to unblock it.",
    "Sir please don't panic, just verify your account number and we will refund the charges.",
    "Okay, send payment of 499 rupees to scammer@ybl to avoid legal action.",
];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;

    match cli.command {
        Commands::Engage { session_id, sender, text } => {
            let outcome = send_turn(&client, &cli.server, cli.api_key.as_deref(), &session_id, &sender, &text, &[]).await?;
            print_outcome(&outcome);
        }
        Commands::Demo { session_id } => {
            let session_id = session_id.unwrap_or_else(|| "demo-session".to_string());
            let sender = "+919876543210".to_string();
            let mut history = Vec::new();
            for line in DEMO_SCRIPT {
                println!("\n> {sender}: {line}");
                let outcome = send_turn(&client, &cli.server, cli.api_key.as_deref(), &session_id, &sender, line, &history).await?;
                print_outcome(&outcome);
                history.push(WireMessage { sender: sender.clone(), text: line.to_string(), timestamp: 0 });
                if let Some(reply) = &outcome.reply {
                    history.push(WireMessage { sender: "agent".to_string(), text: reply.clone(), timestamp: 0 });
                }
                if outcome.status == "completed" {
                    break;
                }
            }
        }
        Commands::Profile { sender } => {
            let url = format!("{}/api/v1/profile/{}", cli.server.trim_end_matches('/'), sender);
            let response = authed(&client, client.get(url), cli.api_key.as_deref()).send().await?;
            print_json_response(response).await?;
        }
        Commands::Profiles { limit, status } => {
            let mut url = format!("{}/api/v1/profiles?limit={limit}", cli.server.trim_end_matches('/'));
            if let Some(status) = status {
                url.push_str(&format!("&status={status}"));
            }
            let response = authed(&client, client.get(url), cli.api_key.as_deref()).send().await?;
            print_json_response(response).await?;
        }
    }

    Ok(())
}

fn authed(_client: &reqwest::Client, builder: reqwest::RequestBuilder, api_key: Option<&str>) -> reqwest::RequestBuilder {
    match api_key {
        Some(key) if !key.is_empty() => builder.bearer_auth(key),
        _ => builder,
    }
}

async fn send_turn(
    client: &reqwest::Client,
    server: &str,
    api_key: Option<&str>,
    session_id: &str,
    sender: &str,
    text: &str,
    history: &[WireMessage],
) -> Result<EngageResponse> {
    let url = format!("{}/api/v1/engage", server.trim_end_matches('/'));
    let body = EngageRequest {
        session_id: session_id.to_string(),
        message: WireMessage { sender: sender.to_string(), text: text.to_string(), timestamp: 0 },
        conversation_history: history.to_vec(),
    };

    let response = authed(client, client.post(url).json(&body), api_key)
        .send()
        .await
        .context("request to cipher-app failed")?;

    if !response.status().is_success() {
        bail!("cipher-app returned {}: {}", response.status(), response.text().await.unwrap_or_default());
    }

    response.json::<EngageResponse>().await.context("decoding engage response")
}

fn print_outcome(outcome: &EngageResponse) {
    println!(
        "  [{} / {}] turn={} scam={} confidence={:.2} :: {}",
        outcome.status,
        outcome.session_state,
        outcome.turn_number,
        outcome.scam_detected,
        outcome.confidence_score,
        outcome.reply.as_deref().unwrap_or("<no reply>")
    );
}

async fn print_json_response(response: reqwest::Response) -> Result<()> {
    let status = response.status();
    let body: serde_json::Value = response.json().await.context("decoding JSON response")?;
    println!("{status}\n{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
