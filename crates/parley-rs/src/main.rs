//! Command-line client for a running parley relay.
//!
//! # Examples
//!
//! ```sh
//! # One-off question, streamed to stdout
//! parley ask "How do I rotate the staging certs?"
//!
//! # Keep context across questions
//! parley ask --session alice "What does the deploy script do?"
//! parley ask --session alice "And how do I roll it back?"
//!
//! # Prompt from stdin
//! git diff | parley ask --session review
//!
//! # Inspect what the relay remembers
//! parley session alice
//! ```

use std::io::{self, IsTerminal, Read, Write};
use std::process;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use parley_rs::MAX_MESSAGE_CHARS;
use serde_json::json;
use tracing_subscriber::EnvFilter;

const DEFAULT_CHAT_ENDPOINT: &str = "http://127.0.0.1:8000/chat";
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

#[derive(Parser)]
#[command(name = "parley", about = "Talk to a parley chat relay")]
struct Cli {
    /// Log filter (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a question and stream the answer
    Ask {
        /// Chat endpoint URL
        #[arg(long, default_value = DEFAULT_CHAT_ENDPOINT)]
        endpoint: String,

        /// Session id; enables conversational memory on the relay
        #[arg(long)]
        session: Option<String>,

        /// Longest prompt sent, in characters
        #[arg(long, default_value_t = MAX_MESSAGE_CHARS)]
        max_chars: usize,

        /// Prompt words. Read from stdin when omitted.
        prompt: Vec<String>,
    },
    /// Print what the relay remembers for a session
    Session {
        id: String,

        /// Relay base URL
        #[arg(long, default_value = DEFAULT_BASE_URL)]
        base: String,
    },
}

/// Why a prompt was not sent.
#[derive(Debug, PartialEq, Eq)]
enum PromptIssue {
    Empty,
    TooLong { chars: usize, max: usize },
}

impl std::fmt::Display for PromptIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromptIssue::Empty => write!(f, "(empty prompt)"),
            PromptIssue::TooLong { chars, max } => {
                write!(f, "Prompt too long ({chars} chars > {max})")
            }
        }
    }
}

/// Trim the prompt and check it against `max_chars`.
fn prepare_prompt(raw: &str, max_chars: usize) -> Result<&str, PromptIssue> {
    let prompt = raw.trim();
    if prompt.is_empty() {
        return Err(PromptIssue::Empty);
    }
    let chars = prompt.chars().count();
    if chars > max_chars {
        return Err(PromptIssue::TooLong {
            chars,
            max: max_chars,
        });
    }
    Ok(prompt)
}

fn read_stdin_content() -> Result<String, String> {
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(String::new());
    }
    let mut buf = String::new();
    stdin
        .read_to_string(&mut buf)
        .map_err(|e| format!("failed to read stdin: {e}"))?;
    Ok(buf)
}

/// POST the prompt and copy the body to stdout as it arrives.
///
/// Transport failures are printed in-band like the relay's own error
/// trailer; they are not a process error.
async fn ask(
    client: &reqwest::Client,
    endpoint: &str,
    session: Option<String>,
    prompt: &str,
) -> io::Result<()> {
    let mut stdout = io::stdout().lock();

    let response = client
        .post(endpoint)
        .json(&json!({ "message": prompt, "session_id": session }))
        .send()
        .await;
    let response = match response {
        Ok(response) => response,
        Err(e) => {
            writeln!(stdout, "\n[error] {e}")?;
            return Ok(());
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        writeln!(stdout, "\n[error] HTTP {status}: {body}")?;
        return Ok(());
    }

    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                stdout.write_all(&bytes)?;
                stdout.flush()?;
            }
            Err(e) => {
                writeln!(stdout, "\n[error] {e}")?;
                return Ok(());
            }
        }
    }
    writeln!(stdout)?;
    Ok(())
}

async fn show_session(client: &reqwest::Client, base: &str, id: &str) -> Result<(), String> {
    let url = format!("{}/session/{id}", base.trim_end_matches('/'));
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| format!("request failed: {e}"))?;

    let status = response.status();
    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|e| format!("invalid response from {url}: {e}"))?;
    if !status.is_success() {
        let detail = body["detail"].as_str().unwrap_or("request failed");
        return Err(format!("HTTP {status}: {detail}"));
    }

    let pretty = serde_json::to_string_pretty(&body).map_err(|e| e.to_string())?;
    println!("{pretty}");
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let client = reqwest::Client::new();

    let result = match cli.command {
        Command::Ask {
            endpoint,
            session,
            max_chars,
            prompt,
        } => {
            let raw = if prompt.is_empty() {
                match read_stdin_content() {
                    Ok(text) => text,
                    Err(e) => {
                        eprintln!("Error: {e}");
                        process::exit(1);
                    }
                }
            } else {
                prompt.join(" ")
            };

            match prepare_prompt(&raw, max_chars) {
                Ok(prompt) => ask(&client, &endpoint, session, prompt)
                    .await
                    .map_err(|e| format!("failed to write output: {e}")),
                Err(issue) => {
                    println!("{issue}");
                    Ok(())
                }
            }
        }
        Command::Session { id, base } => show_session(&client, &base, &id).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
