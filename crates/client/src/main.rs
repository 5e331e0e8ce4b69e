// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::error;

use voxledger::api::types::{parse_month, StatsSummary};
use voxledger::config::ClientConfig;
use voxledger::session::controller::AuthState;
use voxledger::speech::output::FileOutput;
use voxledger::speech::AudioOutput;
use voxledger::{init_tracing, Client};

#[derive(Debug, Parser)]
#[command(name = "voxledger", version, about = "Voice expense-ledger client")]
struct Cli {
    #[command(flatten)]
    config: ClientConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Exchange a one-time sign-in code for a session.
    Login {
        #[arg(long)]
        code: String,
    },
    /// Sign in with a long-lived API token, or manage API tokens.
    Token(TokenArgs),
    /// Show the signed-in user.
    Whoami,
    /// Sign out and forget the stored session.
    Logout,
    /// Record an expense from a free-form description.
    Record {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        /// Read the result aloud.
        #[arg(long)]
        say: bool,
    },
    /// Ask a question about the ledger.
    Ask {
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
        /// Read the answer aloud.
        #[arg(long)]
        say: bool,
    },
    /// Monthly totals by category.
    Stats {
        /// Month as YYYY-MM; defaults to the current month.
        #[arg(long)]
        month: Option<String>,
    },
    /// List the synthesis voices the backend offers.
    Voices,
    /// Check that the backend is up.
    Health,
    /// Synthesize text and play it.
    Say {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        /// Write the audio to this file instead of playing it.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
struct TokenArgs {
    #[command(subcommand)]
    action: Option<TokenAction>,

    /// API token to sign in with.
    #[arg(required = true)]
    token: Option<String>,
}

#[derive(Debug, Subcommand)]
enum TokenAction {
    /// Mint a new API token for the signed-in user.
    Generate {
        #[arg(long, default_value = "voxledger CLI")]
        description: String,
        /// Days until the token expires; never expires when omitted.
        #[arg(long)]
        expires_in_days: Option<u32>,
    },
    /// Check that the current credential is accepted.
    Verify,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&cli.config);

    if let Err(e) = run(cli).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config;
    let client = Client::open(&config)?;
    let state = client.session.start().await;

    let result = dispatch(&client, &config, state, cli.command).await;
    client.session.shutdown();
    result
}

async fn dispatch(
    client: &Client,
    config: &ClientConfig,
    state: AuthState,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Login { code } => {
            let tokens = client.api.exchange_code(&code).await?;
            let state = client
                .session
                .login(&tokens.access_token, Some(&tokens.refresh_token), Some(tokens.expires_at))
                .await?;
            print_identity(&require_session(state)?);
        }
        Command::Token(args) => token_command(client, state, args).await?,
        Command::Whoami => print_identity(&require_session(state)?),
        Command::Logout => {
            client.session.logout().await;
            println!("signed out");
        }
        Command::Record { text, say } => {
            require_session(state)?;
            let resp = client.api.create_entry(&text.join(" ")).await?;
            let r = &resp.record;
            println!("{} | {} | {} | {} {}", r.time, r.name, r.category, r.amount, r.currency);
            if let Some(ref method) = r.payment_method {
                println!("paid with {method}");
            }
            let spoken = resp.feedback.clone().unwrap_or_else(|| resp.message.clone());
            if !spoken.is_empty() {
                println!("{spoken}");
            }
            if say {
                speak(client, config, &spoken, None).await?;
            }
        }
        Command::Ask { question, say } => {
            require_session(state)?;
            let resp = client.api.query(&question.join(" ")).await?;
            println!("{}", resp.response);
            if say {
                speak(client, config, &resp.response, None).await?;
            }
        }
        Command::Stats { month } => {
            require_session(state)?;
            let month = month.as_deref().map(parse_month).transpose()?;
            let summary = client.api.monthly_stats(month.as_deref()).await?;
            print_stats(&summary);
        }
        Command::Voices => {
            let voices = client.api.voices().await?;
            for v in voices {
                let marker = if v.id == config.voice.as_str() { "*" } else { " " };
                println!("{marker} {:<8} {:<8} {}", v.id, v.name, v.description);
            }
        }
        Command::Health => {
            let health = client.api.health().await?;
            println!("{} ({})", health.status, health.service);
            if !health.is_healthy() {
                anyhow::bail!("backend reports {}", health.status);
            }
        }
        Command::Say { text, out } => {
            require_session(state)?;
            speak(client, config, &text.join(" "), out).await?;
        }
    }
    Ok(())
}

async fn token_command(client: &Client, state: AuthState, args: TokenArgs) -> anyhow::Result<()> {
    match (args.action, args.token) {
        (Some(TokenAction::Generate { description, expires_in_days }), _) => {
            require_session(state)?;
            let resp = client.api.generate_token(&description, expires_in_days).await?;
            let info = &resp.token;
            println!("{}", info.token);
            eprintln!(
                "{} | created {} | expires {}",
                info.description,
                info.created_at,
                info.expires_at.as_deref().unwrap_or("never")
            );
            if !resp.message.is_empty() {
                eprintln!("{}", resp.message);
            }
        }
        (Some(TokenAction::Verify), _) => {
            require_session(state)?;
            let resp = client.api.verify_token().await?;
            if !resp.is_valid() {
                anyhow::bail!("token rejected: {}", resp.message);
            }
            println!("valid: {}", resp.message);
        }
        (None, Some(token)) => {
            let state = client.session.login(&token, None, None).await?;
            print_identity(&require_session(state)?);
        }
        (None, None) => anyhow::bail!("an API token or a token subcommand is required"),
    }
    Ok(())
}

fn require_session(state: AuthState) -> anyhow::Result<AuthState> {
    if state.is_authenticated() {
        Ok(state)
    } else {
        anyhow::bail!("not signed in; run `voxledger login --code <code>` or `voxledger token <token>`")
    }
}

fn print_identity(state: &AuthState) {
    if let AuthState::Authenticated { user, auth_type } = state {
        println!("{} <{}> ({}, {})", user.name, user.email, user.id, auth_type.as_str());
    }
}

fn print_stats(summary: &StatsSummary) {
    println!("{}: {:.0} across {} records", summary.month, summary.total, summary.record_count);
    for c in &summary.categories {
        println!("  {:<12} {:>10.0} {:>5.1}%", c.category, c.total, c.percentage);
    }
    println!("daily average {:.1}", summary.daily_average);
}

/// Speak `text` and wait until playback finishes.
async fn speak(
    client: &Client,
    config: &ClientConfig,
    text: &str,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let output = audio_output(config, out);
    let player = client.speech_player(config, output);
    let mut state = player.subscribe();
    player.speak(text).await?;
    let done = state.wait_for(|s| !s.is_speaking && !s.is_loading).await?.clone();
    match done.error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn audio_output(config: &ClientConfig, out: Option<PathBuf>) -> Arc<dyn AudioOutput> {
    match out {
        Some(path) => Arc::new(FileOutput::new(path)),
        None => default_output(config),
    }
}

#[cfg(feature = "native-audio")]
fn default_output(_config: &ClientConfig) -> Arc<dyn AudioOutput> {
    Arc::new(voxledger::speech::native::RodioOutput::new())
}

#[cfg(not(feature = "native-audio"))]
fn default_output(config: &ClientConfig) -> Arc<dyn AudioOutput> {
    let path = config.state_dir().join(format!("speech-{}.mp3", config.voice));
    tracing::info!(path = %path.display(), "built without native audio, writing speech to file");
    Arc::new(FileOutput::new(path))
}
