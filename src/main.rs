// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use mac2m3u::catalog::CatalogFetcher;
use mac2m3u::config::Config;
use mac2m3u::portal::{ContentKind, PortalClient};
use mac2m3u::resolver::LinkResolver;
use mac2m3u::session::{self, SessionManager};
use mac2m3u::{filter, playlist, prompts};

fn cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Green.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default())
}

#[derive(Parser)]
#[command(name = "mac2m3u")]
#[command(about = "Dump MAC-portal IPTV catalogs to M3U playlists")]
#[command(version)]
#[command(styles = cargo_style())]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to an alternative config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump live channels
    Channels(DumpArgs),
    /// Dump VOD titles
    Vod(DumpArgs),
    /// Dump series, one playlist entry per episode
    Series(DumpArgs),
}

#[derive(Args)]
struct DumpArgs {
    /// Portal base URL (prompted for when omitted)
    #[arg(short, long)]
    portal: Option<String>,

    /// Device MAC address (prompted for when omitted)
    #[arg(short, long)]
    mac: Option<String>,

    /// Output playlist path (defaults to a timestamped name)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Comma-separated category names; empty selects all
    #[arg(short, long)]
    categories: Option<String>,

    /// Fail instead of prompting for missing or invalid input
    #[arg(long)]
    non_interactive: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive(tracing::Level::DEBUG.into())
                    .add_directive("hyper_util=error".parse()?),
            )
            .init();
    } else if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive("hyper_util=error".parse()?),
            )
            .init();
    }

    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);

    let (kind, args) = match cli.command {
        Commands::Channels(args) => (ContentKind::Channels, args),
        Commands::Vod(args) => (ContentKind::Vod, args),
        Commands::Series(args) => (ContentKind::Series, args),
    };

    // No playlist is ever written after an interrupt: the file only comes
    // into existence once resolution has finished.
    tokio::select! {
        result = run_dump(kind, args, config) => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nInterrupted; no playlist written.");
            std::process::exit(130);
        }
    }
}

async fn run_dump(kind: ContentKind, args: DumpArgs, config: Config) -> Result<()> {
    let portal_url = match args.portal {
        Some(url) => url,
        None if args.non_interactive => {
            anyhow::bail!("--portal is required with --non-interactive")
        }
        None => prompts::prompt_portal_url()?,
    };

    let mac = match args.mac {
        Some(mac) => {
            anyhow::ensure!(
                prompts::is_valid_mac(&mac),
                "Invalid MAC address {mac:?}: expected six colon-separated hex pairs"
            );
            mac.to_uppercase()
        }
        None if args.non_interactive => {
            anyhow::bail!("--mac is required with --non-interactive")
        }
        None => prompts::prompt_mac()?,
    };

    let client = PortalClient::new(&portal_url, &mac, &config)?;
    let base_url = client.base_url().to_string();

    let mut session = SessionManager::new(client);
    let account = session
        .connect()
        .await
        .with_context(|| format!("Failed to authenticate against {base_url}"))?;

    println!("MAC = {}", account.mac);
    if let Some(expiry) = &account.expiry {
        println!("Expiry = {expiry}");
        if session::expiry_in_past(expiry) {
            eprintln!("Warning: subscription appears expired; continuing anyway");
        }
    }
    if let Some(max) = &account.max_connections {
        println!("Max connections = {max}");
    }

    let mut fetcher = CatalogFetcher::new(&mut session, &config.fetch);
    let categories = fetcher
        .categories(kind)
        .await
        .with_context(|| format!("Failed to list {kind} categories"))?;

    let selected = match &args.categories {
        Some(input) => filter::validate(input, &categories)
            .map_err(|rejected| anyhow::anyhow!("{rejected}"))?,
        None if args.non_interactive => categories.clone(),
        None => prompts::prompt_categories(&categories)?,
    };

    println!(
        "Fetching {kind} from {} of {} categories...",
        selected.len(),
        categories.len()
    );
    let sweep = fetcher
        .entries(kind, &selected)
        .await
        .with_context(|| format!("Failed to fetch the {kind} catalog"))?;
    for title in &sweep.dropped {
        eprintln!("Warning: category {title:?} kept reporting more pages and was skipped");
    }
    let entries = sweep.entries;
    println!("{} entries to resolve", entries.len());

    let token = session.token_str().to_string();
    let resolver = LinkResolver::new(session.portal(), &token, &config.fetch);
    let resolved = resolver.resolve_all(entries).await;

    let path = args
        .output
        .unwrap_or_else(|| PathBuf::from(playlist::default_output_name(&base_url)));
    let summary = playlist::write(&path, &resolved)?;

    println!(
        "{} entries: {} resolved, {} skipped",
        summary.total, summary.written, summary.skipped
    );
    if !sweep.dropped.is_empty() {
        println!(
            "{} categor{} skipped at the page limit",
            sweep.dropped.len(),
            if sweep.dropped.len() == 1 { "y" } else { "ies" }
        );
    }
    println!("Playlist written to {}", path.display());
    Ok(())
}
