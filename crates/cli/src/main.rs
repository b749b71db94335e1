//! Atelier CLI - Operator tools for the storefront client.
//!
//! # Usage
//!
//! ```bash
//! # Generate the sitemap from the catalog
//! atelier sitemap --out public/sitemap.xml
//!
//! # Generate robots.txt
//! atelier robots
//!
//! # Migrate persisted client state in place
//! atelier storage migrate --dir .atelier
//!
//! # Inspect one persisted namespace
//! atelier storage show atelier-wishlist
//! ```
//!
//! # Commands
//!
//! - `sitemap` - Crawl product, collection and category listings into `sitemap.xml`
//! - `robots` - Emit `robots.txt` pointing at the sitemap
//! - `storage migrate` - Run the compare-list price migration and wishlist repair
//! - `storage show` - Pretty-print a persisted namespace

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "atelier")]
#[command(author, version, about = "Atelier storefront operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate sitemap.xml from the catalog
    Sitemap {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Generate robots.txt
    Robots {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Maintain persisted client storage
    Storage {
        #[command(subcommand)]
        action: StorageAction,
    },
}

#[derive(Subcommand)]
enum StorageAction {
    /// Run storage migrations in place
    Migrate {
        /// Storage directory
        #[arg(short, long, env = "ATELIER_STORAGE_DIR", default_value = ".atelier")]
        dir: PathBuf,
    },
    /// Print one namespace
    Show {
        /// Namespace key (e.g. `atelier-compare`)
        namespace: String,

        /// Storage directory
        #[arg(short, long, env = "ATELIER_STORAGE_DIR", default_value = ".atelier")]
        dir: PathBuf,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry() -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok().filter(|v| !v.is_empty())?;

    let guard = sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: std::env::var("SENTRY_ENVIRONMENT")
                .ok()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    // Load .env before clap reads env-backed arguments
    let _ = dotenvy::dotenv();

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "atelier_storefront=info,atelier_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Sitemap { out } => commands::sitemap::sitemap(out.as_deref()).await?,
        Commands::Robots { out } => commands::sitemap::robots(out.as_deref())?,
        Commands::Storage { action } => match action {
            StorageAction::Migrate { dir } => {
                commands::storage::migrate(&dir)?;
            }
            StorageAction::Show { namespace, dir } => {
                match commands::storage::show(&dir, &namespace)? {
                    Some(json) => commands::write_output(None, &format!("{json}\n"))?,
                    None => tracing::info!(namespace = %namespace, "Namespace is empty"),
                }
            }
        },
    }
    Ok(())
}
