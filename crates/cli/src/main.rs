//! Pokébolsa CLI - browse the catalog and manage the session cart.
//!
//! # Usage
//!
//! ```bash
//! # List mega-evolution cards (or store products)
//! pokebolsa catalog --cards
//! pokebolsa catalog --products --refresh
//!
//! # Work with the cart of this installation's session
//! pokebolsa cart add xy1-1
//! pokebolsa cart increase xy1-1
//! pokebolsa cart show
//!
//! # Accounts
//! pokebolsa register -n "Ash" -e ash@example.com -p pikachu
//! pokebolsa login -u ash@example.com -p pikachu
//! pokebolsa logout
//! ```
//!
//! Configuration comes from the environment (and `.env`); see
//! `pokebolsa_storefront::config`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Args, Parser, Subcommand};
use pokebolsa_core::QuantityChange;
use pokebolsa_storefront::{AppError, StoreConfig};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{Context, SourceKind};

#[derive(Parser)]
#[command(name = "pokebolsa")]
#[command(author, version, about = "Pokébolsa cart and catalog")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List products
    Catalog {
        #[command(flatten)]
        source: SourceArgs,

        /// Bypass the cached listing
        #[arg(long)]
        refresh: bool,
    },
    /// Show or change the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Show this installation's session id
    Session,
    /// Log in
    Login {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        password: String,
    },
    /// Create an account
    Register {
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },
    /// Log out (the cart is kept)
    Logout,
}

#[derive(Subcommand)]
enum CartAction {
    /// Print lines and totals
    Show,
    /// Add one unit of a catalog product
    Add {
        id: String,

        #[command(flatten)]
        source: SourceArgs,
    },
    /// Remove a line
    Remove { id: String },
    /// Add one unit to a line
    Increase { id: String },
    /// Take one unit from a line; the line goes away at zero
    Decrease { id: String },
}

#[derive(Args)]
#[group(multiple = false)]
struct SourceArgs {
    /// Trading cards (default)
    #[arg(long)]
    cards: bool,

    /// Store products
    #[arg(long)]
    products: bool,
}

impl SourceArgs {
    const fn kind(&self) -> SourceKind {
        if self.products {
            SourceKind::Products
        } else {
            SourceKind::Cards
        }
    }
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StoreConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
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
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN | tracing::Level::INFO => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration first; Sentry needs it before tracing starts
    let config = StoreConfig::from_env();
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pokebolsa_storefront=info,pokebolsa_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(AppError::from(e)),
    };

    if let Err(e) = result {
        e.report();
        tracing::error!("{}", e.notice());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: StoreConfig) -> pokebolsa_storefront::error::Result<()> {
    let ctx = Context::new(config)?;

    match cli.command {
        Commands::Catalog { source, refresh } => {
            commands::catalog::list(&ctx, source.kind(), refresh).await?;
        }
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&ctx).await?,
            CartAction::Add { id, source } => {
                commands::cart::add(&ctx, &id, source.kind()).await?;
            }
            CartAction::Remove { id } => commands::cart::remove(&ctx, &id).await?,
            CartAction::Increase { id } => {
                commands::cart::change(&ctx, &id, QuantityChange::Increase).await?;
            }
            CartAction::Decrease { id } => {
                commands::cart::change(&ctx, &id, QuantityChange::Decrease).await?;
            }
        },
        Commands::Session => commands::account::session(&ctx).await?,
        Commands::Login { username, password } => {
            commands::account::login(&ctx, &username, &password).await?;
        }
        Commands::Register {
            name,
            email,
            password,
        } => commands::account::register(&ctx, &name, &email, &password).await?,
        Commands::Logout => commands::account::logout(&ctx).await?,
    }
    Ok(())
}
