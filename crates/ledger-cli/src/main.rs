mod commands;
mod env;
mod keychain;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use ledger_auth::{AuthGateway, ClientConfig, FileStore, SessionStore};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{auth, nav};
use crate::keychain::KeyringStore;

#[derive(Debug, Parser)]
#[command(name = "ledger", about = "Ledger CLI — sign in to the ledger API")]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    /// Where the session is kept
    #[arg(long, global = true, value_enum, default_value = "keychain")]
    store: StoreKind,

    /// Session file (implies `--store file`)
    #[arg(long, global = true)]
    session_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StoreKind {
    Keychain,
    File,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sign in with email/password
    Login {
        /// Email address (prompted if omitted)
        #[arg(long)]
        email: Option<String>,
        /// Page to continue at after sign-in
        #[arg(long)]
        redirect: Option<String>,
    },
    /// Sign out and clear the stored session
    Logout,
    /// Show the stored session and remaining TTL
    Status,
    /// Ask the backend who is signed in
    Whoami,
    /// Check whether a page is reachable with the current session
    Guard {
        /// App-relative URL, e.g. /accounts?page=2
        href: String,
    },
    /// Authenticated GET against an API endpoint
    Get {
        /// Endpoint path, e.g. /api/accounts/
        endpoint: String,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open_store(cli: &Cli, config: &ClientConfig) -> Arc<dyn SessionStore> {
    if let Some(path) = &cli.session_file {
        return Arc::new(FileStore::new(path));
    }
    match cli.store {
        StoreKind::Keychain => Arc::new(KeyringStore::for_origin(&config.origin())),
        StoreKind::File => {
            let dir = dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("ledger");
            Arc::new(FileStore::for_origin(&dir, &config.origin()))
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = env::client_config()?;
    let store = open_store(&cli, &config);
    let gateway = AuthGateway::new(config.clone(), store.clone())?;

    match cli.command {
        Commands::Login { email, redirect } => {
            auth::cmd_login(&gateway, email, redirect, cli.json).await
        }
        Commands::Logout => auth::cmd_logout(&gateway, cli.json).await,
        Commands::Status => auth::cmd_status(&gateway, cli.json),
        Commands::Whoami => auth::cmd_whoami(&gateway, cli.json).await,
        Commands::Guard { href } => nav::cmd_guard(store, &config.sign_in_path, &href, cli.json),
        Commands::Get { endpoint } => nav::cmd_get(&gateway, &endpoint, cli.json).await,
    }
}

pub fn pout(json_mode: bool, value: serde_json::Value, text: &str) -> anyhow::Result<()> {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{text}");
    }
    Ok(())
}
