//! meshbeaconctl — command-line interface for the LAN beacon protocol.
//!
//! A single `clap`-derived `Cli` with subcommands that dispatch into free
//! functions, rather than any internal service/daemon framework.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use meshbeacon::config::Config;
use meshbeacon::emitter::run_emitter;
use meshbeacon::keystore::{FileKeystore, Keystore, PublicKey};
use meshbeacon::listener::{run_listener, NullChannelObserver};
use meshbeacon::logging::AuditLog;
use meshbeacon::recognizer::BeaconObserver;
use meshbeacon::{hash::Blake3Hasher, KeyEntry};

const DEFAULT_CONFIG_PATH: &str = "meshbeacon.toml";

#[derive(Parser)]
#[command(
    name = "meshbeaconctl",
    version,
    author,
    about = "meshbeaconctl — LAN peer discovery beacon control"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the emitter loop, advertising the local keystore.
    Emit,
    /// Run the listener loop, recognizing peers advertising a known key.
    Listen,
    /// Generate a new ed25519 keypair and add its public half to the
    /// keystore.
    Keygen {
        /// Optional display tag for the new key.
        #[arg(long)]
        tag: Option<String>,
    },
    /// Inspect or edit the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    View,
    /// Set one of the quick-edit fields (`timesleep`, `bind_addr`,
    /// `broadcast_addr`, `pending_map_cap`); other fields are best edited
    /// directly in the TOML file.
    Set {
        key: String,
        value: String,
    },
}

struct LoggingObserver;

impl BeaconObserver for LoggingObserver {
    fn on_beacon(&mut self, matched: &KeyEntry, challenge: u64) {
        info!(
            pubkey = %matched.pubkey.to_hex(),
            tag = matched.tag.as_deref().unwrap_or("<untagged>"),
            challenge,
            "recognized peer"
        );
    }
}

#[tokio::main]
async fn main() {
    meshbeacon::logging::init_tracing();
    let cli = Cli::parse();

    let cfg = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Emit => run_emit(&cfg).await,
        Commands::Listen => run_listen(&cfg).await,
        Commands::Keygen { tag } => run_keygen(&cfg, tag),
        Commands::Config { action } => run_config(&cli.config, &cfg, action),
    };

    if let Err(e) = result {
        error!(error = %e, "command failed");
        std::process::exit(1);
    }
}

async fn run_emit(cfg: &Config) -> meshbeacon::Result<()> {
    let keystore = FileKeystore::open(&cfg.keystore_path)?;
    let hasher = Blake3Hasher;
    let local_addr: SocketAddr = "0.0.0.0:0".parse().expect("valid literal socket address");
    let broadcast_addr: SocketAddr = cfg
        .broadcast_addr
        .parse()
        .unwrap_or_else(|_| panic!("invalid broadcast_addr in config: {}", cfg.broadcast_addr));

    let (_tx, rx) = tokio::sync::watch::channel(false);
    run_emitter(
        local_addr,
        broadcast_addr,
        &keystore,
        &hasher,
        std::time::Duration::from_secs(cfg.timesleep),
        rx,
    )
    .await
}

async fn run_listen(cfg: &Config) -> meshbeacon::Result<()> {
    let keystore = FileKeystore::open(&cfg.keystore_path)?;
    let hasher = Blake3Hasher;
    let bind_addr: SocketAddr = cfg
        .bind_addr
        .parse()
        .unwrap_or_else(|_| panic!("invalid bind_addr in config: {}", cfg.bind_addr));

    let mut observer = LoggingObserver;
    let (_tx, rx) = tokio::sync::mpsc::channel(1);

    let audit_log = match &cfg.audit_log_path {
        Some(path) => Some(AuditLog::open(path)?),
        None => None,
    };

    run_listener(
        bind_addr,
        cfg.pending_map_cap,
        &keystore,
        &hasher,
        &mut observer,
        rx,
        Box::new(NullChannelObserver),
        audit_log.as_ref(),
    )
    .await
}

fn run_keygen(cfg: &Config, tag: Option<String>) -> meshbeacon::Result<()> {
    use ed25519_dalek::Keypair;
    use rand::rngs::OsRng;

    let keypair = Keypair::generate(&mut OsRng);
    let pubkey = PublicKey(keypair.public.to_bytes());

    let keystore = FileKeystore::open(&cfg.keystore_path)?;
    keystore.add(pubkey, tag.clone())?;

    println!("public key: {}", pubkey.to_hex());
    if let Some(tag) = tag {
        println!("tag: {tag}");
    }
    println!(
        "secret key: {} (not stored — record it now, it cannot be recovered)",
        hex::encode(keypair.secret.to_bytes())
    );
    Ok(())
}

fn run_config(path: &PathBuf, cfg: &Config, action: ConfigAction) -> meshbeacon::Result<()> {
    match action {
        ConfigAction::View => {
            let toml = toml::to_string_pretty(cfg).expect("Config serialization is infallible");
            println!("{toml}");
            Ok(())
        }
        ConfigAction::Set { key, value } => {
            let mut cfg = cfg.clone();
            match key.as_str() {
                "timesleep" => {
                    cfg.timesleep = value
                        .parse()
                        .unwrap_or_else(|_| panic!("timesleep must be an integer, got {value}"));
                }
                "bind_addr" => cfg.bind_addr = value,
                "broadcast_addr" => cfg.broadcast_addr = value,
                "pending_map_cap" => {
                    cfg.pending_map_cap = value
                        .parse()
                        .unwrap_or_else(|_| panic!("pending_map_cap must be an integer, got {value}"));
                }
                other => {
                    eprintln!("unknown config key: {other}");
                    std::process::exit(1);
                }
            }
            cfg.save(path)
        }
    }
}
