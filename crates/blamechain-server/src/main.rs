//! blamechain server binary.
//!
//! Settings are layered: built-in defaults, then the TOML file named by
//! `--config` (optional), then `BLAMECHAIN_*` environment variables. Nested
//! keys use a double underscore, e.g. `BLAMECHAIN_LEDGER__HASH_ALGORITHM=sha512`.
//!
//! `--hash-password` reads one line from stdin and prints the argon2 PHC
//! string to put in `auth_password_hash`:
//!
//! ```text
//! printf 'hunter2\n' | blamechain --hash-password
//! ```

use std::{
  io::BufRead as _,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context as _, bail};
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use blamechain_core::ledger::{Ledger, LedgerConfig};
use blamechain_server::{AppState, ServerConfig, auth::AuthConfig};
use blamechain_store_sqlite::SqliteStore;
use clap::Parser;
use rand_core::OsRng;
use tokio::net::TcpListener;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

const DEFAULT_STORE_PATH: &str = "~/.local/share/blamechain/ledger.db";

#[derive(Parser)]
#[command(author, version, about = "Blamechain revision ledger server")]
struct Cli {
  /// TOML settings file; missing is fine.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Hash the password read from stdin for `auth_password_hash`, then exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    println!("{}", hash_password(line.trim_end_matches(['\n', '\r']))?);
    return Ok(());
  }

  let cfg = load_config(&cli.config)?;
  let ledger = open_ledger(&cfg.store_path, cfg.ledger).await?;

  let state = AppState {
    ledger,
    auth: Arc::new(AuthConfig {
      username:      cfg.auth_username,
      password_hash: cfg.auth_password_hash,
    }),
  };

  let address = format!("{}:{}", cfg.host, cfg.port);
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("cannot listen on {address}"))?;
  info!(%address, "serving blamechain API");

  axum::serve(listener, blamechain_server::router(state))
    .await
    .context("server stopped")
}

fn load_config(file: &Path) -> anyhow::Result<ServerConfig> {
  config::Config::builder()
    .set_default("host", "127.0.0.1")?
    .set_default("port", 8080)?
    .set_default("store_path", DEFAULT_STORE_PATH)?
    .add_source(config::File::from(file).required(false))
    .add_source(
      config::Environment::with_prefix("BLAMECHAIN")
        .prefix_separator("_")
        .separator("__"),
    )
    .build()
    .and_then(|c| c.try_deserialize::<ServerConfig>())
    .with_context(|| format!("invalid settings (file {})", file.display()))
}

fn hash_password(password: &str) -> anyhow::Result<String> {
  if password.is_empty() {
    bail!("refusing to hash an empty password");
  }
  let salt = SaltString::generate(&mut OsRng);
  let phc = Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map_err(|e| anyhow::anyhow!("argon2: {e}"))?;
  Ok(phc.to_string())
}

/// Open the SQLite file (creating its directory) and wrap it in a ledger.
async fn open_ledger(
  store_path: &Path,
  config: LedgerConfig,
) -> anyhow::Result<Arc<Ledger<SqliteStore>>> {
  let path = expand_tilde(store_path);
  if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
    std::fs::create_dir_all(dir)
      .with_context(|| format!("cannot create {}", dir.display()))?;
  }

  let store = SqliteStore::open(&path)
    .await
    .with_context(|| format!("cannot open ledger database {}", path.display()))?;

  info!(
    store = %path.display(),
    hash_algorithm = %config.hash_algorithm,
    max_append_attempts = config.max_append_attempts,
    "ledger opened"
  );
  Ok(Arc::new(Ledger::new(Arc::new(store), config)))
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
