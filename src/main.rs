use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use kvsession_core::config::{self, Config};
use kvsession_core::session::{SessionHandler, SessionStore};

#[derive(Parser)]
#[command(
    name = "kvsession",
    about = "Inspect and maintain sessions stored in a key-value bucket",
    version = kvsession_core::VERSION,
)]
struct Cli {
    /// Config file (default: ~/.kvsession/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init,
    /// Show configuration and store status
    Status,
    /// Print a session's payload (creates an empty session if missing)
    Read {
        /// Session ID
        id: String,
    },
    /// Replace a session's payload
    Write {
        /// Session ID
        id: String,
        /// Payload to store
        data: String,
    },
    /// Delete a session
    Destroy {
        /// Session ID
        id: String,
    },
    /// List sessions a GC pass would remove, without removing them
    Expired {
        /// Max idle time in seconds (default: config maxLifetime)
        #[arg(short, long)]
        max_lifetime: Option<u64>,
    },
    /// Remove expired sessions
    Gc {
        /// Max idle time in seconds (default: config maxLifetime)
        #[arg(short, long)]
        max_lifetime: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kvsession=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init => cmd_init(config_path)?,
        Commands::Status => cmd_status(&config::load_config(config_path)).await?,
        Commands::Read { id } => {
            let store = open_store(config_path).await?;
            let mut session = store.adapter();
            println!("{}", session.read(&id).await?);
        }
        Commands::Write { id, data } => {
            let store = open_store(config_path).await?;
            let mut session = store.adapter();
            if !session.write(&id, &data).await? {
                anyhow::bail!("store refused the write for session {id}");
            }
        }
        Commands::Destroy { id } => {
            let store = open_store(config_path).await?;
            store.adapter().destroy(&id).await?;
            println!("Destroyed {id}");
        }
        Commands::Expired { max_lifetime } => {
            let cfg = config::load_config(config_path);
            let store = SessionStore::from_config(&cfg).await?;
            let max_lifetime = max_lifetime.unwrap_or(cfg.max_lifetime);
            let ids = store.adapter().expired_ids(max_lifetime).await?;
            for id in &ids {
                println!("{id}");
            }
            eprintln!("{} session(s) idle for more than {}s", ids.len(), max_lifetime);
        }
        Commands::Gc { max_lifetime } => {
            let cfg = config::load_config(config_path);
            let store = SessionStore::from_config(&cfg).await?;
            let max_lifetime = max_lifetime.unwrap_or(cfg.max_lifetime);
            let removed = store.adapter().collect_garbage(max_lifetime).await?;
            println!("Removed {removed} expired session(s) from {}", store.bucket().name());
        }
    }

    Ok(())
}

async fn open_store(config_path: Option<&std::path::Path>) -> Result<SessionStore> {
    let cfg = config::load_config(config_path);
    Ok(SessionStore::from_config(&cfg).await?)
}

fn cmd_init(config_path: Option<&std::path::Path>) -> Result<()> {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(config::get_config_path);

    if path.exists() {
        println!("Config already exists at {}", path.display());
        println!("Delete it first to re-initialize.");
        return Ok(());
    }

    config::save_config(&Config::default(), Some(&path))?;
    println!("Created config at {}", path.display());
    Ok(())
}

async fn cmd_status(cfg: &Config) -> Result<()> {
    println!("kvsession {}\n", kvsession_core::VERSION);
    println!("Backend: {}", cfg.backend.as_str());
    println!("Endpoint: {}", cfg.endpoint());
    println!("Bucket: {}", cfg.bucket);
    println!(
        "Codec: {}",
        if cfg.use_structured_codec { "structured (base64)" } else { "raw" }
    );
    println!("Max lifetime: {}s", cfg.max_lifetime);
    if cfg.backend == config::StoreBackend::File {
        println!("Data dir: {}", cfg.data_dir_path().display());
    }

    match SessionStore::from_config(cfg).await {
        Ok(store) => {
            let mut session = store.adapter();
            let ok = session.open("", "status");
            println!("Store: {}", if ok { "✓" } else { "✗" });
        }
        Err(e) => println!("Store: ✗ ({e})"),
    }
    Ok(())
}
