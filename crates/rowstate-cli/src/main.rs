use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rowstate::StateAccess;

mod commands;

#[derive(Parser)]
#[command(
    name = "rowstate",
    about = "rowstate — key-value state with optimistic concurrency",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to a rowstate.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Connection string (postgres://... or sqlite:...); overrides the config file
    #[arg(long, global = true)]
    connection_string: Option<String>,
    /// State table name; overrides the config file
    #[arg(long, global = true)]
    table: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and create the state table if it is absent
    Init,
    /// Read a key and print its value and ETag
    Get { key: String },
    /// Write a JSON value, conditionally when --etag is given
    Set {
        key: String,
        /// JSON document to store
        value: String,
        #[arg(long)]
        etag: Option<String>,
    },
    /// Delete a key, conditionally when --etag is given
    Delete {
        key: String,
        #[arg(long)]
        etag: Option<String>,
    },
    /// Apply a batch file atomically.
    ///
    /// The file holds `{"deletes": [{"key", "etag"?}], "sets": [{"key", "value", "etag"?}]}`.
    /// Deletes run first, then sets; any failure rolls back the whole batch.
    Batch { file: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rowstate=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = commands::resolve_config(
        cli.config.as_deref(),
        cli.connection_string,
        cli.table,
    )?;
    let store = rowstate::StateStore::connect(&config).await?;

    let result = match cli.command {
        Commands::Init => commands::state::init(&store),
        Commands::Get { key } => commands::state::get(&store, &key).await,
        Commands::Set { key, value, etag } => {
            commands::state::set(&store, &key, &value, etag).await
        }
        Commands::Delete { key, etag } => commands::state::delete(&store, &key, etag).await,
        Commands::Batch { file } => commands::state::batch(&store, &file).await,
    };

    store.close().await;
    result
}
