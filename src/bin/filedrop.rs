use anyhow::Result;
use clap::{Parser, Subcommand};
use filedrop::common::{format_bytes, Config, FileId};
use filedrop::ops::{download_file, list_files, upload_file, verify_store};
use filedrop::FileServer;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "filedrop")]
#[command(about = "filedrop file-upload service and CLI")]
#[command(version)]
struct Cli {
    /// Server URL for remote commands
    #[arg(long, global = true, default_value = "http://localhost:9000")]
    server: String,

    /// Config file (TOML), falls back to $FILEDROP_CONFIG
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Address to listen on
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Data directory
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Journal file
        #[arg(long)]
        journal: Option<PathBuf>,

        /// Blob directory
        #[arg(long)]
        blobs: Option<PathBuf>,
    },

    /// Check a data directory offline
    Verify {
        /// Data directory
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Journal file
        #[arg(long)]
        journal: Option<PathBuf>,

        /// Blob directory
        #[arg(long)]
        blobs: Option<PathBuf>,
    },

    /// Upload a file
    Upload {
        /// File path
        path: PathBuf,

        /// Declared media type
        #[arg(long)]
        content_type: Option<String>,
    },

    /// List uploaded files
    List,

    /// Download a file
    Download {
        /// File id
        id: String,

        /// Output file
        #[arg(long)]
        output: PathBuf,
    },
}

fn apply_overrides(
    config: &mut Config,
    data_dir: Option<PathBuf>,
    journal: Option<PathBuf>,
    blobs: Option<PathBuf>,
) -> filedrop::Result<()> {
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    if journal.is_some() {
        config.journal_path = journal;
    }
    if blobs.is_some() {
        config.blobs_dir = blobs;
    }
    config.validate()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Serve {
            bind,
            data_dir,
            journal,
            blobs,
        } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            apply_overrides(&mut config, data_dir, journal, blobs)?;
            FileServer::new(config).serve().await?;
        }

        Commands::Verify {
            data_dir,
            journal,
            blobs,
        } => {
            apply_overrides(&mut config, data_dir, journal, blobs)?;
            let report = verify_store(&config.journal_path(), &config.blobs_dir())?;
            println!("Verification report:");
            println!("  Records: {}", report.records);
            println!("  Healthy: {}", report.healthy);
            println!("  Missing blobs: {}", report.missing_blobs.len());
            for id in &report.missing_blobs {
                println!("    {}", id);
            }
            println!("  Orphaned blobs: {}", report.orphaned_blobs.len());
            println!("  Staged uploads: {}", report.staging_leftovers);
            println!("  Unknown events: {}", report.skipped_events);
            println!("  Torn tail: {}", format_bytes(report.torn_tail_bytes));
            println!("  Total size: {}", format_bytes(report.total_bytes));
            if !report.is_consistent() {
                anyhow::bail!("{} indexed files have no blob", report.missing_blobs.len());
            }
        }

        Commands::Upload { path, content_type } => {
            let record = upload_file(&cli.server, &path, content_type.as_deref()).await?;
            println!("✓ Uploaded {}", record.name);
            println!("  ID: {}", record.id);
            println!("  Type: {}", record.content_type);
        }

        Commands::List => {
            let records = list_files(&cli.server).await?;
            for record in &records {
                println!("{}  {}  {}", record.id, record.content_type, record.name);
            }
            println!("{} files", records.len());
        }

        Commands::Download { id, output } => {
            let id = FileId::parse(&id)?;
            let bytes = download_file(&cli.server, &id, &output).await?;
            println!("✓ Saved {} to {}", format_bytes(bytes), output.display());
        }
    }

    Ok(())
}
