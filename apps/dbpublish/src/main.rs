//! dbpublish - publish content-verified database editions to S3.
//!
//! # Usage
//!
//! ```text
//! dbpublish hash GeoLite2-City
//! curl -s "$URL" | dbpublish publish GeoLite2-City --md5 "$MD5" -
//! dbpublish publish GeoLite2-City --md5 "$MD5" --republish
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PUBLISH_BUCKET` | `databases` | Target bucket |
//! | `PUBLISH_DISABLE_ENCRYPTION` | `false` | Upload without server-side encryption |
//! | `PUBLISH_SSE_ALGORITHM` | `AES256` | `AES256` or `aws:kms` |
//! | `PUBLISH_STAGING_DIR` | `tmp` | Staging directory |
//! | `PUBLISH_STAGING_RETENTION` | `keep` | `keep` or `remove-on-success` |
//! | `PUBLISH_TAG_MODIFICATION_DATE` | `true` | Tag objects with the source modification date |
//! | `PUBLISH_VERBOSE` | `false` | Report each successful publish at `info` |
//! | `S3_ENDPOINT_URL` | *(unset)* | S3-compatible endpoint |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use dbpublish_core::{ContentHash, EditionId, EditionPublisher, PublisherConfig};
use dbpublish_s3::S3ObjectStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dbpublish", version, about, long_about = None)]
struct Cli {
    /// S3-compatible endpoint to use instead of AWS.
    #[arg(long, env = "S3_ENDPOINT_URL", global = true)]
    endpoint_url: Option<String>,

    /// Use path-style bucket addressing.
    #[arg(long, global = true)]
    force_path_style: bool,

    /// Target bucket (overrides `PUBLISH_BUCKET`).
    #[arg(long, global = true)]
    bucket: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the published hash of an edition (all zeros when absent).
    Hash {
        /// Edition identifier.
        edition: EditionId,
    },

    /// Stage, verify and upload an edition.
    Publish(PublishArgs),
}

#[derive(Args, Debug)]
struct PublishArgs {
    /// Edition identifier.
    edition: EditionId,

    /// Expected MD5 of the edition, as hex.
    #[arg(long)]
    md5: ContentHash,

    /// Source modification time (RFC 3339). Defaults to the input file's
    /// modification time, or now when reading stdin.
    #[arg(long)]
    modified: Option<DateTime<Utc>>,

    /// Upload even when the published hash already matches.
    #[arg(long)]
    force: bool,

    /// Retry the upload from the staging file of an earlier attempt.
    #[arg(long, conflicts_with = "input")]
    republish: bool,

    /// Input file, or `-` for stdin.
    #[arg(default_value = "-")]
    input: PathBuf,
}

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = PublisherConfig::from_env();
    if let Some(bucket) = cli.bucket {
        config.bucket = bucket;
    }
    init_tracing(&config.log_level)?;

    let store = S3ObjectStore::from_env(cli.endpoint_url.as_deref(), cli.force_path_style).await;
    let publisher = EditionPublisher::new(store, config);

    match cli.command {
        Commands::Hash { edition } => {
            let hash = publisher.query_hash(&edition).await?;
            println!("{hash}");
        }
        Commands::Publish(args) => publish(&publisher, args).await?,
    }

    Ok(())
}

async fn publish(publisher: &EditionPublisher<S3ObjectStore>, args: PublishArgs) -> Result<()> {
    let PublishArgs {
        edition,
        md5,
        modified,
        force,
        republish,
        input,
    } = args;

    if !force && !publisher.needs_update(&edition, &md5).await? {
        info!(%edition, hash = %md5, "published edition is up to date, skipping");
        return Ok(());
    }

    if republish {
        let modified = modified.unwrap_or_else(Utc::now);
        publisher.republish(&edition, &md5, modified).await?;
    } else if is_stdin(&input) {
        let modified = modified.unwrap_or_else(Utc::now);
        publisher
            .write(&edition, tokio::io::stdin(), &md5, modified)
            .await?;
    } else {
        let file = tokio::fs::File::open(&input)
            .await
            .with_context(|| format!("opening {}", input.display()))?;
        let modified = match modified {
            Some(modified) => modified,
            None => file_modified(&file).await?,
        };
        publisher.write(&edition, file, &md5, modified).await?;
    }

    info!(%edition, hash = %md5, bucket = %publisher.config().bucket, "published edition");
    Ok(())
}

fn is_stdin(input: &Path) -> bool {
    input.as_os_str() == "-"
}

async fn file_modified(file: &tokio::fs::File) -> Result<DateTime<Utc>> {
    let metadata = file.metadata().await.context("reading input metadata")?;
    let modified = metadata
        .modified()
        .context("input modification time unavailable")?;
    Ok(DateTime::<Utc>::from(modified))
}
