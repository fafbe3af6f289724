use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use s3fetch::{
    format_bytes, Downloader, ProgressSnapshot, S3ClientConfig, S3Store, TransferConfig,
    TransferOutcome, TransferRequest,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Minimum interval between two progress renders.
const UPDATE_INTERVAL: Duration = Duration::from_millis(500);

/// Capacity of the progress stream; older snapshots are dropped when it is full.
const PROGRESS_BUFFER_SIZE: usize = 100;

#[derive(Parser, Debug)]
#[command(name = "s3fetch")]
#[command(about = "Download everything under an S3 prefix to a local directory", long_about = None)]
#[command(version)]
struct Args {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct ConnectionArgs {
    /// AWS region of the bucket
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1", global = true)]
    region: String,

    /// Access key ID (falls back to the default credential chain)
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true, global = true)]
    access_key: Option<String>,

    /// Secret access key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true, global = true)]
    secret_key: Option<String>,

    /// Custom endpoint for S3-compatible services (R2, MinIO, ...)
    #[arg(long, env = "AWS_ENDPOINT_URL", global = true)]
    endpoint_url: Option<String>,

    /// Address buckets as https://host/bucket instead of https://bucket.host
    #[arg(long, global = true)]
    force_path_style: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download every object under a prefix
    Download {
        /// Bucket name
        bucket: String,

        /// Key prefix to download (empty for the whole bucket)
        #[arg(short, long, default_value = "")]
        prefix: String,

        /// Local destination directory
        #[arg(short, long)]
        output: PathBuf,

        /// Replace files that already exist locally
        #[arg(long)]
        overwrite: bool,

        /// Number of concurrent object downloads (default: 4 per CPU)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Objects above this many bytes are fetched in ranged parts
        #[arg(long)]
        part_size: Option<u64>,

        /// Ranged requests in flight per object
        #[arg(long)]
        part_concurrency: Option<usize>,

        /// Deadline per object (e.g. "30m", "90s")
        #[arg(long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,

        /// Deadline for the whole run; expiry cancels it
        #[arg(long, value_parser = humantime::parse_duration)]
        deadline: Option<Duration>,

        /// Print the final counters as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Check that a bucket exists and is accessible
    Check {
        /// Bucket name
        bucket: String,
    },

    /// List the sub-prefixes directly below a prefix
    Prefixes {
        /// Bucket name
        bucket: String,

        /// Parent prefix
        #[arg(default_value = "")]
        prefix: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("s3fetch={}", log_level))),
        )
        .init();

    let client_config = S3ClientConfig {
        region: args.connection.region,
        access_key: args.connection.access_key,
        secret_key: args.connection.secret_key,
        endpoint_url: args.connection.endpoint_url,
        force_path_style: args.connection.force_path_style,
    };

    match args.command {
        Command::Check { bucket } => {
            let downloader = connect(&client_config, TransferConfig::default()).await?;
            downloader
                .validate_bucket_exists(&bucket)
                .await
                .context("bucket validation failed")?;
            info!("✅ Connected to bucket '{}'", bucket);
            Ok(())
        }
        Command::Prefixes { bucket, prefix } => {
            let downloader = connect(&client_config, TransferConfig::default()).await?;
            let prefixes = downloader
                .list_prefixes(&bucket, &prefix)
                .await
                .context("listing prefixes failed")?;
            for p in prefixes {
                println!("{}", p);
            }
            Ok(())
        }
        Command::Download {
            bucket,
            prefix,
            output,
            overwrite,
            workers,
            part_size,
            part_concurrency,
            timeout,
            deadline,
            json,
        } => {
            let defaults = TransferConfig::default();
            let config = TransferConfig {
                max_workers: workers.unwrap_or(defaults.max_workers),
                part_size: part_size.unwrap_or(defaults.part_size),
                part_concurrency: part_concurrency.unwrap_or(defaults.part_concurrency),
                per_object_timeout: timeout.unwrap_or(defaults.per_object_timeout),
                overall_timeout: deadline,
                queue_capacity: defaults.queue_capacity,
            };
            config.validate()?;

            info!("🚀 s3fetch");
            info!("Source: s3://{}/{}", bucket, prefix);
            info!("Output directory: {:?}", output);

            let downloader = connect(&client_config, config).await?;
            let request = TransferRequest::new(bucket, prefix, output).overwrite(overwrite);
            download(&downloader, &request, json).await
        }
    }
}

async fn connect(client_config: &S3ClientConfig, config: TransferConfig) -> anyhow::Result<Downloader> {
    let store = S3Store::connect(client_config)
        .await
        .context("failed to create S3 client")?;
    Ok(Downloader::new(Arc::new(store), config))
}

async fn download(
    downloader: &Downloader,
    request: &TransferRequest,
    json: bool,
) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Stopping...");
            ctrl_c.cancel();
        }
    });

    let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_BUFFER_SIZE);
    let bar = if atty::is(atty::Stream::Stderr) {
        Some(progress_bar()?)
    } else {
        None
    };
    let reporter = tokio::spawn(report_progress(progress_rx, bar));

    let outcome = downloader.run(request, Some(progress_tx), cancel).await;
    let (bar, mut speed) = reporter.await.context("progress reporter failed")?;

    // the last published snapshot may have been dropped; the outcome's totals are final
    let totals = outcome.totals();
    render(&bar, &totals, speed.update(totals.total_bytes));
    if let Some(bar) = bar {
        bar.finish();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&totals)?);
    }

    match outcome {
        TransferOutcome::Success { totals } => {
            info!(
                "✅ Complete! {} files downloaded ({}), {} skipped",
                totals.files_downloaded,
                format_bytes(totals.total_bytes),
                totals.files_skipped
            );
            Ok(())
        }
        TransferOutcome::Canceled { totals } => {
            eprintln!(
                "Canceled after {} of {} files",
                totals.files_downloaded + totals.files_skipped,
                totals.files_found
            );
            std::process::exit(130);
        }
        TransferOutcome::Failed {
            first_error,
            error_count,
            ..
        } => {
            eprintln!(
                "❌ Error: encountered {} errors during download. First error: {}",
                error_count, first_error
            );
            std::process::exit(1);
        }
    }
}

fn progress_bar() -> anyhow::Result<ProgressBar> {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg} | {elapsed_precise} elapsed")?
            .progress_chars("█▓▒░ "),
    );
    bar.set_message("Starting...");
    Ok(bar)
}

/// Renders snapshots at most every [`UPDATE_INTERVAL`] until the sender is
/// gone, then hands the bar back for the final render.
async fn report_progress(
    mut rx: mpsc::Receiver<ProgressSnapshot>,
    bar: Option<ProgressBar>,
) -> (Option<ProgressBar>, Throughput) {
    let mut last_render: Option<Instant> = None;
    let mut speed = Throughput::new();

    while let Some(snapshot) = rx.recv().await {
        let due = last_render.map_or(true, |t| t.elapsed() >= UPDATE_INTERVAL);
        if due {
            last_render = Some(Instant::now());
            render(&bar, &snapshot, speed.update(snapshot.total_bytes));
        }
    }
    (bar, speed)
}

fn render(bar: &Option<ProgressBar>, p: &ProgressSnapshot, bytes_per_sec: f64) {
    let mut msg = format!(
        "| {} @ {}/s",
        format_bytes(p.total_bytes),
        format_bytes(bytes_per_sec as u64)
    );
    if p.files_skipped > 0 {
        msg.push_str(&format!(" | skipped {}", p.files_skipped));
    }
    if p.error_count > 0 {
        msg.push_str(&format!(" | errors {}", p.error_count));
    }

    match bar {
        Some(bar) => {
            bar.set_length(p.files_found);
            bar.set_position(p.files_downloaded + p.files_skipped);
            bar.set_message(msg);
        }
        None => info!(
            "Files: {}/{} {}",
            p.files_downloaded + p.files_skipped,
            p.files_found,
            msg
        ),
    }
}

/// Download speed between two renders.
struct Throughput {
    last_bytes: u64,
    last_update: Instant,
    bytes_per_sec: f64,
}

impl Throughput {
    fn new() -> Self {
        Self {
            last_bytes: 0,
            last_update: Instant::now(),
            bytes_per_sec: 0.0,
        }
    }

    fn update(&mut self, total_bytes: u64) -> f64 {
        let elapsed = self.last_update.elapsed().as_secs_f64();
        if elapsed > 0.0 && total_bytes >= self.last_bytes {
            self.bytes_per_sec = (total_bytes - self.last_bytes) as f64 / elapsed;
            self.last_bytes = total_bytes;
            self.last_update = Instant::now();
        }
        self.bytes_per_sec
    }
}
