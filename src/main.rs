use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use kobo_ratelimit::clock::SystemClock;
use kobo_ratelimit::config::AppConfig;
use kobo_ratelimit::error::{KoboError, QuotaExceeded};
use kobo_ratelimit::ratelimit::{with_rate_limit, BucketKey, OperationCategory, RateLimiter};
use kobo_ratelimit::storage::FileStorage;

/// Exit code reported when a check is refused.
const EXIT_DENIED: u8 = 2;

/// Inspect and drive the KoboNFT advisory rate limiter.
#[derive(Debug, Parser)]
#[command(name = "kobo-ratelimit", version, about)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Storage document path, overriding the configuration
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Count one request against a bucket
    Check {
        /// Operation category, e.g. ai_generation
        category: OperationCategory,
        /// User, wallet or session identifier
        identity: String,
        /// Refuse outright when the category's quota is zero
        #[arg(long)]
        strict: bool,
    },
    /// Show a bucket's remaining quota without counting a request
    Status {
        category: OperationCategory,
        identity: String,
    },
    /// Clear a bucket's window
    Reset {
        category: OperationCategory,
        identity: String,
    },
    /// Drop every expired window from the store
    Purge,
    /// List effective quotas per category
    Presets,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(store) = cli.store {
        config.storage.path = store;
    }

    init_tracing(&config);
    debug!(storage = %config.storage.path.display(), "Configuration loaded");

    let presets = config.preset_table()?;
    let limiter = RateLimiter::with_options(
        FileStorage::new(&config.storage.path),
        SystemClock,
        config.storage.key.clone(),
    );

    match cli.command {
        Command::Check {
            category,
            identity,
            strict,
        } => {
            let key = BucketKey::new(category, identity);
            let bucket = key.to_string_key();
            let quota = presets.get(category);

            let outcome = if strict {
                if limiter.check_limit_strict(&bucket, quota) {
                    Ok(())
                } else {
                    Err(KoboError::from(QuotaExceeded::from_millis(
                        limiter.get_reset_time(&bucket),
                    )))
                }
            } else {
                with_rate_limit(&limiter, &bucket, quota, || async { Ok::<_, KoboError>(()) }).await
            };

            match outcome {
                Ok(()) => {
                    let remaining = limiter.get_remaining(&bucket, quota);
                    info!(key = %key, remaining = remaining, "Request admitted");
                    println!("allowed {} ({} remaining)", key, remaining);
                    Ok(ExitCode::SUCCESS)
                }
                Err(KoboError::QuotaExceeded(e)) => {
                    println!("denied {}: {}", key, e);
                    Ok(ExitCode::from(EXIT_DENIED))
                }
                Err(e) => Err(e.into()),
            }
        }
        Command::Status { category, identity } => {
            let key = BucketKey::new(category, identity);
            let quota = presets.get(category);
            let status = limiter.status(&key.to_string_key(), quota);

            println!(
                "{}: {}/{} remaining, resets in {} ms, next request {}",
                key,
                status.remaining,
                status.limit,
                status.reset_after_ms,
                if status.allowed_next { "allowed" } else { "denied" }
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Reset { category, identity } => {
            let key = BucketKey::new(category, identity);
            limiter.reset(&key.to_string_key());
            info!(key = %key, "Bucket reset");
            println!("reset {}", key);
            Ok(ExitCode::SUCCESS)
        }
        Command::Purge => {
            let purged = limiter.purge_expired();
            println!("purged {} expired window(s)", purged);
            Ok(ExitCode::SUCCESS)
        }
        Command::Presets => {
            for (category, quota) in presets.iter() {
                println!(
                    "{:<16} {:>4} per {} ms",
                    category.key_prefix(),
                    quota.max_requests,
                    quota.window_ms
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Initialize tracing on stderr, leaving stdout for command output.
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
