use anyhow::Context;
use clap::{Parser, Subcommand};
use reddit_client::TrendingService;
use serde_json::json;
use std::path::PathBuf;
use trending_core::{CoreError, ErrorExt, ErrorReporter, Timeframe, TrendingConfig};

#[derive(Parser)]
#[command(
    name = "trending",
    version,
    about = "Top posts of a subreddit, from whichever Reddit surface answers"
)]
struct Cli {
    /// TOML configuration file; REDDIT_* environment variables override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that a subreddit exists and find its canonical name.
    Resolve { name: String },
    /// Resolve a subreddit and print its top posts.
    Top {
        name: String,
        /// hour, day, week, month, year or all
        #[arg(short, long, default_value = "day")]
        timeframe: String,
    },
    /// List the retrieval stages in the order they are tried.
    Stages,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trending=info,reddit_client=info,trending_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => TrendingConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => TrendingConfig::default(),
    }
    .apply_env();
    tracing::debug!(
        "Configuration: top {} with {:?} request spacing",
        config.top_n,
        config.min_request_interval()
    );

    let service = TrendingService::from_config(&config).context("starting trending service")?;

    let output = match cli.command {
        Command::Resolve { name } => service
            .resolve(&name)
            .await
            .map_err(CoreError::from)
            .and_then(|result| Ok(serde_json::to_value(result)?)),
        Command::Top { name, timeframe } => service
            .trending(&name, &Timeframe::from(timeframe.as_str()))
            .await
            .map_err(CoreError::from)
            .and_then(|report| Ok(serde_json::to_value(report)?)),
        Command::Stages => Ok(json!(service.stage_names())),
    };

    match output {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            ErrorReporter::new().report_error(&e);
            let body = json!({
                "error": e.error_code(),
                "message": e.user_friendly_message(),
                "status": e.http_status(),
                "retry_after": e.retry_after().map(|d| d.as_secs()),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
            std::process::exit(1);
        }
    }
}
