//! Forge Writer CLI
//!
//! Local execution entry point. For AWS Lambda, use `forge-writer-lambda`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use forge_writer::{
    config::load_config,
    error::Result,
    models::{ArticleLength, DraftTemplate, GenerationRequest, ProgressStatus},
    pipeline::{self, PublishContext},
    services::TrendsClient,
    storage::load_configured_template,
    utils::{console, http},
};
use tokio_util::sync::CancellationToken;

/// Forge Writer - keyword-driven article drafts
#[derive(Parser, Debug)]
#[command(
    name = "forge-writer",
    version,
    about = "Generate articles from keywords and file them as CMS drafts"
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "forge.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the current trending topics
    Trends {
        /// Show at most this many topics
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Generate an article and print its HTML
    Generate {
        #[command(flatten)]
        request: RequestArgs,

        /// Write the HTML to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Wait for a previously submitted job and print its HTML
    Watch {
        /// Reference key returned when the job was submitted
        #[arg(long)]
        ref_key: String,

        /// Write the HTML to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the full flow: generate, then file the article as a CMS draft
    Publish {
        #[command(flatten)]
        request: RequestArgs,
    },

    /// Validate configuration and the draft template
    Validate,
}

#[derive(Args, Debug)]
struct RequestArgs {
    /// Keyword the article is written about
    keyword: String,

    /// Article length: short, medium, long or longer
    #[arg(short, long, default_value = "short")]
    length: ArticleLength,

    /// Comma-separated topics to keep out of the article
    #[arg(long, default_value = "")]
    exclude: String,

    /// Free-form instructions for the writer (max 500 characters)
    #[arg(long, default_value = "")]
    instructions: String,

    /// Probability of adding an image, 0 to 1
    #[arg(long, default_value_t = 0.0)]
    image: f64,

    /// Probability of adding a video, 0 to 1
    #[arg(long, default_value_t = 0.0)]
    video: f64,
}

impl RequestArgs {
    fn into_request(self) -> Result<GenerationRequest> {
        GenerationRequest::new(
            self.keyword,
            self.length,
            self.exclude,
            self.instructions,
            self.image,
            self.video,
        )
    }
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Cancellation token tripped by Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, stopping...");
            trigger.cancel();
        }
    });
    token
}

/// Progress observer drawing a single redrawn bar.
fn show_progress(status: &ProgressStatus) {
    match status {
        ProgressStatus::Pending(percent) => console::progress(&console::bar(*percent, 30)),
        ProgressStatus::Complete => {
            console::progress(&console::bar(100, 30));
            console::end_progress();
        }
        ProgressStatus::Failed(_) => console::end_progress(),
    }
}

/// Directory relative template paths are resolved against.
fn config_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn emit(html: &str, output: Option<PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(&path, html)?;
            console::success(&format!("Article written to {}", path.display()));
        }
        None => println!("{html}"),
    }
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli.config);
    log::debug!("Configuration resolved from {}", cli.config.display());

    match cli.command {
        Command::Trends { limit } => {
            let client = http::create_client(&config.http)?;
            let topics = TrendsClient::new(client, &config.trends).fetch().await?;

            console::header("Trending topics");
            for (i, topic) in topics.iter().take(limit).enumerate() {
                let details = topic
                    .details()
                    .into_iter()
                    .map(|(name, value)| format!("{name}: {value}"))
                    .collect::<Vec<_>>();
                let label = topic.label().unwrap_or("(untitled)");
                if details.is_empty() {
                    println!("  {:>3}. {}", i + 1, label);
                } else {
                    println!("  {:>3}. {}  ({})", i + 1, label, details.join(", "));
                }
            }
            console::summary(
                "Trends",
                &[
                    ("Shown", topics.len().min(limit).to_string()),
                    ("Total", topics.len().to_string()),
                ],
            );
        }

        Command::Generate { request, output } => {
            config.validate_generator()?;
            let request = request.into_request()?;
            let ctx = PublishContext::new(Arc::new(config), DraftTemplate::default())?;

            console::step(1, 1, &format!("Generating article for '{}'", request.keyword()));
            let article =
                pipeline::run_generate(&ctx, &request, cancel_on_ctrl_c(), show_progress).await?;
            console::success(&format!("Article {} ready", article.ref_key));
            emit(&article.body_html, output)?;
        }

        Command::Watch { ref_key, output } => {
            config.validate_generator()?;
            let ctx = PublishContext::new(Arc::new(config), DraftTemplate::default())?;

            console::step(1, 1, &format!("Waiting for article {ref_key}"));
            let article =
                pipeline::run_watch(&ctx, &ref_key, cancel_on_ctrl_c(), show_progress).await?;
            console::success(&format!("Article {} ready", article.ref_key));
            emit(&article.body_html, output)?;
        }

        Command::Publish { request } => {
            config.validate()?;
            let request = request.into_request()?;
            let template =
                load_configured_template(&config.template, &config_dir(&cli.config)).await?;
            let ctx = PublishContext::new(Arc::new(config), template)?;

            console::header(&format!("Publishing '{}'", request.keyword()));
            let report =
                pipeline::run_publish(&ctx, &request, cancel_on_ctrl_c(), show_progress).await?;

            console::summary(
                "Draft created",
                &[
                    ("Ref key", report.ref_key.clone()),
                    ("Draft", report.draft_id.clone()),
                    ("Etag", report.etag.clone()),
                    ("Slugline", report.slugline.clone().unwrap_or_default()),
                    ("Desk", report.location.desk_id.clone()),
                    ("Stage", report.location.stage_id.clone()),
                    ("Completed", report.completed_at.to_rfc3339()),
                ],
            );
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            console::success("Config OK");

            load_configured_template(&config.template, &config_dir(&cli.config)).await?;
            console::success("Draft template OK");
        }
    }

    Ok(())
}
