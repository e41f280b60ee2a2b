use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use fencepatch::config::Config;
use fencepatch::github::{ActionsSource, CommentSource, WebhookSource};
use fencepatch::sink::{rerun_sink, GhCommentSink, NotificationSink, StdoutSink};
use fencepatch::{
    extract, handle_comment, ApplyError, ApplyOptions, HandlerContext, HandlerOutcome,
    PatchApplier, Report,
};

#[derive(Parser, Debug)]
#[command(name = "fencepatch")]
#[command(about = "Apply diff blocks from pull request comments to a git working tree")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the patches found in a comment as JSON
    Extract {
        /// Comment body file (default: stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Extract patches from a comment and apply them to a working tree
    Apply {
        /// Git working tree to patch
        #[arg(short, long, default_value = ".")]
        tree: PathBuf,
        /// Comment body file (default: stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Commit locally without pushing
        #[arg(long)]
        no_push: bool,
        /// Branch to push to (default: HEAD's branch name on the remote)
        #[arg(short, long)]
        branch: Option<String>,
        /// Print a JSON summary instead of the Markdown report
        #[arg(long)]
        json: bool,
    },
    /// Handle a GitHub comment event end to end
    Handle {
        /// Event payload file (e.g. $GITHUB_EVENT_PATH)
        #[arg(short, long)]
        event: PathBuf,
        /// Event name (e.g. $GITHUB_EVENT_NAME or the X-GitHub-Event header)
        #[arg(long)]
        event_name: String,
        #[arg(long, value_enum, default_value_t = Source::Actions)]
        source: Source,
        /// Checkout of the PR head branch
        #[arg(short, long, default_value = ".")]
        tree: PathBuf,
        /// Print the report instead of posting it, and never push
        #[arg(long)]
        dry_run: bool,
    },
    /// Write a default configuration file
    Init {
        /// Write .fencepatch.toml in the project root instead
        #[arg(long)]
        local: bool,
        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Source {
    Actions,
    Webhook,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fencepatch=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Init { local, force } => fencepatch::init::run_init(force, local),
        Command::Extract { input } => {
            let comment = read_input(input.as_deref())?;
            let candidates = extract(&comment);
            println!("{}", serde_json::to_string_pretty(&candidates)?);
            Ok(())
        }
        Command::Apply {
            tree,
            input,
            no_push,
            branch,
            json,
        } => {
            let config = Config::load()?;
            let comment = read_input(input.as_deref())?;
            let candidates = extract(&comment);

            let mut options = ApplyOptions::from_config(&config, branch);
            if no_push {
                options.push = None;
            }

            let result = if candidates.is_empty() {
                None
            } else {
                let applier = PatchApplier::new(options).with_cancellation(cancel_on_ctrl_c());
                Some(applier.apply(&tree, &candidates).await.map_err(apply_error)?)
            };

            let report = Report::new(&candidates, result.as_ref());
            if json {
                println!("{}", serde_json::to_string_pretty(&report.summary())?);
            } else {
                println!("{}", report.render_markdown());
            }
            Ok(())
        }
        Command::Handle {
            event,
            event_name,
            source,
            tree,
            dry_run,
        } => {
            let config = Config::load()?;
            let payload = std::fs::read_to_string(&event)
                .with_context(|| format!("Failed to read event file {}", event.display()))?;

            let source: Box<dyn CommentSource> = match source {
                Source::Actions => Box::new(ActionsSource),
                Source::Webhook => Box::new(WebhookSource),
            };
            let Some(comment) = source.parse(&event_name, &payload)? else {
                tracing::info!(source = source.name(), event = %event_name, "event ignored");
                return Ok(());
            };

            let mut options = ApplyOptions::from_config(&config, None);
            let notifier: Box<dyn NotificationSink> = if dry_run {
                options.push = None;
                Box::new(StdoutSink)
            } else {
                Box::new(GhCommentSink)
            };
            let ctx = HandlerContext {
                tree,
                options,
                bot_name: config.bot.name.clone(),
                notifier,
                rerun: rerun_sink(&config.rerun.workflow),
                cancel: cancel_on_ctrl_c(),
            };

            match handle_comment(&comment, &ctx).await? {
                HandlerOutcome::Ignored => tracing::info!("comment is not a patch comment"),
                HandlerOutcome::NoPatches { .. } => {}
                HandlerOutcome::Processed { result, .. } => {
                    if result.push.is_failed() {
                        tracing::warn!("changes were committed but not pushed");
                    }
                }
            }
            Ok(())
        }
    }
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read comment from stdin")?;
            Ok(buf)
        }
    }
}

/// Token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, finishing the current patch");
            child.cancel();
        }
    });
    token
}

fn apply_error(e: ApplyError) -> anyhow::Error {
    match e {
        ApplyError::GitNotFound => anyhow::anyhow!("{} (install git or fix PATH)", e),
        e => e.into(),
    }
}
