//! ipa-converge CLI
//!
//! Usage:
//!   ipa-converge apply site.yaml            # converge everything in the manifest
//!   ipa-converge apply site.yaml --noop     # report what would change
//!   ipa-converge list ipa_user --manifest site.yaml
//!
//! Connection fields missing from the manifest are read from `IPA_API_URL`,
//! `IPA_API_USERNAME`, `IPA_API_PASSWORD` and `IPA_TLS_VERIFY` (a `.env` file
//! is loaded first). Log verbosity follows `RUST_LOG`.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ipa_converge::{apply_manifest, list_kind, Action, Manifest, ResourceKind};

/// Converge FreeIPA directory objects to a declared state
#[derive(Parser, Debug)]
#[command(name = "ipa-converge")]
#[command(about = "Converge FreeIPA directory objects to a declared state")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply every resource in a manifest, in order
    Apply {
        /// Manifest file
        manifest: PathBuf,

        /// Plan only; issue no writes
        #[arg(long)]
        noop: bool,
    },

    /// Print every instance of one resource type as YAML
    List {
        /// Resource type, e.g. ipa_user or group
        kind: ResourceKind,

        /// Manifest whose connection section is used
        #[arg(long, short = 'm', env = "IPA_MANIFEST")]
        manifest: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ipa_converge=info,ipa_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Args::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    match args.command {
        Command::Apply { manifest, noop } => {
            let manifest = Manifest::load(&manifest)
                .with_context(|| format!("loading {}", manifest.display()))?;
            let report = apply_manifest(&manifest, noop).await?;

            for entity in &report.entities {
                let label = format!("{} '{}'", entity.kind, entity.name);
                match &entity.outcome {
                    Ok(outcome) => {
                        let verb = match (outcome.action, outcome.flushed) {
                            (Action::Unchanged, _) => "unchanged".dimmed(),
                            (Action::Created, true) => "created".green(),
                            (Action::Updated, true) => "updated".yellow(),
                            (Action::Destroyed, true) => "destroyed".red(),
                            (_, false) => "would change".cyan(),
                        };
                        if outcome.changes.is_empty() {
                            println!("{verb:>12} {label}");
                        } else {
                            println!("{verb:>12} {label} ({})", outcome.changes.join(", "));
                        }
                    }
                    Err(e) => println!("{:>12} {label}: {e}", "failed".red().bold()),
                }
            }

            let summary = format!(
                "{} resources, {} changed, {} failed",
                report.entities.len(),
                report.changed(),
                report.failed()
            );
            if report.is_success() {
                println!("{}", summary.green());
                Ok(ExitCode::SUCCESS)
            } else {
                println!("{}", summary.red());
                Ok(ExitCode::FAILURE)
            }
        }
        Command::List { kind, manifest } => {
            let manifest = match manifest {
                Some(path) => Manifest::load(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => Manifest::default(),
            };
            let connection = manifest.connection.resolve()?;
            print!("{}", list_kind(&connection, kind).await?);
            Ok(ExitCode::SUCCESS)
        }
    }
}
