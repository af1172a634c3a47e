mod api;
mod blocks;
mod config;
mod error;
mod flatten;
mod model;
mod report;
mod rewrite;
mod segment;
mod source;
mod upload;
mod writer;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::api::{Credentials, ScreenStepsClient};
use crate::config::Settings;
use crate::model::{timestamp_now, ManualDocument};
use crate::report::RunStats;
use crate::rewrite::Rewriter;

#[derive(Parser)]
#[command(name = "vlp2ss", about = "Convert VLP lab manual exports to ScreenSteps and upload them")]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    /// TOML settings file layered over the built-in defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a VLP export (.zip or directory) to ScreenSteps JSON
    Convert {
        /// VLP export: a .zip file or a directory containing content.xml
        #[arg(short, long)]
        input: PathBuf,
        /// Output root; the manual is written to <output>/<Manual Name>/
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
        /// Keep the extracted ZIP contents
        #[arg(long)]
        no_cleanup: bool,
        /// Upload to ScreenSteps after converting
        #[arg(long)]
        upload: bool,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Upload an already converted manual directory
    Upload {
        /// Directory holding <manual-id>.json, articles/ and images/
        #[arg(short = 'd', long)]
        dir: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Parse and flatten an export without writing anything
    Stats {
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// ScreenSteps account (subdomain)
    #[arg(long, env = "SS_ACCOUNT")]
    account: Option<String>,
    /// API user name
    #[arg(long, env = "SS_USER")]
    user: Option<String>,
    /// API token
    #[arg(long, env = "SS_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Target site id
    #[arg(long, env = "SS_SITE")]
    site: Option<String>,
    /// Add chapters to this existing manual instead of creating a new one
    #[arg(long)]
    manual_id: Option<u64>,
    /// Suffix appended to the uploaded manual title
    #[arg(long)]
    suffix: Option<String>,
}

impl TargetArgs {
    fn credentials(&self) -> anyhow::Result<(Credentials, String)> {
        let missing: Vec<&str> = [
            ("--account/SS_ACCOUNT", &self.account),
            ("--user/SS_USER", &self.user),
            ("--token/SS_TOKEN", &self.token),
            ("--site/SS_SITE", &self.site),
        ]
        .into_iter()
        .filter(|(_, v)| v.as_deref().map_or(true, |s| s.trim().is_empty()))
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            bail!("Missing upload credentials: {}", missing.join(", "));
        }

        let value = |v: &Option<String>| v.clone().unwrap_or_default();
        Ok((
            Credentials {
                account: value(&self.account),
                user: value(&self.user),
                token: value(&self.token),
            },
            value(&self.site),
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let t0 = Instant::now();
    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    let rewriter = Rewriter::new(&settings.rewrite).context("Invalid rewrite settings")?;

    let result = match cli.command {
        Commands::Convert {
            input,
            output,
            no_cleanup,
            upload,
            target,
        } => {
            // fail before converting rather than after
            let creds = if upload { Some(target.credentials()?) } else { None };

            let source = source::open_input(&input, no_cleanup)?;
            info!("Reading export from {}", source.root().display());
            let manual = source::read_manual(&source.content_xml())?;
            let mut stats = RunStats::default();
            let doc = ManualDocument {
                manual: flatten::flatten(&manual, &rewriter, &timestamp_now(), &mut stats),
            };
            let dir = writer::write_output(&doc, &output, &source.images_dir(), &mut stats)?;
            stats.print();
            println!("Output written to {}", dir.display());

            match creds {
                Some(creds) => run_upload(&mut settings, &target, creds, &doc, &dir).await,
                None => Ok(()),
            }
        }
        Commands::Upload { dir, target } => {
            let creds = target.credentials()?;
            let doc = writer::load_manual(&dir)?;
            run_upload(&mut settings, &target, creds, &doc, &dir).await
        }
        Commands::Stats { input } => {
            let source = source::open_input(&input, false)?;
            let manual = source::read_manual(&source.content_xml())?;
            let mut stats = RunStats::default();
            let flat = flatten::flatten(&manual, &rewriter, &timestamp_now(), &mut stats);

            println!("Manual:   {} ({})", flat.title, flat.id);
            println!("Language: {}", flat.language);
            if !manual.data_format.is_empty() {
                println!("Format:   {}", manual.data_format);
            }
            for chapter in &flat.chapters {
                let steps: usize = chapter.articles.iter().map(|a| a.steps.len()).sum();
                println!(
                    "  {:<48} {:>3} articles {:>4} steps",
                    truncate(&chapter.title, 48),
                    chapter.articles.len(),
                    steps
                );
            }
            stats.print();
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run_upload(
    settings: &mut Settings,
    target: &TargetArgs,
    (creds, site_id): (Credentials, String),
    doc: &ManualDocument,
    content_dir: &Path,
) -> anyhow::Result<()> {
    if let Some(suffix) = &target.suffix {
        settings.upload.title_suffix = suffix.clone();
    }
    println!(
        "Uploading {} to {}.screenstepslive.com (site {})...",
        doc.manual.title, creds.account, site_id
    );
    let client = ScreenStepsClient::new(&settings.api, &creds)?;
    let report = upload::upload_manual(
        &client,
        doc,
        content_dir,
        &site_id,
        target.manual_id,
        &settings.upload,
    )
    .await?;
    report.print();
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max - 3).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
