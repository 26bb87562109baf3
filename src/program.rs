use std::env::current_dir;
use std::fs::write;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::{Context, Error};
use clap::{ArgAction, Parser};
use clap::builder::BoolishValueParser;
use console::Term;
use dialoguer::Confirm;

use crate::crawler::Crawler;
use crate::crawler::auditor::{AuditReport, DirectoryFileCount};
use crate::crawler::collector::HttpCollectorFactory;
use crate::crawler::io::keywords::KEYWORDS_EXAMPLE;
use crate::crawler::io::{CONFIG_NAME, Config};

/// The name of the cargo package.
const NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the cargo package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Command line options. Every option left out falls back to the config file.
#[derive(Debug, Parser)]
#[command(name = "image_crawler", version)]
#[command(about = "Bulk-download images for a keyword list from Google and Bing")]
pub(crate) struct Cli {
    /// Path of the config file
    #[arg(long, default_value = CONFIG_NAME)]
    pub(crate) config: PathBuf,

    /// Keyword list, one keyword per line
    #[arg(long)]
    pub(crate) keywords: Option<PathBuf>,

    /// Directory receiving one sub-directory per keyword
    #[arg(long)]
    pub(crate) download_dir: Option<PathBuf>,

    /// Skips keywords already downloaded
    #[arg(long, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub(crate) skip: Option<bool>,

    /// Number of download workers
    #[arg(long)]
    pub(crate) threads: Option<usize>,

    /// Download from google.com
    #[arg(long, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub(crate) google: Option<bool>,

    /// Download from bing.com
    #[arg(long, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub(crate) bing: Option<bool>,

    /// Download full resolution images instead of thumbnails (slow)
    #[arg(long, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub(crate) full: Option<bool>,

    /// Restrict results to faces
    #[arg(long, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub(crate) face: Option<bool>,

    /// Per-request timeout in seconds, 0 waits forever
    #[arg(long)]
    pub(crate) timeout: Option<u64>,

    /// Answer the imbalance prompt without asking (true removes flagged directories)
    #[arg(long, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub(crate) prune: Option<bool>,

    /// Print debug output to the terminal
    #[arg(long, default_value_t = false)]
    pub(crate) verbose: bool,
}

impl Cli {
    /// Overlays the options given on the command line onto the loaded config.
    pub(crate) fn apply(&self, config: &mut Config) {
        if let Some(keywords) = &self.keywords {
            config.keywords_file = keywords.clone();
        }
        if let Some(download_dir) = &self.download_dir {
            config.download_directory = download_dir.clone();
        }
        if let Some(skip) = self.skip {
            config.skip_existing = skip;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(google) = self.google {
            config.google = google;
        }
        if let Some(bing) = self.bing {
            config.bing = bing;
        }
        if let Some(full) = self.full {
            config.full_resolution = full;
        }
        if let Some(face) = self.face {
            config.face = face;
        }
        if let Some(timeout) = self.timeout {
            config.fetch_timeout_secs = timeout;
        }
    }
}

/// Handles the flow of a crawl from the operator's point of view.
pub(crate) struct Program {
    cli: Cli,
}

impl Program {
    pub(crate) fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Runs the crawler program.
    pub(crate) fn run(&self) -> Result<(), Error> {
        Term::stdout().set_title("image crawler");
        trace!("Starting image crawler...");
        trace!("Program Name: {}", NAME);
        trace!("Program Version: {}", VERSION);
        let working_dir = current_dir().context("Failed to get working directory")?;
        trace!("Program Working Directory: {}", working_dir.display());

        let mut config = Config::load_or_create(&self.cli.config)
            .with_context(|| format!("Failed to load {}", self.cli.config.display()))?;
        self.cli.apply(&mut config);
        info!(
            "Options - skip:{}, threads:{}, google:{}, bing:{}, high_resolution:{}, face:{}",
            config.skip_existing,
            config.threads,
            config.google,
            config.bing,
            config.full_resolution,
            config.face
        );

        if !config.keywords_file.exists() {
            info!("Keyword file does not exist, creating {}...", config.keywords_file.display());
            write(&config.keywords_file, KEYWORDS_EXAMPLE)?;
            info!("Edit the keyword file to list what you want to download, then run again.");
            return Ok(());
        }

        let crawler = Crawler::new(config.clone()).with_progress(!self.cli.verbose);
        let cancel = crawler.cancel_flag();
        if let Err(e) = ctrlc::set_handler(move || {
            warn!("Interrupt received, finishing current items...");
            cancel.store(true, Ordering::Relaxed);
        }) {
            warn!("Failed to install interrupt handler: {}", e);
        }

        let factory = HttpCollectorFactory::new(config.fetch_timeout(), config.user_agent.clone());
        let prune = self.cli.prune;
        let report = crawler.perform_crawling(&factory, |flagged| confirm_removal(flagged, prune))?;

        if let AuditReport::Imbalanced { removed, .. } = &report {
            if !removed.is_empty() {
                info!("Removed {} directories; run again to download them.", removed.len());
            }
        }
        Ok(())
    }
}

/// Asks whether the flagged directories should be removed, unless `preset` answers it.
fn confirm_removal(flagged: &[DirectoryFileCount], preset: Option<bool>) -> bool {
    if let Some(answer) = preset {
        info!("Imbalance prompt answered from the command line: {}", answer);
        return answer;
    }

    Confirm::new()
        .with_prompt(format!("Remove the {} directories above?", flagged.len()))
        .default(false)
        .interact()
        .unwrap_or_else(|err| {
            warn!("Failed to get user input: {}", err);
            false
        })
}
