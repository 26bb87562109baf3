//! Keyword image crawler.
//!
//! Keywords are expanded into (keyword, engine) tasks, the tasks run on a fixed-size pool,
//! and once the pool has drained the resulting directories are audited for imbalance.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::crawler::auditor::{AuditReport, DirectoryFileCount, ImbalanceAuditor};
use crate::crawler::collector::CollectorFactory;
use crate::crawler::fetcher::ItemFetcher;
use crate::crawler::io::Config;
use crate::crawler::io::keywords::read_keywords;
use crate::crawler::scheduler::TaskScheduler;

pub(crate) mod auditor;
pub(crate) mod collector;
pub(crate) mod engine;
pub(crate) mod fetcher;
pub(crate) mod io;
pub(crate) mod scheduler;
pub(crate) mod validator;
pub(crate) mod worker;

/// Errors raised inside the download pipeline.
#[derive(Error, Debug)]
pub(crate) enum CrawlError {
    #[error("link collector failed to initialize: {0}")]
    CollectorInit(String),

    #[error("link collection failed: {0}")]
    Collect(String),

    #[error("request error: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("base64 decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Drives one full run: keywords, tasks, pool, audit.
pub(crate) struct Crawler {
    config: Config,
    cancel: Arc<AtomicBool>,
    show_progress: bool,
}

impl Crawler {
    pub(crate) fn new(config: Config) -> Self {
        Self {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
            show_progress: false,
        }
    }

    /// Shows the task progress bar; leave it off when the terminal logs at debug level.
    pub(crate) fn with_progress(mut self, visible: bool) -> Self {
        self.show_progress = visible;
        self
    }

    /// Flag checked by workers before each item; setting it stops the run early.
    pub(crate) fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Downloads every scheduled task, waits for the pool, then audits the results.
    pub(crate) fn perform_crawling<F>(&self, factory: &dyn CollectorFactory, confirm: F) -> Result<AuditReport>
    where
        F: FnMut(&[DirectoryFileCount]) -> bool,
    {
        let keywords = read_keywords(&self.config.keywords_file)?;

        let scheduler = TaskScheduler::new(&self.config).with_progress(self.show_progress);
        let tasks = scheduler
            .schedule(&keywords)
            .context("Failed to prepare download directory")?;
        let fetcher = ItemFetcher::new(self.config.fetch_timeout(), &self.config.user_agent)
            .context("Failed to build HTTP client")?;

        let drained = scheduler
            .run(tasks, factory, &fetcher, &self.cancel)
            .context("Failed to run download tasks")?;
        debug!("Run summary: {:?}", drained.summary());

        let report = ImbalanceAuditor::new(&self.config.download_directory)
            .audit(&drained, confirm)
            .context("Failed to audit download directory")?;

        info!("End Program");
        Ok(report)
    }
}
