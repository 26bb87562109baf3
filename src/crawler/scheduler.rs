use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use rayon::ThreadPoolBuilder;

use crate::crawler::CrawlError;
use crate::crawler::collector::CollectorFactory;
use crate::crawler::engine::SearchEngine;
use crate::crawler::fetcher::ItemFetcher;
use crate::crawler::io::Config;
use crate::crawler::io::directory::{ensure_directory, sanitize_directory_name};
use crate::crawler::worker::{DownloadWorker, TaskReport};

/// One (keyword, engine) unit of work, consumed by exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Task {
    pub(crate) keyword: String,
    pub(crate) engine: SearchEngine,
    /// Extra query string appended to the engine's search URL.
    pub(crate) endpoint_suffix: &'static str,
}

impl Task {
    pub(crate) fn new(keyword: &str, engine: SearchEngine, endpoint_suffix: &'static str) -> Self {
        Self {
            keyword: keyword.to_string(),
            engine,
            endpoint_suffix,
        }
    }

    /// Directory receiving this keyword's files.
    pub(crate) fn directory(&self, download_root: &Path) -> PathBuf {
        keyword_directory(download_root, &self.keyword)
    }
}

pub(crate) fn keyword_directory(download_root: &Path, keyword: &str) -> PathBuf {
    download_root.join(sanitize_directory_name(keyword))
}

/// Totals over every task of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub(crate) tasks: usize,
    pub(crate) abandoned: usize,
    pub(crate) panicked: usize,
    pub(crate) cancelled: usize,
    pub(crate) saved: usize,
    pub(crate) corrected: usize,
    pub(crate) unreadable: usize,
    pub(crate) failed: usize,
}

impl RunSummary {
    fn record(&mut self, report: &TaskReport) {
        self.tasks += 1;
        self.abandoned += usize::from(report.abandoned);
        self.cancelled += usize::from(report.cancelled);
        self.saved += report.saved;
        self.corrected += report.corrected;
        self.unreadable += report.unreadable;
        self.failed += report.failed;
    }
}

/// Proof that every worker of a run has joined. Only [`TaskScheduler::run`] creates it.
#[derive(Debug)]
pub(crate) struct DrainedPool {
    summary: RunSummary,
}

impl DrainedPool {
    pub(crate) fn summary(&self) -> &RunSummary {
        &self.summary
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            summary: RunSummary::default(),
        }
    }
}

/// Task progress bar. Hidden when `visible` is false, which keeps it off a terminal that is
/// already receiving debug log lines.
fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let progress_bar = ProgressBar::with_draw_target(Some(len as u64), ProgressDrawTarget::stderr_with_hz(5));
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    progress_bar.enable_steady_tick(Duration::from_millis(200));
    progress_bar
}

/// Expands keywords into tasks and runs them on a fixed-size pool.
pub(crate) struct TaskScheduler<'a> {
    config: &'a Config,
    show_progress: bool,
}

impl<'a> TaskScheduler<'a> {
    pub(crate) fn new(config: &'a Config) -> Self {
        Self {
            config,
            show_progress: false,
        }
    }

    /// Draws a progress bar while the pool runs.
    pub(crate) fn with_progress(mut self, visible: bool) -> Self {
        self.show_progress = visible;
        self
    }

    /// Builds the task list, creating the download root if needed.
    ///
    /// Keywords whose directory already exists are skipped when `skip_existing` is set; this
    /// only checks existence, not how many files the directory holds. A keyword whose
    /// sanitized directory is already claimed by an earlier keyword is skipped, since both
    /// would write the same file names.
    pub(crate) fn schedule(&self, keywords: &[String]) -> Result<Vec<Task>, CrawlError> {
        let root = &self.config.download_directory;
        ensure_directory(root)?;

        let fidelity = self.config.fidelity();
        let mut engines = Vec::with_capacity(2);
        if self.config.google {
            engines.push(SearchEngine::google(fidelity));
        }
        if self.config.bing {
            engines.push(SearchEngine::bing(fidelity));
        }

        let mut tasks = Vec::with_capacity(keywords.len() * engines.len());
        let mut claimed = HashSet::new();
        for keyword in keywords {
            let directory = keyword_directory(root, keyword);
            if !claimed.insert(directory.clone()) {
                warn!(
                    "Skipping {:?}: it maps to {} like an earlier keyword",
                    keyword,
                    directory.display()
                );
                continue;
            }
            if self.config.skip_existing && directory.exists() {
                info!("Skipping already existing directory {}", directory.display());
                continue;
            }

            for &engine in &engines {
                let suffix = if self.config.face { engine.face_suffix() } else { "" };
                tasks.push(Task::new(keyword, engine, suffix));
            }
        }

        trace!("Scheduled {} tasks for {} keywords", tasks.len(), keywords.len());
        Ok(tasks)
    }

    /// Runs every task and blocks until all of them have finished.
    ///
    /// A failing or panicking task is logged and counted; its siblings keep running.
    pub(crate) fn run(
        &self,
        tasks: Vec<Task>,
        factory: &dyn CollectorFactory,
        fetcher: &ItemFetcher,
        cancel: &AtomicBool,
    ) -> Result<DrainedPool, CrawlError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.worker_count())
            .thread_name(|i| format!("download-worker-{}", i))
            .build()?;

        info!("Running {} tasks on {} workers", tasks.len(), self.config.worker_count());
        let progress_bar = progress_bar(tasks.len(), self.show_progress);

        let summary = Mutex::new(RunSummary::default());
        let worker = DownloadWorker::new(&self.config.download_directory, fetcher, cancel);

        pool.scope(|s| {
            for task in tasks {
                let worker = &worker;
                let summary = &summary;
                let progress_bar = &progress_bar;
                s.spawn(move |_| {
                    let outcome = catch_unwind(AssertUnwindSafe(|| worker.run(&task, factory)));
                    let mut summary = match summary.lock() {
                        Ok(summary) => summary,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    match outcome {
                        Ok(report) => summary.record(&report),
                        Err(_) => {
                            error!("Task {} from {} panicked", task.keyword, task.engine);
                            summary.tasks += 1;
                            summary.panicked += 1;
                        }
                    }
                    progress_bar.set_message(format!("{} ({})", task.keyword, task.engine));
                    progress_bar.inc(1);
                });
            }
        }); // scope joins every spawned task

        progress_bar.finish_with_message("all tasks finished");
        let summary = summary.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        info!(
            "Task completed. Pool Join. {} saved ({} renamed), {} unreadable, {} failed, {} tasks abandoned",
            summary.saved, summary.corrected, summary.unreadable, summary.failed, summary.abandoned
        );
        Ok(DrainedPool { summary })
    }
}
