use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::crawler::CrawlError;
use crate::crawler::collector::CollectorFactory;
use crate::crawler::engine::SearchEngine;
use crate::crawler::fetcher::{DownloadItem, ItemFetcher};
use crate::crawler::io::directory::ensure_directory;
use crate::crawler::scheduler::Task;
use crate::crawler::validator;

/// What happened to a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ItemOutcome {
    /// Stored with the guessed extension.
    Saved(PathBuf),
    /// Stored, then renamed to match its real format.
    Corrected(PathBuf),
    /// Not a supported image; the file was deleted.
    Unreadable,
}

/// Per-task tally, used for the end-of-run summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TaskReport {
    pub(crate) saved: usize,
    pub(crate) corrected: usize,
    pub(crate) unreadable: usize,
    pub(crate) failed: usize,
    /// The collector could not start or could not produce links.
    pub(crate) abandoned: bool,
    /// Stopped early because cancellation was requested.
    pub(crate) cancelled: bool,
}

/// Runs one task start to finish. Shares nothing with sibling workers but the filesystem.
pub(crate) struct DownloadWorker<'a> {
    download_root: &'a Path,
    fetcher: &'a ItemFetcher,
    cancel: &'a AtomicBool,
}

impl<'a> DownloadWorker<'a> {
    pub(crate) fn new(download_root: &'a Path, fetcher: &'a ItemFetcher, cancel: &'a AtomicBool) -> Self {
        Self {
            download_root,
            fetcher,
            cancel,
        }
    }

    /// Collects links for the task and downloads each of them in order.
    ///
    /// Failures are logged here and never escalated: a collector that cannot start abandons
    /// this task only, and a bad item is skipped.
    pub(crate) fn run(&self, task: &Task, factory: &dyn CollectorFactory) -> TaskReport {
        let mut report = TaskReport::default();

        let mut collector = match factory.create() {
            Ok(collector) => collector,
            Err(err) => {
                error!("Unable to initialize link collector for {} from {}: {}", task.keyword, task.engine, err);
                report.abandoned = true;
                return report;
            }
        };

        debug!("Collecting links... {} from {}", task.keyword, task.engine);
        let items = match collector.collect(task.engine, &task.keyword, task.endpoint_suffix) {
            Ok(items) => items,
            Err(err) => {
                error!("Exception {}:{} - {}", task.engine, task.keyword, err);
                report.abandoned = true;
                return report;
            }
        };
        drop(collector);

        let directory = task.directory(self.download_root);
        if let Err(err) = ensure_directory(&directory) {
            error!("Could not create directory {}: {}", directory.display(), err);
            report.abandoned = true;
            return report;
        }

        debug!("Downloading {} images for {} from {}", items.len(), task.keyword, task.engine);
        let total = items.len();
        for (index, item) in items.iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                warn!("Cancelled {} from {} after {} / {}", task.keyword, task.engine, index, total);
                report.cancelled = true;
                break;
            }

            debug!("Downloading {} from {}: {} / {}", task.keyword, task.engine, index + 1, total);
            match self.process_item(&directory, task.engine, index, item) {
                Ok(ItemOutcome::Saved(path)) => {
                    trace!("Saved {}", path.display());
                    report.saved += 1;
                }
                Ok(ItemOutcome::Corrected(_)) => {
                    report.saved += 1;
                    report.corrected += 1;
                }
                Ok(ItemOutcome::Unreadable) => report.unreadable += 1,
                Err(err) => {
                    warn!("Download failed - {}: {}", item.describe(), err);
                    report.failed += 1;
                }
            }
        }

        debug!("Done {} : {}", task.engine, task.keyword);
        report
    }

    /// Fetches, persists and validates one item as `<engine>_<index>.<ext>`.
    pub(crate) fn process_item(
        &self,
        directory: &Path,
        engine: SearchEngine,
        index: usize,
        item: &DownloadItem,
    ) -> Result<ItemOutcome, CrawlError> {
        let stem = directory.join(format!("{}_{:04}", engine.name(), index));
        let guessed = self.fetcher.save(item, &stem)?;
        let path = stem.with_extension(guessed);

        let detected = match validator::validate(&path) {
            Ok(detected) => detected,
            Err(err) => {
                let _ = fs::remove_file(&path);
                return Err(err.into());
            }
        };

        match detected {
            None => {
                fs::remove_file(&path)?;
                warn!("Unreadable file - {}", item.describe());
                Ok(ItemOutcome::Unreadable)
            }
            Some(format) if format.extension() != guessed => {
                let corrected = stem.with_extension(format.extension());
                if let Err(err) = fs::rename(&path, &corrected) {
                    let _ = fs::remove_file(&path);
                    return Err(err.into());
                }
                debug!("Extension renamed {} -> {}", guessed, format.extension());
                Ok(ItemOutcome::Corrected(corrected))
            }
            Some(_) => Ok(ItemOutcome::Saved(path)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;

    use crate::crawler::collector::LinkCollector;
    use crate::crawler::fetcher::InlineMime;
    use crate::crawler::fetcher::tests::{ok_response, serve_once};
    use crate::crawler::validator::tests::{JPG_BYTES, PNG_BYTES};

    /// Hands out canned links, or fails to collect for the listed engines.
    pub(crate) struct StubFactory {
        pub(crate) links: Vec<String>,
        pub(crate) broken_engines: Vec<&'static str>,
        pub(crate) created: Mutex<usize>,
    }

    impl StubFactory {
        pub(crate) fn new(links: Vec<String>) -> Self {
            Self {
                links,
                broken_engines: Vec::new(),
                created: Mutex::new(0),
            }
        }
    }

    struct StubCollector {
        links: Vec<String>,
        broken_engines: Vec<&'static str>,
    }

    impl LinkCollector for StubCollector {
        fn collect(
            &mut self,
            engine: SearchEngine,
            _keyword: &str,
            _endpoint_suffix: &str,
        ) -> Result<Vec<DownloadItem>, CrawlError> {
            if self.broken_engines.contains(&engine.name()) {
                return Err(CrawlError::Collect("results page unavailable".to_string()));
            }
            Ok(self.links.iter().map(|link| DownloadItem::parse(link)).collect())
        }
    }

    impl CollectorFactory for StubFactory {
        fn create(&self) -> Result<Box<dyn LinkCollector>, CrawlError> {
            *self.created.lock().unwrap() += 1;
            Ok(Box::new(StubCollector {
                links: self.links.clone(),
                broken_engines: self.broken_engines.clone(),
            }))
        }
    }

    pub(crate) struct BrokenFactory;

    impl CollectorFactory for BrokenFactory {
        fn create(&self) -> Result<Box<dyn LinkCollector>, CrawlError> {
            Err(CrawlError::CollectorInit("driver unavailable".to_string()))
        }
    }

    pub(crate) fn inline(mime: &str, bytes: &[u8]) -> String {
        format!("data:image/{};base64,{}", mime, BASE64.encode(bytes))
    }

    fn task(keyword: &str, engine: SearchEngine) -> Task {
        Task::new(keyword, engine, "")
    }

    fn fetcher() -> ItemFetcher {
        ItemFetcher::new(Duration::from_secs(5), "test").unwrap()
    }

    #[test]
    fn test_items_are_saved_in_order_with_padded_index() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = fetcher();
        let cancel = AtomicBool::new(false);
        let worker = DownloadWorker::new(root.path(), &fetcher, &cancel);
        let factory = StubFactory::new(vec![inline("png", PNG_BYTES), inline("jpeg", JPG_BYTES)]);

        let report = worker.run(&task("cat", SearchEngine::Google), &factory);

        assert_eq!(report.saved, 2);
        assert!(root.path().join("cat").join("google_0000.png").exists());
        assert!(root.path().join("cat").join("google_0001.jpg").exists());
    }

    #[test]
    fn test_mismatched_declared_type_is_renamed() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = fetcher();
        let cancel = AtomicBool::new(false);
        let worker = DownloadWorker::new(root.path(), &fetcher, &cancel);
        let factory = StubFactory::new(vec![inline("jpeg", PNG_BYTES)]);

        let report = worker.run(&task("cat", SearchEngine::Bing), &factory);

        assert_eq!(report.corrected, 1);
        assert!(!root.path().join("cat").join("bing_0000.jpg").exists());
        assert_eq!(fs::read(root.path().join("cat").join("bing_0000.png")).unwrap(), PNG_BYTES);
    }

    #[test]
    fn test_corrupt_item_is_deleted_and_bad_items_do_not_stop_the_task() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = fetcher();
        let cancel = AtomicBool::new(false);
        let worker = DownloadWorker::new(root.path(), &fetcher, &cancel);
        let factory = StubFactory::new(vec![
            inline("png", b"<html>not an image</html>"),
            "data:image/png;base64,@@@".to_string(),
            "http://127.0.0.1:1/unreachable.jpg".to_string(),
            inline("png", PNG_BYTES),
        ]);

        let report = worker.run(&task("dog", SearchEngine::Google), &factory);

        assert_eq!(report.unreadable, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.saved, 1);
        let dir = root.path().join("dog");
        let names: Vec<String> = fs::read_dir(&dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["google_0003.png".to_string()]);
    }

    #[test]
    fn test_collector_init_failure_abandons_task() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = fetcher();
        let cancel = AtomicBool::new(false);
        let worker = DownloadWorker::new(root.path(), &fetcher, &cancel);

        let report = worker.run(&task("cat", SearchEngine::Google), &BrokenFactory);

        assert!(report.abandoned);
        assert_eq!(report.saved, 0);
        assert!(!root.path().join("cat").exists());
    }

    #[test]
    fn test_cancellation_stops_before_next_item() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = fetcher();
        let cancel = AtomicBool::new(true);
        let worker = DownloadWorker::new(root.path(), &fetcher, &cancel);
        let factory = StubFactory::new(vec![inline("png", PNG_BYTES)]);

        let report = worker.run(&task("cat", SearchEngine::Google), &factory);

        assert!(report.cancelled);
        assert_eq!(report.saved, 0);
    }

    #[test]
    fn test_failed_rename_leaves_no_mislabelled_file() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = fetcher();
        let cancel = AtomicBool::new(false);
        let worker = DownloadWorker::new(root.path(), &fetcher, &cancel);
        fs::create_dir(root.path().join("bing_0000.png")).unwrap();
        fs::write(root.path().join("bing_0000.png").join("occupied"), b"x").unwrap();
        let item = DownloadItem::parse(&inline("jpeg", PNG_BYTES));

        assert!(worker.process_item(root.path(), SearchEngine::Bing, 0, &item).is_err());
        assert!(!root.path().join("bing_0000.jpg").exists());
    }

    #[test]
    fn test_url_body_is_renamed_to_detected_format() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = fetcher();
        let cancel = AtomicBool::new(false);
        let worker = DownloadWorker::new(root.path(), &fetcher, &cancel);
        let base = serve_once(ok_response(PNG_BYTES));
        let item = DownloadItem::Url(format!("{base}/x.JPEG"));

        let outcome = worker.process_item(root.path(), SearchEngine::Google, 0, &item).unwrap();

        assert_eq!(outcome, ItemOutcome::Corrected(root.path().join("google_0000.png")));
        assert_eq!(fs::read(root.path().join("google_0000.png")).unwrap(), PNG_BYTES);
        assert!(!root.path().join("google_0000.jpg").exists());
    }

    #[test]
    fn test_inline_png_validates_as_png() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = fetcher();
        let cancel = AtomicBool::new(false);
        let worker = DownloadWorker::new(root.path(), &fetcher, &cancel);
        let item = DownloadItem::Inline {
            mime: InlineMime::Png,
            payload: BASE64.encode(PNG_BYTES),
        };

        let outcome = worker
            .process_item(root.path(), SearchEngine::BingFull, 12, &item)
            .unwrap();

        assert_eq!(outcome, ItemOutcome::Saved(root.path().join("bing_0012.png")));
    }
}
