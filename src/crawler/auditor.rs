use std::fs;
use std::path::{Path, PathBuf};

use console::style;

use crate::crawler::CrawlError;
use crate::crawler::io::directory::{count_files, keyword_directories};
use crate::crawler::scheduler::DrainedPool;

/// Directories holding fewer files than this share of the batch mean are flagged.
pub(crate) const IMBALANCE_RATIO: f64 = 0.5;

/// File count of one keyword directory, recomputed on every audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DirectoryFileCount {
    pub(crate) path: PathBuf,
    pub(crate) files: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AuditReport {
    /// The download root holds no keyword directories yet.
    NoDirectories,
    Balanced { mean: f64 },
    Imbalanced {
        mean: f64,
        flagged: Vec<DirectoryFileCount>,
        /// Directories actually deleted after confirmation.
        removed: Vec<PathBuf>,
    },
}

/// Arithmetic mean of the counts, `None` when there are none.
pub(crate) fn mean_file_count(counts: &[DirectoryFileCount]) -> Option<f64> {
    if counts.is_empty() {
        return None;
    }
    let total: usize = counts.iter().map(|count| count.files).sum();
    Some(total as f64 / counts.len() as f64)
}

/// Counts strictly below `IMBALANCE_RATIO * mean`.
pub(crate) fn flag_small(counts: &[DirectoryFileCount], mean: f64) -> Vec<DirectoryFileCount> {
    counts
        .iter()
        .filter(|count| (count.files as f64) < mean * IMBALANCE_RATIO)
        .cloned()
        .collect()
}

/// Flags keyword directories that are under-populated relative to the batch.
pub(crate) struct ImbalanceAuditor<'a> {
    download_root: &'a Path,
}

impl<'a> ImbalanceAuditor<'a> {
    pub(crate) fn new(download_root: &'a Path) -> Self {
        Self { download_root }
    }

    pub(crate) fn count_directories(&self) -> Result<Vec<DirectoryFileCount>, CrawlError> {
        Ok(keyword_directories(self.download_root)?
            .into_iter()
            .map(|path| {
                let files = count_files(&path);
                DirectoryFileCount { path, files }
            })
            .collect())
    }

    /// Audits the download root once every worker has joined.
    ///
    /// # Arguments
    ///
    /// * `_drained`: Token returned by the scheduler once its pool is empty.
    /// * `confirm`: Asked once, only when something was flagged. `true` deletes the flagged
    ///   directories.
    pub(crate) fn audit<F>(&self, _drained: &DrainedPool, mut confirm: F) -> Result<AuditReport, CrawlError>
    where
        F: FnMut(&[DirectoryFileCount]) -> bool,
    {
        info!("Data imbalance checking...");

        let counts = self.count_directories()?;
        let Some(mean) = mean_file_count(&counts) else {
            info!("No directories found in {}", self.download_root.display());
            return Ok(AuditReport::NoDirectories);
        };

        for count in &counts {
            info!("directory: {}, file_count: {}", count.path.display(), count.files);
        }
        debug!("Average file count: {:.2}", mean);

        let flagged = flag_small(&counts, mean);
        if flagged.is_empty() {
            info!("Data imbalance not found");
            return Ok(AuditReport::Balanced { mean });
        }

        warn!("Data imbalance found.");
        warn!(
            "Following keywords have file count smaller than {}% of average ({:.2}).",
            IMBALANCE_RATIO * 100.0,
            mean
        );
        warn!("Consider removing these directories and downloading those keywords again.");
        for count in &flagged {
            warn!(
                "directory: {}, file_count: {}",
                style(count.path.display()).color256(39).italic(),
                count.files
            );
        }

        let mut removed = Vec::new();
        if confirm(&flagged) {
            info!("Removing directories with too small file counts...");
            for count in &flagged {
                match fs::remove_dir_all(&count.path) {
                    Ok(()) => {
                        info!("Removed {}", count.path.display());
                        removed.push(count.path.clone());
                    }
                    Err(err) => error!("Failed to remove {}: {}", count.path.display(), err),
                }
            }
            info!("Re-run the crawler to download the removed keywords again.");
        } else {
            info!("Keeping all directories.");
        }

        Ok(AuditReport::Imbalanced { mean, flagged, removed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populate(root: &Path, counts: &[(&str, usize)]) {
        for (name, files) in counts {
            let dir = root.join(name);
            fs::create_dir_all(&dir).unwrap();
            for i in 0..*files {
                fs::write(dir.join(format!("google_{:04}.jpg", i)), b"x").unwrap();
            }
        }
    }

    #[test]
    fn test_mean_and_flagging() {
        let counts: Vec<DirectoryFileCount> = [10, 10, 10, 10, 1]
            .iter()
            .enumerate()
            .map(|(i, files)| DirectoryFileCount { path: PathBuf::from(format!("k{i}")), files: *files })
            .collect();

        let mean = mean_file_count(&counts).unwrap();
        assert!((mean - 8.2).abs() < 1e-9);

        let flagged = flag_small(&counts, mean);
        assert_eq!(flagged, vec![DirectoryFileCount { path: PathBuf::from("k4"), files: 1 }]);
        assert_eq!(mean_file_count(&[]), None);
    }

    #[test]
    fn test_zero_directories_reported() {
        let root = tempfile::tempdir().unwrap();
        let mut asked = false;

        let report = ImbalanceAuditor::new(root.path())
            .audit(&DrainedPool::for_tests(), |_| {
                asked = true;
                true
            })
            .unwrap();

        assert_eq!(report, AuditReport::NoDirectories);
        assert!(!asked);
    }

    #[test]
    fn test_confirmed_removal_deletes_only_flagged() {
        let root = tempfile::tempdir().unwrap();
        populate(root.path(), &[("a", 10), ("b", 10), ("c", 10), ("d", 10), ("e", 1)]);

        let report = ImbalanceAuditor::new(root.path())
            .audit(&DrainedPool::for_tests(), |flagged| {
                assert_eq!(flagged.len(), 1);
                true
            })
            .unwrap();

        match report {
            AuditReport::Imbalanced { flagged, removed, .. } => {
                assert_eq!(flagged[0].path, root.path().join("e"));
                assert_eq!(removed, vec![root.path().join("e")]);
            }
            other => panic!("unexpected report {other:?}"),
        }
        assert!(!root.path().join("e").exists());
        assert!(root.path().join("a").exists());
    }

    #[test]
    fn test_declined_removal_keeps_everything() {
        let root = tempfile::tempdir().unwrap();
        populate(root.path(), &[("a", 10), ("b", 0)]);

        let report = ImbalanceAuditor::new(root.path())
            .audit(&DrainedPool::for_tests(), |_| false)
            .unwrap();

        assert!(matches!(report, AuditReport::Imbalanced { ref removed, .. } if removed.is_empty()));
        assert!(root.path().join("b").exists());
    }

    #[test]
    fn test_balanced_batch_does_not_prompt() {
        let root = tempfile::tempdir().unwrap();
        populate(root.path(), &[("a", 4), ("b", 3)]);

        let report = ImbalanceAuditor::new(root.path())
            .audit(&DrainedPool::for_tests(), |_| panic!("should not prompt"))
            .unwrap();

        assert_eq!(report, AuditReport::Balanced { mean: 3.5 });
    }
}
