use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Creates `dir` and its parents. Safe when a sibling worker creates it concurrently.
pub(crate) fn ensure_directory(dir: &Path) -> io::Result<()> {
    match fs::create_dir_all(dir) {
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        other => other,
    }
}

/// Lists the immediate subdirectories of `root`, sorted by path.
pub(crate) fn keyword_directories(root: &Path) -> io::Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let mut dirs: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Counts regular files anywhere below `dir`.
pub(crate) fn count_files(dir: &Path) -> usize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Error accessing path in {}: {}", dir.display(), err);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .count()
}

/// Removes characters that are invalid in directory names on common platforms.
///
/// Names made only of dots (`.`, `..`) would resolve to the root or its parent, so every dot
/// becomes `_`.
pub(crate) fn sanitize_directory_name(name: &str) -> String {
    if name.chars().all(|c| c == '.') {
        return "_".repeat(name.chars().count());
    }
    name.chars()
        .map(|c| match c {
            '/' | '\\' | '?' | ':' | '*' | '<' | '>' | '"' | '|' => '_',
            _ => c,
        })
        .collect()
}
