use std::collections::BTreeSet;
use std::fs::{read_to_string, write};
use std::path::Path;

use anyhow::{Context, Result};

/// Example written when the keyword file does not exist yet.
pub(crate) const KEYWORDS_EXAMPLE: &str = "cat\ndog\n";

/// Reads the keyword list, then rewrites the file sorted and deduplicated.
///
/// A leading UTF-8 BOM and `\r` line endings are tolerated, empty lines dropped.
pub(crate) fn read_keywords(path: &Path) -> Result<Vec<String>> {
    let text = read_to_string(path)
        .with_context(|| format!("Failed to read keyword file {}", path.display()))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

    let keywords: Vec<String> = text
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    info!("{} keywords obtained: {:?}", keywords.len(), keywords);

    let rewritten: String = keywords.iter().map(|keyword| format!("{keyword}\n")).collect();
    write(path, rewritten)
        .with_context(|| format!("Failed to rewrite keyword file {}", path.display()))?;

    Ok(keywords)
}
