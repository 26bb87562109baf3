use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::blocking::Client;

use crate::crawler::CrawlError;

/// Declared MIME subtype of an inline image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InlineMime {
    Jpeg,
    Png,
}

impl InlineMime {
    fn extension(self) -> &'static str {
        match self {
            InlineMime::Jpeg => "jpg",
            InlineMime::Png => "png",
        }
    }
}

/// One link produced by a collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DownloadItem {
    /// Remote resource to stream.
    Url(String),
    /// `data:image/...;base64,` payload embedded in the results page.
    Inline { mime: InlineMime, payload: String },
}

impl DownloadItem {
    /// Classifies a raw link. Only jpeg and png data URIs are decoded inline; anything else
    /// is treated as a URL.
    pub(crate) fn parse(link: &str) -> Self {
        const JPEG_PREFIX: &str = "data:image/jpeg;base64";
        const PNG_PREFIX: &str = "data:image/png;base64";

        let mime = if link.starts_with(JPEG_PREFIX) {
            Some(InlineMime::Jpeg)
        } else if link.starts_with(PNG_PREFIX) {
            Some(InlineMime::Png)
        } else {
            None
        };

        match (mime, link.split_once(',')) {
            (Some(mime), Some((_, payload))) => DownloadItem::Inline {
                mime,
                payload: payload.to_string(),
            },
            _ => DownloadItem::Url(link.to_string()),
        }
    }

    /// Short description for log lines; inline payloads are not printed.
    pub(crate) fn describe(&self) -> String {
        match self {
            DownloadItem::Url(url) => url.clone(),
            DownloadItem::Inline { mime, payload } => {
                format!("inline {} ({} base64 chars)", mime.extension(), payload.len())
            }
        }
    }
}

/// Guesses the extension from the text after the last dot of a URL.
pub(crate) fn extension_from_url(url: &str) -> &'static str {
    let extension = url.rsplit('.').next().unwrap_or_default().to_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => "jpg",
        "gif" => "gif",
        "png" => "png",
        _ => "jpg",
    }
}

/// Decodes a base64 payload, tolerating the line breaks some pages insert.
pub(crate) fn decode_inline(payload: &str) -> Result<Vec<u8>, CrawlError> {
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64.decode(compact).map_err(CrawlError::Decode)
}

/// Per-request timeout handed to reqwest. Zero means no limit at all, which must be spelled
/// out because the blocking client otherwise applies its own 30 s default.
pub(crate) fn request_timeout(timeout: Duration) -> Option<Duration> {
    if timeout.is_zero() { None } else { Some(timeout) }
}

/// Blocking client shared by the results-page collector and the item fetcher.
pub(crate) fn build_client(timeout: Duration, user_agent: &str) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(request_timeout(timeout))
        .build()
}

/// Retrieves items and writes their raw bytes to disk.
#[derive(Debug, Clone)]
pub(crate) struct ItemFetcher {
    client: Client,
}

impl ItemFetcher {
    /// Builds the fetcher. A zero timeout leaves network reads unbounded.
    pub(crate) fn new(timeout: Duration, user_agent: &str) -> Result<Self, CrawlError> {
        let client = build_client(timeout, user_agent).map_err(CrawlError::Fetch)?;
        Ok(Self { client })
    }

    /// Writes the item to `<stem>.<guessed extension>` and returns the extension used.
    ///
    /// # Arguments
    ///
    /// * `item`: The item to retrieve.
    /// * `stem`: Destination path without extension.
    pub(crate) fn save(&self, item: &DownloadItem, stem: &Path) -> Result<&'static str, CrawlError> {
        match item {
            DownloadItem::Inline { mime, payload } => {
                let bytes = decode_inline(payload)?;
                let extension = mime.extension();
                std::fs::write(stem.with_extension(extension), bytes)?;
                Ok(extension)
            }
            DownloadItem::Url(url) => {
                let mut response = self
                    .client
                    .get(url)
                    .send()
                    .and_then(|response| response.error_for_status())
                    .map_err(CrawlError::Fetch)?;
                let extension = extension_from_url(url);
                let path = stem.with_extension(extension);
                if let Err(e) = stream_to_file(&mut response, &path) {
                    // Never leave a truncated body behind.
                    let _ = std::fs::remove_file(&path);
                    return Err(e.into());
                }
                Ok(extension)
            }
        }
    }
}

fn stream_to_file(reader: &mut impl Read, path: &Path) -> io::Result<u64> {
    let mut file = File::create(path)?;
    let written = io::copy(reader, &mut file)?;
    file.flush()?;
    Ok(written)
}
