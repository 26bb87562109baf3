use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use image::ImageFormat;

/// Number of header bytes needed to recognize every supported signature.
const HEADER_LEN: usize = 16;

/// Image formats recognized by their binary signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DetectedFormat {
    Jpg,
    Png,
    Gif,
}

impl DetectedFormat {
    /// File extension for this format, `jpeg` normalized to `jpg`.
    pub(crate) fn extension(self) -> &'static str {
        match self {
            DetectedFormat::Jpg => "jpg",
            DetectedFormat::Png => "png",
            DetectedFormat::Gif => "gif",
        }
    }

    /// Classifies a byte header. Formats other than jpg, png and gif count as unreadable.
    pub(crate) fn from_header(header: &[u8]) -> Option<Self> {
        match image::guess_format(header).ok()? {
            ImageFormat::Jpeg => Some(DetectedFormat::Jpg),
            ImageFormat::Png => Some(DetectedFormat::Png),
            ImageFormat::Gif => Some(DetectedFormat::Gif),
            _ => None,
        }
    }
}

/// Inspects the persisted file's signature, ignoring its extension. Never mutates the file.
pub(crate) fn validate(path: &Path) -> io::Result<Option<DetectedFormat>> {
    let file = File::open(path)?;
    let mut header = Vec::with_capacity(HEADER_LEN);
    file.take(HEADER_LEN as u64).read_to_end(&mut header)?;
    Ok(DetectedFormat::from_header(&header))
}
