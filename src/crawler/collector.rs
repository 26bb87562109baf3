use std::collections::HashSet;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use reqwest::blocking::Client;

use crate::crawler::CrawlError;
use crate::crawler::engine::SearchEngine;
use crate::crawler::fetcher::{DownloadItem, build_client};

/// Inline thumbnails embedded in Google result pages.
static GOOGLE_INLINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"data:image/(?:jpeg|png);base64,[A-Za-z0-9+/=]+").expect("valid regex")
});

/// Hosted thumbnails served by Google's image cache.
static GOOGLE_THUMBNAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https://encrypted-tbn\d\.gstatic\.com/images\?q=[^"'\s\\<>]+"#).expect("valid regex")
});

/// Original images are listed as `["url",height,width]` in the page's script data.
static GOOGLE_ORIGINAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\["(https?://[^"]+?)",\d+,\d+\]"#).expect("valid regex")
});

static BING_THUMBNAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:"|&quot;)turl(?:"|&quot;):(?:"|&quot;)(https?://.+?)(?:"|&quot;)"#).expect("valid regex")
});

static BING_ORIGINAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:"|&quot;)murl(?:"|&quot;):(?:"|&quot;)(https?://.+?)(?:"|&quot;)"#).expect("valid regex")
});

/// Produces the ordered links for one (keyword, engine) pair.
pub(crate) trait LinkCollector {
    fn collect(
        &mut self,
        engine: SearchEngine,
        keyword: &str,
        endpoint_suffix: &str,
    ) -> Result<Vec<DownloadItem>, CrawlError>;
}

/// Creates a fresh collector for every task. Failing here abandons the task.
pub(crate) trait CollectorFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn LinkCollector>, CrawlError>;
}

/// Collects links by scraping the static image-search results page.
pub(crate) struct HttpLinkCollector {
    client: Client,
}

impl HttpLinkCollector {
    /// Builds the search URL for the engine, keyword and extra query string.
    pub(crate) fn search_url(
        engine: SearchEngine,
        keyword: &str,
        endpoint_suffix: &str,
    ) -> Result<Url, CrawlError> {
        let base = match engine {
            SearchEngine::Google | SearchEngine::GoogleFull => Url::parse_with_params(
                "https://www.google.com/search",
                &[("q", keyword), ("tbm", "isch")],
            ),
            _ => Url::parse_with_params("https://www.bing.com/images/search", &[("q", keyword)]),
        }
        .map_err(|e| CrawlError::Collect(format!("invalid search URL: {e}")))?;

        if endpoint_suffix.is_empty() {
            return Ok(base);
        }
        Url::parse(&format!("{base}{endpoint_suffix}"))
            .map_err(|e| CrawlError::Collect(format!("invalid endpoint suffix {endpoint_suffix:?}: {e}")))
    }
}

impl LinkCollector for HttpLinkCollector {
    fn collect(
        &mut self,
        engine: SearchEngine,
        keyword: &str,
        endpoint_suffix: &str,
    ) -> Result<Vec<DownloadItem>, CrawlError> {
        let url = Self::search_url(engine, keyword, endpoint_suffix)?;
        trace!("Requesting results page {}", url);
        let page = self
            .client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .map_err(CrawlError::Fetch)?;
        Ok(extract_links(engine, &page))
    }
}

/// Factory for [`HttpLinkCollector`].
pub(crate) struct HttpCollectorFactory {
    timeout: Duration,
    user_agent: String,
}

impl HttpCollectorFactory {
    pub(crate) fn new(timeout: Duration, user_agent: impl Into<String>) -> Self {
        Self {
            timeout,
            user_agent: user_agent.into(),
        }
    }
}

impl CollectorFactory for HttpCollectorFactory {
    fn create(&self) -> Result<Box<dyn LinkCollector>, CrawlError> {
        let client =
            build_client(self.timeout, &self.user_agent).map_err(|e| CrawlError::CollectorInit(e.to_string()))?;
        Ok(Box::new(HttpLinkCollector { client }))
    }
}

/// Pulls image links out of a results page, in page order and without duplicates.
pub(crate) fn extract_links(engine: SearchEngine, page: &str) -> Vec<DownloadItem> {
    let raw: Vec<String> = match engine {
        SearchEngine::Google => {
            let mut found: Vec<(usize, String)> = GOOGLE_INLINE
                .find_iter(page)
                .chain(GOOGLE_THUMBNAIL.find_iter(page))
                .map(|m| (m.start(), m.as_str().to_string()))
                .collect();
            found.sort_by_key(|(position, _)| *position);
            found.into_iter().map(|(_, link)| link).collect()
        }
        SearchEngine::GoogleFull => captures(&GOOGLE_ORIGINAL, page)
            .into_iter()
            .filter(|link| !link.contains("gstatic.com"))
            .collect(),
        SearchEngine::Bing => captures(&BING_THUMBNAIL, page),
        SearchEngine::BingFull => captures(&BING_ORIGINAL, page),
    };

    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|link| unescape(&link))
        .filter(|link| seen.insert(link.clone()))
        .map(|link| DownloadItem::parse(&link))
        .collect()
}

fn captures(regex: &Regex, page: &str) -> Vec<String> {
    regex
        .captures_iter(page)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Undoes the HTML and JavaScript escaping found in result pages.
fn unescape(link: &str) -> String {
    link.replace("\\u003d", "=")
        .replace("\\u0026", "&")
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::fetcher::request_timeout;

    #[test]
    fn test_search_url_with_face_suffix() {
        let url = HttpLinkCollector::search_url(SearchEngine::Google, "red fox", "&tbs=itp:face").unwrap();
        let text = url.as_str();
        assert!(text.starts_with("https://www.google.com/search?"));
        assert!(text.contains("q=red+fox"));
        assert!(text.contains("tbm=isch"));
        assert!(text.ends_with("&tbs=itp:face"));

        let url = HttpLinkCollector::search_url(SearchEngine::BingFull, "owl", "").unwrap();
        assert_eq!(url.as_str(), "https://www.bing.com/images/search?q=owl");
    }

    #[test]
    fn test_google_thumbnails_keep_page_order() {
        let page = r#"<img src="https://encrypted-tbn0.gstatic.com/images?q=tbn:abc&amp;s=1">
            <img src="data:image/jpeg;base64,/9j/4AAQ">
            <img src="data:image/gif;base64,R0lGOD">
            <img src="https://encrypted-tbn0.gstatic.com/images?q=tbn:abc&amp;s=1">"#;

        let links = extract_links(SearchEngine::Google, page);

        assert_eq!(
            links,
            vec![
                DownloadItem::Url("https://encrypted-tbn0.gstatic.com/images?q=tbn:abc&s=1".to_string()),
                DownloadItem::parse("data:image/jpeg;base64,/9j/4AAQ"),
            ]
        );
    }

    #[test]
    fn test_google_full_resolution_links() {
        let page = r#"[0,"x",["https://encrypted-tbn0.gstatic.com/images?q=t",194,259],
            ["https://example.com/fox.JPEG",1200,1600],["https://example.org/b.png?a=1",10,20]]"#;

        let links = extract_links(SearchEngine::GoogleFull, page);

        assert_eq!(
            links,
            vec![
                DownloadItem::Url("https://example.com/fox.JPEG".to_string()),
                DownloadItem::Url("https://example.org/b.png?a=1".to_string()),
            ]
        );
    }

    #[test]
    fn test_bing_metadata_links() {
        let page = r#"<a class="iusc" m="{&quot;murl&quot;:&quot;https://example.com/full.jpg&quot;,&quot;turl&quot;:&quot;https://tse1.mm.bing.net/th?id=OIP.1&amp;pid=15.1&quot;}">"#;

        assert_eq!(
            extract_links(SearchEngine::BingFull, page),
            vec![DownloadItem::Url("https://example.com/full.jpg".to_string())]
        );
        assert_eq!(
            extract_links(SearchEngine::Bing, page),
            vec![DownloadItem::Url("https://tse1.mm.bing.net/th?id=OIP.1&pid=15.1".to_string())]
        );
    }

    #[test]
    fn test_factory_builds_collector() {
        let factory = HttpCollectorFactory::new(Duration::from_secs(5), "test");
        assert!(factory.create().is_ok());
    }

    #[test]
    fn test_zero_timeout_leaves_results_page_unbounded() {
        assert_eq!(request_timeout(Duration::ZERO), None);
        assert_eq!(request_timeout(Duration::from_secs(30)), Some(Duration::from_secs(30)));

        let factory = HttpCollectorFactory::new(Duration::ZERO, "test");
        assert!(factory.create().is_ok());
    }
}
