use std::fmt;

/// Resolution mode used when querying a search engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Fidelity {
    /// Thumbnails as they appear on the results page.
    Thumbnail,
    /// Original images linked from the results page (slow).
    Full,
}

/// Identifies which site to query and at which resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum SearchEngine {
    Google,
    GoogleFull,
    Bing,
    BingFull,
}

impl SearchEngine {
    /// Every selector, in code order.
    pub(crate) const ALL: [SearchEngine; 4] = [
        SearchEngine::Google,
        SearchEngine::GoogleFull,
        SearchEngine::Bing,
        SearchEngine::BingFull,
    ];

    /// Looks up a selector from its numeric code (1 to 4).
    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(SearchEngine::Google),
            2 => Some(SearchEngine::GoogleFull),
            3 => Some(SearchEngine::Bing),
            4 => Some(SearchEngine::BingFull),
            _ => None,
        }
    }

    /// Numeric code of this selector.
    pub(crate) fn code(self) -> u8 {
        match self {
            SearchEngine::Google => 1,
            SearchEngine::GoogleFull => 2,
            SearchEngine::Bing => 3,
            SearchEngine::BingFull => 4,
        }
    }

    /// Picks the Google selector for the given fidelity.
    pub(crate) fn google(fidelity: Fidelity) -> Self {
        match fidelity {
            Fidelity::Thumbnail => SearchEngine::Google,
            Fidelity::Full => SearchEngine::GoogleFull,
        }
    }

    /// Picks the Bing selector for the given fidelity.
    pub(crate) fn bing(fidelity: Fidelity) -> Self {
        match fidelity {
            Fidelity::Thumbnail => SearchEngine::Bing,
            Fidelity::Full => SearchEngine::BingFull,
        }
    }

    /// Site name, used as the stored file prefix.
    pub(crate) fn name(self) -> &'static str {
        match self {
            SearchEngine::Google | SearchEngine::GoogleFull => "google",
            SearchEngine::Bing | SearchEngine::BingFull => "bing",
        }
    }

    pub(crate) fn fidelity(self) -> Fidelity {
        match self {
            SearchEngine::Google | SearchEngine::Bing => Fidelity::Thumbnail,
            SearchEngine::GoogleFull | SearchEngine::BingFull => Fidelity::Full,
        }
    }

    /// Query string appended to the search URL to restrict results to faces.
    pub(crate) fn face_suffix(self) -> &'static str {
        match self {
            SearchEngine::Google | SearchEngine::GoogleFull => "&tbs=itp:face",
            SearchEngine::Bing | SearchEngine::BingFull => "&qft=+filterui:face-face",
        }
    }
}

impl fmt::Display for SearchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fidelity() {
            Fidelity::Thumbnail => write!(f, "{}", self.name()),
            Fidelity::Full => write!(f, "{} (full)", self.name()),
        }
    }
}
