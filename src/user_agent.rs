//! User-Agent string sent with every crawl request.

/// Project URL for User-Agent identification (RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/crawl-fetch";

/// Default User-Agent for crawl requests (identifies the tool and its version).
#[must_use]
pub(crate) fn default_crawl_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("crawl-fetch/{version} (search-indexer; +{PROJECT_UA_URL})")
}
