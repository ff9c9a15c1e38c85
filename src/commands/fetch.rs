//! Fetch command handler: open each URL and report its outcome.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use crawl_fetch::{
    AdapterKind, DocumentRequest, FetchConfig, FetchError, Fetcher, ProfileStats, Retrieval,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ProcessExit;
use crate::cli::FetchArgs;

/// Outcome of fetching one URL, as printed by `crawl-fetch fetch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub(crate) enum FetchSummary {
    Ok {
        url: String,
        length: u64,
        last_modified: DateTime<Utc>,
    },
    Moved {
        url: String,
        target: String,
    },
    Failed {
        url: String,
        kind: &'static str,
        reason: String,
    },
}

impl FetchSummary {
    /// Summarizes `error`; a redirect found after opening still reads as moved.
    fn from_error(url: String, error: &FetchError) -> Self {
        if let Some(target) = error.redirect_target() {
            return Self::Moved {
                url,
                target: target.to_string(),
            };
        }
        Self::Failed {
            url,
            kind: error.failure_kind().as_str(),
            reason: error.to_string(),
        }
    }

    fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Renders the text form of one summary line.
pub(crate) fn render_text(summary: &FetchSummary) -> String {
    match summary {
        FetchSummary::Ok {
            url,
            length,
            last_modified,
        } => format!(
            "{url}: ok, {length} bytes, last modified {}",
            last_modified.to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
        FetchSummary::Moved { url, target } => format!("{url}: moved -> {target}"),
        FetchSummary::Failed { url, kind, reason } => format!("{url}: failed ({kind}): {reason}"),
    }
}

pub async fn run_fetch_command(args: &FetchArgs, mut config: FetchConfig) -> Result<ProcessExit> {
    if let Some(separator) = args.folder_separator {
        config.folder_separator = separator;
    }
    let stats = Arc::new(ProfileStats::new());
    let fetcher = Fetcher::new(config)
        .context("Failed to set up document fetcher")?
        .with_sink(stats.clone());

    let mut completed = 0usize;
    let mut failed = 0usize;
    for url in &args.urls {
        let summary = summarize(&fetcher, build_request(args, url)).await;
        if summary.is_failure() {
            failed += 1;
        } else {
            completed += 1;
        }
        let line = if args.json {
            serde_json::to_string(&summary).context("Failed to encode fetch summary")?
        } else {
            render_text(&summary)
        };
        println!("{line}");
    }

    let remaining = fetcher.disposal().purge_deferred();
    if remaining > 0 {
        warn!(remaining, "temporary files could not be deleted");
    }
    if args.stats {
        print_stats(&stats);
    }
    info!(completed, failed, "Fetch complete");
    Ok(crate::determine_exit_outcome(completed, failed))
}

fn build_request(args: &FetchArgs, url: &str) -> DocumentRequest {
    let mut request = DocumentRequest::new(url);
    if let Some(credentials) = &args.credentials {
        request = request.with_credentials(credentials.clone());
    }
    if let Some(secs) = args.timeout {
        request = request.with_http_timeout(Duration::from_secs(secs));
    }
    request
}

async fn summarize(fetcher: &Fetcher, request: DocumentRequest) -> FetchSummary {
    let url = request.url().to_string();
    match fetcher.open(request).await {
        Ok(Retrieval::Ready(mut document)) => {
            let summary = match document.length().await {
                Ok(length) => FetchSummary::Ok {
                    url,
                    length,
                    last_modified: document.last_modified(),
                },
                Err(e) => FetchSummary::from_error(url, &e),
            };
            document.dispose();
            summary
        }
        Ok(Retrieval::Redirect { to, .. }) => {
            debug!(to = %to, "redirect reported");
            FetchSummary::Moved { url, target: to }
        }
        Err(e) => FetchSummary::from_error(url, &e),
    }
}

fn print_stats(stats: &ProfileStats) {
    for kind in AdapterKind::ALL {
        let summary = stats.summary(kind);
        if summary.started == 0 {
            continue;
        }
        eprintln!(
            "{}: started={} completed={} aborted={} bytes={} elapsed_ms={}",
            kind.as_str(),
            summary.started,
            summary.completed,
            summary.aborted,
            summary.bytes,
            summary.elapsed_ms
        );
    }
}
