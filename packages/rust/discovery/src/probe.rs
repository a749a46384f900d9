//! Direct probing of well-known loyalty paths.

use futures::stream::{self, StreamExt};
use tracing::{debug, info};

use loyaltyscout_fetcher::{FetchScheduler, FetchStatus};

use crate::normalize::{CanonicalUrl, UrlNormalizer};

/// Probe each configured path and keep those answering 2xx, in path order.
///
/// Every probe passes the scheduler's rate gate. One failing probe never
/// affects another.
pub async fn probe_paths(
    scheduler: &FetchScheduler,
    normalizer: &UrlNormalizer,
    paths: &[String],
    concurrency: usize,
) -> Vec<CanonicalUrl> {
    let targets: Vec<CanonicalUrl> = paths
        .iter()
        .filter_map(|path| match normalizer.normalize(path) {
            Ok(url) => Some(url),
            Err(e) => {
                debug!(%path, error = %e, "skipping probe path");
                None
            }
        })
        .collect();

    let results: Vec<(CanonicalUrl, FetchStatus)> = stream::iter(targets)
        .map(|url| async move {
            let status = scheduler.probe(url.as_str()).await;
            (url, status)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut seen = std::collections::HashSet::new();
    let found: Vec<CanonicalUrl> = results
        .into_iter()
        .filter_map(|(url, status)| {
            if status.is_ok() {
                Some(url)
            } else {
                debug!(%url, status = %status.describe(), "probe miss");
                None
            }
        })
        .filter(|url| seen.insert(url.clone()))
        .collect();

    info!(probed = paths.len(), found = found.len(), "path probing complete");
    found
}
