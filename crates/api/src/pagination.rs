use crate::error::Result;
use crate::model::{Issue, RawIssue};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use tracing::debug;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// One page of search results.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub issues: Vec<Issue>,
    pub start_at: u32,
    pub max_results: u32,
    pub total: Option<u32>,
    pub is_last: Option<bool>,
}

impl SearchPage {
    pub fn has_next(&self) -> bool {
        if self.issues.is_empty() {
            return false;
        }

        if let Some(is_last) = self.is_last {
            return !is_last;
        }

        match self.total {
            Some(total) => self.next_offset() < total,
            None => self.issues.len() as u32 >= self.max_results,
        }
    }

    pub fn next_start(&self) -> Option<u32> {
        self.has_next().then(|| self.next_offset())
    }

    fn next_offset(&self) -> u32 {
        self.start_at.saturating_add(self.issues.len() as u32)
    }
}

#[derive(Deserialize)]
pub(crate) struct RawSearchPage {
    #[serde(default)]
    issues: Vec<RawIssue>,
    #[serde(rename = "startAt", default)]
    start_at: u32,
    #[serde(rename = "maxResults", default)]
    max_results: u32,
    #[serde(default)]
    total: Option<u32>,
    #[serde(rename = "isLast", default)]
    is_last: Option<bool>,
}

impl From<RawSearchPage> for SearchPage {
    fn from(raw: RawSearchPage) -> Self {
        SearchPage {
            issues: raw.issues.into_iter().map(Issue::from).collect(),
            start_at: raw.start_at,
            max_results: raw.max_results,
            total: raw.total,
            is_last: raw.is_last,
        }
    }
}

/// Drain a page stream into one list, stopping early once `limit` items
/// have been collected.
pub async fn collect_pages<S>(pages: S, limit: Option<usize>) -> Result<Vec<Issue>>
where
    S: Stream<Item = Result<Vec<Issue>>>,
{
    futures::pin_mut!(pages);
    let mut all_items = Vec::new();

    while let Some(result) = pages.next().await {
        all_items.extend(result?);

        if let Some(limit) = limit {
            if all_items.len() >= limit {
                all_items.truncate(limit);
                break;
            }
        }
    }

    debug!(total_items = all_items.len(), "Finished pagination");
    Ok(all_items)
}
