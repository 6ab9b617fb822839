//! Item filtering and the sequential batch loop.

use std::path::Path;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::analyzer::PaperAnalyzer;
use crate::{LibraryItem, PaperAnalysis, ProgressEvent};

/// Which items of the library are analyzed.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    /// Zotero item type names to keep (e.g. "journalArticle"); empty keeps all.
    pub include_types: Vec<String>,
    /// Items whose title contains any of these (case-insensitive) are dropped.
    pub exclude_keywords: Vec<String>,
    /// Keep at most this many items; `None` or `Some(0)` means no limit.
    pub limit: Option<usize>,
}

impl ItemFilter {
    /// Apply type whitelist, keyword exclusion, then the limit, in that order.
    pub fn apply(&self, mut items: Vec<LibraryItem>) -> Vec<LibraryItem> {
        if !self.include_types.is_empty() {
            items.retain(|item| self.include_types.iter().any(|t| t == &item.type_name));
            tracing::info!(remaining = items.len(), "filtered by item type");
        }

        if !self.exclude_keywords.is_empty() {
            let keywords: Vec<String> = self
                .exclude_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .filter(|k| !k.is_empty())
                .collect();
            let before = items.len();
            items.retain(|item| {
                let title = item.title().to_lowercase();
                !keywords.iter().any(|k| title.contains(k.as_str()))
            });
            let excluded = before - items.len();
            if excluded > 0 {
                tracing::info!(excluded, remaining = items.len(), "excluded items by keyword");
            }
        }

        if let Some(limit) = self.limit.filter(|l| *l > 0)
            && items.len() > limit
        {
            items.truncate(limit);
            tracing::info!(limit, "limited number of items");
        }

        items
    }
}

/// Analyze `items` one after another, sleeping `delay` between model calls.
///
/// Returns one analysis per attempted item, in input order. Cancelling the
/// token stops the run; analyses finished so far are returned and the item in
/// flight is dropped.
pub async fn run_batch<F>(
    items: &[LibraryItem],
    analyzer: &PaperAnalyzer,
    data_dir: Option<&Path>,
    delay: Duration,
    cancel: &CancellationToken,
    progress: F,
) -> Vec<PaperAnalysis>
where
    F: Fn(ProgressEvent),
{
    let total = items.len();
    let mut analyses = Vec::with_capacity(total);
    progress(ProgressEvent::Started { total });
    tracing::info!(total, "starting batch analysis");

    for (index, item) in items.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }

        progress(ProgressEvent::Analyzing {
            index,
            total,
            title: item.title().to_string(),
        });

        let start = Instant::now();
        let analysis = tokio::select! {
            _ = cancel.cancelled() => break,
            analysis = analyzer.analyze_item(item, data_dir) => analysis,
        };

        analyses.push(analysis.clone());
        progress(ProgressEvent::Finished {
            index,
            total,
            analysis: Box::new(analysis),
            elapsed: start.elapsed(),
        });

        let is_last = index + 1 == total;
        if !is_last && !delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    if analyses.len() < total {
        tracing::warn!(completed = analyses.len(), total, "batch interrupted");
        progress(ProgressEvent::Interrupted {
            completed: analyses.len(),
            total,
        });
    } else {
        tracing::info!(total, "batch analysis complete");
    }

    analyses
}
