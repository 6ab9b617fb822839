use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

pub mod analyzer;
pub mod attachment;
pub mod backend;
pub mod config_file;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod response;
pub mod text;
pub mod tokens;

// Re-export for convenience
pub use analyzer::{AnalyzerSettings, PaperAnalyzer};
pub use attachment::{pdf_candidates, resolve_attachment_path};
pub use backend::{BackendError, PdfBackend};
pub use config_file::{AnalyzerConfig, ConfigError, ConfigManager};
pub use llm::{ChatMessage, ChatRequest, CompletionBackend, LlmError, OpenAiClient};
pub use pipeline::{ItemFilter, run_batch};
pub use tokens::TokenBudget;

/// Placeholder used when an item has no title field.
pub const UNTITLED: &str = "Untitled";

/// Placeholder used when an item has no creator of type `author`.
pub const UNKNOWN_AUTHORS: &str = "Unknown authors";

/// Placeholder used when an item belongs to no collection.
pub const UNFILED: &str = "Unfiled";

/// A creator (author, editor, ...) attached to a library item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creator {
    pub first_name: String,
    pub last_name: String,
    /// Zotero creator type name, e.g. "author" or "editor".
    pub creator_type: String,
}

impl Creator {
    /// "First Last", trimmed. Single-field creators only carry a last name.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

/// A child attachment of a library item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// The attachment item's own key (names its `storage/` subdirectory).
    pub key: String,
    pub title: String,
    /// Either `storage:<file>` or an absolute path for linked files.
    pub path: Option<String>,
    pub content_type: Option<String>,
}

impl Attachment {
    pub fn is_pdf(&self) -> bool {
        self.content_type.as_deref() == Some("application/pdf")
    }
}

/// A regular (non-note, non-attachment) item read from the library.
#[derive(Debug, Clone, Default)]
pub struct LibraryItem {
    pub item_id: i64,
    pub key: String,
    pub type_name: String,
    pub date_added: String,
    pub date_modified: String,
    /// Field name -> value, e.g. "title", "abstractNote", "DOI".
    pub fields: BTreeMap<String, String>,
    pub creators: Vec<Creator>,
    pub tags: Vec<String>,
    pub attachments: Vec<Attachment>,
    pub notes: Vec<String>,
    /// Full collection paths ("Parent / Child") this item is filed under.
    pub collection_paths: Vec<String>,
}

impl LibraryItem {
    pub fn title(&self) -> &str {
        self.fields
            .get("title")
            .map(|t| t.as_str())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(UNTITLED)
    }

    pub fn abstract_note(&self) -> &str {
        self.fields
            .get("abstractNote")
            .map(|a| a.as_str())
            .unwrap_or("")
    }

    /// Names of creators of type `author`, joined with "; ".
    pub fn formatted_authors(&self) -> String {
        let names: Vec<String> = self
            .creators
            .iter()
            .filter(|c| c.creator_type == "author")
            .map(Creator::display_name)
            .filter(|n| !n.is_empty())
            .collect();
        if names.is_empty() {
            UNKNOWN_AUTHORS.to_string()
        } else {
            names.join("; ")
        }
    }

    pub fn formatted_collections(&self) -> String {
        if self.collection_paths.is_empty() {
            UNFILED.to_string()
        } else {
            self.collection_paths.join(" | ")
        }
    }
}

/// Lifecycle of a single item's analysis.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AnalysisStatus {
    #[default]
    Pending,
    Success,
    Failed {
        error: String,
    },
}

impl AnalysisStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisStatus::Success)
    }

    pub fn error_message(&self) -> &str {
        match self {
            AnalysisStatus::Failed { error } => error,
            _ => "",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Success => "success",
            AnalysisStatus::Failed { .. } => "failed",
        }
    }
}

/// The analysis of one library item.
#[derive(Debug, Clone, Default)]
pub struct PaperAnalysis {
    pub title: String,
    /// Empty unless the title was translated into the output language.
    pub translated_title: String,
    pub authors: String,
    pub collection_path: String,
    pub abstract_text: String,
    pub innovation_points: String,
    pub summary: String,
    pub verdict: String,
    pub status: AnalysisStatus,
}

impl PaperAnalysis {
    /// Number of authors in the formatted author list; 0 when unknown.
    pub fn author_count(&self) -> usize {
        if self.authors.is_empty() || self.authors == UNKNOWN_AUTHORS {
            0
        } else {
            self.authors.split(';').count()
        }
    }
}

/// Summary statistics for a complete batch run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Error category (text before the first ':') -> count.
    pub error_types: BTreeMap<String, usize>,
    /// Author-count bucket label -> count.
    pub author_buckets: BTreeMap<String, usize>,
}

impl AnalysisStats {
    pub fn from_analyses(analyses: &[PaperAnalysis]) -> Self {
        let mut stats = AnalysisStats {
            total: analyses.len(),
            ..Default::default()
        };
        for a in analyses {
            if a.status.is_success() {
                stats.succeeded += 1;
            } else {
                stats.failed += 1;
                let msg = a.status.error_message();
                let category = msg.split(':').next().unwrap_or(msg).trim().to_string();
                *stats.error_types.entry(category).or_insert(0) += 1;
            }
            let bucket = author_bucket(a.author_count());
            *stats.author_buckets.entry(bucket.to_string()).or_insert(0) += 1;
        }
        stats
    }

    /// Success rate in percent, 0.0 for an empty run.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64 * 100.0
        }
    }
}

/// Bucket label for an author count.
pub fn author_bucket(count: usize) -> &'static str {
    match count {
        0 => "unknown",
        1 => "1",
        2..=3 => "2-3",
        4..=5 => "4-5",
        6..=10 => "6-10",
        _ => "10+",
    }
}

/// Progress events emitted during a batch run.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Started {
        total: usize,
    },
    Analyzing {
        index: usize,
        total: usize,
        title: String,
    },
    Finished {
        index: usize,
        total: usize,
        analysis: Box<PaperAnalysis>,
        elapsed: Duration,
    },
    Interrupted {
        completed: usize,
        total: usize,
    },
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("PDF error: {0}")]
    Pdf(#[from] BackendError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Response(#[from] response::ParseError),
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creator(first: &str, last: &str, kind: &str) -> Creator {
        Creator {
            first_name: first.into(),
            last_name: last.into(),
            creator_type: kind.into(),
        }
    }

    fn analysis(authors: &str, status: AnalysisStatus) -> PaperAnalysis {
        PaperAnalysis {
            title: "T".into(),
            authors: authors.into(),
            status,
            ..Default::default()
        }
    }

    #[test]
    fn formatted_authors_skips_editors() {
        let item = LibraryItem {
            creators: vec![
                creator("Ada", "Lovelace", "author"),
                creator("Some", "Editor", "editor"),
                creator("", "Babbage", "author"),
            ],
            ..Default::default()
        };
        assert_eq!(item.formatted_authors(), "Ada Lovelace; Babbage");
    }

    #[test]
    fn formatted_authors_placeholder() {
        let item = LibraryItem::default();
        assert_eq!(item.formatted_authors(), UNKNOWN_AUTHORS);
    }

    #[test]
    fn title_falls_back_when_blank() {
        let mut item = LibraryItem::default();
        assert_eq!(item.title(), UNTITLED);
        item.fields.insert("title".into(), "   ".into());
        assert_eq!(item.title(), UNTITLED);
        item.fields.insert("title".into(), "Deep Learning".into());
        assert_eq!(item.title(), "Deep Learning");
    }

    #[test]
    fn collections_joined_or_unfiled() {
        let mut item = LibraryItem::default();
        assert_eq!(item.formatted_collections(), UNFILED);
        item.collection_paths = vec!["A / B".into(), "C".into()];
        assert_eq!(item.formatted_collections(), "A / B | C");
    }

    #[test]
    fn author_count_handles_placeholder() {
        assert_eq!(analysis(UNKNOWN_AUTHORS, AnalysisStatus::Success).author_count(), 0);
        assert_eq!(analysis("A; B; C", AnalysisStatus::Success).author_count(), 3);
    }

    #[test]
    fn author_buckets() {
        assert_eq!(author_bucket(0), "unknown");
        assert_eq!(author_bucket(1), "1");
        assert_eq!(author_bucket(3), "2-3");
        assert_eq!(author_bucket(5), "4-5");
        assert_eq!(author_bucket(10), "6-10");
        assert_eq!(author_bucket(11), "10+");
    }

    #[test]
    fn stats_group_error_types() {
        let analyses = vec![
            analysis("A", AnalysisStatus::Success),
            analysis(
                "A; B",
                AnalysisStatus::Failed {
                    error: "API error (500): boom".into(),
                },
            ),
            analysis(
                UNKNOWN_AUTHORS,
                AnalysisStatus::Failed {
                    error: "missing text content".into(),
                },
            ),
        ];
        let stats = AnalysisStats::from_analyses(&analyses);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.error_types.get("API error (500)"), Some(&1));
        assert_eq!(stats.error_types.get("missing text content"), Some(&1));
        assert_eq!(stats.author_buckets.get("unknown"), Some(&1));
        assert_eq!(stats.author_buckets.get("2-3"), Some(&1));
        assert!((stats.success_rate() - 33.333).abs() < 0.01);
    }

    #[test]
    fn empty_stats_rate_is_zero() {
        assert_eq!(AnalysisStats::from_analyses(&[]).success_rate(), 0.0);
    }
}
