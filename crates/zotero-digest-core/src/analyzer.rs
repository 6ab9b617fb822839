//! Per-item analysis: PDF text, optional title translation, and the model
//! call with its retry policy.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::attachment::pdf_candidates;
use crate::backend::{BackendError, PdfBackend};
use crate::llm::{ChatRequest, CompletionBackend};
use crate::prompt::{TextSource, analysis_messages, translation_messages};
use crate::response::{AnalysisFields, ParseError, parse_analysis};
use crate::text::{is_english_title, join_pages, prefix_chars};
use crate::tokens::TokenBudget;
use crate::{AnalysisStatus, CoreError, LibraryItem, PaperAnalysis};

pub const NO_ABSTRACT: &str = "No abstract";
pub const MISSING_TEXT: &str = "missing text content";

const ANALYSIS_TEMPERATURE: f32 = 0.3;
const ANALYSIS_MAX_TOKENS: u32 = 2000;
const TRANSLATION_TEMPERATURE: f32 = 0.1;
const TRANSLATION_MAX_TOKENS: u32 = 200;

/// Tunables for [`PaperAnalyzer`].
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub model: String,
    /// Output language for generated text, e.g. "Chinese" or "English".
    pub language: String,
    /// Maximum number of PDF pages read per attachment.
    pub max_pages: usize,
    /// Token budget for the text embedded in the analysis prompt.
    pub max_tokens: usize,
    pub translate_titles: bool,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".into(),
            language: "Chinese".into(),
            max_pages: 50,
            max_tokens: 8000,
            translate_titles: true,
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

pub struct PaperAnalyzer {
    llm: Arc<dyn CompletionBackend>,
    pdf: Arc<dyn PdfBackend>,
    budget: TokenBudget,
    settings: AnalyzerSettings,
}

impl PaperAnalyzer {
    pub fn new(
        llm: Arc<dyn CompletionBackend>,
        pdf: Arc<dyn PdfBackend>,
        settings: AnalyzerSettings,
    ) -> Result<Self, CoreError> {
        tracing::info!(
            model = %settings.model,
            language = %settings.language,
            max_pages = settings.max_pages,
            max_tokens = settings.max_tokens,
            backend = llm.name(),
            "initialized analyzer"
        );
        Ok(Self {
            llm,
            pdf,
            budget: TokenBudget::new()?,
            settings,
        })
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    /// Extract and clean the text of the first `max_pages` pages of a PDF.
    pub async fn extract_pdf_text(&self, path: &Path) -> Result<String, BackendError> {
        let pdf = Arc::clone(&self.pdf);
        let owned: PathBuf = path.to_path_buf();
        let max_pages = self.settings.max_pages;
        let pages = tokio::task::spawn_blocking(move || pdf.extract_pages(&owned, max_pages))
            .await
            .map_err(|e| BackendError::ExtractionError(e.to_string()))??;
        Ok(join_pages(&pages))
    }

    /// Full text of the first PDF attachment that yields any text.
    pub async fn full_text(&self, item: &LibraryItem, data_dir: Option<&Path>) -> String {
        for path in pdf_candidates(item, data_dir) {
            match self.extract_pdf_text(&path).await {
                Ok(text) if !text.is_empty() => {
                    tracing::info!(path = %path.display(), chars = text.len(), "extracted PDF text");
                    return text;
                }
                Ok(_) => {
                    tracing::warn!(path = %path.display(), "PDF produced no text");
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "PDF extraction failed");
                }
            }
        }
        String::new()
    }

    /// Translate an English title into the output language. Returns an
    /// empty string when translation is disabled, not applicable, or fails.
    pub async fn translate_title(&self, title: &str) -> String {
        if !self.settings.translate_titles
            || self.settings.language.eq_ignore_ascii_case("english")
            || !is_english_title(title)
        {
            return String::new();
        }

        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages: translation_messages(title, &self.settings.language),
            temperature: TRANSLATION_TEMPERATURE,
            max_tokens: TRANSLATION_MAX_TOKENS,
        };
        match self.llm.complete(&request).await {
            Ok(translated) => {
                tracing::debug!(title, translated = %translated, "translated title");
                translated
            }
            Err(e) => {
                tracing::error!(title, error = %e, "title translation failed");
                String::new()
            }
        }
    }

    /// Analyze one library item. Never fails: problems are recorded in the
    /// returned analysis' status.
    pub async fn analyze_item(&self, item: &LibraryItem, data_dir: Option<&Path>) -> PaperAnalysis {
        let title = item.title().to_string();
        let authors = item.formatted_authors();
        let original_abstract = item.abstract_note().trim().to_string();

        tracing::info!(title = %title, key = %item.key, "analyzing item");

        let mut analysis = PaperAnalysis {
            title: title.clone(),
            authors: authors.clone(),
            collection_path: item.formatted_collections(),
            ..Default::default()
        };

        let full_text = self.full_text(item, data_dir).await;
        let (text, source) = if !full_text.is_empty() {
            (full_text, TextSource::FullText)
        } else if !original_abstract.is_empty() {
            (original_abstract.clone(), TextSource::AbstractOnly)
        } else {
            tracing::warn!(title = %title, "no text content available");
            analysis.abstract_text = NO_ABSTRACT.to_string();
            analysis.innovation_points = format!("Not analyzed: {}", MISSING_TEXT);
            analysis.summary = format!("Not analyzed: {}", MISSING_TEXT);
            analysis.status = AnalysisStatus::Failed {
                error: MISSING_TEXT.to_string(),
            };
            return analysis;
        };
        analysis.translated_title = self.translate_title(&title).await;

        match self.call_analysis(&title, &authors, &text, source).await {
            Ok(fields) => {
                analysis.abstract_text = if fields.abstract_text.is_empty() {
                    fallback_abstract(&original_abstract)
                } else {
                    fields.abstract_text
                };
                analysis.innovation_points = fields.innovation_points;
                analysis.summary = fields.summary;
                analysis.verdict = fields.verdict;
                analysis.status = AnalysisStatus::Success;
            }
            Err(e) => {
                tracing::error!(title = %title, error = %e, "analysis failed");
                let message = e.to_string();
                analysis.abstract_text = fallback_abstract(&original_abstract);
                analysis.innovation_points = format!("Analysis failed: {}", message);
                analysis.summary = format!("Analysis failed: {}", message);
                analysis.status = AnalysisStatus::Failed { error: message };
            }
        }
        analysis
    }

    /// Send the analysis prompt, retrying transport errors and unusable
    /// replies up to `max_retries` attempts.
    async fn call_analysis(
        &self,
        title: &str,
        authors: &str,
        text: &str,
        source: TextSource,
    ) -> Result<AnalysisFields, CoreError> {
        let truncated = self.budget.truncate(text, self.settings.max_tokens);
        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages: analysis_messages(title, authors, &truncated, source, &self.settings.language),
            temperature: ANALYSIS_TEMPERATURE,
            max_tokens: ANALYSIS_MAX_TOKENS,
        };

        let attempts = self.settings.max_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            tracing::debug!(attempt, attempts, "calling model for analysis");
            let error: CoreError = match self.llm.complete(&request).await {
                Ok(content) => match parse_analysis(&content) {
                    Ok(fields) => return Ok(fields),
                    Err(ParseError::InvalidJson(msg)) => {
                        tracing::warn!(attempt, error = %msg, "model reply is not valid JSON");
                        if attempt >= attempts {
                            return Ok(unparsed_fallback(&truncated, &content));
                        }
                        // Malformed JSON is retried without waiting.
                        continue;
                    }
                    Err(e) => e.into(),
                },
                Err(e) => e.into(),
            };

            tracing::warn!(attempt, attempts, error = %error, "analysis attempt failed");
            if attempt >= attempts {
                return Err(error);
            }
            if !self.settings.retry_delay.is_zero() {
                tokio::time::sleep(self.settings.retry_delay).await;
            }
        }
    }
}

fn fallback_abstract(original: &str) -> String {
    if original.is_empty() {
        NO_ABSTRACT.to_string()
    } else {
        original.to_string()
    }
}

/// Analysis assembled from a reply that never parsed as JSON: the first
/// 300 characters of the source text stand in for the abstract.
fn unparsed_fallback(text: &str, raw_reply: &str) -> AnalysisFields {
    let raw = prefix_chars(raw_reply, 200);
    AnalysisFields {
        abstract_text: prefix_chars(text, 300).to_string(),
        innovation_points: format!("Unparsed model reply: {}", raw),
        summary: format!("Unparsed model reply: {}", raw),
        verdict: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_uses_prefixes() {
        let text = "x".repeat(1000);
        let reply = "y".repeat(500);
        let f = unparsed_fallback(&text, &reply);
        assert_eq!(f.abstract_text.len(), 300);
        assert_eq!(f.innovation_points, format!("Unparsed model reply: {}", "y".repeat(200)));
    }

    #[test]
    fn fallback_abstract_placeholder() {
        assert_eq!(fallback_abstract(""), NO_ABSTRACT);
        assert_eq!(fallback_abstract("An abstract."), "An abstract.");
    }

    #[test]
    fn default_settings_match_cli_defaults() {
        let s = AnalyzerSettings::default();
        assert_eq!(s.max_pages, 50);
        assert_eq!(s.max_tokens, 8000);
        assert_eq!(s.max_retries, 3);
    }
}
