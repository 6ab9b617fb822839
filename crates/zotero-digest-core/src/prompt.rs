//! Prompt construction for title translation and paper analysis.

use crate::llm::ChatMessage;

/// Which text the analysis prompt is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    FullText,
    AbstractOnly,
}

pub fn translation_messages(title: &str, language: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!(
            "You are an expert academic translator. Translate English paper titles into {language}. \
             Keep technical terms accurate, make the wording natural, and reply with the translation only."
        )),
        ChatMessage::user(format!(
            "Translate the following paper title into {language}:\n{title}"
        )),
    ]
}

pub fn analysis_messages(
    title: &str,
    authors: &str,
    text: &str,
    source: TextSource,
    language: &str,
) -> Vec<ChatMessage> {
    let system = format!(
        "You are an expert reviewer of academic papers, skilled at extracting a paper's core content, \
         contributions and value. Answer in {language} and reply with strictly valid JSON."
    );

    let user = match source {
        TextSource::FullText => format!(
            "Analyze the full text of the following paper and return a structured analysis.\n\n\
             Title: {title}\n\
             Authors: {authors}\n\n\
             Full text:\n{text}\n\n\
             Answer in {language} and return a JSON object with these fields:\n\
             1. abstract: a reorganized, polished abstract of the paper (200-300 words)\n\
             2. innovation_points: the main innovations and contributions (3-5 points, 50-100 words each)\n\
             3. summary: an overall summary and assessment (150-250 words)\n\
             4. verdict: a one-sentence recommendation on whether the paper is worth a close read\n\n\
             Field names must be in English; field contents in {language}."
        ),
        TextSource::AbstractOnly => format!(
            "Analyze the abstract of the following paper and return a structured analysis.\n\n\
             Title: {title}\n\
             Authors: {authors}\n\n\
             Abstract:\n{text}\n\n\
             Answer in {language} and return a JSON object with these fields:\n\
             1. abstract: a clearer restatement of the abstract that keeps its meaning\n\
             2. innovation_points: the main innovations inferred from the abstract (2-3 points)\n\
             3. summary: an overall summary and assessment based on the abstract (100-150 words)\n\
             4. verdict: a one-sentence recommendation on whether the paper is worth a close read\n\n\
             Field names must be in English; field contents in {language}."
        ),
    };

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}
