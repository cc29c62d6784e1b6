// Prompt templates for the recommend and follow-up generators

use itertools::Itertools;

use crate::chat::ChatTurn;
use crate::embeddings::{estimate_token_count, truncate_chars};
use crate::retrieval::{CachedChunk, RetrievedPaper};

pub const SYSTEM_PROMPT: &str = "You are a helpful research assistant.";

/// `Title / Authors / Abstract URL` blocks separated by blank lines
#[inline]
pub fn render_paper_context(papers: &[RetrievedPaper]) -> String {
    papers
        .iter()
        .map(|paper| {
            format!(
                "Title: {}\nAuthors: {}\nAbstract URL: {}",
                paper.title, paper.authors, paper.abstract_url
            )
        })
        .join("\n\n")
}

#[inline]
pub fn render_recommendation_prompt(query: &str, papers: &[RetrievedPaper]) -> String {
    format!(
        "User asked for this question about finding suitable papers:\n\n\
         {query}\n\n\
         I have found these papers:\n\n\
         {context}\n\n\
         Can you help me summarize only the papers that directly address the user's question, \
         excluding any papers that are not related? Please include the abstract URLs for each paper.\n\n\
         The answer is:",
        query = query,
        context = render_paper_context(papers),
    )
}

/// Chunk contents joined by blank lines, cut to `max_chars` characters when the
/// estimated token count exceeds `max_tokens`.
///
/// The count comes from [`estimate_token_count`], a word and punctuation
/// heuristic. It is not a tokenizer encoding, so the budget is approximate
/// for any given chat model.
#[inline]
pub fn bounded_context(chunks: &[CachedChunk], max_tokens: usize, max_chars: usize) -> String {
    let context = chunks.iter().map(|chunk| chunk.content.as_str()).join("\n\n");

    if estimate_token_count(&context) > max_tokens {
        truncate_chars(&context, max_chars).to_string()
    } else {
        context
    }
}

/// The last `window` turns, oldest first
#[inline]
pub fn recent_turns(history: &[ChatTurn], window: usize) -> &[ChatTurn] {
    &history[history.len().saturating_sub(window)..]
}

/// Distinct chunk titles in first-seen order
#[inline]
pub fn chunk_titles(chunks: &[CachedChunk]) -> Vec<&str> {
    chunks.iter().map(|chunk| chunk.title.as_str()).unique().collect()
}

#[inline]
pub fn render_followup_prompt(
    query: &str,
    titles: &[&str],
    context: &str,
    history: &[ChatTurn],
) -> String {
    let conversation = if history.is_empty() {
        "(no earlier questions)".to_string()
    } else {
        history
            .iter()
            .map(|turn| {
                format!(
                    "User: {}\nAssistant: {}",
                    turn.user_query, turn.assistant_answer
                )
            })
            .join("\n\n")
    };
    let paper_list = titles.iter().map(|title| format!("- {}", title)).join("\n");

    format!(
        "Here is the recent conversation with the user:\n\n\
         {conversation}\n\n\
         The user now asks this follow-up question:\n\n\
         {query}\n\n\
         The papers under discussion are:\n\n\
         {paper_list}\n\n\
         Relevant excerpts from those papers:\n\n\
         {context}\n\n\
         Answer the follow-up question using the excerpts above. When the user says \
         \"this paper\" or \"the paper\", they mean the paper discussed most recently in the \
         conversation.\n\n\
         The answer is:",
    )
}
