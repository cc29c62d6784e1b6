// RAG module
// Answer generators: paper recommendations and follow-ups over cached chunks

pub mod prompts;


use std::sync::Arc;
use tracing::{debug, error};

use crate::chat::ChatTurn;
use crate::config::RetrievalConfig;
use crate::llm::{ChatMessage, ChatModel};
use crate::retrieval::{CachedChunk, RetrievedPaper, Retriever};

pub const NO_RELEVANT_PAPERS: &str = "No relevant papers found.";
pub const RECOMMEND_ERROR: &str = "Error generating the answer.";
pub const NO_CACHED_CHUNKS: &str = "No cached chunks available to answer your question.";
pub const FOLLOWUP_ERROR: &str = "Error generating the follow-up answer.";

/// Answer text plus the papers it was generated from.
///
/// `papers` is empty exactly when nothing was retrieved, in which case the
/// model was not called.
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub answer: String,
    pub papers: Vec<RetrievedPaper>,
}

impl Recommendation {
    #[inline]
    pub fn found_papers(&self) -> bool {
        !self.papers.is_empty()
    }

    /// Titles in retrieval order
    #[inline]
    pub fn titles(&self) -> Vec<String> {
        self.papers.iter().map(|paper| paper.title.clone()).collect()
    }
}

fn ask(model: &dyn ChatModel, prompt: String) -> crate::Result<String> {
    model.complete(&[
        ChatMessage::system(prompts::SYSTEM_PROMPT),
        ChatMessage::user(prompt),
    ])
}

/// Retrieves similar papers and asks the model to summarise the relevant ones
pub struct RecommendGenerator {
    retriever: Arc<Retriever>,
    model: Arc<dyn ChatModel>,
    top_k: usize,
}

impl RecommendGenerator {
    #[inline]
    pub fn new(retriever: Arc<Retriever>, model: Arc<dyn ChatModel>, top_k: usize) -> Self {
        Self {
            retriever,
            model,
            top_k: top_k.max(1),
        }
    }

    #[inline]
    pub async fn generate(&self, query: &str) -> Recommendation {
        let papers = self
            .retriever
            .retrieve_similar_papers(query, self.top_k)
            .await;
        if papers.is_empty() {
            debug!("No papers retrieved, skipping the model call");
            return Recommendation {
                answer: NO_RELEVANT_PAPERS.to_string(),
                papers,
            };
        }

        let prompt = prompts::render_recommendation_prompt(query, &papers);
        let answer = match ask(self.model.as_ref(), prompt) {
            Ok(answer) => answer.trim().to_string(),
            Err(e) => {
                error!("Recommendation generation failed: {}", e);
                RECOMMEND_ERROR.to_string()
            }
        };

        Recommendation { answer, papers }
    }
}

/// Answers follow-up questions from cached chunks and recent chat turns
pub struct FollowupGenerator {
    model: Arc<dyn ChatModel>,
    history_window: usize,
    max_context_tokens: usize,
    context_char_limit: usize,
}

impl FollowupGenerator {
    #[inline]
    pub fn new(model: Arc<dyn ChatModel>, retrieval: &RetrievalConfig) -> Self {
        Self {
            model,
            history_window: retrieval.history_window,
            max_context_tokens: retrieval.max_context_tokens,
            context_char_limit: retrieval.context_char_limit(),
        }
    }

    #[inline]
    pub fn generate(
        &self,
        query: &str,
        cached_chunks: &[CachedChunk],
        history: &[ChatTurn],
    ) -> String {
        if cached_chunks.is_empty() {
            return NO_CACHED_CHUNKS.to_string();
        }

        let context = prompts::bounded_context(
            cached_chunks,
            self.max_context_tokens,
            self.context_char_limit,
        );
        let titles = prompts::chunk_titles(cached_chunks);
        let recent = prompts::recent_turns(history, self.history_window);
        let prompt = prompts::render_followup_prompt(query, &titles, &context, recent);

        match ask(self.model.as_ref(), prompt) {
            Ok(answer) => answer.trim().to_string(),
            Err(e) => {
                error!("Follow-up generation failed: {}", e);
                FOLLOWUP_ERROR.to_string()
            }
        }
    }
}
