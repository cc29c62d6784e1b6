// Chat module
// Per-connection session state and the controller that routes each turn

pub mod repl;


use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::llm::{ChatMessage, Role};
use crate::rag::{FollowupGenerator, RecommendGenerator};
use crate::retrieval::{RetrievedPaper, Retriever};

pub use crate::retrieval::CachedChunk;

pub const NO_SEARCH_YET: &str = "No recommended papers found yet. Please search for papers first.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Recommend,
    FollowUp,
}

impl Mode {
    #[inline]
    pub fn toggled(self) -> Self {
        match self {
            Self::Recommend => Self::FollowUp,
            Self::FollowUp => Self::Recommend,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recommend => write!(f, "Recommend Papers"),
            Self::FollowUp => write!(f, "Follow-up Questions"),
        }
    }
}

/// Whether a recommendation has ever populated the chunk cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoSearchYet,
    HasCachedChunks,
}

/// One completed question and answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub user_query: String,
    pub assistant_answer: String,
}

/// State owned by one conversation and never shared between conversations
#[derive(Debug, Clone, Default)]
pub struct Session {
    mode: Mode,
    messages: Vec<ChatMessage>,
    cached_chunks: Option<Vec<CachedChunk>>,
    chat_history: Vec<ChatTurn>,
}

impl Session {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[inline]
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        if self.cached_chunks.is_some() {
            SessionState::HasCachedChunks
        } else {
            SessionState::NoSearchYet
        }
    }

    /// The running transcript, user and assistant messages interleaved
    #[inline]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[inline]
    pub fn cached_chunks(&self) -> Option<&[CachedChunk]> {
        self.cached_chunks.as_deref()
    }

    #[inline]
    pub fn chat_history(&self) -> &[ChatTurn] {
        &self.chat_history
    }

    /// Cached chunks as pretty-printed JSON, or `None` before any search
    #[inline]
    pub fn cached_chunks_json(&self) -> crate::Result<Option<String>> {
        self.cached_chunks
            .as_ref()
            .map(|chunks| serde_json::to_string_pretty(chunks).map_err(anyhow::Error::from))
            .transpose()
            .map_err(Into::into)
    }

    fn record_exchange(&mut self, input: &str, answer: &str) {
        self.messages.push(ChatMessage {
            role: Role::User,
            content: input.to_string(),
        });
        self.messages.push(ChatMessage {
            role: Role::Assistant,
            content: answer.to_string(),
        });
    }

    fn complete_turn(&mut self, input: &str, answer: &str) {
        self.chat_history.push(ChatTurn {
            user_query: input.to_string(),
            assistant_answer: answer.to_string(),
        });
    }
}

/// What a single turn produced
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Papers were found; the cache now holds `cached_chunks` chunks for them
    Recommended {
        answer: String,
        papers: Vec<RetrievedPaper>,
        cached_chunks: usize,
    },
    /// Nothing matched; the session is unchanged apart from the transcript
    NoPapers { answer: String },
    FollowedUp { answer: String },
    /// A follow-up was asked before any recommendation
    NoSearchYet { answer: String },
}

impl TurnOutcome {
    #[inline]
    pub fn answer(&self) -> &str {
        match self {
            Self::Recommended { answer, .. }
            | Self::NoPapers { answer }
            | Self::FollowedUp { answer }
            | Self::NoSearchYet { answer } => answer,
        }
    }
}

/// Routes each user turn to the recommend or follow-up path
pub struct ConversationController {
    recommender: RecommendGenerator,
    followup: FollowupGenerator,
    retriever: Arc<Retriever>,
}

impl ConversationController {
    #[inline]
    pub fn new(
        recommender: RecommendGenerator,
        followup: FollowupGenerator,
        retriever: Arc<Retriever>,
    ) -> Self {
        Self {
            recommender,
            followup,
            retriever,
        }
    }

    #[inline]
    pub async fn handle_turn(&self, session: &mut Session, input: &str) -> TurnOutcome {
        let outcome = match session.mode {
            Mode::Recommend => self.recommend(session, input).await,
            Mode::FollowUp => self.follow_up(session, input),
        };
        session.record_exchange(input, outcome.answer());
        outcome
    }

    async fn recommend(&self, session: &mut Session, input: &str) -> TurnOutcome {
        let recommendation = self.recommender.generate(input).await;
        if !recommendation.found_papers() {
            return TurnOutcome::NoPapers {
                answer: recommendation.answer,
            };
        }

        let chunks = self
            .retriever
            .retrieve_chunks_by_titles(&recommendation.titles())
            .await;
        info!(
            "Cached {} chunks for {} recommended papers",
            chunks.len(),
            recommendation.papers.len()
        );
        let cached_chunks = chunks.len();
        session.cached_chunks = Some(chunks);
        session.complete_turn(input, &recommendation.answer);

        TurnOutcome::Recommended {
            answer: recommendation.answer,
            papers: recommendation.papers,
            cached_chunks,
        }
    }

    fn follow_up(&self, session: &mut Session, input: &str) -> TurnOutcome {
        let Some(chunks) = session.cached_chunks.as_deref() else {
            debug!("Follow-up before any recommendation");
            return TurnOutcome::NoSearchYet {
                answer: NO_SEARCH_YET.to_string(),
            };
        };

        let answer = self.followup.generate(input, chunks, &session.chat_history);
        session.complete_turn(input, &answer);
        TurnOutcome::FollowedUp { answer }
    }
}
