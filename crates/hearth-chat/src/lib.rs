//! Conversational rental search engine.
//!
//! Turns free-text utterances into structured criteria, accumulates them
//! per session, gates and runs tiered catalog retrieval, and resolves
//! follow-up questions against listings already shown.

pub mod composer;
pub mod context;
pub mod error;
pub mod extractor;
pub mod gate;
pub mod normalize;
pub mod orchestrator;
pub mod retrieval;
pub mod session;
pub mod types;

pub use composer::{ResponseComposer, StructuredContext, TemplateComposer};
pub use context::{ContextResolver, Resolution};
pub use error::ChatError;
pub use extractor::{CriteriaExtractor, Extraction, Vocabulary};
pub use gate::{ClarifyReason, GateDecision, QualificationGate};
pub use normalize::{normalize, LevenshteinRatio, SimilarityScorer};
pub use orchestrator::{classify_turn, ChatOrchestrator};
pub use retrieval::{RetrievalOutcome, TieredRetriever};
pub use session::{RememberedListings, SessionState, SessionTable};
pub use types::{
    ChatMessage, Criteria, RetrievalTier, Role, SessionId, Slot, TurnKind, TurnReply,
};
