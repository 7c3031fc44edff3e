//! Dialogue orchestrator: classifies each turn once and dispatches it.
//!
//! Turn kinds, in strict priority order:
//! direct link, greeting, follow-up, search, free chat.

use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock, RwLock};

use chrono::Local;
use regex::Regex;
use tracing::{debug, info, warn};

use hearth_core::catalog::{FullTextIndex, PropertyCatalog};
use hearth_core::config::{ChatConfig, HearthConfig};
use hearth_core::types::{Listing, ListingId};

use crate::composer::{
    listing_not_found_text, no_results_text, render_with_timeout, ResponseComposer,
    StructuredContext, NO_AVAILABILITY_TEXT,
};
use crate::context::{mentions_position, ContextResolver, Resolution};
use crate::error::ChatError;
use crate::extractor::{CriteriaExtractor, Extraction, Vocabulary};
use crate::gate::{GateDecision, QualificationGate};
use crate::normalize::normalize;
use crate::retrieval::{RetrievalOutcome, TieredRetriever};
use crate::session::{SessionState, SessionTable};
use crate::types::{Criteria, RetrievalTier, Role, SessionId, TurnKind, TurnReply};

// =============================================================================
// Turn classification
// =============================================================================

/// Questions about something already on the table.
static FOLLOW_UP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:documents?|documentos?|docs|paperwork|papelada|fiador|guarantor|visit|visita|visitar|schedule|agendar|tour|conhecer|address|endereco|where\s+is|onde\s+fica|location|localizacao|thanks|thank\s+you|obrigad[oa]|valeu|it|its|that\s+one|this\s+one|ele|ela|dele|dela|nele|nela|parking|garage|garagem|vagas?|pets?|dogs?|cats?|animals?|animais|cachorros?|gatos?|cost|costs|total|price|rent|condo|fees?|iptu|condominio|tax|how\s+much|quanto|valor|preco|bathrooms?|banheiros?|size|tamanho|details|detalhes|tell\s+me\s+more|mais\s+sobre)\b",
    )
    .unwrap()
});

/// "the house", "esse apartamento", "that one".
static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:the|this|that|o|esse|essa|este|esta|aquele|aquela|desse|dessa|nesse|nessa)\s+(?:one|house|apartment|studio|loft|penthouse|kitnet|flat|place|listing|casa|apartamento|apto|cobertura|estudio|imovel|lugar)\b",
    )
    .unwrap()
});

/// Explicit requests to start looking again.
static NEW_SEARCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:new\s+search|start\s+over|search\s+again|something\s+else|(?:other|more|different)\s+options|show\s+me\s+(?:other|more|different)|looking\s+for|want\s+to\s+rent|nova\s+busca|recomecar|comecar\s+de\s+novo|outras?\s+opco?es|outros\s+imoveis|outro\s+imovel|procuro|procurando|quero\s+alugar|gostaria\s+de\s+alugar)\b",
    )
    .unwrap()
});

fn has_follow_up_cue(normalized: &str) -> bool {
    FOLLOW_UP_RE.is_match(normalized)
        || REFERENCE_RE.is_match(normalized)
        || mentions_position(normalized)
}

/// Classify one turn. Pure: depends only on the utterance, what was
/// extracted from it, and the session as it was before the turn.
pub fn classify_turn(utterance: &str, extraction: &Extraction, state: &SessionState) -> TurnKind {
    if let Some(id) = extraction.direct_link() {
        return TurnKind::DirectLink(id);
    }

    let text = normalize(utterance);
    let criteria = &extraction.criteria;
    let searchable =
        !criteria.is_empty() || !criteria.neighborhood.is_unset() || extraction.browse_all;

    if state.turn_count == 0
        && !searchable
        && !extraction.search_intent
        && !extraction.other_options
    {
        return TurnKind::Greeting;
    }

    // Keywords, pet words and property types are part of how follow-ups
    // are phrased, so only neighborhood, price and rooms mark a new search.
    let new_structured = !criteria.neighborhood.is_unset()
        || criteria.price_ceiling.is_value()
        || criteria.min_rooms.is_value();

    if state.has_memory()
        && has_follow_up_cue(&text)
        && !NEW_SEARCH_RE.is_match(&text)
        && !extraction.browse_all
        && !extraction.other_options
        && !new_structured
    {
        return TurnKind::FollowUp;
    }

    if searchable || extraction.search_intent || extraction.other_options {
        return TurnKind::Search {
            browse_all: extraction.browse_all,
        };
    }

    TurnKind::FreeChat
}

// =============================================================================
// ChatOrchestrator
// =============================================================================

struct TurnOutput {
    text: String,
    tier: Option<RetrievalTier>,
    listing_ids: Vec<ListingId>,
}

impl TurnOutput {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tier: None,
            listing_ids: Vec::new(),
        }
    }
}

/// Central coordinator wiring extraction, session state, gate, retrieval,
/// resolution and composition.
pub struct ChatOrchestrator {
    catalog: Arc<dyn PropertyCatalog>,
    extractor: CriteriaExtractor,
    gate: QualificationGate,
    retriever: Arc<TieredRetriever>,
    resolver: ContextResolver,
    composer: Arc<dyn ResponseComposer>,
    sessions: SessionTable,
    vocabulary: RwLock<Arc<Vocabulary>>,
    config: ChatConfig,
}

impl ChatOrchestrator {
    /// Build an orchestrator and load the neighborhood vocabulary.
    ///
    /// Without a full-text index, keyword criteria are dropped and
    /// retrieval uses structured filters only.
    pub fn new(
        config: &HearthConfig,
        catalog: Arc<dyn PropertyCatalog>,
        index: Option<Arc<dyn FullTextIndex>>,
        composer: Arc<dyn ResponseComposer>,
    ) -> Self {
        let vocabulary = match catalog.list_distinct_neighborhoods() {
            Ok(names) => Vocabulary::new(names),
            Err(e) => {
                warn!(error = %e, "Could not load neighborhoods, starting with an empty vocabulary");
                Vocabulary::default()
            }
        };
        info!(neighborhoods = vocabulary.len(), "Chat orchestrator ready");

        Self {
            retriever: Arc::new(TieredRetriever::new(
                Arc::clone(&catalog),
                index,
                config.search.top_k,
                config.search.full_text_limit,
            )),
            catalog,
            extractor: CriteriaExtractor::new(&config.search),
            gate: QualificationGate,
            resolver: ContextResolver,
            composer,
            sessions: SessionTable::new(config.search.top_k, config.chat.session_timeout_minutes),
            vocabulary: RwLock::new(Arc::new(vocabulary)),
            config: config.chat.clone(),
        }
    }

    /// Handle one utterance for one session.
    ///
    /// Only input validation fails; every accepted turn gets a reply.
    pub async fn handle_turn(
        &self,
        session_id: &SessionId,
        utterance: &str,
    ) -> Result<TurnReply, ChatError> {
        if !self.config.enabled {
            return Err(ChatError::Disabled);
        }
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if utterance.len() > self.config.max_message_length {
            return Err(ChatError::MessageTooLong(self.config.max_message_length));
        }

        let handle = self.sessions.get_or_create(session_id);
        let mut state = handle.lock().await;

        let vocabulary = self.vocabulary();
        let extraction = self.extractor.extract(utterance, &vocabulary);
        let kind = classify_turn(utterance, &extraction, &state);
        debug!(session_id = %session_id, kind = kind.label(), "Turn classified");

        state.record_message(Role::User, utterance, self.config.context_turns);

        let output = match kind {
            TurnKind::DirectLink(id) => self.direct_link(&mut state, id, utterance).await,
            TurnKind::Greeting => {
                let context = StructuredContext::Greeting {
                    neighborhoods: vocabulary.names().map(str::to_string).collect(),
                };
                TurnOutput::text(self.render(&state, &context).await)
            }
            TurnKind::FollowUp => self.follow_up(&mut state, utterance).await,
            TurnKind::Search { browse_all } => {
                self.search(&mut state, extraction, browse_all, &vocabulary)
                    .await
            }
            TurnKind::FreeChat => {
                let context = StructuredContext::FreeChat {
                    utterance: utterance.to_string(),
                    focused: state.focused.clone(),
                };
                TurnOutput::text(self.render(&state, &context).await)
            }
        };

        state.record_message(Role::Assistant, &output.text, self.config.context_turns);
        state.touch();

        info!(
            session_id = %session_id,
            kind = kind.label(),
            tier = ?output.tier,
            results = output.listing_ids.len(),
            "Turn handled"
        );

        Ok(TurnReply {
            session_id: session_id.clone(),
            text: output.text,
            kind,
            tier: output.tier,
            listing_ids: output.listing_ids,
        })
    }

    // -- Session APIs --

    /// Discard a session. Returns whether it existed.
    pub fn end_session(&self, session_id: &SessionId) -> bool {
        self.sessions.remove(session_id)
    }

    /// Accumulated criteria of a session.
    pub async fn session_criteria(&self, session_id: &SessionId) -> Option<Criteria> {
        let handle = self.sessions.get(session_id)?;
        let state = handle.lock().await;
        Some(state.criteria.clone())
    }

    /// Full copy of a session's state.
    pub async fn session_snapshot(&self, session_id: &SessionId) -> Option<SessionState> {
        let handle = self.sessions.get(session_id)?;
        let state = handle.lock().await;
        Some(state.clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop sessions idle longer than the configured timeout.
    pub fn purge_expired(&self) -> usize {
        let purged = self.sessions.purge_expired(Local::now().timestamp());
        if purged > 0 {
            info!(purged, "Expired chat sessions removed");
        }
        purged
    }

    /// Reload neighborhood names from the catalog.
    pub fn refresh_vocabulary(&self) -> Result<usize, ChatError> {
        let vocabulary = Vocabulary::new(self.catalog.list_distinct_neighborhoods()?);
        let count = vocabulary.len();
        *self.vocabulary.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(vocabulary);
        debug!(neighborhoods = count, "Vocabulary refreshed");
        Ok(count)
    }

    /// Neighborhood names currently recognized.
    pub fn neighborhoods(&self) -> Vec<String> {
        self.vocabulary().names().map(str::to_string).collect()
    }

    // -- Turn handlers --

    async fn direct_link(
        &self,
        state: &mut SessionState,
        id: ListingId,
        utterance: &str,
    ) -> TurnOutput {
        match self.fetch_listing(id).await {
            Ok(Some(listing)) => {
                state.last_shown.replace_with([listing.clone()]);
                state.focus(listing.clone());
                let context = StructuredContext::ListingDetail {
                    listing,
                    question: utterance.to_string(),
                };
                TurnOutput {
                    text: self.render(state, &context).await,
                    tier: Some(RetrievalTier::Exact),
                    listing_ids: vec![id],
                }
            }
            Ok(None) => TurnOutput {
                text: listing_not_found_text(id),
                tier: Some(RetrievalTier::Exact),
                listing_ids: Vec::new(),
            },
            Err(e) => {
                warn!(error = %e, listing_id = %id, "Direct listing lookup failed");
                TurnOutput::text(NO_AVAILABILITY_TEXT)
            }
        }
    }

    async fn follow_up(&self, state: &mut SessionState, utterance: &str) -> TurnOutput {
        let resolution = self
            .resolver
            .resolve(utterance, &state.last_shown, state.focused.as_ref());

        let (context, listing_ids) = match resolution {
            Resolution::Resolved(listing) => {
                state.focus(listing.clone());
                let ids = vec![listing.id];
                (
                    StructuredContext::ListingDetail {
                        listing,
                        question: utterance.to_string(),
                    },
                    ids,
                )
            }
            Resolution::Ambiguous(candidates) => {
                let ids = candidates.iter().map(|l| l.id).collect();
                (StructuredContext::Ambiguous { candidates }, ids)
            }
            Resolution::Unresolved => (
                StructuredContext::NeedsReference {
                    remembered: state.last_shown.iter().cloned().collect(),
                    question: utterance.to_string(),
                },
                Vec::new(),
            ),
        };

        TurnOutput {
            text: self.render(state, &context).await,
            tier: None,
            listing_ids,
        }
    }

    async fn search(
        &self,
        state: &mut SessionState,
        extraction: Extraction,
        browse_all: bool,
        vocabulary: &Vocabulary,
    ) -> TurnOutput {
        let new_terms = extraction.criteria.carries_search_terms();
        let exclude = if extraction.other_options {
            state.exclusions_for_other_options()
        } else if new_terms {
            BTreeSet::new()
        } else {
            state.excluded.clone()
        };
        state.criteria.merge(extraction.criteria);

        match self.gate.decide(&state.criteria, browse_all) {
            GateDecision::Clarify(reason) => {
                if new_terms {
                    state.reset_memory_on_new_search();
                }
                let context = StructuredContext::Clarify {
                    reason,
                    criteria: state.criteria.clone(),
                };
                TurnOutput::text(self.render(state, &context).await)
            }
            GateDecision::Search | GateDecision::BrowseAll => {
                let retrieved = self
                    .retrieve(state.criteria.clone(), browse_all, exclude.iter().copied().collect())
                    .await;
                // Memory and exclusions only change once the catalog answered.
                let outcome = match retrieved {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(error = %e, "Catalog unavailable");
                        return TurnOutput::text(NO_AVAILABILITY_TEXT);
                    }
                };
                state.excluded = exclude;
                state.remember_results(outcome.listings.clone());

                if outcome.is_empty() {
                    return TurnOutput {
                        text: no_results_text(&self.suggestions(vocabulary, &state.criteria)),
                        tier: Some(outcome.tier),
                        listing_ids: Vec::new(),
                    };
                }
                let tier = outcome.tier;
                let listing_ids = outcome.ids();
                let context = StructuredContext::results(outcome);
                TurnOutput {
                    text: self.render(state, &context).await,
                    tier: Some(tier),
                    listing_ids,
                }
            }
        }
    }

    // -- Catalog access --

    /// The catalog is synchronous SQLite, so lookups run on the blocking pool.
    async fn retrieve(
        &self,
        criteria: Criteria,
        browse_all: bool,
        exclude: Vec<ListingId>,
    ) -> Result<RetrievalOutcome, ChatError> {
        let retriever = Arc::clone(&self.retriever);
        tokio::task::spawn_blocking(move || retriever.retrieve(&criteria, browse_all, &exclude))
            .await
            .map_err(|e| ChatError::Catalog(format!("Retrieval task panicked: {}", e)))?
    }

    async fn fetch_listing(&self, id: ListingId) -> Result<Option<Listing>, ChatError> {
        let retriever = Arc::clone(&self.retriever);
        tokio::task::spawn_blocking(move || retriever.fetch_by_id(id))
            .await
            .map_err(|e| ChatError::Catalog(format!("Lookup task panicked: {}", e)))?
    }

    // -- Private helpers --

    async fn render(&self, state: &SessionState, context: &StructuredContext) -> String {
        render_with_timeout(
            self.composer.as_ref(),
            &state.history,
            context,
            self.config.composer_timeout_ms,
        )
        .await
    }

    fn vocabulary(&self) -> Arc<Vocabulary> {
        Arc::clone(&self.vocabulary.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Known neighborhoods other than the one that came up empty.
    fn suggestions(&self, vocabulary: &Vocabulary, criteria: &Criteria) -> Vec<String> {
        let requested = criteria.neighborhood.value().map(|n| normalize(n));
        vocabulary
            .names()
            .filter(|name| requested.as_deref() != Some(normalize(name).as_str()))
            .take(self.config.neighborhood_suggestions)
            .map(str::to_string)
            .collect()
    }
}
