//! Response composition.
//!
//! The engine hands a [`ResponseComposer`] structured facts only. Relaxed
//! result sets always travel with their tier and advisory, so a renderer
//! can never present them as exact matches. [`TemplateComposer`] renders
//! those facts deterministically without requiring an LLM.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use tracing::warn;

use hearth_core::types::{Listing, ListingId, PropertyType};

use crate::error::ChatError;
use crate::gate::ClarifyReason;
use crate::normalize::normalize;
use crate::retrieval::RetrievalOutcome;
use crate::types::{ChatMessage, Criteria, RetrievalTier};

// =============================================================================
// Fixed replies (never routed through a composer)
// =============================================================================

/// Reply when the catalog cannot be reached.
pub const NO_AVAILABILITY_TEXT: &str =
    "Sorry, we have no availability right now. Please try again in a little while.";

/// Reply when the composer fails or times out.
pub const APOLOGY_TEXT: &str =
    "Sorry, I couldn't put an answer together just now. Could you say that again?";

/// Reply for an empty result set, suggesting neighborhoods that do have listings.
pub fn no_results_text(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        "I couldn't find any listings matching that. Try a different neighborhood or a higher budget."
            .to_string()
    } else {
        format!(
            "I couldn't find any listings matching that. We do have options in {}. Would you like to look there?",
            suggestions.join(", ")
        )
    }
}

/// Reply for a direct link to a listing the catalog does not have.
pub fn listing_not_found_text(id: ListingId) -> String {
    format!(
        "I couldn't find listing {}. It may no longer be available. Tell me what you're looking for and I'll search for similar places.",
        id
    )
}

// =============================================================================
// StructuredContext
// =============================================================================

/// Everything a composer may talk about for one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuredContext {
    Greeting {
        neighborhoods: Vec<String>,
    },
    Clarify {
        reason: ClarifyReason,
        criteria: Criteria,
    },
    Results {
        listings: Vec<Listing>,
        tier: RetrievalTier,
        advisory: &'static str,
        keywords_dropped: bool,
    },
    ListingDetail {
        listing: Listing,
        question: String,
    },
    Ambiguous {
        candidates: Vec<Listing>,
    },
    NeedsReference {
        remembered: Vec<Listing>,
        question: String,
    },
    FreeChat {
        utterance: String,
        focused: Option<Listing>,
    },
}

impl StructuredContext {
    /// Results tagged with the advisory of the tier that produced them.
    pub fn results(outcome: RetrievalOutcome) -> Self {
        StructuredContext::Results {
            advisory: outcome.tier.advisory(),
            tier: outcome.tier,
            listings: outcome.listings,
            keywords_dropped: outcome.keywords_dropped,
        }
    }
}

// =============================================================================
// ResponseComposer
// =============================================================================

/// Renders structured facts into reply text.
///
/// Implementations must only paraphrase the facts they are given.
#[async_trait]
pub trait ResponseComposer: Send + Sync {
    async fn render(
        &self,
        history: &[ChatMessage],
        context: &StructuredContext,
    ) -> Result<String, ChatError>;
}

/// Render with a time bound; any failure becomes [`APOLOGY_TEXT`].
pub async fn render_with_timeout(
    composer: &dyn ResponseComposer,
    history: &[ChatMessage],
    context: &StructuredContext,
    timeout_ms: u64,
) -> String {
    let rendered = tokio::time::timeout(
        Duration::from_millis(timeout_ms),
        composer.render(history, context),
    )
    .await
    .map_err(|_| ChatError::ComposerTimeout(timeout_ms))
    .and_then(|result| result);

    match rendered {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            warn!("Composer returned an empty reply");
            APOLOGY_TEXT.to_string()
        }
        Err(e) => {
            warn!(error = %e, "Composer failed, sending apology");
            APOLOGY_TEXT.to_string()
        }
    }
}

// =============================================================================
// TemplateComposer
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Topic {
    Parking,
    Pets,
    Rooms,
    Bathrooms,
    Area,
    Address,
    Cost,
    Visit,
    Documents,
    Thanks,
}

static TOPICS: LazyLock<Vec<(Topic, Regex)>> = LazyLock::new(|| {
    let mk = |p: &str| Regex::new(p).unwrap();
    vec![
        (Topic::Parking, mk(r"\b(?:parking|garage|garagem|vagas?|cars?|carros?)\b")),
        (
            Topic::Pets,
            mk(r"\b(?:pets?|dogs?|cats?|animals?|animais|cachorros?|gatos?|caes|cao)\b"),
        ),
        (Topic::Rooms, mk(r"\b(?:rooms?|bedrooms?|quartos?|dormitorios?)\b")),
        (Topic::Bathrooms, mk(r"\b(?:bathrooms?|banheiros?|wc)\b")),
        (Topic::Area, mk(r"\b(?:area|size|big|tamanho|metros|m2|sqm)\b")),
        (
            Topic::Address,
            mk(r"\b(?:address|where|located|location|endereco|onde|fica|localizacao|street)\b"),
        ),
        (
            Topic::Cost,
            mk(r"\b(?:cost|costs|price|rent|total|condo|fees?|tax|iptu|condominio|valor|preco|aluguel|quanto|how\s+much)\b"),
        ),
        (
            Topic::Visit,
            mk(r"\b(?:visit|visita|visitar|schedule|agendar|tour|conhecer)\b"),
        ),
        (
            Topic::Documents,
            mk(r"\b(?:documents?|documentos?|docs|paperwork|papelada|requirements|requisitos|fiador|guarantor)\b"),
        ),
        (Topic::Thanks, mk(r"\b(?:thanks|thank\s+you|obrigad[oa]|valeu)\b")),
    ]
});

fn topics(question: &str) -> Vec<Topic> {
    let text = normalize(question);
    TOPICS
        .iter()
        .filter(|(_, re)| re.is_match(&text))
        .map(|(topic, _)| *topic)
        .collect()
}

/// Deterministic renderer that only restates the facts it is given.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateComposer;

impl TemplateComposer {
    pub fn compose(&self, context: &StructuredContext) -> String {
        match context {
            StructuredContext::Greeting { neighborhoods } => greeting(neighborhoods),
            StructuredContext::Clarify { reason, criteria } => clarify(*reason, criteria),
            StructuredContext::Results {
                listings,
                tier,
                advisory,
                keywords_dropped,
            } => results(listings, *tier, advisory, *keywords_dropped),
            StructuredContext::ListingDetail { listing, question } => detail(listing, question),
            StructuredContext::Ambiguous { candidates } => {
                let mut lines = vec!["Which one do you mean?".to_string()];
                lines.extend(candidates.iter().map(short_line));
                lines.join("\n")
            }
            StructuredContext::NeedsReference {
                remembered,
                question,
            } => needs_reference(remembered, question),
            StructuredContext::FreeChat { focused, .. } => match focused {
                Some(listing) => format!(
                    "We were talking about {}. You can ask me about its price, parking, pets or address, or tell me what else you're looking for.",
                    listing.title
                ),
                None => "I can help you find a place to rent. Tell me the neighborhood, your budget and how many rooms you need.".to_string(),
            },
        }
    }
}

#[async_trait]
impl ResponseComposer for TemplateComposer {
    async fn render(
        &self,
        _history: &[ChatMessage],
        context: &StructuredContext,
    ) -> Result<String, ChatError> {
        Ok(self.compose(context))
    }
}

// -- Rendering helpers --

fn money(value: f64) -> String {
    format!("R$ {:.2}", value)
}

fn plural(count: u32, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("1 {}", singular)
    } else {
        format!("{} {}", count, plural)
    }
}

fn short_line(listing: &Listing) -> String {
    format!(
        "- {} in {} (#{}), {}, total {} per month",
        listing.title,
        listing.neighborhood,
        listing.id,
        plural(listing.rooms, "room", "rooms"),
        money(listing.total_cost())
    )
}

fn summary(listing: &Listing) -> String {
    format!(
        "{} in {}: {}, {}, {}, {:.0} m². Rent {}, total {} per month. Address: {}.",
        listing.title,
        listing.neighborhood,
        plural(listing.rooms, "room", "rooms"),
        plural(listing.bathrooms, "bathroom", "bathrooms"),
        plural(listing.parking_spots, "parking spot", "parking spots"),
        listing.area,
        money(listing.rent),
        money(listing.total_cost()),
        listing.address()
    )
}

fn greeting(neighborhoods: &[String]) -> String {
    if neighborhoods.is_empty() {
        return "Hi! I can help you find a place to rent. Tell me the neighborhood, your budget and how many rooms you need.".to_string();
    }
    format!(
        "Hi! I can help you find a place to rent. We have listings in {}. Which neighborhood interests you, and what's your budget?",
        neighborhoods.join(", ")
    )
}

fn clarify(reason: ClarifyReason, criteria: &Criteria) -> String {
    match reason {
        ClarifyReason::NeedNeighborhoodAndBudget => match criteria.property_type.value() {
            Some(kind) => format!(
                "Happy to help you find {}! Which neighborhood are you interested in, and what's your maximum budget?",
                with_article(*kind)
            ),
            None => "Happy to help! Which neighborhood are you interested in, what's your maximum budget, and are you after a house or an apartment?".to_string(),
        },
        ClarifyReason::NeedBudgetAndRooms => {
            let place = criteria
                .neighborhood
                .value()
                .map_or_else(|| "that area".to_string(), |n| n.clone());
            let place = match criteria.property_type.value() {
                Some(kind) => format!("{} in {}", with_article(*kind), place),
                None => place,
            };
            format!(
                "Great, {}. What's your maximum monthly rent, and how many rooms do you need?",
                place
            )
        }
    }
}

fn with_article(kind: PropertyType) -> String {
    let label = kind.label();
    let article = if label.starts_with(['a', 'e', 'i', 'o', 'u']) {
        "an"
    } else {
        "a"
    };
    format!("{} {}", article, label)
}

fn results(
    listings: &[Listing],
    tier: RetrievalTier,
    advisory: &str,
    keywords_dropped: bool,
) -> String {
    let mut lines = Vec::new();
    if tier.is_relaxed() {
        lines.push(format!("Note: {}.", advisory));
    }
    if keywords_dropped {
        lines.push(
            "Keyword search is unavailable right now, so I only used your other filters."
                .to_string(),
        );
    }
    lines.push(match listings.len() {
        1 => "I found this listing:".to_string(),
        n => format!("I found {} listings:", n),
    });
    for (i, listing) in listings.iter().enumerate() {
        lines.push(format!(
            "{}. {} in {} (#{}): {}, rent {}, total {} per month",
            i + 1,
            listing.title,
            listing.neighborhood,
            listing.id,
            plural(listing.rooms, "room", "rooms"),
            money(listing.rent),
            money(listing.total_cost())
        ));
    }
    lines.push("Ask me about any of them, for example \"does the first one have parking?\"".to_string());
    lines.join("\n")
}

fn detail(listing: &Listing, question: &str) -> String {
    let answers: Vec<String> = topics(question)
        .into_iter()
        .map(|topic| answer(listing, topic))
        .collect();
    if answers.is_empty() {
        summary(listing)
    } else {
        answers.join(" ")
    }
}

fn answer(listing: &Listing, topic: Topic) -> String {
    let title = &listing.title;
    match topic {
        Topic::Parking if listing.parking_spots == 0 => {
            format!("{} has no parking spot.", title)
        }
        Topic::Parking => format!(
            "{} has {}.",
            title,
            plural(listing.parking_spots, "parking spot", "parking spots")
        ),
        Topic::Pets if listing.pets_allowed => format!("{} accepts pets.", title),
        Topic::Pets => format!("{} does not accept pets.", title),
        Topic::Rooms => format!("{} has {}.", title, plural(listing.rooms, "room", "rooms")),
        Topic::Bathrooms => format!(
            "{} has {}.",
            title,
            plural(listing.bathrooms, "bathroom", "bathrooms")
        ),
        Topic::Area => format!("{} has {:.0} m².", title, listing.area),
        Topic::Address => format!(
            "{} is at {}, {}.",
            title,
            listing.address(),
            listing.city
        ),
        Topic::Cost => format!(
            "Rent is {}, property tax {} and condo fee {}, for a total of {} per month.",
            money(listing.rent),
            money(listing.property_tax),
            money(listing.condo_fee),
            money(listing.total_cost())
        ),
        Topic::Visit => format!(
            "Visits to {} ({}) are arranged with our agent. Tell me which days and times suit you.",
            title,
            listing.address()
        ),
        Topic::Documents => format!(
            "To rent {} you'll usually need an ID, proof of income and proof of address. A guarantor or rental insurance may also be required.",
            title
        ),
        Topic::Thanks => "You're welcome!".to_string(),
    }
}

fn needs_reference(remembered: &[Listing], question: &str) -> String {
    if topics(question).contains(&Topic::Thanks) {
        return "You're welcome! Let me know if you'd like to see anything else.".to_string();
    }
    if remembered.is_empty() {
        return "Which listing do you mean? Tell me what you're looking for and I'll search again."
            .to_string();
    }
    let mut lines = vec!["Which listing do you mean?".to_string()];
    lines.extend(remembered.iter().map(short_line));
    lines.join("\n")
}
