//! Value types shared across the engine.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hearth_core::types::{ListingId, PropertyType};

// =============================================================================
// Slot
// =============================================================================

/// Tri-state criteria field.
///
/// `Unset` means "not mentioned this turn"; `Cleared` means the user
/// explicitly dropped the constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Slot<T> {
    #[default]
    Unset,
    Cleared,
    Value(T),
}

impl<T> Slot<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Slot::Unset)
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Slot::Value(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Slot::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Apply an incoming slot on top of this one.
    pub fn merge(&mut self, incoming: Slot<T>) {
        match incoming {
            Slot::Unset => {}
            Slot::Cleared => *self = Slot::Unset,
            value @ Slot::Value(_) => *self = value,
        }
    }

    /// First-non-unset-wins combination.
    pub fn or(self, other: Slot<T>) -> Slot<T> {
        if self.is_unset() {
            other
        } else {
            self
        }
    }
}

// =============================================================================
// Criteria
// =============================================================================

/// Partially specified search constraints.
///
/// When `listing_id` holds a value every other field is ignored by retrieval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    pub neighborhood: Slot<String>,
    pub price_ceiling: Slot<f64>,
    pub min_rooms: Slot<u32>,
    pub property_type: Slot<PropertyType>,
    /// Only ever `Value(true)`; "no pets" cannot be expressed.
    pub pets_required: Slot<bool>,
    pub keywords: Slot<BTreeSet<String>>,
    pub listing_id: Slot<ListingId>,
}

impl Criteria {
    /// No field carries a value.
    pub fn is_empty(&self) -> bool {
        !self.neighborhood.is_value()
            && !self.price_ceiling.is_value()
            && !self.min_rooms.is_value()
            && !self.property_type.is_value()
            && !self.pets_required.is_value()
            && !self.keywords.is_value()
            && !self.listing_id.is_value()
    }

    /// Field-wise merge: values overwrite, `Unset` keeps, `Cleared` resets.
    pub fn merge(&mut self, incoming: Criteria) {
        self.neighborhood.merge(incoming.neighborhood);
        self.price_ceiling.merge(incoming.price_ceiling);
        self.min_rooms.merge(incoming.min_rooms);
        self.property_type.merge(incoming.property_type);
        self.pets_required.merge(incoming.pets_required);
        self.keywords.merge(incoming.keywords);
        self.listing_id.merge(incoming.listing_id);
    }

    /// Field-wise first-non-unset-wins combination.
    pub fn or(self, other: Criteria) -> Criteria {
        Criteria {
            neighborhood: self.neighborhood.or(other.neighborhood),
            price_ceiling: self.price_ceiling.or(other.price_ceiling),
            min_rooms: self.min_rooms.or(other.min_rooms),
            property_type: self.property_type.or(other.property_type),
            pets_required: self.pets_required.or(other.pets_required),
            keywords: self.keywords.or(other.keywords),
            listing_id: self.listing_id.or(other.listing_id),
        }
    }

    /// The turn mentions a neighborhood (or drops one), a price, a room
    /// count, a property type or keywords: the marks of a fresh search.
    pub fn carries_search_terms(&self) -> bool {
        !self.neighborhood.is_unset()
            || self.price_ceiling.is_value()
            || self.min_rooms.is_value()
            || self.property_type.is_value()
            || self.keywords.is_value()
    }

    /// Structured constraints beyond the neighborhood.
    pub fn has_refinement(&self) -> bool {
        self.price_ceiling.is_value() || self.min_rooms.is_value() || self.keywords.is_value()
    }

    /// Keywords OR-joined for the full-text index.
    pub fn keyword_query(&self) -> Option<String> {
        self.keywords
            .value()
            .filter(|k| !k.is_empty())
            .map(|k| k.iter().cloned().collect::<Vec<_>>().join(" OR "))
    }
}

// =============================================================================
// Retrieval tier
// =============================================================================

/// How far a query had to be relaxed before it returned anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RetrievalTier {
    Exact,
    RelaxedPrice,
    RelaxedType,
    NeighborhoodOnly,
    FullCatalog,
}

impl RetrievalTier {
    /// Human-readable note that must accompany results of this tier.
    pub fn advisory(&self) -> &'static str {
        match self {
            RetrievalTier::Exact => "exact match",
            RetrievalTier::RelaxedPrice => "price relaxed: nothing within the requested budget",
            RetrievalTier::RelaxedType => {
                "property type relaxed: nothing of the requested type matched"
            }
            RetrievalTier::NeighborhoodOnly => {
                "only the neighborhood was kept: type, rooms, price and keyword filters relaxed"
            }
            RetrievalTier::FullCatalog => {
                "results in other neighborhoods: showing the whole catalog"
            }
        }
    }

    pub fn is_relaxed(&self) -> bool {
        *self != RetrievalTier::Exact
    }
}

impl fmt::Display for RetrievalTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RetrievalTier::Exact => "exact",
            RetrievalTier::RelaxedPrice => "relaxed_price",
            RetrievalTier::RelaxedType => "relaxed_type",
            RetrievalTier::NeighborhoodOnly => "neighborhood_only",
            RetrievalTier::FullCatalog => "full_catalog",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Turn classification
// =============================================================================

/// What a single turn is about, computed once per turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnKind {
    DirectLink(ListingId),
    Greeting,
    FollowUp,
    Search { browse_all: bool },
    FreeChat,
}

impl TurnKind {
    pub fn label(&self) -> &'static str {
        match self {
            TurnKind::DirectLink(_) => "direct_link",
            TurnKind::Greeting => "greeting",
            TurnKind::FollowUp => "follow_up",
            TurnKind::Search { .. } => "search",
            TurnKind::FreeChat => "free_chat",
        }
    }
}

// =============================================================================
// Sessions and messages
// =============================================================================

/// Opaque conversation identifier supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        SessionId(id.into())
    }

    /// A fresh random id.
    pub fn generate() -> Self {
        SessionId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        SessionId(id.to_string())
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        SessionId(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of the rolling conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Epoch seconds.
    pub created_at: i64,
}

/// Outcome of one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnReply {
    pub session_id: SessionId,
    pub text: String,
    pub kind: TurnKind,
    /// Set when the turn ran a retrieval.
    pub tier: Option<RetrievalTier>,
    /// Listings the reply talks about, in presentation order.
    pub listing_ids: Vec<ListingId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords(words: &[&str]) -> Slot<BTreeSet<String>> {
        Slot::Value(words.iter().map(|w| w.to_string()).collect())
    }

    // ---- Slot ----

    #[test]
    fn test_slot_merge_value_overwrites() {
        let mut slot = Slot::Value(1);
        slot.merge(Slot::Value(2));
        assert_eq!(slot, Slot::Value(2));
    }

    #[test]
    fn test_slot_merge_unset_keeps() {
        let mut slot = Slot::Value(1);
        slot.merge(Slot::Unset);
        assert_eq!(slot, Slot::Value(1));
    }

    #[test]
    fn test_slot_merge_cleared_resets() {
        let mut slot = Slot::Value(1);
        slot.merge(Slot::Cleared);
        assert_eq!(slot, Slot::Unset);

        let mut unset: Slot<i32> = Slot::Unset;
        unset.merge(Slot::Cleared);
        assert_eq!(unset, Slot::Unset);
    }

    #[test]
    fn test_slot_or_first_non_unset_wins() {
        assert_eq!(Slot::Unset.or(Slot::Value(3)), Slot::Value(3));
        assert_eq!(Slot::Value(1).or(Slot::Value(3)), Slot::Value(1));
        assert_eq!(Slot::<i32>::Cleared.or(Slot::Value(3)), Slot::Cleared);
    }

    // ---- Criteria merge properties ----

    #[test]
    fn test_merge_never_erases_with_unset() {
        let samples = vec![
            Criteria::default(),
            Criteria {
                neighborhood: Slot::Value("Centro".to_string()),
                price_ceiling: Slot::Value(1500.0),
                ..Criteria::default()
            },
            Criteria {
                min_rooms: Slot::Value(2),
                pets_required: Slot::Value(true),
                keywords: keywords(&["varanda"]),
                ..Criteria::default()
            },
        ];

        for current in &samples {
            for incoming in &samples {
                let mut merged = current.clone();
                merged.merge(incoming.clone());

                if incoming.neighborhood.is_unset() {
                    assert_eq!(merged.neighborhood, current.neighborhood);
                }
                if incoming.price_ceiling.is_unset() {
                    assert_eq!(merged.price_ceiling, current.price_ceiling);
                }
                if incoming.min_rooms.is_unset() {
                    assert_eq!(merged.min_rooms, current.min_rooms);
                }
                if incoming.keywords.is_unset() {
                    assert_eq!(merged.keywords, current.keywords);
                }
            }
        }
    }

    #[test]
    fn test_merge_cleared_always_resets() {
        for prior in [Slot::Unset, Slot::Value("Centro".to_string())] {
            let mut current = Criteria {
                neighborhood: prior,
                min_rooms: Slot::Value(2),
                ..Criteria::default()
            };
            current.merge(Criteria {
                neighborhood: Slot::Cleared,
                ..Criteria::default()
            });
            assert_eq!(current.neighborhood, Slot::Unset);
            assert_eq!(current.min_rooms, Slot::Value(2));
        }
    }

    #[test]
    fn test_criteria_is_empty() {
        assert!(Criteria::default().is_empty());
        let cleared = Criteria {
            neighborhood: Slot::Cleared,
            ..Criteria::default()
        };
        assert!(cleared.is_empty());
        let pets = Criteria {
            pets_required: Slot::Value(true),
            ..Criteria::default()
        };
        assert!(!pets.is_empty());
    }

    #[test]
    fn test_carries_search_terms_ignores_pets() {
        let pets = Criteria {
            pets_required: Slot::Value(true),
            ..Criteria::default()
        };
        assert!(!pets.carries_search_terms());

        let cleared = Criteria {
            neighborhood: Slot::Cleared,
            ..Criteria::default()
        };
        assert!(cleared.carries_search_terms());

        let house = Criteria {
            property_type: Slot::Value(PropertyType::House),
            ..Criteria::default()
        };
        assert!(house.carries_search_terms());
        assert!(!house.has_refinement());
    }

    #[test]
    fn test_keyword_query_is_sorted_or_join() {
        let criteria = Criteria {
            keywords: keywords(&["varanda", "piscina"]),
            ..Criteria::default()
        };
        assert_eq!(criteria.keyword_query().as_deref(), Some("piscina OR varanda"));
        assert_eq!(Criteria::default().keyword_query(), None);
    }

    // ---- Tiers ----

    #[test]
    fn test_tier_order_and_advisories() {
        assert!(RetrievalTier::Exact < RetrievalTier::RelaxedPrice);
        assert!(RetrievalTier::RelaxedPrice < RetrievalTier::RelaxedType);
        assert!(RetrievalTier::RelaxedType < RetrievalTier::NeighborhoodOnly);
        assert!(RetrievalTier::NeighborhoodOnly < RetrievalTier::FullCatalog);
        assert!(RetrievalTier::RelaxedPrice.advisory().starts_with("price relaxed"));
        assert!(RetrievalTier::RelaxedType.advisory().starts_with("property type relaxed"));
        assert_eq!(RetrievalTier::RelaxedType.to_string(), "relaxed_type");
        assert!(RetrievalTier::FullCatalog
            .advisory()
            .starts_with("results in other neighborhoods"));
        assert!(!RetrievalTier::Exact.is_relaxed());
        assert!(RetrievalTier::NeighborhoodOnly.is_relaxed());
    }

    #[test]
    fn test_session_id_conversions() {
        let id = SessionId::from("abc");
        assert_eq!(id.as_str(), "abc");
        assert_eq!(id.to_string(), "abc");
        assert_ne!(SessionId::generate(), SessionId::generate());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }
}
