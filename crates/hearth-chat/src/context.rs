//! Follow-up reference resolution.
//!
//! Maps "does it have parking?", "the second one" or "and the house?" to a
//! listing the conversation has already shown, without touching the catalog.

use std::sync::LazyLock;

use regex::Regex;

use hearth_core::types::{Listing, PropertyType};

use crate::normalize::normalize;
use crate::session::RememberedListings;

// =============================================================================
// Patterns
// =============================================================================

/// Property-type synonym groups. A word from a group in the utterance
/// matches any word from the same group in a title.
static PROPERTY_TYPES: LazyLock<Vec<(PropertyType, Regex)>> = LazyLock::new(|| {
    [
        (PropertyType::House, r"\b(?:house|houses|casa|casas|sobrados?)\b"),
        (
            PropertyType::Apartment,
            r"\b(?:apartments?|apartamentos?|aptos?|apt|flats?)\b",
        ),
        (PropertyType::Studio, r"\b(?:studios?|estudios?)\b"),
        (PropertyType::Loft, r"\b(?:lofts?)\b"),
        (PropertyType::Penthouse, r"\b(?:penthouses?|coberturas?)\b"),
        (
            PropertyType::Kitnet,
            r"\b(?:kitnets?|kitinetes?|kitchenettes?)\b",
        ),
    ]
    .into_iter()
    .map(|(kind, p)| (kind, Regex::new(p).unwrap()))
    .collect()
});

static NUMBERED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\b(?:option|opcao|number|numero|item|n[o.])\s*|#\s*)(\d{1,2})\b").unwrap()
});

static ORDINAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(first|1st|primeir[oa]|second|2nd|segund[oa]|third|3rd|terceir[oa]|fourth|4th|quarta|fifth|5th|quint[oa]|last|ultim[oa])\b",
    )
    .unwrap()
});

/// The utterance points at a position in the shown list.
pub fn mentions_position(normalized: &str) -> bool {
    NUMBERED_RE.is_match(normalized) || ORDINAL_RE.is_match(normalized)
}

/// The property type named earliest in the utterance.
pub fn detect_property_type(normalized: &str) -> Option<PropertyType> {
    PROPERTY_TYPES
        .iter()
        .filter_map(|(kind, re)| re.find(normalized).map(|m| (m.start(), *kind)))
        .min_by_key(|(start, _)| *start)
        .map(|(_, kind)| kind)
}

// =============================================================================
// Resolution
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(Listing),
    /// Several remembered listings fit; ask instead of guessing.
    Ambiguous(Vec<Listing>),
    Unresolved,
}

impl Resolution {
    pub fn listing(&self) -> Option<&Listing> {
        match self {
            Resolution::Resolved(listing) => Some(listing),
            _ => None,
        }
    }
}

// =============================================================================
// ContextResolver
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct ContextResolver;

impl ContextResolver {
    /// Resolve in order: property type, position, focused listing, sole
    /// remembered listing.
    pub fn resolve(
        &self,
        utterance: &str,
        last_shown: &RememberedListings,
        focused: Option<&Listing>,
    ) -> Resolution {
        let text = normalize(utterance);

        let by_type = self.by_property_type(&text, last_shown);
        match by_type.len() {
            0 => {}
            1 => return Resolution::Resolved(by_type[0].clone()),
            _ => return Resolution::Ambiguous(by_type.into_iter().cloned().collect()),
        }

        if let Some(listing) = self.by_position(&text, last_shown) {
            return Resolution::Resolved(listing.clone());
        }

        if let Some(listing) = focused.filter(|f| last_shown.contains(f.id)) {
            return Resolution::Resolved(listing.clone());
        }

        if last_shown.len() == 1 {
            if let Some(listing) = last_shown.get(0) {
                return Resolution::Resolved(listing.clone());
            }
        }

        Resolution::Unresolved
    }

    fn by_property_type<'a>(
        &self,
        text: &str,
        last_shown: &'a RememberedListings,
    ) -> Vec<&'a Listing> {
        let mentioned: Vec<&Regex> = PROPERTY_TYPES
            .iter()
            .map(|(_, re)| re)
            .filter(|re| re.is_match(text))
            .collect();
        if mentioned.is_empty() {
            return Vec::new();
        }
        last_shown
            .iter()
            .filter(|listing| {
                let title = normalize(&listing.title);
                mentioned.iter().any(|re| re.is_match(&title))
            })
            .collect()
    }

    fn by_position<'a>(
        &self,
        text: &str,
        last_shown: &'a RememberedListings,
    ) -> Option<&'a Listing> {
        if let Some(caps) = NUMBERED_RE.captures(text) {
            let n: usize = caps[1].parse().ok()?;
            return n.checked_sub(1).and_then(|i| last_shown.get(i));
        }
        let word = ORDINAL_RE.captures(text)?.get(1)?.as_str();
        let index = match word {
            "first" | "1st" | "primeiro" | "primeira" => 0,
            "second" | "2nd" | "segundo" | "segunda" => 1,
            "third" | "3rd" | "terceiro" | "terceira" => 2,
            "fourth" | "4th" | "quarta" => 3,
            "fifth" | "5th" | "quinto" | "quinta" => 4,
            _ => return last_shown.last(),
        };
        last_shown.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::types::ListingId;

    fn listing(id: i64, title: &str) -> Listing {
        Listing {
            id: ListingId(id),
            title: title.to_string(),
            description: String::new(),
            rooms: 2,
            bathrooms: 1,
            parking_spots: 1,
            area: 70.0,
            city: "Juiz de Fora".to_string(),
            neighborhood: "Centro".to_string(),
            street: "Rua Halfeld".to_string(),
            street_number: "10".to_string(),
            rent: 1200.0,
            property_tax: 50.0,
            condo_fee: 200.0,
            pets_allowed: true,
            neighborhood_code: String::new(),
        }
    }

    fn memory(listings: Vec<Listing>) -> RememberedListings {
        let mut memory = RememberedListings::new(4);
        memory.replace_with(listings);
        memory
    }

    fn shown() -> RememberedListings {
        memory(vec![
            listing(1, "Casa com quintal"),
            listing(2, "Apartamento 2 quartos"),
            listing(3, "Apartamento com varanda"),
        ])
    }

    // ---- Property type ----

    #[test]
    fn test_property_type_unique_match() {
        let resolution = ContextResolver.resolve("does the house have parking?", &shown(), None);
        assert_eq!(resolution.listing().map(|l| l.id), Some(ListingId(1)));
    }

    #[test]
    fn test_property_type_ambiguous() {
        let resolution = ContextResolver.resolve("e o apartamento?", &shown(), None);
        match resolution {
            Resolution::Ambiguous(candidates) => {
                let ids: Vec<_> = candidates.iter().map(|l| l.id).collect();
                assert_eq!(ids, vec![ListingId(2), ListingId(3)]);
            }
            other => panic!("expected Ambiguous, got {:?}", other),
        }
    }

    #[test]
    fn test_property_type_without_match_falls_through() {
        let resolution = ContextResolver.resolve("and the loft? the second one", &shown(), None);
        assert_eq!(resolution.listing().map(|l| l.id), Some(ListingId(2)));
    }

    // ---- Position ----

    #[test]
    fn test_ordinal_words() {
        let resolve = |text: &str| {
            ContextResolver
                .resolve(text, &shown(), None)
                .listing()
                .map(|l| l.id)
        };
        assert_eq!(resolve("the first one"), Some(ListingId(1)));
        assert_eq!(resolve("a segunda opção"), Some(ListingId(2)));
        assert_eq!(resolve("the last one please"), Some(ListingId(3)));
        assert_eq!(resolve("o último"), Some(ListingId(3)));
    }

    #[test]
    fn test_numbered_references() {
        let resolve = |text: &str| {
            ContextResolver
                .resolve(text, &shown(), None)
                .listing()
                .map(|l| l.id)
        };
        assert_eq!(resolve("option 2"), Some(ListingId(2)));
        assert_eq!(resolve("tell me about #3"), Some(ListingId(3)));
        assert_eq!(resolve("número 1"), Some(ListingId(1)));
        assert_eq!(resolve("option 9"), None);
        assert_eq!(resolve("option 0"), None);
    }

    // ---- Focus and fallbacks ----

    #[test]
    fn test_focused_listing_used_when_still_shown() {
        let focused = listing(3, "Apartamento com varanda");
        let resolution = ContextResolver.resolve("what is the address?", &shown(), Some(&focused));
        assert_eq!(resolution.listing().map(|l| l.id), Some(ListingId(3)));
    }

    #[test]
    fn test_stale_focus_is_ignored() {
        let stale = listing(99, "Loft");
        let resolution = ContextResolver.resolve("what is the address?", &shown(), Some(&stale));
        assert_eq!(resolution, Resolution::Unresolved);
    }

    #[test]
    fn test_single_remembered_listing_always_resolves() {
        let single = memory(vec![listing(42, "Loft no Centro")]);
        for text in ["does it have parking?", "thanks", "when can I visit?", "ok"] {
            let resolution = ContextResolver.resolve(text, &single, None);
            assert_eq!(
                resolution.listing().map(|l| l.id),
                Some(ListingId(42)),
                "text: {}",
                text
            );
        }
    }

    #[test]
    fn test_empty_memory_never_resolves() {
        let empty = RememberedListings::new(4);
        for text in ["does it have parking?", "the first one", "the house", "option 1"] {
            assert_eq!(ContextResolver.resolve(text, &empty, None), Resolution::Unresolved);
        }
    }

    #[test]
    fn test_mention_helpers() {
        assert!(mentions_position("the second one"));
        assert!(mentions_position("opcao 2"));
        assert!(!mentions_position("two rooms"));
        assert!(detect_property_type("the apartment").is_some());
        assert!(detect_property_type("parking").is_none());
    }

    #[test]
    fn test_detect_property_type_takes_earliest() {
        assert_eq!(detect_property_type("uma casa no centro"), Some(PropertyType::House));
        assert_eq!(detect_property_type("two studios"), Some(PropertyType::Studio));
        assert_eq!(
            detect_property_type("apartment or house"),
            Some(PropertyType::Apartment)
        );
        assert_eq!(detect_property_type("cobertura duplex"), Some(PropertyType::Penthouse));
        assert_eq!(detect_property_type("a nice home"), None);
    }
}
