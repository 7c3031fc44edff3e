//! Qualification gate: decides whether accumulated criteria are specific
//! enough to be worth a catalog query.

use serde::Serialize;

use crate::types::Criteria;

/// What the user still has to tell us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClarifyReason {
    /// No neighborhood and no price, rooms or keywords: ask for
    /// neighborhood, budget and property type.
    NeedNeighborhoodAndBudget,
    /// Only a neighborhood: ask for budget and room count.
    NeedBudgetAndRooms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Search,
    /// Explicit "show everything"; the gate does not apply.
    BrowseAll,
    Clarify(ClarifyReason),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QualificationGate;

impl QualificationGate {
    pub fn decide(&self, criteria: &Criteria, browse_all: bool) -> GateDecision {
        if browse_all {
            return GateDecision::BrowseAll;
        }
        if criteria.listing_id.is_value() {
            return GateDecision::Search;
        }
        if !criteria.neighborhood.is_value() && !criteria.has_refinement() {
            return GateDecision::Clarify(ClarifyReason::NeedNeighborhoodAndBudget);
        }
        if criteria.neighborhood.is_value() && !criteria.has_refinement() {
            return GateDecision::Clarify(ClarifyReason::NeedBudgetAndRooms);
        }
        GateDecision::Search
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Slot;
    use hearth_core::types::PropertyType;

    fn centro() -> Criteria {
        Criteria {
            neighborhood: Slot::Value("Centro".to_string()),
            ..Criteria::default()
        }
    }

    #[test]
    fn test_empty_criteria_asks_for_neighborhood_and_budget() {
        assert_eq!(
            QualificationGate.decide(&Criteria::default(), false),
            GateDecision::Clarify(ClarifyReason::NeedNeighborhoodAndBudget)
        );
    }

    #[test]
    fn test_type_or_pets_alone_ask_for_neighborhood_and_budget() {
        for criteria in [
            Criteria {
                property_type: Slot::Value(PropertyType::Apartment),
                ..Criteria::default()
            },
            Criteria {
                pets_required: Slot::Value(true),
                ..Criteria::default()
            },
        ] {
            assert_eq!(
                QualificationGate.decide(&criteria, false),
                GateDecision::Clarify(ClarifyReason::NeedNeighborhoodAndBudget)
            );
        }
    }

    #[test]
    fn test_neighborhood_only_asks_for_budget_and_rooms() {
        assert_eq!(
            QualificationGate.decide(&centro(), false),
            GateDecision::Clarify(ClarifyReason::NeedBudgetAndRooms)
        );
    }

    #[test]
    fn test_neighborhood_with_pets_or_type_still_clarifies() {
        let pets = Criteria {
            pets_required: Slot::Value(true),
            ..centro()
        };
        let house = Criteria {
            property_type: Slot::Value(PropertyType::House),
            ..centro()
        };
        for criteria in [pets, house] {
            assert_eq!(
                QualificationGate.decide(&criteria, false),
                GateDecision::Clarify(ClarifyReason::NeedBudgetAndRooms)
            );
        }
    }

    #[test]
    fn test_refinement_passes() {
        for criteria in [
            Criteria {
                price_ceiling: Slot::Value(1500.0),
                ..centro()
            },
            Criteria {
                min_rooms: Slot::Value(2),
                ..centro()
            },
            Criteria {
                keywords: Slot::Value(["piscina".to_string()].into_iter().collect()),
                ..Criteria::default()
            },
            Criteria {
                price_ceiling: Slot::Value(900.0),
                ..Criteria::default()
            },
        ] {
            assert_eq!(QualificationGate.decide(&criteria, false), GateDecision::Search);
        }
    }

    #[test]
    fn test_browse_all_bypasses_gate() {
        assert_eq!(
            QualificationGate.decide(&Criteria::default(), true),
            GateDecision::BrowseAll
        );
        assert_eq!(QualificationGate.decide(&centro(), true), GateDecision::BrowseAll);
    }
}
