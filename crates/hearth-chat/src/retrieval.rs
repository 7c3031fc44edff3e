//! Tiered retrieval with progressive relaxation.
//!
//! Tiers run in a fixed order and stop at the first non-empty result:
//! exact, price relaxed, property type relaxed, then neighborhood only
//! (when a neighborhood was asked for) or the whole catalog (when none
//! was). A requested neighborhood is never silently swapped for another
//! one. Excluded listings stay excluded on every tier.

use std::sync::Arc;

use tracing::{debug, warn};

use hearth_core::catalog::{CatalogQuery, FullTextIndex, PropertyCatalog};
use hearth_core::types::{Listing, ListingId};

use crate::error::ChatError;
use crate::types::{Criteria, RetrievalTier};

/// Result of one retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOutcome {
    /// The tier that produced `listings`, or the last one tried when empty.
    pub tier: RetrievalTier,
    /// Ranked and truncated to top-K.
    pub listings: Vec<Listing>,
    /// Keywords were requested but the full-text index was unavailable.
    pub keywords_dropped: bool,
}

impl RetrievalOutcome {
    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    pub fn advisory(&self) -> &'static str {
        self.tier.advisory()
    }

    pub fn ids(&self) -> Vec<ListingId> {
        self.listings.iter().map(|l| l.id).collect()
    }
}

/// Runs criteria against the catalog and the full-text index.
pub struct TieredRetriever {
    catalog: Arc<dyn PropertyCatalog>,
    index: Option<Arc<dyn FullTextIndex>>,
    top_k: usize,
    full_text_limit: usize,
}

impl TieredRetriever {
    pub fn new(
        catalog: Arc<dyn PropertyCatalog>,
        index: Option<Arc<dyn FullTextIndex>>,
        top_k: usize,
        full_text_limit: usize,
    ) -> Self {
        Self {
            catalog,
            index,
            top_k,
            full_text_limit,
        }
    }

    /// Single lookup by id, no relaxation.
    pub fn fetch_by_id(&self, id: ListingId) -> Result<Option<Listing>, ChatError> {
        Ok(self.catalog.get_by_id(id)?)
    }

    /// Run the relaxation ladder. `exclude` lists ids the caller has
    /// already shown and wants replaced; it does not apply to a direct id.
    pub fn retrieve(
        &self,
        criteria: &Criteria,
        browse_all: bool,
        exclude: &[ListingId],
    ) -> Result<RetrievalOutcome, ChatError> {
        if let Some(id) = criteria.listing_id.value() {
            let listings = self.fetch_by_id(*id)?.into_iter().collect();
            return Ok(RetrievalOutcome {
                tier: RetrievalTier::Exact,
                listings,
                keywords_dropped: false,
            });
        }

        let neighborhood = criteria.neighborhood.value().cloned();
        let exclude_ids = exclude.to_vec();

        if browse_all && neighborhood.is_none() {
            let listings = self.run(&CatalogQuery {
                exclude_ids,
                ..CatalogQuery::all()
            })?;
            return Ok(RetrievalOutcome {
                tier: RetrievalTier::FullCatalog,
                listings,
                keywords_dropped: false,
            });
        }

        let (id_in, keywords_dropped) = self.keyword_candidates(criteria);

        let exact = CatalogQuery {
            neighborhood: neighborhood.clone(),
            max_rent: criteria.price_ceiling.value().copied(),
            min_rooms: criteria.min_rooms.value().copied(),
            pets_required: criteria.pets_required.value().copied().unwrap_or(false),
            property_type: criteria.property_type.value().copied(),
            id_in,
            exclude_ids: exclude_ids.clone(),
        };

        let mut ladder = vec![(RetrievalTier::Exact, exact.clone())];
        if exact.max_rent.is_some() {
            ladder.push((
                RetrievalTier::RelaxedPrice,
                CatalogQuery {
                    max_rent: None,
                    ..exact.clone()
                },
            ));
        }
        if exact.property_type.is_some() {
            ladder.push((
                RetrievalTier::RelaxedType,
                CatalogQuery {
                    property_type: None,
                    ..exact.clone()
                },
            ));
        }
        let tier = match neighborhood {
            Some(_) => RetrievalTier::NeighborhoodOnly,
            None => RetrievalTier::FullCatalog,
        };
        ladder.push((
            tier,
            CatalogQuery {
                neighborhood,
                exclude_ids,
                ..CatalogQuery::all()
            },
        ));

        let mut tried: Vec<CatalogQuery> = Vec::with_capacity(ladder.len());
        let mut last_tier = RetrievalTier::Exact;

        for (tier, query) in ladder {
            if tried.contains(&query) {
                debug!(tier = %tier, "Skipping tier with an already tried filter");
                continue;
            }
            last_tier = tier;
            let listings = self.run(&query)?;
            debug!(tier = %tier, count = listings.len(), "Tier queried");
            if !listings.is_empty() {
                return Ok(RetrievalOutcome {
                    tier,
                    listings,
                    keywords_dropped,
                });
            }
            tried.push(query);
        }

        Ok(RetrievalOutcome {
            tier: last_tier,
            listings: Vec::new(),
            keywords_dropped,
        })
    }

    /// Candidate ids from the full-text index, or `(None, true)` when the
    /// index is missing or failing.
    fn keyword_candidates(&self, criteria: &Criteria) -> (Option<Vec<ListingId>>, bool) {
        let Some(query) = criteria.keyword_query() else {
            return (None, false);
        };
        let Some(index) = &self.index else {
            warn!("No full-text index configured, dropping keyword filter");
            return (None, true);
        };
        match index.search(&query, self.full_text_limit) {
            Ok(ids) => (Some(ids), false),
            Err(e) => {
                warn!(error = %e, "Full-text search failed, dropping keyword filter");
                (None, true)
            }
        }
    }

    fn run(&self, query: &CatalogQuery) -> Result<Vec<Listing>, ChatError> {
        let mut listings = self.catalog.query(query)?;
        rank(&mut listings);
        listings.truncate(self.top_k);
        Ok(listings)
    }
}

/// Ascending total cost, ties by ascending id.
pub fn rank(listings: &mut [Listing]) {
    listings.sort_by(|a, b| {
        a.total_cost()
            .total_cmp(&b.total_cost())
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Slot;
    use hearth_core::types::PropertyType;
    use hearth_core::error::HearthError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    // ---- Test doubles ----

    struct MemoryCatalog {
        listings: Vec<Listing>,
        queries: Mutex<Vec<CatalogQuery>>,
        fail: bool,
    }

    impl MemoryCatalog {
        fn new(listings: Vec<Listing>) -> Self {
            Self {
                listings,
                queries: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(Vec::new())
            }
        }

        fn query_count(&self) -> usize {
            self.queries.lock().unwrap().len()
        }
    }

    impl PropertyCatalog for MemoryCatalog {
        fn query(&self, query: &CatalogQuery) -> hearth_core::Result<Vec<Listing>> {
            self.queries.lock().unwrap().push(query.clone());
            if self.fail {
                return Err(HearthError::Storage("connection lost".to_string()));
            }
            Ok(self
                .listings
                .iter()
                .filter(|l| {
                    query
                        .neighborhood
                        .as_ref()
                        .map_or(true, |n| n.eq_ignore_ascii_case(&l.neighborhood))
                        && query.max_rent.map_or(true, |max| l.rent <= max)
                        && query.min_rooms.map_or(true, |min| l.rooms >= min)
                        && (!query.pets_required || l.pets_allowed)
                        && query.property_type.map_or(true, |kind| {
                            let title = l.title.to_lowercase();
                            kind.title_terms().iter().any(|t| title.contains(t))
                        })
                        && query.id_in.as_ref().map_or(true, |ids| ids.contains(&l.id))
                        && !query.exclude_ids.contains(&l.id)
                })
                .cloned()
                .collect())
        }

        fn get_by_id(&self, id: ListingId) -> hearth_core::Result<Option<Listing>> {
            if self.fail {
                return Err(HearthError::Storage("connection lost".to_string()));
            }
            Ok(self.listings.iter().find(|l| l.id == id).cloned())
        }

        fn list_distinct_neighborhoods(&self) -> hearth_core::Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    struct FixedIndex {
        ids: Vec<ListingId>,
        calls: AtomicUsize,
    }

    impl FullTextIndex for FixedIndex {
        fn search(&self, _query: &str, _limit: usize) -> hearth_core::Result<Vec<ListingId>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.ids.clone())
        }
    }

    struct BrokenIndex;

    impl FullTextIndex for BrokenIndex {
        fn search(&self, _query: &str, _limit: usize) -> hearth_core::Result<Vec<ListingId>> {
            Err(HearthError::Search("index offline".to_string()))
        }
    }

    fn listing(id: i64, neighborhood: &str, rent: f64, rooms: u32) -> Listing {
        Listing {
            id: ListingId(id),
            title: format!("Apartamento {}", id),
            description: String::new(),
            rooms,
            bathrooms: 1,
            parking_spots: 0,
            area: 50.0,
            city: "Juiz de Fora".to_string(),
            neighborhood: neighborhood.to_string(),
            street: "Rua A".to_string(),
            street_number: "1".to_string(),
            rent,
            property_tax: 0.0,
            condo_fee: 0.0,
            pets_allowed: false,
            neighborhood_code: String::new(),
        }
    }

    fn criteria(neighborhood: Option<&str>, price: Option<f64>, rooms: Option<u32>) -> Criteria {
        Criteria {
            neighborhood: neighborhood.map_or(Slot::Unset, |n| Slot::Value(n.to_string())),
            price_ceiling: price.map_or(Slot::Unset, Slot::Value),
            min_rooms: rooms.map_or(Slot::Unset, Slot::Value),
            ..Criteria::default()
        }
    }

    fn retriever(catalog: Arc<MemoryCatalog>) -> TieredRetriever {
        TieredRetriever::new(catalog, None, 4, 200)
    }

    // ---- Tiers ----

    #[test]
    fn test_exact_tier() {
        let catalog = Arc::new(MemoryCatalog::new(vec![
            listing(1, "Centro", 1400.0, 2),
            listing(2, "Centro", 2000.0, 2),
        ]));
        let outcome = retriever(catalog)
            .retrieve(&criteria(Some("Centro"), Some(1500.0), Some(2)), false, &[])
            .unwrap();
        assert_eq!(outcome.tier, RetrievalTier::Exact);
        assert_eq!(outcome.ids(), vec![ListingId(1)]);
        assert_eq!(outcome.advisory(), "exact match");
    }

    #[test]
    fn test_relaxed_price_tier() {
        let catalog = Arc::new(MemoryCatalog::new(vec![
            listing(1, "Centro", 1800.0, 2),
            listing(2, "Centro", 2000.0, 2),
            listing(3, "Cascatinha", 900.0, 2),
        ]));
        let outcome = retriever(catalog)
            .retrieve(&criteria(Some("Centro"), Some(1500.0), Some(2)), false, &[])
            .unwrap();
        assert_eq!(outcome.tier, RetrievalTier::RelaxedPrice);
        assert_eq!(outcome.ids(), vec![ListingId(1), ListingId(2)]);
        assert!(outcome.advisory().contains("price relaxed"));
    }

    #[test]
    fn test_neighborhood_only_tier() {
        let catalog = Arc::new(MemoryCatalog::new(vec![
            listing(1, "Centro", 1800.0, 1),
            listing(2, "Cascatinha", 900.0, 3),
        ]));
        let outcome = retriever(catalog)
            .retrieve(&criteria(Some("Centro"), Some(1500.0), Some(3)), false, &[])
            .unwrap();
        assert_eq!(outcome.tier, RetrievalTier::NeighborhoodOnly);
        assert_eq!(outcome.ids(), vec![ListingId(1)]);
    }

    #[test]
    fn test_relaxed_type_tier_keeps_price() {
        let mut house = listing(3, "Centro", 2500.0, 3);
        house.title = "Casa com quintal".to_string();
        let catalog = Arc::new(MemoryCatalog::new(vec![
            listing(1, "Centro", 1400.0, 2),
            listing(2, "Centro", 1900.0, 2),
            house,
        ]));
        let c = Criteria {
            property_type: Slot::Value(PropertyType::House),
            ..criteria(Some("Centro"), Some(1500.0), Some(2))
        };
        let outcome = retriever(catalog).retrieve(&c, false, &[]).unwrap();
        // The house is over budget, so price relaxation finds it first.
        assert_eq!(outcome.tier, RetrievalTier::RelaxedPrice);
        assert_eq!(outcome.ids(), vec![ListingId(3)]);

        let catalog = Arc::new(MemoryCatalog::new(vec![
            listing(1, "Centro", 1400.0, 2),
            listing(2, "Centro", 1900.0, 2),
        ]));
        let outcome = retriever(catalog).retrieve(&c, false, &[]).unwrap();
        assert_eq!(outcome.tier, RetrievalTier::RelaxedType);
        assert_eq!(outcome.ids(), vec![ListingId(1)]);
        assert!(outcome.advisory().starts_with("property type relaxed"));
    }

    #[test]
    fn test_exclusions_apply_to_every_tier() {
        let catalog = Arc::new(MemoryCatalog::new(vec![
            listing(1, "Centro", 1400.0, 2),
            listing(2, "Centro", 2000.0, 2),
            listing(3, "Centro", 2500.0, 1),
        ]));
        let c = criteria(Some("Centro"), Some(1500.0), Some(2));
        let outcome = retriever(Arc::clone(&catalog))
            .retrieve(&c, false, &[ListingId(1)])
            .unwrap();
        assert_eq!(outcome.tier, RetrievalTier::RelaxedPrice);
        assert_eq!(outcome.ids(), vec![ListingId(2)]);

        let outcome = retriever(Arc::clone(&catalog))
            .retrieve(&c, false, &[ListingId(1), ListingId(2)])
            .unwrap();
        assert_eq!(outcome.tier, RetrievalTier::NeighborhoodOnly);
        assert_eq!(outcome.ids(), vec![ListingId(3)]);

        let outcome = retriever(Arc::clone(&catalog))
            .retrieve(&Criteria::default(), true, &[ListingId(1), ListingId(3)])
            .unwrap();
        assert_eq!(outcome.ids(), vec![ListingId(2)]);
        assert!(catalog
            .queries
            .lock()
            .unwrap()
            .iter()
            .all(|q| q.exclude_ids.contains(&ListingId(1))));
    }

    #[test]
    fn test_requested_neighborhood_never_replaced() {
        let catalog = Arc::new(MemoryCatalog::new(vec![listing(1, "Cascatinha", 900.0, 2)]));
        let outcome = retriever(Arc::clone(&catalog))
            .retrieve(&criteria(Some("Centro"), Some(1500.0), Some(2)), false, &[])
            .unwrap();
        assert!(outcome.is_empty());
        assert_eq!(outcome.tier, RetrievalTier::NeighborhoodOnly);
        assert!(catalog
            .queries
            .lock()
            .unwrap()
            .iter()
            .all(|q| q.neighborhood.as_deref() == Some("Centro")));
    }

    #[test]
    fn test_full_catalog_without_neighborhood() {
        let catalog = Arc::new(MemoryCatalog::new(vec![
            listing(1, "Centro", 1800.0, 1),
            listing(2, "Cascatinha", 900.0, 1),
        ]));
        let outcome = retriever(catalog)
            .retrieve(&criteria(None, Some(500.0), Some(4)), false, &[])
            .unwrap();
        assert_eq!(outcome.tier, RetrievalTier::FullCatalog);
        assert_eq!(outcome.ids(), vec![ListingId(2), ListingId(1)]);
    }

    #[test]
    fn test_duplicate_tiers_are_skipped() {
        let catalog = Arc::new(MemoryCatalog::new(Vec::new()));
        let outcome = retriever(Arc::clone(&catalog))
            .retrieve(&criteria(Some("Centro"), None, None), false, &[])
            .unwrap();
        assert!(outcome.is_empty());
        // Exact and NeighborhoodOnly are the same filter.
        assert_eq!(catalog.query_count(), 1);
    }

    #[test]
    fn test_browse_all_without_neighborhood_goes_to_full_catalog() {
        let catalog = Arc::new(MemoryCatalog::new(vec![listing(1, "Centro", 1000.0, 1)]));
        let outcome = retriever(Arc::clone(&catalog))
            .retrieve(&Criteria::default(), true, &[])
            .unwrap();
        assert_eq!(outcome.tier, RetrievalTier::FullCatalog);
        assert_eq!(catalog.query_count(), 1);
    }

    #[test]
    fn test_browse_all_with_neighborhood_keeps_it() {
        let catalog = Arc::new(MemoryCatalog::new(vec![
            listing(1, "Centro", 1000.0, 1),
            listing(2, "Cascatinha", 500.0, 1),
        ]));
        let outcome = retriever(catalog)
            .retrieve(&criteria(Some("Centro"), None, None), true, &[])
            .unwrap();
        assert_eq!(outcome.tier, RetrievalTier::Exact);
        assert_eq!(outcome.ids(), vec![ListingId(1)]);
    }

    // ---- Direct id ----

    #[test]
    fn test_listing_id_ignores_other_fields() {
        let catalog = Arc::new(MemoryCatalog::new(vec![listing(42, "Centro", 3000.0, 1)]));
        let mut c = criteria(Some("Cascatinha"), Some(500.0), Some(4));
        c.listing_id = Slot::Value(ListingId(42));
        let outcome = retriever(Arc::clone(&catalog)).retrieve(&c, false, &[]).unwrap();
        assert_eq!(outcome.tier, RetrievalTier::Exact);
        assert_eq!(outcome.ids(), vec![ListingId(42)]);
        assert_eq!(catalog.query_count(), 0);

        c.listing_id = Slot::Value(ListingId(7));
        let outcome = retriever(catalog).retrieve(&c, false, &[]).unwrap();
        assert!(outcome.is_empty());
        assert_eq!(outcome.tier, RetrievalTier::Exact);
    }

    // ---- Ranking ----

    #[test]
    fn test_ranking_by_total_cost_then_id() {
        let mut a = listing(3, "Centro", 1000.0, 1);
        a.condo_fee = 300.0;
        let b = listing(2, "Centro", 1300.0, 1);
        let c = listing(1, "Centro", 1300.0, 1);
        let d = listing(4, "Centro", 800.0, 1);
        let e = listing(5, "Centro", 5000.0, 1);
        let catalog = Arc::new(MemoryCatalog::new(vec![a, b, c, d, e]));

        let outcome = retriever(catalog)
            .retrieve(&criteria(Some("Centro"), None, Some(1)), false, &[])
            .unwrap();
        assert_eq!(
            outcome.ids(),
            vec![ListingId(4), ListingId(1), ListingId(2), ListingId(3)]
        );
    }

    // ---- Keywords ----

    #[test]
    fn test_keywords_restrict_candidates() {
        let catalog = Arc::new(MemoryCatalog::new(vec![
            listing(1, "Centro", 1000.0, 1),
            listing(2, "Centro", 900.0, 1),
        ]));
        let index = Arc::new(FixedIndex {
            ids: vec![ListingId(1)],
            calls: AtomicUsize::new(0),
        });
        let retriever = TieredRetriever::new(
            catalog,
            Some(index.clone() as Arc<dyn FullTextIndex>),
            4,
            200,
        );
        let c = Criteria {
            keywords: Slot::Value(["piscina".to_string()].into_iter().collect()),
            ..Criteria::default()
        };
        let outcome = retriever.retrieve(&c, false, &[]).unwrap();
        assert_eq!(outcome.tier, RetrievalTier::Exact);
        assert_eq!(outcome.ids(), vec![ListingId(1)]);
        assert!(!outcome.keywords_dropped);
        assert_eq!(index.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_index_failure_degrades_to_structured_only() {
        let catalog = Arc::new(MemoryCatalog::new(vec![
            listing(1, "Centro", 1000.0, 2),
            listing(2, "Centro", 900.0, 1),
        ]));
        let index: Arc<dyn FullTextIndex> = Arc::new(BrokenIndex);
        let retriever = TieredRetriever::new(catalog, Some(index), 4, 200);
        let c = Criteria {
            min_rooms: Slot::Value(2),
            keywords: Slot::Value(["piscina".to_string()].into_iter().collect()),
            ..criteria(Some("Centro"), None, None)
        };
        let outcome = retriever.retrieve(&c, false, &[]).unwrap();
        assert!(outcome.keywords_dropped);
        assert_eq!(outcome.tier, RetrievalTier::Exact);
        assert_eq!(outcome.ids(), vec![ListingId(1)]);
    }

    // ---- Failures ----

    #[test]
    fn test_catalog_failure_is_an_error() {
        let retriever = retriever(Arc::new(MemoryCatalog::failing()));
        let c = criteria(Some("Centro"), Some(1000.0), None);
        let result = retriever.retrieve(&c, false, &[]);
        assert!(matches!(result, Err(ChatError::Catalog(_))));
    }
}
