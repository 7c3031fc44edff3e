//! Criteria extraction.
//!
//! Turns one raw utterance into a partial [`Criteria`]. Extraction is a
//! fixed, ordered list of independent [`ExtractionRule`]s whose outputs are
//! combined field by field (first non-`Unset` wins). It never fails: anything
//! that does not parse simply stays `Unset`.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::{Captures, Regex};

use hearth_core::config::SearchConfig;
use hearth_core::types::ListingId;

use crate::context::detect_property_type;
use crate::normalize::{normalize, LevenshteinRatio, SimilarityScorer};
use crate::types::{Criteria, Slot};

// =============================================================================
// Compiled patterns (all matched against normalized text)
// =============================================================================

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(?:listings?|imovel|imoveis)/(\d+)\b").unwrap());

static CLEAR_NEIGHBORHOOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:another|other|different|any)\s+(?:neighbou?rhoods?|areas?|regions?)\b|\b(?:outros?|outras?|qualquer)\s+(?:bairros?|regiao|regioes)\b",
    )
    .unwrap()
});

static ROOMS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(\d{1,2}|one|two|three|four|five|um|uma|dois|duas|tres|quatro|cinco)[\s-]*(?:bed)?(?:rooms?|quartos?|dorms?|dormitorios?)\b",
    )
    .unwrap()
});

const AMOUNT: &str = r"(?:r?\$\s*)?(\d{1,3}(?:[.,]\d{3})+(?:[.,]\d{1,2})?|\d+(?:[.,]\d{1,2})?)\s*(k|mil)?\b";

static PRICE_CEILING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b(?:up\s+to|max(?:imum)?|under|below|less\s+than|at\s+most|budget(?:\s+(?:of|is))?|ate|no\s+maximo|menos\s+de|orcamento(?:\s+de)?)\s*(?:of\s+|de\s+)?{}",
        AMOUNT
    ))
    .unwrap()
});

static PRICE_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b(?:between|entre)\s*{}\s*(?:and|e|a|-)\s*{}",
        AMOUNT, AMOUNT
    ))
    .unwrap()
});

static ROOM_WORD_AHEAD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\s-]*(?:bed)?(?:rooms?|quartos?|dorms?|dormitorios?|banheiros?|bathrooms?|vagas?)\b")
        .unwrap()
});

static PETS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:pets?|dogs?|cats?|animals?|animais|cachorros?|gatos?|gatas?|caes|cao)\b")
        .unwrap()
});

static BROWSE_ALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:show\s+(?:me\s+)?(?:everything|all(?:\s+of\s+them)?)|all\s+(?:the\s+)?(?:listings|properties)|everything\s+you\s+have|todos\s+os\s+imoveis|todas\s+as\s+opcoes|tudo\s+(?:o\s+)?que\s+(?:voce\s+)?tem|mostr[ae]\s+tudo|ver\s+tudo)\b",
    )
    .unwrap()
});

static OTHER_OPTIONS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:(?:other|more|different)\s+(?:options|listings|places|properties)|show\s+me\s+(?:other|more|different)|something\s+else|anything\s+else|outras?\s+opco?es|mais\s+opco?es|outros\s+imoveis|outro\s+imovel|outro\s+lugar)\b",
    )
    .unwrap()
});

static SEARCH_INTENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:apartments?|apartamentos?|aptos?|houses?|casas?|homes?|studios?|estudios?|kitnets?|kitinetes?|lofts?|penthouses?|coberturas?|flats?|imoveis|imovel|rent|renting|rental|want|looking\s+for|find|search|procuro|procurando|busco|quero|queria|alugar|aluguel)\b",
    )
    .unwrap()
});

/// Words that never become free-text keywords (normalized, no diacritics).
static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // greetings and courtesy
        "hello", "hey", "good", "morning", "afternoon", "evening", "night", "please", "thanks",
        "thank", "okay", "yes", "ola", "boa", "bom", "dia", "tarde", "noite", "obrigado",
        "obrigada", "valeu", "favor", "sim", "nao", "tudo", "bem",
        // filler and vague approval
        "anything", "something", "whatever", "fine", "nice", "great", "cool", "good", "okay",
        "maybe", "perhaps", "now", "then", "cheap", "cheaper", "cheapest", "else", "more",
        "less", "better", "best", "ideal", "perfect", "legal", "otimo", "beleza", "talvez",
        "agora", "barato", "barata", "baratos", "baratas", "mais", "melhor", "qualquer",
        "coisa", "tipo", "serve",
        // pronouns, articles and connectives
        "you", "your", "yours", "the", "and", "for", "with", "without", "this", "that", "these",
        "those", "there", "here", "its", "they", "them", "our", "mine", "some", "any", "from",
        "near", "about", "just", "also", "but", "not", "too", "very", "really", "voce", "voces",
        "ele", "ela", "eles", "elas", "isso", "isto", "esse", "essa", "este", "esta", "aqui",
        "ali", "meu", "minha", "seu", "sua", "uma", "uns", "umas", "dos", "das", "nos", "nas",
        "num", "numa", "com", "sem", "para", "pra", "por", "que", "mas", "muito", "algo",
        "algum", "alguma", "perto",
        // question words
        "what", "which", "who", "how", "where", "when", "why", "qual", "quais", "quanto",
        "quanta", "como", "onde", "quando",
        // verbs of wanting and looking
        "want", "would", "like", "looking", "look", "need", "find", "show", "search", "get",
        "see", "let", "know", "tell", "give", "can", "could", "does", "have", "has", "are",
        "was", "will", "quero", "queria", "gostaria", "procuro", "procurando", "busco",
        "preciso", "tem", "ter", "tenho", "mostre", "mostra", "mostrar", "ver", "saber",
        "pode", "poderia", "alugar", "rent", "renting", "rental",
        // generic real-estate filler
        "property", "properties", "listing", "listings", "option", "options", "place",
        "apartment", "apartments", "house", "houses", "home", "homes", "studio", "studios",
        "loft", "lofts", "penthouse", "penthouses", "flat", "flats", "kitnet", "kitnets",
        "kitinete", "kitinetes", "apto", "aptos", "apartamento", "apartamentos", "casa", "casas",
        "estudio", "estudios", "cobertura", "coberturas", "imovel", "imoveis", "lugar",
        "opcao", "opcoes", "neighborhood", "neighborhoods", "neighbourhood", "area", "areas",
        "region", "another", "other", "different", "bairro", "bairros", "regiao", "outro",
        "outros", "outra", "outras", "qualquer", "room", "rooms", "bedroom", "bedrooms",
        "dorm", "dorms", "quarto", "quartos", "dormitorio", "dormitorios", "everything",
        "all", "todos", "todas",
        // price words
        "price", "budget", "month", "monthly", "per", "reais", "real", "dollars", "under",
        "below", "max", "maximum", "most", "less", "than", "between", "up", "valor", "preco",
        "orcamento", "mes", "mensal", "mensais", "ate", "maximo", "menos", "mais", "entre",
        "mil",
        // pet words
        "pet", "pets", "dog", "dogs", "cat", "cats", "animal", "animals", "animais",
        "cachorro", "cachorros", "gato", "gatos", "gata", "gatas", "cao", "caes",
        // number words
        "one", "two", "three", "four", "five", "dois", "duas", "tres", "quatro", "cinco",
    ]
    .into_iter()
    .collect()
});

// =============================================================================
// Vocabulary
// =============================================================================

#[derive(Debug, Clone)]
struct VocabularyEntry {
    display: String,
    normalized: String,
    char_len: usize,
}

/// Distinct neighborhood names known to the catalog, with their normalized
/// forms precomputed. Order is preserved and breaks ties.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    entries: Vec<VocabularyEntry>,
}

impl Vocabulary {
    /// Build from catalog names, skipping blanks and normalized duplicates.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let entries = names
            .into_iter()
            .map(Into::<String>::into)
            .filter_map(|display| {
                let display = display.trim().to_string();
                let normalized = normalize(&display);
                if normalized.is_empty() || !seen.insert(normalized.clone()) {
                    return None;
                }
                let char_len = normalized.chars().count();
                Some(VocabularyEntry {
                    display,
                    normalized,
                    char_len,
                })
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Display names in vocabulary order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.display.as_str())
    }
}

// =============================================================================
// Utterance
// =============================================================================

/// An utterance prepared once for all rules.
#[derive(Debug, Clone)]
pub struct Utterance {
    normalized: String,
}

impl Utterance {
    pub fn new(raw: &str) -> Self {
        Self {
            normalized: normalize(raw),
        }
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Alphanumeric words of the normalized text.
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.normalized
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
    }
}

// =============================================================================
// Extraction output
// =============================================================================

/// Everything one utterance yields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub criteria: Criteria,
    /// Explicit "show everything" request.
    pub browse_all: bool,
    /// Property-type words or search verbs were present.
    pub search_intent: bool,
    /// Asks for listings other than the ones already shown.
    pub other_options: bool,
}

impl Extraction {
    pub fn direct_link(&self) -> Option<ListingId> {
        self.criteria.listing_id.value().copied()
    }
}

// =============================================================================
// Rules
// =============================================================================

/// One independent, pure extraction step.
pub trait ExtractionRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, utterance: &Utterance, vocabulary: &Vocabulary) -> Criteria;
}

/// `/listing/<id>` style links.
pub struct DirectLinkRule;

impl ExtractionRule for DirectLinkRule {
    fn name(&self) -> &'static str {
        "direct_link"
    }

    fn apply(&self, utterance: &Utterance, _vocabulary: &Vocabulary) -> Criteria {
        let listing_id = LINK_RE
            .captures(utterance.normalized())
            .and_then(|caps| caps[1].parse::<i64>().ok())
            .map_or(Slot::Unset, |id| Slot::Value(ListingId(id)));
        Criteria {
            listing_id,
            ..Criteria::default()
        }
    }
}

/// Neighborhood by clearing phrase, exact match, approximate match, then
/// free-text keywords when no neighborhood is recognized.
pub struct NeighborhoodRule {
    scorer: Box<dyn SimilarityScorer>,
    threshold: f64,
    margin: usize,
}

impl NeighborhoodRule {
    pub fn new(scorer: Box<dyn SimilarityScorer>, threshold: f64, margin: usize) -> Self {
        Self {
            scorer,
            threshold,
            margin,
        }
    }

    /// Longest word-bounded match; ties keep the earlier vocabulary entry.
    fn exact_match<'v>(&self, text: &str, vocabulary: &'v Vocabulary) -> Option<&'v str> {
        let mut best: Option<&VocabularyEntry> = None;
        for entry in &vocabulary.entries {
            if !contains_word_bounded(text, &entry.normalized) {
                continue;
            }
            if best.map_or(true, |b| entry.char_len > b.char_len) {
                best = Some(entry);
            }
        }
        best.map(|e| e.display.as_str())
    }

    /// Best-scoring window over all candidates of at least four characters.
    /// Windows start and end on word boundaries.
    fn fuzzy_match<'v>(&self, text: &str, vocabulary: &'v Vocabulary) -> Option<&'v str> {
        let chars: Vec<char> = text.chars().collect();
        let starts: Vec<usize> = (0..chars.len())
            .filter(|&i| chars[i].is_alphanumeric() && (i == 0 || !chars[i - 1].is_alphanumeric()))
            .collect();

        let mut best: Option<(f64, &VocabularyEntry)> = None;
        for entry in vocabulary.entries.iter().filter(|e| e.char_len >= 4) {
            let min_width = entry.char_len.saturating_sub(self.margin).max(1);
            let max_width = entry.char_len + self.margin;
            for &start in &starts {
                for width in min_width..=max_width {
                    let end = start + width;
                    if end > chars.len() {
                        break;
                    }
                    if !is_word_end(&chars, end) {
                        continue;
                    }
                    let window: String = chars[start..end].iter().collect();
                    let score = self.scorer.score(&window, &entry.normalized);
                    if best.map_or(true, |(s, _)| score > s) {
                        best = Some((score, entry));
                    }
                }
            }
        }

        best.filter(|(score, _)| *score >= self.threshold)
            .map(|(_, entry)| entry.display.as_str())
    }

    fn keywords(&self, utterance: &Utterance) -> Slot<BTreeSet<String>> {
        let keywords: BTreeSet<String> = utterance
            .words()
            .filter(|w| w.chars().count() >= 3 && w.chars().all(char::is_alphabetic))
            .filter(|w| !STOP_WORDS.contains(w))
            .map(str::to_string)
            .collect();
        if keywords.is_empty() {
            Slot::Unset
        } else {
            Slot::Value(keywords)
        }
    }
}

impl ExtractionRule for NeighborhoodRule {
    fn name(&self) -> &'static str {
        "neighborhood"
    }

    fn apply(&self, utterance: &Utterance, vocabulary: &Vocabulary) -> Criteria {
        let text = utterance.normalized();

        let matched = self
            .exact_match(text, vocabulary)
            .or_else(|| self.fuzzy_match(text, vocabulary));

        // A recognized neighborhood starts a fresh structured search, so
        // keywords from earlier turns are dropped.
        if let Some(name) = matched {
            return Criteria {
                neighborhood: Slot::Value(name.to_string()),
                keywords: Slot::Cleared,
                ..Criteria::default()
            };
        }

        let neighborhood = if CLEAR_NEIGHBORHOOD_RE.is_match(text) {
            Slot::Cleared
        } else {
            Slot::Unset
        };
        Criteria {
            neighborhood,
            keywords: self.keywords(utterance),
            ..Criteria::default()
        }
    }
}

/// `<N> rooms` in digits or words.
pub struct RoomsRule;

impl ExtractionRule for RoomsRule {
    fn name(&self) -> &'static str {
        "rooms"
    }

    fn apply(&self, utterance: &Utterance, _vocabulary: &Vocabulary) -> Criteria {
        let min_rooms = ROOMS_RE
            .captures(utterance.normalized())
            .and_then(|caps| parse_count(&caps[1]))
            .map_or(Slot::Unset, Slot::Value);
        Criteria {
            min_rooms,
            ..Criteria::default()
        }
    }
}

/// "up to <amount>" style ceilings, else the high end of a range.
pub struct PriceRule;

impl ExtractionRule for PriceRule {
    fn name(&self) -> &'static str {
        "price"
    }

    fn apply(&self, utterance: &Utterance, _vocabulary: &Vocabulary) -> Criteria {
        let text = utterance.normalized();

        let ceiling = PRICE_CEILING_RE
            .captures_iter(text)
            .filter(|caps| !followed_by_room_word(text, caps))
            .find_map(|caps| amount_from(&caps, 1))
            .or_else(|| {
                PRICE_RANGE_RE
                    .captures_iter(text)
                    .filter(|caps| !followed_by_room_word(text, caps))
                    .find_map(|caps| amount_from(&caps, 3))
            });

        Criteria {
            price_ceiling: ceiling.map_or(Slot::Unset, Slot::Value),
            ..Criteria::default()
        }
    }
}

/// Apartment, house, studio and the other property types.
pub struct PropertyTypeRule;

impl ExtractionRule for PropertyTypeRule {
    fn name(&self) -> &'static str {
        "property_type"
    }

    fn apply(&self, utterance: &Utterance, _vocabulary: &Vocabulary) -> Criteria {
        Criteria {
            property_type: detect_property_type(utterance.normalized())
                .map_or(Slot::Unset, Slot::Value),
            ..Criteria::default()
        }
    }
}

/// Any pet word requires pet-friendly listings.
pub struct PetsRule;

impl ExtractionRule for PetsRule {
    fn name(&self) -> &'static str {
        "pets"
    }

    fn apply(&self, utterance: &Utterance, _vocabulary: &Vocabulary) -> Criteria {
        let pets_required = if PETS_RE.is_match(utterance.normalized()) {
            Slot::Value(true)
        } else {
            Slot::Unset
        };
        Criteria {
            pets_required,
            ..Criteria::default()
        }
    }
}

// =============================================================================
// CriteriaExtractor
// =============================================================================

/// Runs the rule list over an utterance.
pub struct CriteriaExtractor {
    link_rule: DirectLinkRule,
    rules: Vec<Box<dyn ExtractionRule>>,
}

impl CriteriaExtractor {
    /// Default rules with the edit-distance scorer.
    pub fn new(config: &SearchConfig) -> Self {
        Self::with_scorer(config, Box::new(LevenshteinRatio))
    }

    pub fn with_scorer(config: &SearchConfig, scorer: Box<dyn SimilarityScorer>) -> Self {
        Self {
            link_rule: DirectLinkRule,
            rules: vec![
                Box::new(NeighborhoodRule::new(
                    scorer,
                    config.fuzzy_threshold,
                    config.fuzzy_margin,
                )),
                Box::new(PropertyTypeRule),
                Box::new(RoomsRule),
                Box::new(PriceRule),
                Box::new(PetsRule),
            ],
        }
    }

    /// Extract criteria and side signals from one utterance.
    pub fn extract(&self, raw: &str, vocabulary: &Vocabulary) -> Extraction {
        let utterance = Utterance::new(raw);

        let link = self.link_rule.apply(&utterance, vocabulary);
        if link.listing_id.is_value() {
            return Extraction {
                criteria: link,
                browse_all: false,
                search_intent: true,
                other_options: false,
            };
        }

        let criteria = self
            .rules
            .iter()
            .map(|rule| {
                let partial = rule.apply(&utterance, vocabulary);
                tracing::trace!(rule = rule.name(), ?partial, "Extraction rule applied");
                partial
            })
            .fold(Criteria::default(), Criteria::or);

        let text = utterance.normalized();
        Extraction {
            criteria,
            browse_all: BROWSE_ALL_RE.is_match(text),
            search_intent: SEARCH_INTENT_RE.is_match(text),
            other_options: OTHER_OPTIONS_RE.is_match(text),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn contains_word_bounded(text: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    text.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before_ok = text[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = text[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

fn is_word_end(chars: &[char], end: usize) -> bool {
    end > 0
        && chars[end - 1].is_alphanumeric()
        && chars.get(end).map_or(true, |c| !c.is_alphanumeric())
}

fn parse_count(token: &str) -> Option<u32> {
    match token {
        "one" | "um" | "uma" => Some(1),
        "two" | "dois" | "duas" => Some(2),
        "three" | "tres" => Some(3),
        "four" | "quatro" => Some(4),
        "five" | "cinco" => Some(5),
        digits => digits.parse().ok(),
    }
}

/// "até 2 quartos" is a room count, not a budget.
fn followed_by_room_word(text: &str, caps: &Captures<'_>) -> bool {
    caps.get(0)
        .is_some_and(|m| ROOM_WORD_AHEAD_RE.is_match(&text[m.end()..]))
}

/// Reads the amount at capture group `group` and its multiplier at `group + 1`.
fn amount_from(caps: &Captures<'_>, group: usize) -> Option<f64> {
    let value = parse_amount(caps.get(group)?.as_str())?;
    let multiplier = if caps.get(group + 1).is_some() {
        1000.0
    } else {
        1.0
    };
    Some(value * multiplier)
}

/// Parses `1500`, `1.500`, `1,500`, `1.500,50`, `1,500.50` and `1,5`.
fn parse_amount(raw: &str) -> Option<f64> {
    let last_sep = raw.rfind(['.', ',']);
    let canonical: String = match last_sep {
        None => raw.to_string(),
        Some(pos) => {
            let decimals = raw.len() - pos - 1;
            let separators = raw.matches(['.', ',']).count();
            let has_both = raw.contains('.') && raw.contains(',');
            let is_decimal = has_both || (separators == 1 && decimals != 3);
            if is_decimal {
                let (int_part, frac_part) = raw.split_at(pos);
                let int_digits: String = int_part.chars().filter(char::is_ascii_digit).collect();
                format!("{}.{}", int_digits, &frac_part[1..])
            } else {
                raw.chars().filter(char::is_ascii_digit).collect()
            }
        }
    };
    canonical.parse().ok()
}
