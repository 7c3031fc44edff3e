//! Per-conversation state and the table that isolates it.
//!
//! Every session id owns its own [`SessionState`] behind its own async
//! lock, so turns of one conversation run strictly in sequence while
//! different conversations never observe each other's criteria.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Local;
use tracing::debug;

use hearth_core::types::{Listing, ListingId};

use crate::types::{ChatMessage, Criteria, Role, SessionId};

// =============================================================================
// RememberedListings
// =============================================================================

/// Fixed-capacity, presentation-ordered memory of shown listings.
///
/// Pushing past capacity evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct RememberedListings {
    capacity: usize,
    items: VecDeque<Listing>,
}

impl RememberedListings {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a listing, returning the evicted one if full.
    pub fn push(&mut self, listing: Listing) -> Option<Listing> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(listing);
        evicted
    }

    /// Forget everything and remember `listings` instead.
    pub fn replace_with<I: IntoIterator<Item = Listing>>(&mut self, listings: I) {
        self.items.clear();
        for listing in listings {
            self.push(listing);
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn contains(&self, id: ListingId) -> bool {
        self.items.iter().any(|l| l.id == id)
    }

    pub fn get(&self, index: usize) -> Option<&Listing> {
        self.items.get(index)
    }

    pub fn last(&self) -> Option<&Listing> {
        self.items.back()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Listing> {
        self.items.iter()
    }

    pub fn ids(&self) -> Vec<ListingId> {
        self.items.iter().map(|l| l.id).collect()
    }
}

// =============================================================================
// SessionState
// =============================================================================

/// Everything one conversation remembers between turns.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub criteria: Criteria,
    pub last_shown: RememberedListings,
    pub focused: Option<Listing>,
    /// Listings already passed over by requests for other options.
    pub excluded: BTreeSet<ListingId>,
    pub history: Vec<ChatMessage>,
    pub turn_count: u32,
    pub started_at: i64,
    pub last_turn_at: i64,
}

impl SessionState {
    pub fn new(remembered_capacity: usize) -> Self {
        let now = Local::now().timestamp();
        Self {
            criteria: Criteria::default(),
            last_shown: RememberedListings::new(remembered_capacity),
            focused: None,
            excluded: BTreeSet::new(),
            history: Vec::new(),
            turn_count: 0,
            started_at: now,
            last_turn_at: now,
        }
    }

    /// A focused or remembered listing exists.
    pub fn has_memory(&self) -> bool {
        self.focused.is_some() || !self.last_shown.is_empty()
    }

    /// Drop the focused listing, everything remembered and the exclusions.
    pub fn reset_memory_on_new_search(&mut self) {
        self.focused = None;
        self.last_shown.clear();
        self.excluded.clear();
    }

    /// Everything excluded so far plus what is on screen now.
    pub fn exclusions_for_other_options(&self) -> BTreeSet<ListingId> {
        let mut excluded = self.excluded.clone();
        excluded.extend(self.last_shown.iter().map(|l| l.id));
        excluded.extend(self.focused.as_ref().map(|l| l.id));
        excluded
    }

    /// Remember a fresh result set; nothing is focused afterwards.
    pub fn remember_results(&mut self, listings: Vec<Listing>) {
        self.last_shown.replace_with(listings);
        self.focused = None;
    }

    pub fn focus(&mut self, listing: Listing) {
        self.focused = Some(listing);
    }

    /// Append to the rolling history, keeping at most `max_messages`.
    pub fn record_message(&mut self, role: Role, content: &str, max_messages: usize) {
        self.history.push(ChatMessage {
            role,
            content: content.to_string(),
            created_at: Local::now().timestamp(),
        });
        while self.history.len() > max_messages {
            self.history.remove(0);
        }
    }

    /// Mark a turn as processed.
    pub fn touch(&mut self) {
        self.turn_count += 1;
        self.last_turn_at = Local::now().timestamp();
    }

    pub fn is_expired(&self, now: i64, timeout_minutes: u32) -> bool {
        now - self.last_turn_at > i64::from(timeout_minutes) * 60
    }
}

// =============================================================================
// SessionTable
// =============================================================================

pub type SessionHandle = Arc<tokio::sync::Mutex<SessionState>>;

/// Session id to isolated state, created lazily, expired when idle.
pub struct SessionTable {
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
    remembered_capacity: usize,
    timeout_minutes: u32,
}

impl SessionTable {
    pub fn new(remembered_capacity: usize, timeout_minutes: u32) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            remembered_capacity,
            timeout_minutes,
        }
    }

    /// Handle for `id`, creating (or replacing an expired) entry.
    pub fn get_or_create(&self, id: &SessionId) -> SessionHandle {
        let now = Local::now().timestamp();
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(handle) = sessions.get(id) {
            let expired = handle
                .try_lock()
                .map(|state| state.is_expired(now, self.timeout_minutes))
                .unwrap_or(false);
            if !expired {
                return Arc::clone(handle);
            }
            debug!(session_id = %id, "Session expired, starting fresh");
        }

        let handle = Arc::new(tokio::sync::Mutex::new(SessionState::new(
            self.remembered_capacity,
        )));
        sessions.insert(id.clone(), Arc::clone(&handle));
        handle
    }

    pub fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Returns whether the session existed.
    pub fn remove(&self, id: &SessionId) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop idle sessions. Sessions mid-turn are never purged.
    pub fn purge_expired(&self, now: i64) -> usize {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let before = sessions.len();
        sessions.retain(|_, handle| {
            handle
                .try_lock()
                .map(|state| !state.is_expired(now, self.timeout_minutes))
                .unwrap_or(true)
        });
        before - sessions.len()
    }
}
