//! Session records and their intrusive per-state expiration lists.
//!
//! Doubly-linked expiration lists with cross-references from a map don't
//! translate directly into a borrow-checked language. This module
//! re-architects them as an arena of [`SessionEntry`] values addressed by
//! stable [`ArenaIndex`] handles: the primary map stores indices, list links
//! store indices, and removal is O(1) with no lifetime entanglement.

pub mod store;

use crate::packet::{Avp, PacketType};
use std::time::SystemTime;

pub use store::SessionStore;

/// Stable handle into the session arena. Never reused while an entry is
/// live; the slot is only recycled after `expire`/removal frees it.
pub type ArenaIndex = usize;

/// One of the three per-state expiration lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Accept,
    Active,
    Stopped,
}

impl ListKind {
    pub fn for_packet_type(pt: PacketType) -> Self {
        match pt {
            PacketType::AcceptPending => Self::Accept,
            PacketType::Started | PacketType::Interim => Self::Active,
            PacketType::Stopped => Self::Stopped,
        }
    }
}

/// The per-session record.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub id: String,
    pub packet_type: PacketType,
    pub attributes: Vec<Avp>,
    pub last_updated: SystemTime,
    pub expires_at: SystemTime,
    pub seen_by: Vec<String>,

    /// Merge tie-break fields carried forward from the accepted packet:
    /// `Acct-Session-Time` and `Event-Timestamp`, parsed to integers where
    /// present so later updates can be compared without re-parsing the
    /// projected attribute list.
    pub acct_session_time: i64,
    pub event_timestamp: i64,

    /// Which expiration list this entry currently lives in.
    list_kind: ListKind,
    prev: Option<ArenaIndex>,
    next: Option<ArenaIndex>,
}

impl SessionEntry {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }
}

/// An owned, cloneable projection of a session's attributes, returned from
/// queries so callers never hold a reference into the live arena.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SessionSnapshot {
    pub attributes: Vec<Avp>,
}

impl SessionSnapshot {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }
}

impl From<&SessionEntry> for SessionSnapshot {
    fn from(entry: &SessionEntry) -> Self {
        Self {
            attributes: entry.attributes.clone(),
        }
    }
}

/// Intrusive doubly-linked list of arena indices, ordered (approximately)
/// by insertion / `expires_at`.
#[derive(Debug, Default)]
pub(crate) struct ExpirationList {
    head: Option<ArenaIndex>,
    tail: Option<ArenaIndex>,
}

impl ExpirationList {
    pub fn head(&self) -> Option<ArenaIndex> {
        self.head
    }
}

/// The arena owning all live [`SessionEntry`] slots plus the three
/// expiration lists threading through them. Kept separate from
/// [`SessionStore`] only so list/arena bookkeeping reads as a unit;
/// `SessionStore` is the sole owner and sole caller of every method here.
#[derive(Debug)]
pub(crate) struct Arena {
    slots: Vec<Option<SessionEntry>>,
    free: Vec<ArenaIndex>,
    lists: [ExpirationList; 3],
}

impl Default for Arena {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            lists: [
                ExpirationList::default(),
                ExpirationList::default(),
                ExpirationList::default(),
            ],
        }
    }
}

impl Arena {
    fn list_mut(&mut self, kind: ListKind) -> &mut ExpirationList {
        &mut self.lists[kind as usize]
    }

    pub fn list_head(&self, kind: ListKind) -> Option<ArenaIndex> {
        self.lists[kind as usize].head
    }

    pub fn get(&self, idx: ArenaIndex) -> Option<&SessionEntry> {
        self.slots.get(idx).and_then(|s| s.as_ref())
    }

    /// Insert a new entry at the tail of its state's list.
    pub fn insert(&mut self, mut entry: SessionEntry, kind: ListKind) -> ArenaIndex {
        entry.list_kind = kind;
        entry.prev = None;
        entry.next = None;

        let idx = if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(entry);
            idx
        } else {
            self.slots.push(Some(entry));
            self.slots.len() - 1
        };

        self.link_tail(idx, kind);
        idx
    }

    fn link_tail(&mut self, idx: ArenaIndex, kind: ListKind) {
        let tail = self.list_mut(kind).tail;
        if let Some(tail) = tail {
            if let Some(Some(e)) = self.slots.get_mut(tail) {
                e.next = Some(idx);
            }
        } else {
            self.list_mut(kind).head = Some(idx);
        }
        if let Some(Some(e)) = self.slots.get_mut(idx) {
            e.prev = tail;
            e.next = None;
        }
        self.list_mut(kind).tail = Some(idx);
    }

    /// Unlink an entry from whichever list it currently belongs to, without
    /// removing it from the arena.
    pub fn unlink(&mut self, idx: ArenaIndex) {
        let Some(Some(entry)) = self.slots.get(idx).cloned() else {
            return;
        };
        let kind = entry.list_kind;
        let prev = entry.prev;
        let next = entry.next;

        match prev {
            Some(p) => {
                if let Some(Some(e)) = self.slots.get_mut(p) {
                    e.next = next;
                }
            }
            None => self.list_mut(kind).head = next,
        }
        match next {
            Some(n) => {
                if let Some(Some(e)) = self.slots.get_mut(n) {
                    e.prev = prev;
                }
            }
            None => self.list_mut(kind).tail = prev,
        }

        if let Some(Some(e)) = self.slots.get_mut(idx) {
            e.prev = None;
            e.next = None;
        }
    }

    /// Move an existing slot's payload to a new state list, replacing its
    /// contents in place (used on state transitions).
    pub fn replace_and_relink(&mut self, idx: ArenaIndex, mut entry: SessionEntry, kind: ListKind) {
        self.unlink(idx);
        entry.list_kind = kind;
        entry.prev = None;
        entry.next = None;
        self.slots[idx] = Some(entry);
        self.link_tail(idx, kind);
    }

    /// Remove a slot entirely, freeing it for reuse.
    pub fn remove(&mut self, idx: ArenaIndex) -> Option<SessionEntry> {
        self.unlink(idx);
        let entry = self.slots.get_mut(idx).and_then(|s| s.take());
        if entry.is_some() {
            self.free.push(idx);
        }
        entry
    }

    /// Next entry in the same list as `idx`, by walking the stored link —
    /// used by the purge loop to advance without borrowing `idx`'s slot
    /// across the removal of `idx` itself.
    pub fn next_in_list(&self, idx: ArenaIndex) -> Option<ArenaIndex> {
        self.get(idx).and_then(|e| e.next)
    }
}
