//! Peer label table.
//!
//! The authority owns the roster and is the only role that mutates it
//! from session events; each peer keeps a read-mostly mirror updated
//! from refresh frames. Slots are positional: a slot can exist without
//! an occupant (a vacated seat), in which case it carries an empty
//! label and is skipped by the sync protocol.

use crate::channel::PeerId;

/// One roster slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub id: PeerId,
    /// Display label, at most 255 ASCII bytes. Empty when vacant.
    pub label: String,
    /// False means the slot exists but has no active occupant.
    pub controlled: bool,
}

impl PeerRecord {
    pub fn occupied(id: PeerId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            controlled: true,
        }
    }

    pub fn vacant(id: PeerId) -> Self {
        Self {
            id,
            label: String::new(),
            controlled: false,
        }
    }
}

/// Ordered slot table.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    slots: Vec<PeerRecord>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole table. The table is always rebuilt, never
    /// incrementally patched, so a broadcast can never observe a size
    /// that went stale mid-session.
    pub fn rebuild(&mut self, slots: Vec<PeerRecord>) {
        self.slots = slots;
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[PeerRecord] {
        &self.slots
    }

    pub fn get(&self, index: usize) -> Option<&PeerRecord> {
        self.slots.get(index)
    }

    /// Index of the slot occupied by `peer`, if any.
    pub fn slot_of(&self, peer: PeerId) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.controlled && s.id == peer)
    }

    /// Occupied slots, in order.
    pub fn controlled(&self) -> impl Iterator<Item = &PeerRecord> {
        self.slots.iter().filter(|s| s.controlled)
    }

    /// Set the label on a slot. Returns false when the index is out of
    /// range; callers warn and carry on.
    pub fn set_label(&mut self, index: usize, label: String) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                slot.label = label;
                true
            }
            None => false,
        }
    }

    /// Append a newly occupied slot for a joining peer and return its index.
    pub fn push_occupied(&mut self, peer: PeerId, label: impl Into<String>) -> usize {
        self.slots.push(PeerRecord::occupied(peer, label));
        self.slots.len() - 1
    }

    /// Vacate the slot held by `peer`. The slot stays in the table so
    /// positional indices remain stable for everyone else.
    pub fn vacate(&mut self, peer: PeerId) -> bool {
        match self.slot_of(peer) {
            Some(index) => {
                self.slots[index] = PeerRecord::vacant(self.slots[index].id);
                true
            }
            None => false,
        }
    }

    /// Per-slot labels in encoding form: `None` for vacant slots.
    pub fn labels(&self) -> Vec<Option<&str>> {
        self.slots
            .iter()
            .map(|s| s.controlled.then_some(s.label.as_str()))
            .collect()
    }
}
