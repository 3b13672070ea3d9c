// Conversation index: one entry per peer holding that peer's latest message,
// most recent activity first.

use std::collections::HashSet;

use super::models::{other_party, ConversationEntry, Direction, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// First message seen for this peer.
    Inserted,
    /// Replaced the peer's previous entry and moved it to the front.
    Promoted,
    /// Same message id already indexed; nothing changed.
    Duplicate,
    /// The indexed entry is strictly newer.
    Stale,
    /// The local user is not a party to the message.
    Foreign,
}

impl ApplyOutcome {
    pub fn changed(self) -> bool {
        matches!(self, ApplyOutcome::Inserted | ApplyOutcome::Promoted)
    }
}

#[derive(Debug, Default, Clone)]
pub struct ConversationIndex {
    entries: Vec<ConversationEntry>,
}

impl ConversationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, peer_id: &str) -> Option<&ConversationEntry> {
        self.entries.iter().find(|e| e.peer_id == peer_id)
    }

    fn position(&self, peer_id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.peer_id == peer_id)
    }

    /// Replace the table wholesale with a backend snapshot. The backend already
    /// orders rows by recency; duplicate peers keep their first row.
    pub fn load_snapshot(&mut self, messages: Vec<Message>, self_id: &str) -> usize {
        let mut seen = HashSet::new();
        self.entries = messages
            .into_iter()
            .filter_map(|m| {
                let entry = ConversationEntry::from_message(m, self_id);
                if entry.is_none() {
                    tracing::debug!("snapshot row without local user, skipping");
                }
                entry
            })
            .filter(|e| seen.insert(e.peer_id.clone()))
            .collect();
        self.entries.len()
    }

    pub fn apply_incoming_message(&mut self, message: Message, self_id: &str) -> ApplyOutcome {
        let Some(peer_id) = other_party(&message, self_id).map(|p| p.id().to_string()) else {
            return ApplyOutcome::Foreign;
        };

        let mut outcome = ApplyOutcome::Inserted;
        let mut known_peer = None;
        if let Some(idx) = self.position(&peer_id) {
            let existing = &self.entries[idx];
            if existing.last_message.id == message.id {
                return ApplyOutcome::Duplicate;
            }
            if existing.last_message.sent_at > message.sent_at {
                return ApplyOutcome::Stale;
            }
            let removed = self.entries.remove(idx);
            known_peer = removed.peer;
            outcome = ApplyOutcome::Promoted;
        }

        let Some(mut entry) = ConversationEntry::from_message(message, self_id) else {
            return ApplyOutcome::Foreign;
        };
        // Realtime payloads often carry bare ids; keep the profile we already had.
        if entry.peer.is_none() {
            entry.peer = known_peer;
        }
        self.entries.insert(0, entry);
        outcome
    }

    /// Returns whether anything changed.
    pub fn mark_peer_read(&mut self, peer_id: &str) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.peer_id == peer_id) else {
            return false;
        };
        let changed = entry.unread_count != 0 || !entry.is_read;
        entry.unread_count = 0;
        entry.is_read = true;
        changed
    }

    pub fn has_unread(&self, peer_id: &str) -> bool {
        self.get(peer_id).is_some_and(|e| {
            e.unread_count > 0 || (e.direction == Direction::Received && !e.is_read)
        })
    }

    pub fn remove_peer(&mut self, peer_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.peer_id != peer_id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
