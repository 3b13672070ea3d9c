// Message thread for the currently open peer.

use std::collections::HashSet;

use chrono::{FixedOffset, NaiveDate};

use super::models::{other_party, Message};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    /// Snapshot fetch in flight; realtime arrivals wait in `pending`.
    Loading { pending: Vec<Message> },
    Ready,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReceipt {
    pub peer_id: String,
    pub message_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MessageThread {
    peer_id: String,
    self_id: String,
    messages: Vec<Message>,
    ids: HashSet<String>,
    phase: Phase,
}

impl MessageThread {
    pub fn open(peer_id: impl Into<String>, self_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            self_id: self_id.into(),
            messages: Vec::new(),
            ids: HashSet::new(),
            phase: Phase::Loading {
                pending: Vec::new(),
            },
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, Phase::Loading { .. })
    }

    pub fn load_error(&self) -> Option<&str> {
        match &self.phase {
            Phase::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Re-enter the loading phase keeping what is already shown; the next
    /// `load` merges the fresh snapshot with it.
    pub fn begin_refresh(&mut self) {
        let pending = std::mem::take(&mut self.messages);
        self.ids.clear();
        self.phase = Phase::Loading { pending };
    }

    /// Install the fetched history, ascending by `sent_at` with ties in
    /// arrival order, then replay anything buffered during the fetch.
    pub fn load(&mut self, mut fetched: Vec<Message>) {
        fetched.sort_by(|a, b| a.sent_at.cmp(&b.sent_at));
        let pending = match std::mem::replace(&mut self.phase, Phase::Ready) {
            Phase::Loading { pending } => pending,
            _ => Vec::new(),
        };
        self.messages.clear();
        self.ids.clear();
        for m in fetched.into_iter().chain(pending) {
            self.push_unique(m);
        }
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        let pending = match std::mem::replace(&mut self.phase, Phase::Failed(error.into())) {
            Phase::Loading { pending } => pending,
            _ => Vec::new(),
        };
        for m in pending {
            self.push_unique(m);
        }
    }

    pub fn append_incoming(&mut self, message: Message) -> bool {
        self.append(message)
    }

    /// The backend echo of a message the local user sent.
    pub fn append_outgoing_echo(&mut self, message: Message) -> bool {
        self.append(message)
    }

    fn append(&mut self, message: Message) -> bool {
        if !self.belongs(&message) {
            return false;
        }
        if let Phase::Loading { pending } = &mut self.phase {
            if pending.iter().any(|m| m.id == message.id) {
                return false;
            }
            pending.push(message);
            return true;
        }
        self.push_unique(message)
    }

    fn belongs(&self, message: &Message) -> bool {
        other_party(message, &self.self_id).is_some_and(|p| p.id() == self.peer_id)
    }

    fn push_unique(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }

    pub fn has_unread_from_peer(&self) -> bool {
        self.messages
            .iter()
            .any(|m| !m.is_read && m.is_from(&self.peer_id) && m.sender() != self.self_id)
    }

    /// Mark every unread message from the peer read locally and report which.
    pub fn close(&mut self) -> ReadReceipt {
        let mut message_ids = Vec::new();
        for m in &mut self.messages {
            if !m.is_read && m.is_from(&self.peer_id) && m.sender() != self.self_id {
                m.is_read = true;
                message_ids.push(m.id.clone());
            }
        }
        ReadReceipt {
            peer_id: self.peer_id.clone(),
            message_ids,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySeparator {
    /// Index into the message list of the first message of that day.
    pub index: usize,
    pub day: NaiveDate,
}

pub fn day_separators(messages: &[Message], offset: FixedOffset) -> Vec<DaySeparator> {
    let mut out: Vec<DaySeparator> = Vec::new();
    for (index, m) in messages.iter().enumerate() {
        let day = m.sent_at.with_timezone(&offset).date_naive();
        if out.last().map(|s| s.day) != Some(day) {
            out.push(DaySeparator { index, day });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::fixtures::message;

    const ME: &str = "bob";
    const PEER: &str = "alice";

    fn ids(thread: &MessageThread) -> Vec<&str> {
        thread.messages().iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn load_sorts_stably_by_sent_at() {
        let mut thread = MessageThread::open(PEER, ME);
        thread.load(vec![
            message("m3", PEER, ME, 1),
            message("m2", PEER, ME, 0),
            message("m1", ME, PEER, 0),
        ]);
        assert_eq!(ids(&thread), vec!["m2", "m1", "m3"]);
        assert!(!thread.is_loading());
    }

    #[test]
    fn realtime_messages_during_fetch_are_merged_after_load() {
        let mut thread = MessageThread::open(PEER, ME);
        assert!(thread.append_incoming(message("m3", PEER, ME, 30)));
        assert!(thread.messages().is_empty());
        thread.load(vec![message("m1", PEER, ME, 10), message("m3", PEER, ME, 30)]);
        assert_eq!(ids(&thread), vec!["m1", "m3"]);
    }

    #[test]
    fn append_never_reorders_and_ignores_replays() {
        let mut thread = MessageThread::open(PEER, ME);
        thread.load(vec![message("m1", PEER, ME, 10)]);
        assert!(thread.append_outgoing_echo(message("m2", ME, PEER, 5)));
        assert!(!thread.append_incoming(message("m1", PEER, ME, 10)));
        assert_eq!(ids(&thread), vec!["m1", "m2"]);
    }

    #[test]
    fn other_peers_messages_are_rejected() {
        let mut thread = MessageThread::open(PEER, ME);
        thread.load(vec![]);
        assert!(!thread.append_incoming(message("m1", "carol", ME, 10)));
        assert!(thread.messages().is_empty());
    }

    #[test]
    fn refresh_keeps_shown_messages() {
        let mut thread = MessageThread::open(PEER, ME);
        thread.load(vec![message("m1", PEER, ME, 10)]);
        thread.append_incoming(message("m2", PEER, ME, 20));
        thread.begin_refresh();
        thread.load(vec![message("m1", PEER, ME, 10), message("m3", PEER, ME, 15)]);
        assert_eq!(ids(&thread), vec!["m1", "m3", "m2"]);
    }

    #[test]
    fn failed_fetch_keeps_buffered_arrivals() {
        let mut thread = MessageThread::open(PEER, ME);
        thread.append_incoming(message("m1", PEER, ME, 10));
        thread.fail("offline");
        assert_eq!(thread.load_error(), Some("offline"));
        assert_eq!(ids(&thread), vec!["m1"]);
    }

    #[test]
    fn close_reports_only_unread_from_peer() {
        let mut thread = MessageThread::open(PEER, ME);
        let mut already_read = message("m1", PEER, ME, 10);
        already_read.is_read = true;
        thread.load(vec![
            already_read,
            message("m2", ME, PEER, 20),
            message("m3", PEER, ME, 30),
        ]);
        assert!(thread.has_unread_from_peer());
        let receipt = thread.close();
        assert_eq!(receipt.peer_id, PEER);
        assert_eq!(receipt.message_ids, vec!["m3".to_string()]);
        assert!(!thread.has_unread_from_peer());
        assert!(thread.close().message_ids.is_empty());
    }

    #[test]
    fn separators_follow_local_calendar_days() {
        let utc = FixedOffset::east_opt(0).unwrap();
        // fixtures start at 2023-11-14T22:13:20Z
        let messages = vec![
            message("m1", PEER, ME, 0),
            message("m2", PEER, ME, 3_600),
            message("m3", PEER, ME, 7_200),
        ];
        let seps = day_separators(&messages, utc);
        assert_eq!(seps.len(), 2);
        assert_eq!(seps[0].index, 0);
        assert_eq!(seps[1].index, 2);

        let west = FixedOffset::west_opt(5 * 3_600).unwrap();
        assert_eq!(day_separators(&messages, west).len(), 1);
    }
}
