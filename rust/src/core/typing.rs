// Typing presence: inbound per-peer indicators plus the outbound composer debounce.

use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct TypingTracker {
    timeout: Duration,
    last_seen: HashMap<String, Instant>,
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_TIMEOUT)
    }
}

impl TypingTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_seen: HashMap::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn on_typing(&mut self, peer_id: &str, now: Instant) {
        self.last_seen.insert(peer_id.to_string(), now);
    }

    pub fn on_stop_typing(&mut self, peer_id: &str) -> bool {
        self.last_seen.remove(peer_id).is_some()
    }

    /// A message from the peer ends their typing burst.
    pub fn on_message_from(&mut self, peer_id: &str) -> bool {
        self.on_stop_typing(peer_id)
    }

    pub fn is_typing(&self, peer_id: &str, now: Instant) -> bool {
        self.last_seen
            .get(peer_id)
            .is_some_and(|at| now.saturating_duration_since(*at) < self.timeout)
    }

    /// Drop peers whose last `typing` is older than the timeout.
    pub fn prune(&mut self, now: Instant) -> bool {
        let before = self.last_seen.len();
        let timeout = self.timeout;
        self.last_seen
            .retain(|_, at| now.saturating_duration_since(*at) < timeout);
        self.last_seen.len() != before
    }

    pub fn reset_all(&mut self) -> bool {
        let had_any = !self.last_seen.is_empty();
        self.last_seen.clear();
        had_any
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposerSignal {
    Typing { peer_id: String },
    StopTyping { peer_id: String },
}

/// Outbound side: one `typing` per burst, `stop-typing` once the burst ends.
#[derive(Debug, Clone, Default)]
pub struct ComposerTyping {
    burst_peer: Option<String>,
    token: u64,
}

impl ComposerTyping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_peer(&self) -> Option<&str> {
        self.burst_peer.as_deref()
    }

    /// Record a keystroke for `peer_id`. Returns the signals to emit and the
    /// token the idle timer must present to `idle_elapsed`.
    pub fn keystroke(&mut self, peer_id: &str) -> (Vec<ComposerSignal>, u64) {
        let mut signals = Vec::new();
        match self.burst_peer.as_deref() {
            Some(current) if current == peer_id => {}
            _ => {
                if let Some(previous) = self.burst_peer.take() {
                    signals.push(ComposerSignal::StopTyping { peer_id: previous });
                }
                signals.push(ComposerSignal::Typing {
                    peer_id: peer_id.to_string(),
                });
                self.burst_peer = Some(peer_id.to_string());
            }
        }
        self.token = self.token.wrapping_add(1);
        (signals, self.token)
    }

    /// Only the timer armed by the latest keystroke ends the burst.
    pub fn idle_elapsed(&mut self, token: u64) -> Option<ComposerSignal> {
        if token != self.token {
            return None;
        }
        self.finish()
    }

    /// End the burst immediately (message sent, thread closed).
    pub fn finish(&mut self) -> Option<ComposerSignal> {
        self.token = self.token.wrapping_add(1);
        self.burst_peer
            .take()
            .map(|peer_id| ComposerSignal::StopTyping { peer_id })
    }
}
