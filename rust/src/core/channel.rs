// Realtime channel: one WebSocket per app session, reconnect with backoff,
// per-user room membership, scoped subscriber registry.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::wire::{ChannelEvent, OutboundEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }
}

/// Tracks whether the socket currently sits in the user's room. The join is
/// owed again after every drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMembership {
    user_id: String,
    joined: bool,
}

impl RoomMembership {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            joined: false,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn on_connected(&mut self) -> OutboundEvent {
        self.joined = true;
        OutboundEvent::JoinRoom {
            user_id: self.user_id.clone(),
        }
    }

    pub fn on_dropped(&mut self) {
        self.joined = false;
    }

    pub fn leave(&mut self) -> Option<OutboundEvent> {
        if !std::mem::replace(&mut self.joined, false) {
            return None;
        }
        Some(OutboundEvent::LeaveRoom {
            user_id: self.user_id.clone(),
        })
    }
}

type Handler = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

struct Shared {
    status: Mutex<ConnectionStatus>,
    handlers: Mutex<BTreeMap<u64, Handler>>,
    next_id: Mutex<u64>,
    // Bumped on every connect/disconnect; only the task holding the current
    // value may touch status or deliver.
    generation: AtomicU64,
}

impl Shared {
    fn set_status(&self, status: ConnectionStatus) {
        match self.status.lock() {
            Ok(mut g) => *g = status,
            Err(poison) => *poison.into_inner() = status,
        }
    }

    fn status(&self) -> ConnectionStatus {
        match self.status.lock() {
            Ok(g) => *g,
            Err(poison) => *poison.into_inner(),
        }
    }

    fn handlers(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, Handler>> {
        match self.handlers.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    fn deliver(&self, event: &ChannelEvent) {
        // Snapshot first: a handler may drop its own subscription.
        let handlers: Vec<Handler> = self.handlers().values().cloned().collect();
        for handler in handlers {
            handler(event);
        }
    }

    fn register(&self, handler: Handler) -> u64 {
        let id = {
            let mut next = match self.next_id.lock() {
                Ok(g) => g,
                Err(poison) => poison.into_inner(),
            };
            *next += 1;
            *next
        };
        self.handlers().insert(id, handler);
        id
    }

    fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// A connection task's view of `Shared`. Writes from a superseded task are
/// ignored.
struct Link {
    shared: Arc<Shared>,
    generation: u64,
}

impl Link {
    fn is_current(&self) -> bool {
        self.shared.generation.load(Ordering::SeqCst) == self.generation
    }

    fn set_status(&self, status: ConnectionStatus) {
        if self.is_current() {
            self.shared.set_status(status);
        }
    }

    fn deliver(&self, event: &ChannelEvent) {
        if self.is_current() {
            self.shared.deliver(event);
        } else {
            tracing::debug!(event = event.name(), "realtime: stale task, event dropped");
        }
    }
}

/// Registration guard; unsubscribes when dropped.
pub struct Subscription {
    id: u64,
    shared: Weak<Shared>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handlers().remove(&self.id);
        }
    }
}

enum Command {
    Emit(OutboundEvent),
    Shutdown,
}

struct Worker {
    commands: mpsc::UnboundedSender<Command>,
    user_id: String,
}

pub struct RealtimeChannel {
    shared: Arc<Shared>,
    policy: ReconnectPolicy,
    worker: Mutex<Option<Worker>>,
}

impl RealtimeChannel {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                status: Mutex::new(ConnectionStatus::Disconnected),
                handlers: Mutex::new(BTreeMap::new()),
                next_id: Mutex::new(0),
                generation: AtomicU64::new(0),
            }),
            policy,
            worker: Mutex::new(None),
        }
    }

    fn worker(&self) -> std::sync::MutexGuard<'_, Option<Worker>> {
        match self.worker.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    pub fn is_active(&self) -> bool {
        self.worker()
            .as_ref()
            .is_some_and(|w| !w.commands.is_closed())
    }

    /// Start the connection task for `user_id`. Returns `false` when a task is
    /// already running.
    pub fn connect(&self, runtime: &tokio::runtime::Handle, url: &str, user_id: &str) -> bool {
        let mut slot = self.worker();
        if let Some(existing) = slot.as_ref() {
            if !existing.commands.is_closed() {
                tracing::debug!(user_id = %existing.user_id, "realtime: connect ignored, already running");
                return false;
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *slot = Some(Worker {
            commands: tx,
            user_id: user_id.to_string(),
        });
        let link = Link {
            shared: self.shared.clone(),
            generation: self.shared.bump_generation(),
        };
        self.shared.set_status(ConnectionStatus::Connecting);

        let policy = self.policy;
        let url = url.to_string();
        let room = RoomMembership::new(user_id);
        runtime.spawn(run_connection(link, policy, url, room, rx));
        true
    }

    /// Leave the room, close the socket and stop reconnecting.
    pub fn disconnect(&self) {
        let Some(worker) = self.worker().take() else {
            return;
        };
        tracing::info!(user_id = %worker.user_id, "realtime: disconnect");
        self.shared.bump_generation();
        let _ = worker.commands.send(Command::Shutdown);
        self.shared.set_status(ConnectionStatus::Disconnected);
    }

    /// Queue an outbound event. Events emitted while the socket is down are dropped.
    pub fn emit(&self, event: OutboundEvent) -> bool {
        match self.worker().as_ref() {
            Some(worker) => worker.commands.send(Command::Emit(event)).is_ok(),
            None => {
                tracing::debug!(event = event.name(), "realtime: emit without connection");
                false
            }
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        let id = self.shared.register(Arc::new(handler));
        Subscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.handlers().len()
    }

    /// Hand an event to subscribers as if it came off the socket.
    pub fn deliver(&self, event: &ChannelEvent) {
        self.shared.deliver(event);
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

enum LinkExit {
    Dropped,
    Shutdown,
}

async fn run_connection(
    link: Link,
    policy: ReconnectPolicy,
    url: String,
    mut room: RoomMembership,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut backoff = policy.initial;
    let mut attempt: u32 = 0;

    loop {
        link.set_status(ConnectionStatus::Connecting);
        attempt = attempt.saturating_add(1);

        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((mut ws_stream, _response)) => {
                if !link.is_current() {
                    tracing::debug!(url = %url, "realtime: superseded while connecting");
                    let _ = ws_stream.close(None).await;
                    return;
                }
                backoff = policy.initial;
                attempt = 0;
                tracing::info!(url = %url, user_id = %room.user_id(), "realtime: connected");

                let (mut write, mut read) = ws_stream.split();
                let join = room.on_connected();
                let exit = if let Err(e) = write.send(WsMessage::text(join.encode())).await {
                    tracing::warn!(%e, "realtime: join-room failed");
                    LinkExit::Dropped
                } else {
                    link.set_status(ConnectionStatus::Connected);
                    link.deliver(&ChannelEvent::Connected);

                    loop {
                        tokio::select! {
                            frame = read.next() => match frame {
                                Some(Ok(WsMessage::Text(text))) => dispatch_frame(&link, text.as_str()),
                                Some(Ok(WsMessage::Close(_))) | None => break LinkExit::Dropped,
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    tracing::warn!(%e, "realtime: read error");
                                    break LinkExit::Dropped;
                                }
                            },
                            cmd = commands.recv() => match cmd {
                                Some(Command::Emit(event)) => {
                                    if let Err(e) = write.send(WsMessage::text(event.encode())).await {
                                        tracing::warn!(%e, event = event.name(), "realtime: send failed");
                                        break LinkExit::Dropped;
                                    }
                                }
                                Some(Command::Shutdown) | None => {
                                    if let Some(leave) = room.leave() {
                                        let _ = write.send(WsMessage::text(leave.encode())).await;
                                    }
                                    let _ = write.close().await;
                                    break LinkExit::Shutdown;
                                }
                            },
                        }
                    }
                };

                room.on_dropped();
                if let LinkExit::Shutdown = exit {
                    link.set_status(ConnectionStatus::Disconnected);
                    tracing::info!("realtime: closed");
                    return;
                }
                link.set_status(ConnectionStatus::Disconnected);
                link.deliver(&ChannelEvent::Disconnected);
                tracing::info!(retry_in_ms = backoff.as_millis() as u64, "realtime: connection dropped");
            }
            Err(e) => {
                link.set_status(ConnectionStatus::Disconnected);
                tracing::debug!(%e, attempt, retry_in_ms = backoff.as_millis() as u64, "realtime: connect failed");
            }
        }

        if !wait_for_retry(&mut commands, backoff).await {
            link.set_status(ConnectionStatus::Disconnected);
            return;
        }
        backoff = policy.next_delay(backoff);
    }
}

/// Sleep out the backoff. Returns `false` if shutdown was requested meanwhile.
async fn wait_for_retry(commands: &mut mpsc::UnboundedReceiver<Command>, delay: Duration) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = commands.recv() => match cmd {
                Some(Command::Emit(event)) => {
                    tracing::debug!(event = event.name(), "realtime: dropping emit while offline");
                }
                Some(Command::Shutdown) | None => return false,
            },
        }
    }
}

fn dispatch_frame(link: &Link, text: &str) {
    match ChannelEvent::decode(text) {
        Ok(Some(event)) => {
            tracing::debug!(event = event.name(), "realtime: event");
            link.deliver(&event);
        }
        Ok(None) => tracing::debug!("realtime: ignoring unknown event"),
        Err(e) => tracing::warn!(%e, "realtime: bad frame"),
    }
}
