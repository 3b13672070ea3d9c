mod api;
mod channel;
mod chat;
mod config;
mod conversations;
mod models;
mod push;
mod realtime;
mod session;
mod thread;
mod token_store;
mod typing;
mod wire;

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::FixedOffset;
use flume::Sender;

use crate::actions::AppAction;
use crate::state::{
    AuthState, BusyState, ChatMessage, ChatSummary, ChatViewState, ConnectionState, MediaKind,
    Screen, UserProfile,
};
use crate::updates::{AppUpdate, CoreMsg, Feed, InternalEvent};

pub use api::{ApiError, ChatBackend, HttpBackend, OutgoingMessage, Registration};
pub use channel::{
    ConnectionStatus, RealtimeChannel, ReconnectPolicy, RoomMembership, Subscription,
};
pub use config::AppConfig;
pub use conversations::{ApplyOutcome, ConversationIndex};
pub use models::{other_party, ConversationEntry, Direction, MediaType, Message, PartyRef, User};
pub use thread::{day_separators, MessageThread, ReadReceipt};
pub use token_store::{FileTokenStore, TokenStore};
pub use typing::{ComposerSignal, ComposerTyping, TypingTracker};
pub use wire::{ChannelEvent, OutboundEvent, WireError};

const TOAST_VISIBLE: Duration = Duration::from_secs(3);

struct Session {
    token: String,
    user: User,
    connected_once: bool,
    // Dropping the guard unregisters the session feed.
    _feed: Subscription,
}

struct OpenThread {
    thread: MessageThread,
    token: u64,
    peer: Option<User>,
    // Something from the peer was (or became) unread while the thread was open.
    needs_receipt: bool,
    _feed: Subscription,
}

pub struct AppCore {
    pub state: crate::state::AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<crate::state::AppState>>,

    config: config::AppConfig,
    runtime: tokio::runtime::Runtime,
    backend: Arc<dyn ChatBackend>,
    token_store: Arc<dyn TokenStore>,
    push_store: FileTokenStore,
    channel: RealtimeChannel,

    session: Option<Session>,
    // Bumped on every session start/stop; async results carrying an older
    // epoch are dropped.
    session_epoch: u64,

    conversations: ConversationIndex,
    open_thread: Option<OpenThread>,
    thread_token: u64,
    typing: TypingTracker,
    composer: ComposerTyping,

    backgrounded: bool,
    push_token: Option<String>,
    pending_notification_peer: Option<String>,
    toast_dismiss_token: u64,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<crate::state::AppState>>,
    ) -> Self {
        let config = config::load_app_config(&data_dir);
        let backend = HttpBackend::new(reqwest::Client::new(), &config.api_base_url())
            .or_else(|e| {
                tracing::warn!(%e, "invalid api_base_url, using default");
                HttpBackend::new(reqwest::Client::new(), config::DEFAULT_API_BASE_URL)
            })
            .expect("default api url");
        let token_store = Arc::new(FileTokenStore::session(&data_dir));
        Self::with_services(
            update_sender,
            core_sender,
            data_dir,
            shared_state,
            Arc::new(backend),
            token_store,
        )
    }

    pub fn with_services(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<crate::state::AppState>>,
        backend: Arc<dyn ChatBackend>,
        token_store: Arc<dyn TokenStore>,
    ) -> Self {
        let config = config::load_app_config(&data_dir);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let channel = RealtimeChannel::new(ReconnectPolicy {
            initial: config.reconnect_initial(),
            max: config.reconnect_max(),
        });
        let push_store = FileTokenStore::push(&data_dir);
        let push_token = push_store.load().unwrap_or_else(|e| {
            tracing::warn!(%e, "push: failed to read stored token");
            None
        });

        let mut this = Self {
            state: crate::state::AppState::empty(),
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            typing: TypingTracker::new(config.typing_timeout()),
            composer: ComposerTyping::new(),
            config,
            runtime,
            backend,
            token_store,
            push_store,
            channel,
            session: None,
            session_epoch: 0,
            conversations: ConversationIndex::new(),
            open_thread: None,
            thread_token: 0,
            backgrounded: false,
            push_token,
            pending_notification_peer: None,
            toast_dismiss_token: 0,
        };

        // Ensure FfiApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);

        this.restore_session_from_store();
        this
    }

    fn self_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.user.id.as_str())
    }

    fn utc_offset(&self) -> FixedOffset {
        self.config.utc_offset()
    }

    fn send_internal(tx: &Sender<CoreMsg>, event: InternalEvent) {
        let _ = tx.send(CoreMsg::Internal(Box::new(event)));
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &crate::state::AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.sync_views();
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    /// Rebuild the derived chat list / open chat views from domain state.
    fn sync_views(&mut self) {
        let now = Instant::now();
        self.state.chat_list = self
            .conversations
            .entries()
            .iter()
            .map(|e| chat_summary(e, self.typing.is_typing(&e.peer_id, now)))
            .collect();

        let offset = self.utc_offset();
        self.state.current_chat = match (self.open_thread.as_ref(), self.self_id()) {
            (Some(open), Some(self_id)) => {
                let peer = open.peer.as_ref().or_else(|| {
                    self.conversations
                        .get(open.thread.peer_id())
                        .and_then(|e| e.peer.as_ref())
                });
                let typing = self.typing.is_typing(open.thread.peer_id(), now);
                Some(chat_view(open, peer, self_id, offset, typing))
            }
            _ => None,
        };
    }

    fn toast(&mut self, msg: impl Into<String>) {
        self.state.toast = Some(msg.into());
        self.toast_dismiss_token = self.toast_dismiss_token.saturating_add(1);
        self.schedule_toast_auto_dismiss(self.toast_dismiss_token);
        self.emit_state();
    }

    fn schedule_toast_auto_dismiss(&self, token: u64) {
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(TOAST_VISIBLE).await;
            Self::send_internal(&tx, InternalEvent::ToastAutoDismiss { token });
        });
    }

    fn handle_toast_auto_dismiss(&mut self, token: u64) {
        if token != self.toast_dismiss_token || self.state.toast.is_none() {
            return;
        }
        self.state.toast = None;
        self.emit_state();
    }

    fn set_busy(&mut self, f: impl FnOnce(&mut BusyState)) {
        let mut next = self.state.busy.clone();
        f(&mut next);
        if next != self.state.busy {
            self.state.busy = next;
            self.emit_state();
        }
    }

    fn push_screen(&mut self, screen: Screen) {
        self.state.router.screen_stack.push(screen);
    }

    fn push_chat_route(&mut self, peer_id: &str) {
        let screen = Screen::Chat {
            peer_id: peer_id.to_string(),
        };
        if self.state.router.screen_stack.last() == Some(&screen) {
            return;
        }
        self.state
            .router
            .screen_stack
            .retain(|s| !matches!(s, Screen::Chat { .. }));
        self.push_screen(screen);
    }

    /// Keep the open thread in step with the top of the native navigation stack.
    fn sync_thread_to_router(&mut self) {
        let top = self.state.router.screen_stack.last().cloned();
        let open_peer = self
            .open_thread
            .as_ref()
            .map(|o| o.thread.peer_id().to_string());
        match top {
            Some(Screen::Chat { peer_id }) => {
                if open_peer.as_deref() != Some(peer_id.as_str()) {
                    self.open_chat(&peer_id);
                }
            }
            _ => {
                if open_peer.is_some() {
                    self.close_thread(true);
                }
            }
        }
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(ref action) => {
                // Never log `?action` directly: it can contain a password.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action.clone());
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::LoginFinished { result } => self.handle_login_finished(result),
            InternalEvent::RegisterFinished { username, result } => {
                self.handle_register_finished(username, result)
            }
            InternalEvent::ProfileFetched {
                epoch,
                token,
                result,
            } => self.handle_profile_fetched(epoch, token, result),
            InternalEvent::ChatsLoaded { epoch, result } => self.handle_chats_loaded(epoch, result),
            InternalEvent::ThreadLoaded {
                epoch,
                thread_token,
                result,
            } => self.handle_thread_loaded(epoch, thread_token, result),
            InternalEvent::Channel { epoch, feed, event } => {
                self.handle_channel_event(epoch, feed, event)
            }
            InternalEvent::WriteFinished {
                epoch,
                op,
                peer_id,
                result,
            } => self.handle_write_finished(epoch, op, peer_id, result),
            InternalEvent::SendFinished {
                epoch,
                peer_id,
                media,
                result,
            } => self.handle_send_finished(epoch, peer_id, media, result),
            InternalEvent::TypingExpiryTick => self.handle_typing_expiry_tick(),
            InternalEvent::ComposerIdle { token } => self.handle_composer_idle(token),
            InternalEvent::ToastAutoDismiss { token } => self.handle_toast_auto_dismiss(token),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            // Auth
            AppAction::Login { username, password } => self.login(username, password),
            AppAction::Register {
                username,
                phone,
                password,
            } => self.register(username, phone, password),
            AppAction::Logout => self.logout(),

            // Navigation
            AppAction::PushScreen { screen } => match screen {
                Screen::Chat { peer_id } => self.open_chat(&peer_id),
                other => {
                    self.push_screen(other);
                    self.emit_state();
                }
            },
            AppAction::UpdateScreenStack { stack } => {
                self.state.router.screen_stack = stack;
                self.sync_thread_to_router();
                self.emit_state();
            }

            // Chat list
            AppAction::RefreshChats => {
                self.refresh_chats();
                self.retry_failed_thread();
                self.emit_state();
            }
            AppAction::DeleteChat { peer_id } => self.delete_chat(&peer_id),

            // Thread
            AppAction::OpenChat { peer_id } => self.open_chat(&peer_id),
            AppAction::CloseChat => {
                if let Some(peer_id) = self
                    .open_thread
                    .as_ref()
                    .map(|o| o.thread.peer_id().to_string())
                {
                    self.close_thread(true);
                    prune_chat_routes(&mut self.state.router.screen_stack, &peer_id);
                    self.emit_state();
                }
            }
            AppAction::SendMessage { peer_id, body } => self.send_text(peer_id, body),
            AppAction::SendMedia {
                peer_id,
                file_path,
                media,
                caption,
            } => self.send_media(peer_id, file_path, media, caption),
            AppAction::ComposerChanged { peer_id } => self.composer_changed(&peer_id),

            // Push
            AppAction::SetPushToken { token } => self.set_push_token(token),
            AppAction::NotificationTapped { receiver_id } => {
                self.open_from_notification(receiver_id)
            }

            // UI
            AppAction::ClearToast => {
                if self.state.toast.take().is_some() {
                    self.emit_state();
                }
            }

            // Lifecycle
            AppAction::Foregrounded => self.foregrounded(),
            AppAction::Backgrounded => self.backgrounded(),
        }
    }

    fn foregrounded(&mut self) {
        let was_background = std::mem::replace(&mut self.backgrounded, false);
        if self.session.is_some() {
            if was_background {
                self.refresh_chats();
                self.refresh_open_thread();
                self.emit_state();
            }
            return;
        }
        if matches!(self.state.auth, AuthState::LoggedOut) {
            self.restore_session_from_store();
        }
    }

    fn backgrounded(&mut self) {
        self.backgrounded = true;
        self.finish_composer_burst();
    }
}

fn media_kind(media_type: MediaType) -> MediaKind {
    match media_type {
        MediaType::None => MediaKind::None,
        MediaType::Image => MediaKind::Image,
        MediaType::Video => MediaKind::Video,
        MediaType::Audio => MediaKind::Audio,
    }
}

fn user_profile(user: &User) -> UserProfile {
    UserProfile {
        id: user.id.clone(),
        username: user.username.clone(),
        phone: user.phone.clone(),
        bio: user.bio.clone(),
        profile_photo: user.profile_photo.clone(),
    }
}

fn display_name(peer_id: &str, peer: Option<&User>) -> String {
    peer.map(|u| u.username.trim())
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .unwrap_or_else(|| peer_id.to_string())
}

fn chat_summary(entry: &ConversationEntry, peer_typing: bool) -> ChatSummary {
    let last = &entry.last_message;
    ChatSummary {
        peer_id: entry.peer_id.clone(),
        peer_name: display_name(&entry.peer_id, entry.peer.as_ref()),
        peer_photo: entry.peer.as_ref().and_then(|u| u.profile_photo.clone()),
        last_message_preview: last.body.clone().unwrap_or_default(),
        last_message_media: media_kind(last.media_type),
        last_message_is_mine: entry.direction == Direction::Sent,
        unread_count: entry.unread_count,
        is_read: entry.is_read,
        last_activity_at_ms: entry.last_activity_at.timestamp_millis(),
        peer_typing,
    }
}

fn chat_message(message: &Message, self_id: &str) -> ChatMessage {
    ChatMessage {
        id: message.id.clone(),
        sender_id: message.sender().to_string(),
        is_mine: message.is_from(self_id),
        body: message.body.clone(),
        media_url: message.media_url.clone(),
        media: media_kind(message.media_type),
        sent_at_ms: message.sent_at.timestamp_millis(),
        is_read: message.is_read,
    }
}

fn chat_view(
    open: &OpenThread,
    peer: Option<&User>,
    self_id: &str,
    offset: FixedOffset,
    peer_typing: bool,
) -> ChatViewState {
    let thread = &open.thread;
    let messages = thread.messages();
    let day_separators = day_separators(messages, offset)
        .into_iter()
        .map(|s| crate::state::DaySeparator {
            message_id: messages[s.index].id.clone(),
            day: s.day.format("%Y-%m-%d").to_string(),
        })
        .collect();
    ChatViewState {
        peer_id: thread.peer_id().to_string(),
        peer_name: display_name(thread.peer_id(), peer),
        peer_photo: peer.and_then(|u| u.profile_photo.clone()),
        messages: messages.iter().map(|m| chat_message(m, self_id)).collect(),
        day_separators,
        loading: thread.is_loading(),
        load_error: thread.load_error().map(ToString::to_string),
        peer_typing,
    }
}

fn prune_chat_routes(stack: &mut Vec<Screen>, peer_id: &str) {
    stack.retain(|screen| !matches!(screen, Screen::Chat { peer_id: id } if id == peer_id));
}
