// Realtime channel events and typing presence.

use super::*;

impl AppCore {
    pub(super) fn handle_channel_event(&mut self, epoch: u64, feed: Feed, event: ChannelEvent) {
        if epoch != self.session_epoch || self.session.is_none() {
            tracing::debug!(event = event.name(), epoch, "dropping event from old session");
            return;
        }
        match feed {
            Feed::Session => self.apply_session_event(event),
            Feed::Thread { token } => self.apply_thread_event(token, event),
        }
    }

    fn apply_session_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {
                self.state.connection = ConnectionState::Connected;
                self.typing.reset_all();
                let reconnect = match self.session.as_mut() {
                    Some(session) => std::mem::replace(&mut session.connected_once, true),
                    None => false,
                };
                if reconnect {
                    // Catch up on whatever was missed while offline; replays
                    // are absorbed by id/recency checks.
                    tracing::info!("realtime reconnected, resyncing");
                    self.refresh_chats();
                    self.refresh_open_thread();
                }
            }
            ChannelEvent::Disconnected => {
                // The channel keeps retrying on its own.
                self.state.connection = ConnectionState::Connecting;
            }
            ChannelEvent::NewMessage(message) | ChannelEvent::MessageSent(message) => {
                self.apply_realtime_message(message);
            }
            ChannelEvent::DeleteChat { peer_id } => self.handle_remote_delete(&peer_id),
            ChannelEvent::Typing { sender_id } => {
                self.typing.on_typing(&sender_id, Instant::now());
                self.schedule_typing_expiry();
            }
            ChannelEvent::StopTyping { sender_id } => {
                self.typing.on_stop_typing(&sender_id);
            }
        }
        self.emit_state();
    }

    fn apply_realtime_message(&mut self, message: Message) {
        let Some(self_id) = self.self_id().map(ToString::to_string) else {
            return;
        };
        if !message.is_from(&self_id) {
            self.typing.on_message_from(message.sender());
        }
        let message_id = message.id.clone();
        match self.conversations.apply_incoming_message(message, &self_id) {
            ApplyOutcome::Foreign => {
                tracing::warn!(message_id = %message_id, "message does not involve local user");
            }
            ApplyOutcome::Stale | ApplyOutcome::Duplicate => {
                tracing::debug!(message_id = %message_id, "message already reflected in chat list");
            }
            ApplyOutcome::Inserted | ApplyOutcome::Promoted => self.mark_open_thread_viewed(),
        }
    }

    fn handle_remote_delete(&mut self, peer_id: &str) {
        let removed = self.conversations.remove_peer(peer_id);
        tracing::info!(peer_id, removed, "chat deleted by peer");
        let viewing = self
            .open_thread
            .as_ref()
            .is_some_and(|o| o.thread.peer_id() == peer_id);
        if viewing {
            self.close_thread(false);
            prune_chat_routes(&mut self.state.router.screen_stack, peer_id);
            self.toast("The other user deleted the chats");
        }
    }

    fn apply_thread_event(&mut self, token: u64, event: ChannelEvent) {
        let Some(open) = self.open_thread.as_mut() else {
            return;
        };
        if open.token != token {
            tracing::debug!(token, "dropping event for closed thread");
            return;
        }
        let appended = match event {
            ChannelEvent::NewMessage(message) => {
                let from_peer = message.is_from(open.thread.peer_id());
                let appended = open.thread.append_incoming(message);
                if appended && from_peer {
                    open.needs_receipt = true;
                }
                appended
            }
            ChannelEvent::MessageSent(message) => open.thread.append_outgoing_echo(message),
            _ => false,
        };
        if appended {
            self.emit_state();
        }
    }

    fn schedule_typing_expiry(&self) {
        // Slightly past the timeout so the prune sees the entry as expired.
        let delay = self.typing.timeout() + Duration::from_millis(50);
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            Self::send_internal(&tx, InternalEvent::TypingExpiryTick);
        });
    }

    pub(super) fn handle_typing_expiry_tick(&mut self) {
        if self.typing.prune(Instant::now()) {
            self.emit_state();
        }
    }

    pub(super) fn composer_changed(&mut self, peer_id: &str) {
        if self.session.is_none() || peer_id.trim().is_empty() {
            return;
        }
        let (signals, token) = self.composer.keystroke(peer_id);
        for signal in signals {
            self.emit_composer_signal(signal);
        }

        let idle = self.config.composer_idle();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(idle).await;
            Self::send_internal(&tx, InternalEvent::ComposerIdle { token });
        });
    }

    pub(super) fn handle_composer_idle(&mut self, token: u64) {
        if let Some(signal) = self.composer.idle_elapsed(token) {
            self.emit_composer_signal(signal);
        }
    }

    pub(super) fn finish_composer_burst(&mut self) {
        if let Some(signal) = self.composer.finish() {
            self.emit_composer_signal(signal);
        }
    }

    fn emit_composer_signal(&self, signal: ComposerSignal) {
        let Some(sender_id) = self.self_id().map(ToString::to_string) else {
            return;
        };
        let event = match signal {
            ComposerSignal::Typing { peer_id } => OutboundEvent::Typing {
                sender_id,
                receiver_id: peer_id,
            },
            ComposerSignal::StopTyping { peer_id } => OutboundEvent::StopTyping {
                sender_id,
                receiver_id: peer_id,
            },
        };
        tracing::debug!(event = event.name(), "composer");
        self.channel.emit(event);
    }
}
