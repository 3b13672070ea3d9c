// Chat list snapshots, thread open/close, sending and deletes.

use std::path::Path;

use super::*;

impl AppCore {
    pub(super) fn refresh_chats(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let token = session.token.clone();
        let epoch = self.session_epoch;
        self.state.chat_list_loading = true;

        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = backend.latest_messages(&token).await;
            Self::send_internal(&tx, InternalEvent::ChatsLoaded { epoch, result });
        });
    }

    pub(super) fn handle_chats_loaded(&mut self, epoch: u64, result: Result<Vec<Message>, ApiError>) {
        if epoch != self.session_epoch {
            tracing::debug!(epoch, "stale chat list snapshot");
            return;
        }
        let Some(self_id) = self.self_id().map(ToString::to_string) else {
            return;
        };
        self.state.chat_list_loading = false;
        match result {
            Ok(messages) => {
                let count = self.conversations.load_snapshot(messages, &self_id);
                tracing::info!(count, "chat list snapshot loaded");
                self.state.chat_list_error = None;
                self.mark_open_thread_viewed();
            }
            Err(e) => {
                if self.take_auth_failure(epoch, &e) {
                    return;
                }
                tracing::warn!(%e, "chat list snapshot failed");
                self.state.chat_list_error = Some(e.user_message());
            }
        }
        self.emit_state();
    }

    /// The open thread is on screen: its index entry never shows unread, but
    /// the backend still owes a receipt on close.
    pub(super) fn mark_open_thread_viewed(&mut self) {
        let Some(open) = self.open_thread.as_mut() else {
            return;
        };
        if self.conversations.has_unread(open.thread.peer_id()) {
            open.needs_receipt = true;
            self.conversations.mark_peer_read(open.thread.peer_id());
        }
    }

    pub(super) fn open_chat(&mut self, peer_id: &str) {
        let Some(self_id) = self.self_id().map(ToString::to_string) else {
            tracing::debug!("open_chat without session");
            return;
        };
        let peer_id = peer_id.trim();
        if peer_id.is_empty() {
            return;
        }

        let already_open = self
            .open_thread
            .as_ref()
            .is_some_and(|o| o.thread.peer_id() == peer_id);
        if !already_open {
            self.close_thread(true);
            self.thread_token = self.thread_token.wrapping_add(1);
            let token = self.thread_token;

            let filter_self = self_id.clone();
            let filter_peer = peer_id.to_string();
            let feed = self.subscribe_feed(Feed::Thread { token }, move |event| match event {
                ChannelEvent::NewMessage(m) | ChannelEvent::MessageSent(m) => {
                    other_party(m, &filter_self).is_some_and(|p| p.id() == filter_peer)
                }
                _ => false,
            });

            let peer = self.conversations.get(peer_id).and_then(|e| e.peer.clone());
            self.open_thread = Some(OpenThread {
                thread: MessageThread::open(peer_id, self_id),
                token,
                peer,
                needs_receipt: false,
                _feed: feed,
            });
            self.mark_open_thread_viewed();
            self.fetch_thread();
            tracing::info!(peer_id, "thread opened");
        } else {
            self.retry_failed_thread();
        }

        self.push_chat_route(peer_id);
        self.emit_state();
    }

    pub(super) fn fetch_thread(&mut self) {
        let (Some(session), Some(open)) = (self.session.as_ref(), self.open_thread.as_ref()) else {
            return;
        };
        let token = session.token.clone();
        let peer_id = open.thread.peer_id().to_string();
        let thread_token = open.token;
        let epoch = self.session_epoch;

        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = backend.thread_messages(&token, &peer_id).await;
            Self::send_internal(
                &tx,
                InternalEvent::ThreadLoaded {
                    epoch,
                    thread_token,
                    result,
                },
            );
        });
    }

    pub(super) fn refresh_open_thread(&mut self) {
        let Some(open) = self.open_thread.as_mut() else {
            return;
        };
        open.thread.begin_refresh();
        self.fetch_thread();
    }

    /// Re-open or refresh after a failed fetch tries again.
    pub(super) fn retry_failed_thread(&mut self) {
        let failed = self
            .open_thread
            .as_ref()
            .is_some_and(|o| o.thread.load_error().is_some());
        if failed {
            tracing::info!("retrying failed thread fetch");
            self.refresh_open_thread();
        }
    }

    pub(super) fn handle_thread_loaded(
        &mut self,
        epoch: u64,
        thread_token: u64,
        result: Result<Vec<Message>, ApiError>,
    ) {
        if epoch != self.session_epoch {
            return;
        }
        let is_current = self
            .open_thread
            .as_ref()
            .is_some_and(|o| o.token == thread_token);
        if !is_current {
            tracing::debug!(thread_token, "stale thread snapshot");
            return;
        }
        if let Err(e) = &result {
            if self.take_auth_failure(epoch, e) {
                return;
            }
        }
        let Some(open) = self.open_thread.as_mut() else {
            return;
        };
        match result {
            Ok(messages) => {
                tracing::debug!(peer_id = open.thread.peer_id(), count = messages.len(), "thread loaded");
                open.thread.load(messages);
                if open.thread.has_unread_from_peer() {
                    open.needs_receipt = true;
                }
            }
            Err(e) => {
                tracing::warn!(%e, peer_id = open.thread.peer_id(), "thread fetch failed");
                open.thread.fail(e.user_message());
            }
        }
        self.emit_state();
    }

    /// Close the open thread. With `send_receipt`, unread messages from the
    /// peer are marked read locally and one mark-read goes to the backend.
    pub(super) fn close_thread(&mut self, send_receipt: bool) {
        let Some(mut open) = self.open_thread.take() else {
            return;
        };
        self.finish_composer_burst();
        let receipt = open.thread.close();
        tracing::info!(peer_id = %receipt.peer_id, "thread closed");
        if !send_receipt {
            return;
        }
        self.conversations.mark_peer_read(&receipt.peer_id);
        if open.needs_receipt || !receipt.message_ids.is_empty() {
            self.mark_read_remote(receipt.peer_id);
        }
    }

    fn mark_read_remote(&self, peer_id: String) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let token = session.token.clone();
        let epoch = self.session_epoch;
        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = backend.mark_read(&token, &peer_id).await;
            Self::send_internal(
                &tx,
                InternalEvent::WriteFinished {
                    epoch,
                    op: "mark-read",
                    peer_id: Some(peer_id),
                    result,
                },
            );
        });
    }

    pub(super) fn delete_chat(&mut self, peer_id: &str) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let token = session.token.clone();
        let epoch = self.session_epoch;

        if self
            .open_thread
            .as_ref()
            .is_some_and(|o| o.thread.peer_id() == peer_id)
        {
            self.close_thread(false);
        }
        prune_chat_routes(&mut self.state.router.screen_stack, peer_id);
        self.conversations.remove_peer(peer_id);

        let peer_id = peer_id.to_string();
        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = backend.delete_thread(&token, &peer_id).await;
            Self::send_internal(
                &tx,
                InternalEvent::WriteFinished {
                    epoch,
                    op: "delete-thread",
                    peer_id: Some(peer_id),
                    result,
                },
            );
        });
        self.emit_state();
    }

    pub(super) fn handle_write_finished(
        &mut self,
        epoch: u64,
        op: &'static str,
        peer_id: Option<String>,
        result: Result<(), ApiError>,
    ) {
        match result {
            Ok(()) => tracing::debug!(op, peer_id = ?peer_id, "write ok"),
            Err(e) => {
                if self.take_auth_failure(epoch, &e) {
                    return;
                }
                tracing::warn!(%e, op, peer_id = ?peer_id, "write failed");
            }
        }
    }

    /// Not optimistic: the message shows up when the backend echoes it.
    /// Always REST, so a failure comes back as `SendFinished`.
    pub(super) fn send_text(&mut self, peer_id: String, body: String) {
        let Some(token) = self.session.as_ref().map(|s| s.token.clone()) else {
            return;
        };
        let body = body.trim().to_string();
        if body.is_empty() || peer_id.trim().is_empty() {
            return;
        }
        self.finish_composer_burst();

        let epoch = self.session_epoch;
        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = backend
                .send_message(
                    &token,
                    OutgoingMessage::Text {
                        receiver_id: peer_id.clone(),
                        body,
                    },
                )
                .await;
            Self::send_internal(
                &tx,
                InternalEvent::SendFinished {
                    epoch,
                    peer_id,
                    media: false,
                    result,
                },
            );
        });
    }

    pub(super) fn send_media(
        &mut self,
        peer_id: String,
        file_path: String,
        media: MediaKind,
        caption: Option<String>,
    ) {
        let Some(token) = self.session.as_ref().map(|s| s.token.clone()) else {
            return;
        };
        let media_type = match media {
            MediaKind::Image => MediaType::Image,
            MediaKind::Video => MediaType::Video,
            MediaKind::Audio => MediaType::Audio,
            MediaKind::None => {
                self.toast("Pick a photo, video or audio file");
                return;
            }
        };
        let file_name = Path::new(&file_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("upload.{}", media_type.as_str()));
        let caption = caption
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        let epoch = self.session_epoch;
        self.set_busy(|b| b.sending_media = true);

        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result: Result<(), ApiError> = async {
                let bytes = tokio::fs::read(&file_path).await?;
                let message = OutgoingMessage::Media {
                    receiver_id: peer_id.clone(),
                    media_type,
                    file_name,
                    bytes,
                    caption,
                };
                backend.send_message(&token, message).await
            }
            .await;
            Self::send_internal(
                &tx,
                InternalEvent::SendFinished {
                    epoch,
                    peer_id,
                    media: true,
                    result,
                },
            );
        });
    }

    pub(super) fn handle_send_finished(
        &mut self,
        epoch: u64,
        peer_id: String,
        media: bool,
        result: Result<(), ApiError>,
    ) {
        if media {
            self.set_busy(|b| b.sending_media = false);
        }
        match result {
            Ok(()) => tracing::debug!(peer_id = %peer_id, media, "message accepted"),
            Err(e) => {
                if self.take_auth_failure(epoch, &e) {
                    return;
                }
                tracing::warn!(%e, peer_id = %peer_id, media, "send failed");
                if epoch == self.session_epoch {
                    self.toast(format!("Message not sent: {}", e.user_message()));
                }
            }
        }
    }
}
