// Session lifecycle: token restore, login/register, start/stop, forced logout.

use super::*;

impl AppCore {
    pub(super) fn restore_session_from_store(&mut self) {
        match self.token_store.load() {
            Ok(Some(token)) => {
                tracing::info!("restoring session from stored token");
                self.state.auth = AuthState::Restoring;
                self.fetch_profile(token);
                self.emit_state();
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(%e, "failed to read stored session token"),
        }
    }

    pub(super) fn login(&mut self, username: String, password: String) {
        let username = username.trim().to_string();
        if username.is_empty() || password.is_empty() {
            self.toast("Enter a username and password");
            return;
        }
        self.set_busy(|b| b.logging_in = true);

        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = backend.login(&username, &password).await;
            Self::send_internal(&tx, InternalEvent::LoginFinished { result });
        });
    }

    pub(super) fn handle_login_finished(&mut self, result: Result<String, ApiError>) {
        match result {
            Ok(token) => {
                if let Err(e) = self.token_store.save(&token) {
                    tracing::warn!(%e, "failed to persist session token");
                }
                // `logging_in` stays set until the profile arrives.
                self.fetch_profile(token);
            }
            Err(e) => {
                tracing::warn!(%e, "login failed");
                self.set_busy(|b| b.logging_in = false);
                self.toast(format!("Login failed: {}", e.user_message()));
            }
        }
    }

    pub(super) fn register(&mut self, username: String, phone: String, password: String) {
        let registration = Registration {
            username: username.trim().to_string(),
            phone: phone.trim().to_string(),
            password,
        };
        if registration.username.is_empty()
            || registration.phone.is_empty()
            || registration.password.is_empty()
        {
            self.toast("Fill in username, phone and password");
            return;
        }
        self.set_busy(|b| b.registering = true);

        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = backend.register(&registration).await;
            Self::send_internal(
                &tx,
                InternalEvent::RegisterFinished {
                    username: registration.username,
                    result,
                },
            );
        });
    }

    pub(super) fn handle_register_finished(
        &mut self,
        username: String,
        result: Result<(), ApiError>,
    ) {
        self.set_busy(|b| b.registering = false);
        match result {
            Ok(()) => {
                tracing::info!(username = %username, "registered");
                self.state
                    .router
                    .screen_stack
                    .retain(|s| !matches!(s, Screen::Register));
                self.toast(format!("Account {username} created, log in to continue"));
            }
            Err(e) => {
                tracing::warn!(%e, "register failed");
                self.toast(format!("Registration failed: {}", e.user_message()));
            }
        }
    }

    fn fetch_profile(&mut self, token: String) {
        self.session_epoch = self.session_epoch.wrapping_add(1);
        let epoch = self.session_epoch;
        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = backend.fetch_profile(&token).await;
            Self::send_internal(
                &tx,
                InternalEvent::ProfileFetched {
                    epoch,
                    token,
                    result,
                },
            );
        });
    }

    pub(super) fn handle_profile_fetched(
        &mut self,
        epoch: u64,
        token: String,
        result: Result<User, ApiError>,
    ) {
        if epoch != self.session_epoch {
            tracing::debug!(epoch, "stale profile result");
            return;
        }
        self.set_busy(|b| b.logging_in = false);
        match result {
            Ok(user) => self.start_session(token, user),
            Err(e) if e.is_auth_failure() => {
                tracing::info!(%e, "stored token rejected");
                self.clear_stored_token();
                self.state.auth = AuthState::LoggedOut;
                self.handle_auth_transition(false);
                self.toast("Session expired");
            }
            Err(e) => {
                // Keep the token; the next foreground retries the restore.
                tracing::warn!(%e, "profile fetch failed");
                self.state.auth = AuthState::LoggedOut;
                self.emit_state();
                self.toast(format!("Could not load profile: {}", e.user_message()));
            }
        }
    }

    pub(super) fn start_session(&mut self, token: String, user: User) {
        // Tear down any existing session first.
        self.stop_session();

        tracing::info!(user_id = %user.id, username = %user.username, "start_session");

        let feed = self.subscribe_feed(Feed::Session, |_| true);
        if self.config.realtime_enabled() {
            let url = self.config.socket_url();
            self.channel.connect(self.runtime.handle(), &url, &user.id);
            self.state.connection = ConnectionState::Connecting;
        }

        self.state.auth = AuthState::LoggedIn {
            user: user_profile(&user),
        };
        self.session = Some(Session {
            token,
            user,
            connected_once: false,
            _feed: feed,
        });
        self.handle_auth_transition(true);

        self.refresh_chats();
        self.register_push_token();
        if let Some(peer_id) = self.pending_notification_peer.take() {
            self.open_chat(&peer_id);
        }
        self.emit_state();
    }

    pub(super) fn stop_session(&mut self) {
        self.session_epoch = self.session_epoch.wrapping_add(1);
        if self.session.is_none() {
            return;
        }

        self.finish_composer_burst();
        // Drop the thread without a receipt; the identity is going away.
        self.open_thread = None;
        // Leave the room while the identity is still known.
        self.channel.disconnect();

        if let Some(session) = self.session.take() {
            tracing::info!(user_id = %session.user.id, "stop_session");
        }
        self.conversations.clear();
        self.typing.reset_all();
        self.state.connection = ConnectionState::Disconnected;
    }

    pub(super) fn logout(&mut self) {
        self.unregister_push_token();
        self.stop_session();
        self.clear_stored_token();
        self.pending_notification_peer = None;
        self.state.auth = AuthState::LoggedOut;
        self.handle_auth_transition(false);
    }

    /// Any 401/403 on an authenticated call ends the session.
    pub(super) fn force_logout(&mut self, reason: &ApiError) {
        tracing::warn!(%reason, "session rejected by backend, logging out");
        self.stop_session();
        self.clear_stored_token();
        self.state.auth = AuthState::LoggedOut;
        self.handle_auth_transition(false);
        self.toast("Session expired");
    }

    fn clear_stored_token(&self) {
        if let Err(e) = self.token_store.clear() {
            tracing::warn!(%e, "failed to clear session token");
        }
    }

    pub(super) fn handle_auth_transition(&mut self, logged_in: bool) {
        self.state.router.screen_stack.clear();
        if logged_in {
            self.state.router.default_screen = Screen::ChatList;
        } else {
            self.state.router.default_screen = Screen::Login;
            self.state.chat_list_loading = false;
            self.state.chat_list_error = None;
            self.state.busy = BusyState::idle();
            self.state.connection = ConnectionState::Disconnected;
        }
        self.emit_state();
    }

    pub(super) fn subscribe_feed(
        &self,
        feed: Feed,
        filter: impl Fn(&ChannelEvent) -> bool + Send + Sync + 'static,
    ) -> Subscription {
        let tx = self.core_sender.clone();
        let epoch = self.session_epoch;
        self.channel.subscribe(move |event| {
            if !filter(event) {
                return;
            }
            Self::send_internal(
                &tx,
                InternalEvent::Channel {
                    epoch,
                    feed,
                    event: event.clone(),
                },
            );
        })
    }

    /// Route an authenticated-call failure: auth errors end the session,
    /// everything else is left to the caller.
    pub(super) fn take_auth_failure(&mut self, epoch: u64, error: &ApiError) -> bool {
        if !error.is_auth_failure() {
            return false;
        }
        if epoch == self.session_epoch && self.session.is_some() {
            self.force_logout(error);
        }
        true
    }
}
