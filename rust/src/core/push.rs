// Push token registration and notification taps.

use super::*;

impl AppCore {
    pub(super) fn set_push_token(&mut self, token: String) {
        let token = token.trim().to_string();
        if token.is_empty() {
            return;
        }
        tracing::info!("push: device token received");
        if let Err(e) = self.push_store.save(&token) {
            tracing::warn!(%e, "push: failed to persist device token");
        }
        self.push_token = Some(token);
        self.register_push_token();
    }

    pub(super) fn register_push_token(&self) {
        let (Some(push_token), Some(session)) = (self.push_token.clone(), self.session.as_ref())
        else {
            return;
        };
        let token = session.token.clone();
        let epoch = self.session_epoch;
        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = backend.store_push_token(&token, &push_token).await;
            match &result {
                Ok(()) => tracing::info!("push: device token stored"),
                Err(e) => tracing::warn!(%e, "push: failed to store device token"),
            }
            Self::send_internal(
                &tx,
                InternalEvent::WriteFinished {
                    epoch,
                    op: "store-push-token",
                    peer_id: None,
                    result,
                },
            );
        });
    }

    /// Best effort; runs while the session token is still valid.
    pub(super) fn unregister_push_token(&self) {
        let (Some(push_token), Some(session)) = (self.push_token.clone(), self.session.as_ref())
        else {
            return;
        };
        let token = session.token.clone();
        let backend = self.backend.clone();
        self.runtime.spawn(async move {
            match backend.delete_push_token(&token, &push_token).await {
                Ok(()) => tracing::info!("push: device token removed"),
                Err(e) => tracing::warn!(%e, "push: failed to remove device token"),
            }
        });
    }

    /// A tapped notification names the peer in `receiverId`; that thread opens
    /// and reads as seen.
    pub(super) fn open_from_notification(&mut self, receiver_id: String) {
        let receiver_id = receiver_id.trim().to_string();
        if receiver_id.is_empty() {
            return;
        }
        if self.session.is_none() {
            tracing::info!("push: notification tap before session, deferring");
            self.pending_notification_peer = Some(receiver_id);
            return;
        }
        self.open_chat(&receiver_id);
    }
}
