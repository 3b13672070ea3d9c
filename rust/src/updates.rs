use crate::core::{ApiError, ChannelEvent, Message, User};
use crate::state::AppState;
use crate::AppAction;

#[derive(uniffi::Enum, Clone, Debug)]
#[allow(clippy::large_enum_variant)] // uniffi enums cannot use Box<T> indirection
pub enum AppUpdate {
    /// Every change ships a full snapshot; native reconcilers diff on their side.
    FullState(AppState),
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

/// Which subscription a channel event arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// Lives as long as the session; drives the chat list, typing and status.
    Session,
    /// Lives as long as one open thread.
    Thread { token: u64 },
}

#[derive(Debug)]
pub enum InternalEvent {
    // Auth
    LoginFinished {
        result: Result<String, ApiError>,
    },
    RegisterFinished {
        username: String,
        result: Result<(), ApiError>,
    },
    ProfileFetched {
        epoch: u64,
        token: String,
        result: Result<User, ApiError>,
    },

    // Snapshots
    ChatsLoaded {
        epoch: u64,
        result: Result<Vec<Message>, ApiError>,
    },
    ThreadLoaded {
        epoch: u64,
        thread_token: u64,
        result: Result<Vec<Message>, ApiError>,
    },

    // Realtime
    Channel {
        epoch: u64,
        feed: Feed,
        event: ChannelEvent,
    },

    // Fire-and-forget writes
    WriteFinished {
        epoch: u64,
        op: &'static str,
        peer_id: Option<String>,
        result: Result<(), ApiError>,
    },
    SendFinished {
        epoch: u64,
        peer_id: String,
        media: bool,
        result: Result<(), ApiError>,
    },

    // Timers
    TypingExpiryTick,
    ComposerIdle {
        token: u64,
    },
    ToastAutoDismiss {
        token: u64,
    },
}
