use crate::state::{MediaKind, Screen};

#[derive(uniffi::Enum, Debug, Clone)]
pub enum AppAction {
    // Auth
    Login {
        username: String,
        password: String,
    },
    Register {
        username: String,
        phone: String,
        password: String,
    },
    Logout,

    // Navigation
    PushScreen {
        screen: Screen,
    },
    UpdateScreenStack {
        stack: Vec<Screen>,
    },

    // Chat list
    RefreshChats,
    DeleteChat {
        peer_id: String,
    },

    // Thread
    OpenChat {
        peer_id: String,
    },
    CloseChat,
    SendMessage {
        peer_id: String,
        body: String,
    },
    SendMedia {
        peer_id: String,
        file_path: String,
        media: MediaKind,
        caption: Option<String>,
    },
    ComposerChanged {
        peer_id: String,
    },

    // Push
    SetPushToken {
        token: String,
    },
    NotificationTapped {
        receiver_id: String,
    },

    // UI
    ClearToast,

    // Lifecycle
    Foregrounded,
    Backgrounded,
}

impl AppAction {
    /// Log-safe name; never log the action itself (it can carry a password).
    pub fn tag(&self) -> &'static str {
        match self {
            // Auth
            AppAction::Login { .. } => "Login",
            AppAction::Register { .. } => "Register",
            AppAction::Logout => "Logout",

            // Navigation
            AppAction::PushScreen { .. } => "PushScreen",
            AppAction::UpdateScreenStack { .. } => "UpdateScreenStack",

            // Chat list
            AppAction::RefreshChats => "RefreshChats",
            AppAction::DeleteChat { .. } => "DeleteChat",

            // Thread
            AppAction::OpenChat { .. } => "OpenChat",
            AppAction::CloseChat => "CloseChat",
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::SendMedia { .. } => "SendMedia",
            AppAction::ComposerChanged { .. } => "ComposerChanged",

            // Push
            AppAction::SetPushToken { .. } => "SetPushToken",
            AppAction::NotificationTapped { .. } => "NotificationTapped",

            // UI
            AppAction::ClearToast => "ClearToast",

            // Lifecycle
            AppAction::Foregrounded => "Foregrounded",
            AppAction::Backgrounded => "Backgrounded",
        }
    }
}
