#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct AppState {
    pub rev: u64,
    pub router: Router,
    pub auth: AuthState,
    pub busy: BusyState,
    pub connection: ConnectionState,
    pub chat_list: Vec<ChatSummary>,
    pub chat_list_loading: bool,
    pub chat_list_error: Option<String>,
    pub current_chat: Option<ChatViewState>,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            router: Router {
                default_screen: Screen::Login,
                screen_stack: vec![],
            },
            auth: AuthState::LoggedOut,
            busy: BusyState::idle(),
            connection: ConnectionState::Disconnected,
            chat_list: vec![],
            chat_list_loading: false,
            chat_list_error: None,
            current_chat: None,
            toast: None,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct Router {
    pub default_screen: Screen,
    pub screen_stack: Vec<Screen>,
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq)]
pub enum Screen {
    Login,
    Register,
    ChatList,
    Chat { peer_id: String },
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq)]
pub enum AuthState {
    LoggedOut,
    /// A stored token is being validated against `GET /profile`.
    Restoring,
    LoggedIn { user: UserProfile },
}

impl AuthState {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            AuthState::LoggedIn { user } => Some(&user.id),
            _ => None,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub profile_photo: Option<String>,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct BusyState {
    pub logging_in: bool,
    pub registering: bool,
    pub sending_media: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self {
            logging_in: false,
            registering: false,
            sending_media: false,
        }
    }
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    None,
    Image,
    Video,
    Audio,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct ChatSummary {
    pub peer_id: String,
    pub peer_name: String,
    pub peer_photo: Option<String>,
    pub last_message_preview: String,
    pub last_message_media: MediaKind,
    /// The latest message was sent by the local user.
    pub last_message_is_mine: bool,
    pub unread_count: u32,
    pub is_read: bool,
    pub last_activity_at_ms: i64,
    pub peer_typing: bool,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct ChatViewState {
    pub peer_id: String,
    pub peer_name: String,
    pub peer_photo: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub day_separators: Vec<DaySeparator>,
    pub loading: bool,
    pub load_error: Option<String>,
    pub peer_typing: bool,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub is_mine: bool,
    pub body: Option<String>,
    pub media_url: Option<String>,
    pub media: MediaKind,
    pub sent_at_ms: i64,
    pub is_read: bool,
}

/// Render a day header before `message_id`. `day` is `YYYY-MM-DD` in the
/// device's local offset.
#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct DaySeparator {
    pub message_id: String,
    pub day: String,
}
