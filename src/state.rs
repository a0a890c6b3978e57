use crate::groups::DateGroup;

#[derive(Clone, Debug)]
pub struct AppState {
    pub rev: u64,
    pub session: SessionState,
    pub busy: BusyState,
    pub conversations: Vec<ConversationSummary>,
    pub current_thread: Option<ThreadViewState>,
    pub presence: Option<PresenceState>,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            session: SessionState::LoggedOut,
            busy: BusyState::idle(),
            conversations: vec![],
            current_thread: None,
            presence: None,
            toast: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    Active { user_id: String },
}

/// "In flight" flags for long-ish operations that the UI should reflect.
///
/// Ephemeral UI state (scroll position, focus) stays native, but async operation
/// state lives here so the shell never needs its own spinner heuristics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusyState {
    pub logging_in: bool,
    pub opening_thread: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self {
            logging_in: false,
            opening_thread: false,
        }
    }
}

/// One row of the conversation list. The roster store re-sorts by
/// `last_message_at` descending after every mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationSummary {
    pub counterpart_id: String,
    pub last_message_text: Option<String>,
    pub last_message_at: Option<i64>,
    pub unread_count: u32,
}

#[derive(Clone, Debug)]
pub struct ThreadViewState {
    pub counterpart_id: String,
    pub messages: Vec<Message>,
    pub date_groups: Vec<DateGroup>,
    pub can_load_older: bool,
    pub loading_older: bool,
    pub load_error: Option<String>,
    pub anchor: Option<PrependAnchor>,
}

/// Reported after an older page lands so the shell can restore the scroll
/// offset: `message_id` was the topmost message before the prepend and now sits
/// `prepended` positions further down the array. The core only guarantees
/// stable positions; re-measurement is the shell's job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrependAnchor {
    pub message_id: String,
    pub prepended: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub text: String,
    pub created_at: i64,
    pub lifecycle: MessageLifecycle,
}

/// `read` is server-owned and exists only on `Confirmed`, so a "read optimistic
/// message" is unrepresentable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageLifecycle {
    Optimistic,
    Confirmed { read: bool },
    Failed { reason: String },
}

impl MessageLifecycle {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresenceState {
    pub counterpart_id: String,
    pub online: bool,
    pub typing: bool,
    pub last_seen_at: Option<i64>,
}

pub fn now_seconds() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
