#[derive(Debug, Clone)]
pub enum AppAction {
    // Session
    RestoreSession,
    Login {
        user_id: String,
    },
    Logout,

    // Thread
    OpenThread {
        counterpart_id: String,
    },
    CloseThread,
    SendMessage {
        counterpart_id: String,
        text: String,
    },
    RetryMessage {
        counterpart_id: String,
        message_id: String,
    },
    LoadOlderMessages {
        counterpart_id: String,
    },

    // Presence
    StartTyping,
    StopTyping,

    // UI
    ClearToast,
}

impl AppAction {
    /// Log-safe action tag (never includes message text).
    pub fn tag(&self) -> &'static str {
        match self {
            // Session
            AppAction::RestoreSession => "RestoreSession",
            AppAction::Login { .. } => "Login",
            AppAction::Logout => "Logout",

            // Thread
            AppAction::OpenThread { .. } => "OpenThread",
            AppAction::CloseThread => "CloseThread",
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::RetryMessage { .. } => "RetryMessage",
            AppAction::LoadOlderMessages { .. } => "LoadOlderMessages",

            // Presence
            AppAction::StartTyping => "StartTyping",
            AppAction::StopTyping => "StopTyping",

            // UI
            AppAction::ClearToast => "ClearToast",
        }
    }
}
