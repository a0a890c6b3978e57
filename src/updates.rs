use crate::services::{ChannelEvent, SendReceipt};
use crate::state::AppState;
use crate::AppAction;

#[derive(Clone, Debug)]
pub enum AppUpdate {
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

#[derive(Debug)]
pub enum InternalEvent {
    // Push channel receive path. `token` is the session token the pump was
    // started under; stale events from a torn-down subscription are discarded.
    Channel {
        token: u64,
        event: ChannelEvent,
    },
    ChannelClosed {
        token: u64,
        reason: Option<String>,
    },

    // Async results. `epoch` is the thread epoch the request was spawned
    // under; completions for a switched-away thread are discarded, never
    // merged.
    SendMessageResult {
        counterpart_id: String,
        local_id: String,
        epoch: u64,
        receipt: Option<SendReceipt>,
        error: Option<String>,
    },
    HistoryPageFetched {
        counterpart_id: String,
        epoch: u64,
        week_index: u32,
        page: Option<Vec<crate::services::RemoteMessage>>,
        error: Option<String>,
    },
    LastSeenFetched {
        counterpart_id: String,
        epoch: u64,
        last_seen_at: i64,
    },
}
