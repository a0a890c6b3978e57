//! Seams to the backend: request/response data service, push channel, and the
//! key-value identity store. The core consumes these as trait objects so tests
//! can drive the real actor against in-process fakes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, ServiceError};

/// Wire record for a server-confirmed message. The server owns `read`; the
/// core maps this into a `Confirmed` message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMessage {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub text: String,
    pub created_at: i64,
    #[serde(default)]
    pub read: bool,
}

/// Server acknowledgment of a send. A receipt without an id is the ambiguous
/// case: the core treats it as a failure.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SendReceipt {
    pub id: Option<String>,
    pub created_at: Option<i64>,
}

#[async_trait]
pub trait DataService: Send + Sync + 'static {
    /// History page for a counterpart, keyed by week index (0 = most recent).
    /// An empty page signals exhaustion.
    async fn fetch_history_page(
        &self,
        counterpart_id: &str,
        week_index: u32,
    ) -> Result<Vec<RemoteMessage>, ServiceError>;

    async fn send_message(
        &self,
        counterpart_id: &str,
        text: &str,
    ) -> Result<SendReceipt, ServiceError>;

    async fn fetch_last_seen(&self, counterpart_id: &str) -> Result<i64, ServiceError>;
}

#[derive(Clone, Debug)]
pub enum ChannelEvent {
    MessageReceived {
        counterpart_id: String,
        message: RemoteMessage,
    },
    PresenceOnline {
        user_id: String,
    },
    PresenceOffline {
        user_id: String,
    },
    TypingStart {
        from_user_id: String,
    },
    TypingStop {
        from_user_id: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundEvent {
    TypingStart { to_user_id: String },
    TypingStop { to_user_id: String },
}

/// Push-style bidirectional event channel. One subscription per active
/// identity; the receiver closing means the channel dropped.
#[async_trait]
pub trait PushChannel: Send + Sync + 'static {
    async fn subscribe(&self, user_id: &str) -> Result<flume::Receiver<ChannelEvent>, ChannelError>;

    /// Fire-and-forget outbound event (typing start/stop).
    async fn publish(&self, user_id: &str, event: OutboundEvent) -> Result<(), ChannelError>;

    async fn unsubscribe(&self, user_id: &str);
}

/// Token/session persistence, used only to recover "my" user id. Storage
/// mechanics live outside this crate.
pub trait IdentityStore: Send + Sync + 'static {
    fn load_user_id(&self) -> Option<String>;
}

/// Bundle of backend collaborators handed to `ChatApp::new`.
#[derive(Clone)]
pub struct Services {
    pub data: Arc<dyn DataService>,
    pub channel: Arc<dyn PushChannel>,
    pub identity: Arc<dyn IdentityStore>,
}
