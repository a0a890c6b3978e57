// Per-thread message collection: optimistic send lifecycle + history paging.

use crate::services::RemoteMessage;
use crate::state::{Message, MessageLifecycle, PrependAnchor};

#[derive(Debug)]
pub(super) struct ThreadState {
    pub(super) counterpart_id: String,
    /// Bumped on every open/close; async completions carrying an older epoch
    /// are discarded rather than merged.
    pub(super) epoch: u64,
    /// Ascending by `created_at`, ties by insertion order. Exclusively owned
    /// here; the grouping builder only reads it.
    pub(super) messages: Vec<Message>,
    /// Historical pages loaded so far (week index of the newest unloaded page
    /// minus one). Only ever increases until the thread resets.
    pub(super) cursor: u32,
    /// False until the initial page lands; a load-older request before then
    /// retries page 0 instead of skipping ahead.
    pub(super) initialized: bool,
    pub(super) exhausted: bool,
    pub(super) page_in_flight: bool,
    pub(super) load_error: Option<String>,
    pub(super) anchor: Option<PrependAnchor>,
}

impl ThreadState {
    pub(super) fn new(counterpart_id: String, epoch: u64) -> Self {
        Self {
            counterpart_id,
            epoch,
            messages: vec![],
            cursor: 0,
            initialized: false,
            exhausted: false,
            page_in_flight: false,
            load_error: None,
            anchor: None,
        }
    }

    pub(super) fn contains(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    pub(super) fn find(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Tail insert for an optimistic send. The caller guarantees a monotonic
    /// `created_at`, so the tail is always the correct sorted position.
    pub(super) fn push_optimistic(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Replace the optimistic entry in place with its confirmed form. The
    /// array position is authoritative for display continuity: the server
    /// timestamp is adopted without re-sorting, even when it differs from the
    /// optimistic guess.
    pub(super) fn confirm(&mut self, local_id: &str, server_id: String, created_at: Option<i64>) -> bool {
        let Some(m) = self.messages.iter_mut().find(|m| m.id == local_id) else {
            return false;
        };
        m.id = server_id;
        if let Some(ts) = created_at {
            m.created_at = ts;
        }
        m.lifecycle = MessageLifecycle::Confirmed { read: false };
        true
    }

    /// A failed send stays visible with a retry affordance; it is never
    /// removed and never reduces the visible message count.
    pub(super) fn mark_failed(&mut self, local_id: &str, reason: String) -> bool {
        let Some(m) = self.messages.iter_mut().find(|m| m.id == local_id) else {
            return false;
        };
        m.lifecycle = MessageLifecycle::Failed { reason };
        true
    }

    /// Flip a failed entry back to optimistic for a retry. The temporary id
    /// and position are reused so no duplicate bubble can appear.
    pub(super) fn mark_retrying(&mut self, message_id: &str) -> bool {
        match self.messages.iter_mut().find(|m| m.id == message_id) {
            Some(m) if m.lifecycle.is_failed() => {
                m.lifecycle = MessageLifecycle::Optimistic;
                true
            }
            _ => false,
        }
    }

    /// Idempotent merge of a push-delivered message. A known id is a
    /// confirmation echo or relay redelivery and only refreshes the
    /// server-owned `read` flag; an unknown id authored by the local user is
    /// dropped (it would duplicate an optimistic copy); everything else
    /// inserts sorted. Returns true when a new message was added.
    pub(super) fn merge_inbound(&mut self, remote: RemoteMessage, my_user_id: &str) -> bool {
        if let Some(existing) = self.messages.iter_mut().find(|m| m.id == remote.id) {
            existing.lifecycle = MessageLifecycle::Confirmed { read: remote.read };
            return false;
        }
        if remote.sender_id == my_user_id {
            tracing::debug!(id = %remote.id, "inbound own-message without local match dropped");
            return false;
        }
        self.insert_sorted(confirmed_message(remote));
        true
    }

    /// Insert keeping `created_at` ascending; equal timestamps land after the
    /// existing entries (ties broken by insertion order).
    pub(super) fn insert_sorted(&mut self, message: Message) {
        let at = self
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        self.messages.insert(at, message);
    }

    /// Initial (most recent) page: replaces the thread contents and resets the
    /// paging state. An empty first page means the thread has no history at
    /// all, which latches `exhausted` immediately.
    pub(super) fn replace_with_initial_page(&mut self, page: Vec<RemoteMessage>) {
        let mut msgs: Vec<Message> = page.into_iter().map(confirmed_message).collect();
        msgs.sort_by_key(|m| m.created_at);
        self.initialized = true;
        self.exhausted = msgs.is_empty();
        self.messages = msgs;
        self.cursor = 0;
        self.load_error = None;
        self.anchor = None;
    }

    /// Prepend an older history page and record the anchor so the shell can
    /// restore the scroll offset. The previous topmost message shifts down by
    /// exactly the number of prepended rows.
    pub(super) fn prepend_page(&mut self, page: Vec<RemoteMessage>) {
        let anchor_id = self.messages.first().map(|m| m.id.clone());

        let mut older: Vec<Message> = page
            .into_iter()
            .filter(|r| !self.contains(&r.id))
            .map(confirmed_message)
            .collect();
        older.sort_by_key(|m| m.created_at);

        let prepended = older.len() as u32;
        older.append(&mut self.messages);
        self.messages = older;
        self.cursor += 1;
        self.load_error = None;
        self.anchor = anchor_id.map(|message_id| PrependAnchor {
            message_id,
            prepended,
        });
    }
}

pub(super) fn confirmed_message(r: RemoteMessage) -> Message {
    Message {
        id: r.id,
        sender_id: r.sender_id,
        recipient_id: r.recipient_id,
        text: r.text,
        created_at: r.created_at,
        lifecycle: MessageLifecycle::Confirmed { read: r.read },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: &str = "me";
    const PEER: &str = "peer";

    fn remote(id: &str, sender: &str, created_at: i64) -> RemoteMessage {
        RemoteMessage {
            id: id.to_string(),
            sender_id: sender.to_string(),
            recipient_id: if sender == ME { PEER } else { ME }.to_string(),
            text: format!("text-{id}"),
            created_at,
            read: false,
        }
    }

    fn optimistic(id: &str, created_at: i64) -> Message {
        Message {
            id: id.to_string(),
            sender_id: ME.to_string(),
            recipient_id: PEER.to_string(),
            text: format!("text-{id}"),
            created_at,
            lifecycle: MessageLifecycle::Optimistic,
        }
    }

    fn thread_with_history(ids_and_ts: &[(&str, i64)]) -> ThreadState {
        let mut t = ThreadState::new(PEER.to_string(), 1);
        t.replace_with_initial_page(
            ids_and_ts
                .iter()
                .map(|(id, ts)| remote(id, PEER, *ts))
                .collect(),
        );
        t
    }

    #[test]
    fn merge_inbound_is_idempotent() {
        let mut t = thread_with_history(&[("a", 100)]);
        assert!(t.merge_inbound(remote("b", PEER, 200), ME));
        assert!(!t.merge_inbound(remote("b", PEER, 200), ME));
        assert_eq!(t.messages.len(), 2);
    }

    #[test]
    fn merge_inbound_drops_unmatched_own_messages() {
        let mut t = thread_with_history(&[("a", 100)]);
        assert!(!t.merge_inbound(remote("x", ME, 200), ME));
        assert_eq!(t.messages.len(), 1);
    }

    #[test]
    fn merge_inbound_echo_refreshes_read_flag_only() {
        let mut t = thread_with_history(&[("a", 100)]);
        let mut echo = remote("a", PEER, 100);
        echo.read = true;
        assert!(!t.merge_inbound(echo, ME));
        assert_eq!(t.messages.len(), 1);
        assert_eq!(
            t.messages[0].lifecycle,
            MessageLifecycle::Confirmed { read: true }
        );
    }

    #[test]
    fn merge_inbound_inserts_sorted_with_stable_ties() {
        let mut t = thread_with_history(&[("a", 100), ("c", 300)]);
        t.merge_inbound(remote("b", PEER, 200), ME);
        t.merge_inbound(remote("b2", PEER, 200), ME);
        let ids: Vec<&str> = t.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "b2", "c"]);
    }

    #[test]
    fn confirm_replaces_in_place_without_reordering() {
        let mut t = thread_with_history(&[("a", 100)]);
        t.push_optimistic(optimistic("tmp-1", 150));
        t.merge_inbound(remote("b", PEER, 200), ME);

        // Server assigns a timestamp later than the inbound message; the
        // confirmed entry must keep the optimistic position anyway.
        assert!(t.confirm("tmp-1", "srv-1".to_string(), Some(250)));
        let ids: Vec<&str> = t.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["a", "srv-1", "b"]);
        assert!(t.messages[1].lifecycle.is_confirmed());
        assert_eq!(t.messages[1].created_at, 250);
    }

    #[test]
    fn failed_send_stays_visible_and_retries_in_place() {
        let mut t = thread_with_history(&[("a", 100)]);
        t.push_optimistic(optimistic("tmp-1", 150));
        assert!(t.mark_failed("tmp-1", "network failure".into()));
        assert_eq!(t.messages.len(), 2);
        assert!(t.messages[1].lifecycle.is_failed());

        assert!(t.mark_retrying("tmp-1"));
        assert_eq!(t.messages[1].lifecycle, MessageLifecycle::Optimistic);
        assert!(t.confirm("tmp-1", "srv-1".to_string(), None));
        assert_eq!(t.messages.len(), 2);
    }

    #[test]
    fn retry_requires_a_failed_entry() {
        let mut t = thread_with_history(&[("a", 100)]);
        t.push_optimistic(optimistic("tmp-1", 150));
        assert!(!t.mark_retrying("tmp-1"));
        assert!(!t.mark_retrying("a"));
        assert!(!t.mark_retrying("missing"));
    }

    #[test]
    fn prepend_shifts_anchor_by_exactly_page_len() {
        let mut t = thread_with_history(&[("m10", 1000), ("m11", 1100)]);
        t.prepend_page(vec![
            remote("m1", PEER, 100),
            remote("m2", PEER, 200),
            remote("m3", PEER, 300),
        ]);

        assert_eq!(t.cursor, 1);
        let ids: Vec<&str> = t.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m1", "m2", "m3", "m10", "m11"]);
        let anchor = t.anchor.clone().expect("anchor after prepend");
        assert_eq!(anchor.message_id, "m10");
        assert_eq!(anchor.prepended, 3);
        assert_eq!(
            t.messages
                .iter()
                .position(|m| m.id == anchor.message_id)
                .map(|p| p as u32),
            Some(anchor.prepended)
        );
    }

    #[test]
    fn prepend_dedupes_already_loaded_ids() {
        let mut t = thread_with_history(&[("m10", 1000)]);
        t.prepend_page(vec![remote("m9", PEER, 900), remote("m10", PEER, 1000)]);
        let ids: Vec<&str> = t.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m9", "m10"]);
        assert_eq!(t.anchor.clone().map(|a| a.prepended), Some(1));
    }

    #[test]
    fn empty_initial_page_latches_exhausted() {
        let mut t = ThreadState::new(PEER.to_string(), 1);
        t.replace_with_initial_page(vec![]);
        assert!(t.exhausted);
        assert!(t.messages.is_empty());
    }
}
