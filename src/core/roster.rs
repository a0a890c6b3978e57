// Conversation roster: optimistic previews + unread accounting. Single owner;
// other components mutate only through these methods.

use crate::state::ConversationSummary;

#[derive(Debug, Default)]
pub(super) struct Roster {
    entries: Vec<ConversationSummary>,
}

impl Roster {
    pub(super) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(super) fn snapshot(&self) -> Vec<ConversationSummary> {
        self.entries.clone()
    }

    fn entry_mut(&mut self, counterpart_id: &str) -> &mut ConversationSummary {
        let at = match self
            .entries
            .iter()
            .position(|e| e.counterpart_id == counterpart_id)
        {
            Some(at) => at,
            None => {
                self.entries.push(ConversationSummary {
                    counterpart_id: counterpart_id.to_string(),
                    last_message_text: None,
                    last_message_at: None,
                    unread_count: 0,
                });
                self.entries.len() - 1
            }
        };
        &mut self.entries[at]
    }

    /// Optimistic preview update on send; never rolled back when the send
    /// later fails (a failed-but-visible message is still the last thing the
    /// user tried to say).
    pub(super) fn on_message_sent(&mut self, counterpart_id: &str, text: &str, at: i64) {
        let entry = self.entry_mut(counterpart_id);
        entry.last_message_text = Some(text.to_string());
        entry.last_message_at = Some(at);
        self.sort();
    }

    /// Unread zeroes locally the moment the thread opens, independent of any
    /// server acknowledgment of read state.
    pub(super) fn on_thread_opened(&mut self, counterpart_id: &str) {
        self.entry_mut(counterpart_id).unread_count = 0;
    }

    /// Inbound messages count as unread only while the thread is closed;
    /// messages are considered read while the thread is visible.
    pub(super) fn on_inbound_message(
        &mut self,
        counterpart_id: &str,
        text: &str,
        at: i64,
        thread_open: bool,
    ) {
        let entry = self.entry_mut(counterpart_id);
        entry.last_message_text = Some(text.to_string());
        entry.last_message_at = Some(at);
        if !thread_open {
            entry.unread_count += 1;
        }
        self.sort();
    }

    fn sort(&mut self) {
        self.entries
            .sort_by_key(|e| std::cmp::Reverse(e.last_message_at.unwrap_or(0)));
    }
}
