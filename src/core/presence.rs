// Counterpart presence: online/offline/typing, fed by push events scoped to
// the active counterpart.

use crate::state::PresenceState;

#[derive(Debug, Default)]
pub(super) struct PresenceTracker {
    state: Option<PresenceState>,
}

impl PresenceTracker {
    /// Start tracking a counterpart with a blank slate. Typing and online
    /// state never carry over across a counterpart change.
    pub(super) fn track(&mut self, counterpart_id: &str) {
        self.state = Some(PresenceState {
            counterpart_id: counterpart_id.to_string(),
            online: false,
            typing: false,
            last_seen_at: None,
        });
    }

    pub(super) fn clear(&mut self) {
        self.state = None;
    }

    pub(super) fn snapshot(&self) -> Option<PresenceState> {
        self.state.clone()
    }

    fn tracked_mut(&mut self, user_id: &str) -> Option<&mut PresenceState> {
        self.state.as_mut().filter(|p| p.counterpart_id == user_id)
    }

    /// Returns true when state changed (events for other users are ignored).
    pub(super) fn on_online(&mut self, user_id: &str) -> bool {
        let Some(p) = self.tracked_mut(user_id) else {
            return false;
        };
        // "Online" supersedes any stale last-seen display.
        p.online = true;
        p.last_seen_at = None;
        true
    }

    pub(super) fn on_offline(&mut self, user_id: &str) -> bool {
        let Some(p) = self.tracked_mut(user_id) else {
            return false;
        };
        p.online = false;
        true
    }

    /// Typing is authoritative from the server: set on typing-start, cleared
    /// only by typing-stop or a counterpart change. No local expiry timer.
    pub(super) fn on_typing(&mut self, user_id: &str, typing: bool) -> bool {
        let Some(p) = self.tracked_mut(user_id) else {
            return false;
        };
        p.typing = typing;
        true
    }

    /// Last-seen fetched after an offline event. Discarded if the counterpart
    /// came back online while the fetch was in flight.
    pub(super) fn set_last_seen(&mut self, user_id: &str, at: i64) -> bool {
        let Some(p) = self.tracked_mut(user_id) else {
            return false;
        };
        if p.online {
            return false;
        }
        p.last_seen_at = Some(at);
        true
    }
}
