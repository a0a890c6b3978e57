mod config;
mod presence;
mod roster;
mod session;
mod thread;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use flume::Sender;

use crate::actions::AppAction;
use crate::error::ServiceError;
use crate::groups::build_groups;
use crate::services::{ChannelEvent, OutboundEvent, Services};
use crate::state::{
    now_seconds, AppState, BusyState, Message, MessageLifecycle, SessionState, ThreadViewState,
};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

use presence::PresenceTracker;
use roster::Roster;
use thread::ThreadState;

struct Session {
    user_id: String,
    token: u64,
    alive: Arc<AtomicBool>,
}

pub struct AppCore {
    pub state: AppState,
    rev: u64,
    last_outgoing_ts: i64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    services: Services,
    config: config::AppConfig,
    runtime: tokio::runtime::Runtime,

    session: Option<Session>,
    session_token: u64,

    // Thread + presence are scoped to the active counterpart; the epoch is
    // bumped on every open/close so late completions can be discarded.
    thread: Option<ThreadState>,
    thread_epoch: u64,
    roster: Roster,
    presence: PresenceTracker,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        services: Services,
        shared_state: Arc<RwLock<AppState>>,
    ) -> Self {
        let config = config::load_app_config(&data_dir);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .build()
            .expect("tokio runtime");

        let this = Self {
            state: AppState::empty(),
            rev: 0,
            last_outgoing_ts: 0,
            update_sender,
            core_sender,
            shared_state,
            services,
            config,
            runtime,
            session: None,
            session_token: 0,
            thread: None,
            thread_epoch: 0,
            roster: Roster::default(),
            presence: PresenceTracker::default(),
        };

        // Ensure ChatApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    /// Refresh every derived slice from its owning store, then publish a full
    /// snapshot. Deriving on every emit keeps the slices from ever drifting
    /// out of sync with their owners.
    fn emit_state(&mut self) {
        self.state.conversations = self.roster.snapshot();
        self.state.presence = self.presence.snapshot();
        self.state.current_thread = self.thread.as_ref().map(thread_view);
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn emit_session(&mut self) {
        self.emit_state();
    }

    fn emit_busy(&mut self) {
        self.emit_state();
    }

    fn emit_thread(&mut self) {
        self.emit_state();
    }

    fn emit_roster(&mut self) {
        self.emit_state();
    }

    fn emit_presence(&mut self) {
        self.emit_state();
    }

    fn emit_toast(&mut self) {
        self.emit_state();
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Kept in state until the UI explicitly clears it, so a state()
        // resnapshot still contains it.
        self.state.toast = Some(msg.into());
        self.emit_toast();
    }

    fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    /// Drop everything scoped to the current identity: the open thread, the
    /// roster, presence, and the outgoing-timestamp watermark. The epoch bump
    /// invalidates every in-flight thread completion. Runs on logout and
    /// before a different identity logs in; thread and roster state must
    /// never carry across users.
    fn reset_user_state(&mut self) {
        self.thread_epoch = self.thread_epoch.wrapping_add(1);
        self.thread = None;
        self.roster.clear();
        self.presence.clear();
        self.last_outgoing_ts = 0;
    }

    fn set_busy(&mut self, f: impl FnOnce(&mut BusyState)) {
        let mut next = self.state.busy.clone();
        f(&mut next);
        if next != self.state.busy {
            self.state.busy = next;
            self.emit_busy();
        }
    }

    fn clear_busy(&mut self) {
        self.set_busy(|b| *b = BusyState::idle());
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(ref action) => {
                // Never log `?action` directly: it can contain message text.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action.clone());
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            // Session
            AppAction::RestoreSession => {
                self.set_busy(|b| b.logging_in = true);
                let Some(user_id) = self.services.identity.load_user_id() else {
                    self.clear_busy();
                    self.toast("No stored identity");
                    return;
                };
                if let Err(e) = self.start_session(user_id) {
                    self.clear_busy();
                    self.toast(format!("Restore session failed: {e:#}"));
                } else {
                    self.clear_busy();
                }
            }
            AppAction::Login { user_id } => {
                self.set_busy(|b| b.logging_in = true);
                if let Err(e) = self.start_session(user_id) {
                    self.clear_busy();
                    self.toast(format!("Login failed: {e:#}"));
                } else {
                    self.clear_busy();
                }
            }
            AppAction::Logout => {
                self.stop_session();
                self.reset_user_state();
                self.state.session = SessionState::LoggedOut;
                self.state.busy = BusyState::idle();
                self.state.toast = None;
                self.emit_session();
            }

            // Thread
            AppAction::OpenThread { counterpart_id } => {
                if !self.is_logged_in() {
                    self.toast("Please log in first");
                    return;
                }
                // The previous thread is cleared, not hidden: optimistic
                // entries must never bleed across counterparts, and the epoch
                // bump discards its late completions.
                self.thread_epoch = self.thread_epoch.wrapping_add(1);
                let epoch = self.thread_epoch;
                let mut thread = ThreadState::new(counterpart_id.clone(), epoch);
                thread.page_in_flight = true;
                self.thread = Some(thread);
                self.roster.on_thread_opened(&counterpart_id);
                self.presence.track(&counterpart_id);
                self.state.busy.opening_thread = true;
                self.emit_thread();
                self.fetch_history_page(&counterpart_id, 0, epoch);
            }
            AppAction::CloseThread => {
                self.thread_epoch = self.thread_epoch.wrapping_add(1);
                self.thread = None;
                self.presence.clear();
                self.state.busy.opening_thread = false;
                self.emit_thread();
            }
            AppAction::SendMessage {
                counterpart_id,
                text,
            } => {
                if !self.is_logged_in() {
                    self.toast("Please log in first");
                    return;
                }
                let text = text.trim().to_string();
                if text.is_empty() {
                    return;
                }
                let Some(my_user_id) = self.session.as_ref().map(|s| s.user_id.clone()) else {
                    return;
                };
                let Some(epoch) = self
                    .thread
                    .as_ref()
                    .filter(|t| t.counterpart_id == counterpart_id)
                    .map(|t| t.epoch)
                else {
                    tracing::warn!(%counterpart_id, "send for a thread that is not open");
                    return;
                };

                // Second-granularity timestamps: rapid sends can share the
                // same second. Keep outgoing timestamps monotonic so thread
                // ordering never ties.
                let ts = {
                    let now = now_seconds();
                    if now <= self.last_outgoing_ts {
                        self.last_outgoing_ts += 1;
                    } else {
                        self.last_outgoing_ts = now;
                    }
                    self.last_outgoing_ts
                };

                let local_id = uuid::Uuid::new_v4().to_string();
                if let Some(t) = self.thread.as_mut() {
                    t.push_optimistic(Message {
                        id: local_id.clone(),
                        sender_id: my_user_id,
                        recipient_id: counterpart_id.clone(),
                        text: text.clone(),
                        created_at: ts,
                        lifecycle: MessageLifecycle::Optimistic,
                    });
                }
                self.roster.on_message_sent(&counterpart_id, &text, ts);
                // The caller gets the optimistic state before any network
                // round trip completes.
                self.emit_thread();
                self.spawn_send(counterpart_id, local_id, text, epoch);
            }
            AppAction::RetryMessage {
                counterpart_id,
                message_id,
            } => {
                if !self.is_logged_in() {
                    return;
                }
                let (epoch, text) = {
                    let Some(t) = self
                        .thread
                        .as_mut()
                        .filter(|t| t.counterpart_id == counterpart_id)
                    else {
                        return;
                    };
                    let text = if t.mark_retrying(&message_id) {
                        t.find(&message_id).map(|m| m.text.clone())
                    } else {
                        None
                    };
                    (t.epoch, text)
                };
                let Some(text) = text else {
                    self.toast("Nothing to retry");
                    return;
                };
                self.emit_thread();
                // Same temporary id, same position: no duplicate bubble.
                self.spawn_send(counterpart_id, message_id, text, epoch);
            }
            AppAction::LoadOlderMessages { counterpart_id } => {
                if !self.is_logged_in() {
                    return;
                }
                let (epoch, week_index) = {
                    let Some(t) = self
                        .thread
                        .as_mut()
                        .filter(|t| t.counterpart_id == counterpart_id)
                    else {
                        return;
                    };
                    if t.exhausted || t.page_in_flight {
                        // Overlapping loads would corrupt cursor/anchor
                        // bookkeeping; exhaustion latches until a reset.
                        tracing::debug!(
                            exhausted = t.exhausted,
                            in_flight = t.page_in_flight,
                            "load_older ignored"
                        );
                        return;
                    }
                    t.page_in_flight = true;
                    // When the initial load failed, this is the retry path:
                    // refetch page 0 rather than skip past it.
                    let week_index = if t.initialized { t.cursor + 1 } else { 0 };
                    (t.epoch, week_index)
                };
                self.emit_thread();
                self.fetch_history_page(&counterpart_id, week_index, epoch);
            }

            // Presence
            AppAction::StartTyping => self.send_typing(true),
            AppAction::StopTyping => self.send_typing(false),

            // UI
            AppAction::ClearToast => {
                if self.state.toast.is_some() {
                    self.state.toast = None;
                    self.emit_toast();
                }
            }
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::Channel { token, event } => {
                // Ignore events from a torn-down subscription (logout/login
                // while the pump was still draining).
                if token != self.session_token || self.session.is_none() {
                    tracing::debug!("stale channel event discarded");
                    return;
                }
                self.dispatch_channel_event(event);
            }
            InternalEvent::ChannelClosed { token, reason } => {
                if token != self.session_token {
                    return;
                }
                // Presence freezes at the last known state; reconnecting and
                // resubscribing is the surrounding shell's job.
                tracing::warn!(?reason, "push channel closed");
            }
            InternalEvent::SendMessageResult {
                counterpart_id,
                local_id,
                epoch,
                receipt,
                error,
            } => {
                let ok = error.is_none()
                    && receipt.as_ref().map(|r| r.id.is_some()).unwrap_or(false);
                tracing::info!(ok, ?error, %counterpart_id, %local_id, "send_message_result");
                let changed = {
                    let Some(t) = self
                        .thread
                        .as_mut()
                        .filter(|t| t.counterpart_id == counterpart_id && t.epoch == epoch)
                    else {
                        tracing::debug!(%counterpart_id, "stale send result discarded");
                        return;
                    };
                    match (receipt, error) {
                        (Some(receipt), None) => match receipt.id {
                            Some(server_id) => t.confirm(&local_id, server_id, receipt.created_at),
                            // Non-error response without an identifier:
                            // ambiguous, handled as a failure so the user's
                            // text is never silently dropped.
                            None => t.mark_failed(
                                &local_id,
                                ServiceError::Ambiguous("response missing message id".into())
                                    .to_string(),
                            ),
                        },
                        (_, Some(reason)) => t.mark_failed(&local_id, reason),
                        (None, None) => t.mark_failed(&local_id, "empty send response".into()),
                    }
                };
                if changed {
                    self.emit_thread();
                }
            }
            InternalEvent::HistoryPageFetched {
                counterpart_id,
                epoch,
                week_index,
                page,
                error,
            } => {
                tracing::info!(%counterpart_id, week_index, ok = error.is_none(), "history_page_fetched");
                let is_initial = week_index == 0;
                {
                    let Some(t) = self
                        .thread
                        .as_mut()
                        .filter(|t| t.counterpart_id == counterpart_id && t.epoch == epoch)
                    else {
                        tracing::debug!(%counterpart_id, week_index, "stale page fetch discarded");
                        return;
                    };
                    t.page_in_flight = false;
                    match (page, error) {
                        (Some(page), None) => {
                            if is_initial {
                                t.replace_with_initial_page(page);
                            } else if page.is_empty() {
                                // Zero rows: no more history until the thread
                                // resets.
                                t.exhausted = true;
                                t.load_error = None;
                                t.anchor = None;
                            } else {
                                t.prepend_page(page);
                            }
                        }
                        (_, Some(e)) => {
                            // Retryable inline error: exhausted stays false,
                            // cursor unchanged.
                            t.load_error = Some(e);
                        }
                        (None, None) => {}
                    }
                }
                if is_initial {
                    self.state.busy.opening_thread = false;
                }
                self.emit_thread();
            }
            InternalEvent::LastSeenFetched {
                counterpart_id,
                epoch,
                last_seen_at,
            } => {
                if epoch != self.thread_epoch {
                    return;
                }
                if self.presence.set_last_seen(&counterpart_id, last_seen_at) {
                    self.emit_presence();
                }
            }
        }
    }

    /// Single typed dispatcher for inbound channel events.
    fn dispatch_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::MessageReceived {
                counterpart_id,
                message,
            } => {
                tracing::debug!(%counterpart_id, id = %message.id, "message_received");
                let open = self
                    .thread
                    .as_ref()
                    .map(|t| t.counterpart_id == counterpart_id)
                    .unwrap_or(false);
                self.roster.on_inbound_message(
                    &counterpart_id,
                    &message.text,
                    message.created_at,
                    open,
                );
                if open {
                    let my_user_id = self
                        .session
                        .as_ref()
                        .map(|s| s.user_id.clone())
                        .unwrap_or_default();
                    if let Some(t) = self.thread.as_mut() {
                        t.merge_inbound(message, &my_user_id);
                    }
                    self.emit_thread();
                } else {
                    self.emit_roster();
                }
            }
            ChannelEvent::PresenceOnline { user_id } => {
                if self.presence.on_online(&user_id) {
                    self.emit_presence();
                }
            }
            ChannelEvent::PresenceOffline { user_id } => {
                if self.presence.on_offline(&user_id) {
                    self.emit_presence();
                    self.fetch_last_seen(&user_id);
                }
            }
            ChannelEvent::TypingStart { from_user_id } => {
                if self.presence.on_typing(&from_user_id, true) {
                    self.emit_presence();
                }
            }
            ChannelEvent::TypingStop { from_user_id } => {
                if self.presence.on_typing(&from_user_id, false) {
                    self.emit_presence();
                }
            }
        }
    }

    fn send_typing(&mut self, typing: bool) {
        if !self.typing_events_enabled() {
            return;
        }
        let Some(to_user_id) = self.thread.as_ref().map(|t| t.counterpart_id.clone()) else {
            return;
        };
        let event = if typing {
            OutboundEvent::TypingStart { to_user_id }
        } else {
            OutboundEvent::TypingStop { to_user_id }
        };
        self.publish_outbound(event);
    }

    fn fetch_history_page(&mut self, counterpart_id: &str, week_index: u32, epoch: u64) {
        let data = self.services.data.clone();
        let tx = self.core_sender.clone();
        let counterpart_id = counterpart_id.to_string();
        self.runtime.spawn(async move {
            let (page, error) = match data.fetch_history_page(&counterpart_id, week_index).await {
                Ok(page) => (Some(page), None),
                Err(e) => (None, Some(e.to_string())),
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::HistoryPageFetched {
                    counterpart_id,
                    epoch,
                    week_index,
                    page,
                    error,
                },
            )));
        });
    }

    fn spawn_send(&mut self, counterpart_id: String, local_id: String, text: String, epoch: u64) {
        let data = self.services.data.clone();
        let tx = self.core_sender.clone();
        let timeout = self.send_timeout();
        self.runtime.spawn(async move {
            let (receipt, error) =
                match tokio::time::timeout(timeout, data.send_message(&counterpart_id, &text))
                    .await
                {
                    Ok(Ok(receipt)) => (Some(receipt), None),
                    Ok(Err(e)) => (None, Some(e.to_string())),
                    Err(_) => (
                        None,
                        Some(format!("send timed out after {}s", timeout.as_secs())),
                    ),
                };
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::SendMessageResult {
                    counterpart_id,
                    local_id,
                    epoch,
                    receipt,
                    error,
                },
            )));
        });
    }

    fn fetch_last_seen(&mut self, counterpart_id: &str) {
        let data = self.services.data.clone();
        let tx = self.core_sender.clone();
        let epoch = self.thread_epoch;
        let counterpart_id = counterpart_id.to_string();
        self.runtime.spawn(async move {
            match data.fetch_last_seen(&counterpart_id).await {
                Ok(last_seen_at) => {
                    let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::LastSeenFetched {
                        counterpart_id,
                        epoch,
                        last_seen_at,
                    })));
                }
                Err(e) => tracing::debug!(%e, "last-seen fetch failed"),
            }
        });
    }
}

fn thread_view(t: &ThreadState) -> ThreadViewState {
    ThreadViewState {
        counterpart_id: t.counterpart_id.clone(),
        messages: t.messages.clone(),
        date_groups: build_groups(&t.messages),
        can_load_older: !t.exhausted,
        loading_older: t.page_in_flight,
        load_error: t.load_error.clone(),
        anchor: t.anchor.clone(),
    }
}
