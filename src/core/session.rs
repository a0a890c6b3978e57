// Session lifecycle + push-channel subscription pump.

use super::*;

impl AppCore {
    pub(super) fn start_session(&mut self, user_id: String) -> anyhow::Result<()> {
        // Tear down any existing session and drop all state scoped to the old
        // identity; its in-flight completions are invalidated by the token
        // and epoch bumps.
        self.stop_session();
        self.reset_user_state();

        let user_id = user_id.trim().to_string();
        anyhow::ensure!(!user_id.is_empty(), "empty user id");

        tracing::info!(user_id = %user_id, "start_session");

        self.session_token = self.session_token.wrapping_add(1);
        let token = self.session_token;
        let alive = Arc::new(AtomicBool::new(true));

        self.session = Some(Session {
            user_id: user_id.clone(),
            token,
            alive: alive.clone(),
        });
        self.state.session = SessionState::Active {
            user_id: user_id.clone(),
        };

        // One channel subscription per active identity. The pump forwards every
        // inbound event through the typed dispatcher on the actor thread.
        let channel = self.services.channel.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let events = match channel.subscribe(&user_id).await {
                Ok(rx) => rx,
                Err(e) => {
                    tracing::warn!(%e, "push channel subscribe failed");
                    let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::ChannelClosed {
                        token,
                        reason: Some(e.to_string()),
                    })));
                    return;
                }
            };
            while let Ok(event) = events.recv_async().await {
                if !alive.load(Ordering::SeqCst) {
                    return;
                }
                if tx
                    .send(CoreMsg::Internal(Box::new(InternalEvent::Channel {
                        token,
                        event,
                    })))
                    .is_err()
                {
                    return;
                }
            }
            // Sender side dropped: the channel disconnected. Reconnecting and
            // resubscribing is the surrounding shell's job.
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::ChannelClosed {
                token,
                reason: None,
            })));
        });

        self.emit_session();
        Ok(())
    }

    pub(super) fn stop_session(&mut self) {
        // Invalidate in-flight completions (sends, page fetches, channel events).
        self.session_token = self.session_token.wrapping_add(1);

        if let Some(sess) = self.session.take() {
            tracing::info!(token = sess.token, "stop_session");
            sess.alive.store(false, Ordering::SeqCst);
            let channel = self.services.channel.clone();
            let user_id = sess.user_id;
            self.runtime.spawn(async move {
                channel.unsubscribe(&user_id).await;
            });
        }
    }

    /// Fire-and-forget outbound channel event scoped to the active identity.
    pub(super) fn publish_outbound(&self, event: OutboundEvent) {
        let Some(sess) = self.session.as_ref() else {
            return;
        };
        let channel = self.services.channel.clone();
        let user_id = sess.user_id.clone();
        self.runtime.spawn(async move {
            if let Err(e) = channel.publish(&user_id, event).await {
                tracing::debug!(%e, "outbound channel event dropped");
            }
        });
    }
}
