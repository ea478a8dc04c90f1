// ABOUTME: Relay orchestrator - applies inbound events to the relay table and performs side effects
// ABOUTME: Owns the delivery policy: which failures are logged, escalated, or mirrored to oversight

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::DeliveryError;
use crate::metrics;
use crate::notices;
use crate::relay::{EndOutcome, PairOutcome, RelayTable, RelayTarget};
use crate::traits::{
    CallbackAction, ChatId, IncomingEvent, MessageRef, Profile, RelayTransport, UserId,
};

/// Point-in-time counts for health reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelaySnapshot {
    pub waiting: usize,
    pub pairs: usize,
    pub seen: usize,
}

/// Drives the pairing and relay operations.
///
/// The table lock is held only while the table is mutated. Notifications go
/// out after the lock is released, so slow deliveries never stall other users.
pub struct RelayOrchestrator<T: RelayTransport> {
    transport: Arc<T>,
    table: Mutex<RelayTable>,
    oversight: Option<ChatId>,
}

impl<T: RelayTransport> RelayOrchestrator<T> {
    pub fn new(transport: Arc<T>, oversight: Option<ChatId>) -> Self {
        Self {
            transport,
            table: Mutex::new(RelayTable::new()),
            oversight,
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn oversight(&self) -> Option<ChatId> {
        self.oversight
    }

    /// Route a normalized event to its handler. Never fails: every error is
    /// logged (and possibly escalated) inside the handler.
    pub async fn handle_event(&self, event: IncomingEvent) {
        metrics::record_event(event.kind());
        match event {
            IncomingEvent::Start { user, chat } => self.on_start(&user, chat).await,
            IncomingEvent::Stop { user, chat } => self.on_stop(user.id, chat).await,
            IncomingEvent::GetId { chat } => self.on_get_id(chat).await,
            IncomingEvent::Callback {
                user,
                callback_id,
                action,
            } => self.on_callback(user.id, &callback_id, action).await,
            IncomingEvent::Message {
                user,
                chat,
                message,
                text,
            } => self.on_message(user.id, chat, message, text.as_deref()).await,
        }
    }

    // ─── Commands ───────────────────────────────────────────────

    /// `/start`: record first contact, then show the welcome keyboard
    pub async fn on_start(&self, user: &Profile, chat: ChatId) {
        if self.is_banned(user.id).await {
            self.reply(chat, notices::BANNED).await;
            return;
        }

        self.on_first_contact(user).await;

        let keyboard = notices::welcome_keyboard();
        if let Err(e) = self
            .transport
            .send_text_with_buttons(chat, notices::WELCOME, &keyboard)
            .await
        {
            log_user_delivery_failure(&e, chat, "welcome");
        }
    }

    /// `/stop`
    pub async fn on_stop(&self, uid: UserId, chat: ChatId) {
        self.end_chat(uid, chat).await;
    }

    /// `/getid`: report the chat's id, mainly for configuring the oversight group
    pub async fn on_get_id(&self, chat: ChatId) {
        self.reply(chat, &notices::group_id(chat)).await;
    }

    /// Inline button press. The query is acknowledged before anything else.
    pub async fn on_callback(&self, uid: UserId, callback_id: &str, action: CallbackAction) {
        if let Err(e) = self.transport.answer_callback(callback_id).await {
            tracing::debug!(user_id = %uid, error = %e, "Failed to acknowledge callback");
        }

        match action {
            CallbackAction::FindPartner => self.request_partner(uid).await,
            CallbackAction::Help => self.reply(uid.chat(), notices::HELP).await,
        }
    }

    /// Non-command message from a private chat
    pub async fn on_message(
        &self,
        uid: UserId,
        chat: ChatId,
        message: MessageRef,
        text: Option<&str>,
    ) {
        self.relay_message(uid, chat, message, text).await;
    }

    // ─── Operations ─────────────────────────────────────────────

    /// Match the user with the oldest waiter or put them in the queue
    pub async fn request_partner(&self, uid: UserId) {
        let outcome = {
            let mut table = self.table.lock().await;
            let outcome = table.request_partner(uid);
            metrics::set_queue_gauges(table.waiting_len(), table.pair_count());
            outcome
        };

        match outcome {
            PairOutcome::Banned => self.reply(uid.chat(), notices::BANNED).await,
            PairOutcome::AlreadyWaiting => self.reply(uid.chat(), notices::ALREADY_WAITING).await,
            PairOutcome::AlreadyPaired { .. } => {
                self.reply(uid.chat(), notices::ALREADY_CHATTING).await
            }
            PairOutcome::Queued => {
                tracing::info!(user_id = %uid, "User waiting for a partner");
                self.reply(uid.chat(), notices::SEARCHING).await;
            }
            PairOutcome::Paired { partner } => {
                tracing::info!(user_id = %uid, partner_id = %partner, "Users paired");
                metrics::record_pair_created();
                self.reply(uid.chat(), notices::CONNECTED).await;
                self.reply(partner.chat(), notices::CONNECTED).await;
            }
        }
    }

    /// Copy a message to the sender's partner and mirror it to oversight
    pub async fn relay_message(
        &self,
        uid: UserId,
        source_chat: ChatId,
        message: MessageRef,
        text: Option<&str>,
    ) {
        let target = self.table.lock().await.partner_of(uid);

        let partner = match target {
            RelayTarget::Banned => {
                tracing::debug!(user_id = %uid, "Dropping message from banned user");
                return;
            }
            RelayTarget::NoPartner => {
                self.reply(source_chat, notices::NOT_IN_CHAT).await;
                return;
            }
            RelayTarget::Partner(partner) => partner,
        };

        match self
            .transport
            .copy_message(partner.chat(), source_chat, message)
            .await
        {
            Ok(()) => metrics::record_message_relayed(),
            Err(e @ DeliveryError::Transient(_)) => {
                metrics::record_delivery_failure(e.kind(), "user");
                tracing::warn!(
                    user_id = %uid,
                    partner_id = %partner,
                    error = %e,
                    "Ignored error while forwarding"
                );
            }
            Err(e @ DeliveryError::Unexpected(_)) => {
                metrics::record_delivery_failure(e.kind(), "user");
                tracing::error!(
                    user_id = %uid,
                    partner_id = %partner,
                    error = %e,
                    "Critical error while forwarding"
                );
                self.notify_oversight(&notices::critical_error(e.reason()), "critical_error")
                    .await;
            }
        }

        self.notify_oversight(&notices::relay_mirror(uid, partner, text), "relay_mirror")
            .await;
    }

    /// Dissolve the user's pair and tell both sides
    pub async fn end_chat(&self, uid: UserId, reply_chat: ChatId) {
        let outcome = {
            let mut table = self.table.lock().await;
            let outcome = table.end_chat(uid);
            metrics::set_queue_gauges(table.waiting_len(), table.pair_count());
            outcome
        };

        match outcome {
            EndOutcome::Banned => self.reply(reply_chat, notices::BANNED).await,
            EndOutcome::NotChatting => self.reply(reply_chat, notices::NOT_CHATTING).await,
            EndOutcome::Ended { partner } => {
                tracing::info!(user_id = %uid, partner_id = %partner, "Chat ended");
                metrics::record_chat_ended();
                self.reply(uid.chat(), notices::CHAT_ENDED).await;
                self.reply(partner.chat(), notices::PARTNER_LEFT).await;
                self.notify_oversight(&notices::chat_end(uid, partner), "chat_end")
                    .await;
            }
        }
    }

    /// Introduce a user to oversight the first time they are seen.
    /// Returns true if this was their first contact.
    pub async fn on_first_contact(&self, user: &Profile) -> bool {
        let first = self.table.lock().await.first_contact(user.id);
        if !first {
            return false;
        }

        tracing::info!(user_id = %user.id, "New user");
        metrics::record_new_user();
        self.notify_oversight(&notices::new_user(user), "new_user")
            .await;
        true
    }

    // ─── Moderation ─────────────────────────────────────────────

    /// Ban a user for the rest of the process lifetime. Existing waiting or
    /// paired entries are left in place. Returns false if already banned.
    pub async fn ban(&self, uid: UserId) -> bool {
        let added = self.table.lock().await.ban(uid);
        if added {
            tracing::info!(user_id = %uid, "User banned");
        }
        added
    }

    pub async fn is_banned(&self, uid: UserId) -> bool {
        self.table.lock().await.is_banned(uid)
    }

    pub async fn snapshot(&self) -> RelaySnapshot {
        let table = self.table.lock().await;
        RelaySnapshot {
            waiting: table.waiting_len(),
            pairs: table.pair_count(),
            seen: table.seen_count(),
        }
    }

    /// Verify the table invariants, describing the first violation found
    pub async fn check_invariants(&self) -> Result<(), String> {
        self.table.lock().await.check_invariants()
    }

    // ─── Delivery helpers ───────────────────────────────────────

    /// Best-effort text to a user-facing chat
    async fn reply(&self, chat: ChatId, text: &str) {
        if let Err(e) = self.transport.send_text(chat, text).await {
            log_user_delivery_failure(&e, chat, "notice");
        }
    }

    /// Best-effort text to the oversight channel. Failures are logged only,
    /// never escalated.
    async fn notify_oversight(&self, text: &str, what: &'static str) {
        let Some(dest) = self.oversight else {
            return;
        };
        if let Err(e) = self.transport.send_text(dest, text).await {
            metrics::record_delivery_failure(e.kind(), "oversight");
            tracing::warn!(
                oversight_id = %dest,
                notice = what,
                error = %e,
                "Oversight delivery failed"
            );
        }
    }
}

fn log_user_delivery_failure(err: &DeliveryError, chat: ChatId, what: &'static str) {
    metrics::record_delivery_failure(err.kind(), "user");
    if err.is_transient() {
        tracing::warn!(chat_id = %chat, notice = what, error = %err, "Notice not delivered");
    } else {
        tracing::error!(chat_id = %chat, notice = what, error = %err, "Notice delivery failed");
    }
}
