// ABOUTME: Integration tests for the relay orchestrator
// ABOUTME: Uses a recording mock transport with scripted delivery failures

use anonchat_core::notices;
use anonchat_core::traits::{
    CallbackAction, ChatId, IncomingEvent, Keyboard, MessageRef, Profile, RelayTransport, UserId,
};
use anonchat_core::{DeliveryError, RelayOrchestrator};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const OVERSIGHT: ChatId = ChatId(-1000);

/// One outbound call recorded by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
enum Sent {
    Text { target: ChatId, text: String },
    Buttons { target: ChatId, text: String, buttons: Keyboard },
    Copy { target: ChatId, source: ChatId, message: MessageRef },
    Answer { callback_id: String },
}

/// Mock transport that records every call and fails on demand
#[derive(Default)]
struct MockTransport {
    sent: Mutex<Vec<Sent>>,
    copy_failures: Mutex<HashMap<ChatId, DeliveryError>>,
    text_failures: Mutex<HashMap<ChatId, DeliveryError>>,
}

impl MockTransport {
    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    fn fail_copies_to(&self, target: ChatId, err: DeliveryError) {
        self.copy_failures.lock().unwrap().insert(target, err);
    }

    fn fail_texts_to(&self, target: ChatId, err: DeliveryError) {
        self.text_failures.lock().unwrap().insert(target, err);
    }

    /// Texts delivered (or attempted) to a chat, in order
    fn texts_to(&self, target: ChatId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { target: t, text } if t == target => Some(text),
                _ => None,
            })
            .collect()
    }

    fn copies(&self) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| matches!(s, Sent::Copy { .. }))
            .collect()
    }
}

#[async_trait]
impl RelayTransport for MockTransport {
    async fn send_text(&self, target: ChatId, text: &str) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(Sent::Text {
            target,
            text: text.to_string(),
        });
        match self.text_failures.lock().unwrap().get(&target) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn send_text_with_buttons(
        &self,
        target: ChatId,
        text: &str,
        buttons: &Keyboard,
    ) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(Sent::Buttons {
            target,
            text: text.to_string(),
            buttons: buttons.clone(),
        });
        Ok(())
    }

    async fn copy_message(
        &self,
        target: ChatId,
        source_chat: ChatId,
        message: MessageRef,
    ) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(Sent::Copy {
            target,
            source: source_chat,
            message,
        });
        match self.copy_failures.lock().unwrap().get(&target) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(Sent::Answer {
            callback_id: callback_id.to_string(),
        });
        Ok(())
    }
}

fn setup(oversight: Option<ChatId>) -> (Arc<MockTransport>, RelayOrchestrator<MockTransport>) {
    let transport = Arc::new(MockTransport::default());
    let orchestrator = RelayOrchestrator::new(Arc::clone(&transport), oversight);
    (transport, orchestrator)
}

fn user(id: i64) -> Profile {
    Profile::with_name(UserId(id), format!("User {}", id), None)
}

fn find_partner(id: i64) -> IncomingEvent {
    IncomingEvent::Callback {
        user: user(id),
        callback_id: format!("cb-{}", id),
        action: CallbackAction::FindPartner,
    }
}

fn text_message(id: i64, msg: i32, text: &str) -> IncomingEvent {
    IncomingEvent::Message {
        user: user(id),
        chat: ChatId(id),
        message: MessageRef(msg),
        text: Some(text.to_string()),
    }
}

fn stop(id: i64) -> IncomingEvent {
    IncomingEvent::Stop {
        user: user(id),
        chat: ChatId(id),
    }
}

// =============================================================================
// Pairing
// =============================================================================

#[tokio::test]
async fn test_first_request_searches() {
    let (transport, orch) = setup(None);
    orch.handle_event(find_partner(1)).await;

    assert_eq!(transport.texts_to(ChatId(1)), vec![notices::SEARCHING]);
    assert_eq!(orch.snapshot().await.waiting, 1);
    assert!(transport.sent().contains(&Sent::Answer {
        callback_id: "cb-1".to_string()
    }));
}

#[tokio::test]
async fn test_second_request_connects_both() {
    let (transport, orch) = setup(None);
    orch.handle_event(find_partner(1)).await;
    orch.handle_event(find_partner(2)).await;

    assert_eq!(
        transport.texts_to(ChatId(1)),
        vec![notices::SEARCHING, notices::CONNECTED]
    );
    assert_eq!(transport.texts_to(ChatId(2)), vec![notices::CONNECTED]);

    let snap = orch.snapshot().await;
    assert_eq!(snap.waiting, 0);
    assert_eq!(snap.pairs, 1);
    orch.check_invariants().await.unwrap();
}

#[tokio::test]
async fn test_pairs_follow_arrival_order() {
    let (transport, orch) = setup(None);
    for id in 1..=6 {
        orch.handle_event(find_partner(id)).await;
    }
    orch.check_invariants().await.unwrap();
    assert_eq!(orch.snapshot().await.pairs, 3);

    // 2 talks to 1, 4 to 3, 6 to 5
    for (sender, partner) in [(2, 1), (4, 3), (6, 5)] {
        transport.clear();
        orch.handle_event(text_message(sender, 10, "hi")).await;
        assert_eq!(
            transport.copies(),
            vec![Sent::Copy {
                target: ChatId(partner),
                source: ChatId(sender),
                message: MessageRef(10),
            }]
        );
    }
}

#[tokio::test]
async fn test_duplicate_wait_request() {
    let (transport, orch) = setup(None);
    orch.handle_event(find_partner(1)).await;
    orch.handle_event(find_partner(1)).await;

    assert_eq!(
        transport.texts_to(ChatId(1)),
        vec![notices::SEARCHING, notices::ALREADY_WAITING]
    );
    assert_eq!(orch.snapshot().await.waiting, 1);
}

#[tokio::test]
async fn test_paired_user_requesting_again_keeps_pair() {
    let (transport, orch) = setup(None);
    orch.handle_event(find_partner(1)).await;
    orch.handle_event(find_partner(2)).await;
    orch.handle_event(find_partner(3)).await;
    transport.clear();

    orch.handle_event(find_partner(2)).await;

    assert_eq!(transport.texts_to(ChatId(2)), vec![notices::ALREADY_CHATTING]);
    let snap = orch.snapshot().await;
    assert_eq!(snap.pairs, 1);
    assert_eq!(snap.waiting, 1);
    orch.check_invariants().await.unwrap();
}

#[tokio::test]
async fn test_help_callback() {
    let (transport, orch) = setup(None);
    orch.handle_event(IncomingEvent::Callback {
        user: user(4),
        callback_id: "cb".to_string(),
        action: CallbackAction::Help,
    })
    .await;

    assert_eq!(transport.texts_to(ChatId(4)), vec![notices::HELP]);
    assert_eq!(orch.snapshot().await.waiting, 0);
}

// =============================================================================
// Relay
// =============================================================================

#[tokio::test]
async fn test_scenario_pair_relay_and_end() {
    let (transport, orch) = setup(Some(OVERSIGHT));
    let (a, b) = (100, 200);

    orch.handle_event(find_partner(a)).await;
    orch.handle_event(find_partner(b)).await;
    transport.clear();

    orch.handle_event(text_message(a, 55, "hello")).await;
    assert_eq!(
        transport.copies(),
        vec![Sent::Copy {
            target: ChatId(b),
            source: ChatId(a),
            message: MessageRef(55),
        }]
    );
    assert_eq!(transport.texts_to(OVERSIGHT), vec!["👁 100 → 200: hello"]);

    transport.clear();
    orch.handle_event(stop(a)).await;
    assert_eq!(transport.texts_to(ChatId(a)), vec![notices::CHAT_ENDED]);
    assert_eq!(transport.texts_to(ChatId(b)), vec![notices::PARTNER_LEFT]);
    assert_eq!(
        transport.texts_to(OVERSIGHT),
        vec!["🚪 User 100 ended chat with User 200"]
    );
    assert_eq!(orch.snapshot().await.pairs, 0);
}

#[tokio::test]
async fn test_message_without_partner_is_not_relayed() {
    let (transport, orch) = setup(Some(OVERSIGHT));
    orch.handle_event(text_message(1, 1, "anyone?")).await;

    assert!(transport.copies().is_empty());
    assert_eq!(transport.texts_to(ChatId(1)), vec![notices::NOT_IN_CHAT]);
    assert!(transport.texts_to(OVERSIGHT).is_empty());
}

#[tokio::test]
async fn test_waiting_user_message_is_not_relayed() {
    let (transport, orch) = setup(None);
    orch.handle_event(find_partner(1)).await;
    transport.clear();
    orch.handle_event(text_message(1, 2, "still here")).await;

    assert!(transport.copies().is_empty());
    assert_eq!(transport.texts_to(ChatId(1)), vec![notices::NOT_IN_CHAT]);
}

#[tokio::test]
async fn test_non_text_message_mirrors_placeholder() {
    let (transport, orch) = setup(Some(OVERSIGHT));
    orch.handle_event(find_partner(1)).await;
    orch.handle_event(find_partner(2)).await;
    transport.clear();

    orch.handle_event(IncomingEvent::Message {
        user: user(1),
        chat: ChatId(1),
        message: MessageRef(9),
        text: None,
    })
    .await;

    assert_eq!(transport.copies().len(), 1);
    assert_eq!(
        transport.texts_to(OVERSIGHT),
        vec!["👁 1 → 2: [non-text message]"]
    );
}

#[tokio::test]
async fn test_transient_copy_failure_is_silent() {
    let (transport, orch) = setup(Some(OVERSIGHT));
    orch.handle_event(find_partner(1)).await;
    orch.handle_event(find_partner(2)).await;
    transport.fail_copies_to(ChatId(2), DeliveryError::transient("bot was blocked by the user"));
    transport.clear();

    orch.handle_event(text_message(1, 3, "you there?")).await;

    // No error notice to the sender, mirror still happens, no critical report
    assert!(transport.texts_to(ChatId(1)).is_empty());
    assert_eq!(transport.texts_to(OVERSIGHT), vec!["👁 1 → 2: you there?"]);
}

#[tokio::test]
async fn test_unexpected_copy_failure_is_escalated() {
    let (transport, orch) = setup(Some(OVERSIGHT));
    orch.handle_event(find_partner(1)).await;
    orch.handle_event(find_partner(2)).await;
    transport.fail_copies_to(ChatId(2), DeliveryError::unexpected("Too many requests"));
    transport.clear();

    orch.handle_event(text_message(1, 3, "ping")).await;

    assert!(transport.texts_to(ChatId(1)).is_empty());
    assert_eq!(
        transport.texts_to(OVERSIGHT),
        vec!["⚠️ Critical error: Too many requests", "👁 1 → 2: ping"]
    );
    // The pair survives a failed delivery
    assert_eq!(orch.snapshot().await.pairs, 1);
}

#[tokio::test]
async fn test_unexpected_copy_failure_without_oversight() {
    let (transport, orch) = setup(None);
    orch.handle_event(find_partner(1)).await;
    orch.handle_event(find_partner(2)).await;
    transport.fail_copies_to(ChatId(2), DeliveryError::unexpected("boom"));
    transport.clear();

    orch.handle_event(text_message(1, 3, "ping")).await;

    // Only the copy attempt; nothing else goes out
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn test_oversight_failure_does_not_affect_relay() {
    let (transport, orch) = setup(Some(OVERSIGHT));
    transport.fail_texts_to(OVERSIGHT, DeliveryError::unexpected("chat not found"));
    orch.handle_event(find_partner(1)).await;
    orch.handle_event(find_partner(2)).await;

    orch.handle_event(text_message(1, 3, "first")).await;
    orch.handle_event(text_message(1, 4, "second")).await;

    let copies = transport.copies();
    assert_eq!(copies.len(), 2);
    assert!(matches!(copies[1], Sent::Copy { message: MessageRef(4), .. }));
    assert_eq!(orch.snapshot().await.pairs, 1);
}

#[tokio::test]
async fn test_messages_from_one_sender_keep_order() {
    let (transport, orch) = setup(None);
    orch.handle_event(find_partner(1)).await;
    orch.handle_event(find_partner(2)).await;

    for msg in 1..=5 {
        orch.handle_event(text_message(2, msg, "x")).await;
    }

    let order: Vec<i32> = transport
        .copies()
        .into_iter()
        .filter_map(|s| match s {
            Sent::Copy { message, .. } => Some(message.0),
            _ => None,
        })
        .collect();
    assert_eq!(order, vec![1, 2, 3, 4, 5]);
}

// =============================================================================
// Ending chats
// =============================================================================

#[tokio::test]
async fn test_stop_twice_reports_not_chatting() {
    let (transport, orch) = setup(None);
    orch.handle_event(find_partner(1)).await;
    orch.handle_event(find_partner(2)).await;
    orch.handle_event(stop(2)).await;
    transport.clear();

    orch.handle_event(stop(2)).await;
    orch.handle_event(stop(1)).await;

    assert_eq!(transport.texts_to(ChatId(2)), vec![notices::NOT_CHATTING]);
    assert_eq!(transport.texts_to(ChatId(1)), vec![notices::NOT_CHATTING]);
}

#[tokio::test]
async fn test_stop_replies_in_originating_chat() {
    let (transport, orch) = setup(None);
    orch.handle_event(IncomingEvent::Stop {
        user: user(1),
        chat: ChatId(-42),
    })
    .await;
    assert_eq!(transport.texts_to(ChatId(-42)), vec![notices::NOT_CHATTING]);
}

#[tokio::test]
async fn test_ended_users_can_pair_again() {
    let (transport, orch) = setup(None);
    orch.handle_event(find_partner(1)).await;
    orch.handle_event(find_partner(2)).await;
    orch.handle_event(stop(1)).await;
    transport.clear();

    orch.handle_event(find_partner(2)).await;
    orch.handle_event(find_partner(1)).await;

    assert_eq!(
        transport.texts_to(ChatId(2)),
        vec![notices::SEARCHING, notices::CONNECTED]
    );
    assert_eq!(transport.texts_to(ChatId(1)), vec![notices::CONNECTED]);
    orch.check_invariants().await.unwrap();
}

#[tokio::test]
async fn test_partner_notice_failure_still_ends_chat() {
    let (transport, orch) = setup(None);
    orch.handle_event(find_partner(1)).await;
    orch.handle_event(find_partner(2)).await;
    transport.fail_texts_to(ChatId(2), DeliveryError::transient("user is deactivated"));

    orch.handle_event(stop(1)).await;

    assert_eq!(orch.snapshot().await.pairs, 0);
    assert_eq!(transport.texts_to(ChatId(1)).last().unwrap(), notices::CHAT_ENDED);
}

// =============================================================================
// Onboarding
// =============================================================================

#[tokio::test]
async fn test_start_shows_welcome_keyboard() {
    let (transport, orch) = setup(None);
    orch.handle_event(IncomingEvent::Start {
        user: user(1),
        chat: ChatId(1),
    })
    .await;

    assert_eq!(
        transport.sent(),
        vec![Sent::Buttons {
            target: ChatId(1),
            text: notices::WELCOME.to_string(),
            buttons: notices::welcome_keyboard(),
        }]
    );
}

#[tokio::test]
async fn test_first_contact_notifies_oversight_once() {
    let (transport, orch) = setup(Some(OVERSIGHT));
    let profile = Profile::with_name(UserId(77), "Grace Hopper", Some("grace"));

    for _ in 0..3 {
        orch.handle_event(IncomingEvent::Start {
            user: profile.clone(),
            chat: ChatId(77),
        })
        .await;
    }

    let intro = transport.texts_to(OVERSIGHT);
    assert_eq!(intro.len(), 1);
    assert!(intro[0].contains("Grace Hopper"));
    assert!(intro[0].contains("@grace"));
    assert!(intro[0].contains("77"));
    assert_eq!(orch.snapshot().await.seen, 1);
}

#[tokio::test]
async fn test_first_contact_without_oversight_still_recorded() {
    let (transport, orch) = setup(None);
    assert!(orch.on_first_contact(&user(5)).await);
    assert!(!orch.on_first_contact(&user(5)).await);
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_first_contact_survives_oversight_failure() {
    let (transport, orch) = setup(Some(OVERSIGHT));
    transport.fail_texts_to(OVERSIGHT, DeliveryError::transient("forbidden"));

    orch.handle_event(IncomingEvent::Start {
        user: user(8),
        chat: ChatId(8),
    })
    .await;

    // Welcome still delivered and the user is marked seen
    assert!(transport
        .sent()
        .iter()
        .any(|s| matches!(s, Sent::Buttons { target: ChatId(8), .. })));
    assert!(!orch.on_first_contact(&user(8)).await);
}

#[tokio::test]
async fn test_getid_reports_chat_id() {
    let (transport, orch) = setup(None);
    orch.handle_event(IncomingEvent::GetId {
        chat: ChatId(-100555),
    })
    .await;
    assert_eq!(
        transport.texts_to(ChatId(-100555)),
        vec!["📌 This group ID is: `-100555`"]
    );
}

// =============================================================================
// Bans
// =============================================================================

#[tokio::test]
async fn test_banned_user_cannot_change_state() {
    let (transport, orch) = setup(Some(OVERSIGHT));
    assert!(orch.ban(UserId(9)).await);
    assert!(!orch.ban(UserId(9)).await);
    assert!(orch.is_banned(UserId(9)).await);

    orch.handle_event(find_partner(9)).await;
    orch.handle_event(text_message(9, 1, "let me in")).await;
    orch.handle_event(stop(9)).await;

    let snap = orch.snapshot().await;
    assert_eq!(snap.waiting, 0);
    assert_eq!(snap.pairs, 0);
    assert!(transport.copies().is_empty());
    assert!(transport.texts_to(OVERSIGHT).is_empty());
    // find_partner and /stop are told; the message is dropped silently
    assert_eq!(
        transport.texts_to(ChatId(9)),
        vec![notices::BANNED, notices::BANNED]
    );
}

#[tokio::test]
async fn test_banned_start_skips_onboarding() {
    let (transport, orch) = setup(Some(OVERSIGHT));
    orch.ban(UserId(3)).await;
    orch.handle_event(IncomingEvent::Start {
        user: user(3),
        chat: ChatId(3),
    })
    .await;

    assert_eq!(
        transport.sent(),
        vec![Sent::Text {
            target: ChatId(3),
            text: notices::BANNED.to_string(),
        }]
    );
    assert_eq!(orch.snapshot().await.seen, 0);
}

#[tokio::test]
async fn test_ban_keeps_existing_pair_but_blocks_sender() {
    let (transport, orch) = setup(None);
    orch.handle_event(find_partner(1)).await;
    orch.handle_event(find_partner(2)).await;
    orch.ban(UserId(1)).await;
    transport.clear();

    orch.handle_event(text_message(1, 1, "blocked")).await;
    assert!(transport.copies().is_empty());

    orch.handle_event(text_message(2, 2, "still works")).await;
    assert_eq!(transport.copies().len(), 1);
    assert_eq!(orch.snapshot().await.pairs, 1);
}

#[tokio::test]
async fn test_concurrent_requests_keep_invariants() {
    let transport = Arc::new(MockTransport::default());
    let orch = Arc::new(RelayOrchestrator::new(Arc::clone(&transport), None));

    let mut handles = Vec::new();
    for id in 0..40 {
        let orch = Arc::clone(&orch);
        handles.push(tokio::spawn(async move {
            orch.handle_event(find_partner(id)).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    orch.check_invariants().await.unwrap();
    let snap = orch.snapshot().await;
    assert_eq!(snap.pairs, 20);
    assert_eq!(snap.waiting, 0);
}
