//! The per-event orchestrator.
//!
//! One inbound webhook event goes in; a list of reply/push instructions comes out. All business collaborators are
//! reached through the traits in [`crate::traits`], so every transition in the conversation state machine is
//! exercisable in tests without a network.
//!
//! Text routing precedence: pending-order continuation > registration continuation > explicit intent keywords >
//! bare phone fallback > log-only no-op. Menu and points are stateless one-shots but never fire while an order or
//! registration conversation is open.

use chrono::Utc;
use cog_common::PhoneNumber;
use log::*;
use thiserror::Error;

use crate::{
    bot_types::{
        CardEntry,
        Channel,
        EventKind,
        InboundEvent,
        MessageBody,
        NewOrderRequest,
        OrderLine,
        OutboundMessage,
        ParsedOrder,
        PendingOrder,
        ProfileStatus,
        UserProfile,
    },
    helpers::next_delivery_date,
    intent::{Intent, IntentTable},
    order_parser::{contains_quantity_marker, parse_order_text},
    settings::{render, BotSettings},
    state::ConversationState,
    traits::{BotBackend, CatalogError, DirectoryError, ProfileError, StateStore},
};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Profile store failure: {0}")]
    Profile(#[from] ProfileError),
    #[error("Customer directory failure: {0}")]
    Directory(#[from] DirectoryError),
    #[error("Catalog gateway failure: {0}")]
    Catalog(#[from] CatalogError),
    #[error("Event is missing a user id")]
    MissingUserId,
}

/// `EventDispatcher` drives one inbound event end-to-end: profile bookkeeping, intent routing, state transitions,
/// order finalization. It performs no direct network I/O and sends nothing itself; the returned
/// [`OutboundMessage`] list is the complete set of side effects on the messaging channel.
pub struct EventDispatcher<B, S> {
    backend: B,
    state: S,
}

impl<B, S> EventDispatcher<B, S> {
    pub fn new(backend: B, state: S) -> Self {
        Self { backend, state }
    }
}

impl<B, S> EventDispatcher<B, S>
where
    B: BotBackend,
    S: StateStore,
{
    pub async fn dispatch(
        &self,
        event: &InboundEvent,
        settings: &BotSettings,
    ) -> Result<Vec<OutboundMessage>, DispatchError> {
        if event.user_id.is_empty() {
            return Err(DispatchError::MissingUserId);
        }
        if !settings.enabled {
            debug!("🤖️ Bot is disabled. Acknowledging event for {} without processing.", event.user_id);
            return Ok(Vec::new());
        }
        let profile = self.backend.ensure_profile(&event.user_id, event.display_name.as_deref()).await?;
        match &event.kind {
            EventKind::Unfollow => {
                let changed = self.backend.set_status(&event.user_id, ProfileStatus::Blocked).await?;
                if changed {
                    info!("🤖️ User {} unfollowed; profile blocked.", event.user_id);
                } else {
                    debug!("🤖️ Unfollow for already-blocked user {}; no-op.", event.user_id);
                }
                self.state.clear(&event.user_id).await;
                Ok(Vec::new())
            },
            EventKind::Follow => {
                self.backend.set_status(&event.user_id, ProfileStatus::Active).await?;
                info!("🤖️ User {} followed.", event.user_id);
                Ok(vec![outgoing(event, text_body(settings.prompts.greeting.clone()))])
            },
            EventKind::OtherMessage => {
                // ensure_profile already recorded last_seen; nothing else to do for non-text messages
                trace!("🤖️ Non-text message from {}; bookkeeping only.", event.user_id);
                Ok(Vec::new())
            },
            EventKind::TextMessage(text) => self.handle_text(event, &profile, text.trim(), settings).await,
        }
    }

    async fn handle_text(
        &self,
        event: &InboundEvent,
        profile: &UserProfile,
        text: &str,
        settings: &BotSettings,
    ) -> Result<Vec<OutboundMessage>, DispatchError> {
        let intents = IntentTable::from_settings(settings);
        match self.state.get(&event.user_id).await {
            Some(ConversationState::PendingOrder(pending)) => {
                self.continue_pending_order(event, profile, text, pending, settings, &intents).await
            },
            Some(ConversationState::AwaitingPhone { name, pending }) => {
                self.continue_registration(event, profile, text, name, pending, settings, &intents).await
            },
            None => self.handle_idle(event, profile, text, settings, &intents).await,
        }
    }

    //------------------------------------    PendingOrderUnconfirmed    ------------------------------------------

    async fn continue_pending_order(
        &self,
        event: &InboundEvent,
        profile: &UserProfile,
        text: &str,
        pending: PendingOrder,
        settings: &BotSettings,
        intents: &IntentTable,
    ) -> Result<Vec<OutboundMessage>, DispatchError> {
        if intents.is_confirm(text) {
            return Ok(self.finalize_order(event, pending, settings).await);
        }
        if intents.is_cancel(text) {
            self.state.clear(&event.user_id).await;
            info!("🤖️ User {} cancelled their pending order.", event.user_id);
            return Ok(vec![outgoing(event, text_body(settings.prompts.order_cancelled.clone()))]);
        }
        if contains_quantity_marker(text, settings) {
            // Last write wins: the old pending order is discarded, never merged
            debug!("🤖️ User {} sent new order lines while an order was pending; replacing it.", event.user_id);
            self.state.clear(&event.user_id).await;
            return self.start_order(event, profile, text, settings, intents).await;
        }
        trace!("🤖️ Unrelated text from {} while an order is pending; re-prompting.", event.user_id);
        Ok(vec![outgoing(event, text_body(settings.prompts.confirm_reminder.clone()))])
    }

    //------------------------------------    AwaitingPhone    ----------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    async fn continue_registration(
        &self,
        event: &InboundEvent,
        profile: &UserProfile,
        text: &str,
        name: Option<String>,
        pending: Option<PendingOrder>,
        settings: &BotSettings,
        _intents: &IntentTable,
    ) -> Result<Vec<OutboundMessage>, DispatchError> {
        let Ok(phone) = text.parse::<PhoneNumber>() else {
            trace!("🤖️ Invalid phone input from {}; re-prompting.", event.user_id);
            return Ok(vec![outgoing(event, text_body(settings.prompts.invalid_phone.clone()))]);
        };

        let mut created = false;
        let customer = match self.backend.find_customer_by_phone(&phone).await {
            Ok(Some(existing)) => {
                debug!("🤖️ Phone matches existing customer {}; linking.", existing.id);
                existing
            },
            Ok(None) => {
                let display = name
                    .or_else(|| profile.display_name.clone())
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| "Chat User".to_string());
                match self.backend.create_customer(&display, &phone).await {
                    Ok(new_customer) => {
                        info!("🤖️ Created customer {} for user {}.", new_customer.id, event.user_id);
                        created = true;
                        new_customer
                    },
                    Err(e) => {
                        warn!("🤖️ Customer creation failed for user {}: {e}", event.user_id);
                        // Registration state survives so the user can simply try again
                        return Ok(vec![outgoing(event, text_body(settings.prompts.registration_failed.clone()))]);
                    },
                }
            },
            Err(e) => {
                warn!("🤖️ Customer lookup failed for user {}: {e}", event.user_id);
                return Ok(vec![outgoing(event, text_body(settings.prompts.registration_failed.clone()))]);
            },
        };

        if let Err(e) = self.backend.link_customer(&event.user_id, &customer).await {
            warn!("🤖️ Could not link customer {} to user {}: {e}", customer.id, event.user_id);
            return Ok(vec![outgoing(event, text_body(settings.prompts.registration_failed.clone()))]);
        }
        self.state.clear(&event.user_id).await;
        let ack = if created { &settings.prompts.customer_created } else { &settings.prompts.customer_linked };
        let mut messages = vec![outgoing(event, text_body(render(ack, &[("name", &customer.name)])))];

        // A pending order that was parked for registration resumes exactly once
        if let Some(mut order) = pending {
            order.customer = Some(customer);
            order.needs_customer = false;
            if settings.require_confirmation {
                let summary = order_summary(&order);
                let state = ConversationState::PendingOrder(order);
                let ttl = state.ttl();
                self.state.save(&event.user_id, state, ttl).await;
                messages
                    .push(outgoing(event, text_body(render(&settings.prompts.confirm_order, &[("summary", &summary)]))));
            } else {
                messages.extend(self.finalize_order(event, order, settings).await);
            }
        }
        Ok(messages)
    }

    //------------------------------------    Idle    -------------------------------------------------------------

    async fn handle_idle(
        &self,
        event: &InboundEvent,
        profile: &UserProfile,
        text: &str,
        settings: &BotSettings,
        intents: &IntentTable,
    ) -> Result<Vec<OutboundMessage>, DispatchError> {
        match intents.classify(text) {
            Some(Intent::Register) => {
                if let Some(customer) = &profile.customer {
                    return Ok(vec![outgoing(
                        event,
                        text_body(render(&settings.prompts.already_registered, &[("name", &customer.name)])),
                    )]);
                }
                let state = ConversationState::AwaitingPhone { name: profile.display_name.clone(), pending: None };
                let ttl = state.ttl();
                self.state.save(&event.user_id, state, ttl).await;
                return Ok(vec![outgoing(event, text_body(settings.prompts.ask_phone.clone()))]);
            },
            Some(Intent::Menu) => return self.show_menu(event, settings).await,
            Some(Intent::Points) => return self.show_points(event, profile, settings).await,
            Some(Intent::Order) => {
                // A bare order keyword with no quantity lines: guide the user
                return Ok(vec![outgoing(event, text_body(settings.prompts.order_guidance.clone()))]);
            },
            Some(Intent::Confirm) | Some(Intent::Cancel) => {
                // Nothing pending (or it expired, which is the same thing). Log-only no-op.
                debug!("🤖️ Confirm/cancel from {} with nothing pending; ignoring.", event.user_id);
                return Ok(Vec::new());
            },
            None => {},
        }

        if contains_quantity_marker(text, settings) || intents.is_order_banner(first_line(text)) {
            return self.start_order(event, profile, text, settings, intents).await;
        }

        if let Ok(phone) = text.parse::<PhoneNumber>() {
            return self.implicit_link(event, &phone, settings).await;
        }

        trace!("🤖️ Unrecognized text from {}; bookkeeping only.", event.user_id);
        Ok(Vec::new())
    }

    /// Bare 10-digit text in idle state: link an existing customer. This path never creates a customer.
    async fn implicit_link(
        &self,
        event: &InboundEvent,
        phone: &PhoneNumber,
        settings: &BotSettings,
    ) -> Result<Vec<OutboundMessage>, DispatchError> {
        match self.backend.find_customer_by_phone(phone).await? {
            Some(customer) => {
                self.backend.link_customer(&event.user_id, &customer).await?;
                info!("🤖️ Implicitly linked user {} to customer {}.", event.user_id, customer.id);
                Ok(vec![outgoing(
                    event,
                    text_body(render(&settings.prompts.customer_linked, &[("name", &customer.name)])),
                )])
            },
            None => Ok(vec![outgoing(event, text_body(settings.prompts.customer_not_found.clone()))]),
        }
    }

    //------------------------------------    Order flow    -------------------------------------------------------

    async fn start_order(
        &self,
        event: &InboundEvent,
        profile: &UserProfile,
        text: &str,
        settings: &BotSettings,
        intents: &IntentTable,
    ) -> Result<Vec<OutboundMessage>, DispatchError> {
        let catalog = self.backend.fetch_orderable_items(settings.menu_limit).await?;
        let parsed = parse_order_text(text, &catalog, settings, intents);
        if !parsed.has_valid_lines() {
            debug!("🤖️ Order attempt from {} had no valid lines.", event.user_id);
            let guidance = parse_problems(&parsed).unwrap_or_else(|| settings.prompts.order_guidance.clone());
            return Ok(vec![outgoing(event, text_body(guidance))]);
        }

        // Both fields are present on every valid line by construction
        let lines = parsed
            .valid_lines()
            .filter_map(|l| {
                let item = l.matched_item.as_ref()?;
                Some(OrderLine { item_code: item.code.clone(), title: item.display_name.clone(), qty: l.quantity? })
            })
            .collect::<Vec<_>>();
        let order = PendingOrder {
            customer: profile.customer.clone(),
            lines,
            note: parsed.note.clone(),
            needs_customer: !profile.is_linked(),
        };

        let mut preamble = parse_problems(&parsed);

        if order.needs_customer {
            debug!("🤖️ Order from unlinked user {}; parking it and asking for a phone number.", event.user_id);
            let state = ConversationState::AwaitingPhone {
                name: profile.display_name.clone(),
                pending: Some(order),
            };
            let ttl = state.ttl();
            self.state.save(&event.user_id, state, ttl).await;
            let mut msgs = Vec::new();
            if let Some(problems) = preamble.take() {
                msgs.push(outgoing(event, text_body(problems)));
            }
            msgs.push(outgoing(event, text_body(settings.prompts.ask_phone.clone())));
            return Ok(msgs);
        }

        if settings.require_confirmation {
            let summary = order_summary(&order);
            let state = ConversationState::PendingOrder(order);
            let ttl = state.ttl();
            self.state.save(&event.user_id, state, ttl).await;
            let mut msgs = Vec::new();
            if let Some(problems) = preamble.take() {
                msgs.push(outgoing(event, text_body(problems)));
            }
            msgs.push(outgoing(event, text_body(render(&settings.prompts.confirm_order, &[("summary", &summary)]))));
            return Ok(msgs);
        }

        let mut msgs = Vec::new();
        if let Some(problems) = preamble.take() {
            msgs.push(outgoing(event, text_body(problems)));
        }
        msgs.extend(self.finalize_order(event, order, settings).await);
        Ok(msgs)
    }

    /// Commit a pending order to the order backend. On success the conversation state is cleared; on failure the
    /// pending order is (re)saved so a later 'confirm' can retry without re-entering the whole order.
    async fn finalize_order(
        &self,
        event: &InboundEvent,
        order: PendingOrder,
        settings: &BotSettings,
    ) -> Vec<OutboundMessage> {
        let Some(customer) = order.customer.clone() else {
            // Should not happen: finalize is only reached after linkage. Park the order and ask again.
            warn!("🤖️ Tried to finalize an order without a customer for user {}.", event.user_id);
            let state = ConversationState::AwaitingPhone { name: None, pending: Some(order) };
            let ttl = state.ttl();
            self.state.save(&event.user_id, state, ttl).await;
            return vec![outgoing(event, text_body(settings.prompts.ask_phone.clone()))];
        };
        let request = NewOrderRequest {
            customer_id: customer.id.clone(),
            lines: order.lines.clone(),
            note: order.note.clone(),
            delivery_date: next_delivery_date(Utc::now().date_naive(), settings.delivery_weekday),
        };
        match self.backend.create_order(&request).await {
            Ok(confirmation) => {
                self.state.clear(&event.user_id).await;
                info!(
                    "🤖️ Order {} created for customer {}: {} items, {} {}.",
                    confirmation.id, customer.id, confirmation.total_qty, confirmation.total_amount,
                    confirmation.currency
                );
                let text = render(&settings.prompts.order_created, &[
                    ("id", confirmation.id.as_str()),
                    ("qty", &confirmation.total_qty.to_string()),
                    ("total", &format!("{:.2}", confirmation.total_amount)),
                    ("currency", confirmation.currency.as_str()),
                ]);
                vec![outgoing(event, text_body(text))]
            },
            Err(e) => {
                warn!("🤖️ Order creation failed for customer {}: {e}", customer.id);
                // Keep (or restore) the pending state so 'confirm' can be retried
                let state = ConversationState::PendingOrder(order);
                let ttl = state.ttl();
                self.state.save(&event.user_id, state, ttl).await;
                vec![outgoing(event, text_body(settings.prompts.order_failed.clone()))]
            },
        }
    }

    //------------------------------------    One-shot queries    -------------------------------------------------

    async fn show_menu(
        &self,
        event: &InboundEvent,
        settings: &BotSettings,
    ) -> Result<Vec<OutboundMessage>, DispatchError> {
        let items = self.backend.fetch_orderable_items(settings.menu_limit).await?;
        if items.is_empty() {
            return Ok(vec![outgoing(event, text_body(settings.prompts.menu_empty.clone()))]);
        }
        let entries = items
            .into_iter()
            .map(|i| CardEntry {
                title: i.display_name,
                subtitle: format!("{:.2}", i.price),
                image_url: i.image_ref,
            })
            .collect();
        let body = MessageBody::Card { title: settings.prompts.menu_title.clone(), entries };
        Ok(vec![outgoing(event, body)])
    }

    async fn show_points(
        &self,
        event: &InboundEvent,
        profile: &UserProfile,
        settings: &BotSettings,
    ) -> Result<Vec<OutboundMessage>, DispatchError> {
        let Some(customer) = &profile.customer else {
            return Ok(vec![outgoing(event, text_body(settings.prompts.points_unregistered.clone()))]);
        };
        let points = self.backend.loyalty_points(customer, &settings.loyalty_program).await?;
        let text = render(&settings.prompts.points_balance, &[
            ("name", customer.name.as_str()),
            ("points", &points.to_string()),
        ]);
        Ok(vec![outgoing(event, text_body(text))])
    }
}

//------------------------------------    Free helpers    ---------------------------------------------------------

fn text_body(text: String) -> MessageBody {
    MessageBody::Text { text }
}

/// Route a message on the event's reply token when one is available, falling back to the push channel.
fn outgoing(event: &InboundEvent, body: MessageBody) -> OutboundMessage {
    match &event.reply_token {
        Some(token) => OutboundMessage { channel: Channel::Reply(token.clone()), body },
        None => OutboundMessage { channel: Channel::Push(event.user_id.clone()), body },
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}

/// A human-readable order summary for the confirmation prompt.
pub fn order_summary(order: &PendingOrder) -> String {
    let mut out = String::from("Your order:");
    for line in &order.lines {
        out.push_str(&format!("\n• {} × {}", line.qty, line.title));
    }
    if !order.note.is_empty() {
        out.push_str(&format!("\nNote: {}", order.note));
    }
    out.push_str(&format!("\nTotal items: {}", order.total_qty()));
    out
}

/// Targeted guidance for lines that failed to parse, or `None` if every marker line was clean.
fn parse_problems(parsed: &ParsedOrder) -> Option<String> {
    let unknown: Vec<&str> = parsed.unknown_items().map(|l| l.raw_line.as_str()).collect();
    let invalid: Vec<&str> = parsed.invalid_quantities().map(|l| l.raw_line.as_str()).collect();
    if unknown.is_empty() && invalid.is_empty() {
        return None;
    }
    let mut out = String::new();
    if !unknown.is_empty() {
        out.push_str(&format!("These items were not found: {}", unknown.join("; ")));
    }
    if !invalid.is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("Invalid quantity on: {}", invalid.join("; ")));
    }
    Some(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        bot_types::MessageBody,
        state::InMemoryStateStore,
        test_utils::{default_catalog, follow_event, text_event, unfollow_event, FakeBackend},
        traits::StateStore,
    };

    fn fixture() -> (EventDispatcher<FakeBackend, InMemoryStateStore>, FakeBackend, InMemoryStateStore) {
        let _ = env_logger::try_init();
        let backend = FakeBackend::new().with_catalog(default_catalog());
        let store = InMemoryStateStore::new();
        (EventDispatcher::new(backend.clone(), store.clone()), backend, store)
    }

    fn body_text(msg: &OutboundMessage) -> &str {
        msg.text().expect("expected a text message")
    }

    #[tokio::test]
    async fn follow_greets_and_activates() {
        let (dispatcher, backend, _) = fixture();
        let settings = BotSettings::default();
        let msgs = dispatcher.dispatch(&follow_event("U1"), &settings).await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(body_text(&msgs[0]), settings.prompts.greeting);
        assert!(matches!(msgs[0].channel, Channel::Reply(_)));
        assert_eq!(backend.profile("U1").unwrap().status, ProfileStatus::Active);
    }

    #[tokio::test]
    async fn replayed_unfollow_is_idempotent() {
        let (dispatcher, backend, _) = fixture();
        let settings = BotSettings::default();
        dispatcher.dispatch(&follow_event("U1"), &settings).await.unwrap();
        let msgs = dispatcher.dispatch(&unfollow_event("U1"), &settings).await.unwrap();
        assert!(msgs.is_empty());
        assert_eq!(backend.profile("U1").unwrap().status, ProfileStatus::Blocked);
        let writes_after_first = backend.status_writes();
        dispatcher.dispatch(&unfollow_event("U1"), &settings).await.unwrap();
        assert_eq!(backend.status_writes(), writes_after_first);
    }

    #[tokio::test]
    async fn unregistered_order_flow_end_to_end() {
        let (dispatcher, backend, store) = fixture();
        let settings = BotSettings::default();

        // Order from an unlinked user parks the order and asks for a phone number
        let msgs = dispatcher.dispatch(&text_event("U1", "Green Hug qty: 2+1"), &settings).await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(body_text(&msgs[0]), settings.prompts.ask_phone);
        match store.get("U1").await {
            Some(ConversationState::AwaitingPhone { pending: Some(order), .. }) => {
                assert!(order.needs_customer);
                assert_eq!(order.lines.len(), 1);
                assert_eq!(order.lines[0].qty, 3);
            },
            other => panic!("expected a parked order, got {other:?}"),
        }

        // A valid phone creates + links a customer and resumes the order with a confirmation prompt
        let msgs = dispatcher.dispatch(&text_event("U1", "0812345678"), &settings).await.unwrap();
        assert_eq!(msgs.len(), 2);
        assert!(body_text(&msgs[1]).contains("3 × Green Hug"));
        assert!(matches!(store.get("U1").await, Some(ConversationState::PendingOrder(_))));
        assert!(backend.profile("U1").unwrap().is_linked());
        assert!(backend.created_orders().is_empty());

        // Confirm commits exactly once
        let msgs = dispatcher.dispatch(&text_event("U1", "confirm"), &settings).await.unwrap();
        assert_eq!(backend.created_orders().len(), 1);
        assert!(body_text(&msgs[0]).contains("SO-0001"));
        assert_eq!(store.get("U1").await, None);
    }

    #[tokio::test]
    async fn backend_failure_preserves_pending_order_for_retry() {
        let (dispatcher, backend, store) = fixture();
        let settings = BotSettings::default();
        backend.add_customer("0812345678", "CUST-7", "Ann");
        dispatcher.dispatch(&text_event("U1", "0812345678"), &settings).await.unwrap();
        dispatcher.dispatch(&text_event("U1", "Glow Skin qty: 2"), &settings).await.unwrap();

        backend.set_fail_orders(true);
        let msgs = dispatcher.dispatch(&text_event("U1", "confirm"), &settings).await.unwrap();
        assert_eq!(body_text(&msgs[0]), settings.prompts.order_failed);
        assert!(matches!(store.get("U1").await, Some(ConversationState::PendingOrder(_))));
        assert!(backend.created_orders().is_empty());

        backend.set_fail_orders(false);
        dispatcher.dispatch(&text_event("U1", "confirm"), &settings).await.unwrap();
        assert_eq!(backend.created_orders().len(), 1);
        assert_eq!(store.get("U1").await, None);
    }

    #[tokio::test]
    async fn cancel_clears_the_pending_order() {
        let (dispatcher, backend, store) = fixture();
        let settings = BotSettings::default();
        backend.add_customer("0812345678", "CUST-7", "Ann");
        dispatcher.dispatch(&text_event("U1", "0812345678"), &settings).await.unwrap();
        dispatcher.dispatch(&text_event("U1", "Green Hug qty: 1"), &settings).await.unwrap();

        let msgs = dispatcher.dispatch(&text_event("U1", "cancel"), &settings).await.unwrap();
        assert_eq!(body_text(&msgs[0]), settings.prompts.order_cancelled);
        assert_eq!(store.get("U1").await, None);
        assert!(backend.created_orders().is_empty());
    }

    #[tokio::test]
    async fn unrelated_text_while_pending_reprompts() {
        let (dispatcher, backend, store) = fixture();
        let settings = BotSettings::default();
        backend.add_customer("0812345678", "CUST-7", "Ann");
        dispatcher.dispatch(&text_event("U1", "0812345678"), &settings).await.unwrap();
        dispatcher.dispatch(&text_event("U1", "Green Hug qty: 1"), &settings).await.unwrap();

        let msgs = dispatcher.dispatch(&text_event("U1", "hello?"), &settings).await.unwrap();
        assert_eq!(body_text(&msgs[0]), settings.prompts.confirm_reminder);
        assert!(matches!(store.get("U1").await, Some(ConversationState::PendingOrder(_))));
    }

    #[tokio::test]
    async fn menu_and_points_are_deferred_while_an_order_is_pending() {
        let (dispatcher, backend, store) = fixture();
        let settings = BotSettings::default();
        backend.add_customer("0812345678", "CUST-7", "Ann");
        dispatcher.dispatch(&text_event("U1", "0812345678"), &settings).await.unwrap();
        dispatcher.dispatch(&text_event("U1", "Green Hug qty: 1"), &settings).await.unwrap();

        for keyword in ["menu", "points"] {
            let msgs = dispatcher.dispatch(&text_event("U1", keyword), &settings).await.unwrap();
            assert_eq!(msgs.len(), 1);
            assert_eq!(body_text(&msgs[0]), settings.prompts.confirm_reminder);
            assert!(matches!(store.get("U1").await, Some(ConversationState::PendingOrder(_))));
        }
    }

    #[tokio::test]
    async fn menu_and_points_are_deferred_while_awaiting_a_phone_number() {
        let (dispatcher, _, store) = fixture();
        let settings = BotSettings::default();
        dispatcher.dispatch(&text_event("U1", "register"), &settings).await.unwrap();

        for keyword in ["menu", "points"] {
            let msgs = dispatcher.dispatch(&text_event("U1", keyword), &settings).await.unwrap();
            assert_eq!(msgs.len(), 1);
            assert_eq!(body_text(&msgs[0]), settings.prompts.invalid_phone);
            assert!(matches!(store.get("U1").await, Some(ConversationState::AwaitingPhone { .. })));
        }
    }

    #[tokio::test]
    async fn new_quantity_lines_replace_the_pending_order() {
        let (dispatcher, backend, store) = fixture();
        let settings = BotSettings::default();
        backend.add_customer("0812345678", "CUST-7", "Ann");
        dispatcher.dispatch(&text_event("U1", "0812345678"), &settings).await.unwrap();
        dispatcher.dispatch(&text_event("U1", "Green Hug qty: 2"), &settings).await.unwrap();

        dispatcher.dispatch(&text_event("U1", "Glow Skin qty: 5"), &settings).await.unwrap();
        match store.get("U1").await {
            Some(ConversationState::PendingOrder(order)) => {
                assert_eq!(order.lines.len(), 1);
                assert_eq!(order.lines[0].title, "Glow Skin");
                assert_eq!(order.lines[0].qty, 5);
            },
            other => panic!("expected a replaced pending order, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_valid_lines_yields_guidance_and_no_state() {
        let (dispatcher, _, store) = fixture();
        let settings = BotSettings::default();
        let msgs = dispatcher.dispatch(&text_event("U1", "Unknown Thing qty: 2"), &settings).await.unwrap();
        assert!(body_text(&msgs[0]).contains("not found"));
        assert_eq!(store.get("U1").await, None);

        let msgs = dispatcher.dispatch(&text_event("U1", "order"), &settings).await.unwrap();
        assert_eq!(body_text(&msgs[0]), settings.prompts.order_guidance);
    }

    #[tokio::test]
    async fn register_flow_creates_and_links_a_customer() {
        let (dispatcher, backend, store) = fixture();
        let settings = BotSettings::default();
        let msgs = dispatcher.dispatch(&text_event("U1", "register"), &settings).await.unwrap();
        assert_eq!(body_text(&msgs[0]), settings.prompts.ask_phone);

        // Invalid input re-prompts and keeps the state
        let msgs = dispatcher.dispatch(&text_event("U1", "12345"), &settings).await.unwrap();
        assert_eq!(body_text(&msgs[0]), settings.prompts.invalid_phone);
        assert!(matches!(store.get("U1").await, Some(ConversationState::AwaitingPhone { .. })));

        let msgs = dispatcher.dispatch(&text_event("U1", "0899999999"), &settings).await.unwrap();
        assert!(body_text(&msgs[0]).contains("Created customer"));
        assert!(backend.profile("U1").unwrap().is_linked());
        assert_eq!(store.get("U1").await, None);
    }

    #[tokio::test]
    async fn register_when_already_linked_replies_with_summary() {
        let (dispatcher, backend, store) = fixture();
        let settings = BotSettings::default();
        backend.add_customer("0812345678", "CUST-7", "Ann");
        dispatcher.dispatch(&text_event("U1", "0812345678"), &settings).await.unwrap();

        let msgs = dispatcher.dispatch(&text_event("U1", "register"), &settings).await.unwrap();
        assert!(body_text(&msgs[0]).contains("Ann"));
        assert_eq!(store.get("U1").await, None);
    }

    #[tokio::test]
    async fn bare_phone_links_existing_customers_only() {
        let (dispatcher, backend, _) = fixture();
        let settings = BotSettings::default();
        backend.add_customer("0812345678", "CUST-7", "Ann");

        let msgs = dispatcher.dispatch(&text_event("U1", "0812345678"), &settings).await.unwrap();
        assert!(body_text(&msgs[0]).contains("Ann"));
        assert!(backend.profile("U1").unwrap().is_linked());

        // An unknown phone never creates a customer on this path
        let msgs = dispatcher.dispatch(&text_event("U2", "0800000000"), &settings).await.unwrap();
        assert_eq!(body_text(&msgs[0]), settings.prompts.customer_not_found);
        assert!(!backend.profile("U2").unwrap().is_linked());
    }

    #[tokio::test]
    async fn registration_failure_keeps_the_state() {
        let (dispatcher, backend, store) = fixture();
        let settings = BotSettings::default();
        dispatcher.dispatch(&text_event("U1", "register"), &settings).await.unwrap();
        backend.set_fail_directory(true);
        let msgs = dispatcher.dispatch(&text_event("U1", "0812345678"), &settings).await.unwrap();
        assert_eq!(body_text(&msgs[0]), settings.prompts.registration_failed);
        assert!(matches!(store.get("U1").await, Some(ConversationState::AwaitingPhone { .. })));
    }

    #[tokio::test]
    async fn menu_is_a_card_of_catalog_items() {
        let (dispatcher, _, _) = fixture();
        let settings = BotSettings::default();
        let msgs = dispatcher.dispatch(&text_event("U1", "menu"), &settings).await.unwrap();
        match &msgs[0].body {
            MessageBody::Card { title, entries } => {
                assert_eq!(title, &settings.prompts.menu_title);
                assert_eq!(entries.len(), 3);
                assert_eq!(entries[0].title, "Bye Heavy");
                assert_eq!(entries[0].subtitle, "120.00");
            },
            other => panic!("expected a card, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn points_query_requires_linkage() {
        let (dispatcher, backend, _) = fixture();
        let settings = BotSettings::default();
        let msgs = dispatcher.dispatch(&text_event("U1", "points"), &settings).await.unwrap();
        assert_eq!(body_text(&msgs[0]), settings.prompts.points_unregistered);

        backend.add_customer("0812345678", "CUST-7", "Ann");
        backend.set_points("CUST-7", 42);
        dispatcher.dispatch(&text_event("U1", "0812345678"), &settings).await.unwrap();
        let msgs = dispatcher.dispatch(&text_event("U1", "points"), &settings).await.unwrap();
        assert!(body_text(&msgs[0]).contains("42"));
    }

    #[tokio::test]
    async fn confirm_with_nothing_pending_is_a_noop() {
        let (dispatcher, backend, _) = fixture();
        let settings = BotSettings::default();
        let msgs = dispatcher.dispatch(&text_event("U1", "confirm"), &settings).await.unwrap();
        assert!(msgs.is_empty());
        assert!(backend.created_orders().is_empty());
    }

    #[tokio::test]
    async fn disabled_bot_acknowledges_without_processing() {
        let (dispatcher, backend, _) = fixture();
        let settings = BotSettings { enabled: false, ..BotSettings::default() };
        let msgs = dispatcher.dispatch(&text_event("U1", "register"), &settings).await.unwrap();
        assert!(msgs.is_empty());
        assert!(backend.profile("U1").is_none());
    }

    #[tokio::test]
    async fn orders_commit_immediately_when_confirmation_not_required() {
        let (dispatcher, backend, store) = fixture();
        let settings = BotSettings { require_confirmation: false, ..BotSettings::default() };
        backend.add_customer("0812345678", "CUST-7", "Ann");
        dispatcher.dispatch(&text_event("U1", "0812345678"), &settings).await.unwrap();

        let msgs = dispatcher.dispatch(&text_event("U1", "Green Hug qty: 4"), &settings).await.unwrap();
        assert_eq!(backend.created_orders().len(), 1);
        assert_eq!(backend.created_orders()[0].lines[0].qty, 4);
        assert!(body_text(&msgs[0]).contains("SO-0001"));
        assert_eq!(store.get("U1").await, None);
    }
}
