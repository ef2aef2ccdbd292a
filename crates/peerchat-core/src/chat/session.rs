//! Session orchestrator.
//!
//! `Session` is the single owner of all chat state for one visitor: the
//! conversation store, notification logs, block list, focus, typing map,
//! roster filters, and account entitlements. It is a cheap, cloneable handle;
//! clones share the same state.
//!
//! Mutations follow one pattern. A tokio write lock serializes them, the
//! synchronous state mutex is held only while the change is applied, and the
//! collected side effects (events, log writes) are flushed after the state
//! mutex is released. Simulator callbacks go through the same path, so they
//! always act on the latest state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use peerchat_types::config::SessionConfig;
use peerchat_types::entitlement::{Entitlements, Feature, Quota};
use peerchat_types::error::RepositoryError;
use peerchat_types::event::SessionEvent;
use peerchat_types::filter::RosterFilter;
use peerchat_types::message::{DeliveryStatus, Message, MessageId, MessageKind};
use peerchat_types::notification::{Notification, NotificationId, preview};
use peerchat_types::persona::{Persona, PersonaId};
use rand::seq::SliceRandom;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::log::{MessageLog, NullMessageLog};
use super::simulator::{ReplyPlan, ReplySimulator, ReplySink};
use super::store::{ConversationSnapshot, ConversationStore};
use crate::event::EventBus;
use crate::filter::{BlockList, visible_personas};
use crate::notification::NotificationRouter;
use crate::roster::Roster;
use crate::translate::{PhrasebookTranslator, Translator};

/// Read-only view of the whole session at one point in time.
///
/// Conversations are shared `Arc`s, so taking a snapshot is cheap and later
/// writes never show through.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub owner_id: String,
    pub focused: Option<PersonaId>,
    pub conversations: HashMap<PersonaId, ConversationSnapshot>,
    /// Personas with at least one reply in flight.
    pub typing: HashMap<PersonaId, bool>,
    pub inbox: Vec<Notification>,
    pub history: Vec<Notification>,
    pub unread: usize,
    /// Visible roster, in roster order.
    pub visible: Vec<PersonaId>,
    pub blocked: Vec<PersonaId>,
    pub search: String,
    pub filter: RosterFilter,
    pub entitlements: Entitlements,
    pub images_remaining: Quota,
    pub voice_remaining: Quota,
}

impl SessionSnapshot {
    pub fn is_typing(&self, persona_id: &PersonaId) -> bool {
        self.typing.get(persona_id).copied().unwrap_or(false)
    }

    pub fn conversation(&self, persona_id: &PersonaId) -> &[Message] {
        self.conversations
            .get(persona_id)
            .map(|c| c.as_slice())
            .unwrap_or(&[])
    }
}

struct SessionState {
    store: ConversationStore,
    router: NotificationRouter,
    blocked: BlockList,
    focused: Option<PersonaId>,
    /// Replies in flight per persona. Typing shows while this is non-zero.
    typing: HashMap<PersonaId, usize>,
    /// Bumped by `dismiss_pending`; replies planned under an older
    /// generation land without an inbox notification.
    generations: HashMap<PersonaId, u64>,
    entitlements: Entitlements,
    images_remaining: Quota,
    voice_remaining: Quota,
    /// Media sends counted against the free allowances this session.
    images_used: u32,
    voice_used: u32,
    search: String,
    filter: RosterFilter,
}

impl SessionState {
    fn new(entitlements: Entitlements) -> Self {
        Self {
            store: ConversationStore::new(),
            router: NotificationRouter::new(),
            blocked: BlockList::new(),
            focused: None,
            typing: HashMap::new(),
            generations: HashMap::new(),
            entitlements,
            images_remaining: entitlements.image_allowance(),
            voice_remaining: entitlements.voice_allowance(),
            images_used: 0,
            voice_used: 0,
            search: String::new(),
            filter: RosterFilter::default(),
        }
    }

    fn allows(&self, feature: Feature) -> bool {
        let allowed = self.entitlements.allows(feature);
        if !allowed {
            debug!(?feature, "feature not available on this account");
        }
        allowed
    }

    fn generation(&self, persona_id: &PersonaId) -> u64 {
        self.generations.get(persona_id).copied().unwrap_or(0)
    }

    fn is_typing(&self, persona_id: &PersonaId) -> bool {
        self.typing.get(persona_id).is_some_and(|n| *n > 0)
    }

    /// A persona may take focus when it exists and is not blocked.
    fn can_focus(&self, roster: &Roster, persona_id: &PersonaId) -> bool {
        roster.contains(persona_id) && !self.blocked.is_blocked(persona_id)
    }
}

/// Side effects collected while the state mutex is held.
#[derive(Default)]
struct Effects {
    events: Vec<SessionEvent>,
    cleared: Vec<PersonaId>,
    records: Vec<(PersonaId, Message)>,
}

impl Effects {
    fn emit(&mut self, event: SessionEvent) {
        self.events.push(event);
    }

    fn appended(&mut self, persona_id: &PersonaId, message: Message) {
        self.events.push(SessionEvent::MessageAppended {
            persona_id: persona_id.clone(),
            message_id: message.id,
        });
        self.records.push((persona_id.clone(), message));
    }

    fn updated(&mut self, persona_id: &PersonaId, message: Message) {
        self.events.push(SessionEvent::MessageUpdated {
            persona_id: persona_id.clone(),
            message_id: message.id,
        });
        self.records.push((persona_id.clone(), message));
    }

    fn advanced(&mut self, persona_id: &PersonaId, message: Message) {
        self.events.push(SessionEvent::StatusAdvanced {
            persona_id: persona_id.clone(),
            message_id: message.id,
            status: message.status,
        });
        self.records.push((persona_id.clone(), message));
    }

    fn seeded(&mut self, persona_id: &PersonaId, greeting: Option<Message>) {
        if let Some(greeting) = greeting {
            self.appended(persona_id, greeting);
        }
    }
}

struct SessionInner<L> {
    owner_id: String,
    roster: Roster,
    config: SessionConfig,
    state: Mutex<SessionState>,
    write_lock: tokio::sync::Mutex<()>,
    events: EventBus,
    log: L,
    translator: Arc<dyn Translator>,
    simulator: ReplySimulator,
}

impl<L: MessageLog> SessionInner<L> {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to the latest state, then publish and persist its effects.
    async fn mutate<R>(&self, f: impl FnOnce(&mut SessionState, &mut Effects) -> R) -> R {
        let _write = self.write_lock.lock().await;
        let mut effects = Effects::default();
        let result = {
            let mut state = self.lock_state();
            f(&mut state, &mut effects)
        };
        self.flush(effects).await;
        result
    }

    /// Like `mutate`, for changes that never touch the message log.
    async fn update<R>(&self, f: impl FnOnce(&mut SessionState, &mut Vec<SessionEvent>) -> R) -> R {
        let _write = self.write_lock.lock().await;
        let mut events = Vec::new();
        let result = {
            let mut state = self.lock_state();
            f(&mut state, &mut events)
        };
        self.events.publish_all(events);
        result
    }

    async fn flush(&self, effects: Effects) {
        self.events.publish_all(effects.events);
        for persona_id in &effects.cleared {
            if let Err(e) = self.log.clear_conversation(&self.owner_id, persona_id).await {
                warn!(persona_id = %persona_id, error = %e, "failed to clear conversation in message log");
            }
        }
        for (persona_id, message) in &effects.records {
            if let Err(e) = self.log.record(&self.owner_id, persona_id, message).await {
                warn!(
                    persona_id = %persona_id,
                    message_id = %message.id,
                    error = %e,
                    "failed to record message in message log"
                );
            }
        }
    }

    /// Focus `persona`, seeding its greeting if needed.
    fn focus(&self, state: &mut SessionState, effects: &mut Effects, persona: &Persona) {
        effects.seeded(&persona.id, state.store.ensure_conversation(persona));
        if state.focused.as_ref() != Some(&persona.id) {
            state.focused = Some(persona.id.clone());
            effects.emit(SessionEvent::FocusChanged {
                persona_id: Some(persona.id.clone()),
            });
        }
    }
}

impl<L: MessageLog> ReplySink for SessionInner<L> {
    async fn advance_status(&self, persona_id: &PersonaId, message_id: MessageId, status: DeliveryStatus) {
        self.mutate(|state, effects| {
            if let Some(message) = state.store.advance_status(persona_id, message_id, status) {
                debug!(persona_id = %persona_id, message_id = %message_id, %status, "status advanced");
                effects.advanced(persona_id, message);
            }
        })
        .await;
    }

    async fn deliver_reply(&self, plan: &ReplyPlan) {
        let Some(persona) = self.roster.get(&plan.persona_id) else {
            return;
        };
        let preview_chars = self.config.preview_chars;
        self.mutate(|state, effects| {
            let persona_id = &persona.id;
            if let Some(pending) = state.typing.get_mut(persona_id) {
                *pending = pending.saturating_sub(1);
                if *pending == 0 {
                    state.typing.remove(persona_id);
                    effects.emit(SessionEvent::TypingChanged {
                        persona_id: persona_id.clone(),
                        typing: false,
                    });
                }
            }

            if plan.read_receipts {
                for message in state.store.mark_all_user_messages_read(persona_id) {
                    effects.advanced(persona_id, message);
                }
            }

            let Some(content) = persona.reply_pool.choose(&mut rand::thread_rng()) else {
                return;
            };
            // A conversation deleted mid-flight is reseeded before the reply.
            effects.seeded(persona_id, state.store.ensure_conversation(persona));
            let reply = state.store.append_bot_message(persona_id, content);
            debug!(persona_id = %persona_id, message_id = %reply.id, "bot reply delivered");

            let focused = state.focused.as_ref() == Some(persona_id);
            let blocked = state.blocked.is_blocked(persona_id);
            let dismissed = state.generation(persona_id) != plan.generation;
            if !(focused || blocked || dismissed) {
                let notification = Notification::incoming(
                    format!("New message from {}", persona.name),
                    &reply.content,
                    persona_id.clone(),
                    preview_chars,
                );
                let notification_id = state.router.push_inbox(notification);
                effects.emit(SessionEvent::InboxNotification {
                    notification_id,
                    persona_id: Some(persona_id.clone()),
                });
            }
            effects.appended(persona_id, reply);
        })
        .await;
    }
}

/// Handle to one visitor's chat session.
pub struct Session<L: MessageLog = NullMessageLog> {
    inner: Arc<SessionInner<L>>,
}

impl<L: MessageLog> Clone for Session<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: MessageLog> std::fmt::Debug for Session<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("owner_id", &self.inner.owner_id)
            .field("roster", &self.inner.roster.len())
            .finish_non_exhaustive()
    }
}

impl Session<NullMessageLog> {
    /// A purely in-memory session on the free tier.
    pub fn new(owner_id: impl Into<String>, roster: Roster, config: SessionConfig) -> Self {
        Self::with_log(owner_id, roster, config, NullMessageLog)
    }
}

impl<L: MessageLog> Session<L> {
    /// A session mirroring every conversation mutation to `log`.
    pub fn with_log(owner_id: impl Into<String>, roster: Roster, config: SessionConfig, log: L) -> Self {
        Self::with_parts(owner_id, roster, config, log, Arc::new(PhrasebookTranslator::new()))
    }

    pub fn with_parts(
        owner_id: impl Into<String>,
        roster: Roster,
        config: SessionConfig,
        log: L,
        translator: Arc<dyn Translator>,
    ) -> Self {
        let owner_id = owner_id.into();
        let entitlements = Entitlements::free(config.free_image_quota, config.free_voice_quota);
        info!(owner_id = %owner_id, personas = roster.len(), "session started");
        Self {
            inner: Arc::new(SessionInner {
                owner_id,
                events: EventBus::new(config.event_capacity),
                simulator: ReplySimulator::new(config.timing.clone()),
                state: Mutex::new(SessionState::new(entitlements)),
                write_lock: tokio::sync::Mutex::new(()),
                roster,
                config,
                log,
                translator,
            }),
        }
    }

    /// Rebuild conversations from the message log.
    ///
    /// Replay upserts by message id, so restoring twice (or restoring into a
    /// session that already holds some of the messages) never duplicates.
    /// Entries for personas missing from the roster are skipped.
    pub async fn restore(&self) -> Result<usize, RepositoryError> {
        let _write = self.inner.write_lock.lock().await;
        let entries = self.inner.log.replay(&self.inner.owner_id).await?;
        let mut restored = 0;
        let total = {
            let mut state = self.inner.lock_state();
            for (persona_id, message) in entries {
                if !self.inner.roster.contains(&persona_id) {
                    warn!(persona_id = %persona_id, message_id = %message.id, "skipping logged message for unknown persona");
                    continue;
                }
                state.store.upsert(&persona_id, message);
                restored += 1;
            }
            state.store.message_count()
        };
        info!(owner_id = %self.inner.owner_id, restored, total, "session restored from message log");
        Ok(restored)
    }

    // -- Focus ---------------------------------------------------------------

    /// Focus a persona, creating its conversation on first use.
    ///
    /// Unknown and blocked personas are rejected.
    pub async fn select_persona(&self, persona_id: &PersonaId) -> bool {
        let inner = &*self.inner;
        inner
            .mutate(|state, effects| {
                if !state.can_focus(&inner.roster, persona_id) {
                    debug!(persona_id = %persona_id, "persona cannot be focused");
                    return false;
                }
                let Some(persona) = inner.roster.get(persona_id) else {
                    return false;
                };
                inner.focus(state, effects, persona);
                true
            })
            .await
    }

    // -- Sending -------------------------------------------------------------

    /// Send text to the focused persona.
    ///
    /// Free accounts are truncated to the configured text limit. Blank text,
    /// no focus, or a blocked focus yields `None`.
    pub async fn send_text(&self, text: &str) -> Option<MessageId> {
        if text.trim().is_empty() {
            return None;
        }
        self.send(MessageKind::Text, text, None).await
    }

    /// Send an image payload reference. Consumes one image from the quota.
    pub async fn send_image(&self, payload: &str) -> Option<MessageId> {
        self.send(MessageKind::Image, payload, None).await
    }

    /// Send a voice payload reference. Consumes one voice message from the quota.
    pub async fn send_voice(&self, payload: &str, duration_secs: u32) -> Option<MessageId> {
        self.send(MessageKind::Voice { duration_secs }, payload, None).await
    }

    /// Send text quoting `reply_to`.
    ///
    /// Without the replies feature, or when the target is not a live message
    /// of the focused conversation, this degrades to a plain `send_text`.
    pub async fn send_reply(&self, text: &str, reply_to: MessageId) -> Option<MessageId> {
        if text.trim().is_empty() {
            return None;
        }
        self.send(MessageKind::Text, text, Some(reply_to)).await
    }

    async fn send(&self, kind: MessageKind, content: &str, reply_to: Option<MessageId>) -> Option<MessageId> {
        let inner = &*self.inner;
        let plan = inner
            .mutate(|state, effects| {
                let persona_id = state.focused.clone()?;
                if state.blocked.is_blocked(&persona_id) {
                    return None;
                }
                let persona = inner.roster.get(&persona_id)?;

                let quota = match kind {
                    MessageKind::Text => None,
                    MessageKind::Image => Some((&mut state.images_remaining, &mut state.images_used)),
                    MessageKind::Voice { .. } => Some((&mut state.voice_remaining, &mut state.voice_used)),
                };
                if let Some((remaining, used)) = quota {
                    if !remaining.try_consume() {
                        debug!(persona_id = %persona_id, ?kind, "media quota exhausted");
                        return None;
                    }
                    if *remaining != Quota::Unlimited {
                        *used += 1;
                    }
                }

                let text_limit = (!state.allows(Feature::LongText)).then_some(inner.config.free_text_limit);
                effects.seeded(&persona_id, state.store.ensure_conversation(persona));
                let mut message = state
                    .store
                    .append_user_message(&persona_id, content, kind, text_limit);

                if let Some(target) = reply_to {
                    let same_conversation = state.store.persona_of(target) == Some(&persona_id);
                    if same_conversation && state.allows(Feature::Replies) {
                        if let Some(linked) = state.store.attach_reply(&persona_id, message.id, target) {
                            message = linked;
                        }
                    }
                }

                let title = match kind {
                    MessageKind::Text => format!("Message sent to {}", persona.name),
                    MessageKind::Image => format!("Image sent to {}", persona.name),
                    MessageKind::Voice { .. } => format!("Voice message sent to {}", persona.name),
                };
                let notification = Notification::outgoing(
                    title,
                    &message.display_content(),
                    Some(persona_id.clone()),
                    inner.config.preview_chars,
                );
                let notification_id = state.router.push_history(notification);

                let pending = state.typing.entry(persona_id.clone()).or_insert(0);
                *pending += 1;
                let started_typing = *pending == 1;

                let plan = ReplyPlan {
                    persona_id: persona_id.clone(),
                    message_id: message.id,
                    read_receipts: state.entitlements.allows(Feature::ReadReceipts),
                    generation: state.generation(&persona_id),
                };
                debug!(persona_id = %persona_id, message_id = %message.id, ?kind, "message sent");

                effects.appended(&persona_id, message);
                effects.emit(SessionEvent::HistoryNotification { notification_id });
                if started_typing {
                    effects.emit(SessionEvent::TypingChanged {
                        persona_id,
                        typing: true,
                    });
                }
                Some(plan)
            })
            .await?;

        let message_id = plan.message_id;
        inner.simulator.start(Arc::downgrade(&self.inner), plan);
        Some(message_id)
    }

    // -- VIP message actions -------------------------------------------------

    /// Toggle the visitor's `emoji` reaction on a message.
    ///
    /// Returns `false` when reactions are not available or the message is
    /// unknown or unsent.
    pub async fn react(&self, message_id: MessageId, emoji: &str) -> bool {
        let inner = &*self.inner;
        inner
            .mutate(|state, effects| {
                if !state.allows(Feature::Reactions) {
                    return false;
                }
                let Some(persona_id) = state.store.persona_of(message_id).cloned() else {
                    return false;
                };
                match state
                    .store
                    .toggle_reaction(&persona_id, message_id, emoji, &inner.owner_id)
                {
                    Some(message) => {
                        effects.updated(&persona_id, message);
                        true
                    }
                    None => false,
                }
            })
            .await
    }

    /// Translate a text message and store the result in its translation slot.
    pub async fn translate(&self, message_id: MessageId, language: &str) -> Option<String> {
        let inner = &*self.inner;
        inner
            .mutate(|state, effects| {
                if !state.allows(Feature::Translation) {
                    return None;
                }
                let persona_id = state.store.persona_of(message_id).cloned()?;
                let source = state.store.find(message_id)?.content.clone();
                let translated = inner.translator.translate(&source, language);
                let message = state
                    .store
                    .set_translation(&persona_id, message_id, language, &translated)?;
                effects.updated(&persona_id, message);
                Some(translated)
            })
            .await
    }

    /// Tombstone one of the visitor's own messages.
    pub async fn unsend(&self, message_id: MessageId) -> bool {
        self.inner
            .mutate(|state, effects| {
                if !state.allows(Feature::Unsend) {
                    return false;
                }
                let Some(persona_id) = state.store.persona_of(message_id).cloned() else {
                    return false;
                };
                match state.store.unsend(&persona_id, message_id) {
                    Some(message) => {
                        effects.updated(&persona_id, message);
                        true
                    }
                    None => false,
                }
            })
            .await
    }

    // -- Conversations and blocking -----------------------------------------

    /// Clear a conversation. Focus is unchanged; the next selection reseeds
    /// the greeting.
    pub async fn delete_conversation(&self, persona_id: &PersonaId) -> bool {
        self.inner
            .mutate(|state, effects| {
                if !state.store.delete_conversation(persona_id) {
                    return false;
                }
                info!(persona_id = %persona_id, "conversation deleted");
                effects.cleared.push(persona_id.clone());
                effects.emit(SessionEvent::ConversationDeleted {
                    persona_id: persona_id.clone(),
                });
                true
            })
            .await
    }

    /// Block a persona.
    ///
    /// Its conversation and notifications are kept. If it was focused, focus
    /// moves to the first persona of the visible roster, or to the empty
    /// state when nothing is visible.
    pub async fn block(&self, persona_id: &PersonaId) -> bool {
        let inner = &*self.inner;
        inner
            .mutate(|state, effects| {
                if !inner.roster.contains(persona_id) || !state.blocked.block(persona_id.clone()) {
                    return false;
                }
                info!(persona_id = %persona_id, "persona blocked");
                effects.emit(SessionEvent::BlockChanged {
                    persona_id: persona_id.clone(),
                    blocked: true,
                });

                if state.focused.as_ref() == Some(persona_id) {
                    let next = visible_personas(&inner.roster, &state.blocked, &state.search, &state.filter)
                        .first()
                        .map(|p| p.id.clone());
                    match next.as_ref().and_then(|id| inner.roster.get(id)) {
                        Some(persona) => inner.focus(state, effects, persona),
                        None => {
                            state.focused = None;
                            effects.emit(SessionEvent::FocusChanged { persona_id: None });
                        }
                    }
                }
                true
            })
            .await
    }

    /// Unblock a persona. Never changes focus.
    pub async fn unblock(&self, persona_id: &PersonaId) -> bool {
        self.inner
            .update(|state, events| {
                if !state.blocked.unblock(persona_id) {
                    return false;
                }
                info!(persona_id = %persona_id, "persona unblocked");
                events.push(SessionEvent::BlockChanged {
                    persona_id: persona_id.clone(),
                    blocked: false,
                });
                true
            })
            .await
    }

    pub fn is_blocked(&self, persona_id: &PersonaId) -> bool {
        self.inner.lock_state().blocked.is_blocked(persona_id)
    }

    // -- Notifications -------------------------------------------------------

    /// Inbox entries, newest first.
    pub fn inbox(&self) -> Vec<Notification> {
        self.inner.lock_state().router.inbox()
    }

    /// History entries, newest first.
    pub fn history(&self) -> Vec<Notification> {
        self.inner.lock_state().router.history()
    }

    pub fn unread_count(&self) -> usize {
        self.inner.lock_state().router.unread_count()
    }

    /// Mark one inbox entry read. Unknown ids are a no-op.
    pub async fn acknowledge(&self, id: NotificationId) -> bool {
        self.inner
            .update(|state, events| {
                let flipped = state.router.acknowledge(id);
                if flipped {
                    events.push(SessionEvent::NotificationsAcknowledged {
                        unread: state.router.unread_count(),
                    });
                }
                flipped
            })
            .await
    }

    /// Mark every inbox entry read. Returns how many flipped.
    pub async fn acknowledge_all(&self) -> usize {
        self.inner
            .update(|state, events| {
                let flipped = state.router.acknowledge_all();
                if flipped > 0 {
                    events.push(SessionEvent::NotificationsAcknowledged { unread: 0 });
                }
                flipped
            })
            .await
    }

    /// Mark every inbox entry from `persona_id` read. Returns how many flipped.
    pub async fn acknowledge_persona(&self, persona_id: &PersonaId) -> usize {
        self.inner
            .update(|state, events| {
                let flipped = state.router.acknowledge_persona(persona_id);
                if flipped > 0 {
                    events.push(SessionEvent::NotificationsAcknowledged {
                        unread: state.router.unread_count(),
                    });
                }
                flipped
            })
            .await
    }

    /// Acknowledge an inbox entry and focus the persona it came from.
    ///
    /// Returns the persona now focused, or `None` if the notification is
    /// unknown or its persona cannot be focused (it is still acknowledged).
    pub async fn open_notification(&self, id: NotificationId) -> Option<PersonaId> {
        let inner = &*self.inner;
        inner
            .mutate(|state, effects| {
                let bot_id = state.router.find_inbox(id)?.bot_id.clone();
                if state.router.acknowledge(id) {
                    effects.emit(SessionEvent::NotificationsAcknowledged {
                        unread: state.router.unread_count(),
                    });
                }
                let persona_id = bot_id?;
                if !state.can_focus(&inner.roster, &persona_id) {
                    return None;
                }
                let persona = inner.roster.get(&persona_id)?;
                inner.focus(state, effects, persona);
                Some(persona_id)
            })
            .await
    }

    // -- Roster filters ------------------------------------------------------

    pub async fn set_search(&self, term: &str) {
        self.inner
            .update(|state, events| {
                state.search = term.to_string();
                events.push(SessionEvent::FiltersChanged);
            })
            .await;
    }

    pub async fn set_filters(&self, filter: RosterFilter) {
        self.inner
            .update(|state, events| {
                state.filter = filter;
                events.push(SessionEvent::FiltersChanged);
            })
            .await;
    }

    /// The roster after blocking, search, and filters.
    pub fn visible_personas(&self) -> Vec<Persona> {
        let state = self.inner.lock_state();
        visible_personas(&self.inner.roster, &state.blocked, &state.search, &state.filter)
            .into_iter()
            .cloned()
            .collect()
    }

    // -- Account -------------------------------------------------------------

    /// Apply entitlements reported by the account subsystem.
    ///
    /// VIP lifts the media caps. Free allowances are charged with every
    /// free-tier send made earlier in the session, so re-applying them never
    /// refills an exhausted quota.
    pub async fn set_entitlements(&self, entitlements: Entitlements) {
        self.inner
            .update(|state, events| {
                state.entitlements = entitlements;
                state.images_remaining = entitlements.image_allowance().less(state.images_used);
                state.voice_remaining = entitlements.voice_allowance().less(state.voice_used);
                info!(vip = entitlements.vip, "entitlements updated");
                events.push(SessionEvent::EntitlementsChanged {
                    vip: entitlements.vip,
                });
            })
            .await;
    }

    pub fn entitlements(&self) -> Entitlements {
        self.inner.lock_state().entitlements
    }

    /// Suppress inbox notifications of replies already in flight for
    /// `persona_id`. The replies themselves still land.
    ///
    /// Returns how many replies were pending.
    pub fn dismiss_pending(&self, persona_id: &PersonaId) -> usize {
        let mut state = self.inner.lock_state();
        *state.generations.entry(persona_id.clone()).or_insert(0) += 1;
        state.typing.get(persona_id).copied().unwrap_or(0)
    }

    // -- Reads ---------------------------------------------------------------

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.lock_state();
        let visible = visible_personas(&self.inner.roster, &state.blocked, &state.search, &state.filter)
            .into_iter()
            .map(|p| p.id.clone())
            .collect();
        SessionSnapshot {
            owner_id: self.inner.owner_id.clone(),
            focused: state.focused.clone(),
            conversations: state.store.snapshot(),
            typing: state
                .typing
                .iter()
                .map(|(id, pending)| (id.clone(), *pending > 0))
                .collect(),
            inbox: state.router.inbox(),
            history: state.router.history(),
            unread: state.router.unread_count(),
            visible,
            blocked: state.blocked.to_sorted_vec(),
            search: state.search.clone(),
            filter: state.filter.clone(),
            entitlements: state.entitlements,
            images_remaining: state.images_remaining,
            voice_remaining: state.voice_remaining,
        }
    }

    pub fn focused(&self) -> Option<PersonaId> {
        self.inner.lock_state().focused.clone()
    }

    pub fn conversation(&self, persona_id: &PersonaId) -> Option<ConversationSnapshot> {
        self.inner.lock_state().store.conversation(persona_id)
    }

    pub fn message(&self, message_id: MessageId) -> Option<Message> {
        self.inner.lock_state().store.find(message_id).cloned()
    }

    /// Preview of the message `message_id` replies to.
    ///
    /// `None` when the message has no reply link or the link dangles.
    pub fn reply_preview(&self, message_id: MessageId) -> Option<String> {
        let state = self.inner.lock_state();
        let target = state.store.reply_target(message_id)?;
        Some(preview(&target.display_content(), self.inner.config.preview_chars))
    }

    pub fn is_typing(&self, persona_id: &PersonaId) -> bool {
        self.inner.lock_state().is_typing(persona_id)
    }

    pub fn images_remaining(&self) -> Quota {
        self.inner.lock_state().images_remaining
    }

    pub fn voice_remaining(&self) -> Quota {
        self.inner.lock_state().voice_remaining
    }

    // -- Plumbing ------------------------------------------------------------

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Timer tasks still pending across all personas.
    pub fn pending_replies(&self) -> usize {
        self.inner.simulator.pending()
    }

    /// Wait until every simulator timer started so far has fired.
    pub async fn wait_idle(&self) {
        self.inner.simulator.wait_idle().await;
    }

    pub fn owner_id(&self) -> &str {
        &self.inner.owner_id
    }

    pub fn roster(&self) -> &Roster {
        &self.inner.roster
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::log::MemoryMessageLog;
    use peerchat_types::message::Sender;

    fn session() -> Session {
        Session::new("alice", Roster::builtin(), SessionConfig::default())
    }

    async fn vip_session() -> Session {
        let s = session();
        s.set_entitlements(Entitlements::vip()).await;
        s
    }

    fn pid(id: &str) -> PersonaId {
        PersonaId::from(id)
    }

    struct FailingLog;

    impl MessageLog for FailingLog {
        async fn record(&self, _: &str, _: &PersonaId, _: &Message) -> Result<(), RepositoryError> {
            Err(RepositoryError::Connection)
        }

        async fn clear_conversation(&self, _: &str, _: &PersonaId) -> Result<(), RepositoryError> {
            Err(RepositoryError::Connection)
        }

        async fn replay(&self, _: &str) -> Result<Vec<(PersonaId, Message)>, RepositoryError> {
            Err(RepositoryError::Connection)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_free_send_stays_sending_after_reply() {
        let s = session();
        assert!(s.select_persona(&pid("p1")).await);
        let id = s.send_text("Hi").await.unwrap();

        let conv = s.conversation(&pid("p1")).unwrap();
        assert_eq!(conv.len(), 2);
        assert_eq!(conv[1].status, DeliveryStatus::Sending);
        assert!(s.is_typing(&pid("p1")));
        assert_eq!(s.history().len(), 1);
        assert_eq!(s.history()[0].title, "Message sent to Sophie");
        assert!(s.history()[0].read);

        s.wait_idle().await;

        let conv = s.conversation(&pid("p1")).unwrap();
        assert_eq!(conv.len(), 3);
        assert_eq!(conv[2].sender, Sender::Bot);
        assert!(Roster::builtin().get(&pid("p1")).unwrap().reply_pool.contains(&conv[2].content));
        assert!(!s.is_typing(&pid("p1")));
        assert_eq!(s.message(id).unwrap().status, DeliveryStatus::Sending);
        // Focused conversation: no inbox entry.
        assert_eq!(s.unread_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_vip_reply_to_unfocused_persona_lands_in_inbox() {
        let s = vip_session().await;
        s.select_persona(&pid("p1")).await;
        let id = s.send_text("Hi").await.unwrap();
        s.select_persona(&pid("p2")).await;
        s.wait_idle().await;

        let conv = s.conversation(&pid("p1")).unwrap();
        assert_eq!(conv.last().unwrap().sender, Sender::Bot);
        assert_eq!(s.message(id).unwrap().status, DeliveryStatus::Read);

        let inbox = s.inbox();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].bot_id, Some(pid("p1")));
        assert_eq!(inbox[0].title, "New message from Sophie");
        assert!(!inbox[0].read);
        assert_eq!(s.unread_count(), 1);
        assert_eq!(s.focused(), Some(pid("p2")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_observed_statuses_never_regress() {
        let s = vip_session().await;
        s.select_persona(&pid("p1")).await;
        let mut rx = s.subscribe();
        let id = s.send_text("Hi").await.unwrap();
        s.wait_idle().await;

        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SessionEvent::StatusAdvanced { message_id, status, .. } = event {
                if message_id == id {
                    statuses.push(status);
                }
            }
        }
        assert_eq!(
            statuses,
            vec![DeliveryStatus::Sent, DeliveryStatus::Delivered, DeliveryStatus::Read]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_stays_on_while_any_reply_is_pending() {
        let s = session();
        s.select_persona(&pid("p1")).await;
        s.send_text("one").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2_000)).await;
        s.send_text("two").await.unwrap();

        // First reply lands at +3000ms, second at +5000ms.
        tokio::time::sleep(std::time::Duration::from_millis(1_500)).await;
        assert!(s.is_typing(&pid("p1")));
        s.wait_idle().await;
        assert!(!s.is_typing(&pid("p1")));
        assert_eq!(s.conversation(&pid("p1")).unwrap().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_rejections() {
        let s = session();
        // No focus yet.
        assert!(s.send_text("Hi").await.is_none());

        s.select_persona(&pid("p1")).await;
        assert!(s.send_text("   ").await.is_none());
        assert!(!s.select_persona(&pid("nobody")).await);
        assert_eq!(s.conversation(&pid("p1")).unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_free_text_is_truncated_vip_is_not() {
        let s = session();
        s.select_persona(&pid("p1")).await;
        let long = "x".repeat(200);

        let id = s.send_text(&long).await.unwrap();
        assert_eq!(s.message(id).unwrap().content.chars().count(), 150);

        s.set_entitlements(Entitlements::vip()).await;
        let id = s.send_text(&long).await.unwrap();
        assert_eq!(s.message(id).unwrap().content.len(), 200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_media_quota_and_vip_top_up() {
        let s = session();
        s.select_persona(&pid("p1")).await;
        for _ in 0..3 {
            assert!(s.send_image("blob:img").await.is_some());
        }
        assert!(s.send_image("blob:img").await.is_none());
        assert_eq!(s.images_remaining(), Quota::Remaining(0));
        assert_eq!(s.voice_remaining(), Quota::Remaining(3));

        let voice = s.send_voice("blob:voice", 75).await.unwrap();
        assert_eq!(s.history()[0].message, "[Voice message 1:15]");
        assert!(s.message(voice).unwrap().kind.is_voice());

        s.set_entitlements(Entitlements::vip()).await;
        assert_eq!(s.images_remaining(), Quota::Unlimited);
        assert!(s.send_image("blob:img").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reapplied_free_entitlements_keep_exhausted_quota() {
        let s = session();
        s.select_persona(&pid("p1")).await;
        for _ in 0..3 {
            assert!(s.send_image("blob:img").await.is_some());
        }
        s.send_voice("blob:voice", 5).await.unwrap();

        let free = s.entitlements();
        s.set_entitlements(free).await;
        assert_eq!(s.images_remaining(), Quota::Remaining(0));
        assert_eq!(s.voice_remaining(), Quota::Remaining(2));
        assert!(s.send_image("blob:img").await.is_none());

        // Sends made while VIP are not charged to the free allowance.
        s.set_entitlements(Entitlements::vip()).await;
        s.send_voice("blob:voice", 5).await.unwrap();
        s.set_entitlements(free).await;
        assert_eq!(s.images_remaining(), Quota::Remaining(0));
        assert_eq!(s.voice_remaining(), Quota::Remaining(2));
        assert!(s.send_image("blob:img").await.is_none());

        // A smaller allowance clamps rather than underflows.
        s.set_entitlements(Entitlements::free(1, 0)).await;
        assert_eq!(s.voice_remaining(), Quota::Remaining(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_focused_refocuses_first_visible() {
        let s = session();
        s.select_persona(&pid("p1")).await;
        s.send_text("Hi").await.unwrap();

        assert!(s.block(&pid("p1")).await);
        assert_eq!(s.focused(), Some(pid("p2")));
        assert_eq!(s.conversation(&pid("p2")).unwrap().len(), 1);
        assert!(!s.select_persona(&pid("p1")).await);
        assert!(s.send_text("still there?").await.is_some());

        assert!(s.unblock(&pid("p1")).await);
        assert_eq!(s.focused(), Some(pid("p2")));
        assert_eq!(s.conversation(&pid("p1")).unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_only_visible_persona_empties_focus() {
        let s = session();
        s.set_search("sophie").await;
        s.select_persona(&pid("p1")).await;

        assert!(s.block(&pid("p1")).await);
        assert_eq!(s.focused(), None);
        assert!(s.visible_personas().is_empty());
        assert!(!s.block(&pid("p1")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_from_blocked_persona_skips_inbox() {
        let s = session();
        s.select_persona(&pid("p1")).await;
        s.send_text("Hi").await.unwrap();
        s.block(&pid("p1")).await;
        s.wait_idle().await;

        assert_eq!(s.conversation(&pid("p1")).unwrap().len(), 3);
        assert!(s.inbox().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_then_select_yields_single_greeting() {
        let s = session();
        s.select_persona(&pid("p1")).await;
        s.send_text("Hi").await.unwrap();
        s.wait_idle().await;

        assert!(s.delete_conversation(&pid("p1")).await);
        assert!(s.conversation(&pid("p1")).unwrap().is_empty());
        s.select_persona(&pid("p1")).await;

        let conv = s.conversation(&pid("p1")).unwrap();
        assert_eq!(conv.len(), 1);
        assert_eq!(conv[0].sender, Sender::System);
        assert_eq!(conv[0].content, "Start a conversation with Sophie");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaction_toggle_restores_and_is_gated() {
        let s = session();
        s.select_persona(&pid("p1")).await;
        s.send_text("Hi").await.unwrap();
        s.wait_idle().await;
        let bot = s.conversation(&pid("p1")).unwrap()[2].id;

        assert!(!s.react(bot, "❤️").await);
        assert!(s.message(bot).unwrap().reactions.is_empty());

        s.set_entitlements(Entitlements::vip()).await;
        assert!(s.react(bot, "❤️").await);
        assert_eq!(s.message(bot).unwrap().reactions[0].user_id, "alice");
        assert!(s.react(bot, "❤️").await);
        assert!(s.message(bot).unwrap().reactions.is_empty());
        assert!(!s.react(MessageId::new(), "❤️").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_free_account_vip_actions_degrade() {
        let s = session();
        s.select_persona(&pid("p1")).await;
        let first = s.send_text("hello").await.unwrap();

        assert!(!s.unsend(first).await);
        assert!(s.translate(first, "es").await.is_none());
        let reply = s.send_reply("re", first).await.unwrap();
        assert_eq!(s.message(reply).unwrap().reply_to, None);
        assert!(s.reply_preview(reply).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_vip_reply_translate_unsend() {
        let s = vip_session().await;
        s.select_persona(&pid("p1")).await;
        let first = s.send_text("hello").await.unwrap();

        let reply = s.send_reply("re", first).await.unwrap();
        assert_eq!(s.message(reply).unwrap().reply_to, Some(first));
        assert_eq!(s.reply_preview(reply).as_deref(), Some("hello"));

        assert_eq!(s.translate(first, "es").await.as_deref(), Some("hola"));
        assert_eq!(s.message(first).unwrap().translation().unwrap().language, "es");

        assert!(s.unsend(first).await);
        let unsent = s.message(first).unwrap();
        assert!(unsent.is_deleted);
        assert_eq!(unsent.content, "hello");
        assert_eq!(s.reply_preview(reply).as_deref(), Some("This message was unsent."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_to_other_conversation_is_plain_send() {
        let s = vip_session().await;
        s.select_persona(&pid("p1")).await;
        let elsewhere = s.send_text("for sophie").await.unwrap();
        s.select_persona(&pid("p2")).await;

        let id = s.send_reply("for lucas", elsewhere).await.unwrap();
        assert_eq!(s.message(id).unwrap().reply_to, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledge_and_open_notification() {
        let s = session();
        s.select_persona(&pid("p1")).await;
        s.send_text("Hi").await.unwrap();
        s.select_persona(&pid("p3")).await;
        s.wait_idle().await;
        assert_eq!(s.unread_count(), 1);

        assert!(!s.acknowledge(NotificationId::new()).await);
        assert_eq!(s.unread_count(), 1);

        let id = s.inbox()[0].id;
        assert_eq!(s.open_notification(id).await, Some(pid("p1")));
        assert_eq!(s.focused(), Some(pid("p1")));
        assert_eq!(s.unread_count(), 0);
        assert!(s.open_notification(NotificationId::new()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledge_persona_leaves_other_personas_unread() {
        let s = session();
        s.select_persona(&pid("p1")).await;
        s.send_text("Hi Sophie").await.unwrap();
        s.select_persona(&pid("p2")).await;
        s.send_text("Hi Lucas").await.unwrap();
        s.select_persona(&pid("p3")).await;
        s.wait_idle().await;
        assert_eq!(s.unread_count(), 2);

        let mut rx = s.subscribe();
        assert_eq!(s.acknowledge_persona(&pid("p1")).await, 1);
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::NotificationsAcknowledged { unread: 1 });
        assert_eq!(s.unread_count(), 1);
        let unread: Vec<_> = s.inbox().into_iter().filter(|n| !n.read).collect();
        assert_eq!(unread[0].bot_id, Some(pid("p2")));

        assert_eq!(s.acknowledge_persona(&pid("p1")).await, 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(s.acknowledge_all().await, 1);
        assert_eq!(s.unread_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_setters_wait_for_in_flight_mutations() {
        let s = session();
        let mut rx = s.subscribe();
        let write = s.inner.write_lock.lock().await;
        let pending = tokio::spawn({
            let s = s.clone();
            async move { s.set_search("yuki").await }
        });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());
        assert!(s.snapshot().search.is_empty());
        assert!(rx.try_recv().is_err());

        drop(write);
        pending.await.unwrap();
        assert_eq!(s.snapshot().search, "yuki");
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::FiltersChanged);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_pending_suppresses_only_the_notification() {
        let s = session();
        s.select_persona(&pid("p1")).await;
        s.send_text("Hi").await.unwrap();
        s.select_persona(&pid("p2")).await;

        assert_eq!(s.dismiss_pending(&pid("p1")), 1);
        s.wait_idle().await;

        assert_eq!(s.conversation(&pid("p1")).unwrap().len(), 3);
        assert_eq!(s.unread_count(), 0);

        // Later sends notify again.
        s.select_persona(&pid("p1")).await;
        s.send_text("again").await.unwrap();
        s.select_persona(&pid("p2")).await;
        s.wait_idle().await;
        assert_eq!(s.unread_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reflects_state() {
        let s = session();
        s.set_filters(RosterFilter {
            countries: vec!["JP".into(), "kr".into()],
            ..RosterFilter::default()
        })
        .await;
        s.select_persona(&pid("p3")).await;
        s.send_text("konnichiwa").await.unwrap();

        let snap = s.snapshot();
        assert_eq!(snap.owner_id, "alice");
        assert_eq!(snap.focused, Some(pid("p3")));
        assert_eq!(snap.visible, vec![pid("p3"), pid("p8")]);
        assert!(snap.is_typing(&pid("p3")));
        assert_eq!(snap.conversation(&pid("p3")).len(), 2);
        assert!(snap.conversation(&pid("p1")).is_empty());
        assert_eq!(snap.history.len(), 1);
        assert!(!snap.entitlements.vip);

        s.wait_idle().await;
        assert_eq!(snap.conversation(&pid("p3")).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_from_log_is_idempotent() {
        let log = Arc::new(MemoryMessageLog::new());
        let first = Session::with_log("alice", Roster::builtin(), SessionConfig::default(), Arc::clone(&log));
        first.set_entitlements(Entitlements::vip()).await;
        first.select_persona(&pid("p1")).await;
        let id = first.send_text("Hi").await.unwrap();
        first.wait_idle().await;
        assert_eq!(log.len(), 3);

        let second = Session::with_log("alice", Roster::builtin(), SessionConfig::default(), Arc::clone(&log));
        assert_eq!(second.restore().await.unwrap(), 3);
        assert_eq!(second.restore().await.unwrap(), 3);

        let conv = second.conversation(&pid("p1")).unwrap();
        assert_eq!(conv.len(), 3);
        assert_eq!(second.message(id).unwrap().status, DeliveryStatus::Read);

        let other = Session::with_log("bob", Roster::builtin(), SessionConfig::default(), Arc::clone(&log));
        assert_eq!(other.restore().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_clears_log_entries() {
        let log = Arc::new(MemoryMessageLog::new());
        let s = Session::with_log("alice", Roster::builtin(), SessionConfig::default(), Arc::clone(&log));
        s.select_persona(&pid("p1")).await;
        s.select_persona(&pid("p2")).await;
        assert_eq!(log.len(), 2);

        s.delete_conversation(&pid("p1")).await;
        assert_eq!(log.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_failures_never_roll_back_state() {
        let s = Session::with_log("alice", Roster::builtin(), SessionConfig::default(), FailingLog);
        assert!(s.select_persona(&pid("p1")).await);
        s.send_text("Hi").await.unwrap();
        s.wait_idle().await;

        assert_eq!(s.conversation(&pid("p1")).unwrap().len(), 3);
        assert!(s.delete_conversation(&pid("p1")).await);
        assert!(s.restore().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_share_one_session() {
        let s = session();
        s.select_persona(&pid("p1")).await;
        s.send_text("Hi").await.unwrap();
        let clone = s.clone();
        drop(s);
        // The clone keeps the session alive, so pending timers still apply.
        clone.wait_idle().await;
        assert_eq!(clone.conversation(&pid("p1")).unwrap().len(), 3);
        assert_eq!(clone.pending_replies(), 0);
    }
}
