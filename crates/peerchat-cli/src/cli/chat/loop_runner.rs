//! Main chat loop orchestration.
//!
//! Reads lines from the prompt, dispatches slash commands, and sends plain
//! lines to the open conversation. A background task subscribes to session
//! events and prints simulated replies, typing indicators, and notifications
//! through the readline `SharedWriter` so the prompt is never clobbered.

use std::io::{self, Write};

use console::style;
use rustyline_async::SharedWriter;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use peerchat_core::chat::{MessageLog, Session};
use peerchat_types::entitlement::{Entitlements, Feature, Quota};
use peerchat_types::message::{Message, MessageId, Sender};
use peerchat_types::persona::{Persona, PersonaId};

use super::commands::{self, ChatCommand};
use super::input::{ChatInput, InputEvent};
use super::render;
use super::resolve_persona;

/// Run the interactive chat loop until Ctrl+D or `/exit`.
///
/// Opens `initial` if given, otherwise the first visible persona.
pub async fn run_chat_loop<L: MessageLog>(session: Session<L>, initial: Option<PersonaId>) -> anyhow::Result<()> {
    let (mut chat_input, mut out) =
        ChatInput::new(prompt_for(&session)).map_err(|e| anyhow::anyhow!("Failed to initialize input: {e}"))?;

    let first = initial.or_else(|| session.visible_personas().first().map(|p| p.id.clone()));
    if let Some(persona_id) = first {
        let before = session.focused();
        if session.select_persona(&persona_id).await {
            show_focus_change(&session, before.as_ref(), &mut out, true)?;
        } else {
            notice(&mut out, &format!("{persona_id} is blocked. /unblock it to chat."))?;
        }
    }
    chat_input.update_prompt(&prompt_for(&session));

    let printer = spawn_event_printer(session.clone(), out.clone());

    loop {
        match chat_input.read_line().await {
            InputEvent::Eof => break,
            InputEvent::Interrupted => {
                writeln!(out, "  {}", style("Press Ctrl+D to exit, or keep chatting.").dim())?;
                continue;
            }
            InputEvent::Line(text) => {
                if text.is_empty() {
                    continue;
                }
                match commands::parse(&text) {
                    Some(ChatCommand::Exit) => break,
                    Some(ChatCommand::Clear) => chat_input.clear(),
                    Some(command) => execute(&session, command, &mut out).await?,
                    None => send_text(&session, &text, &mut out).await?,
                }
                chat_input.update_prompt(&prompt_for(&session));
            }
        }
    }

    printer.abort();
    writeln!(out, "\n  {}", style("Session ended.").dim())?;
    let pending = session.pending_replies();
    if pending > 0 {
        debug!(pending, "leaving with replies still in flight");
    }
    chat_input.flush();
    Ok(())
}

/// `Sophie (2) > ` with the unread count, or `pchat > ` when nothing is open.
pub fn prompt_for<L: MessageLog>(session: &Session<L>) -> String {
    let name = session
        .focused()
        .and_then(|id| session.roster().get(&id).map(|p| p.name.clone()))
        .unwrap_or_else(|| "pchat".to_string());
    let label = match session.unread_count() {
        0 => format!("{name} >"),
        unread => format!("{name} ({unread}) >"),
    };
    format!("  {} ", style(label).green().bold())
}

fn spawn_event_printer<L: MessageLog>(session: Session<L>, mut out: SharedWriter) -> JoinHandle<()> {
    let mut events = session.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(line) = render::describe_event(&session, &event) {
                        if writeln!(out, "{line}").is_err() {
                            break;
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event printer lagged behind the session");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn notice(out: &mut impl Write, text: &str) -> io::Result<()> {
    writeln!(out, "  {} {text}", style("!").yellow().bold())
}

fn focused_persona<L: MessageLog>(session: &Session<L>) -> Option<Persona> {
    let id = session.focused()?;
    session.roster().get(&id).cloned()
}

/// The message shown at 1-based `index` in the open conversation.
fn message_at<L: MessageLog>(session: &Session<L>, index: usize) -> Option<Message> {
    let id = session.focused()?;
    let conversation = session.conversation(&id)?;
    conversation.get(index.checked_sub(1)?).cloned()
}

/// Print the newly focused conversation if focus moved (or `force`).
fn show_focus_change<L: MessageLog>(
    session: &Session<L>,
    before: Option<&PersonaId>,
    out: &mut impl Write,
    force: bool,
) -> io::Result<()> {
    let now = session.focused();
    if !force && now.as_ref() == before {
        return Ok(());
    }
    match now.as_ref().and_then(|id| session.roster().get(id)) {
        Some(persona) => render::print_conversation(out, session, persona),
        None => notice(out, "Nobody left to chat with. Try /search or /filter reset."),
    }
}

fn explain_rejected_send<L: MessageLog>(
    session: &Session<L>,
    out: &mut impl Write,
    quota: Option<Quota>,
) -> io::Result<()> {
    if session.focused().is_none() {
        notice(out, "Open a conversation first: /open <persona>")
    } else if quota.is_some_and(|q| q.is_exhausted()) {
        notice(out, "No sends of that kind left on the free tier. /vip to upgrade.")
    } else {
        notice(out, "Message not sent.")
    }
}

fn vip_only(out: &mut impl Write, what: &str) -> io::Result<()> {
    notice(out, &format!("{what} is a VIP feature. /vip to upgrade."))
}

async fn send_text<L: MessageLog>(session: &Session<L>, text: &str, out: &mut impl Write) -> io::Result<()> {
    match session.send_text(text).await {
        Some(id) => {
            debug!(message_id = %id, "sent text");
            Ok(())
        }
        None => explain_rejected_send(session, out, None),
    }
}

fn write_roster<L: MessageLog>(session: &Session<L>, out: &mut impl Write) -> io::Result<()> {
    let visible = session.visible_personas();
    let focused = session.focused();
    writeln!(out)?;
    if visible.is_empty() {
        writeln!(out, "  {}", style("No personas match the current search and filters.").dim())?;
    }
    for persona in &visible {
        let marker = if focused.as_ref() == Some(&persona.id) { "›" } else { " " };
        let vip = if persona.vip { " ★" } else { "" };
        let typing = if session.is_typing(&persona.id) { "  typing…" } else { "" };
        writeln!(
            out,
            "  {} {:<4} {}{}  {}{}",
            style(marker).green().bold(),
            style(persona.id.as_str()).dim(),
            style(&persona.name).cyan(),
            style(vip).yellow(),
            style(format!("{}, {} · {}", persona.age, persona.gender, persona.country.name)).dim(),
            style(typing).dim()
        )?;
    }
    writeln!(out)
}

fn write_status<L: MessageLog>(session: &Session<L>, out: &mut impl Write) -> io::Result<()> {
    let snapshot = session.snapshot();
    let tier = if snapshot.entitlements.vip { "VIP" } else { "free" };
    writeln!(out)?;
    writeln!(out, "  {}   {}", style("Account:").bold(), tier)?;
    writeln!(out, "  {}    {}", style("Images:").bold(), snapshot.images_remaining)?;
    writeln!(out, "  {}     {}", style("Voice:").bold(), snapshot.voice_remaining)?;
    writeln!(out, "  {}    {}", style("Unread:").bold(), snapshot.unread)?;
    if !snapshot.blocked.is_empty() {
        let blocked: Vec<&str> = snapshot.blocked.iter().map(PersonaId::as_str).collect();
        writeln!(out, "  {}   {}", style("Blocked:").bold(), blocked.join(", "))?;
    }
    if !snapshot.search.is_empty() {
        writeln!(out, "  {}    {}", style("Search:").bold(), snapshot.search)?;
    }
    writeln!(out)
}

/// Run one slash command. `Exit` and `Clear` are handled by the loop.
pub async fn execute<L: MessageLog>(
    session: &Session<L>,
    command: ChatCommand,
    out: &mut impl Write,
) -> io::Result<()> {
    match command {
        ChatCommand::Help => commands::print_help(out)?,
        ChatCommand::Exit | ChatCommand::Clear => {}
        ChatCommand::Who => write_roster(session, out)?,
        ChatCommand::Open(target) => match resolve_persona(session.roster(), &target) {
            Some(persona_id) => {
                if session.select_persona(&persona_id).await {
                    let read = session.acknowledge_persona(&persona_id).await;
                    debug!(persona_id = %persona_id, read, "opened conversation");
                    show_focus_change(session, None, out, true)?;
                } else {
                    notice(out, &format!("{target} is blocked. /unblock {persona_id} first."))?;
                }
            }
            None => notice(out, &format!("No persona called '{target}'. /who lists them."))?,
        },
        ChatCommand::History => match focused_persona(session) {
            Some(persona) => render::print_conversation(out, session, &persona)?,
            None => notice(out, "No conversation open.")?,
        },
        ChatCommand::Inbox => {
            let inbox = session.inbox();
            writeln!(out)?;
            if inbox.is_empty() {
                writeln!(out, "  {}", style("No notifications.").dim())?;
            }
            for (i, notification) in inbox.iter().enumerate() {
                let title = render::inbox_title(session, notification);
                writeln!(out, "{}", render::format_notification(i + 1, notification, &title))?;
            }
            writeln!(out)?;
        }
        ChatCommand::Read(index) => {
            let notification = index.checked_sub(1).and_then(|i| session.inbox().into_iter().nth(i));
            let Some(notification) = notification else {
                return notice(out, &format!("No notification {index}."));
            };
            let before = session.focused();
            match session.open_notification(notification.id).await {
                Some(_) => show_focus_change(session, before.as_ref(), out, true)?,
                None => notice(out, "Marked as read; that conversation can't be opened.")?,
            }
        }
        ChatCommand::Sent => {
            let history = session.history();
            writeln!(out)?;
            if history.is_empty() {
                writeln!(out, "  {}", style("Nothing sent yet.").dim())?;
            }
            for (i, notification) in history.iter().enumerate() {
                writeln!(
                    out,
                    "{}",
                    render::format_notification(i + 1, notification, &notification.title)
                )?;
            }
            writeln!(out)?;
        }
        ChatCommand::Image(payload) => {
            if session.send_image(&payload).await.is_none() {
                explain_rejected_send(session, out, Some(session.images_remaining()))?;
            }
        }
        ChatCommand::Voice { secs, payload } => {
            if session.send_voice(&payload, secs).await.is_none() {
                explain_rejected_send(session, out, Some(session.voice_remaining()))?;
            }
        }
        ChatCommand::Reply { index, text } => {
            let Some(target) = message_at(session, index) else {
                return notice(out, &format!("No message {index} here."));
            };
            if !session.entitlements().allows(Feature::Replies) {
                vip_only(out, "Replying to a message")?;
            }
            if session.send_reply(&text, target.id).await.is_none() {
                explain_rejected_send(session, out, None)?;
            }
        }
        ChatCommand::React { index, emoji } => {
            let Some(target) = message_at(session, index) else {
                return notice(out, &format!("No message {index} here."));
            };
            if !session.entitlements().allows(Feature::Reactions) {
                return vip_only(out, "Reacting");
            }
            if session.react(target.id, &emoji).await {
                redraw_message(session, target.id, index, out)?;
            } else {
                notice(out, "That message can't take reactions.")?;
            }
        }
        ChatCommand::Translate { index, language } => {
            let Some(target) = message_at(session, index) else {
                return notice(out, &format!("No message {index} here."));
            };
            if !session.entitlements().allows(Feature::Translation) {
                return vip_only(out, "Translation");
            }
            match session.translate(target.id, &language).await {
                Some(_) => redraw_message(session, target.id, index, out)?,
                None => notice(out, "That message can't be translated.")?,
            }
        }
        ChatCommand::Unsend(index) => {
            let Some(target) = message_at(session, index) else {
                return notice(out, &format!("No message {index} here."));
            };
            if !session.entitlements().allows(Feature::Unsend) {
                return vip_only(out, "Unsending");
            }
            if target.sender != Sender::User {
                return notice(out, "You can only unsend your own messages.");
            }
            if session.unsend(target.id).await {
                redraw_message(session, target.id, index, out)?;
            } else {
                notice(out, "That message can't be unsent.")?;
            }
        }
        ChatCommand::Block(target) => {
            let persona_id = match target {
                Some(target) => resolve_persona(session.roster(), &target),
                None => session.focused(),
            };
            let Some(persona_id) = persona_id else {
                return notice(out, "Block whom? /block <persona>");
            };
            let before = session.focused();
            if session.block(&persona_id).await {
                show_focus_change(session, before.as_ref(), out, false)?;
            } else {
                notice(out, &format!("{persona_id} is already blocked."))?;
            }
        }
        ChatCommand::Unblock(target) => match resolve_persona(session.roster(), &target) {
            Some(persona_id) => {
                if !session.unblock(&persona_id).await {
                    notice(out, &format!("{persona_id} is not blocked."))?;
                }
            }
            None => notice(out, &format!("No persona called '{target}'."))?,
        },
        ChatCommand::Delete => match session.focused() {
            Some(persona_id) => {
                session.delete_conversation(&persona_id).await;
            }
            None => notice(out, "No conversation open.")?,
        },
        ChatCommand::Dismiss => match session.focused() {
            Some(persona_id) => {
                let pending = session.dismiss_pending(&persona_id);
                writeln!(
                    out,
                    "  {}",
                    style(format!("{pending} pending repl{} won't notify.", if pending == 1 { "y" } else { "ies" })).dim()
                )?;
            }
            None => notice(out, "No conversation open.")?,
        },
        ChatCommand::Search(term) => {
            session.set_search(&term).await;
            write_roster(session, out)?;
        }
        ChatCommand::Filter(filter) => {
            session.set_filters(filter).await;
            write_roster(session, out)?;
        }
        ChatCommand::Vip(on) => {
            let entitlements = if on {
                Entitlements::vip()
            } else {
                let config = session.config();
                Entitlements::free(config.free_image_quota, config.free_voice_quota)
            };
            session.set_entitlements(entitlements).await;
        }
        ChatCommand::Status => write_status(session, out)?,
        ChatCommand::Usage(usage) => notice(out, &format!("Usage: {usage}"))?,
        ChatCommand::Invalid(reason) => notice(out, &reason)?,
        ChatCommand::Unknown(name) => notice(
            out,
            &format!("Unknown command: {}. Type /help for available commands.", style(name).dim()),
        )?,
    }
    Ok(())
}

fn redraw_message<L: MessageLog>(
    session: &Session<L>,
    message_id: MessageId,
    index: usize,
    out: &mut impl Write,
) -> io::Result<()> {
    let Some(message) = session.message(message_id) else {
        return Ok(());
    };
    let name = focused_persona(session).map(|p| p.name).unwrap_or_default();
    let quoted = session.reply_preview(message_id);
    writeln!(out, "{}", render::format_message(index, &message, &name, quoted.as_deref()))
}
