//! Terminal rendering for conversations, notifications, and session events.
//!
//! Everything here produces strings or writes to a `Write`, so the chat loop
//! can route output through the readline `SharedWriter` and tests can
//! capture it in a `Vec<u8>`.

use std::io::{self, Write};

use console::style;

use peerchat_core::chat::{MessageLog, Session};
use peerchat_core::notification::display_title;
use peerchat_types::event::SessionEvent;
use peerchat_types::message::{DeliveryStatus, Message, Sender};
use peerchat_types::notification::Notification;
use peerchat_types::persona::{Persona, PersonaId};

pub fn status_label(status: DeliveryStatus) -> &'static str {
    match status {
        DeliveryStatus::Sending => "…",
        DeliveryStatus::Sent => "✓",
        DeliveryStatus::Delivered => "✓✓",
        DeliveryStatus::Read => "✓✓ read",
    }
}

/// One message line, plus its quoted reply and translation when present.
///
/// `index` is the 1-based position used by message-addressing commands.
pub fn format_message(index: usize, message: &Message, persona_name: &str, reply_preview: Option<&str>) -> String {
    let mut out = String::new();

    if let Some(quoted) = reply_preview {
        out.push_str(&format!("      {} {}\n", style("↳").dim(), style(quoted).dim().italic()));
    }

    let number = style(format!("[{index:>2}]")).dim();
    let body = message.display_content();
    let body = if message.is_deleted {
        style(body).dim().italic().to_string()
    } else {
        body
    };

    match message.sender {
        Sender::User => {
            out.push_str(&format!(
                "  {number} {} {body}  {}",
                style("You:").green().bold(),
                style(status_label(message.status)).dim()
            ));
        }
        Sender::Bot => {
            out.push_str(&format!("  {number} {} {body}", style(format!("{persona_name}:")).cyan().bold()));
        }
        Sender::System => {
            out.push_str(&format!("  {number} {}", style(body).dim().italic()));
        }
    }

    if !message.reactions.is_empty() {
        let emojis: Vec<&str> = message.reactions.iter().map(|r| r.emoji.as_str()).collect();
        out.push_str(&format!("  [{}]", emojis.join(" ")));
    }

    if let Some(translation) = message.translation().filter(|_| !message.is_deleted) {
        out.push_str(&format!(
            "\n      {} {}",
            style(format!("{}:", translation.language)).yellow(),
            translation.content
        ));
    }

    out
}

/// Write the whole conversation with `persona`, or a hint when it is empty.
pub fn print_conversation<L: MessageLog>(
    out: &mut impl Write,
    session: &Session<L>,
    persona: &Persona,
) -> io::Result<()> {
    let vip = if persona.vip { " ★" } else { "" };
    writeln!(out)?;
    writeln!(
        out,
        "  {}{}  {}",
        style(&persona.name).cyan().bold(),
        style(vip).yellow(),
        style(format!("{}, {}", persona.age, persona.country.name)).dim()
    )?;
    writeln!(out, "  {}", style("---").dim())?;

    let messages = session.conversation(&persona.id).unwrap_or_default();
    if messages.is_empty() {
        writeln!(out, "  {}", style(persona.greeting()).dim().italic())?;
    }
    for (i, message) in messages.iter().enumerate() {
        let quoted = session.reply_preview(message.id);
        writeln!(out, "{}", format_message(i + 1, message, &persona.name, quoted.as_deref()))?;
    }
    if session.is_typing(&persona.id) {
        writeln!(out, "  {}", style(format!("{} is typing…", persona.name)).dim())?;
    }
    writeln!(out)
}

/// One inbox or history entry. Unread entries are bold.
pub fn format_notification(index: usize, notification: &Notification, title: &str) -> String {
    let time = notification.time.format("%H:%M");
    let title = if notification.read {
        style(title).to_string()
    } else {
        style(title).bold().to_string()
    };
    format!(
        "  {} {} {}  {}",
        style(format!("[{index:>2}]")).dim(),
        style(time).dim(),
        title,
        style(&notification.message).dim()
    )
}

/// Inbox entries are titled from the current roster; history titles are
/// shown as stored.
pub fn inbox_title<L: MessageLog>(session: &Session<L>, notification: &Notification) -> String {
    display_title(notification, session.roster())
}

fn persona_name<L: MessageLog>(session: &Session<L>, persona_id: &PersonaId) -> String {
    session
        .roster()
        .get(persona_id)
        .map(|p| p.name.clone())
        .unwrap_or_else(|| persona_id.to_string())
}

/// The line to print for a session event, if the event is worth showing.
///
/// Only activity in the open conversation is echoed in full; everything
/// else surfaces through inbox notifications. Focus changes are rendered by
/// the command that caused them.
pub fn describe_event<L: MessageLog>(session: &Session<L>, event: &SessionEvent) -> Option<String> {
    let focused = session.focused();
    let is_focused = |id: &PersonaId| focused.as_ref() == Some(id);

    match event {
        SessionEvent::MessageAppended { persona_id, message_id } if is_focused(persona_id) => {
            let conversation = session.conversation(persona_id)?;
            let index = conversation.iter().position(|m| m.id == *message_id)?;
            let message = &conversation[index];
            if message.sender == Sender::System {
                return None;
            }
            let quoted = session.reply_preview(message.id);
            Some(format_message(
                index + 1,
                message,
                &persona_name(session, persona_id),
                quoted.as_deref(),
            ))
        }
        SessionEvent::StatusAdvanced {
            persona_id,
            status: DeliveryStatus::Read,
            ..
        } if is_focused(persona_id) => Some(format!(
            "  {}",
            style(format!("{} read your message", persona_name(session, persona_id))).dim()
        )),
        SessionEvent::TypingChanged { persona_id, typing: true } if is_focused(persona_id) => Some(format!(
            "  {}",
            style(format!("{} is typing…", persona_name(session, persona_id))).dim()
        )),
        SessionEvent::InboxNotification { notification_id, .. } => {
            let inbox = session.inbox();
            let notification = inbox.iter().find(|n| n.id == *notification_id)?;
            Some(format!(
                "  {} {}  {}",
                style("*").yellow().bold(),
                style(inbox_title(session, notification)).bold(),
                style(&notification.message).dim()
            ))
        }
        SessionEvent::BlockChanged { persona_id, blocked } => {
            let verb = if *blocked { "blocked" } else { "unblocked" };
            Some(format!(
                "  {} {} {verb}",
                style("!").yellow().bold(),
                persona_name(session, persona_id)
            ))
        }
        SessionEvent::ConversationDeleted { persona_id } => Some(format!(
            "  {}",
            style(format!("Conversation with {} deleted.", persona_name(session, persona_id))).dim()
        )),
        SessionEvent::EntitlementsChanged { vip } => {
            let tier = if *vip { "VIP" } else { "free" };
            Some(format!("  {} Account switched to the {tier} tier.", style("*").cyan().bold()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerchat_core::roster::Roster;
    use peerchat_types::config::SessionConfig;
    use peerchat_types::entitlement::Entitlements;
    use peerchat_types::message::MessageKind;

    fn plain(s: &str) -> String {
        console::strip_ansi_codes(s).to_string()
    }

    #[test]
    fn test_format_user_message_shows_status() {
        let message = Message::user("hi there", MessageKind::Text);
        let line = plain(&format_message(3, &message, "Sophie", None));
        assert!(line.contains("[ 3]"));
        assert!(line.contains("You: hi there"));
        assert!(line.ends_with("…"));
    }

    #[test]
    fn test_format_bot_message_with_reply_and_reactions() {
        let mut message = Message::bot("Tell me more");
        message.toggle_reaction("❤️", "guest");
        let line = plain(&format_message(2, &message, "Sophie", Some("hello")));
        let lines: Vec<&str> = line.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("↳ hello"));
        assert!(lines[1].contains("Sophie: Tell me more"));
        assert!(lines[1].ends_with("[❤️]"));
    }

    #[test]
    fn test_format_translation_hidden_once_unsent() {
        let mut message = Message::bot("Hello");
        message.set_translation("es", "Hola");
        assert!(plain(&format_message(1, &message, "Lucas", None)).contains("es: Hola"));

        message.is_deleted = true;
        let line = plain(&format_message(1, &message, "Lucas", None));
        assert!(!line.contains("Hola"));
        assert!(line.contains("This message was unsent."));
    }

    #[test]
    fn test_format_voice_placeholder() {
        let message = Message::user("memo.ogg", MessageKind::Voice { duration_secs: 65 });
        let line = plain(&format_message(1, &message, "Yuki", None));
        assert!(line.contains("[Voice message 1:05]"));
        assert!(!line.contains("memo.ogg"));
    }

    #[test]
    fn test_format_notification_marks_unread() {
        let notification = Notification::incoming("New message", "hey", "p1".into(), 30);
        let line = plain(&format_notification(1, &notification, "New message from Sophie"));
        assert!(line.contains("New message from Sophie"));
        assert!(line.contains("hey"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_describe_event_echoes_focused_activity_only() {
        let session = Session::new("guest", Roster::builtin(), SessionConfig::default());
        let mut rx = session.subscribe();
        assert!(session.select_persona(&"p1".into()).await);
        session.send_text("hello").await.unwrap();
        session.wait_idle().await;

        let mut lines = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let Some(line) = describe_event(&session, &event) {
                lines.push(plain(&line));
            }
        }
        assert!(lines.iter().any(|l| l.contains("You: hello")));
        assert!(lines.iter().any(|l| l.contains("Sophie is typing…")));
        assert!(lines.iter().any(|l| l.contains("Sophie:")));
        assert!(!lines.iter().any(|l| l.contains("read your message")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_describe_event_surfaces_background_reply_as_notification() {
        let session = Session::new("guest", Roster::builtin(), SessionConfig::default());
        session.set_entitlements(Entitlements::vip()).await;
        assert!(session.select_persona(&"p1".into()).await);
        session.send_text("hello").await.unwrap();
        assert!(session.select_persona(&"p2".into()).await);

        let mut rx = session.subscribe();
        session.wait_idle().await;

        let mut lines = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let Some(line) = describe_event(&session, &event) {
                lines.push(plain(&line));
            }
        }
        assert!(lines.iter().any(|l| l.contains("New message from Sophie")));
        assert!(!lines.iter().any(|l| l.contains("Sophie:")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_print_conversation_lists_greeting_and_messages() {
        let session = Session::new("guest", Roster::builtin(), SessionConfig::default());
        let persona = session.roster().get(&"p1".into()).cloned().unwrap();
        assert!(session.select_persona(&persona.id).await);
        session.send_text("bonjour").await.unwrap();

        let mut out = Vec::new();
        print_conversation(&mut out, &session, &persona).unwrap();
        let text = plain(&String::from_utf8(out).unwrap());
        assert!(text.contains("Start a conversation with Sophie"));
        assert!(text.contains("[ 2] You: bonjour"));
        assert!(text.contains("Sophie is typing…"));
    }
}
