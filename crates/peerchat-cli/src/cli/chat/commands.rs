//! Slash command parsing for the chat loop.
//!
//! Commands start with `/`. Message-addressing commands take the 1-based
//! index shown next to each message in the open conversation.

use std::io::{self, Write};

use console::style;

use peerchat_types::filter::{GenderFilter, RosterFilter};

/// Available slash commands in the chat loop.
#[derive(Debug, PartialEq)]
pub enum ChatCommand {
    /// Show available commands.
    Help,
    /// Clear the terminal screen.
    Clear,
    /// Exit the chat session.
    Exit,
    /// List the visible roster.
    Who,
    /// Open a conversation by persona id or name.
    Open(String),
    /// Reprint the open conversation.
    History,
    /// Show the inbox.
    Inbox,
    /// Open the inbox notification at this index.
    Read(usize),
    /// Show the outgoing-message history.
    Sent,
    Image(String),
    Voice { secs: u32, payload: String },
    Reply { index: usize, text: String },
    React { index: usize, emoji: String },
    Translate { index: usize, language: String },
    Unsend(usize),
    /// Block a persona; defaults to the open one.
    Block(Option<String>),
    Unblock(String),
    /// Delete the open conversation.
    Delete,
    /// Drop notifications for replies still in flight.
    Dismiss,
    Search(String),
    Filter(RosterFilter),
    /// Switch between the VIP and free tiers.
    Vip(bool),
    /// Show account and quota status.
    Status,
    /// A known command with missing arguments.
    Usage(&'static str),
    /// A known command with an unparseable argument.
    Invalid(String),
    /// Unknown command.
    Unknown(String),
}

/// Parse user input as a slash command.
///
/// Returns `None` if the input doesn't start with `/`.
pub fn parse(input: &str) -> Option<ChatCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let parts: Vec<&str> = trimmed.splitn(2, ' ').collect();
    let cmd = parts[0].to_lowercase();
    let arg = parts.get(1).map(|s| s.trim()).filter(|s| !s.is_empty());

    let command = match cmd.as_str() {
        "/help" | "/h" | "/?" => ChatCommand::Help,
        "/clear" | "/cls" => ChatCommand::Clear,
        "/exit" | "/quit" | "/q" => ChatCommand::Exit,
        "/who" | "/roster" => ChatCommand::Who,
        "/open" | "/o" => match arg {
            Some(target) => ChatCommand::Open(target.to_string()),
            None => ChatCommand::Usage("/open <persona>"),
        },
        "/history" => ChatCommand::History,
        "/inbox" => ChatCommand::Inbox,
        "/read" => match arg {
            Some(raw) => match parse_index(raw) {
                Some(index) => ChatCommand::Read(index),
                None => ChatCommand::Invalid(format!("not a notification number: {raw}")),
            },
            None => ChatCommand::Usage("/read <n>"),
        },
        "/sent" => ChatCommand::Sent,
        "/image" | "/img" => match arg {
            Some(payload) => ChatCommand::Image(payload.to_string()),
            None => ChatCommand::Usage("/image <file or url>"),
        },
        "/voice" => match arg.and_then(split_first) {
            Some((secs, payload)) => match secs.parse::<u32>() {
                Ok(secs) => ChatCommand::Voice {
                    secs,
                    payload: payload.to_string(),
                },
                Err(_) => ChatCommand::Invalid(format!("not a duration in seconds: {secs}")),
            },
            None => ChatCommand::Usage("/voice <seconds> <file>"),
        },
        "/reply" | "/re" => match indexed(arg) {
            Ok((index, text)) => ChatCommand::Reply {
                index,
                text: text.to_string(),
            },
            Err(None) => ChatCommand::Usage("/reply <n> <text>"),
            Err(Some(e)) => ChatCommand::Invalid(e),
        },
        "/react" => match indexed(arg) {
            Ok((index, emoji)) => ChatCommand::React {
                index,
                emoji: emoji.to_string(),
            },
            Err(None) => ChatCommand::Usage("/react <n> <emoji>"),
            Err(Some(e)) => ChatCommand::Invalid(e),
        },
        "/translate" | "/tr" => match indexed(arg) {
            Ok((index, language)) => ChatCommand::Translate {
                index,
                language: language.to_string(),
            },
            Err(None) => ChatCommand::Usage("/translate <n> <language>"),
            Err(Some(e)) => ChatCommand::Invalid(e),
        },
        "/unsend" => match arg {
            Some(raw) => match parse_index(raw) {
                Some(index) => ChatCommand::Unsend(index),
                None => ChatCommand::Invalid(format!("not a message number: {raw}")),
            },
            None => ChatCommand::Usage("/unsend <n>"),
        },
        "/block" => ChatCommand::Block(arg.map(str::to_string)),
        "/unblock" => match arg {
            Some(target) => ChatCommand::Unblock(target.to_string()),
            None => ChatCommand::Usage("/unblock <persona>"),
        },
        "/delete" => ChatCommand::Delete,
        "/dismiss" => ChatCommand::Dismiss,
        "/search" | "/find" => ChatCommand::Search(arg.unwrap_or_default().to_string()),
        "/filter" => match arg {
            Some(spec) => match parse_filter(spec) {
                Ok(filter) => ChatCommand::Filter(filter),
                Err(e) => ChatCommand::Invalid(e),
            },
            None => ChatCommand::Usage("/filter gender=<g> age=<min>-<max> country=<a,b> | reset"),
        },
        "/vip" => match arg.map(str::to_lowercase).as_deref() {
            None | Some("on") => ChatCommand::Vip(true),
            Some("off") => ChatCommand::Vip(false),
            Some(_) => ChatCommand::Usage("/vip [on|off]"),
        },
        "/status" => ChatCommand::Status,
        other => ChatCommand::Unknown(other.to_string()),
    };
    Some(command)
}

fn split_first(arg: &str) -> Option<(&str, &str)> {
    let (head, rest) = arg.split_once(char::is_whitespace)?;
    let rest = rest.trim();
    (!rest.is_empty()).then_some((head, rest))
}

/// 1-based positive index.
fn parse_index(raw: &str) -> Option<usize> {
    raw.parse::<usize>().ok().filter(|n| *n > 0)
}

/// `<n> <rest>`. `Err(None)` means arguments are missing.
fn indexed(arg: Option<&str>) -> Result<(usize, &str), Option<String>> {
    let (raw, rest) = arg.and_then(split_first).ok_or(None)?;
    let index = parse_index(raw).ok_or_else(|| Some(format!("not a message number: {raw}")))?;
    Ok((index, rest))
}

/// Parse `key=value` filter terms on top of the default filter.
///
/// `reset` alone restores the defaults.
pub fn parse_filter(spec: &str) -> Result<RosterFilter, String> {
    let mut filter = RosterFilter::default();
    if spec.trim().eq_ignore_ascii_case("reset") {
        return Ok(filter);
    }

    for term in spec.split_whitespace() {
        let (key, value) = term
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got '{term}'"))?;
        match key.to_lowercase().as_str() {
            "gender" => filter.gender = value.parse::<GenderFilter>()?,
            "age" => {
                let (min, max) = value
                    .split_once('-')
                    .ok_or_else(|| format!("expected age=<min>-<max>, got '{value}'"))?;
                filter.min_age = min.parse().map_err(|_| format!("invalid minimum age: '{min}'"))?;
                filter.max_age = max.parse().map_err(|_| format!("invalid maximum age: '{max}'"))?;
            }
            "country" | "countries" => {
                filter.countries = value
                    .split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            other => return Err(format!("unknown filter '{other}'")),
        }
    }
    Ok(filter)
}

/// Write the help text listing all available commands.
pub fn print_help(out: &mut impl Write) -> io::Result<()> {
    let rows: &[(&str, &str)] = &[
        ("/help", "Show this help message"),
        ("/who", "List the visible roster"),
        ("/open <persona>", "Open a conversation"),
        ("/history", "Reprint the open conversation"),
        ("/image <file>", "Send an image"),
        ("/voice <secs> <file>", "Send a voice message"),
        ("/reply <n> <text>", "Reply to message n (VIP)"),
        ("/react <n> <emoji>", "Toggle a reaction on message n (VIP)"),
        ("/translate <n> <lang>", "Translate message n (VIP)"),
        ("/unsend <n>", "Unsend your message n"),
        ("/inbox", "Show notifications"),
        ("/read <n>", "Open notification n"),
        ("/sent", "Show sent-message history"),
        ("/block [persona]", "Block a persona (default: open one)"),
        ("/unblock <persona>", "Unblock a persona"),
        ("/delete", "Delete the open conversation"),
        ("/dismiss", "Silence replies already on their way"),
        ("/search [name]", "Search the roster by name"),
        ("/filter ...", "gender=, age=min-max, country=a,b or reset"),
        ("/vip [on|off]", "Switch account tier"),
        ("/status", "Show account status and quotas"),
        ("/clear", "Clear the screen"),
        ("/exit", "End the chat session"),
    ];

    writeln!(out)?;
    writeln!(out, "  {}", style("Available commands:").bold())?;
    writeln!(out)?;
    for (command, description) in rows {
        writeln!(out, "  {:<24}{}", style(command).cyan(), description)?;
    }
    writeln!(out)?;
    writeln!(out, "  {}", style("Ctrl+D to exit").dim())?;
    writeln!(out)
}
