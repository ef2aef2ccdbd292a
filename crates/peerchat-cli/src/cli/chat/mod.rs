//! Interactive chat for `pchat chat`.
//!
//! Builds a session (in memory, or backed by the SQLite message log and
//! restored from it), then hands it to `loop_runner::run_chat_loop`.

pub mod banner;
pub mod commands;
pub mod input;
pub mod loop_runner;
pub mod render;

use anyhow::anyhow;
use tracing::{info, warn};

use peerchat_core::chat::{MessageLog, Session};
use peerchat_core::roster::Roster;
use peerchat_types::entitlement::Entitlements;
use peerchat_types::persona::PersonaId;

use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Owner id; stored conversations are keyed by it.
    pub nickname: String,
    pub persona: Option<String>,
    pub vip: bool,
    /// Skip the message log entirely.
    pub ephemeral: bool,
}

/// Find a persona by exact id, then by case-insensitive name.
pub fn resolve_persona(roster: &Roster, target: &str) -> Option<PersonaId> {
    let target = target.trim();
    let by_id = PersonaId::from(target);
    if roster.contains(&by_id) {
        return Some(by_id);
    }
    roster
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(target))
        .map(|p| p.id.clone())
}

pub async fn run(state: &AppState, options: ChatOptions) -> anyhow::Result<()> {
    let initial = match options.persona.as_deref() {
        Some(target) => Some(resolve_persona(&state.roster, target).ok_or_else(|| {
            anyhow!("Unknown persona '{target}'. Run `pchat roster` to see who is online.")
        })?),
        None => None,
    };

    if options.ephemeral {
        let session = Session::new(&options.nickname, state.roster.clone(), state.config.clone());
        return start(session, &options, initial, None).await;
    }

    let log = state.open_message_log().await?;
    let session = Session::with_log(&options.nickname, state.roster.clone(), state.config.clone(), log);
    let restored = match session.restore().await {
        Ok(count) => {
            info!(owner_id = %options.nickname, messages = count, "restored conversations");
            Some(count)
        }
        Err(e) => {
            warn!(error = %e, "could not restore conversations, starting empty");
            None
        }
    };
    start(session, &options, initial, restored).await
}

async fn start<L: MessageLog>(
    session: Session<L>,
    options: &ChatOptions,
    initial: Option<PersonaId>,
    restored: Option<usize>,
) -> anyhow::Result<()> {
    if options.vip {
        session.set_entitlements(Entitlements::vip()).await;
    }
    banner::print_welcome_banner(&options.nickname, options.vip, session.roster().len(), restored);
    loop_runner::run_chat_loop(session, initial).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_persona_by_id_or_name() {
        let roster = Roster::builtin();
        assert_eq!(resolve_persona(&roster, "p3"), Some(PersonaId::from("p3")));
        assert_eq!(resolve_persona(&roster, "yuki"), Some(PersonaId::from("p3")));
        assert_eq!(resolve_persona(&roster, " Sophie "), Some(PersonaId::from("p1")));
        assert_eq!(resolve_persona(&roster, "nobody"), None);
    }
}
