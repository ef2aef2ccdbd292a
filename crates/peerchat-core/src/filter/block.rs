//! Blocked persona set.

use std::collections::HashSet;

use peerchat_types::persona::PersonaId;

/// Set of personas the visitor has blocked.
///
/// Blocking only hides a persona from the visible roster; conversation and
/// notification data are kept. Refocusing after a block is the session's job.
#[derive(Debug, Clone, Default)]
pub struct BlockList {
    blocked: HashSet<PersonaId>,
}

impl BlockList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the persona was not already blocked.
    pub fn block(&mut self, id: PersonaId) -> bool {
        self.blocked.insert(id)
    }

    /// Returns `true` if the persona was blocked.
    pub fn unblock(&mut self, id: &PersonaId) -> bool {
        self.blocked.remove(id)
    }

    pub fn is_blocked(&self, id: &PersonaId) -> bool {
        self.blocked.contains(id)
    }

    /// Blocked ids in sorted order.
    pub fn to_sorted_vec(&self) -> Vec<PersonaId> {
        let mut ids: Vec<PersonaId> = self.blocked.iter().cloned().collect();
        ids.sort();
        ids
    }
}
