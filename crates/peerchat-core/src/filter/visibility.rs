//! Visible-roster computation.
//!
//! A pure function over the roster, the block list, a search term, and the
//! structured filters. All predicates are AND terms, so their order only
//! affects how early a persona is rejected, never the result.

use peerchat_types::filter::RosterFilter;
use peerchat_types::persona::Persona;

use super::block::BlockList;
use crate::roster::Roster;

/// Personas that survive blocking, search, and filters, in roster order.
pub fn visible_personas<'a>(
    roster: &'a Roster,
    blocked: &BlockList,
    search: &str,
    filter: &RosterFilter,
) -> Vec<&'a Persona> {
    let needle = search.trim().to_lowercase();
    roster
        .iter()
        .filter(|p| !blocked.is_blocked(&p.id))
        .filter(|p| matches_search(p, &needle))
        .filter(|p| filter.gender.matches(p.gender))
        .filter(|p| matches_age(p, filter))
        .filter(|p| matches_country(p, filter))
        .collect()
}

/// `needle` must already be lowercased.
fn matches_search(persona: &Persona, needle: &str) -> bool {
    needle.is_empty() || persona.name.to_lowercase().contains(needle)
}

fn matches_age(persona: &Persona, filter: &RosterFilter) -> bool {
    persona.age >= filter.min_age && persona.age <= filter.max_age
}

/// Matches on either the country code or the country name, case-insensitively.
fn matches_country(persona: &Persona, filter: &RosterFilter) -> bool {
    filter.countries.is_empty()
        || filter.countries.iter().any(|c| {
            c.eq_ignore_ascii_case(&persona.country.code)
                || c.eq_ignore_ascii_case(&persona.country.name)
        })
}
