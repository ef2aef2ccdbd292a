//! `pchat roster` -- list the visible roster.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use peerchat_core::filter::{BlockList, visible_personas};
use peerchat_types::filter::RosterFilter;
use peerchat_types::persona::Persona;

use super::RosterArgs;
use crate::state::AppState;

impl From<RosterArgs> for RosterFilter {
    fn from(args: RosterArgs) -> Self {
        Self {
            gender: args.gender,
            min_age: args.min_age,
            max_age: args.max_age,
            countries: args.countries,
        }
    }
}

/// Print the personas matching `args`, in roster order.
pub fn list_roster(state: &AppState, args: RosterArgs, json: bool) -> Result<()> {
    let search = args.search.clone().unwrap_or_default();
    let filter = RosterFilter::from(args);
    let personas = visible_personas(&state.roster, &BlockList::new(), &search, &filter);

    if json {
        println!("{}", serde_json::to_string_pretty(&personas)?);
        return Ok(());
    }

    if personas.is_empty() {
        println!();
        println!("  {}", style("No personas match these filters.").dim());
        println!();
        return Ok(());
    }

    println!();
    println!("{}", roster_table(&personas));
    println!();
    Ok(())
}

pub fn roster_table(personas: &[&Persona]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Name").fg(Color::White),
        Cell::new("Age").fg(Color::White),
        Cell::new("Gender").fg(Color::White),
        Cell::new("Country").fg(Color::White),
        Cell::new("Interests").fg(Color::White),
    ]);

    for persona in personas {
        let name = if persona.vip {
            Cell::new(format!("{} ★", persona.name)).fg(Color::Yellow)
        } else {
            Cell::new(&persona.name).fg(Color::Cyan)
        };
        table.add_row(vec![
            Cell::new(persona.id.as_str()).fg(Color::DarkGrey),
            name,
            Cell::new(persona.age),
            Cell::new(persona.gender),
            Cell::new(format!("{} ({})", persona.country.name, persona.country.code)),
            Cell::new(persona.interests.join(", ")).fg(Color::DarkGrey),
        ]);
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerchat_core::roster::Roster;
    use peerchat_types::filter::GenderFilter;

    #[test]
    fn roster_args_convert_to_filter() {
        let args = RosterArgs {
            search: None,
            gender: GenderFilter::Female,
            min_age: 20,
            max_age: 30,
            countries: vec!["JP".to_string()],
        };
        let filter = RosterFilter::from(args);
        assert_eq!(filter.gender, GenderFilter::Female);
        assert_eq!((filter.min_age, filter.max_age), (20, 30));
        assert_eq!(filter.countries, vec!["JP".to_string()]);
    }

    #[test]
    fn roster_table_lists_every_persona() {
        let roster = Roster::builtin();
        let personas: Vec<&Persona> = roster.iter().collect();
        let rendered = roster_table(&personas).to_string();
        for persona in &personas {
            assert!(rendered.contains(persona.id.as_str()));
        }
        assert!(rendered.contains("Yuki ★"));
    }
}
