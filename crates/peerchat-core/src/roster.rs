//! Static persona roster and its initial ordering.
//!
//! The roster is the source of truth for persona profile data. It is built
//! once and never mutated; the only runtime decision is its initial order,
//! which is biased towards personas from the visitor's own country when the
//! external [`CountryLookup`] succeeds.

use std::collections::HashSet;

use peerchat_types::error::{LookupError, RosterError};
use peerchat_types::persona::{Country, Gender, Persona, PersonaId};
use tracing::{debug, warn};

/// External country-detection service (e.g. IP geolocation).
///
/// Implementations live in peerchat-infra. Uses native async fn in traits.
pub trait CountryLookup: Send + Sync {
    /// Detect the visitor's ISO 3166-1 alpha-2 country code.
    fn detect_country(
        &self,
    ) -> impl std::future::Future<Output = Result<String, LookupError>> + Send;
}

/// Lookup with a fixed answer, for tests and offline use.
#[derive(Debug, Clone, Default)]
pub struct StaticCountryLookup(pub Option<String>);

impl CountryLookup for StaticCountryLookup {
    async fn detect_country(&self) -> Result<String, LookupError> {
        self.0
            .clone()
            .ok_or_else(|| LookupError::Unavailable("no country configured".to_string()))
    }
}

/// Immutable, ordered list of personas.
#[derive(Debug, Clone)]
pub struct Roster {
    personas: Vec<Persona>,
}

impl Roster {
    /// Build a roster, rejecting duplicate ids and empty reply pools.
    pub fn new(personas: Vec<Persona>) -> Result<Self, RosterError> {
        let mut seen = HashSet::new();
        for persona in &personas {
            if persona.reply_pool.is_empty() {
                return Err(RosterError::EmptyReplyPool(persona.id.to_string()));
            }
            if !seen.insert(persona.id.clone()) {
                return Err(RosterError::DuplicateId(persona.id.to_string()));
            }
        }
        Ok(Self { personas })
    }

    /// The roster shipped with the application.
    pub fn builtin() -> Self {
        Self {
            personas: builtin_personas(),
        }
    }

    pub fn get(&self, id: &PersonaId) -> Option<&Persona> {
        self.personas.iter().find(|p| &p.id == id)
    }

    pub fn contains(&self, id: &PersonaId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Persona> {
        self.personas.iter()
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    /// Reorder for a visitor from `country_code`.
    ///
    /// Same-country personas come first. Ties (and the whole list when no
    /// country is known) are broken by VIP flag (VIP first), then country
    /// name, then persona name. The sort is stable.
    pub fn ordered_for(mut self, country_code: Option<&str>) -> Self {
        let home = country_code.map(|c| c.to_uppercase());
        self.personas.sort_by(|a, b| {
            let a_home = home.as_deref() == Some(a.country.code.to_uppercase().as_str());
            let b_home = home.as_deref() == Some(b.country.code.to_uppercase().as_str());
            b_home
                .cmp(&a_home)
                .then_with(|| b.vip.cmp(&a.vip))
                .then_with(|| a.country.name.cmp(&b.country.name))
                .then_with(|| a.name.cmp(&b.name))
        });
        self
    }
}

impl<'a> IntoIterator for &'a Roster {
    type Item = &'a Persona;
    type IntoIter = std::slice::Iter<'a, Persona>;

    fn into_iter(self) -> Self::IntoIter {
        self.personas.iter()
    }
}

/// Order `roster` using the detected country, falling back to the stable
/// secondary sort when detection fails. Never fails.
pub async fn order_roster<L: CountryLookup>(roster: Roster, lookup: &L) -> Roster {
    match lookup.detect_country().await {
        Ok(code) => {
            debug!(country = %code, "ordering roster by detected country");
            roster.ordered_for(Some(&code))
        }
        Err(e) => {
            warn!(error = %e, "country detection failed, using default roster order");
            roster.ordered_for(None)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn persona(
    id: &str,
    name: &str,
    age: u8,
    gender: Gender,
    country: (&str, &str),
    vip: bool,
    interests: &[&str],
    replies: &[&str],
) -> Persona {
    Persona {
        id: PersonaId::from(id),
        name: name.to_string(),
        age,
        gender,
        country: Country::new(country.0, country.1),
        vip,
        interests: interests.iter().map(|s| s.to_string()).collect(),
        avatar: format!("avatars/{id}.png"),
        reply_pool: replies.iter().map(|s| s.to_string()).collect(),
    }
}

fn builtin_personas() -> Vec<Persona> {
    vec![
        persona(
            "p1",
            "Sophie",
            24,
            Gender::Female,
            ("France", "FR"),
            false,
            &["photography", "travel", "jazz"],
            &[
                "Haha, that's so true!",
                "Tell me more about that.",
                "I was just making coffee, what are you up to?",
                "Have you ever been to Paris?",
                "That sounds amazing!",
            ],
        ),
        persona(
            "p2",
            "Lucas",
            27,
            Gender::Male,
            ("Brazil", "BR"),
            false,
            &["football", "surfing", "music"],
            &[
                "Nice! What else do you like to do?",
                "I just got back from the beach.",
                "Hmm, I never thought about it that way.",
                "Do you like football?",
            ],
        ),
        persona(
            "p3",
            "Yuki",
            22,
            Gender::Female,
            ("Japan", "JP"),
            true,
            &["anime", "gaming", "cooking"],
            &[
                "Sugoi! That's really cool.",
                "I'm learning to make ramen this week.",
                "What games are you playing lately?",
                "Hehe, you're funny.",
            ],
        ),
        persona(
            "p4",
            "Daniel",
            31,
            Gender::Male,
            ("United States", "US"),
            false,
            &["hiking", "startups", "podcasts"],
            &[
                "Totally agree with you.",
                "What do you do for work?",
                "I'm planning a hike this weekend.",
                "That's wild, haha.",
            ],
        ),
        persona(
            "p5",
            "Elena",
            29,
            Gender::Female,
            ("Spain", "ES"),
            true,
            &["dance", "wine", "languages"],
            &[
                "¡Qué bien! That's great.",
                "Do you speak any Spanish?",
                "I love talking to people from other countries.",
                "What's the weather like where you are?",
            ],
        ),
        persona(
            "p6",
            "Arjun",
            25,
            Gender::Male,
            ("India", "IN"),
            false,
            &["cricket", "coding", "movies"],
            &[
                "Interesting! Which movies do you like?",
                "I'm working on a side project right now.",
                "Cricket or football, which one?",
                "Haha, same here.",
            ],
        ),
        persona(
            "p7",
            "Hannah",
            34,
            Gender::Female,
            ("Germany", "DE"),
            false,
            &["books", "cycling", "baking"],
            &[
                "I just finished a great book.",
                "What are you reading at the moment?",
                "That's lovely to hear.",
                "I baked bread today, it smells wonderful.",
            ],
        ),
        persona(
            "p8",
            "Min-jun",
            23,
            Gender::Male,
            ("South Korea", "KR"),
            true,
            &["k-pop", "fashion", "esports"],
            &[
                "Daebak! That's awesome.",
                "Do you listen to K-pop?",
                "I'm watching a tournament right now.",
                "What's your favourite food?",
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(roster: &Roster) -> Vec<&str> {
        roster.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_builtin_roster_is_valid() {
        let builtin = Roster::builtin();
        let rebuilt = Roster::new(builtin.iter().cloned().collect()).unwrap();
        assert_eq!(rebuilt.len(), 8);
        assert!(rebuilt.contains(&PersonaId::from("p1")));
    }

    #[test]
    fn test_new_rejects_empty_reply_pool() {
        let mut p = Roster::builtin().get(&"p1".into()).cloned().unwrap();
        p.reply_pool.clear();
        assert!(matches!(
            Roster::new(vec![p]),
            Err(RosterError::EmptyReplyPool(id)) if id == "p1"
        ));
    }

    #[test]
    fn test_new_rejects_duplicate_ids() {
        let p = Roster::builtin().get(&"p1".into()).cloned().unwrap();
        assert!(matches!(
            Roster::new(vec![p.clone(), p]),
            Err(RosterError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_ordered_for_country_puts_home_first() {
        let roster = Roster::builtin().ordered_for(Some("de"));
        assert_eq!(roster.iter().next().unwrap().name, "Hannah");
    }

    #[test]
    fn test_fallback_order_is_vip_then_country_then_name() {
        let roster = Roster::builtin().ordered_for(None);
        let personas: Vec<&Persona> = roster.iter().collect();
        // VIP personas first.
        assert!(personas[..3].iter().all(|p| p.vip));
        assert!(personas[3..].iter().all(|p| !p.vip));
        // Within VIP: Japan < South Korea < Spain.
        assert_eq!(names(&roster)[..3], ["Yuki", "Min-jun", "Elena"]);
    }

    #[tokio::test]
    async fn test_order_roster_falls_back_on_lookup_failure() {
        let failed = order_roster(Roster::builtin(), &StaticCountryLookup(None)).await;
        let fallback = Roster::builtin().ordered_for(None);
        assert_eq!(names(&failed), names(&fallback));
    }

    #[tokio::test]
    async fn test_order_roster_uses_detected_country() {
        let lookup = StaticCountryLookup(Some("BR".to_string()));
        let roster = order_roster(Roster::builtin(), &lookup).await;
        assert_eq!(roster.iter().next().unwrap().name, "Lucas");
    }
}
