//! Roster for seeding the world with autonomous agents.
//!
//! Each new agent gets a name, a character sprite and a personality. The
//! roster prefers entries nobody in the world uses yet and only repeats
//! one once its pool is exhausted, so early agents all look and sound
//! different.

use std::collections::BTreeSet;

use rand::Rng;
use rand::seq::IndexedRandom;
use township_core::World;
use township_core::inputs::CreateAgentArgs;

// -----------------------------------------------------------------------
// Pools
// -----------------------------------------------------------------------

/// Directory holding the character sprite sheets.
pub const CHARACTER_ASSET_DIR: &str = "/township/assets/characters";

const CHARACTER_ASSETS: &[&str] = &[
    "1.png", "2.png", "3.png", "4.png", "5.png", "6.png", "7.png", "8.png", "9.png", "10.png",
    "11.png", "12.png", "22.png", "23.png", "24.png", "42.png", "44.png", "45.png", "82y.png",
    "123.png", "124.png", "222.png", "22222.png", "234.png",
];

/// Built-in pool of agent names.
const NAME_POOL: &[&str] = &[
    "Alex", "Lucky", "Bob", "Stella", "Kurt", "Alice", "Pete", "Kira", "Mabel", "Otis",
    "Juno", "Rosa", "Felix", "Hazel", "Milo", "Nora", "Ivan", "Tess", "Gus", "Wren",
];

const KINDS: &[&str] = &[
    "food blogger with sharp opinions",
    "stubborn programmer",
    "retired street-corner philosopher",
    "rock music fan",
    "stand-up comedian",
    "plain-spoken builder",
    "law student",
    "photography nerd",
    "fitness coach",
    "barista",
    "freelance illustrator",
    "community volunteer",
];

const TONES: &[&str] = &[
    "chatty", "nitpicky", "direct", "argumentative", "deadpan", "witty", "impulsive", "loyal",
];

const HOBBIES: &[&str] = &[
    "night markets",
    "running at dusk",
    "street photography",
    "live gigs",
    "editing videos",
    "petting cats",
    "camping",
    "cycling",
    "collecting old things",
    "board games",
    "baking",
    "growing flowers",
];

const GOALS: &[&str] = &[
    "review a new shop in town",
    "organize a small get-together",
    "make a new friend",
    "finish a long-postponed project",
    "learn a new skill",
    "save up for a trip",
    "cook a signature dish for someone",
    "help a friend solve a problem",
    "do something nice for the neighbourhood",
    "take a proper day off",
];

/// Personalities handed out after the combinations run out.
const FALLBACK_IDENTITY: &str = "An ordinary visitor who chats casually and stays polite.";
const FALLBACK_PLAN: &str = "Meet a few like-minded people.";

// -----------------------------------------------------------------------
// Personalities
// -----------------------------------------------------------------------

/// Who an agent is and what it is up to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Personality {
    /// Self-description, also used as the player description.
    pub identity: String,
    /// Near-term goal.
    pub plan: String,
}

/// Every built-in personality, combining each kind with each tone.
pub fn personalities() -> Vec<Personality> {
    let mut out = Vec::with_capacity(KINDS.len().saturating_mul(TONES.len()));
    for (i, kind) in KINDS.iter().enumerate() {
        for (j, tone) in TONES.iter().enumerate() {
            let hobby = HOBBIES.iter().cycle().nth(i.saturating_add(j));
            let goal = GOALS.iter().cycle().nth(i.saturating_mul(3).saturating_add(j));
            let (Some(hobby), Some(goal)) = (hobby, goal) else {
                continue;
            };
            out.push(Personality {
                identity: format!(
                    "A {tone} {kind} who loves {hobby}. Speaks plainly, pushes back on nonsense and is happy to talk things through afterwards."
                ),
                plan: format!("I want to {goal}."),
            });
        }
    }
    out
}

/// Full paths of every character sprite sheet.
pub fn character_assets() -> Vec<String> {
    CHARACTER_ASSETS
        .iter()
        .map(|file| format!("{CHARACTER_ASSET_DIR}/{file}"))
        .collect()
}

/// Pick a random entry of `pool` missing from `used`, or any entry when all
/// are taken.
fn pick_preferring_unused<'a, R: Rng + ?Sized>(
    rng: &mut R,
    pool: &'a [String],
    used: &BTreeSet<String>,
) -> Option<&'a String> {
    let unused: Vec<&String> = pool.iter().filter(|entry| !used.contains(*entry)).collect();
    match unused.choose(rng) {
        Some(entry) => Some(*entry),
        None => pool.choose(rng),
    }
}

// -----------------------------------------------------------------------
// Roster
// -----------------------------------------------------------------------

/// Tracks which names, sprites and personalities are already in play.
#[derive(Debug, Clone)]
pub struct Roster {
    names: Vec<String>,
    assets: Vec<String>,
    personalities: Vec<Personality>,
    used_names: BTreeSet<String>,
    used_assets: BTreeSet<String>,
    used_identities: BTreeSet<String>,
}

impl Default for Roster {
    fn default() -> Self {
        Self {
            names: NAME_POOL.iter().map(|name| (*name).to_owned()).collect(),
            assets: character_assets(),
            personalities: personalities(),
            used_names: BTreeSet::new(),
            used_assets: BTreeSet::new(),
            used_identities: BTreeSet::new(),
        }
    }
}

impl Roster {
    /// A roster that treats everything already described in `world` as
    /// taken, departed players included.
    pub fn from_world(world: &World) -> Self {
        let mut roster = Self::default();
        for description in world.descriptions().values() {
            roster.used_names.insert(description.name.trim().to_owned());
            if description.character.starts_with(CHARACTER_ASSET_DIR) {
                roster.used_assets.insert(description.character.clone());
            }
            roster.used_identities.insert(description.description.clone());
        }
        roster
    }

    /// The `createAgent` arguments for the next agent.
    pub fn next_agent<R: Rng + ?Sized>(&mut self, rng: &mut R) -> CreateAgentArgs {
        let name = pick_preferring_unused(rng, &self.names, &self.used_names)
            .filter(|name| !self.used_names.contains(*name))
            .cloned()
            .unwrap_or_else(|| {
                (1_u32..)
                    .map(|n| format!("Visitor {n}"))
                    .find(|candidate| !self.used_names.contains(candidate))
                    .unwrap_or_default()
            });
        let character = pick_preferring_unused(rng, &self.assets, &self.used_assets)
            .cloned()
            .unwrap_or_else(|| format!("{CHARACTER_ASSET_DIR}/1.png"));

        let identities: Vec<String> = self.personalities.iter().map(|p| p.identity.clone()).collect();
        let personality = pick_preferring_unused(rng, &identities, &self.used_identities)
            .and_then(|identity| self.personalities.iter().find(|p| &p.identity == identity))
            .cloned()
            .unwrap_or_else(|| Personality {
                identity: FALLBACK_IDENTITY.to_owned(),
                plan: FALLBACK_PLAN.to_owned(),
            });

        self.used_names.insert(name.clone());
        self.used_assets.insert(character.clone());
        self.used_identities.insert(personality.identity.clone());
        CreateAgentArgs {
            name,
            character,
            identity: personality.identity,
            plan: personality.plan,
        }
    }
}

/// Arguments for `count` new agents, none reusing a name already in
/// `world`.
pub fn seed_agents<R: Rng + ?Sized>(world: &World, count: u32, rng: &mut R) -> Vec<CreateAgentArgs> {
    let mut roster = Roster::from_world(world);
    (0..count).map(|_| roster.next_agent(rng)).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use township_core::SimulationConfig;

    #[test]
    fn personalities_are_distinct() {
        let all = personalities();
        assert_eq!(all.len(), KINDS.len() * TONES.len());
        let identities: BTreeSet<&str> = all.iter().map(|p| p.identity.as_str()).collect();
        assert_eq!(identities.len(), all.len());
    }

    #[test]
    fn seeded_agents_use_unique_assets_and_names() {
        let world = World::new(SimulationConfig::default());
        let mut rng = SmallRng::seed_from_u64(3);
        let agents = seed_agents(&world, 10, &mut rng);
        assert_eq!(agents.len(), 10);
        let names: BTreeSet<&str> = agents.iter().map(|a| a.name.as_str()).collect();
        let assets: BTreeSet<&str> = agents.iter().map(|a| a.character.as_str()).collect();
        assert_eq!(names.len(), 10);
        assert_eq!(assets.len(), 10);
        assert!(assets.iter().all(|a| a.starts_with("/township/assets/characters/")));
    }

    #[test]
    fn assets_repeat_only_after_the_pool_is_used() {
        let world = World::new(SimulationConfig::default());
        let mut rng = SmallRng::seed_from_u64(9);
        let agents = seed_agents(&world, 30, &mut rng);
        let first: BTreeSet<&str> = agents.iter().take(24).map(|a| a.character.as_str()).collect();
        assert_eq!(first.len(), 24);
        let names: BTreeSet<&str> = agents.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names.len(), 30);
    }

    #[test]
    fn agents_already_in_the_world_are_skipped() {
        let mut world = World::new(SimulationConfig::default());
        let mut rng = SmallRng::seed_from_u64(1);
        let taken: Vec<CreateAgentArgs> = seed_agents(&world, 5, &mut rng);
        for args in &taken {
            world.create_agent(0, args).unwrap();
        }
        let next = seed_agents(&world, 5, &mut rng);
        for args in &next {
            assert!(taken.iter().all(|t| t.name != args.name && t.character != args.character));
        }
    }
}
