//! Configuration loading and typed config structures for the Township engine.
//!
//! The canonical configuration lives in `township-config.yaml` at the
//! project root. Every field has a default matching the built-in constants,
//! so a missing section, or an empty document, yields a working world.
//!
//! Two environment variables override the file:
//! - `TOWNSHIP_SEED` overrides `world.seed`
//! - `TOWNSHIP_AGENTS` overrides `agents.seed_agents`

use std::path::Path;

use serde::Deserialize;
use tracing::warn;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level engine configuration, mirroring `township-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Map dimensions, seed and step timing.
    #[serde(default)]
    pub world: WorldConfig,

    /// Walking speed, collisions and pathfinding limits.
    #[serde(default)]
    pub movement: MovementConfig,

    /// Join rules and human idle handling.
    #[serde(default)]
    pub players: PlayersConfig,

    /// Distances and durations for building, trading and emotes.
    #[serde(default)]
    pub interaction: InteractionConfig,

    /// Autonomous agent timing and decision parameters.
    #[serde(default)]
    pub agents: AgentsConfig,

    /// Generation budget gate and image generation settings.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Channel sizes and executor limits for the binary.
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string and apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides looked up through `lookup` (normally the process
    /// environment). Unparseable values are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup("TOWNSHIP_SEED") {
            match raw.trim().parse() {
                Ok(seed) => self.world.seed = seed,
                Err(e) => warn!(value = %raw, error = %e, "Ignoring invalid TOWNSHIP_SEED"),
            }
        }
        if let Some(raw) = lookup("TOWNSHIP_AGENTS") {
            match raw.trim().parse() {
                Ok(count) => self.agents.seed_agents = count,
                Err(e) => warn!(value = %raw, error = %e, "Ignoring invalid TOWNSHIP_AGENTS"),
            }
        }
    }
}

/// World-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldConfig {
    /// Human-readable world name.
    #[serde(default = "default_world_name")]
    pub name: String,

    /// Seed for the world's random number generator.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Map width in tiles.
    #[serde(default = "default_map_width")]
    pub width: u32,

    /// Map height in tiles.
    #[serde(default = "default_map_height")]
    pub height: u32,

    /// Tile size in pixels.
    #[serde(default = "default_tile_dim")]
    pub tile_dim: u32,

    /// Simulated milliseconds per tick.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Wall-clock milliseconds between steps.
    #[serde(default = "default_step_interval_ms")]
    pub step_interval_ms: u64,
}

impl WorldConfig {
    /// Upper bound on ticks executed by one step.
    pub fn max_ticks_per_step(&self) -> u64 {
        self.step_interval_ms
            .checked_div(self.tick_ms)
            .unwrap_or(1)
            .max(1)
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: default_world_name(),
            seed: default_seed(),
            width: default_map_width(),
            height: default_map_height(),
            tile_dim: default_tile_dim(),
            tick_ms: default_tick_ms(),
            step_interval_ms: default_step_interval_ms(),
        }
    }
}

/// Movement and pathfinding configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MovementConfig {
    /// Walking speed in tiles per second.
    #[serde(default = "default_speed")]
    pub speed: f64,

    /// Minimum distance in tiles between two players.
    #[serde(default = "default_collision_threshold")]
    pub collision_threshold: f64,

    /// Pathfinding intents older than this are abandoned.
    #[serde(default = "default_pathfinding_timeout_ms")]
    pub pathfinding_timeout_ms: u64,

    /// Exclusive upper bound of the randomized collision backoff.
    #[serde(default = "default_pathfinding_backoff_ms")]
    pub pathfinding_backoff_ms: u64,

    /// Route searches allowed per step across all players.
    #[serde(default = "default_max_pathfinds_per_step")]
    pub max_pathfinds_per_step: u32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            collision_threshold: default_collision_threshold(),
            pathfinding_timeout_ms: default_pathfinding_timeout_ms(),
            pathfinding_backoff_ms: default_pathfinding_backoff_ms(),
            max_pathfinds_per_step: default_max_pathfinds_per_step(),
        }
    }
}

/// Join and presence configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlayersConfig {
    /// Maximum number of concurrent human players.
    #[serde(default = "default_max_human_players")]
    pub max_human_players: u32,

    /// Humans without input for this long are removed.
    #[serde(default = "default_human_idle_too_long_ms")]
    pub human_idle_too_long_ms: u64,

    /// Random start tiles sampled before `join` gives up.
    #[serde(default = "default_join_attempts")]
    pub join_attempts: u32,

    /// Named characters accepted by `join`.
    #[serde(default = "default_characters")]
    pub characters: Vec<String>,

    /// Prefix of character asset paths accepted by `join`.
    #[serde(default = "default_character_asset_prefix")]
    pub character_asset_prefix: String,
}

impl Default for PlayersConfig {
    fn default() -> Self {
        Self {
            max_human_players: default_max_human_players(),
            human_idle_too_long_ms: default_human_idle_too_long_ms(),
            join_attempts: default_join_attempts(),
            characters: default_characters(),
            character_asset_prefix: default_character_asset_prefix(),
        }
    }
}

/// Interaction distances and activity durations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InteractionConfig {
    /// Maximum Manhattan distance between a builder and its target tile.
    #[serde(default = "default_build_distance")]
    pub build_distance: u32,

    /// Maximum Manhattan distance between two trading players.
    #[serde(default = "default_trade_distance")]
    pub trade_distance: u32,

    /// Duration of the `build` / `explore` activity.
    #[serde(default = "default_activity_duration_ms")]
    pub activity_duration_ms: u64,

    /// Shortest emote duration.
    #[serde(default = "default_emote_min_ms")]
    pub emote_min_ms: u64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            build_distance: default_build_distance(),
            trade_distance: default_trade_distance(),
            activity_duration_ms: default_activity_duration_ms(),
            emote_min_ms: default_emote_min_ms(),
        }
    }
}

/// An activity an idle agent may pick.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActivityConfig {
    /// Text shown above the player.
    pub description: String,
    /// Emoji shown with the description.
    pub emoji: String,
    /// How long the activity lasts.
    pub duration_ms: u64,
}

/// Autonomous agent configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentsConfig {
    /// Agents created at startup.
    #[serde(default = "default_seed_agents")]
    pub seed_agents: u32,

    /// In-flight operations older than this are abandoned.
    #[serde(default = "default_action_timeout_ms")]
    pub action_timeout_ms: u64,

    /// Quiet period after leaving a conversation or inviting somebody.
    #[serde(default = "default_conversation_cooldown_ms")]
    pub conversation_cooldown_ms: u64,

    /// Conversations older than this are ended by the tick.
    #[serde(default = "default_conversation_max_ms")]
    pub conversation_max_ms: u64,

    /// Quiet period after an activity ends.
    #[serde(default = "default_activity_cooldown_ms")]
    pub activity_cooldown_ms: u64,

    /// Exclusive upper bound of the random delay before a completion.
    #[serde(default = "default_completion_jitter_ms")]
    pub completion_jitter_ms: u64,

    /// Chance that an idle agent carrying items handles its inventory.
    #[serde(default = "default_inventory_probability")]
    pub inventory_probability: f64,

    /// Maximum Manhattan distance to a trading partner.
    #[serde(default = "default_agent_trade_distance")]
    pub trade_distance: u32,

    /// Chance of trading rather than dropping an item.
    #[serde(default = "default_trade_probability")]
    pub trade_probability: f64,

    /// Activities idle agents choose from.
    #[serde(default = "default_activities")]
    pub activities: Vec<ActivityConfig>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            seed_agents: default_seed_agents(),
            action_timeout_ms: default_action_timeout_ms(),
            conversation_cooldown_ms: default_conversation_cooldown_ms(),
            conversation_max_ms: default_conversation_max_ms(),
            activity_cooldown_ms: default_activity_cooldown_ms(),
            completion_jitter_ms: default_completion_jitter_ms(),
            inventory_probability: default_inventory_probability(),
            trade_distance: default_agent_trade_distance(),
            trade_probability: default_trade_probability(),
            activities: default_activities(),
        }
    }
}

/// Generation budget and image generation configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenerationConfig {
    /// Length of the rolling window.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Generations allowed per window.
    #[serde(default = "default_max_per_window")]
    pub max_per_window: u32,

    /// Chance that an approved decision actually generates.
    #[serde(default = "default_generation_probability")]
    pub probability: f64,

    /// How often the bucket scheduler advances the bucket.
    #[serde(default = "default_bucket_interval_ms")]
    pub bucket_interval_ms: u64,

    /// Smallest building side in tiles.
    #[serde(default = "default_building_min")]
    pub building_min: u32,

    /// Largest building side in tiles.
    #[serde(default = "default_building_max")]
    pub building_max: u32,

    /// Largest requested area side accepted by area generation.
    #[serde(default = "default_max_area")]
    pub max_area: u32,

    /// Base URL of the image generation service.
    #[serde(default = "default_image_base_url")]
    pub image_base_url: String,

    /// Image model name.
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Generated image side in pixels.
    #[serde(default = "default_image_size")]
    pub image_size: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_per_window: default_max_per_window(),
            probability: default_generation_probability(),
            bucket_interval_ms: default_bucket_interval_ms(),
            building_min: default_building_min(),
            building_max: default_building_max(),
            max_area: default_max_area(),
            image_base_url: default_image_base_url(),
            image_model: default_image_model(),
            image_size: default_image_size(),
        }
    }
}

/// Runtime plumbing for the binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// Capacity of the input submission channel.
    #[serde(default = "default_input_channel_capacity")]
    pub input_channel_capacity: usize,

    /// Operations executed concurrently by the executor.
    #[serde(default = "default_max_concurrent_operations")]
    pub max_concurrent_operations: usize,
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            input_channel_capacity: default_input_channel_capacity(),
            max_concurrent_operations: default_max_concurrent_operations(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_world_name() -> String {
    "Township".to_owned()
}

const fn default_seed() -> u64 {
    42
}

const fn default_map_width() -> u32 {
    48
}

const fn default_map_height() -> u32 {
    32
}

const fn default_tile_dim() -> u32 {
    32
}

const fn default_tick_ms() -> u64 {
    16
}

const fn default_step_interval_ms() -> u64 {
    1_000
}

const fn default_speed() -> f64 {
    0.75
}

const fn default_collision_threshold() -> f64 {
    0.75
}

const fn default_pathfinding_timeout_ms() -> u64 {
    60_000
}

const fn default_pathfinding_backoff_ms() -> u64 {
    1_000
}

const fn default_max_pathfinds_per_step() -> u32 {
    16
}

const fn default_max_human_players() -> u32 {
    8
}

const fn default_human_idle_too_long_ms() -> u64 {
    300_000
}

const fn default_join_attempts() -> u32 {
    10
}

fn default_characters() -> Vec<String> {
    (1..=8).map(|n| format!("f{n}")).collect()
}

fn default_character_asset_prefix() -> String {
    "/township/assets/".to_owned()
}

const fn default_build_distance() -> u32 {
    3
}

const fn default_trade_distance() -> u32 {
    2
}

const fn default_activity_duration_ms() -> u64 {
    3_000
}

const fn default_emote_min_ms() -> u64 {
    500
}

const fn default_seed_agents() -> u32 {
    4
}

const fn default_action_timeout_ms() -> u64 {
    120_000
}

const fn default_conversation_cooldown_ms() -> u64 {
    15_000
}

const fn default_conversation_max_ms() -> u64 {
    60_000
}

const fn default_activity_cooldown_ms() -> u64 {
    10_000
}

const fn default_completion_jitter_ms() -> u64 {
    1_000
}

const fn default_inventory_probability() -> f64 {
    0.2
}

const fn default_agent_trade_distance() -> u32 {
    3
}

const fn default_trade_probability() -> f64 {
    0.6
}

fn default_activities() -> Vec<ActivityConfig> {
    [
        ("reading a book", "📖"),
        ("daydreaming", "🤔"),
        ("gardening", "🥕"),
    ]
    .into_iter()
    .map(|(description, emoji)| ActivityConfig {
        description: description.to_owned(),
        emoji: emoji.to_owned(),
        duration_ms: 60_000,
    })
    .collect()
}

const fn default_window_ms() -> u64 {
    1_200_000
}

const fn default_max_per_window() -> u32 {
    2
}

const fn default_generation_probability() -> f64 {
    0.05
}

const fn default_bucket_interval_ms() -> u64 {
    60_000
}

const fn default_building_min() -> u32 {
    3
}

const fn default_building_max() -> u32 {
    6
}

const fn default_max_area() -> u32 {
    6
}

fn default_image_base_url() -> String {
    "https://image.pollinations.ai/prompt".to_owned()
}

fn default_image_model() -> String {
    "flux".to_owned()
}

const fn default_image_size() -> u32 {
    512
}

const fn default_input_channel_capacity() -> usize {
    256
}

const fn default_max_concurrent_operations() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_constants() {
        let config = SimulationConfig::default();
        assert_eq!(config.world.tick_ms, 16);
        assert_eq!(config.world.max_ticks_per_step(), 62);
        assert_eq!(config.movement.max_pathfinds_per_step, 16);
        assert_eq!(config.movement.pathfinding_timeout_ms, 60_000);
        assert_eq!(config.players.max_human_players, 8);
        assert_eq!(config.agents.activities.len(), 3);
        assert_eq!(config.agents.conversation_max_ms, 60_000);
        assert_eq!(config.generation.window_ms, 1_200_000);
        assert_eq!(config.generation.max_per_window, 2);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let mut config: SimulationConfig = serde_yml::from_str("world:\n  seed: 42\n").unwrap();
        config.apply_overrides(|_| None);
        assert_eq!(config, SimulationConfig::default());
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let yaml = r"
world:
  width: 10
  height: 10
movement:
  speed: 1.5
generation:
  max_per_window: 5
";
        let config: SimulationConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.world.width, 10);
        assert_eq!(config.world.tile_dim, 32);
        assert_eq!(config.movement.speed, 1.5);
        assert_eq!(config.movement.collision_threshold, 0.75);
        assert_eq!(config.generation.max_per_window, 5);
        assert_eq!(config.generation.probability, 0.05);
    }

    #[test]
    fn overrides_replace_seed_and_agent_count() {
        let mut config = SimulationConfig::default();
        config.apply_overrides(|key| match key {
            "TOWNSHIP_SEED" => Some("7".to_owned()),
            "TOWNSHIP_AGENTS" => Some(" 12 ".to_owned()),
            _ => None,
        });
        assert_eq!(config.world.seed, 7);
        assert_eq!(config.agents.seed_agents, 12);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut config = SimulationConfig::default();
        config.apply_overrides(|_| Some("many".to_owned()));
        assert_eq!(config.world.seed, 42);
        assert_eq!(config.agents.seed_agents, 4);
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let err = serde_yml::from_str::<SimulationConfig>("world: [1, 2").unwrap_err();
        let err = ConfigError::from(err);
        assert!(err.to_string().contains("YAML"));
    }
}
