//! Session configuration.

use crate::inventory::FUSION_COST;
use crate::progression::INITIAL_FORGIVENESS_BUFFER;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Game-balance constants. Saved with the world so a save keeps the rules it
/// was played under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameRules {
    /// Mana held by one fusion.
    pub fusion_cost: i64,
    /// Forgiveness buffer restored after a streak collapse.
    pub forgiveness_buffer: u32,
    pub micro_quest_minutes: i64,
    /// Experience and vibration for finishing a micro-quest.
    pub micro_quest_bonus: i64,
    pub potion_cooldown_hours: i64,
    /// Mana returned when an idea is dissolved.
    pub idea_dissolve_refund: i64,
    /// Resilience gained per burned worry.
    pub worry_resilience: i64,
    /// The muse hibernates below this energy.
    pub muse_hibernation_threshold: i64,
    /// Experience multiplier for the oracle-chosen quest.
    pub trust_buff_multiplier: f64,
}

impl GameRules {
    pub fn potion_cooldown(&self) -> Duration {
        Duration::hours(self.potion_cooldown_hours)
    }

    pub fn micro_quest_window(&self) -> Duration {
        Duration::minutes(self.micro_quest_minutes)
    }
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            fusion_cost: FUSION_COST,
            forgiveness_buffer: INITIAL_FORGIVENESS_BUFFER,
            micro_quest_minutes: 5,
            micro_quest_bonus: 150,
            potion_cooldown_hours: 24,
            idea_dissolve_refund: 5,
            worry_resilience: 5,
            muse_hibernation_threshold: 30,
            trust_buff_multiplier: 1.1,
        }
    }
}

/// Settings for the Claude-backed oracle.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Model override; the client default is used when unset.
    pub model: Option<String>,

    /// Maximum tokens per oracle response.
    pub max_tokens: usize,

    /// Temperature for generation.
    pub temperature: Option<f32>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 1024,
            temperature: Some(0.9),
        }
    }
}

/// Configuration for a new grove session.
#[derive(Debug, Clone)]
pub struct GroveConfig {
    /// Character name before creation.
    pub character_name: String,

    pub rules: GameRules,

    pub oracle: OracleConfig,

    /// Directory for autosaves written by `checkpoint`.
    pub save_dir: Option<PathBuf>,
}

impl GroveConfig {
    pub fn new() -> Self {
        Self {
            character_name: "Seeker".to_string(),
            rules: GameRules::default(),
            oracle: OracleConfig::default(),
            save_dir: None,
        }
    }

    /// Set the character name.
    pub fn with_character_name(mut self, name: impl Into<String>) -> Self {
        self.character_name = name.into();
        self
    }

    /// Replace the game rules.
    pub fn with_rules(mut self, rules: GameRules) -> Self {
        self.rules = rules;
        self
    }

    /// Set the model used by the oracle.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.oracle.model = Some(model.into());
        self
    }

    /// Set max tokens for oracle responses.
    pub fn with_max_tokens(mut self, tokens: usize) -> Self {
        self.oracle.max_tokens = tokens;
        self
    }

    /// Set temperature for oracle generation.
    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.oracle.temperature = Some(temp);
        self
    }

    /// Enable autosave checkpoints in `dir`.
    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = Some(dir.into());
        self
    }
}

impl Default for GroveConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let rules = GameRules::default();
        assert_eq!(rules.fusion_cost, 50);
        assert_eq!(rules.forgiveness_buffer, 2);
        assert_eq!(rules.micro_quest_window(), Duration::minutes(5));
        assert_eq!(rules.potion_cooldown(), Duration::hours(24));
    }

    #[test]
    fn test_builder() {
        let config = GroveConfig::new()
            .with_character_name("Ivy")
            .with_model("claude-3-5-haiku-latest")
            .with_max_tokens(512)
            .with_save_dir("/tmp/grove");
        assert_eq!(config.character_name, "Ivy");
        assert_eq!(config.oracle.model.as_deref(), Some("claude-3-5-haiku-latest"));
        assert_eq!(config.oracle.max_tokens, 512);
        assert!(config.save_dir.is_some());
    }

    #[test]
    fn test_rules_fill_missing_fields() {
        let rules: GameRules = serde_json::from_str(r#"{"fusion_cost": 80}"#).unwrap();
        assert_eq!(rules.fusion_cost, 80);
        assert_eq!(rules.micro_quest_bonus, 150);
    }
}
