//! Claude-backed oracle.
//!
//! Structured answers are requested through a forced tool call so the
//! response always arrives as schema-shaped JSON.

use super::{Interpretation, MuseGift, Oracle, OracleError, QuestDraft};
use crate::config::OracleConfig;
use crate::inventory::{InventoryItem, ItemDescriptor};
use crate::quests::TaskCategory;
use crate::stats::Stats;
use crate::world::Archetype;
use async_trait::async_trait;
use claude::{Claude, Request, Tool};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

const SPIRIT_SYSTEM: &str = "You are the gentle spirit of a forest grove that guides a person \
through their day as if it were a quest. Speak in short zen and high-fantasy metaphors.";

/// An [`Oracle`] that asks Claude.
#[derive(Debug, Clone)]
pub struct ClaudeOracle {
    client: Claude,
    config: OracleConfig,
}

impl ClaudeOracle {
    pub fn new(client: Claude, config: OracleConfig) -> Self {
        let client = match &config.model {
            Some(model) => client.with_model(model.clone()),
            None => client,
        };
        Self { client, config }
    }

    /// Create from `ANTHROPIC_API_KEY`.
    pub fn from_env(config: OracleConfig) -> Result<Self, OracleError> {
        Ok(Self::new(Claude::from_env()?, config))
    }

    fn request(&self, prompt: impl Into<String>) -> Request {
        let mut request = Request::prompt(prompt)
            .with_system(SPIRIT_SYSTEM)
            .with_max_tokens(self.config.max_tokens);
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }
        request
    }

    async fn extract<T: DeserializeOwned>(&self, prompt: String, tool: Tool) -> Result<T, OracleError> {
        Ok(self.client.extract(self.request(prompt), tool).await?)
    }

    async fn text(&self, prompt: String) -> Result<String, OracleError> {
        let response = self.client.complete(self.request(prompt)).await?;
        let text = response.text();
        if text.trim().is_empty() {
            return Err(OracleError::Malformed("empty text response".to_string()));
        }
        Ok(text)
    }
}

#[async_trait]
impl Oracle for ClaudeOracle {
    async fn interpret_thought(&self, thought: &str) -> Result<Vec<QuestDraft>, OracleError> {
        let prompt = format!(
            "The seeker wrote down this thought: \"{thought}\".\n\
             Break it into one to three actionable quests. Overwhelmed thoughts become small \
             recovery quests; ambitious ones become a MAIN quest with SIDE quests supporting it. \
             Give each quest an evocative title, a type (MAIN for strategic goals, SIDE for \
             maintenance, BOSS for deadlines and high stress), a category, and a difficulty and \
             urgency from 1 to 10. MAIN and BOSS quests may carry loot: a thematic item or a lore \
             fragment."
        );
        let interpretation: Interpretation = self.extract(prompt, quests_tool()).await?;
        Ok(interpretation.quests)
    }

    async fn generate_loot(
        &self,
        task_title: &str,
        category: TaskCategory,
        difficulty: u32,
    ) -> Result<ItemDescriptor, OracleError> {
        let category = serde_json::to_string(&category)
            .map_err(|e| OracleError::Malformed(e.to_string()))?;
        let prompt = format!(
            "The seeker completed the quest \"{task_title}\" (category {category}, difficulty \
             {difficulty}/10). Forge a single themed artifact as its reward. Harder quests earn \
             rarer artifacts with stronger stats."
        );
        self.extract(
            prompt,
            item_tool(
                "forge_loot",
                "Describe the artifact rewarded for a completed quest.",
                &["UNCOMMON", "RARE", "LEGENDARY"],
            ),
        )
        .await
    }

    async fn fuse_items(
        &self,
        first: &InventoryItem,
        second: &InventoryItem,
    ) -> Result<ItemDescriptor, OracleError> {
        let prompt = format!(
            "Fuse two artifacts into one more powerful artifact.\n\
             First: {} ({}). Stats: {}.\n\
             Second: {} ({}). Stats: {}.\n\
             The result should feel like both and be stronger than either.",
            first.name,
            first.description,
            stats_json(first),
            second.name,
            second.description,
            stats_json(second),
        );
        self.extract(
            prompt,
            item_tool(
                "fuse_artifacts",
                "Describe the artifact produced by fusing two others.",
                &["RARE", "LEGENDARY", "RELIC"],
            ),
        )
        .await
    }

    async fn bind_real_world_item(
        &self,
        artifact_name: &str,
        real_world_name: &str,
    ) -> Result<Stats, OracleError> {
        let prompt = format!(
            "Bind the artifact \"{artifact_name}\" to the real-world object \"{real_world_name}\". \
             Judge the object: focus (0-30) for how much it aids deep concentration, efficiency \
             (0-30) for how much friction it removes, resonance (0-30) for how much it lifts the \
             quality of output, and quality (1.0-1.2) for its craftsmanship."
        );
        self.extract(prompt, binding_tool()).await
    }

    async fn generate_backstory(
        &self,
        name: &str,
        archetype: Archetype,
    ) -> Result<String, OracleError> {
        self.text(format!(
            "Write a mystical two-sentence backstory for {name}, a {archetype} of a solarpunk \
             forest realm. Address them in the second person. Reply with the backstory only."
        ))
        .await
    }

    async fn generate_item_visual(&self, _name: &str, _description: &str) -> Result<String, OracleError> {
        Err(OracleError::Unsupported)
    }

    async fn guidance(&self, status: &str) -> Result<String, OracleError> {
        self.text(format!(
            "The seeker's status: {status}.\n\
             Offer one piece of guidance of at most twenty words that re-centers them. Be \
             cryptic but comforting. Reply with the guidance only."
        ))
        .await
    }

    async fn muse_gift(&self, energy: i64) -> Result<MuseGift, OracleError> {
        let prompt = format!(
            "You are a muse in the form of a crystal fox. The seeker's energy is {energy}/100. \
             Above 70, give a SPARK (a creative prompt). Below 40, give a MEMORY (a past \
             strength) or a SHIELD (a comforting thought). Otherwise give a FRAGMENT (a tiny \
             piece of poetic lore)."
        );
        self.extract(prompt, muse_tool()).await
    }
}

fn stats_json(item: &InventoryItem) -> Value {
    item.stats
        .as_ref()
        .and_then(|s| serde_json::to_value(s).ok())
        .unwrap_or_else(|| json!({}))
}

// ============================================================================
// Tool schemas
// ============================================================================

fn stats_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "focus": { "type": "number" },
            "efficiency": { "type": "number" },
            "resonance": { "type": "number" },
            "quality": { "type": "number" }
        }
    })
}

fn quests_tool() -> Tool {
    Tool::new(
        "record_quests",
        "Record the quests interpreted from the seeker's thought.",
        json!({
            "type": "object",
            "properties": {
                "quests": {
                    "type": "array",
                    "minItems": 1,
                    "maxItems": 3,
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": { "type": "string" },
                            "type": { "type": "string", "enum": ["MAIN", "SIDE", "BOSS", "SHADOW"] },
                            "category": { "type": "string", "enum": ["CREATIVE", "PHYSICAL", "NEUTRAL"] },
                            "difficulty": { "type": "number", "description": "Cognitive load, 1-10" },
                            "urgency": { "type": "number", "description": "Time sensitivity, 1-10" },
                            "loot": {
                                "type": "object",
                                "properties": {
                                    "name": { "type": "string" },
                                    "description": { "type": "string" },
                                    "type": { "type": "string", "enum": ["ITEM", "LORE", "BADGE"] }
                                },
                                "required": ["name", "type"]
                            }
                        },
                        "required": ["title", "type", "category", "difficulty", "urgency"]
                    }
                }
            },
            "required": ["quests"]
        }),
    )
}

fn item_tool(name: &str, description: &str, rarities: &[&str]) -> Tool {
    Tool::new(
        name,
        description,
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "description": { "type": "string" },
                "rarity": { "type": "string", "enum": rarities },
                "slot": { "type": "string", "enum": ["WEAPON", "ARMOR", "RELIC", "ACCESSORY"] },
                "stats": stats_schema()
            },
            "required": ["name", "description", "rarity", "slot", "stats"]
        }),
    )
}

fn binding_tool() -> Tool {
    Tool::new(
        "bind_essence",
        "Record the stats of an artifact bound to a real-world object.",
        json!({
            "type": "object",
            "properties": {
                "focus": { "type": "number" },
                "efficiency": { "type": "number" },
                "resonance": { "type": "number" },
                "quality": { "type": "number" }
            },
            "required": ["focus", "efficiency", "resonance", "quality"]
        }),
    )
}

fn muse_tool() -> Tool {
    Tool::new(
        "offer_gift",
        "Offer the seeker a small gift.",
        json!({
            "type": "object",
            "properties": {
                "type": { "type": "string", "enum": ["SPARK", "MEMORY", "SHIELD", "FRAGMENT"] },
                "content": { "type": "string" }
            },
            "required": ["type", "content"]
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::Rarity;

    #[test]
    fn test_oracle_applies_model_override() {
        let client = Claude::new("test-key").unwrap();
        let config = OracleConfig {
            model: Some("claude-3-5-haiku-latest".to_string()),
            ..OracleConfig::default()
        };
        let oracle = ClaudeOracle::new(client, config);
        assert_eq!(oracle.client.model(), "claude-3-5-haiku-latest");
    }

    #[test]
    fn test_item_tool_schema_lists_rarities() {
        let tool = item_tool("forge_loot", "", &["RARE", "LEGENDARY"]);
        assert_eq!(
            tool.input_schema["properties"]["rarity"]["enum"],
            json!(["RARE", "LEGENDARY"])
        );
    }

    #[test]
    fn test_tool_output_deserializes_into_descriptor() {
        let input = json!({
            "name": "Lantern of Dusk",
            "description": "Glows when you focus.",
            "rarity": "LEGENDARY",
            "slot": "RELIC",
            "stats": { "focus": 12, "quality": 1.05 }
        });
        let item: ItemDescriptor = serde_json::from_value(input).unwrap();
        assert_eq!(item.rarity, Rarity::Legendary);
        assert_eq!(item.stats.focus, Some(12.0));
        assert_eq!(item.stats.efficiency, None);
    }

    #[test]
    fn test_binding_output_deserializes_into_stats() {
        let stats: Stats = serde_json::from_value(json!({
            "focus": 25, "efficiency": 10, "resonance": 5, "quality": 1.1
        }))
        .unwrap();
        assert_eq!(stats, Stats::new(25.0, 10.0, 5.0, 1.1));
    }
}
