//! Quests and their lifecycle.
//!
//! A task is either active or completed. Failing an active task recasts it
//! in place as a shadow quest: same id, prefixed title, SHADOW rewards.

use crate::rewards::{compute_rewards, Rewards};
use crate::skills::SkillEffect;
use crate::stats::Stats;
use crate::world::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title prefix carried by recast shadow quests.
pub const SHADOW_PREFIX: &str = "Shadow: ";

/// Quest weight class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestType {
    /// Strategic goals.
    Main,
    /// Tactical or maintenance work.
    Side,
    /// High stress, deadlines.
    Boss,
    /// Recovery quest produced by failing another quest.
    Shadow,
}

impl QuestType {
    /// Whether completing this type resolves loot.
    pub fn grants_loot(self) -> bool {
        matches!(self, QuestType::Main | QuestType::Boss)
    }
}

/// Kind of work; decides which secondary currency a task pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskCategory {
    Creative,
    Physical,
    Neutral,
}

/// What a pre-assigned loot descriptor grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LootKind {
    Item,
    Lore,
    Badge,
}

/// Loot attached to a task before completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loot {
    #[serde(rename = "type")]
    pub kind: LootKind,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Loot {
    pub fn new(kind: LootKind, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            description: description.into(),
        }
    }

    /// Lore log line for this loot.
    pub fn lore_entry(&self) -> String {
        format!("{}: {}", self.name, self.description)
    }
}

/// Everything needed to create a task; ids, rewards and timestamps are
/// assigned on creation.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub quest_type: QuestType,
    pub category: TaskCategory,
    pub difficulty: u32,
    pub urgency: u32,
    pub loot: Option<Loot>,
}

impl TaskDraft {
    /// A SIDE / NEUTRAL draft of middling difficulty and urgency.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            quest_type: QuestType::Side,
            category: TaskCategory::Neutral,
            difficulty: 5,
            urgency: 5,
            loot: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_type(mut self, quest_type: QuestType) -> Self {
        self.quest_type = quest_type;
        self
    }

    pub fn with_category(mut self, category: TaskCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_difficulty(mut self, difficulty: u32) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_urgency(mut self, urgency: u32) -> Self {
        self.urgency = urgency;
        self
    }

    pub fn with_loot(mut self, loot: Loot) -> Self {
        self.loot = Some(loot);
        self
    }

    /// Clamp difficulty and urgency into `[1, 10]`.
    pub fn clamped(mut self) -> Self {
        self.difficulty = self.difficulty.clamp(1, 10);
        self.urgency = self.urgency.clamp(1, 10);
        self
    }
}

/// A quest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub quest_type: QuestType,
    pub category: TaskCategory,
    pub difficulty: u32,
    pub urgency: u32,
    pub is_completed: bool,
    /// Provisional until completion, final afterwards.
    pub rewards: Rewards,
    #[serde(default)]
    pub loot: Option<Loot>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create an active task with provisional rewards.
    pub fn from_draft(
        draft: TaskDraft,
        unlocked: &[SkillEffect],
        stats: &Stats,
        now: DateTime<Utc>,
    ) -> Self {
        let draft = draft.clamped();
        let rewards = compute_rewards(
            draft.difficulty,
            draft.urgency,
            draft.quest_type,
            draft.category,
            unlocked,
            stats,
            false,
        );
        Self {
            id: TaskId::new(),
            title: draft.title,
            description: draft.description,
            quest_type: draft.quest_type,
            category: draft.category,
            difficulty: draft.difficulty,
            urgency: draft.urgency,
            is_completed: false,
            rewards,
            loot: draft.loot,
            created_at: now,
            completed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.is_completed
    }

    /// Rewards for this task under the given stats.
    pub fn rewards_for(&self, unlocked: &[SkillEffect], stats: &Stats, in_flow: bool) -> Rewards {
        compute_rewards(
            self.difficulty,
            self.urgency,
            self.quest_type,
            self.category,
            unlocked,
            stats,
            in_flow,
        )
    }

    /// Recast an active, non-shadow task as a shadow quest.
    pub fn recast_as_shadow(&mut self, unlocked: &[SkillEffect], stats: &Stats) -> bool {
        if self.is_completed || self.quest_type == QuestType::Shadow {
            return false;
        }
        self.title = format!("{SHADOW_PREFIX}{}", self.title);
        self.quest_type = QuestType::Shadow;
        self.rewards = self.rewards_for(unlocked, stats, false);
        true
    }

    /// Finalize rewards and mark completed. Completed tasks are never
    /// mutated again.
    pub fn finish(&mut self, rewards: Rewards, now: DateTime<Utc>) -> bool {
        if self.is_completed {
            return false;
        }
        self.is_completed = true;
        self.rewards = rewards;
        self.completed_at = Some(now);
        true
    }
}
