//! The external generative collaborator.
//!
//! [`Oracle`] is the fallible provider contract. [`Collaborator`] wraps any
//! oracle and turns every failure into its fixed fallback, so nothing past
//! it ever sees an oracle error.

mod anthropic;

pub use self::anthropic::ClaudeOracle;

use crate::inventory::{InventoryItem, ItemDescriptor};
use crate::quests::{Loot, QuestType, TaskCategory, TaskDraft};
use crate::stats::Stats;
use crate::world::Archetype;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Most quests a single thought may fan out into.
pub const MAX_QUESTS_PER_THOUGHT: usize = 3;

pub const FALLBACK_BACKSTORY: &str =
    "You have awakened in the Grove, memory hazy but purpose clear.";
pub const FALLBACK_GUIDANCE: &str = "The forest whispers: stay present, seeker.";
pub const FALLBACK_MUSE_CONTENT: &str = "The fox nudges your hand, purring softly.";
pub const FALLBACK_BINDING: Stats = Stats::new(5.0, 5.0, 5.0, 1.01);

/// Errors from oracle providers.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Claude error: {0}")]
    Client(#[from] claude::Error),

    #[error("Malformed oracle response: {0}")]
    Malformed(String),

    #[error("Operation not supported by this oracle")]
    Unsupported,
}

// ============================================================================
// Wire shapes
// ============================================================================

/// One quest proposed for a captured thought.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestDraft {
    pub title: String,
    #[serde(rename = "type")]
    pub quest_type: QuestType,
    pub category: TaskCategory,
    pub difficulty: f64,
    pub urgency: f64,
    #[serde(default)]
    pub loot: Option<Loot>,
}

impl QuestDraft {
    pub fn new(title: impl Into<String>, quest_type: QuestType, category: TaskCategory) -> Self {
        Self {
            title: title.into(),
            quest_type,
            category,
            difficulty: 5.0,
            urgency: 5.0,
            loot: None,
        }
    }

    /// The fallback for an uninterpretable thought.
    pub fn fallback(thought: &str) -> Self {
        Self::new(thought, QuestType::Side, TaskCategory::Neutral)
    }

    /// Round and clamp the numeric fields into a task draft.
    pub fn into_task_draft(self) -> TaskDraft {
        let mut draft = TaskDraft::new(self.title)
            .with_type(self.quest_type)
            .with_category(self.category)
            .with_difficulty(scale(self.difficulty))
            .with_urgency(scale(self.urgency));
        if let Some(loot) = self.loot {
            draft = draft.with_loot(loot);
        }
        draft
    }
}

fn scale(value: f64) -> u32 {
    if value.is_finite() {
        value.round().clamp(1.0, 10.0) as u32
    } else {
        5
    }
}

/// Interpretation of a thought as returned by the oracle.
#[derive(Debug, Clone, Deserialize)]
pub struct Interpretation {
    pub quests: Vec<QuestDraft>,
}

/// Kind of muse gift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MuseGiftKind {
    /// A creative prompt.
    Spark,
    /// A reminder of a past strength.
    Memory,
    /// A comforting thought.
    Shield,
    /// A tiny piece of poetic lore.
    Fragment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuseGift {
    #[serde(rename = "type")]
    pub kind: MuseGiftKind,
    pub content: String,
}

impl MuseGift {
    pub fn new(kind: MuseGiftKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    pub fn fallback() -> Self {
        Self::new(MuseGiftKind::Fragment, FALLBACK_MUSE_CONTENT)
    }
}

// ============================================================================
// Oracle trait
// ============================================================================

/// A generative provider. Every method may fail; callers go through
/// [`Collaborator`] to get the fallbacks.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Split free text into quest proposals.
    async fn interpret_thought(&self, thought: &str) -> Result<Vec<QuestDraft>, OracleError>;

    async fn generate_loot(
        &self,
        task_title: &str,
        category: TaskCategory,
        difficulty: u32,
    ) -> Result<ItemDescriptor, OracleError>;

    async fn fuse_items(
        &self,
        first: &InventoryItem,
        second: &InventoryItem,
    ) -> Result<ItemDescriptor, OracleError>;

    /// Stats for an artifact bound to a real-world object.
    async fn bind_real_world_item(
        &self,
        artifact_name: &str,
        real_world_name: &str,
    ) -> Result<Stats, OracleError>;

    async fn generate_backstory(
        &self,
        name: &str,
        archetype: Archetype,
    ) -> Result<String, OracleError>;

    /// An image reference for an item.
    async fn generate_item_visual(
        &self,
        name: &str,
        description: &str,
    ) -> Result<String, OracleError>;

    async fn guidance(&self, status: &str) -> Result<String, OracleError>;

    async fn muse_gift(&self, energy: i64) -> Result<MuseGift, OracleError>;
}

// ============================================================================
// Collaborator
// ============================================================================

/// An oracle with every fallback applied. Cheap to clone into spawned tasks.
#[derive(Clone)]
pub struct Collaborator {
    oracle: Arc<dyn Oracle>,
}

impl Collaborator {
    pub fn new(oracle: impl Oracle + 'static) -> Self {
        Self {
            oracle: Arc::new(oracle),
        }
    }

    pub fn from_arc(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    /// One to three clamped task drafts; a single SIDE / NEUTRAL quest
    /// titled with the thought when the oracle fails or proposes nothing.
    pub async fn interpret_thought(&self, thought: &str) -> Vec<TaskDraft> {
        let quests = match self.oracle.interpret_thought(thought).await {
            Ok(quests) if !quests.is_empty() => quests,
            Ok(_) => {
                tracing::warn!("oracle proposed no quests, using fallback");
                vec![QuestDraft::fallback(thought)]
            }
            Err(e) => {
                tracing::warn!(error = %e, "thought interpretation failed, using fallback");
                vec![QuestDraft::fallback(thought)]
            }
        };
        quests
            .into_iter()
            .take(MAX_QUESTS_PER_THOUGHT)
            .map(QuestDraft::into_task_draft)
            .collect()
    }

    pub async fn generate_loot(
        &self,
        task_title: &str,
        category: TaskCategory,
        difficulty: u32,
    ) -> Option<ItemDescriptor> {
        self.oracle
            .generate_loot(task_title, category, difficulty)
            .await
            .map_err(|e| tracing::warn!(error = %e, "loot generation failed"))
            .ok()
    }

    pub async fn fuse_items(
        &self,
        first: &InventoryItem,
        second: &InventoryItem,
    ) -> Option<ItemDescriptor> {
        self.oracle
            .fuse_items(first, second)
            .await
            .map_err(|e| tracing::warn!(error = %e, "fusion failed"))
            .ok()
    }

    pub async fn bind_real_world_item(&self, artifact_name: &str, real_world_name: &str) -> Stats {
        self.oracle
            .bind_real_world_item(artifact_name, real_world_name)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "binding failed, using fallback stats");
                FALLBACK_BINDING
            })
    }

    pub async fn generate_backstory(&self, name: &str, archetype: Archetype) -> String {
        match self.oracle.generate_backstory(name, archetype).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => FALLBACK_BACKSTORY.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "backstory failed, using fallback");
                FALLBACK_BACKSTORY.to_string()
            }
        }
    }

    pub async fn generate_item_visual(&self, name: &str, description: &str) -> Option<String> {
        match self.oracle.generate_item_visual(name, description).await {
            Ok(image) => Some(image),
            Err(OracleError::Unsupported) => None,
            Err(e) => {
                tracing::warn!(error = %e, "item visual failed");
                None
            }
        }
    }

    pub async fn guidance(&self, status: &str) -> String {
        match self.oracle.guidance(status).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => FALLBACK_GUIDANCE.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "guidance failed, using fallback");
                FALLBACK_GUIDANCE.to_string()
            }
        }
    }

    pub async fn muse_gift(&self, energy: i64) -> MuseGift {
        self.oracle.muse_gift(energy).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "muse gift failed, using fallback");
            MuseGift::fallback()
        })
    }
}

impl std::fmt::Debug for Collaborator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborator").finish_non_exhaustive()
    }
}
